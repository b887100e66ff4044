//! Vehicle registry collaborators.
//!
//! The registry owns Records. The engine only ever asks for the current
//! candidates of a camera, requests creation of a new Record from an
//! onboarded Observation, and requests an update of a matched Record.

mod http;
mod memory;
mod mqtt;

pub use http::{HttpRegistry, DEFAULT_PAGE_SIZE};
pub use memory::InMemoryRegistry;
pub use mqtt::{MqttSettings, QueuedRegistry};

use anyhow::Result;

use crate::vehicle::{Observation, Record};

/// Outcome of a create request.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryAck {
    /// The registry stored the Record and returned it with its id.
    Created(Record),
    /// The request was handed to a queue; the id is assigned later.
    Queued,
}

/// Registry backend trait.
pub trait VehicleRegistry: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Current Records for a camera.
    ///
    /// A registry that does not know the camera yet returns an empty list.
    /// Transport and server failures are errors.
    fn candidates(&mut self, camera_id: &str) -> Result<Vec<Record>>;

    /// Requests a new Record for an onboarded Observation.
    fn create(&mut self, observation: &Observation) -> Result<RegistryAck>;

    /// Requests an update of an existing Record.
    fn update(&mut self, record: &Record) -> Result<()>;
}

impl<R: VehicleRegistry + ?Sized> VehicleRegistry for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn candidates(&mut self, camera_id: &str) -> Result<Vec<Record>> {
        (**self).candidates(camera_id)
    }

    fn create(&mut self, observation: &Observation) -> Result<RegistryAck> {
        (**self).create(observation)
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        (**self).update(record)
    }
}
