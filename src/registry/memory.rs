use anyhow::{anyhow, Result};

use super::{RegistryAck, VehicleRegistry};
use crate::vehicle::{Observation, Record};

/// Process-local registry.
///
/// Assigns sequential ids and keeps every create/update request it receives,
/// so demos and tests can inspect exactly what a cycle asked for.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: Vec<Record>,
    next_id: u64,
    created: Vec<Observation>,
    updated: Vec<Record>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry with existing Records.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            next_id: records.len() as u64,
            records,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Create requests received, in order.
    pub fn created(&self) -> &[Observation] {
        &self.created
    }

    /// Update requests received, in order.
    pub fn updated(&self) -> &[Record] {
        &self.updated
    }
}

impl VehicleRegistry for InMemoryRegistry {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn candidates(&mut self, camera_id: &str) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.attributes.camera_id == camera_id)
            .cloned()
            .collect())
    }

    fn create(&mut self, observation: &Observation) -> Result<RegistryAck> {
        self.next_id += 1;
        let record = Record {
            id: format!("vehicle-{}", self.next_id),
            attributes: observation.attributes.clone(),
            image_url: observation.image_url.clone(),
            description: observation.description.clone(),
            latitude: observation.latitude,
            longitude: observation.longitude,
            timestamp: Some(chrono::Utc::now().naive_utc()),
            ..Record::default()
        };
        self.created.push(observation.clone());
        self.records.push(record.clone());
        Ok(RegistryAck::Created(record))
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        let slot = self
            .records
            .iter_mut()
            .find(|stored| stored.id == record.id)
            .ok_or_else(|| anyhow!("vehicle {} not found", record.id))?;
        *slot = record.clone();
        self.updated.push(record.clone());
        Ok(())
    }
}
