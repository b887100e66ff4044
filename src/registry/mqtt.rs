use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{mqttbytes::QoS, Client, Event, MqttOptions};

use super::{RegistryAck, VehicleRegistry};
use crate::vehicle::{Observation, Record};

pub const DEFAULT_CLIENT_ID: &str = "vehicle-dedup";
pub const DEFAULT_CREATE_TOPIC: &str = "vehicle-create";
pub const DEFAULT_UPDATE_TOPIC: &str = "vehicle-update";
const KEEP_ALIVE_SECS: u64 = 60;
const REQUEST_CAPACITY: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct MqttSettings {
    /// Broker address as `host:port` (`[v6]:port` for IPv6 literals).
    pub broker_addr: String,
    pub client_id: String,
    pub create_topic: String,
    pub update_topic: String,
}

impl MqttSettings {
    pub fn new(broker_addr: impl Into<String>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            create_topic: DEFAULT_CREATE_TOPIC.to_string(),
            update_topic: DEFAULT_UPDATE_TOPIC.to_string(),
        }
    }
}

/// Registry whose writes go through a message broker.
///
/// Reads are delegated to another registry. Create and update requests are
/// published as JSON with QoS 1 and acknowledged once the broker client has
/// accepted them; the registry service consumes the topics and assigns ids.
/// Writes are refused until the broker has acknowledged the connection.
pub struct QueuedRegistry {
    reads: Box<dyn VehicleRegistry>,
    client: Client,
    settings: MqttSettings,
    connected: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl QueuedRegistry {
    pub fn connect(settings: MqttSettings, reads: Box<dyn VehicleRegistry>) -> Result<Self> {
        let (host, port) = split_host_port(&settings.broker_addr)?;
        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        options.set_clean_start(true);

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("registry-mqtt".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    match event {
                        Ok(event) => {
                            if observe(&event, &flag) {
                                let _ = ready_tx.send(());
                            }
                        }
                        Err(e) => {
                            log::warn!("MQTT connection error: {}", e);
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
            })
            .context("spawn mqtt connection thread")?;

        if ready_rx.recv_timeout(CONNECT_TIMEOUT).is_err() {
            let _ = client.try_disconnect();
            return Err(anyhow!(
                "MQTT broker {} did not acknowledge the connection",
                settings.broker_addr
            ));
        }

        log::info!(
            "registry writes go to MQTT broker {} (topics {}, {})",
            settings.broker_addr,
            settings.create_topic,
            settings.update_topic
        );
        Ok(Self {
            reads,
            client,
            settings,
            connected,
            connection_handle: Some(handle),
        })
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(anyhow!("MQTT connection to {} lost", self.settings.broker_addr));
        }
        // never block the cycle on a full request queue
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| anyhow!("publish to {} failed: {}", topic, e))?;
        Ok(())
    }

    pub fn disconnect(mut self) -> Result<()> {
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

/// Tracks connection state from broker events. Returns true when the event
/// is an accepted ConnAck.
fn observe(event: &Event, connected: &AtomicBool) -> bool {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            let accepted = matches!(ack.code, ConnectReturnCode::Success);
            if !accepted {
                log::warn!("MQTT broker refused the connection: {:?}", ack.code);
            }
            connected.store(accepted, Ordering::SeqCst);
            accepted
        }
        Event::Incoming(Packet::Disconnect(_)) => {
            connected.store(false, Ordering::SeqCst);
            false
        }
        _ => false,
    }
}

impl Drop for QueuedRegistry {
    fn drop(&mut self) {
        if self.connection_handle.is_some() {
            let _ = self.client.try_disconnect();
        }
    }
}

impl VehicleRegistry for QueuedRegistry {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn candidates(&mut self, camera_id: &str) -> Result<Vec<Record>> {
        self.reads.candidates(camera_id)
    }

    fn create(&mut self, observation: &Observation) -> Result<RegistryAck> {
        let payload = serde_json::to_vec(observation)?;
        self.publish(&self.settings.create_topic, payload)?;
        Ok(RegistryAck::Queued)
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        self.publish(&self.settings.update_topic, payload)
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
