use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::blob::{BlobStore, FilesystemBlobStore, HttpBlobStore, DEFAULT_CONTAINER};
use crate::blur::{Blurrer, GaussianBlur, NoBlur, DEFAULT_BLUR_SIGMA};
use crate::matching::DEFAULT_ALERT_AFTER_SECS;
use crate::onboard::Onboarder;
use crate::registry::{
    HttpRegistry, InMemoryRegistry, MqttSettings, QueuedRegistry, VehicleRegistry,
    DEFAULT_PAGE_SIZE,
};
use crate::similarity::{Scorer, ScoringConfig};

const DEFAULT_CAMERA_ID: &str = "camera-1";
const DEFAULT_BLOB_ROOT: &str = "vehicle-blobs";
const DEFAULT_STREAM_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    camera_id: Option<String>,
    scoring: Option<ScoringConfigFile>,
    registry: Option<RegistryConfigFile>,
    storage: Option<StorageConfigFile>,
    scratch_dir: Option<PathBuf>,
    blur_sigma: Option<f32>,
    stream: Option<StreamConfigFile>,
    alert_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ScoringConfigFile {
    match_threshold: Option<f64>,
    attribute_floor: Option<f64>,
    base_total_weight: Option<f64>,
    damage_base_weight: Option<f64>,
    iou_boost_threshold: Option<f64>,
    iou_boost_floor: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RegistryConfigFile {
    url: Option<String>,
    token: Option<String>,
    page_size: Option<usize>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    create_topic: Option<String>,
    update_topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    root: Option<PathBuf>,
    url: Option<String>,
    container: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    interval_ms: Option<u64>,
    source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub camera_id: String,
    pub scoring: ScoringConfig,
    pub registry: RegistrySettings,
    pub storage: StorageSettings,
    /// Where onboarding crops live while they are uploaded.
    pub scratch_dir: PathBuf,
    /// Gaussian blur sigma for crops; 0 disables blurring.
    pub blur_sigma: f32,
    pub stream: StreamSettings,
    pub alert_after_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Registry base URL; an in-memory registry is used when unset.
    pub url: Option<String>,
    pub token: Option<String>,
    pub page_size: usize,
    /// When set, create/update requests are published to the broker.
    pub mqtt: Option<MqttSettings>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: PathBuf,
    /// Blob service base URL; takes precedence over `root`.
    pub url: Option<String>,
    pub container: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub interval: Duration,
    pub source_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEHICLE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        let defaults = ScoringConfig::default();
        let scoring_file = file.scoring.unwrap_or_default();
        let scoring = ScoringConfig {
            match_threshold: scoring_file
                .match_threshold
                .unwrap_or(defaults.match_threshold),
            attribute_floor: scoring_file
                .attribute_floor
                .unwrap_or(defaults.attribute_floor),
            base_total_weight: scoring_file
                .base_total_weight
                .unwrap_or(defaults.base_total_weight),
            damage_base_weight: scoring_file
                .damage_base_weight
                .unwrap_or(defaults.damage_base_weight),
            iou_boost_threshold: scoring_file
                .iou_boost_threshold
                .unwrap_or(defaults.iou_boost_threshold),
            iou_boost_floor: scoring_file
                .iou_boost_floor
                .unwrap_or(defaults.iou_boost_floor),
        };

        let registry_file = file.registry.unwrap_or_default();
        let mqtt = registry_file.mqtt.and_then(|mqtt_file| {
            let mut settings = MqttSettings::new(mqtt_file.broker_addr?);
            if let Some(client_id) = mqtt_file.client_id {
                settings.client_id = client_id;
            }
            if let Some(topic) = mqtt_file.create_topic {
                settings.create_topic = topic;
            }
            if let Some(topic) = mqtt_file.update_topic {
                settings.update_topic = topic;
            }
            Some(settings)
        });
        let registry = RegistrySettings {
            url: registry_file.url,
            token: registry_file.token,
            page_size: registry_file.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            mqtt,
        };

        let storage_file = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            root: storage_file
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_ROOT)),
            url: storage_file.url,
            container: storage_file
                .container
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            token: storage_file.token,
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            interval: Duration::from_millis(
                stream_file.interval_ms.unwrap_or(DEFAULT_STREAM_INTERVAL_MS),
            ),
            source_dir: stream_file.source_dir,
        };

        Self {
            camera_id: file
                .camera_id
                .unwrap_or_else(|| DEFAULT_CAMERA_ID.to_string()),
            scoring,
            registry,
            storage,
            scratch_dir: file.scratch_dir.unwrap_or_else(std::env::temp_dir),
            blur_sigma: file.blur_sigma.unwrap_or(DEFAULT_BLUR_SIGMA),
            stream,
            alert_after_secs: file.alert_after_secs.unwrap_or(DEFAULT_ALERT_AFTER_SECS),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(camera_id) = env_non_empty("VEHICLE_CAMERA_ID") {
            self.camera_id = camera_id;
        }
        if let Some(url) = env_non_empty("VEHICLE_REGISTRY_URL") {
            self.registry.url = Some(url);
        }
        if let Some(token) = env_non_empty("VEHICLE_REGISTRY_TOKEN") {
            self.registry.token = Some(token);
        }
        if let Some(threshold) = env_non_empty("VEHICLE_MATCH_THRESHOLD") {
            self.scoring.match_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("VEHICLE_MATCH_THRESHOLD must be a number"))?;
        }
        if let Some(root) = env_non_empty("VEHICLE_BLOB_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = env_non_empty("VEHICLE_BLOB_URL") {
            self.storage.url = Some(url);
        }
        if let Some(dir) = env_non_empty("VEHICLE_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_non_empty("VEHICLE_SOURCE_DIR") {
            self.stream.source_dir = Some(PathBuf::from(dir));
        }
        if let Some(interval) = env_non_empty("VEHICLE_STREAM_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("VEHICLE_STREAM_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.stream.interval = Duration::from_millis(millis);
        }
        if let Some(addr) = env_non_empty("VEHICLE_MQTT_BROKER_ADDR") {
            match self.registry.mqtt.as_mut() {
                Some(mqtt) => mqtt.broker_addr = addr,
                None => self.registry.mqtt = Some(MqttSettings::new(addr)),
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.camera_id = self.camera_id.trim().to_string();
        if self.camera_id.is_empty() {
            return Err(anyhow!("camera_id cannot be empty"));
        }

        let scoring = &self.scoring;
        if !(0.0..=100.0).contains(&scoring.match_threshold) {
            return Err(anyhow!("match_threshold must be within [0, 100]"));
        }
        for (name, value) in [
            ("attribute_floor", scoring.attribute_floor),
            ("base_total_weight", scoring.base_total_weight),
            ("damage_base_weight", scoring.damage_base_weight),
            ("iou_boost_threshold", scoring.iou_boost_threshold),
            ("iou_boost_floor", scoring.iou_boost_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1]", name));
            }
        }

        if self.stream.interval.is_zero() {
            return Err(anyhow!("stream interval must be greater than zero"));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(anyhow!("blur_sigma must be zero or positive"));
        }
        if self.registry.page_size == 0 {
            return Err(anyhow!("registry page_size must be greater than zero"));
        }
        if self.registry.mqtt.is_some() && self.registry.url.is_none() {
            return Err(anyhow!(
                "MQTT registry writes need a registry url to read candidates from"
            ));
        }
        if self.storage.container.trim().is_empty() {
            return Err(anyhow!("storage container cannot be empty"));
        }
        Ok(())
    }

    pub fn scorer(&self) -> Scorer {
        Scorer::new(self.scoring.clone())
    }

    /// Builds the registry collaborator described by this configuration.
    pub fn build_registry(&self) -> Result<Box<dyn VehicleRegistry>> {
        let Some(url) = self.registry.url.as_deref() else {
            log::warn!("no registry url configured; using an in-memory registry");
            return Ok(Box::new(InMemoryRegistry::new()));
        };
        let http = HttpRegistry::new(url, self.registry.token.clone())?
            .with_page_size(self.registry.page_size);
        match &self.registry.mqtt {
            Some(settings) => Ok(Box::new(QueuedRegistry::connect(
                settings.clone(),
                Box::new(http),
            )?)),
            None => Ok(Box::new(http)),
        }
    }

    pub fn build_blob_store(&self) -> Result<Box<dyn BlobStore>> {
        match self.storage.url.as_deref() {
            Some(url) => Ok(Box::new(HttpBlobStore::new(
                url,
                &self.storage.container,
                self.storage.token.clone(),
            )?)),
            None => Ok(Box::new(FilesystemBlobStore::new(&self.storage.root)?)),
        }
    }

    pub fn build_blur(&self) -> Result<Box<dyn Blurrer>> {
        if self.blur_sigma == 0.0 {
            log::warn!("crop blurring disabled");
            return Ok(Box::new(NoBlur));
        }
        Ok(Box::new(GaussianBlur::new(self.blur_sigma)?))
    }

    pub fn build_onboarder(&self) -> Result<Onboarder> {
        Ok(Onboarder::new(
            self.build_blur()?,
            self.build_blob_store()?,
            self.scratch_dir.clone(),
        ))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_file(EngineConfigFile::default())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
