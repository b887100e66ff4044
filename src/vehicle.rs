//! Vehicle observation and registry record types.
//!
//! Field names follow the registry's JSON contract (`type`, `typeProb`,
//! `manufacturerProb`, ...). The registry declares every field nullable and
//! sends explicit `null`s, so a missing key and a `null` both decode to the
//! field's default. A partially populated detection is then scored with
//! explicit defaults instead of failing.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

/// Axis-aligned box in pixel coordinates (left/top corner plus size).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default, deserialize_with = "null_as_default")]
    pub left: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub width: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub height: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.left as f64 + self.width as f64
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.top as f64 + self.height as f64
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    /// Box centre as (latitude, longitude) in the registry's convention:
    /// latitude is the vertical centre, longitude the horizontal one.
    pub fn center(&self) -> (f64, f64) {
        let lat = self.top as f64 + self.height as f64 / 2.0;
        let lon = self.left as f64 + self.width as f64 / 2.0;
        (round3(lat), round3(lon))
    }
}

/// Damage annotations attached to a detection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub classes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidences: Vec<f64>,
}

impl DamageReport {
    pub fn has_damage(&self) -> bool {
        !self.classes.is_empty()
    }

    /// Mean per-class confidence; 0.0 when no confidences were reported.
    pub fn mean_confidence(&self) -> f64 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
    }

    /// Human-readable summary stored as the record description.
    pub fn summary(&self) -> String {
        if self.classes.is_empty() {
            return "no damage".to_string();
        }
        self.classes
            .iter()
            .enumerate()
            .map(|(i, class)| match self.confidences.get(i) {
                Some(conf) => format!("{} ({:.2})", class, conf),
                None => class.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Attribute shape shared by observations and records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAttributes {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(rename = "typeProb", default, deserialize_with = "null_as_default")]
    pub kind_confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub manufacturer: String,
    #[serde(rename = "manufacturerProb", default, deserialize_with = "null_as_default")]
    pub manufacturer_confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    #[serde(rename = "colorProb", default, deserialize_with = "null_as_default")]
    pub color_confidence: f64,
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: DamageReport,
    #[serde(default, deserialize_with = "null_as_default")]
    pub camera_id: String,
}

impl VehicleAttributes {
    /// Rejects attributes missing one of the identity fields.
    ///
    /// Confidences, box and damage are never validated here; they fall back
    /// to numeric defaults during scoring.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("type", &self.kind),
            ("manufacturer", &self.manufacturer),
            ("color", &self.color),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::InvalidObservation { field });
            }
        }
        Ok(())
    }
}

/// A single per-frame detection awaiting identity resolution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Observation {
    pub fn new(attributes: VehicleAttributes) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Fills the fields the registry expects on creation: box centre,
    /// damage summary and the stored image reference.
    pub fn annotate_for_create(&mut self, image_url: String) {
        let (lat, lon) = self.attributes.bbox.center();
        self.latitude = Some(lat);
        self.longitude = Some(lon);
        self.description = Some(self.attributes.details.summary());
        self.image_url = Some(image_url);
    }
}

impl AsRef<VehicleAttributes> for Observation {
    fn as_ref(&self) -> &VehicleAttributes {
        &self.attributes
    }
}

/// A registry-owned vehicle entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// First-seen time as the registry's ISO local date-time, read as UTC.
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<NaiveDateTime>,
    /// Seconds between first and last sighting.
    #[serde(default, deserialize_with = "null_as_default")]
    pub stay_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stay_duration_formatted: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alert: bool,
}

impl Record {
    /// Builds the update request for a record seen again at `now`.
    ///
    /// Identity attributes and the stored box are left untouched; only the
    /// stay bookkeeping changes. A record without a first-seen time has no
    /// measurable stay.
    pub fn touched(&self, now: NaiveDateTime, alert_after_secs: u64) -> Record {
        let stay = self
            .timestamp
            .map(|first| now.signed_duration_since(first).num_seconds().max(0) as u64)
            .unwrap_or(0);
        Record {
            last_seen: Some(now),
            stay_duration: stay as f64,
            stay_duration_formatted: Some(format_stay_duration(stay)),
            alert: self.alert || stay > alert_after_secs,
            ..self.clone()
        }
    }
}

impl AsRef<VehicleAttributes> for Record {
    fn as_ref(&self) -> &VehicleAttributes {
        &self.attributes
    }
}

/// Compact duration such as `1d 2h 3m 4s`; zero components are omitted.
pub fn format_stay_duration(total_secs: u64) -> String {
    let days = total_secs / (24 * 3600);
    let hours = (total_secs % (24 * 3600)) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", seconds));
    }
    parts.join(" ")
}

/// Wrapper used by detector sidecars and the offline comparison tool.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VehicleList<T> {
    #[serde(default = "Vec::new")]
    pub vehicles: Vec<T>,
}

/// UTC wall-clock time for `secs` since the epoch.
pub fn datetime_from_epoch(secs: u64) -> NaiveDateTime {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0)
        .unwrap_or_default()
        .naive_utc()
}

/// Decodes `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
