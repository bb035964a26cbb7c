//! Measurement server model and catalog decoding
//!
//! Catalog records arrive as loosely typed JSON: coordinates and ids are
//! seen both as numbers and as numeric strings. Numeric fields that cannot
//! be read either way resolve to 0.0 instead of rejecting the record.

use crate::geo::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Active,
    Offline,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandwidthLimits {
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
}

/// Candidate measurement endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub host: String,
    pub provider: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,

    /// Distance from the last known user location (km), derived
    #[serde(skip)]
    pub distance_km: f64,

    /// Last measured round trip (ms)
    pub last_ping_ms: Option<f64>,
    pub is_default: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub status: ServerStatus,
    pub supported_protocols: BTreeSet<String>,
    pub bandwidth_limits: Option<BandwidthLimits>,
}

impl Server {
    /// Minimal active server; remaining fields take neutral defaults
    pub fn new(id: &str, name: &str, host: &str, provider: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            host: host.to_string(),
            provider: provider.to_string(),
            city: String::new(),
            country: String::new(),
            country_code: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            distance_km: 0.0,
            last_ping_ms: None,
            is_default: false,
            last_checked: None,
            status: ServerStatus::Active,
            supported_protocols: BTreeSet::from(["HTTPS".to_string()]),
            bandwidth_limits: None,
        }
    }

    pub fn with_location(mut self, city: &str, country: &str, country_code: &str) -> Self {
        self.city = city.to_string();
        self.country = country.to_string();
        self.country_code = country_code.to_string();
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Recompute `distance_km` against `user`; 0 when the location is unknown
    ///
    /// Only the distance changes, identity fields stay untouched.
    pub fn update_distance(&mut self, user: Option<Coordinates>) {
        self.distance_km = match user {
            Some(user) => user.distance_km(&self.coordinates()),
            None => 0.0,
        };
    }

    /// "City, Country" label, falling back to whichever part is present
    pub fn location_label(&self) -> String {
        match (self.city.is_empty(), self.country.is_empty()) {
            (false, false) => format!("{}, {}", self.city, self.country),
            (false, true) => self.city.clone(),
            (true, false) => self.country.clone(),
            (true, true) => String::new(),
        }
    }

    /// Case-insensitive substring match over name, city, country and provider
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        [&self.name, &self.city, &self.country, &self.provider]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One record of the remote server catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub cc: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: f64,
    #[serde(default)]
    pub url: String,
}

impl CatalogRecord {
    /// Convert into a [`Server`]; `None` when the record carries no host
    pub fn into_server(self) -> Option<Server> {
        let host = if self.host.is_empty() {
            host_from_url(&self.url)?
        } else {
            self.host
        };

        let id = if self.id.is_empty() { host.clone() } else { self.id };
        let display = if self.sponsor.is_empty() {
            self.name.clone()
        } else {
            self.sponsor.clone()
        };

        Some(
            Server::new(&id, &display, &host, &self.sponsor)
                .with_location(&self.name, &self.country, &self.cc)
                .with_coordinates(self.lat, self.lon),
        )
    }
}

/// Parse a catalog response body into servers
///
/// Fails only when the body is not a JSON array; individual records that
/// cannot be used are skipped.
pub fn parse_catalog(body: &str) -> Result<Vec<Server>, serde_json::Error> {
    let records: Vec<Value> = serde_json::from_str(body)?;
    Ok(records
        .into_iter()
        .filter_map(|value| serde_json::from_value::<CatalogRecord>(value).ok())
        .filter_map(CatalogRecord::into_server)
        .collect())
}

/// Read a number or a numeric string; anything else becomes 0.0
pub fn lenient_f64_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_f64_value(&value))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn host_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
