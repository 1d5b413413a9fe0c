//! Vehicle metadata owned by the device registry

use serde::{Deserialize, Serialize};

/// Vehicle a tracker is installed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// IMEI of the installed tracker
    pub imei: String,
    /// Display name
    pub name: String,
    /// Overspeed limit in km/h
    pub overspeed_limit: f64,
}

impl Vehicle {
    pub fn new(imei: impl Into<String>, name: impl Into<String>, overspeed_limit: f64) -> Self {
        Self {
            imei: imei.into(),
            name: name.into(),
            overspeed_limit,
        }
    }
}
