//! GPS validation and smoothing
//!
//! Each candidate point runs through an ordered set of checks against the
//! device's most recent stored points. The first failing check drops the
//! point; a point that passes every check is smoothed toward the previous
//! stored position before it is persisted.

use fleet_core::GpsRecord;
use thiserror::Error;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::geo::{haversine_m, turn_angle_deg};

/// Why a candidate point was dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("missing latitude or longitude")]
    MissingPosition,

    #[error("({lat:.6}, {lon:.6}) is outside the accepted area")]
    OutOfBounds { lat: f64, lon: f64 },

    #[error("{satellites} satellites, need {required}")]
    InsufficientSatellites { satellites: u8, required: u8 },

    #[error("duplicate, {distance_m:.1} m from last point")]
    Duplicate { distance_m: f64 },

    #[error("erratic jump of {distance_m:.0} m")]
    Jump { distance_m: f64 },

    #[error("zig-zag, turn angle {angle_deg:.0} degrees")]
    ZigZag { angle_deg: f64 },
}

/// Stateless validator; history is supplied per call
#[derive(Debug, Clone)]
pub struct GpsPipeline {
    config: PipelineConfig,
}

impl GpsPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate `candidate` against `history` (newest first).
    ///
    /// Returns the record to persist, with smoothed coordinates.
    pub fn evaluate(
        &self,
        mut candidate: GpsRecord,
        positioned: bool,
        history: &[GpsRecord],
    ) -> Result<GpsRecord, Rejection> {
        let (lat, lon) = candidate.position().ok_or(Rejection::MissingPosition)?;

        if !self.config.bounds.contains(lat, lon) {
            return Err(Rejection::OutOfBounds { lat, lon });
        }

        self.check_satellites(candidate.satellites.unwrap_or(0), positioned)?;

        if candidate.status.ignition == Some(false) {
            warn!(imei = %candidate.imei, "Location reported with ignition off");
        }

        let previous = history.iter().filter_map(GpsRecord::position).collect::<Vec<_>>();
        let Some(&last) = previous.first() else {
            return Ok(candidate);
        };

        let distance_m = haversine_m(last, (lat, lon));
        if distance_m < self.config.duplicate_distance_m {
            return Err(Rejection::Duplicate { distance_m });
        }
        if distance_m > self.config.max_jump_m {
            return Err(Rejection::Jump { distance_m });
        }
        if let Some(&before) = previous.get(1) {
            if let Some(angle_deg) = turn_angle_deg(before, last, (lat, lon)) {
                if angle_deg > self.config.max_turn_angle_deg {
                    return Err(Rejection::ZigZag { angle_deg });
                }
            }
        }

        let w = self.config.smoothing_weight;
        candidate.latitude = Some(w * lat + (1.0 - w) * last.0);
        candidate.longitude = Some(w * lon + (1.0 - w) * last.1);
        Ok(candidate)
    }

    fn check_satellites(&self, satellites: u8, positioned: bool) -> Result<(), Rejection> {
        if satellites >= self.config.min_satellites {
            return Ok(());
        }
        if positioned && satellites >= self.config.relaxed_min_satellites {
            return Ok(());
        }
        let required = if positioned {
            self.config.relaxed_min_satellites
        } else {
            self.config.min_satellites
        };
        Err(Rejection::InsufficientSatellites { satellites, required })
    }
}
