// REST payloads for the realtime control endpoints

use greensort_core::{StabilizerConfig, WasteClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Process-wide counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub sessions_opened: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_rejected: u64,
    pub confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub adapter: String,
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub classes: Vec<WasteClass>,
    pub default_threshold: f32,
    pub threshold_per_class: BTreeMap<WasteClass, f32>,
    pub streak_target: u32,
    pub miss_budget: u32,
    pub grace_period_ms: u64,
    pub totals: MetricTotals,
}

/// Threshold changes; applies to sessions opened afterwards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_per_class: Option<BTreeMap<WasteClass, f32>>,
}

impl ConfigUpdate {
    pub fn validate(&self) -> Result<(), String> {
        let check = |name: &str, v: f32| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{} must be between 0 and 1 (got {})", name, v))
            }
        };

        if let Some(t) = self.default_threshold {
            check("default_threshold", t)?;
        }
        if let Some(map) = &self.threshold_per_class {
            for (class, t) in map {
                check(class.as_str(), *t)?;
            }
        }
        if self.default_threshold.is_none() && self.threshold_per_class.is_none() {
            return Err("no thresholds given".to_string());
        }
        Ok(())
    }

    /// Merge into a stabilizer config; per-class entries are upserted
    pub fn apply_to(&self, config: &mut StabilizerConfig) {
        if let Some(t) = self.default_threshold {
            config.default_threshold = t;
        }
        if let Some(map) = &self.threshold_per_class {
            for (class, t) in map {
                config.threshold_per_class.insert(*class, *t);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdateResponse {
    pub default_threshold: f32,
    pub threshold_per_class: BTreeMap<WasteClass, f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Live sessions asked to restart
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_update_validation() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"threshold_per_class": {"battery": 0.9}}"#).unwrap();
        assert!(update.validate().is_ok());

        let bad: ConfigUpdate = serde_json::from_str(r#"{"default_threshold": 1.2}"#).unwrap();
        assert!(bad.validate().is_err());

        assert!(ConfigUpdate::default().validate().is_err());
        assert!(serde_json::from_str::<ConfigUpdate>(r#"{"threshold_per_class": {"styrofoam": 0.5}}"#).is_err());
    }

    #[test]
    fn test_config_update_apply() {
        let mut config = StabilizerConfig::default();
        let update = ConfigUpdate {
            default_threshold: Some(0.5),
            threshold_per_class: Some(BTreeMap::from([(WasteClass::Glass, 0.7)])),
        };
        update.apply_to(&mut config);
        assert_eq!(config.threshold_for(WasteClass::Paper), 0.5);
        assert_eq!(config.threshold_for(WasteClass::Glass), 0.7);
        assert_eq!(config.threshold_for(WasteClass::Battery), 0.85);
    }
}
