use monorange_core::GroundGeometry;
use serde::{Deserialize, Serialize};

use crate::{AlertConfig, AlertMachine, DistanceConfig, GroundPlaneEstimator};

/// Settings of an online monitor session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub distance: DistanceConfig,
    pub alert: AlertConfig,
}

impl MonitorConfig {
    pub fn estimator(&self, geometry: GroundGeometry) -> GroundPlaneEstimator {
        GroundPlaneEstimator::new(geometry, self.distance)
    }

    pub fn alert_machine(&self) -> AlertMachine {
        AlertMachine::new(self.alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sections_default_independently() {
        let cfg: MonitorConfig =
            serde_json::from_str(r#"{"alert": {"min_interval_s": 1.5}}"#).unwrap();
        assert_eq!(cfg.alert.min_interval_s, Some(1.5));
        assert_eq!(cfg.distance, DistanceConfig::default());
    }
}
