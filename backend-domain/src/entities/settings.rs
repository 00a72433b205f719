// Detection settings entity
// Thresholds read once per ping evaluation

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Upstream location logger threshold; not read by detection.
    pub location_time_threshold_minutes: u32,
    /// Upstream location logger threshold; not read by detection.
    pub location_distance_threshold_meters: f64,
    pub visited_required_hits: u32,
    pub visited_min_radius_meters: f64,
    pub visited_max_radius_meters: f64,
    pub visited_accuracy_multiplier: f64,
    pub visited_accuracy_reject_meters: f64,
    pub visited_max_search_radius_meters: f64,
    pub visited_place_notes_snapshot_max_html_chars: usize,
    pub candidate_stale_minutes: u32,
    pub visit_stale_minutes: u32,
    pub visit_update_throttle_seconds: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            location_time_threshold_minutes: 5,
            location_distance_threshold_meters: 15.0,
            visited_required_hits: 2,
            visited_min_radius_meters: 35.0,
            visited_max_radius_meters: 100.0,
            visited_accuracy_multiplier: 2.0,
            visited_accuracy_reject_meters: 200.0,
            visited_max_search_radius_meters: 150.0,
            visited_place_notes_snapshot_max_html_chars: 4000,
            candidate_stale_minutes: 20,
            visit_stale_minutes: 60,
            visit_update_throttle_seconds: 300,
        }
    }
}

impl DetectionSettings {
    pub fn candidate_stale_window(&self) -> Duration {
        Duration::minutes(i64::from(self.candidate_stale_minutes))
    }

    pub fn visit_stale_window(&self) -> Duration {
        Duration::minutes(i64::from(self.visit_stale_minutes))
    }

    pub fn visit_update_throttle(&self) -> Duration {
        Duration::seconds(i64::from(self.visit_update_throttle_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        if self.visited_required_hits == 0 {
            return Err(anyhow!("visited_required_hits must be at least 1"));
        }
        let distances = [
            ("visited_min_radius_meters", self.visited_min_radius_meters),
            ("visited_max_radius_meters", self.visited_max_radius_meters),
            ("visited_accuracy_multiplier", self.visited_accuracy_multiplier),
            ("visited_accuracy_reject_meters", self.visited_accuracy_reject_meters),
            ("visited_max_search_radius_meters", self.visited_max_search_radius_meters),
            ("location_distance_threshold_meters", self.location_distance_threshold_meters),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{} must be a finite non-negative number", name));
            }
        }
        if self.visited_accuracy_multiplier == 0.0 {
            return Err(anyhow!("visited_accuracy_multiplier must be greater than 0"));
        }
        if self.visited_min_radius_meters > self.visited_max_radius_meters {
            return Err(anyhow!(
                "visited_min_radius_meters ({}) exceeds visited_max_radius_meters ({})",
                self.visited_min_radius_meters,
                self.visited_max_radius_meters
            ));
        }
        if self.visited_max_search_radius_meters < self.visited_max_radius_meters {
            return Err(anyhow!(
                "visited_max_search_radius_meters must cover visited_max_radius_meters"
            ));
        }
        if self.candidate_stale_minutes == 0 || self.visit_stale_minutes == 0 {
            return Err(anyhow!("staleness windows must be at least one minute"));
        }
        Ok(())
    }

    fn apply(&mut self, patch: &DetectionSettingsOverride) {
        if let Some(value) = patch.location_time_threshold_minutes {
            self.location_time_threshold_minutes = value;
        }
        if let Some(value) = patch.location_distance_threshold_meters {
            self.location_distance_threshold_meters = value;
        }
        if let Some(value) = patch.visited_required_hits {
            self.visited_required_hits = value;
        }
        if let Some(value) = patch.visited_min_radius_meters {
            self.visited_min_radius_meters = value;
        }
        if let Some(value) = patch.visited_max_radius_meters {
            self.visited_max_radius_meters = value;
        }
        if let Some(value) = patch.visited_accuracy_multiplier {
            self.visited_accuracy_multiplier = value;
        }
        if let Some(value) = patch.visited_accuracy_reject_meters {
            self.visited_accuracy_reject_meters = value;
        }
        if let Some(value) = patch.visited_max_search_radius_meters {
            self.visited_max_search_radius_meters = value;
        }
        if let Some(value) = patch.visited_place_notes_snapshot_max_html_chars {
            self.visited_place_notes_snapshot_max_html_chars = value;
        }
        if let Some(value) = patch.candidate_stale_minutes {
            self.candidate_stale_minutes = value;
        }
        if let Some(value) = patch.visit_stale_minutes {
            self.visit_stale_minutes = value;
        }
        if let Some(value) = patch.visit_update_throttle_seconds {
            self.visit_update_throttle_seconds = value;
        }
    }
}

/// Per-user partial settings layered over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettingsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_time_threshold_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_distance_threshold_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_required_hits: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_min_radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_max_radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_accuracy_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_accuracy_reject_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_max_search_radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_place_notes_snapshot_max_html_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_stale_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_stale_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_update_throttle_seconds: Option<u32>,
}

/// Persisted settings document: global defaults plus per-user overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettingsDocument {
    pub defaults: DetectionSettings,
    pub overrides: HashMap<String, DetectionSettingsOverride>,
}

impl DetectionSettingsDocument {
    /// Effective settings for one user. An override that would produce an
    /// invalid combination is ignored in favour of the defaults.
    pub fn resolve(&self, user_id: &str) -> DetectionSettings {
        let Some(patch) = self.overrides.get(user_id) else {
            return self.defaults.clone();
        };
        let mut merged = self.defaults.clone();
        merged.apply(patch);
        if merged.validate().is_err() {
            return self.defaults.clone();
        }
        merged
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        for user_id in self.overrides.keys() {
            let mut merged = self.defaults.clone();
            if let Some(patch) = self.overrides.get(user_id) {
                merged.apply(patch);
            }
            merged
                .validate()
                .map_err(|err| anyhow!("override for '{}': {}", user_id, err))?;
        }
        Ok(())
    }
}
