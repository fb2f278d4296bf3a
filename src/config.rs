use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Directional phrase table used for the spoken/displayed direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseMode {
    /// 8 sectors: ahead / slightly left-right / left-right / behind left-right / behind
    #[default]
    Sides,
    /// 12 sectors on a clock face
    Clock,
}

/// Who is holding the phone
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorMode {
    /// Pedestrian being guided: haptics and audio cues enabled
    #[default]
    User,
    /// Display-only guidance, no haptic pulses or audio cues
    Driver,
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Distance thresholds (meters) ──
    pub close_range_m: f64,
    pub within_one_foot_m: f64,
    pub arrival_epsilon_m: f64,

    // ── Calibration ──
    pub calibration_samples: u32,
    pub calibration_initial_threshold_deg: f64,
    pub calibration_step_deg: f64,
    pub calibration_min_threshold_deg: f64,

    // ── Direction validity once locked ──
    pub tracking_azimuth_gate_deg: f64,
    pub tracking_elevation_gate_deg: f64,

    // ── Plausibility ──
    pub flip_threshold_deg: f64,
    pub pointing_threshold_deg: f64,

    // ── Haptics ──
    pub haptic_tick_secs: f64,
    pub haptic_bands: u32,

    // ── AR light estimate ──
    pub min_ambient_intensity: f64,

    // ── Ranging session retry ──
    pub retry_base_secs: f64,
    pub retry_backoff: f64,
    pub retry_cap_secs: f64,
    pub retry_max_attempts: u32,

    // ── Output ──
    pub phrase_mode: PhraseMode,
    pub operator_mode: OperatorMode,

    // ── Feature flags ──
    pub ranging_enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            close_range_m: 2.0 / 3.0,
            within_one_foot_m: 1.0 / 3.0,
            arrival_epsilon_m: 0.03,
            calibration_samples: 3,
            calibration_initial_threshold_deg: 90.0,
            calibration_step_deg: 22.5,
            calibration_min_threshold_deg: 22.5,
            tracking_azimuth_gate_deg: 60.0,
            tracking_elevation_gate_deg: 60.0,
            flip_threshold_deg: 15.0,
            pointing_threshold_deg: 10.0,
            haptic_tick_secs: 0.01,
            haptic_bands: 8,
            min_ambient_intensity: 100.0,
            retry_base_secs: 2.0,
            retry_backoff: 1.5,
            retry_cap_secs: 30.0,
            retry_max_attempts: 10,
            phrase_mode: PhraseMode::Sides,
            operator_mode: OperatorMode::User,
            ranging_enabled: true,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("close_range_m", self.close_range_m),
            ("within_one_foot_m", self.within_one_foot_m),
            ("calibration_initial_threshold_deg", self.calibration_initial_threshold_deg),
            ("calibration_min_threshold_deg", self.calibration_min_threshold_deg),
            ("tracking_azimuth_gate_deg", self.tracking_azimuth_gate_deg),
            ("tracking_elevation_gate_deg", self.tracking_elevation_gate_deg),
            ("flip_threshold_deg", self.flip_threshold_deg),
            ("haptic_tick_secs", self.haptic_tick_secs),
            ("retry_base_secs", self.retry_base_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackerError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("arrival_epsilon_m", self.arrival_epsilon_m),
            ("min_ambient_intensity", self.min_ambient_intensity),
            ("pointing_threshold_deg", self.pointing_threshold_deg),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(TrackerError::InvalidConfig(format!("{name} must not be negative, got {value}")));
            }
        }
        if self.calibration_samples == 0 {
            return Err(TrackerError::InvalidConfig("calibration_samples must be at least 1".into()));
        }
        if self.haptic_bands == 0 {
            return Err(TrackerError::InvalidConfig("haptic_bands must be at least 1".into()));
        }
        if !(self.retry_backoff.is_finite() && self.retry_backoff >= 1.0) {
            return Err(TrackerError::InvalidConfig("retry_backoff must be >= 1.0".into()));
        }
        if !(self.retry_cap_secs.is_finite() && self.retry_cap_secs >= self.retry_base_secs) {
            return Err(TrackerError::InvalidConfig(format!(
                "retry_cap_secs ({}) must not be below retry_base_secs ({})",
                self.retry_cap_secs, self.retry_base_secs
            )));
        }
        if self.within_one_foot_m > self.close_range_m {
            return Err(TrackerError::InvalidConfig(
                "within_one_foot_m must not exceed close_range_m".into(),
            ));
        }
        Ok(())
    }

    /// Slowest proximity pulse interval, reached at the close-range boundary
    pub fn max_haptic_interval(&self) -> f64 {
        self.haptic_tick_secs * self.haptic_bands as f64
    }
}
