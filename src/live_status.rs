use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tracker::{Tracker, TrackerEvent};

/// Periodic status file for whoever is watching the runner
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Provider counters
    pub gps_fixes: u64,
    pub ranging_samples: u64,
    pub frames: u64,
    pub session_events: u64,
    // Tracker state
    pub lifecycle: String,
    pub lifecycle_phrase: String,
    pub calibration_phase: String,
    pub calibration_accepted: u32,
    pub distance_m: Option<f64>,
    pub distance_text: String,
    pub direction: Option<String>,
    pub yaw_deg: Option<f64>,
    pub distance_source: Option<String>,
    pub direction_source: Option<String>,
    pub haptic_interval_secs: Option<f64>,
    pub access_required: bool,
    // Session supervision
    pub session_status: String,
    pub ranging_connected: bool,
    pub restart_requests: u32,
    // Event counters
    pub proximity_pulses: u64,
    pub pointing_pulses: u64,
    pub plausibility_faults: u64,
    pub arrived: bool,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self { timestamp: current_timestamp(), ..Self::default() }
    }

    /// Fold tracker events into the running counters
    pub fn record_events(&mut self, events: &[TrackerEvent]) {
        use crate::tracker::PulseKind;
        for event in events {
            match event {
                TrackerEvent::HapticPulse(PulseKind::Proximity) => self.proximity_pulses += 1,
                TrackerEvent::HapticPulse(PulseKind::Pointing) => self.pointing_pulses += 1,
                TrackerEvent::PlausibilityFault { .. } => self.plausibility_faults += 1,
                TrackerEvent::RestartRequested { .. } => self.restart_requests += 1,
                TrackerEvent::Arrived => self.arrived = true,
                _ => {}
            }
        }
    }

    /// Copy the tracker's current state into the status
    pub fn update_from(&mut self, tracker: &Tracker, uptime_seconds: u64) {
        let snapshot = tracker.get_snapshot();
        let output = tracker.output();

        self.timestamp = current_timestamp();
        self.uptime_seconds = uptime_seconds;
        self.lifecycle = format!("{:?}", snapshot.lifecycle);
        self.lifecycle_phrase = output.lifecycle_phrase;
        self.calibration_phase = format!("{:?}", snapshot.calibration_phase);
        self.calibration_accepted = snapshot.calibration_accepted;
        self.distance_m = snapshot.estimate.distance;
        self.distance_text = output.distance_text;
        self.direction = output.direction_phrase.map(|p| p.text());
        self.yaw_deg = snapshot.estimate.yaw_deg;
        self.distance_source = snapshot.last_distance_source.map(|s| format!("{s:?}"));
        self.direction_source = snapshot.last_direction_source.map(|s| format!("{s:?}"));
        self.haptic_interval_secs = snapshot.haptic_interval_secs;
        self.access_required = snapshot.access_required;
        self.session_status = snapshot.session_status_line;
        self.ranging_connected = tracker.supervisor().is_connected();
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
