//! Calibration gate: withholds fused output until the ranging sensor has produced
//! enough consecutive plausible directions.
//!
//! Searching → Calibrating (peer connected) → Locked (N consecutive samples inside a
//! threshold that tightens after every accepted sample). A plausibility fault drops
//! back to Calibrating with the threshold and counter reinitialised.

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::direction_frame::AzEl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPhase {
    /// No accessory or peer connected yet
    Searching,
    /// Collecting consecutive valid direction samples
    Calibrating,
    /// Fused output trusted
    Locked,
}

/// Outcome of offering one ranging direction to the gate
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationStep {
    /// Not calibrating (searching or already locked), or the tick carried no direction
    Ignored,
    /// Sample inside the current threshold; threshold tightened
    Accepted { accepted: u32, threshold_deg: f64 },
    /// Sample outside the threshold; streak restarted
    Rejected { threshold_deg: f64 },
    /// This sample completed the streak
    Locked,
}

#[derive(Clone, Debug)]
pub struct CalibrationGate {
    phase: CalibrationPhase,
    consecutive_valid: u32,
    threshold_deg: f64,

    required_samples: u32,
    initial_threshold_deg: f64,
    step_deg: f64,
    min_threshold_deg: f64,
    tracking_gate: (f64, f64),
}

impl CalibrationGate {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            phase: CalibrationPhase::Searching,
            consecutive_valid: 0,
            threshold_deg: config.calibration_initial_threshold_deg,
            required_samples: config.calibration_samples,
            initial_threshold_deg: config.calibration_initial_threshold_deg,
            step_deg: config.calibration_step_deg,
            min_threshold_deg: config.calibration_min_threshold_deg,
            tracking_gate: (config.tracking_azimuth_gate_deg, config.tracking_elevation_gate_deg),
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.phase == CalibrationPhase::Locked
    }

    pub fn consecutive_valid(&self) -> u32 {
        self.consecutive_valid
    }

    pub fn threshold_deg(&self) -> f64 {
        self.threshold_deg
    }

    /// Peer/accessory connected: start collecting samples
    pub fn connect(&mut self) {
        if self.phase == CalibrationPhase::Searching {
            self.restart_streak();
            self.phase = CalibrationPhase::Calibrating;
        }
    }

    /// Session torn down: back to searching with everything reinitialised
    pub fn disconnect(&mut self) {
        self.restart_streak();
        self.phase = CalibrationPhase::Searching;
    }

    /// Plausibility fault: drop the lock and recalibrate from the initial threshold
    pub fn reset_after_fault(&mut self) {
        self.restart_streak();
        if self.phase != CalibrationPhase::Searching {
            self.phase = CalibrationPhase::Calibrating;
        }
    }

    /// Azimuth/elevation limits (degrees) a ranging direction must satisfy right now
    pub fn gate_limits(&self) -> (f64, f64) {
        match self.phase {
            CalibrationPhase::Locked => self.tracking_gate,
            _ => (self.threshold_deg, self.threshold_deg),
        }
    }

    /// Whether a direction passes the validity gate for the current phase
    pub fn accepts(&self, angles: &AzEl) -> bool {
        let (azimuth_limit, elevation_limit) = self.gate_limits();
        angles.within(azimuth_limit, elevation_limit)
    }

    /// Offer a ranging direction while calibrating
    pub fn observe(&mut self, angles: Option<&AzEl>) -> CalibrationStep {
        if self.phase != CalibrationPhase::Calibrating {
            return CalibrationStep::Ignored;
        }
        let Some(angles) = angles else {
            return CalibrationStep::Ignored;
        };

        if !self.accepts(angles) {
            self.restart_streak();
            return CalibrationStep::Rejected { threshold_deg: self.threshold_deg };
        }

        self.consecutive_valid += 1;
        self.threshold_deg = (self.threshold_deg - self.step_deg).max(self.min_threshold_deg);

        if self.consecutive_valid >= self.required_samples {
            self.phase = CalibrationPhase::Locked;
            log::info!(
                "Calibration locked after {} consecutive samples (threshold {:.1}°)",
                self.consecutive_valid,
                self.threshold_deg
            );
            return CalibrationStep::Locked;
        }

        CalibrationStep::Accepted { accepted: self.consecutive_valid, threshold_deg: self.threshold_deg }
    }

    fn restart_streak(&mut self) {
        self.consecutive_valid = 0;
        self.threshold_deg = self.initial_threshold_deg;
    }
}
