// tracker.rs — Single-owner fusion and guidance state machine
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - where provider events come from (live device bridge, recorded session, simulator)
//   - file I/O and status reporting
//
// Typed provider events go in through `handle`, time goes in through `advance`, and
// discrete `TrackerEvent`s come out. `output()` renders the current guidance on demand.

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationGate, CalibrationPhase, CalibrationStep};
use crate::config::{OperatorMode, TrackerConfig};
use crate::direction_frame::to_azimuth_elevation;
use crate::estimator::{
    DirectionResolution, DistanceResolution, EstimatorInput, EstimatorUpdate, TargetEstimate, TargetEstimator,
};
use crate::geo_bearing;
use crate::guidance::{haptic_interval, AudioCue, GuidanceOutput, GuidanceSignal, LifecycleState};
use crate::haptics::HapticPulser;
use crate::plausibility::PlausibilityFilter;
use crate::session::{RangingSupervisor, SessionEvent, SessionStatus, SupervisorAction};
use crate::types::{CameraPose, FrameSample, GeoPoint, GpsFix, RangingSample};

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    Gps(GpsFix),
    Heading { true_heading: f64 },
    Ranging(RangingSample),
    Frame(FrameSample),
    Session(SessionEvent),
    /// AR tracking origin moved to `pose`, expressed in the previous world frame
    WorldOriginReset { pose: CameraPose },
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseKind {
    /// Continuous close-range buzz
    Proximity,
    /// One-shot cue when the user sweeps onto the target axis
    Pointing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackerEvent {
    HapticPulse(PulseKind),
    AudioCue(AudioCue),
    CalibrationProgress { accepted: u32, threshold_deg: f64 },
    CalibrationLocked,
    PlausibilityFault { previous_deg: f64, rejected_deg: f64 },
    RestartRequested { attempt: u32 },
    RetriesExhausted,
    AccessRequired,
    Arrived,
    LifecycleChanged { from: LifecycleState, to: LifecycleState },
    SessionReset,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct TrackerSnapshot {
    pub lifecycle: LifecycleState,
    pub calibration_phase: CalibrationPhase,
    pub calibration_accepted: u32,
    pub calibration_threshold_deg: f64,
    pub estimate: TargetEstimate,
    pub last_distance_source: Option<DistanceResolution>,
    pub last_direction_source: Option<DirectionResolution>,
    pub session_status: SessionStatus,
    pub session_status_line: String,
    pub haptic_interval_secs: Option<f64>,
    pub access_required: bool,
}

// ─── The tracker ─────────────────────────────────────────────────────────────

pub struct Tracker {
    config: TrackerConfig,

    gate: CalibrationGate,
    estimator: TargetEstimator,
    guidance: GuidanceSignal,
    pulser: HapticPulser,
    supervisor: RangingSupervisor,

    // Latest provider inputs
    destination: Option<GeoPoint>,
    location: Option<GeoPoint>,
    true_heading: Option<f64>,
    camera: Option<CameraPose>,
    ambient_intensity: Option<f64>,

    // GPS-only guidance
    gps_distance: Option<f64>,
    gps_yaw_deg: Option<f64>,
    gps_filter: PlausibilityFilter,

    // Output state
    lifecycle: LifecycleState,
    last_cue: Option<AudioCue>,
    last_update: Option<EstimatorUpdate>,
    access_required: bool,
}

impl Tracker {
    pub fn new(config: TrackerConfig, destination: Option<GeoPoint>) -> Self {
        Self {
            gate: CalibrationGate::new(&config),
            estimator: TargetEstimator::new(&config),
            guidance: GuidanceSignal::new(&config),
            pulser: HapticPulser::new(config.haptic_tick_secs),
            supervisor: RangingSupervisor::new(&config),
            gps_filter: PlausibilityFilter::new(&config),
            destination,
            location: None,
            true_heading: None,
            camera: None,
            ambient_intensity: None,
            gps_distance: None,
            gps_yaw_deg: None,
            lifecycle: LifecycleState::Searching,
            last_cue: None,
            last_update: None,
            access_required: false,
            config,
        }
    }

    pub fn set_destination(&mut self, destination: GeoPoint) {
        self.destination = Some(destination);
    }

    /// Single update entry point for provider callbacks
    pub fn handle(&mut self, event: &ProviderEvent) -> Vec<TrackerEvent> {
        match event {
            ProviderEvent::Gps(fix) => self.feed_gps(fix),
            ProviderEvent::Heading { true_heading } => self.feed_heading(*true_heading),
            ProviderEvent::Ranging(sample) => self.feed_ranging(sample),
            ProviderEvent::Frame(frame) => self.feed_frame(frame),
            ProviderEvent::Session(session) => self.feed_session(session),
            ProviderEvent::WorldOriginReset { pose } => {
                self.estimator.rebase(pose);
                Vec::new()
            }
        }
    }

    // ── Location / compass ───────────────────────────────────────────────

    pub fn feed_gps(&mut self, fix: &GpsFix) -> Vec<TrackerEvent> {
        self.location = Some(fix.location);
        if let Some(heading) = fix.true_heading {
            self.true_heading = Some(heading);
        }
        self.after_location_update()
    }

    pub fn feed_heading(&mut self, true_heading: f64) -> Vec<TrackerEvent> {
        self.true_heading = Some(true_heading);
        self.after_location_update()
    }

    fn after_location_update(&mut self) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if self.config.ranging_enabled {
            // Consumed as the direction fallback on the next ranging or frame tick
            return events;
        }

        self.gps_distance = match (self.location, self.destination) {
            (Some(location), Some(destination)) => Some(geo_bearing::distance(&location, &destination)),
            _ => None,
        };
        self.gps_yaw_deg = self.gps_bearing();
        if let Some(yaw) = self.gps_yaw_deg {
            if self.gps_filter.observe_pointing(yaw, self.gps_distance) {
                self.push_pulse(&mut events, PulseKind::Pointing);
            }
        }
        self.refresh(&mut events);
        events
    }

    /// Compass-corrected bearing to the destination, camera-relative degrees
    fn gps_bearing(&self) -> Option<f64> {
        match (self.location, self.destination, self.true_heading) {
            (Some(location), Some(destination), Some(heading)) => {
                Some(geo_bearing::relative_bearing(&location, &destination, heading))
            }
            _ => None,
        }
    }

    // ── Ranging ──────────────────────────────────────────────────────────

    pub fn feed_ranging(&mut self, sample: &RangingSample) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if !self.config.ranging_enabled {
            log::debug!("Ranging sample ignored in GPS-only mode");
            return events;
        }

        if self.gate.phase() == CalibrationPhase::Calibrating {
            let angles = sample.direction.as_ref().map(to_azimuth_elevation);
            match self.gate.observe(angles.as_ref()) {
                CalibrationStep::Accepted { accepted, threshold_deg } => {
                    events.push(TrackerEvent::CalibrationProgress { accepted, threshold_deg });
                }
                CalibrationStep::Rejected { threshold_deg } => {
                    events.push(TrackerEvent::CalibrationProgress { accepted: 0, threshold_deg });
                }
                CalibrationStep::Locked => events.push(TrackerEvent::CalibrationLocked),
                CalibrationStep::Ignored => {}
            }
        }

        self.run_estimator(Some(sample), &mut events);
        self.refresh(&mut events);
        events
    }

    // ── AR frames ────────────────────────────────────────────────────────

    pub fn feed_frame(&mut self, frame: &FrameSample) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        self.camera = Some(frame.pose);
        self.ambient_intensity = frame.ambient_intensity;

        if self.config.ranging_enabled {
            self.run_estimator(None, &mut events);
        }
        self.refresh(&mut events);
        events
    }

    fn run_estimator(&mut self, ranging: Option<&RangingSample>, events: &mut Vec<TrackerEvent>) {
        let input = EstimatorInput { ranging, camera: self.camera.as_ref(), gps_yaw_deg: self.gps_bearing() };
        let update = self.estimator.update(&self.gate, input);

        if let DirectionResolution::Rejected { previous_deg, rejected_deg } = update.direction {
            events.push(TrackerEvent::PlausibilityFault { previous_deg, rejected_deg });
            self.gate.reset_after_fault();
            self.pulser.stop();
            let actions = self.supervisor.request_restart();
            self.push_actions(events, actions);
        }
        if update.pointing {
            self.push_pulse(events, PulseKind::Pointing);
        }
        if update.arrived {
            events.push(TrackerEvent::Arrived);
        }
        self.last_update = Some(update);
    }

    // ── Session lifecycle ────────────────────────────────────────────────

    pub fn feed_session(&mut self, session: &SessionEvent) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if !self.config.ranging_enabled {
            return events;
        }

        let actions = self.supervisor.handle(session);
        match session {
            SessionEvent::Connected => {
                self.access_required = false;
                self.gate.connect();
                self.push_cue(&mut events, AudioCue::Connected);
            }
            SessionEvent::Disconnected { .. } | SessionEvent::Cancelled | SessionEvent::Invalidated { .. } => {
                self.teardown(&mut events);
            }
            SessionEvent::PermissionDenied => {
                self.teardown(&mut events);
                self.access_required = true;
            }
            SessionEvent::Suspended | SessionEvent::Resumed => {}
        }
        self.push_actions(&mut events, actions);
        self.refresh(&mut events);
        events
    }

    /// Discard all per-session state so nothing leaks into the next session
    fn teardown(&mut self, events: &mut Vec<TrackerEvent>) {
        self.gate.disconnect();
        self.estimator.reset();
        self.pulser.stop();
        self.last_update = None;
        events.push(TrackerEvent::SessionReset);
        self.push_cue(events, AudioCue::Disconnected);
    }

    fn push_actions(&mut self, events: &mut Vec<TrackerEvent>, actions: Vec<SupervisorAction>) {
        for action in actions {
            events.push(match action {
                SupervisorAction::RestartRequested { attempt } => TrackerEvent::RestartRequested { attempt },
                SupervisorAction::RetriesExhausted => TrackerEvent::RetriesExhausted,
                SupervisorAction::AccessRequired => {
                    self.access_required = true;
                    TrackerEvent::AccessRequired
                }
            });
        }
    }

    // ── Periodic tick ────────────────────────────────────────────────────

    /// Advance the haptic and retry timers by `dt` seconds
    pub fn advance(&mut self, dt: f64) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        for _ in 0..self.pulser.advance(dt) {
            self.push_pulse(&mut events, PulseKind::Proximity);
        }
        let actions = self.supervisor.advance(dt);
        self.push_actions(&mut events, actions);
        events
    }

    // ── Output ───────────────────────────────────────────────────────────

    fn fused(&self) -> (Option<f64>, Option<f64>) {
        if self.config.ranging_enabled {
            let estimate = self.estimator.estimate();
            (estimate.distance, estimate.yaw_deg)
        } else {
            (self.gps_distance, self.gps_yaw_deg)
        }
    }

    fn compute_lifecycle(&self) -> LifecycleState {
        if !self.config.ranging_enabled {
            return if self.gps_distance.is_some() { LifecycleState::Tracking } else { LifecycleState::Searching };
        }

        let low_light = self.ambient_intensity.is_some_and(|lux| lux < self.config.min_ambient_intensity);
        if self.estimator.estimate().arrived() {
            LifecycleState::Arrived
        } else if self.gate.phase() == CalibrationPhase::Searching {
            LifecycleState::Searching
        } else if low_light {
            LifecycleState::LightTooLow
        } else if !self.gate.is_locked() {
            LifecycleState::Calibrating
        } else {
            LifecycleState::Tracking
        }
    }

    fn refresh(&mut self, events: &mut Vec<TrackerEvent>) {
        let next = self.compute_lifecycle();
        if next != self.lifecycle {
            log::info!("Lifecycle {:?} -> {:?}", self.lifecycle, next);
            events.push(TrackerEvent::LifecycleChanged { from: self.lifecycle, to: next });
            self.lifecycle = next;
        }
        self.push_cue(events, next.audio_cue());

        let interval = match (next, self.fused().0) {
            (LifecycleState::Tracking, Some(distance)) if self.haptics_enabled() => haptic_interval(distance, &self.config),
            _ => None,
        };
        self.pulser.set_interval(interval);
    }

    fn haptics_enabled(&self) -> bool {
        self.config.operator_mode == OperatorMode::User
    }

    fn push_pulse(&self, events: &mut Vec<TrackerEvent>, kind: PulseKind) {
        if self.haptics_enabled() {
            events.push(TrackerEvent::HapticPulse(kind));
        }
    }

    /// Only index transitions are reported
    fn push_cue(&mut self, events: &mut Vec<TrackerEvent>, cue: AudioCue) {
        if self.last_cue == Some(cue) {
            return;
        }
        self.last_cue = Some(cue);
        if self.haptics_enabled() {
            events.push(TrackerEvent::AudioCue(cue));
        }
    }

    pub fn output(&self) -> GuidanceOutput {
        let (distance, yaw) = self.fused();
        let mut output = self.guidance.render(self.lifecycle, distance, yaw);
        output.access_required = self.access_required;
        output
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn estimate(&self) -> &TargetEstimate {
        self.estimator.estimate()
    }

    pub fn calibration(&self) -> &CalibrationGate {
        &self.gate
    }

    pub fn supervisor(&self) -> &RangingSupervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn get_snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            lifecycle: self.lifecycle,
            calibration_phase: self.gate.phase(),
            calibration_accepted: self.gate.consecutive_valid(),
            calibration_threshold_deg: self.gate.threshold_deg(),
            estimate: self.estimator.estimate().clone(),
            last_distance_source: self.last_update.map(|u| u.distance),
            last_direction_source: self.last_update.map(|u| u.direction),
            session_status: self.supervisor.status(),
            session_status_line: self.supervisor.status_line(),
            haptic_interval_secs: self.pulser.interval(),
            access_required: self.access_required,
        }
    }
}
