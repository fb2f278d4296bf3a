//! User-facing guidance: distance text, direction phrase, haptic cadence and audio cue selection.
//!
//! Everything here is a pure function of the lifecycle state and the fused distance / yaw.

use serde::{Deserialize, Serialize};

use crate::config::{PhraseMode, TrackerConfig};

pub const FEET_PER_METER: f64 = 3.280839895;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Searching,
    Calibrating,
    LightTooLow,
    Tracking,
    Arrived,
}

impl LifecycleState {
    pub fn phrase(&self) -> &'static str {
        match self {
            LifecycleState::Searching => "Searching for car",
            LifecycleState::Calibrating => "Calibrating, rotate in place",
            LifecycleState::LightTooLow => "Light too low",
            LifecycleState::Tracking => "Tracking",
            LifecycleState::Arrived => "Arrived at car",
        }
    }

    /// Cue spoken on entering this state; tracking itself is silent
    pub fn audio_cue(&self) -> AudioCue {
        match self {
            LifecycleState::Searching => AudioCue::Searching,
            LifecycleState::LightTooLow => AudioCue::LightTooLow,
            LifecycleState::Calibrating => AudioCue::Calibrating,
            LifecycleState::Tracking | LifecycleState::Arrived => AudioCue::Silent,
        }
    }
}

/// Audio cue selector. Utterance text is mapped by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    Searching,
    LightTooLow,
    Calibrating,
    Connected,
    Disconnected,
    Silent,
}

impl AudioCue {
    pub fn index(&self) -> u8 {
        match self {
            AudioCue::Searching => 0,
            AudioCue::LightTooLow => 1,
            AudioCue::Calibrating => 2,
            AudioCue::Connected => 3,
            AudioCue::Disconnected => 4,
            AudioCue::Silent => 5,
        }
    }
}

/// Three-part phrase, e.g. ("at", "2", "o'clock") or ("slightly", "right", "")
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionPhrase {
    pub prefix: String,
    pub value: String,
    pub suffix: String,
}

impl DirectionPhrase {
    fn new(prefix: &str, value: &str, suffix: &str) -> Self {
        Self { prefix: prefix.to_string(), value: value.to_string(), suffix: suffix.to_string() }
    }

    pub fn text(&self) -> String {
        [self.prefix.as_str(), self.value.as_str(), self.suffix.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 8 sectors biased toward left/right, boundaries inclusive on the ahead side
pub fn side_phrase(degrees: f64) -> DirectionPhrase {
    let side = if degrees < 0.0 { "left" } else { "right" };
    match degrees.abs() {
        a if a <= 15.0 => DirectionPhrase::new("", "straight ahead", ""),
        a if a <= 45.0 => DirectionPhrase::new("slightly", side, ""),
        a if a <= 105.0 => DirectionPhrase::new("to the", side, ""),
        a if a <= 165.0 => DirectionPhrase::new("behind", side, ""),
        _ => DirectionPhrase::new("", "behind", ""),
    }
}

/// 12 sectors on a clock face, 12 o'clock straight ahead
pub fn clock_phrase(degrees: f64) -> DirectionPhrase {
    let hour = if (-15.0..=15.0).contains(&degrees) {
        12
    } else if degrees > 15.0 && degrees <= 165.0 {
        // (15, 45] → 1 ... (135, 165] → 5
        ((degrees - 15.0) / 30.0).ceil() as i32
    } else if (-165.0..-15.0).contains(&degrees) {
        // [-45, -15) → 11 ... [-165, -135) → 7
        12 - ((-degrees - 15.0) / 30.0).ceil() as i32
    } else {
        6
    };
    DirectionPhrase::new("at", &hour.to_string(), "o'clock")
}

pub fn direction_phrase(mode: PhraseMode, degrees: f64) -> DirectionPhrase {
    match mode {
        PhraseMode::Sides => side_phrase(degrees),
        PhraseMode::Clock => clock_phrase(degrees),
    }
}

/// Displayed feet: truncated to 10 ft steps from 100 ft, 5 ft steps from 30 ft
pub fn display_feet(distance_m: f64) -> f64 {
    let feet = distance_m * FEET_PER_METER;
    if feet >= 100.0 {
        (feet / 10.0).trunc() * 10.0
    } else if feet >= 30.0 {
        (feet / 5.0).trunc() * 5.0
    } else {
        feet
    }
}

/// Proximity pulse interval: `tick * ceil(bands * d / close_range)`, clamped to
/// `[tick, tick * bands]`; `None` outside close range.
pub fn haptic_interval(distance_m: f64, config: &TrackerConfig) -> Option<f64> {
    if !(distance_m < config.close_range_m) {
        return None;
    }
    let bands = config.haptic_bands as f64;
    let steps = (bands * distance_m.max(0.0) / config.close_range_m).ceil().max(1.0);
    Some((config.haptic_tick_secs * steps).min(config.max_haptic_interval()))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuidanceOutput {
    pub lifecycle: LifecycleState,
    pub lifecycle_phrase: String,
    pub distance_feet: Option<f64>,
    pub distance_text: String,
    pub direction_phrase: Option<DirectionPhrase>,
    /// Arrow rotation; hidden while the proximity circle is shown
    pub arrow_rotation_deg: Option<f64>,
    /// Proximity circle size factor, only inside close range
    pub proximity_scale: Option<f64>,
    pub haptic_interval_secs: Option<f64>,
    pub access_required: bool,
}

impl GuidanceOutput {
    fn short_circuit(state: LifecycleState) -> Self {
        Self {
            lifecycle: state,
            lifecycle_phrase: state.phrase().to_string(),
            distance_feet: if state == LifecycleState::Arrived { Some(0.0) } else { None },
            distance_text: if state == LifecycleState::Arrived {
                state.phrase().to_string()
            } else {
                "-.-- ft".to_string()
            },
            direction_phrase: None,
            arrow_rotation_deg: None,
            proximity_scale: None,
            haptic_interval_secs: None,
            access_required: false,
        }
    }
}

pub struct GuidanceSignal {
    config: TrackerConfig,
}

impl GuidanceSignal {
    pub fn new(config: &TrackerConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn distance_text(&self, distance_m: Option<f64>) -> String {
        let Some(d) = distance_m else {
            return "-.-- ft".to_string();
        };
        let feet = display_feet(d);
        if d < self.config.within_one_foot_m {
            "Within 1 foot".to_string()
        } else if d < self.config.close_range_m {
            format!("{feet:.1} ft nearby")
        } else {
            format!("{} ft", feet.trunc() as i64)
        }
    }

    pub fn proximity_scale(&self, distance_m: f64) -> Option<f64> {
        if distance_m < self.config.within_one_foot_m {
            Some(0.5)
        } else if distance_m < self.config.close_range_m {
            Some(distance_m / self.config.close_range_m / 2.0 + 0.5)
        } else {
            None
        }
    }

    pub fn render(&self, state: LifecycleState, distance_m: Option<f64>, yaw_deg: Option<f64>) -> GuidanceOutput {
        if state != LifecycleState::Tracking {
            return GuidanceOutput::short_circuit(state);
        }

        let proximity_scale = distance_m.and_then(|d| self.proximity_scale(d));
        let in_close_range = proximity_scale.is_some();
        let direction_phrase = if in_close_range {
            None
        } else {
            yaw_deg.map(|yaw| direction_phrase(self.config.phrase_mode, yaw))
        };

        GuidanceOutput {
            lifecycle: state,
            lifecycle_phrase: state.phrase().to_string(),
            distance_feet: distance_m.map(|d| d * FEET_PER_METER),
            distance_text: self.distance_text(distance_m),
            direction_phrase,
            arrow_rotation_deg: if in_close_range { None } else { yaw_deg },
            proximity_scale,
            haptic_interval_secs: distance_m.and_then(|d| haptic_interval(d, &self.config)),
            access_required: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn signal() -> GuidanceSignal {
        GuidanceSignal::new(&TrackerConfig::default())
    }

    #[test]
    fn test_two_meters_straight_ahead() {
        let out = signal().render(LifecycleState::Tracking, Some(2.0), Some(0.0));
        assert_eq!(out.distance_text, "6 ft");
        assert_eq!(out.direction_phrase.unwrap().text(), "straight ahead");
        assert_eq!(out.arrow_rotation_deg, Some(0.0));
        assert!(out.haptic_interval_secs.is_none());
    }

    #[test]
    fn test_distance_text_rules() {
        let s = signal();
        assert_eq!(s.distance_text(None), "-.-- ft");
        assert_eq!(s.distance_text(Some(0.2)), "Within 1 foot");
        assert_eq!(s.distance_text(Some(0.5)), "1.6 ft nearby");
        // 12 m = 39.37 ft → 35
        assert_eq!(s.distance_text(Some(12.0)), "35 ft");
        // 40 m = 131.2 ft → 130
        assert_eq!(s.distance_text(Some(40.0)), "130 ft");
        // 8 m = 26.2 ft, no rounding step
        assert_eq!(s.distance_text(Some(8.0)), "26 ft");
    }

    #[test]
    fn test_side_phrases() {
        assert_eq!(side_phrase(15.0).text(), "straight ahead");
        assert_eq!(side_phrase(-15.0).text(), "straight ahead");
        assert_eq!(side_phrase(30.0).text(), "slightly right");
        assert_eq!(side_phrase(-60.0).text(), "to the left");
        assert_eq!(side_phrase(120.0).text(), "behind right");
        assert_eq!(side_phrase(-179.0).text(), "behind");
        assert_eq!(side_phrase(180.0).text(), "behind");
    }

    #[test]
    fn test_clock_phrases() {
        let hour = |deg: f64| clock_phrase(deg).value;
        assert_eq!(hour(0.0), "12");
        assert_eq!(hour(15.0), "12");
        assert_eq!(hour(-15.0), "12");
        assert_eq!(hour(16.0), "1");
        assert_eq!(hour(45.0), "1");
        assert_eq!(hour(90.0), "3");
        assert_eq!(hour(165.0), "5");
        assert_eq!(hour(-16.0), "11");
        assert_eq!(hour(-45.0), "11");
        assert_eq!(hour(-46.0), "10");
        assert_eq!(hour(-90.0), "9");
        assert_eq!(hour(-165.0), "7");
        assert_eq!(hour(170.0), "6");
        assert_eq!(hour(-170.0), "6");
        assert_eq!(clock_phrase(90.0).text(), "at 3 o'clock");
    }

    #[test]
    fn test_haptic_interval_bands() {
        let config = TrackerConfig::default();
        let cr = config.close_range_m;
        assert_relative_eq!(haptic_interval(0.0, &config).unwrap(), 0.01);
        assert_relative_eq!(haptic_interval(cr * 0.1, &config).unwrap(), 0.01);
        assert_relative_eq!(haptic_interval(cr * 0.3, &config).unwrap(), 0.03);
        assert_relative_eq!(haptic_interval(cr * 0.99, &config).unwrap(), 0.08);
        assert!(haptic_interval(cr, &config).is_none());
        assert!(haptic_interval(5.0, &config).is_none());
    }

    #[test]
    fn test_haptic_interval_monotonic() {
        let config = TrackerConfig::default();
        let mut previous = f64::INFINITY;
        let mut d = config.close_range_m * 0.999;
        while d >= 0.0 {
            let interval = haptic_interval(d, &config).unwrap();
            assert!(interval <= previous, "interval grew at {d}");
            previous = interval;
            d -= 0.005;
        }
    }

    #[test]
    fn test_close_range_hides_arrow() {
        let out = signal().render(LifecycleState::Tracking, Some(0.5), Some(40.0));
        assert!(out.arrow_rotation_deg.is_none());
        assert!(out.direction_phrase.is_none());
        assert_relative_eq!(out.proximity_scale.unwrap(), 0.5 / (2.0 / 3.0) / 2.0 + 0.5);
        assert!(out.haptic_interval_secs.is_some());
    }

    #[test]
    fn test_non_tracking_states_short_circuit() {
        for state in [LifecycleState::Searching, LifecycleState::Calibrating, LifecycleState::LightTooLow] {
            let out = signal().render(state, Some(0.3), Some(5.0));
            assert_eq!(out.lifecycle_phrase, state.phrase());
            assert!(out.haptic_interval_secs.is_none());
            assert!(out.direction_phrase.is_none());
            assert!(out.distance_feet.is_none());
        }
        let arrived = signal().render(LifecycleState::Arrived, Some(0.0), None);
        assert_eq!(arrived.distance_feet, Some(0.0));
        assert!(arrived.haptic_interval_secs.is_none());
    }

    #[test]
    fn test_clock_mode_selected_by_config() {
        let config = TrackerConfig { phrase_mode: PhraseMode::Clock, ..TrackerConfig::default() };
        let out = GuidanceSignal::new(&config).render(LifecycleState::Tracking, Some(10.0), Some(-95.0));
        assert_eq!(out.direction_phrase.unwrap().text(), "at 9 o'clock");
    }

    #[test]
    fn test_audio_cue_indices() {
        let cues = [
            AudioCue::Searching,
            AudioCue::LightTooLow,
            AudioCue::Calibrating,
            AudioCue::Connected,
            AudioCue::Disconnected,
            AudioCue::Silent,
        ];
        for (i, cue) in cues.iter().enumerate() {
            assert_eq!(cue.index() as usize, i);
        }
    }
}
