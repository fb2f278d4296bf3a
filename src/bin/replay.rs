use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use car_finder_rs::config::TrackerConfig;
use car_finder_rs::estimator::{DirectionResolution, DistanceResolution};
use car_finder_rs::providers::SessionLog;
use car_finder_rs::tracker::{PulseKind, Tracker, TrackerEvent};
use clap::Parser;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded session (.json or .json.gz)
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of recorded sessions to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// Tracker configuration overriding the one stored in each session
    #[arg(long)]
    config: Option<PathBuf>,

    /// Largest single `advance` step between events, seconds
    #[arg(long, default_value = "0.01")]
    max_step: f64,
}

fn distance_source(source: &DistanceResolution) -> &'static str {
    match source {
        DistanceResolution::Ranging(_) => "ranging",
        DistanceResolution::Arrival => "arrival",
        DistanceResolution::HeldOver(_) => "held_over",
        DistanceResolution::DeadReckoned(_) => "dead_reckoned",
        DistanceResolution::Stale(_) => "stale",
        DistanceResolution::Unavailable => "unavailable",
    }
}

fn direction_source(source: &DirectionResolution) -> &'static str {
    match source {
        DirectionResolution::Ranging(_) => "ranging",
        DirectionResolution::DeadReckoned(_) => "dead_reckoned",
        DirectionResolution::Gps { .. } => "gps",
        DirectionResolution::Rejected { .. } => "rejected",
        DirectionResolution::Unavailable => "unavailable",
    }
}

fn run_once(path: &Path, config_override: Option<&TrackerConfig>, args: &Args) -> anyhow::Result<Value> {
    let log = SessionLog::load(path)?;
    let config = match (config_override, &log.config) {
        (Some(config), _) => config.clone(),
        (None, Some(config)) => config.clone(),
        (None, None) => TrackerConfig::default(),
    };
    let max_step = if args.max_step > 0.0 { args.max_step } else { 0.01 };

    let mut tracker = Tracker::new(config, log.destination);
    let mut last_t = log.events.first().map(|e| e.t).unwrap_or(0.0);

    let mut faults = 0u64;
    let mut restarts = 0u64;
    let mut proximity_pulses = 0u64;
    let mut pointing_pulses = 0u64;
    let mut lock_time: Option<f64> = None;
    let mut arrival_time: Option<f64> = None;
    let mut retries_exhausted = false;
    let mut distance_sources: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut direction_sources: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut transitions = Vec::new();

    for timed in &log.events {
        let mut events = Vec::new();
        let mut remaining = timed.t - last_t;
        while remaining > 1e-12 {
            let step = remaining.min(max_step);
            events.extend(tracker.advance(step));
            remaining -= step;
        }
        last_t = timed.t;

        let handled = tracker.handle(&timed.event);
        if matches!(timed.event, car_finder_rs::tracker::ProviderEvent::Ranging(_)) {
            let snapshot = tracker.get_snapshot();
            if let Some(source) = snapshot.last_distance_source.as_ref() {
                *distance_sources.entry(distance_source(source)).or_default() += 1;
            }
            if let Some(source) = snapshot.last_direction_source.as_ref() {
                *direction_sources.entry(direction_source(source)).or_default() += 1;
            }
        }
        events.extend(handled);

        for event in events {
            match event {
                TrackerEvent::PlausibilityFault { previous_deg, rejected_deg } => {
                    faults += 1;
                    println!("[FAULT] t={:.2}s {:.1}° -> {:.1}°", timed.t, previous_deg, rejected_deg);
                }
                TrackerEvent::RestartRequested { .. } => restarts += 1,
                TrackerEvent::RetriesExhausted => retries_exhausted = true,
                TrackerEvent::HapticPulse(PulseKind::Proximity) => proximity_pulses += 1,
                TrackerEvent::HapticPulse(PulseKind::Pointing) => pointing_pulses += 1,
                TrackerEvent::CalibrationLocked => {
                    lock_time.get_or_insert(timed.t);
                }
                TrackerEvent::Arrived => {
                    arrival_time.get_or_insert(timed.t);
                }
                TrackerEvent::LifecycleChanged { from, to } => {
                    transitions.push(json!({ "t": timed.t, "from": from, "to": to }));
                }
                _ => {}
            }
        }
    }

    let output = tracker.output();
    Ok(json!({
        "log": path.display().to_string(),
        "events": log.events.len(),
        "duration_secs": log.duration(),
        "calibration_lock_secs": lock_time,
        "arrival_secs": arrival_time,
        "plausibility_faults": faults,
        "restart_requests": restarts,
        "retries_exhausted": retries_exhausted,
        "proximity_pulses": proximity_pulses,
        "pointing_pulses": pointing_pulses,
        "distance_sources": distance_sources,
        "direction_sources": direction_sources,
        "transitions": transitions,
        "final_lifecycle": output.lifecycle,
        "final_distance": output.distance_text,
        "final_direction": output.direction_phrase.map(|p| p.text()),
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config_override = args.config.as_deref().map(TrackerConfig::load).transpose()?;
    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz")) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, config_override.as_ref(), &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, config_override.as_ref(), &args)?);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
