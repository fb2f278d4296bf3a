use anyhow::{Context, Result};
use car_finder_rs::config::TrackerConfig;
use car_finder_rs::live_status::LiveStatus;
use car_finder_rs::providers::{self, SessionLog, WalkParams};
use car_finder_rs::tracker::{ProviderEvent, Tracker, TrackerEvent};
use car_finder_rs::types::GeoPoint;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(name = "car_finder")]
#[command(about = "Guide a pedestrian to a parked car from GPS, UWB ranging and AR camera pose", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until the provider stream ends)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Recorded session to play back (.json or .json.gz)
    #[arg(long, conflicts_with = "simulate")]
    session: Option<PathBuf>,

    /// Generate a synthetic walk toward the car instead of reading a session
    #[arg(long)]
    simulate: bool,

    /// Tracker configuration (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Playback speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Output directory
    #[arg(long, default_value = "car_finder_sessions")]
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct RunSummary {
    provider_events: u64,
    tracker_events: Vec<TrackerEvent>,
    final_status: LiveStatus,
}

/// Parking spot used for simulated walks
const SIMULATED_DESTINATION: GeoPoint = GeoPoint { latitude: 35.9712, longitude: -78.8986 };

const HAPTIC_TICK: Duration = Duration::from_millis(10);
const STATUS_PERIOD_SECS: i64 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Car Finder Starting", ts_now());
    println!("  Duration: {} seconds (0=until stream ends)", args.duration);
    println!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    let log = load_provider_log(&args)?;
    if let Some(session_config) = &log.config {
        config = session_config.clone();
    }
    println!("  Provider events: {} over {:.1}s", log.events.len(), log.duration());

    let mut tracker = Tracker::new(config, log.destination);
    let (tx, mut rx) = mpsc::channel::<ProviderEvent>(500);
    let _provider_handle = tokio::spawn(providers::replay_loop(tx, log, args.speed));

    let mut haptic_tick = interval(HAPTIC_TICK);
    haptic_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let start = Utc::now();
    let mut last_tick = Utc::now();
    let mut last_status_update = Utc::now();
    let mut status = LiveStatus::new();
    let mut provider_events = 0u64;
    let mut notable_events = Vec::new();

    loop {
        if args.duration > 0 {
            let elapsed = Utc::now().signed_duration_since(start);
            if elapsed.num_seconds() as u64 >= args.duration {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
        }

        let events = tokio::select! {
            received = rx.recv() => match received {
                Some(event) => {
                    provider_events += 1;
                    count_provider_event(&mut status, &event);
                    tracker.handle(&event)
                }
                None => {
                    println!("[{}] Provider stream ended", ts_now());
                    break;
                }
            },
            _ = haptic_tick.tick() => {
                let now = Utc::now();
                let dt = now.signed_duration_since(last_tick).num_microseconds().unwrap_or(0) as f64 / 1e6;
                last_tick = now;
                tracker.advance(dt.max(0.0))
            }
        };

        status.record_events(&events);
        for event in events {
            if !matches!(event, TrackerEvent::HapticPulse(_)) {
                log::info!("{:?}", event);
                notable_events.push(event);
            }
        }

        let now = Utc::now();
        if now.signed_duration_since(last_status_update).num_seconds() >= STATUS_PERIOD_SECS {
            let uptime = now.signed_duration_since(start).num_seconds().max(0) as u64;
            status.update_from(&tracker, uptime);
            let status_path = args.output_dir.join("live_status.json");
            if let Err(e) = status.save(&status_path) {
                log::warn!("Failed to write {}: {}", status_path.display(), e);
            }
            last_status_update = now;
        }
    }

    // Final save
    let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    status.update_from(&tracker, uptime);
    status.save(&args.output_dir.join("live_status_final.json"))?;

    let summary = RunSummary { provider_events, tracker_events: notable_events, final_status: status.clone() };
    let filename = args.output_dir.join(format!("run_{}_final.json", ts_now_clean()));
    std::fs::write(&filename, serde_json::to_string_pretty(&summary)?)?;
    println!("[{}] Final save: {} provider events to {}", ts_now(), provider_events, filename.display());

    let output = tracker.output();
    println!("\n=== Final Guidance ===");
    println!("Lifecycle: {}", output.lifecycle_phrase);
    println!("Distance: {}", output.distance_text);
    if let Some(phrase) = output.direction_phrase {
        println!("Direction: {}", phrase.text());
    }
    println!("Pulses: {} proximity, {} pointing", status.proximity_pulses, status.pointing_pulses);
    println!("Plausibility faults: {}", status.plausibility_faults);

    Ok(())
}

fn load_provider_log(args: &Args) -> Result<SessionLog> {
    if let Some(path) = &args.session {
        println!("[{}] Loading session {}", ts_now(), path.display());
        return SessionLog::load(path).with_context(|| format!("loading session {}", path.display()));
    }
    if !args.simulate {
        anyhow::bail!("no provider source: pass --session <file> or --simulate");
    }

    let log = providers::synthetic_walk(SIMULATED_DESTINATION, &WalkParams::default());
    let path = args.output_dir.join(format!("session_simulated_{}.json.gz", ts_now_clean()));
    save_quietly(&log, &path);
    Ok(log)
}

fn save_quietly(log: &SessionLog, path: &Path) {
    match log.save(path) {
        Ok(()) => println!("[{}] Simulated session saved to {}", ts_now(), path.display()),
        Err(e) => log::warn!("Could not save simulated session: {}", e),
    }
}

fn count_provider_event(status: &mut LiveStatus, event: &ProviderEvent) {
    match event {
        ProviderEvent::Gps(_) | ProviderEvent::Heading { .. } => status.gps_fixes += 1,
        ProviderEvent::Ranging(_) => status.ranging_samples += 1,
        ProviderEvent::Frame(_) => status.frames += 1,
        ProviderEvent::Session(_) | ProviderEvent::WorldOriginReset { .. } => status.session_events += 1,
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
