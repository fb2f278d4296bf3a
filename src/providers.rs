//! Provider event sources: recorded sessions (`.json` / `.json.gz`) and a synthetic walk.
//!
//! Both feed the same `ProviderEvent` channel the live runner consumes, so the tracker
//! never knows whether it is looking at a device, a recording or a simulation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep, Duration};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::session::SessionEvent;
use crate::tracker::ProviderEvent;
use crate::types::{CameraPose, FrameSample, GeoPoint, GpsFix, RangingSample, WorldVec};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Seconds since session start
    pub t: f64,
    pub event: ProviderEvent,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    pub destination: Option<GeoPoint>,
    /// Overrides the runner's configuration when present
    pub config: Option<TrackerConfig>,
    pub events: Vec<TimedEvent>,
}

impl SessionLog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let log: SessionLog = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        log.validate()?;
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Timestamps must be finite and non-decreasing
    pub fn validate(&self) -> Result<()> {
        let mut previous = f64::NEG_INFINITY;
        for (index, timed) in self.events.iter().enumerate() {
            if !timed.t.is_finite() || timed.t < previous {
                return Err(TrackerError::SessionLog(format!(
                    "event {index} has timestamp {} after {}",
                    timed.t, previous
                )));
            }
            previous = timed.t;
        }
        if let Some(config) = &self.config {
            config.validate()?;
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.events.last().map(|e| e.t).unwrap_or(0.0)
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Send a recorded session over the channel, honouring its timing scaled by `speed`
pub async fn replay_loop(tx: Sender<ProviderEvent>, log: SessionLog, speed: f64) {
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let mut last_t = log.events.first().map(|e| e.t).unwrap_or(0.0);
    let mut sent = 0u64;

    for timed in log.events {
        let wait = (timed.t - last_t) / speed;
        if wait > 0.0 {
            sleep(Duration::from_secs_f64(wait)).await;
        }
        last_t = timed.t;

        if tx.send(timed.event).await.is_err() {
            log::warn!("[replay] Channel closed after {} events", sent);
            return;
        }
        sent += 1;
        if sent % 500 == 0 {
            log::debug!("[replay] {} events", sent);
        }
    }
    log::info!("[replay] Session finished after {} events", sent);
}

// ─── Synthetic walk ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct WalkParams {
    /// Straight-line start distance to the car, meters
    pub start_distance_m: f64,
    pub walking_speed_mps: f64,
    pub frame_rate_hz: f64,
    /// AR frames per ranging tick
    pub frames_per_ranging: u32,
    /// AR frames per GPS fix
    pub frames_per_gps: u32,
    /// Every n-th ranging tick loses its distance (0 disables)
    pub distance_dropout_every: u32,
    /// Every n-th ranging tick loses its direction (0 disables)
    pub direction_dropout_every: u32,
    /// Head sway amplitude, radians
    pub yaw_sway_rad: f64,
    pub ambient_intensity: f64,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            start_distance_m: 8.0,
            walking_speed_mps: 0.5,
            frame_rate_hz: 10.0,
            frames_per_ranging: 5,
            frames_per_gps: 10,
            distance_dropout_every: 5,
            direction_dropout_every: 7,
            yaw_sway_rad: 0.1,
            ambient_intensity: 800.0,
        }
    }
}

/// Pedestrian walking north toward a car parked at `destination`, phone held forward.
///
/// World frame: start position at the origin, car at (0, 0, -start_distance), -z north.
/// Ends with a stop 2 cm from the car and a zero-distance reading.
pub fn synthetic_walk(destination: GeoPoint, params: &WalkParams) -> SessionLog {
    let car = WorldVec::new(0.0, 0.0, -params.start_distance_m);
    let stop_distance = 0.02;
    let travel = (params.start_distance_m - stop_distance).max(0.0);
    let walk_secs = travel / params.walking_speed_mps.max(1e-3);
    let dt = 1.0 / params.frame_rate_hz;
    let total_frames = ((walk_secs + 1.0) / dt).ceil() as u32;

    let mut events = vec![TimedEvent { t: 0.0, event: ProviderEvent::Session(SessionEvent::Connected) }];
    let mut ranging_ticks = 0u32;

    for i in 0..=total_frames {
        let t = i as f64 * dt;
        let walked = (params.walking_speed_mps * t).min(travel);
        let position = WorldVec::new(0.0, 0.0, -walked);
        let yaw = params.yaw_sway_rad * t.sin();
        let pose = CameraPose::new(position, 0.0, yaw);

        events.push(TimedEvent {
            t,
            event: ProviderEvent::Frame(FrameSample {
                timestamp: t,
                pose,
                ambient_intensity: Some(params.ambient_intensity),
            }),
        });

        if params.frames_per_gps > 0 && i % params.frames_per_gps == 0 {
            let remaining_north = car.z.abs() - walked;
            let location = GeoPoint::new(
                destination.latitude - remaining_north / METERS_PER_DEGREE_LAT,
                destination.longitude,
            );
            events.push(TimedEvent {
                t,
                event: ProviderEvent::Gps(GpsFix { timestamp: t, location, true_heading: Some(0.0) }),
            });
        }

        if params.frames_per_ranging > 0 && i % params.frames_per_ranging == 0 {
            ranging_ticks += 1;
            let offset = car - position;
            let direction = pose.to_local(&car).try_normalize(1e-9);
            let drop_distance = params.distance_dropout_every > 0 && ranging_ticks % params.distance_dropout_every == 0;
            let drop_direction =
                params.direction_dropout_every > 0 && ranging_ticks % params.direction_dropout_every == 0;
            events.push(TimedEvent {
                t,
                event: ProviderEvent::Ranging(RangingSample::new(
                    t,
                    if drop_distance { None } else { Some(offset.norm()) },
                    if drop_direction { None } else { direction },
                )),
            });
        }
    }

    let end = total_frames as f64 * dt + dt;
    events.push(TimedEvent { t: end, event: ProviderEvent::Ranging(RangingSample::distance_only(end, 0.0)) });

    SessionLog { destination: Some(destination), config: None, events }
}
