use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::VEHICLE_CLASSES;
use crate::ingest::DEFAULT_MAX_FRAME_BYTES;
use crate::region::{BoundaryOrientation, Boundaries};
use crate::speed::SpeedUnit;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_FIRST_LINE: i32 = 250;
const DEFAULT_SECOND_LINE: i32 = 875;
const DEFAULT_MARGIN: i32 = 20;
const DEFAULT_MATCH_TOLERANCE: i32 = 100;
const DEFAULT_DISTANCE: f64 = 50.0;
const DEFAULT_SPEED_LIMIT: f64 = 15.0;
const DEFAULT_READER_QUEUE: usize = 4;
const DEFAULT_DETECTOR: &str = "cpu";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_LOG_PATH: &str = "speed_log.txt";
const DEFAULT_DB_PATH: &str = "vehicle_status.db";
const DEFAULT_ALERT_ADDR: &str = "255.255.255.255:6000";
const DEFAULT_SINK_QUEUE: usize = 64;

#[derive(Debug, Deserialize, Default)]
struct ReceiverConfigFile {
    listen_addr: Option<String>,
    boundaries: Option<BoundariesConfigFile>,
    tracking: Option<TrackingConfigFile>,
    measurement: Option<MeasurementConfigFile>,
    ingest: Option<IngestConfigFile>,
    detector: Option<DetectorConfigFile>,
    sinks: Option<SinksConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BoundariesConfigFile {
    orientation: Option<BoundaryOrientation>,
    first: Option<i32>,
    second: Option<i32>,
    margin: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    match_tolerance: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct MeasurementConfigFile {
    distance: Option<f64>,
    unit: Option<SpeedUnit>,
    speed_limit: Option<f64>,
    max_elapsed_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    max_frame_bytes: Option<u32>,
    reader_queue: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence: Option<f32>,
    classes: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Default)]
struct SinksConfigFile {
    log_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    alert_addr: Option<String>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub listen_addr: String,
    pub boundaries: Boundaries,
    pub margin: i32,
    pub match_tolerance: i32,
    pub distance: f64,
    pub unit: SpeedUnit,
    pub speed_limit: f64,
    /// Optional upper bound on a crossing interval; unset means unbounded.
    pub max_elapsed_secs: Option<f64>,
    pub max_frame_bytes: u32,
    pub reader_queue: usize,
    pub detector: DetectorSettings,
    pub sinks: SinkSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub`, `cpu` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence: f32,
    /// Class ids kept after detection. Empty keeps everything.
    pub classes: Vec<u32>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR.to_string(),
            model_path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            confidence: DEFAULT_CONFIDENCE,
            classes: VEHICLE_CLASSES.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub log_path: PathBuf,
    pub db_path: PathBuf,
    /// `None` disables alerts.
    pub alert_addr: Option<String>,
    pub queue_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::from_file(ReceiverConfigFile::default())
    }
}

impl ReceiverConfig {
    /// Layered load: `SPEEDTRAP_CONFIG` file, then environment, then checks.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SPEEDTRAP_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ReceiverConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ReceiverConfigFile) -> Self {
        let listen_addr = file
            .listen_addr
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let bounds = file.boundaries.unwrap_or_default();
        let boundaries = Boundaries {
            orientation: bounds.orientation.unwrap_or_default(),
            first: bounds.first.unwrap_or(DEFAULT_FIRST_LINE),
            second: bounds.second.unwrap_or(DEFAULT_SECOND_LINE),
        };
        let margin = bounds.margin.unwrap_or(DEFAULT_MARGIN);

        let match_tolerance = file
            .tracking
            .and_then(|tracking| tracking.match_tolerance)
            .unwrap_or(DEFAULT_MATCH_TOLERANCE);

        let measurement = file.measurement.unwrap_or_default();
        let ingest = file.ingest.unwrap_or_default();

        let det = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: det.backend.unwrap_or(defaults.backend),
            model_path: det.model_path,
            input_width: det.input_width.unwrap_or(defaults.input_width),
            input_height: det.input_height.unwrap_or(defaults.input_height),
            confidence: det.confidence.unwrap_or(defaults.confidence),
            classes: det.classes.unwrap_or(defaults.classes),
        };

        let sinks_file = file.sinks.unwrap_or_default();
        let sinks = SinkSettings {
            log_path: sinks_file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            db_path: sinks_file
                .db_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            alert_addr: match sinks_file.alert_addr {
                Some(addr) => parse_alert_addr(&addr),
                None => Some(DEFAULT_ALERT_ADDR.to_string()),
            },
            queue_capacity: sinks_file.queue_capacity.unwrap_or(DEFAULT_SINK_QUEUE),
        };

        Self {
            listen_addr,
            boundaries,
            margin,
            match_tolerance,
            distance: measurement.distance.unwrap_or(DEFAULT_DISTANCE),
            unit: measurement.unit.unwrap_or_default(),
            speed_limit: measurement.speed_limit.unwrap_or(DEFAULT_SPEED_LIMIT),
            max_elapsed_secs: measurement.max_elapsed_secs,
            max_frame_bytes: ingest.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
            reader_queue: ingest.reader_queue.unwrap_or(DEFAULT_READER_QUEUE),
            detector,
            sinks,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SPEEDTRAP_LISTEN_ADDR") {
            if !addr.trim().is_empty() {
                self.listen_addr = addr.trim().to_string();
            }
        }
        if let Ok(limit) = std::env::var("SPEEDTRAP_SPEED_LIMIT") {
            self.speed_limit = limit
                .trim()
                .parse()
                .map_err(|_| anyhow!("SPEEDTRAP_SPEED_LIMIT must be a number"))?;
        }
        if let Ok(distance) = std::env::var("SPEEDTRAP_DISTANCE") {
            self.distance = distance
                .trim()
                .parse()
                .map_err(|_| anyhow!("SPEEDTRAP_DISTANCE must be a number"))?;
        }
        if let Ok(orientation) = std::env::var("SPEEDTRAP_ORIENTATION") {
            self.boundaries.orientation = BoundaryOrientation::parse(&orientation)
                .ok_or_else(|| {
                    anyhow!("SPEEDTRAP_ORIENTATION must be 'horizontal' or 'vertical'")
                })?;
        }
        if let Ok(lines) = std::env::var("SPEEDTRAP_LINES") {
            let parsed = split_csv(&lines);
            let [first, second] = parsed.as_slice() else {
                return Err(anyhow!("SPEEDTRAP_LINES must be two positions, e.g. 250,875"));
            };
            self.boundaries.first = first
                .parse()
                .map_err(|_| anyhow!("SPEEDTRAP_LINES: invalid position '{}'", first))?;
            self.boundaries.second = second
                .parse()
                .map_err(|_| anyhow!("SPEEDTRAP_LINES: invalid position '{}'", second))?;
        }
        if let Ok(path) = std::env::var("SPEEDTRAP_LOG_PATH") {
            if !path.trim().is_empty() {
                self.sinks.log_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("SPEEDTRAP_DB_PATH") {
            if !path.trim().is_empty() {
                self.sinks.db_path = PathBuf::from(path);
            }
        }
        if let Ok(addr) = std::env::var("SPEEDTRAP_ALERT_ADDR") {
            self.sinks.alert_addr = parse_alert_addr(&addr);
        }
        if let Ok(backend) = std::env::var("SPEEDTRAP_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.boundaries.first == self.boundaries.second {
            return Err(anyhow!("boundary positions must differ"));
        }
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return Err(anyhow!("distance must be greater than zero"));
        }
        if !(self.speed_limit.is_finite() && self.speed_limit >= 0.0) {
            return Err(anyhow!("speed_limit must be a non-negative number"));
        }
        if self.match_tolerance <= 0 {
            return Err(anyhow!("match_tolerance must be greater than zero"));
        }
        if self.margin < 0 {
            return Err(anyhow!("margin must not be negative"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes must be greater than zero"));
        }
        if let Some(max) = self.max_elapsed_secs {
            if !(max.is_finite() && max > 0.0) {
                return Err(anyhow!("max_elapsed_secs must be greater than zero"));
            }
        }
        self.detector.backend = self.detector.backend.to_lowercase();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ReceiverConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_alert_addr(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("off") {
        None
    } else {
        Some(value.to_string())
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
