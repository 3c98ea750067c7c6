//! Speed derivation and limit verdicts.

use std::fmt;

use anyhow::{bail, Result};
use chrono::{Local, TimeZone};
use serde::Deserialize;

/// Conversion from `distance units / second` to the reported speed unit.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    /// Distance in feet, speed in miles per hour.
    #[default]
    FeetToMph,
    /// Distance in metres, speed in kilometres per hour.
    MetersToKph,
    /// Speed reported in distance units per second.
    PerSecond,
}

impl SpeedUnit {
    pub fn factor(self) -> f64 {
        match self {
            SpeedUnit::FeetToMph => 3600.0 / 5280.0,
            SpeedUnit::MetersToKph => 3.6,
            SpeedUnit::PerSecond => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::FeetToMph => "mph",
            SpeedUnit::MetersToKph => "km/h",
            SpeedUnit::PerSecond => "units/s",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    OverLimit,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::OverLimit => "OVER_LIMIT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(Verdict::Ok),
            "OVER_LIMIT" => Some(Verdict::OverLimit),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed crossing. Produced once per finalized track.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub track_id: u64,
    pub attribute: String,
    pub speed: f64,
    pub verdict: Verdict,
    /// Capture time of the finalizing frame, seconds since the epoch.
    pub timestamp: f64,
    pub elapsed: f64,
    pub unit: SpeedUnit,
}

impl Measurement {
    /// Human-readable log line, stamped with the local time of capture.
    pub fn log_line(&self) -> String {
        format!(
            "{} Car Color: {}, Speed: {:.1} {}",
            format_local(self.timestamp),
            self.attribute,
            self.speed,
            self.unit.label()
        )
    }
}

fn format_local(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    match Local.timestamp_opt(secs as i64, nanos.min(999_999_999)).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SpeedCalculator {
    distance: f64,
    limit: f64,
    unit: SpeedUnit,
}

impl SpeedCalculator {
    pub fn new(distance: f64, limit: f64, unit: SpeedUnit) -> Result<Self> {
        if !(distance.is_finite() && distance > 0.0) {
            bail!("boundary distance must be positive, got {}", distance);
        }
        if !(limit.is_finite() && limit >= 0.0) {
            bail!("speed limit must be non-negative, got {}", limit);
        }
        Ok(Self {
            distance,
            limit,
            unit,
        })
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    /// Speed for a crossing that took `elapsed` seconds. Callers guarantee
    /// `elapsed > 0`.
    pub fn speed(&self, elapsed: f64) -> f64 {
        self.distance / elapsed * self.unit.factor()
    }

    /// At the limit is still `Ok`.
    pub fn verdict(&self, speed: f64) -> Verdict {
        if speed <= self.limit {
            Verdict::Ok
        } else {
            Verdict::OverLimit
        }
    }

    pub fn measure(
        &self,
        track_id: u64,
        attribute: String,
        elapsed: f64,
        timestamp: f64,
    ) -> Measurement {
        let speed = self.speed(elapsed);
        Measurement {
            track_id,
            attribute,
            speed,
            verdict: self.verdict(speed),
            timestamp,
            elapsed,
            unit: self.unit,
        }
    }
}
