use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use super::{Alert, ResultSink};
use crate::speed::{Measurement, Verdict};

#[derive(Clone, Debug, PartialEq)]
pub struct StatusWrite {
    pub key: String,
    pub speed: f64,
    pub verdict: Verdict,
}

#[derive(Debug, Default)]
struct Recorded {
    lines: Vec<String>,
    measurements: Vec<Measurement>,
    statuses: Vec<StatusWrite>,
    alerts: Vec<Alert>,
}

/// Records every sink call. Clones share the same record, so a clone can be
/// handed to a worker thread and inspected afterwards.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Recorded>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lines(&self) -> Vec<String> {
        self.recorded().lines.clone()
    }

    /// Measurements in the order their log lines were appended.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.recorded().measurements.clone()
    }

    pub fn statuses(&self) -> Vec<StatusWrite> {
        self.recorded().statuses.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.recorded().alerts.clone()
    }
}

impl ResultSink for MemorySink {
    fn append_log(&mut self, m: &Measurement) -> Result<()> {
        let mut recorded = self.recorded();
        recorded.lines.push(m.log_line());
        recorded.measurements.push(m.clone());
        Ok(())
    }

    fn upsert_status(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()> {
        self.recorded().statuses.push(StatusWrite {
            key: key.to_string(),
            speed,
            verdict,
        });
        Ok(())
    }

    fn send_alert(&mut self, alert: &Alert) -> Result<()> {
        self.recorded().alerts.push(alert.clone());
        Ok(())
    }
}
