//! Result sinks: where finalized measurements go.
//!
//! Per measurement the pipeline appends a log line, upserts the status
//! record keyed by attribute, and (only for `OVER_LIMIT`) sends one
//! best-effort alert. Each write fails independently; failures are logged
//! and never retried or propagated.

mod alert;
mod memory;
mod status;
mod textlog;
mod worker;

use anyhow::Result;
use serde::Serialize;

pub use alert::UdpAlertBroadcaster;
pub use memory::{MemorySink, StatusWrite};
pub use status::{SqliteStatusStore, StatusRecord, StatusStore};
pub use textlog::TextLogSink;
pub use worker::{SinkHandle, SinkWorker};

use crate::config::SinkSettings;
use crate::speed::{Measurement, Verdict};

/// Alert datagram body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub color: String,
    pub speed: f64,
    pub msg: String,
}

impl Alert {
    pub fn from_measurement(m: &Measurement) -> Self {
        Self {
            color: m.attribute.clone(),
            speed: m.speed,
            msg: m.verdict.to_string(),
        }
    }
}

pub trait ResultSink: Send {
    /// Append the measurement's log line.
    fn append_log(&mut self, m: &Measurement) -> Result<()>;

    fn upsert_status(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()>;

    fn send_alert(&mut self, alert: &Alert) -> Result<()>;
}

/// Apply one measurement to `sink`: log, then status, then alert if over
/// the limit. Never fails.
pub fn deliver(sink: &mut dyn ResultSink, m: &Measurement) {
    log::info!("{}", m.log_line());
    if let Err(e) = sink.append_log(m) {
        log::warn!("sink: log append failed: {:#}", e);
    }
    if let Err(e) = sink.upsert_status(&m.attribute, m.speed, m.verdict) {
        log::warn!("sink: status upsert for '{}' failed: {:#}", m.attribute, e);
    }
    if m.verdict == Verdict::OverLimit {
        if let Err(e) = sink.send_alert(&Alert::from_measurement(m)) {
            log::warn!("sink: alert send failed: {:#}", e);
        }
    }
}

/// The deployed sink: text log file, status store, optional UDP alerts.
pub struct ReceiverSink {
    log: TextLogSink,
    store: Box<dyn StatusStore>,
    alerts: Option<UdpAlertBroadcaster>,
}

impl ReceiverSink {
    pub fn new(
        log: TextLogSink,
        store: Box<dyn StatusStore>,
        alerts: Option<UdpAlertBroadcaster>,
    ) -> Self {
        Self { log, store, alerts }
    }

    pub fn from_settings(settings: &SinkSettings) -> Result<Self> {
        let log = TextLogSink::open(&settings.log_path)?;
        let store = SqliteStatusStore::open(&settings.db_path)?;
        let alerts = match settings.alert_addr.as_deref() {
            Some(addr) => Some(UdpAlertBroadcaster::new(addr)?),
            None => {
                log::info!("sink: alerts disabled");
                None
            }
        };
        Ok(Self::new(log, Box::new(store), alerts))
    }
}

impl ResultSink for ReceiverSink {
    fn append_log(&mut self, m: &Measurement) -> Result<()> {
        self.log.append(&m.log_line())
    }

    fn upsert_status(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()> {
        self.store.upsert(key, speed, verdict)
    }

    fn send_alert(&mut self, alert: &Alert) -> Result<()> {
        match self.alerts.as_mut() {
            Some(alerts) => alerts.send(alert),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::{SpeedCalculator, SpeedUnit};
    use anyhow::anyhow;

    fn measurement(elapsed: f64) -> Measurement {
        SpeedCalculator::new(30.0, 15.0, SpeedUnit::PerSecond)
            .unwrap()
            .measure(7, "Red".into(), elapsed, 1_700_000_000.0)
    }

    #[test]
    fn ok_measurement_logs_and_upserts_without_alert() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        deliver(&mut writer, &measurement(2.0));

        assert_eq!(sink.lines().len(), 1);
        assert_eq!(sink.measurements()[0].track_id, 7);
        assert_eq!(
            sink.statuses(),
            vec![StatusWrite {
                key: "Red".into(),
                speed: 15.0,
                verdict: Verdict::Ok
            }]
        );
        assert!(sink.alerts().is_empty());
    }

    #[test]
    fn over_limit_sends_exactly_one_alert() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        deliver(&mut writer, &measurement(1.0));
        assert_eq!(
            sink.alerts(),
            vec![Alert {
                color: "Red".into(),
                speed: 30.0,
                msg: "OVER_LIMIT".into()
            }]
        );
    }

    struct Broken;

    impl ResultSink for Broken {
        fn append_log(&mut self, _m: &Measurement) -> Result<()> {
            Err(anyhow!("disk full"))
        }
        fn upsert_status(&mut self, _key: &str, _speed: f64, _verdict: Verdict) -> Result<()> {
            Err(anyhow!("database locked"))
        }
        fn send_alert(&mut self, _alert: &Alert) -> Result<()> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[test]
    fn failing_sink_does_not_panic() {
        deliver(&mut Broken, &measurement(1.0));
    }

    #[test]
    fn alert_serializes_with_wire_field_names() {
        let json = serde_json::to_value(Alert::from_measurement(&measurement(1.0))).unwrap();
        assert_eq!(json["color"], "Red");
        assert_eq!(json["speed"], 30.0);
        assert_eq!(json["msg"], "OVER_LIMIT");
    }
}
