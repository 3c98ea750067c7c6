use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};

use super::{deliver, ResultSink};
use crate::speed::Measurement;

/// Longest a full queue may hold up the frame pipeline before a
/// measurement is dropped.
const SUBMIT_TIMEOUT: Duration = Duration::from_millis(250);

enum SinkCommand {
    Deliver(Measurement),
    Shutdown,
}

/// Cheap cloneable submitter used by the frame pipeline. Blocks for at most
/// `SUBMIT_TIMEOUT` when the queue is full.
#[derive(Clone)]
pub struct SinkHandle {
    tx: Sender<SinkCommand>,
    dropped: Arc<AtomicU64>,
}

impl SinkHandle {
    /// Queue `m` for delivery. Returns `false` if it was dropped because the
    /// queue stayed full past `SUBMIT_TIMEOUT` or the worker is gone.
    pub fn submit(&self, m: Measurement) -> bool {
        match self.tx.send_timeout(SinkCommand::Deliver(m), SUBMIT_TIMEOUT) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(SinkCommand::Deliver(m))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "sink: queue full for {:?}, dropping {} measurement for track {} ({})",
                    SUBMIT_TIMEOUT,
                    m.verdict,
                    m.track_id,
                    m.attribute
                );
                false
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("sink: worker stopped, dropping measurement");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the sink on a dedicated thread; the frame pipeline only waits on a
/// full queue.
pub struct SinkWorker {
    handle: SinkHandle,
    join: JoinHandle<u64>,
}

impl SinkWorker {
    pub fn spawn(sink: Box<dyn ResultSink>, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded(capacity.max(1));
        let join = thread::Builder::new()
            .name("result-sink".to_string())
            .spawn(move || run(sink, rx))
            .context("spawn result sink worker")?;
        Ok(Self {
            handle: SinkHandle {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            join,
        })
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// Drain everything queued so far, then stop the worker. Returns the
    /// number of measurements delivered.
    pub fn shutdown(self) -> Result<u64> {
        // Blocking send: shutdown waits for queue space.
        let _ = self.handle.tx.send(SinkCommand::Shutdown);
        let delivered = self
            .join
            .join()
            .map_err(|_| anyhow!("result sink worker panicked"))?;
        log::info!(
            "sink: worker stopped, delivered={} dropped={}",
            delivered,
            self.handle.dropped()
        );
        Ok(delivered)
    }
}

fn run(mut sink: Box<dyn ResultSink>, rx: Receiver<SinkCommand>) -> u64 {
    let mut delivered = 0;
    for command in rx {
        match command {
            SinkCommand::Deliver(m) => {
                deliver(sink.as_mut(), &m);
                delivered += 1;
            }
            SinkCommand::Shutdown => break,
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::sink::{Alert, StatusWrite};
    use crate::speed::{SpeedCalculator, SpeedUnit, Verdict};
    use crossbeam_channel::unbounded;

    fn measurement(track_id: u64, elapsed: f64) -> Measurement {
        SpeedCalculator::new(30.0, 15.0, SpeedUnit::PerSecond)
            .unwrap()
            .measure(track_id, "Gray".into(), elapsed, 1_700_000_000.0)
    }

    #[test]
    fn delivers_everything_queued_before_shutdown() {
        let sink = MemorySink::new();
        let worker = SinkWorker::spawn(Box::new(sink.clone()), 16).unwrap();
        let handle = worker.handle();
        assert!(handle.submit(measurement(0, 2.0)));
        assert!(handle.submit(measurement(1, 1.0)));

        assert_eq!(worker.shutdown().unwrap(), 2);
        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.statuses().len(), 2);
        assert_eq!(sink.alerts().len(), 1);
    }

    #[test]
    fn submit_after_shutdown_is_dropped() {
        let worker = SinkWorker::spawn(Box::new(MemorySink::new()), 4).unwrap();
        let handle = worker.handle();
        worker.shutdown().unwrap();
        assert!(!handle.submit(measurement(0, 2.0)));
        assert_eq!(handle.dropped(), 1);
    }

    /// Blocks every log append until the gate sender is dropped.
    struct GatedSink {
        gate: Receiver<()>,
        inner: MemorySink,
    }

    impl ResultSink for GatedSink {
        fn append_log(&mut self, m: &Measurement) -> Result<()> {
            let _ = self.gate.recv();
            self.inner.append_log(m)
        }
        fn upsert_status(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()> {
            self.inner.upsert_status(key, speed, verdict)
        }
        fn send_alert(&mut self, alert: &Alert) -> Result<()> {
            self.inner.send_alert(alert)
        }
    }

    fn gated(capacity: usize) -> (SinkWorker, MemorySink, Sender<()>) {
        let (open, gate) = unbounded();
        let sink = MemorySink::new();
        let worker = SinkWorker::spawn(
            Box::new(GatedSink {
                gate,
                inner: sink.clone(),
            }),
            capacity,
        )
        .unwrap();
        (worker, sink, open)
    }

    #[test]
    fn brief_sink_stall_does_not_drop_measurements() {
        let (worker, sink, open) = gated(1);
        let handle = worker.handle();
        let release = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(open);
        });

        for id in 0..3 {
            assert!(handle.submit(measurement(id, 1.0)));
        }
        release.join().unwrap();
        assert_eq!(handle.dropped(), 0);
        assert_eq!(worker.shutdown().unwrap(), 3);
        assert_eq!(sink.alerts().len(), 3);
        let ids: Vec<u64> = sink.measurements().iter().map(|m| m.track_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn stalled_sink_drops_after_submit_timeout() {
        let (worker, sink, open) = gated(1);
        let handle = worker.handle();

        assert!(handle.submit(measurement(0, 2.0)));
        assert!(handle.submit(measurement(1, 2.0)));
        assert!(!handle.submit(measurement(2, 2.0)));
        assert_eq!(handle.dropped(), 1);

        drop(open);
        assert_eq!(worker.shutdown().unwrap(), 2);
        assert_eq!(
            sink.statuses().last(),
            Some(&StatusWrite {
                key: "Gray".into(),
                speed: 15.0,
                verdict: Verdict::Ok
            })
        );
    }
}
