//! Producer-facing receiver: accept one connection, run a session over it
//! until it closes, then accept the next.

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::classify::AttributeClassifier;
use crate::config::ReceiverConfig;
use crate::detect::DetectorBackend;
use crate::ingest::FrameReader;
use crate::session::{Session, SessionEnd};
use crate::sink::SinkHandle;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

type ActiveStream = Arc<Mutex<Option<TcpStream>>>;

pub struct ReceiverServer {
    config: ReceiverConfig,
}

#[derive(Debug)]
pub struct ReceiverHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    active: ActiveStream,
    sessions: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Number of connections served to completion so far.
    pub fn sessions_completed(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Stop accepting, close any live producer connection and wait for the
    /// receiver thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        close_active(&self.active);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("receiver thread panicked"))?;
        }
        Ok(())
    }
}

impl ReceiverServer {
    pub fn new(config: ReceiverConfig) -> Self {
        Self { config }
    }

    /// Bind the listen address and serve on a background thread.
    pub fn spawn(
        self,
        detector: Box<dyn DetectorBackend>,
        classifier: Box<dyn AttributeClassifier>,
        sink: SinkHandle,
    ) -> Result<ReceiverHandle> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .with_context(|| format!("bind receiver on {}", self.config.listen_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("receiver listening on {}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let active: ActiveStream = Arc::new(Mutex::new(None));
        let sessions = Arc::new(AtomicU64::new(0));

        let state = ServeState {
            config: self.config,
            shutdown: shutdown.clone(),
            active: active.clone(),
            sessions: sessions.clone(),
        };
        let join = std::thread::Builder::new()
            .name("receiver".to_string())
            .spawn(move || {
                if let Err(err) = run_receiver(listener, state, detector, classifier, sink) {
                    log::error!("receiver stopped: {:#}", err);
                }
            })?;

        Ok(ReceiverHandle {
            addr,
            shutdown,
            active,
            sessions,
            join: Some(join),
        })
    }
}

struct ServeState {
    config: ReceiverConfig,
    shutdown: Arc<AtomicBool>,
    active: ActiveStream,
    sessions: Arc<AtomicU64>,
}

fn run_receiver(
    listener: TcpListener,
    state: ServeState,
    mut detector: Box<dyn DetectorBackend>,
    classifier: Box<dyn AttributeClassifier>,
    sink: SinkHandle,
) -> Result<()> {
    loop {
        if state.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("producer connected from {}", peer);
                if let Err(err) =
                    serve_connection(stream, &state, detector.as_mut(), classifier.as_ref(), &sink)
                {
                    log::warn!("producer {} session aborted: {:#}", peer, err);
                }
                state.sessions.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    log::info!("receiver shutting down");
    Ok(())
}

fn serve_connection(
    stream: TcpStream,
    state: &ServeState,
    detector: &mut dyn DetectorBackend,
    classifier: &dyn AttributeClassifier,
    sink: &SinkHandle,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let reader_stream = stream.try_clone()?;
    let mut session = Session::new(&state.config, detector, classifier)?;
    set_active(&state.active, Some(stream))?;
    // Shutdown may have been requested between accept and registration.
    if state.shutdown.load(Ordering::SeqCst) {
        close_active(&state.active);
    }

    let mut reader = FrameReader::spawn(
        reader_stream,
        state.config.max_frame_bytes,
        state.config.reader_queue,
    )?;
    let end = session.run(&mut reader, sink);

    close_active(&state.active);
    set_active(&state.active, None)?;
    let channel = reader.finish()?;
    let stats = session.stats();

    match end {
        SessionEnd::ConnectionClosed => log::info!(
            "producer {} disconnected: frames={} skipped={} measurements={} bytes={}",
            peer,
            stats.frames,
            stats.skipped_frames,
            stats.measurements,
            channel.bytes_read
        ),
        SessionEnd::Failed(err) => log::warn!(
            "producer {} dropped after {} frames: {}",
            peer,
            stats.frames,
            err
        ),
    }
    Ok(())
}

fn set_active(active: &ActiveStream, stream: Option<TcpStream>) -> Result<()> {
    let mut slot = active
        .lock()
        .map_err(|_| anyhow!("active connection lock poisoned"))?;
    *slot = stream;
    Ok(())
}

fn close_active(active: &ActiveStream) {
    if let Ok(slot) = active.lock() {
        if let Some(stream) = slot.as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
