use std::io::Write;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgb, RgbImage};

use speedtrap_kernel::detect::{BBox, Detection, StubBackend};
use speedtrap_kernel::sink::{MemorySink, SinkWorker};
use speedtrap_kernel::{
    encode_frame, DominantColorClassifier, ReceiverConfig, ReceiverHandle, ReceiverServer,
    SpeedUnit,
};

fn config() -> ReceiverConfig {
    let mut cfg = ReceiverConfig::default();
    cfg.listen_addr = "127.0.0.1:0".to_string();
    cfg.boundaries.first = 100;
    cfg.boundaries.second = 200;
    cfg.distance = 30.0;
    cfg.speed_limit = 15.0;
    cfg.unit = SpeedUnit::PerSecond;
    cfg
}

fn green_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(320, 120, Rgb([20, 180, 20]));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), 320, 120, image::ExtendedColorType::Rgb8)
        .expect("encode png");
    out
}

fn car(x: i32) -> Detection {
    Detection::new(BBox::new(x - 10, 40, x + 10, 60), 2, 0.9)
}

fn wait_for_sessions(handle: &ReceiverHandle, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.sessions_completed() < count {
        assert!(Instant::now() < deadline, "receiver never finished session {}", count);
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn send_pass(handle: &ReceiverHandle, payload: &[u8]) {
    let mut stream = TcpStream::connect(handle.addr).expect("connect");
    for (i, t) in [10.0, 11.0, 12.0].into_iter().enumerate() {
        let message = encode_frame(t, payload).expect("encode");
        // Split each message to exercise partial reads on the receiver.
        let (head, tail) = message.split_at(5 + i);
        stream.write_all(head).expect("write");
        stream.flush().expect("flush");
        stream.write_all(tail).expect("write");
    }
}

#[test]
fn receiver_serves_successive_producers() {
    // The stub replays its script on every new connection.
    let detector = StubBackend::with_script(vec![vec![car(90)], vec![car(110)], vec![car(210)]]);
    let sink = MemorySink::new();
    let worker = SinkWorker::spawn(Box::new(sink.clone()), 16).expect("sink worker");

    let handle = ReceiverServer::new(config())
        .spawn(
            Box::new(detector),
            Box::new(DominantColorClassifier::new()),
            worker.handle(),
        )
        .expect("spawn receiver");

    let payload = green_png();
    send_pass(&handle, &payload);
    wait_for_sessions(&handle, 1);
    send_pass(&handle, &payload);
    wait_for_sessions(&handle, 2);

    // A malformed header drops only that connection.
    {
        let mut stream = TcpStream::connect(handle.addr).expect("connect");
        let mut header = Vec::new();
        header.extend(1.0f64.to_le_bytes());
        header.extend(u32::MAX.to_le_bytes());
        stream.write_all(&header).expect("write");
    }
    wait_for_sessions(&handle, 3);

    handle.stop().expect("stop receiver");
    worker.shutdown().expect("stop sink");

    let statuses = sink.statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.key == "Green" && s.speed == 30.0));
    assert_eq!(sink.alerts().len(), 2);

    // Each connection starts numbering tracks from zero again.
    let ids: Vec<u64> = sink.measurements().iter().map(|m| m.track_id).collect();
    assert_eq!(ids, vec![0, 0]);
}

#[test]
fn stop_closes_an_idle_producer_connection() {
    let sink = MemorySink::new();
    let worker = SinkWorker::spawn(Box::new(sink.clone()), 4).expect("sink worker");
    let handle = ReceiverServer::new(config())
        .spawn(
            Box::new(StubBackend::new()),
            Box::new(DominantColorClassifier::new()),
            worker.handle(),
        )
        .expect("spawn receiver");

    let _idle = TcpStream::connect(handle.addr).expect("connect");
    std::thread::sleep(Duration::from_millis(200));

    handle.stop().expect("stop receiver");
    worker.shutdown().expect("stop sink");
    assert!(sink.lines().is_empty());
}
