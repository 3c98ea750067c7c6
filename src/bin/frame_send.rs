//! frame_send - stream still images to a speed trap receiver.
//!
//! Each image file is sent as-is (JPEG or PNG) in the receiver's wire
//! format, stamped with the current wall-clock time.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use speedtrap_kernel::{encode_frame, now_s};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream image files to speedd")]
struct Args {
    /// Image file, or a directory of images sent in name order.
    path: PathBuf,

    /// Receiver address.
    #[arg(long, env = "SPEEDTRAP_TARGET_ADDR", default_value = "127.0.0.1:5000")]
    addr: String,

    /// Frames per second.
    #[arg(long, default_value_t = 10.0)]
    fps: f64,

    /// Start over after the last image until interrupted.
    #[arg(long = "loop")]
    repeat: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(anyhow!("--fps must be greater than zero"));
    }

    let files = collect_images(&args.path)?;
    if files.is_empty() {
        return Err(anyhow!("no images found at {}", args.path.display()));
    }
    log::info!("streaming {} image(s) to {}", files.len(), args.addr);

    let mut stream = TcpStream::connect(&args.addr)
        .with_context(|| format!("connect to receiver {}", args.addr))?;
    stream.set_nodelay(true)?;

    let interval = Duration::from_secs_f64(1.0 / args.fps);
    let mut sent = 0u64;
    loop {
        for file in &files {
            let started = Instant::now();
            let payload =
                std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
            let message = encode_frame(now_s()?, &payload)?;
            stream
                .write_all(&message)
                .context("receiver closed the connection")?;
            sent += 1;
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        if !args.repeat {
            break;
        }
    }
    log::info!("sent {} frame(s)", sent);
    Ok(())
}

fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(path).with_context(|| format!("read directory {}", path.display()))?
    {
        let entry_path = entry?.path();
        let is_image = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png")
            });
        if is_image && entry_path.is_file() {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}
