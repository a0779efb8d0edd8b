//! Frame server - streams a raw RGBA clip (or a test pattern) over WebSocket
//!
//! Usage: `frame-server [--port N] [--size WxH] [--fps F] [--frames N] [--headered] [--file PATH]`

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use stream_preview::playback::{frame_interval, RawVideo};
use stream_preview::stream::{FrameFeed, FrameServer, ServerOptions};
use stream_preview::transfer::FrameSize;

struct Args {
    port: u16,
    size: FrameSize,
    frames: usize,
    file: Option<PathBuf>,
    options: ServerOptions,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self {
            port: 9001,
            size: FrameSize::new(256, 256),
            frames: 60,
            file: None,
            options: ServerOptions::default(),
        };

        while let Some(arg) = args.next() {
            let mut value = || args.next().with_context(|| format!("{} needs a value", arg));
            match arg.as_str() {
                "--port" => parsed.port = value()?.parse().context("invalid --port")?,
                "--size" => parsed.size = parse_size(&value()?)?,
                "--fps" => parsed.options.fps = value()?.parse().context("invalid --fps")?,
                "--frames" => parsed.frames = value()?.parse().context("invalid --frames")?,
                "--file" => parsed.file = Some(PathBuf::from(value()?)),
                "--headered" => parsed.options.headered = true,
                other => bail!("unknown argument: {}", other),
            }
        }

        if frame_interval(parsed.options.fps).is_none() {
            bail!("--fps must be a usable positive rate, got {}", parsed.options.fps);
        }
        if parsed.frames == 0 {
            bail!("--frames must be at least 1");
        }
        Ok(parsed)
    }
}

fn parse_size(value: &str) -> anyhow::Result<FrameSize> {
    let (width, height) = value
        .split_once('x')
        .with_context(|| format!("size must look like WIDTHxHEIGHT, got {}", value))?;
    let size = FrameSize::new(width.parse()?, height.parse()?);
    if size.is_empty() {
        bail!("size must be non-zero");
    }
    Ok(size)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    let feed: Arc<dyn FrameFeed> = match &args.file {
        Some(path) => Arc::new(RawVideo::open(path, args.size)?),
        None => Arc::new(RawVideo::test_pattern(args.size, args.frames)),
    };

    let server = FrameServer::bind(("0.0.0.0", args.port), feed, args.options).await?;
    server.run().await
}
