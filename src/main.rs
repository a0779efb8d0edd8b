//! Stream Preview - live frame preview window
//!
//! Usage: `stream-preview [ws://url | config.json | clip.rgba]`

use std::sync::Arc;
use stream_preview::{LaunchTarget, PreviewApp, PreviewConfig};
use winit::dpi::LogicalSize;
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Starting Stream Preview v{}", env!("CARGO_PKG_VERSION"));

    let target = LaunchTarget::from_arg(std::env::args().nth(1).as_deref());
    let mut config = PreviewConfig::for_target(&target)?;
    config.apply_env();

    if target == LaunchTarget::Pick && config.source.is_none() {
        let picked = rfd::FileDialog::new()
            .add_filter("Raw RGBA", &["rgba", "raw"])
            .add_filter("All Files", &["*"])
            .pick_file();
        match picked {
            Some(path) => config.source = Some(config.raw_file(path)),
            None => log::info!("No file selected, drop a clip onto the window to start"),
        }
    }

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(&config.window.title)
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)?;

    let mut app = PreviewApp::new(config, Arc::new(window))?;
    event_loop.run(move |event, elwt| app.handle_event(event, elwt))?;

    log::info!("Stream Preview exited");
    Ok(())
}
