mod cli;
mod error;
mod files;
mod loader;
mod prefetch;
mod protect;
mod render_cache;
mod slots;
mod timer;
mod ui;
mod viewer;

#[cfg(test)]
mod testutil;

use clap::Parser;
use std::process;
use std::sync::Arc;
use winit::event_loop::EventLoop;

use crate::cli::Cli;
use crate::files::resolve_target;
use crate::loader::ImageCrateCodec;
use crate::render_cache::Viewport;
use crate::ui::{App, INITIAL_SIZE};
use crate::viewer::Viewer;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.to_config();
    log::debug!(
        "window {} / {} workers / extensions {:?}",
        config.prefetch_window,
        config.workers,
        config.extensions
    );

    let (dir, start_file) = match resolve_target(&cli.path) {
        Ok(t) => t,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let viewport = Viewport::new(INITIAL_SIZE.0, INITIAL_SIZE.1);
    let mut viewer = match Viewer::new(config, Arc::new(ImageCrateCodec), viewport) {
        Ok(v) => v,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let frame = match viewer.open(&dir, start_file.as_deref()) {
        Ok(frame) => frame,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };
    if frame.is_none() {
        log::warn!("No photos found in {:?}", dir);
    }

    let event_loop = match EventLoop::new() {
        Ok(l) => l,
        Err(e) => {
            log::error!("Could not create event loop: {}", e);
            process::exit(1);
        }
    };

    let mut app = App::new(viewer, frame);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("{}", e);
    }
    app.viewer.timings().log_report();
}
