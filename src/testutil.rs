//! Shared helpers for unit tests.

use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Result, ViewerError};
use crate::loader::{DecodedImage, ImageCodec};
use crate::slots::Store;

/// Codec that never touches the disk.
///
/// Files whose name contains `bad` fail to decode. When gated, files whose
/// name starts with `held` block inside `decode` until `open_gate` is called.
pub struct FakeCodec {
    width: u32,
    height: u32,
    delay: Duration,
    gated: bool,
    decodes: AtomicUsize,
    scales: AtomicUsize,
    started: AtomicUsize,
    gate: (Mutex<bool>, Condvar),
}

impl FakeCodec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            delay: Duration::ZERO,
            gated: false,
            decodes: AtomicUsize::new(0),
            scales: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            gate: (Mutex::new(false), Condvar::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn scales(&self) -> usize {
        self.scales.load(Ordering::SeqCst)
    }

    pub fn open_gate(&self) {
        let (lock, cvar) = &self.gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Wait until `n` gated decodes are parked at the gate.
    pub fn wait_for_started(&self, n: usize) {
        wait_until(|| self.started.load(Ordering::SeqCst) >= n);
    }
}

impl ImageCodec for FakeCodec {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if self.gated && name.starts_with("held") {
            self.started.fetch_add(1, Ordering::SeqCst);
            let (lock, cvar) = &self.gate;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if name.contains("bad") {
            return Err(ViewerError::Decode {
                path: path.to_path_buf(),
                message: "corrupt JPEG data".into(),
            });
        }
        Ok(DecodedImage::from_pixels(RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([200, 100, 50, 255]),
        )))
    }

    fn scale(&self, image: &DecodedImage, width: u32, height: u32) -> DecodedImage {
        self.scales.fetch_add(1, Ordering::SeqCst);
        DecodedImage::from_pixels(image::imageops::resize(
            &image.pixels,
            width,
            height,
            image::imageops::FilterType::Nearest,
        ))
    }
}

pub fn store_of(names: &[&str], generation: u64) -> Store {
    Store::allocate(
        Path::new("/photos"),
        names.iter().map(|s| s.to_string()).collect(),
        generation,
    )
}

/// Spin until `cond` holds; panics after five seconds.
pub fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}
