use image::imageops::FilterType;
use image::RgbaImage;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, ViewerError};
use crate::slots::{Slot, SlotInner, SlotState, Store};

// ---------------------------------------------------------------------------
// Decoded image data (CPU side)
// ---------------------------------------------------------------------------

pub struct DecodedImage {
    pub pixels: RgbaImage,
    pub file_size: u64,
    pub format_name: String,
}

impl DecodedImage {
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            file_size: 0,
            format_name: String::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn mem_size(&self) -> u64 {
        self.pixels.as_raw().len() as u64
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// The two pure operations the core needs from an image library.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;

    /// Resize to exactly `width` x `height`. Callers pick dimensions that
    /// keep the aspect ratio.
    fn scale(&self, image: &DecodedImage, width: u32, height: u32) -> DecodedImage;
}

/// Codec backed by the `image` crate.
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let img = image::open(path).map_err(|e| ViewerError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let format_name = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_uppercase();

        Ok(DecodedImage {
            pixels: img.to_rgba8(),
            file_size,
            format_name,
        })
    }

    fn scale(&self, image: &DecodedImage, width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            pixels: image::imageops::resize(&image.pixels, width, height, FilterType::Triangle),
            file_size: image.file_size,
            format_name: image.format_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Wait for the slot lock. Only the foreground uses this.
    Blocking,
    /// Give up at once if someone else holds the slot.
    Opportunistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed,
    /// Opportunistic load found the slot locked. Not an error.
    Busy,
    /// The store belongs to a directory that is no longer open.
    Stale,
}

/// Drives the `Empty -> Loading -> Loaded | Failed` transition of slots.
///
/// The decode for a slot runs with the slot lock held, so it happens at most
/// once no matter how many threads ask for it.
pub struct Loader {
    codec: Arc<dyn ImageCodec>,
    live_generation: Arc<AtomicU64>,
    max_attempts: u32,
    discarded: AtomicUsize,
}

impl Loader {
    pub fn new(codec: Arc<dyn ImageCodec>, live_generation: Arc<AtomicU64>, max_attempts: u32) -> Self {
        Self {
            codec,
            live_generation,
            max_attempts: max_attempts.max(1),
            discarded: AtomicUsize::new(0),
        }
    }

    /// Number of decode results thrown away because their directory was closed.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    fn is_stale(&self, store: &Store) -> bool {
        store.generation() != self.live_generation.load(Ordering::Acquire)
    }

    pub fn load(&self, store: &Store, index: usize, mode: LoadMode) -> LoadOutcome {
        let slot = store.get(index);
        let mut inner = match mode {
            LoadMode::Blocking => slot.lock(),
            LoadMode::Opportunistic => match slot.try_lock() {
                Some(guard) => guard,
                None => return LoadOutcome::Busy,
            },
        };

        let state = inner.state;
        match state {
            SlotState::Loaded => LoadOutcome::Loaded,
            SlotState::Failed => LoadOutcome::Failed,
            // `Loading` under the lock means a decode unwound mid-way.
            SlotState::Empty | SlotState::Loading => self.decode_locked(store, slot, &mut inner),
        }
    }

    /// Give a `Failed` slot another decode, up to `max_attempts` in total.
    /// On any other slot this is a plain blocking load.
    pub fn retry(&self, store: &Store, index: usize) -> LoadOutcome {
        let slot = store.get(index);
        let mut inner = slot.lock();
        let state = inner.state;
        match state {
            SlotState::Loaded => LoadOutcome::Loaded,
            SlotState::Failed if inner.attempts >= self.max_attempts => {
                log::info!(
                    "Not retrying {:?}: {} attempts used",
                    slot.path(),
                    inner.attempts
                );
                LoadOutcome::Failed
            }
            _ => {
                slot.set_state(&mut inner, SlotState::Empty);
                self.decode_locked(store, slot, &mut inner)
            }
        }
    }

    fn decode_locked(&self, store: &Store, slot: &Slot, inner: &mut SlotInner) -> LoadOutcome {
        if self.is_stale(store) {
            return LoadOutcome::Stale;
        }

        slot.set_state(inner, SlotState::Loading);
        inner.attempts += 1;
        let result = self.codec.decode(slot.path());

        if self.is_stale(store) {
            slot.set_state(inner, SlotState::Empty);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!("Discarding stale decode of {:?}", slot.path());
            return LoadOutcome::Stale;
        }

        match result {
            Ok(decoded) => {
                log::debug!("Decoded {:?} ({} bytes)", slot.path(), decoded.mem_size());
                slot.publish(inner, Arc::new(decoded));
                LoadOutcome::Loaded
            }
            Err(e) => {
                log::warn!("{}", e);
                inner.error = Some(e.to_string());
                slot.set_state(inner, SlotState::Failed);
                LoadOutcome::Failed
            }
        }
    }
}
