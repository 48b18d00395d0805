use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::loader::DecodedImage;

// ---------------------------------------------------------------------------
// Slot state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Empty = 0,
    Loading = 1,
    Loaded = 2,
    Failed = 3,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotState::Loading,
            2 => SlotState::Loaded,
            3 => SlotState::Failed,
            _ => SlotState::Empty,
        }
    }
}

/// Everything behind the slot lock.
pub(crate) struct SlotInner {
    pub state: SlotState,
    pub error: Option<String>,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Per-file decode and cache state.
///
/// `inner` is held for the whole duration of a decode, so whoever owns the
/// lock is the only thread that can move the slot out of `Empty`. The decoded
/// image lives outside the lock: it is written once, before the state turns
/// `Loaded`, and is read lock-free afterwards.
pub struct Slot {
    index: usize,
    path: PathBuf,
    name: String,
    inner: Mutex<SlotInner>,
    /// Lock-free mirror of `inner.state` for peeking.
    state: AtomicU8,
    decoded: OnceLock<Arc<DecodedImage>>,
    scaled: Mutex<Option<Arc<DecodedImage>>>,
    /// Set while a prefetch task for this slot sits in the pool.
    queued: AtomicBool,
}

impl Slot {
    fn new(index: usize, dir: &Path, name: String) -> Self {
        Self {
            index,
            path: dir.join(&name),
            name,
            inner: Mutex::new(SlotInner {
                state: SlotState::Empty,
                error: None,
                attempts: 0,
            }),
            state: AtomicU8::new(SlotState::Empty as u8),
            decoded: OnceLock::new(),
            scaled: Mutex::new(None),
            queued: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The decoded image, once the slot is `Loaded`.
    pub fn decoded(&self) -> Option<&Arc<DecodedImage>> {
        self.decoded.get()
    }

    /// Decode error message, if the slot is `Failed`.
    pub fn failure(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock()
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, SlotInner>> {
        self.inner.try_lock()
    }

    /// Must be called with `inner` held.
    pub(crate) fn set_state(&self, inner: &mut SlotInner, state: SlotState) {
        inner.state = state;
        self.state.store(state as u8, Ordering::Release);
    }

    /// Must be called with `inner` held, on a slot that is not yet `Loaded`.
    pub(crate) fn publish(&self, inner: &mut SlotInner, image: Arc<DecodedImage>) {
        if self.decoded.set(image).is_err() {
            log::error!("slot {} published twice", self.index);
        }
        inner.error = None;
        self.set_state(inner, SlotState::Loaded);
    }

    pub fn scaled(&self) -> Option<Arc<DecodedImage>> {
        self.scaled.lock().clone()
    }

    pub(crate) fn set_scaled(&self, image: Arc<DecodedImage>) {
        *self.scaled.lock() = Some(image);
    }

    pub(crate) fn clear_scaled(&self) {
        *self.scaled.lock() = None;
    }

    /// Returns false if a prefetch task for this slot is already pending.
    pub(crate) fn mark_queued(&self) -> bool {
        self.queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// All slots of one opened directory. Never reused across opens: a new
/// directory gets a new `Store` stamped with a new generation.
pub struct Store {
    dir: PathBuf,
    generation: u64,
    slots: Vec<Slot>,
}

impl Store {
    pub fn allocate(dir: &Path, filenames: Vec<String>, generation: u64) -> Self {
        let slots = filenames
            .into_iter()
            .enumerate()
            .map(|(i, name)| Slot::new(i, dir, name))
            .collect();
        Self {
            dir: dir.to_path_buf(),
            generation,
            slots,
        }
    }

    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn position(&self, filename: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == filename)
    }
}
