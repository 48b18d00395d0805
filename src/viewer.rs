use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::files::{scan_dir, DEFAULT_EXTENSIONS};
use crate::loader::{DecodedImage, ImageCodec, LoadMode, LoadOutcome, Loader};
use crate::prefetch::Prefetcher;
use crate::protect;
use crate::render_cache::{RenderCache, Viewport};
use crate::slots::Store;
use crate::timer::{Span, Timings};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub extensions: Vec<String>,
    pub prefetch_window: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub quiet_timings: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            prefetch_window: 10,
            workers: 4,
            max_attempts: 3,
            quiet_timings: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame handed to the host after every navigation
// ---------------------------------------------------------------------------

pub struct Frame {
    pub index: usize,
    pub count: usize,
    pub filename: String,
    /// Viewport-fitted image; `None` means show a placeholder.
    pub image: Option<Arc<DecodedImage>>,
    pub error: Option<String>,
    pub protected: bool,
}

struct Session {
    store: Arc<Store>,
    current: Option<usize>,
}

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

/// Wires scanner, slot store, loader, prefetcher and render cache together
/// behind the four host commands: open, switch, resize, toggle_protection.
pub struct Viewer {
    config: ViewerConfig,
    generation: Arc<AtomicU64>,
    loader: Arc<Loader>,
    renderer: RenderCache,
    prefetcher: Prefetcher,
    session: Option<Session>,
    viewport: Viewport,
    timings: Timings,
}

impl Viewer {
    pub fn new(config: ViewerConfig, codec: Arc<dyn ImageCodec>, viewport: Viewport) -> Result<Self> {
        let generation = Arc::new(AtomicU64::new(0));
        let loader = Arc::new(Loader::new(
            Arc::clone(&codec),
            Arc::clone(&generation),
            config.max_attempts,
        ));
        let prefetcher = Prefetcher::new(config.workers, config.prefetch_window)?;
        log::info!(
            "Prefetching {} ahead on {} workers",
            prefetcher.window(),
            prefetcher.workers()
        );
        Ok(Self {
            timings: Timings::new(config.quiet_timings),
            config,
            generation,
            loader,
            renderer: RenderCache::new(codec),
            prefetcher,
            session: None,
            viewport,
        })
    }

    /// Open `dir`, starting at `start_file` if it is part of the listing.
    ///
    /// If the directory cannot be read, the previous session stays as it was.
    pub fn open(&mut self, dir: &Path, start_file: Option<&str>) -> Result<Option<Frame>> {
        log::info!("Opening {:?}", dir);
        let filenames = scan_dir(dir, &self.config.extensions)?;

        let generation = self.generation.load(Ordering::Acquire) + 1;
        let store = Arc::new(Store::allocate(dir, filenames, generation));
        // Stale tasks compare against this before writing anything.
        self.generation.store(generation, Ordering::Release);

        let start = match start_file {
            Some(name) => store.position(name).or_else(|| {
                log::warn!("{} is not among the photos of {:?}, starting at the first", name, dir);
                (!store.is_empty()).then_some(0)
            }),
            None => (!store.is_empty()).then_some(0),
        };
        self.session = Some(Session { store, current: None });

        Ok(start.map(|i| self.switch(i)))
    }

    /// Show slot `index`. Panics if no directory is open or `index` is out of range.
    pub fn switch(&mut self, index: usize) -> Frame {
        let Some(session) = self.session.as_mut() else {
            panic!("switch({}) without an open directory", index);
        };
        let store = Arc::clone(&session.store);
        let filename = store.get(index).filename().to_string();
        log::debug!("Switching to {}", filename);
        session.current = Some(index);

        let mut span = Span::start();
        self.prefetcher.schedule(&store, &self.loader, index);
        span.segment("launching preload");

        let outcome = self.loader.load(&store, index, LoadMode::Blocking);
        span.segment("loading");
        debug_assert!(matches!(outcome, LoadOutcome::Loaded | LoadOutcome::Failed));

        let frame = self.frame(&store, index);
        span.segment("scaling");
        self.timings.record(span);
        frame
    }

    fn frame(&self, store: &Store, index: usize) -> Frame {
        let slot = store.get(index);
        let image = self.renderer.render(slot, self.viewport);
        let protected = protect::is_protected(store.dir(), slot.filename()).unwrap_or_else(|e| {
            log::warn!("{}", e);
            false
        });
        Frame {
            index,
            count: store.len(),
            filename: slot.filename().to_string(),
            image,
            error: slot.failure(),
            protected,
        }
    }

    pub fn resize(&mut self, viewport: Viewport) -> Option<Frame> {
        self.viewport = viewport;
        let session = self.session.as_ref()?;
        self.renderer.invalidate_all(&session.store);
        let index = session.current?;
        let store = Arc::clone(&session.store);
        Some(self.frame(&store, index))
    }

    /// Flip protection of the current photo and its related files.
    /// Returns the new state, or `None` when nothing is shown.
    pub fn toggle_protection(&mut self) -> Result<Option<bool>> {
        let Some((store, index)) = self.current() else {
            return Ok(None);
        };
        let name = store.get(index).filename();
        let now_protected = if protect::is_protected(store.dir(), name)? {
            protect::unprotect(store.dir(), name)?;
            false
        } else {
            protect::protect(store.dir(), name)?;
            true
        };
        log::info!("{} {}", name, if now_protected { "protected" } else { "unprotected" });
        Ok(Some(now_protected))
    }

    /// Decode the current photo again if it failed and attempts remain.
    pub fn retry_current(&mut self) -> Option<Frame> {
        let (store, index) = self.current()?;
        self.loader.retry(&store, index);
        Some(self.frame(&store, index))
    }

    fn current(&self) -> Option<(Arc<Store>, usize)> {
        let session = self.session.as_ref()?;
        Some((Arc::clone(&session.store), session.current?))
    }

    fn step(&mut self, forward: bool) -> Option<Frame> {
        let (store, index) = self.current()?;
        let len = store.len();
        let next = if forward { (index + 1) % len } else { (index + len - 1) % len };
        Some(self.switch(next))
    }

    pub fn next(&mut self) -> Option<Frame> {
        self.step(true)
    }

    pub fn prev(&mut self) -> Option<Frame> {
        self.step(false)
    }

    pub fn first(&mut self) -> Option<Frame> {
        self.current()?;
        Some(self.switch(0))
    }

    pub fn last(&mut self) -> Option<Frame> {
        let (store, _) = self.current()?;
        Some(self.switch(store.len() - 1))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.current)
    }

    pub fn store(&self) -> Option<&Arc<Store>> {
        self.session.as_ref().map(|s| &s.store)
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        // Let in-flight prefetches discard their results.
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotState;
    use crate::testutil::{wait_until, FakeCodec};
    use std::fs;
    use tempfile::TempDir;

    fn dir_with(names: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for name in names {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        tmp
    }

    fn viewer(codec: Arc<FakeCodec>, window: usize) -> Viewer {
        let config = ViewerConfig {
            prefetch_window: window,
            workers: 2,
            ..ViewerConfig::default()
        };
        Viewer::new(config, codec, Viewport::new(100, 100)).unwrap()
    }

    #[test]
    fn open_shows_first_photo_loaded() {
        let tmp = dir_with(&["b.jpg", "a.jpg", "c.png"]);
        let codec = Arc::new(FakeCodec::new(400, 200));
        let mut v = viewer(codec, 3);

        let frame = v.open(tmp.path(), None).unwrap().unwrap();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.count, 2);
        assert_eq!(frame.filename, "a.jpg");
        let img = frame.image.unwrap();
        assert_eq!((img.width(), img.height()), (100, 50));
        assert!(!frame.protected);
        assert_eq!(v.store().unwrap().get(0).state(), SlotState::Loaded);
    }

    #[test]
    fn open_at_start_file_and_fallback() {
        let tmp = dir_with(&["a.jpg", "b.jpg", "c.jpg"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 3);

        let frame = v.open(tmp.path(), Some("b.jpg")).unwrap().unwrap();
        assert_eq!(frame.index, 1);

        let frame = v.open(tmp.path(), Some("zzz.jpg")).unwrap().unwrap();
        assert_eq!(frame.index, 0);
    }

    #[test]
    fn open_empty_dir_has_no_current() {
        let tmp = dir_with(&["notes.txt"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 3);
        assert!(v.open(tmp.path(), None).unwrap().is_none());
        assert_eq!(v.current_index(), None);
        assert!(v.next().is_none());
        assert!(v.resize(Viewport::new(50, 50)).is_none());
        assert_eq!(v.toggle_protection().unwrap(), None);
    }

    #[test]
    fn failed_open_keeps_previous_session() {
        let tmp = dir_with(&["a.jpg", "b.jpg"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 3);
        v.open(tmp.path(), None).unwrap();
        let before = Arc::clone(v.store().unwrap());

        assert!(v.open(&tmp.path().join("missing"), None).is_err());
        assert!(Arc::ptr_eq(&before, v.store().unwrap()));
        assert_eq!(v.current_index(), Some(0));
        assert_eq!(v.next().unwrap().filename, "b.jpg");
    }

    #[test]
    fn switch_always_settles_the_slot() {
        let names: Vec<String> = (0..12).map(|i| format!("{:02}.jpg", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let tmp = dir_with(&refs);
        let codec = Arc::new(FakeCodec::new(20, 20));
        let mut v = viewer(Arc::clone(&codec), 4);
        v.open(tmp.path(), None).unwrap();

        for i in [1, 5, 2, 11, 0] {
            let frame = v.switch(i);
            assert!(frame.image.is_some());
            let state = v.store().unwrap().get(i).state();
            assert!(matches!(state, SlotState::Loaded | SlotState::Failed));
        }
        let store = Arc::clone(v.store().unwrap());
        wait_until(|| store.iter().all(|s| !s.is_queued()));
        // Every decode happened at most once.
        let loaded = store.iter().filter(|s| s.state() == SlotState::Loaded).count();
        assert_eq!(codec.decodes(), loaded);
    }

    #[test]
    fn decode_failure_yields_placeholder() {
        let tmp = dir_with(&["a.jpg", "bad.jpg"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 1);
        v.open(tmp.path(), None).unwrap();

        let frame = v.switch(1);
        assert!(frame.image.is_none());
        assert!(frame.error.unwrap().contains("corrupt"));
        assert_eq!(v.store().unwrap().get(1).state(), SlotState::Failed);

        let frame = v.retry_current().unwrap();
        assert!(frame.image.is_none());
        assert_eq!(v.store().unwrap().get(1).attempts(), 2);
    }

    #[test]
    fn navigation_wraps() {
        let tmp = dir_with(&["a.jpg", "b.jpg", "c.jpg"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 2);
        v.open(tmp.path(), None).unwrap();

        assert_eq!(v.prev().unwrap().filename, "c.jpg");
        assert_eq!(v.next().unwrap().filename, "a.jpg");
        assert_eq!(v.last().unwrap().index, 2);
        assert_eq!(v.first().unwrap().index, 0);
    }

    #[test]
    fn resize_invalidates_every_slot() {
        let tmp = dir_with(&["a.jpg", "b.jpg"]);
        let codec = Arc::new(FakeCodec::new(400, 300));
        let mut v = viewer(Arc::clone(&codec), 1);
        v.open(tmp.path(), None).unwrap();
        v.switch(1);
        v.switch(0);
        let store = Arc::clone(v.store().unwrap());
        assert!(store.get(1).scaled().is_some());

        let frame = v.resize(Viewport::new(200, 1000)).unwrap();
        assert_eq!(frame.index, 0);
        let img = frame.image.unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
        assert!(store.get(1).scaled().is_none());
        // Re-render, no re-decode.
        assert_eq!(codec.decodes(), 2);

        let frame = v.resize(Viewport::new(4000, 4000)).unwrap();
        let img = frame.image.unwrap();
        assert_eq!((img.width(), img.height()), (400, 300));
    }

    #[test]
    fn reopen_discards_stale_prefetch() {
        let old = dir_with(&["a0.jpg", "held1.jpg", "held2.jpg"]);
        let new = dir_with(&["n0.jpg", "n1.jpg", "n2.jpg"]);
        let codec = Arc::new(FakeCodec::new(10, 10).gated());
        let mut v = viewer(Arc::clone(&codec), 3);

        v.open(old.path(), None).unwrap();
        let old_store = Arc::clone(v.store().unwrap());
        codec.wait_for_started(2);

        v.open(new.path(), None).unwrap();
        let new_store = Arc::clone(v.store().unwrap());
        codec.open_gate();

        wait_until(|| v.loader().discarded() == 2);
        wait_until(|| old_store.iter().all(|s| !s.is_queued()));
        assert_eq!(old_store.get(1).state(), SlotState::Empty);
        assert_eq!(old_store.get(2).state(), SlotState::Empty);

        wait_until(|| new_store.iter().all(|s| !s.is_queued()));
        for slot in new_store.iter() {
            assert_eq!(slot.state(), SlotState::Loaded);
            assert!(slot.path().starts_with(new.path()));
        }
    }

    #[cfg(unix)]
    #[test]
    fn toggle_protection_flips_overlay_flag() {
        let tmp = dir_with(&["a.jpg", "a.cr2", "b.jpg"]);
        let mut v = viewer(Arc::new(FakeCodec::new(10, 10)), 1);
        v.open(tmp.path(), None).unwrap();

        assert_eq!(v.toggle_protection().unwrap(), Some(true));
        assert!(v.switch(0).protected);
        assert!(protect::is_protected(tmp.path(), "a.cr2").unwrap());
        assert!(!v.next().unwrap().protected);

        v.prev();
        assert_eq!(v.toggle_protection().unwrap(), Some(false));
        assert!(!v.switch(0).protected);
    }
}
