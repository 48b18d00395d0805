use std::sync::Arc;

use crate::loader::{DecodedImage, ImageCodec};
use crate::slots::{Slot, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub fn fit_scale(img_w: f32, img_h: f32, win_w: f32, win_h: f32) -> f32 {
    (win_w / img_w).min(win_h / img_h)
}

/// Target size for an image of `native` size shown in `viewport`.
/// Keeps the aspect ratio and never upscales.
pub fn fit_within(native: (u32, u32), viewport: Viewport) -> (u32, u32) {
    let (w, h) = native;
    if w == 0 || h == 0 {
        return (w, h);
    }
    let bound_w = viewport.width.clamp(1, w);
    let bound_h = viewport.height.clamp(1, h);
    let scale = fit_scale(w as f32, h as f32, bound_w as f32, bound_h as f32);
    let tw = ((w as f32 * scale).round() as u32).clamp(1, bound_w);
    let th = ((h as f32 * scale).round() as u32).clamp(1, bound_h);
    (tw, th)
}

// ---------------------------------------------------------------------------
// Render cache
// ---------------------------------------------------------------------------

/// Produces viewport-fitted images and keeps one per slot until the next resize.
pub struct RenderCache {
    codec: Arc<dyn ImageCodec>,
}

impl RenderCache {
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self { codec }
    }

    /// Returns `None` when the slot holds no decoded image (failed or never
    /// loaded); the host shows a placeholder then.
    pub fn render(&self, slot: &Slot, viewport: Viewport) -> Option<Arc<DecodedImage>> {
        if let Some(scaled) = slot.scaled() {
            return Some(scaled);
        }
        let decoded = slot.decoded()?;
        let native = (decoded.width(), decoded.height());
        let (tw, th) = fit_within(native, viewport);

        let scaled = if (tw, th) == native {
            Arc::clone(decoded)
        } else {
            Arc::new(self.codec.scale(decoded, tw, th))
        };
        slot.set_scaled(Arc::clone(&scaled));
        Some(scaled)
    }

    pub fn invalidate_all(&self, store: &Store) {
        for slot in store.iter() {
            slot.clear_scaled();
        }
    }
}
