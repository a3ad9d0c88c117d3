use crate::page::PageModel;
use crate::{ImageCandidate, ImageId, Rect};
use log::info;
use std::sync::Arc;

/// Overlay style, fixed policy matching the injected element of the original.
pub const OVERLAY_BACKGROUND: &str = "rgba(255, 255, 0, 0.8)";
pub const OVERLAY_TEXT_COLOR: &str = "black";
pub const OVERLAY_PADDING_PX: u32 = 5;
pub const OVERLAY_Z_INDEX: u32 = 9999;

/// A translation label covering a source image's page rectangle.
///
/// Overlays are non-interactive: they never intercept pointer events.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub image: ImageId,
    /// Page coordinates, scroll offset already included.
    pub rect: Rect,
    pub text: String,
}

impl Overlay {
    pub fn new(image: ImageId, rect: Rect, text: impl Into<String>) -> Self {
        Overlay {
            image,
            rect,
            text: text.into(),
        }
    }
}

/// Positions translation labels over source images on the page.
pub struct OverlayRenderer {
    page: Arc<PageModel>,
}

impl OverlayRenderer {
    pub fn new(page: Arc<PageModel>) -> Self {
        OverlayRenderer { page }
    }

    /// Cover the candidate's current rectangle with `text`. Re-rendering the
    /// same identity replaces the previous overlay instead of stacking. The
    /// overlay does not track later scroll or resize.
    pub fn render(&self, candidate: &ImageCandidate, text: &str) {
        // The node may have moved between candidate emission and now; prefer
        // its current rectangle, fall back to the one captured at emission.
        let rect = self
            .page
            .page_rect(candidate.node)
            .unwrap_or(candidate.rect);

        self.page
            .place_overlay(Overlay::new(candidate.id.clone(), rect, text));
        info!("overlay injected for {}", candidate.id);
    }
}
