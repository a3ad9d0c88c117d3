#![warn(clippy::all, rust_2018_idioms)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod fetch;
pub mod ocr;
pub mod overlay;
pub mod page;
pub mod pipeline;
pub mod translation;
pub mod visibility;

pub use cache::ResultCache;
pub use config::{ConfigError, PipelineConfig, SourceLanguage};
pub use controller::PipelineController;
pub use fetch::{FetchError, HttpFetcher, ImageFetcher};
pub use ocr::OcrEngine;
pub use overlay::{Overlay, OverlayRenderer};
pub use page::{NodeId, PageEvent, PageModel, Viewport};
pub use pipeline::{ImagePipeline, PipelineContext, PipelineState, ProcessError};
pub use translation::{GenerateTransport, HttpTransport, TranslationClient, TranslationError};
pub use visibility::VisibilityTracker;

use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity of an image on the page.
///
/// The source URL is the identity, except for inline `data:` URLs where the
/// payload itself is the bytes; those are keyed by the SHA-256 of the URL so
/// cache keys stay bounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    pub fn from_src(src: &str) -> Self {
        if src.starts_with("data:") {
            let digest = Sha256::digest(src.as_bytes());
            ImageId(format!("sha256:{digest:x}"))
        } else {
            ImageId(src.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }
}

/// An image judged large enough and visible enough to be worth processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub id: ImageId,
    pub node: NodeId,
    pub src: String,
    pub width: u32,
    pub height: u32,
    /// Page-coordinate bounding rectangle at emission time.
    pub rect: Rect,
}
