use crate::cache::ResultCache;
use crate::config::PipelineConfig;
use crate::fetch::{FetchError, ImageFetcher};
use crate::ocr::OcrEngine;
use crate::overlay::OverlayRenderer;
use crate::page::PageModel;
use crate::translation::{TranslationClient, TranslationError};
use crate::{ImageCandidate, ImageId};
use itertools::Itertools;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio_util::task::TaskTracker;

pub mod debounce;

pub use debounce::{DEBOUNCE_DELAY, KeyedDebouncer};

/// Per-identity processing state. Absence means the image was never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// A debounce window is scheduled.
    Pending,
    /// Fetch, OCR or translation is running. At most one per identity.
    InFlight,
    Cached,
    /// Nothing rendered; a later candidate event may retry.
    Failed,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("image fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("ocr failed: {0}")]
    Ocr(anyhow::Error),
    #[error("translation failed: {0}")]
    Translation(#[from] TranslationError),
}

/// Everything one session shares, constructed once by the controller and
/// passed by reference; there are no ambient singletons.
pub struct PipelineContext {
    pub config: Arc<RwLock<PipelineConfig>>,
    pub cache: ResultCache,
    pub states: Mutex<HashMap<ImageId, PipelineState>>,
    pub ocr: Arc<dyn OcrEngine>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub translator: TranslationClient,
    pub page: Arc<PageModel>,
    pub tasks: TaskTracker,
}

impl PipelineContext {
    /// Configuration as of this moment; changes apply to later snapshots only.
    pub fn config_snapshot(&self) -> PipelineConfig {
        self.config.read().unwrap().clone()
    }

    pub fn state_of(&self, id: &ImageId) -> Option<PipelineState> {
        self.states.lock().unwrap().get(id).copied()
    }

    fn set_state(&self, id: &ImageId, state: PipelineState) {
        self.states.lock().unwrap().insert(id.clone(), state);
    }
}

enum Processed {
    Rendered,
    /// OCR found nothing to translate; a no-op, not an error.
    NoText,
}

/// Drives fetch → OCR → translation → cache → overlay for each candidate,
/// debounced per identity and guarded against duplicate in-flight work.
pub struct ImagePipeline {
    ctx: Arc<PipelineContext>,
    renderer: OverlayRenderer,
    debouncer: KeyedDebouncer,
}

impl ImagePipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let renderer = OverlayRenderer::new(Arc::clone(&ctx.page));
        ImagePipeline {
            ctx,
            renderer,
            debouncer: KeyedDebouncer::new(DEBOUNCE_DELAY),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Entry point for visibility events. Bursts for the same identity within
    /// the debounce window collapse into one processing pass.
    pub fn on_candidate(self: &Arc<Self>, candidate: ImageCandidate) {
        {
            let mut states = self.ctx.states.lock().unwrap();
            match states.get(&candidate.id) {
                None | Some(PipelineState::Failed) => {
                    states.insert(candidate.id.clone(), PipelineState::Pending);
                }
                _ => {}
            }
        }

        let pipeline = Arc::clone(self);
        let key = candidate.id.clone();
        self.debouncer.call(&self.ctx.tasks, key, async move {
            pipeline.process(candidate).await;
        });
    }

    async fn process(&self, candidate: ImageCandidate) {
        let id = candidate.id.clone();

        if let Some(translation) = self.ctx.cache.get(&id) {
            info!("using cached translation for {id}");
            self.ctx.set_state(&id, PipelineState::Cached);
            self.renderer.render(&candidate, &translation);
            return;
        }

        {
            let mut states = self.ctx.states.lock().unwrap();
            if states.get(&id) == Some(&PipelineState::InFlight) {
                debug!("{id} already in flight, dropping");
                return;
            }
            states.insert(id.clone(), PipelineState::InFlight);
        }

        match self.run(&candidate).await {
            Ok(Processed::Rendered) => self.ctx.set_state(&id, PipelineState::Cached),
            Ok(Processed::NoText) => {
                info!("no text from ocr: {}", candidate.src);
                self.ctx.set_state(&id, PipelineState::Failed);
            }
            Err(err) => {
                error!("processing {id} failed: {err}");
                self.ctx.set_state(&id, PipelineState::Failed);
            }
        }
    }

    async fn run(&self, candidate: &ImageCandidate) -> Result<Processed, ProcessError> {
        let bytes = self.ctx.fetcher.fetch(&candidate.src).await?;
        debug!("image fetched as blob: {}", candidate.src);

        let text = self
            .ctx
            .ocr
            .recognize(&bytes)
            .await
            .map_err(ProcessError::Ocr)?;
        if text.trim().is_empty() {
            return Ok(Processed::NoText);
        }
        let text = normalize_recognized(&text);
        debug!("ocr text for {}: {text}", candidate.id);

        let config = self.ctx.config_snapshot();
        let translation = self.ctx.translator.translate(&text, &config).await?;

        self.ctx
            .cache
            .put(candidate.id.clone(), translation.clone());
        self.renderer.render(candidate, &translation);
        Ok(Processed::Rendered)
    }
}

/// OCR on CJK text tends to sprinkle spurious spaces; strip whitespace within
/// each line and drop lines that carried nothing else.
fn normalize_recognized(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<String>())
        .filter(|line| !line.is_empty())
        .join("\n")
}
