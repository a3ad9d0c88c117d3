use crate::cache::ResultCache;
use crate::config::{PipelineConfig, SourceLanguage};
use crate::fetch::{HttpFetcher, ImageFetcher};
use crate::ocr::OcrEngine;
use crate::page::PageModel;
use crate::pipeline::{ImagePipeline, PipelineContext};
use crate::translation::{GenerateTransport, HttpTransport, TranslationClient};
use crate::visibility::VisibilityTracker;
use anyhow::Result;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct Session {
    tracker: VisibilityTracker,
    cancel: CancellationToken,
    tasks: TaskTracker,
    context: Arc<PipelineContext>,
}

/// Process-wide lifecycle: idle until a start-translation command arrives,
/// then one active session owning the visibility tracker, the OCR engine
/// instance and the pipeline tasks.
pub struct PipelineController {
    page: Arc<PageModel>,
    config: Arc<RwLock<PipelineConfig>>,
    transport: Arc<dyn GenerateTransport>,
    fetcher: Arc<dyn ImageFetcher>,
    session: Mutex<Option<Session>>,
}

impl PipelineController {
    pub fn new(page: Arc<PageModel>, config: PipelineConfig) -> Self {
        PipelineController {
            page,
            config: Arc::new(RwLock::new(config)),
            transport: Arc::new(HttpTransport::new()),
            fetcher: Arc::new(HttpFetcher::new()),
            session: Mutex::new(None),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn GenerateTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    pub fn config(&self) -> PipelineConfig {
        self.config.read().unwrap().clone()
    }

    /// Hot reload: takes effect on the next translation call, never
    /// retroactively.
    pub fn update_config(&self, config: PipelineConfig) {
        info!("configuration updated: {} ({})", config.api_url, config.source_lang.tag());
        *self.config.write().unwrap() = config;
    }

    /// Handle the external start-translation command. Builds the OCR engine
    /// once for the session, clears any overlays from a previous session and
    /// begins observation. A no-op while already active.
    pub fn start_translation<B>(&self, engine_builder: B) -> Result<()>
    where
        B: FnOnce(SourceLanguage) -> Result<Arc<dyn OcrEngine>>,
    {
        let mut session = self.session.lock().unwrap();
        if session.is_some() {
            info!("start translation requested while already active");
            return Ok(());
        }
        info!("start translation message received");

        let source_lang = self.config.read().unwrap().source_lang;
        let ocr = engine_builder(source_lang)?;
        info!("ocr engine ready for language: {}", source_lang.tag());

        self.page.clear_overlays();

        let tasks = TaskTracker::new();
        let (candidates_tx, mut candidates_rx) = mpsc::unbounded_channel();

        let context = Arc::new(PipelineContext {
            config: Arc::clone(&self.config),
            cache: ResultCache::new(),
            states: Mutex::new(HashMap::new()),
            ocr,
            fetcher: Arc::clone(&self.fetcher),
            translator: TranslationClient::new(Arc::clone(&self.transport)),
            page: Arc::clone(&self.page),
            tasks: tasks.clone(),
        });
        let pipeline = Arc::new(ImagePipeline::new(Arc::clone(&context)));

        let cancel = CancellationToken::new();
        let consumer_cancel = cancel.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = consumer_cancel.cancelled() => break,
                    candidate = candidates_rx.recv() => match candidate {
                        Some(candidate) => pipeline.on_candidate(candidate),
                        None => break,
                    },
                }
            }
        });

        let tracker = VisibilityTracker::new(Arc::clone(&self.page), candidates_tx);
        tracker.start(&tasks);

        *session = Some(Session {
            tracker,
            cancel,
            tasks,
            context,
        });
        Ok(())
    }

    /// Return to idle: stop observation and let in-flight work drain in the
    /// background (fetch and OCR carry no cancellation path of their own).
    /// Idempotent.
    pub fn stop(&self) {
        let Some(session) = self.session.lock().unwrap().take() else {
            return;
        };
        session.tracker.stop();
        session.cancel.cancel();

        let tasks = session.tasks;
        tasks.close();
        info!("stopping translation session, draining {} tasks", tasks.len());
        tokio::spawn(async move {
            tasks.wait().await;
            info!("translation session drained");
        });
    }

    /// Shared state of the active session, if any.
    pub fn context(&self) -> Option<Arc<PipelineContext>> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| Arc::clone(&session.context))
    }
}
