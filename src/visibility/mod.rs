use crate::page::{ImageNode, NodeId, PageEvent, PageModel};
use crate::{ImageCandidate, ImageId, Rect};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Images at or below this size carry no readable text worth processing.
pub const MIN_WIDTH: u32 = 100;
pub const MIN_HEIGHT: u32 = 50;

/// Fraction of an image's area that must be inside the viewport.
pub const VISIBILITY_THRESHOLD: f64 = 0.5;

/// Watches the page for size-qualifying images becoming visible and emits
/// them as [`ImageCandidate`]s.
///
/// Two complementary scans: a one-shot pass over images already fully inside
/// the viewport when observation begins, and continuous threshold tracking
/// fed by page events so scrolled-into-view and lazy-loaded images are not
/// missed. An image below the size threshold at discovery is never
/// registered, even if it later resizes.
pub struct VisibilityTracker {
    page: Arc<PageModel>,
    candidates: mpsc::UnboundedSender<ImageCandidate>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl VisibilityTracker {
    pub fn new(page: Arc<PageModel>, candidates: mpsc::UnboundedSender<ImageCandidate>) -> Self {
        VisibilityTracker {
            page,
            candidates,
            cancel: Mutex::new(None),
        }
    }

    /// Begin observation. Idempotent while already observing.
    pub fn start(&self, tasks: &TaskTracker) {
        let mut guard = self.cancel.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        drop(guard);

        // Subscribe before the initial scan so no mutation slips between them.
        let mut events = self.page.subscribe();
        let window = self.page.viewport().page_window();
        let mut watched: HashMap<NodeId, f64> = HashMap::new();

        for node in self.page.images() {
            if !size_qualifies(&node) {
                continue;
            }
            let ratio = visible_ratio(&node.rect, &window);
            if window.contains(&node.rect) || ratio >= VISIBILITY_THRESHOLD {
                emit_candidate(&self.candidates, &node);
            }
            watched.insert(node.id, ratio);
        }
        info!("visibility tracker started, watching {} images", watched.len());

        let page = Arc::clone(&self.page);
        let candidates = self.candidates.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(PageEvent::NodeInserted(id)) => {
                            register_inserted(&page, &candidates, &mut watched, id);
                        }
                        Ok(PageEvent::NodeRemoved(id)) => {
                            watched.remove(&id);
                        }
                        Ok(PageEvent::LayoutChanged) => {
                            reevaluate(&page, &candidates, &mut watched);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("page event stream lagged by {missed}, resyncing");
                            resync(&page, &candidates, &mut watched);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("visibility tracker loop ended");
        });
    }

    /// Tear down observation. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
            info!("visibility tracker stopped");
        }
    }

    pub fn is_observing(&self) -> bool {
        self.cancel.lock().unwrap().is_some()
    }
}

impl Drop for VisibilityTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn size_qualifies(node: &ImageNode) -> bool {
    node.width > MIN_WIDTH && node.height > MIN_HEIGHT
}

fn visible_ratio(rect: &Rect, window: &Rect) -> f64 {
    let area = rect.area();
    if area <= 0.0 {
        return 0.0;
    }
    rect.intersection_area(window) / area
}

fn emit_candidate(tx: &mpsc::UnboundedSender<ImageCandidate>, node: &ImageNode) {
    info!("visible image detected: {}", node.src);
    let _ = tx.send(ImageCandidate {
        id: ImageId::from_src(&node.src),
        node: node.id,
        src: node.src.clone(),
        width: node.width,
        height: node.height,
        rect: node.rect,
    });
}

fn register_inserted(
    page: &PageModel,
    tx: &mpsc::UnboundedSender<ImageCandidate>,
    watched: &mut HashMap<NodeId, f64>,
    id: NodeId,
) {
    let Some(node) = page.image(id) else {
        return;
    };
    if !size_qualifies(&node) {
        return;
    }
    let ratio = visible_ratio(&node.rect, &page.viewport().page_window());
    if ratio >= VISIBILITY_THRESHOLD {
        emit_candidate(tx, &node);
    }
    watched.insert(id, ratio);
    debug!("new image registered: {}", node.src);
}

fn reevaluate(
    page: &PageModel,
    tx: &mpsc::UnboundedSender<ImageCandidate>,
    watched: &mut HashMap<NodeId, f64>,
) {
    let window = page.viewport().page_window();
    let mut gone: Vec<NodeId> = Vec::new();

    for (&id, last_ratio) in watched.iter_mut() {
        let Some(node) = page.image(id) else {
            gone.push(id);
            continue;
        };
        let ratio = visible_ratio(&node.rect, &window);
        if *last_ratio < VISIBILITY_THRESHOLD && ratio >= VISIBILITY_THRESHOLD {
            emit_candidate(tx, &node);
        }
        *last_ratio = ratio;
    }
    for id in gone {
        watched.remove(&id);
    }
}

/// Full resync after a lagged event stream: dropped insertions are picked up
/// here, dropped removals fall out of the watch set.
fn resync(
    page: &PageModel,
    tx: &mpsc::UnboundedSender<ImageCandidate>,
    watched: &mut HashMap<NodeId, f64>,
) {
    reevaluate(page, tx, watched);
    let window = page.viewport().page_window();
    for node in page.images() {
        if watched.contains_key(&node.id) || !size_qualifies(&node) {
            continue;
        }
        let ratio = visible_ratio(&node.rect, &window);
        if ratio >= VISIBILITY_THRESHOLD {
            emit_candidate(tx, &node);
        }
        watched.insert(node.id, ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Viewport;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_WINDOW: Duration = Duration::from_millis(250);

    fn setup() -> (
        Arc<PageModel>,
        VisibilityTracker,
        mpsc::UnboundedReceiver<ImageCandidate>,
        TaskTracker,
    ) {
        let page = Arc::new(PageModel::new(Viewport::new(800.0, 600.0)));
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = VisibilityTracker::new(Arc::clone(&page), tx);
        (page, tracker, rx, TaskTracker::new())
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ImageCandidate>) -> Option<ImageCandidate> {
        timeout(RECV_WINDOW, rx.recv()).await.ok().flatten()
    }

    #[tokio::test(start_paused = true)]
    async fn initial_scan_emits_visible_qualifying_images_only() {
        let (page, tracker, mut rx, tasks) = setup();

        // Fully visible and big enough.
        page.insert_image("https://e.com/panel.png", 300, 200, Rect::new(0.0, 0.0, 300.0, 200.0));
        // Big enough but entirely below the fold.
        page.insert_image("https://e.com/below.png", 300, 200, Rect::new(0.0, 900.0, 300.0, 200.0));
        // Visible but too small.
        page.insert_image("https://e.com/icon.png", 16, 16, Rect::new(0.0, 0.0, 16.0, 16.0));
        // Straddling the fold with 75% visible: threshold registration covers it.
        page.insert_image("https://e.com/edge.png", 300, 200, Rect::new(0.0, 450.0, 300.0, 200.0));

        tracker.start(&tasks);

        let first = recv(&mut rx).await.unwrap();
        assert_eq!(first.src, "https://e.com/panel.png");
        let second = recv(&mut rx).await.unwrap();
        assert_eq!(second.src, "https://e.com/edge.png");
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_sizes_are_rejected() {
        let (page, tracker, mut rx, tasks) = setup();
        // Exactly 100x50 does not qualify; the comparison is strict.
        page.insert_image("https://e.com/100x50.png", 100, 50, Rect::new(0.0, 0.0, 100.0, 50.0));
        page.insert_image("https://e.com/101x51.png", 101, 51, Rect::new(0.0, 100.0, 101.0, 51.0));

        tracker.start(&tasks);

        let only = recv(&mut rx).await.unwrap();
        assert_eq!(only.src, "https://e.com/101x51.png");
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn inserted_images_are_tracked() {
        let (page, tracker, mut rx, tasks) = setup();
        tracker.start(&tasks);

        page.insert_image("https://e.com/lazy.png", 300, 200, Rect::new(0.0, 100.0, 300.0, 200.0));
        let candidate = recv(&mut rx).await.unwrap();
        assert_eq!(candidate.src, "https://e.com/lazy.png");

        // Inserted below the fold: registered but not emitted.
        page.insert_image("https://e.com/later.png", 300, 200, Rect::new(0.0, 2000.0, 300.0, 200.0));
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_crossing_emits_once() {
        let (page, tracker, mut rx, tasks) = setup();
        page.insert_image("https://e.com/below.png", 300, 200, Rect::new(0.0, 1000.0, 300.0, 200.0));
        tracker.start(&tasks);
        assert!(recv(&mut rx).await.is_none());

        page.scroll_to(0.0, 700.0);
        let candidate = recv(&mut rx).await.unwrap();
        assert_eq!(candidate.src, "https://e.com/below.png");

        // Still above threshold after a further scroll: no second emission.
        page.scroll_to(0.0, 800.0);
        assert!(recv(&mut rx).await.is_none());

        // Scrolled away and back: a fresh crossing emits again.
        page.scroll_to(0.0, 0.0);
        page.scroll_to(0.0, 900.0);
        let again = recv(&mut rx).await.unwrap();
        assert_eq!(again.src, "https://e.com/below.png");
    }

    #[tokio::test(start_paused = true)]
    async fn removed_images_are_forgotten() {
        let (page, tracker, mut rx, tasks) = setup();
        let id = page.insert_image(
            "https://e.com/below.png",
            300,
            200,
            Rect::new(0.0, 1000.0, 300.0, 200.0),
        );
        tracker.start(&tasks);

        page.remove_image(id);
        page.scroll_to(0.0, 1000.0);
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn undersized_images_stay_ignored_after_resize() {
        let (page, tracker, mut rx, tasks) = setup();
        let id = page.insert_image("https://e.com/tiny.png", 16, 16, Rect::new(0.0, 0.0, 16.0, 16.0));
        tracker.start(&tasks);

        // The node grows later; it was never registered and stays invisible
        // to the pipeline.
        page.move_image(id, Rect::new(0.0, 0.0, 400.0, 300.0));
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_observation() {
        let (page, tracker, mut rx, tasks) = setup();
        tracker.start(&tasks);
        tracker.stop();
        assert!(!tracker.is_observing());

        tasks.close();
        tasks.wait().await;

        page.insert_image("https://e.com/late.png", 300, 200, Rect::new(0.0, 0.0, 300.0, 200.0));
        assert!(recv(&mut rx).await.is_none());
    }
}
