use crate::overlay::Overlay;
use crate::{ImageId, Rect};
use log::debug;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub type NodeId = u64;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scrollable window onto the page, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// The viewport as a page-coordinate rectangle.
    pub fn page_window(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

/// An `<img>` element as the pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    pub id: NodeId,
    pub src: String,
    pub width: u32,
    pub height: u32,
    /// Bounding rectangle in page coordinates.
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageEvent {
    NodeInserted(NodeId),
    NodeRemoved(NodeId),
    /// A rect, scroll offset or viewport size changed.
    LayoutChanged,
}

struct PageInner {
    next_id: NodeId,
    images: HashMap<NodeId, ImageNode>,
    viewport: Viewport,
    overlays: HashMap<ImageId, Overlay>,
}

/// Headless model of the host page: image elements, viewport geometry and the
/// overlays the pipeline has injected.
///
/// Mutations emit [`PageEvent`]s over a broadcast channel, which is what the
/// [`crate::VisibilityTracker`] observes in place of DOM mutation and
/// intersection callbacks.
pub struct PageModel {
    inner: Mutex<PageInner>,
    events: broadcast::Sender<PageEvent>,
}

impl PageModel {
    pub fn new(viewport: Viewport) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        PageModel {
            inner: Mutex::new(PageInner {
                next_id: 1,
                images: HashMap::new(),
                viewport,
                overlays: HashMap::new(),
            }),
            events,
        }
    }

    /// Ingest an HTML snapshot, collecting every `<img>` that carries a `src`.
    ///
    /// Snapshots carry no layout, so images are placed in a vertical flow at
    /// their declared sizes; missing `width`/`height` attributes read as zero,
    /// which keeps such images below the processing threshold.
    pub fn from_html(html: &str, viewport: Viewport) -> Self {
        let page = PageModel::new(viewport);
        let document = Html::parse_document(html);
        let selector = Selector::parse("img").expect("img selector is valid");

        let mut y_cursor = 0.0_f64;
        for element in document.select(&selector) {
            let Some(src) = element.value().attr("src") else {
                continue;
            };
            let width = attr_u32(&element, "width");
            let height = attr_u32(&element, "height");
            let rect = Rect::new(0.0, y_cursor, f64::from(width), f64::from(height));
            y_cursor += f64::from(height);
            page.insert_image(src, width, height, rect);
        }
        page
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    pub fn insert_image(&self, src: &str, width: u32, height: u32, rect: Rect) -> NodeId {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.images.insert(
                id,
                ImageNode {
                    id,
                    src: src.to_string(),
                    width,
                    height,
                    rect,
                },
            );
            id
        };
        debug!("image node {id} inserted: {src}");
        self.emit(PageEvent::NodeInserted(id));
        id
    }

    pub fn remove_image(&self, id: NodeId) -> bool {
        let removed = self.inner.lock().unwrap().images.remove(&id).is_some();
        if removed {
            self.emit(PageEvent::NodeRemoved(id));
        }
        removed
    }

    pub fn move_image(&self, id: NodeId, rect: Rect) -> bool {
        let moved = {
            let mut inner = self.inner.lock().unwrap();
            match inner.images.get_mut(&id) {
                Some(node) => {
                    node.rect = rect;
                    true
                }
                None => false,
            }
        };
        if moved {
            self.emit(PageEvent::LayoutChanged);
        }
        moved
    }

    pub fn scroll_to(&self, x: f64, y: f64) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.viewport.scroll_x = x;
            inner.viewport.scroll_y = y;
        }
        self.emit(PageEvent::LayoutChanged);
    }

    pub fn set_viewport_size(&self, width: f64, height: f64) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.viewport.width = width;
            inner.viewport.height = height;
        }
        self.emit(PageEvent::LayoutChanged);
    }

    pub fn viewport(&self) -> Viewport {
        self.inner.lock().unwrap().viewport
    }

    pub fn images(&self) -> Vec<ImageNode> {
        let mut images: Vec<ImageNode> =
            self.inner.lock().unwrap().images.values().cloned().collect();
        images.sort_by_key(|node| node.id);
        images
    }

    pub fn image(&self, id: NodeId) -> Option<ImageNode> {
        self.inner.lock().unwrap().images.get(&id).cloned()
    }

    /// Current page-coordinate rectangle of a node, if it is still attached.
    pub fn page_rect(&self, id: NodeId) -> Option<Rect> {
        self.inner.lock().unwrap().images.get(&id).map(|n| n.rect)
    }

    /// Place an overlay, replacing any previous overlay for the same identity.
    pub fn place_overlay(&self, overlay: Overlay) {
        debug!("overlay placed for {}", overlay.image);
        self.inner
            .lock()
            .unwrap()
            .overlays
            .insert(overlay.image.clone(), overlay);
    }

    pub fn overlay_for(&self, id: &ImageId) -> Option<Overlay> {
        self.inner.lock().unwrap().overlays.get(id).cloned()
    }

    pub fn overlays(&self) -> Vec<Overlay> {
        self.inner.lock().unwrap().overlays.values().cloned().collect()
    }

    pub fn clear_overlays(&self) {
        self.inner.lock().unwrap().overlays.clear();
    }

    fn emit(&self, event: PageEvent) {
        // Nobody listening is fine; the tracker may not have started yet.
        let _ = self.events.send(event);
    }
}

fn attr_u32(element: &scraper::ElementRef<'_>, name: &str) -> u32 {
    element
        .value()
        .attr(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}
