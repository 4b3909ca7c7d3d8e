use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::RgbaImage;

use crate::canvas::{LayerStack, PixelBuffer};

/// Safety-net republish interval used when settings don't override it.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Anything that displays the composite: the 2D preview, the canvas texture,
/// a 3D engine's material texture.
///
/// Called after every recomposition with the new composite and a
/// monotonically increasing generation number.
pub trait CompositeConsumer {
    fn composite_updated(&mut self, composite: &Arc<PixelBuffer>, generation: u64);
}

pub type ConsumerHandle = Rc<RefCell<dyn CompositeConsumer>>;

// ============================================================================
// RENDER PIPELINE
// ============================================================================

/// Composites visible layers and republishes the result to registered
/// consumers, on demand and on a fixed cadence.
///
/// Consumers are held weakly: their owner decides how long they live, and
/// dropped consumers are pruned on the next publish.
pub struct RenderPipeline {
    latest: Arc<PixelBuffer>,
    generation: u64,
    consumers: Vec<Weak<RefCell<dyn CompositeConsumer>>>,
    refresh_interval: Duration,
    last_publish: Instant,
}

impl RenderPipeline {
    pub fn new(stack: &LayerStack, refresh_interval: Duration) -> Self {
        Self {
            latest: Arc::new(stack.composite(true)),
            generation: 0,
            consumers: Vec::new(),
            refresh_interval,
            last_publish: Instant::now(),
        }
    }

    /// Register a consumer and immediately hand it the current composite.
    pub fn register(&mut self, consumer: &ConsumerHandle) {
        consumer.borrow_mut().composite_updated(&self.latest, self.generation);
        self.consumers.push(Rc::downgrade(consumer));
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.iter().filter(|c| c.strong_count() > 0).count()
    }

    /// Latest published composite.
    pub fn latest(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.latest)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Recompute the composite of visible layers and publish it.
    pub fn recomposite(&mut self, stack: &LayerStack) -> Arc<PixelBuffer> {
        self.latest = Arc::new(stack.composite(true));
        self.generation = self.generation.wrapping_add(1);
        self.last_publish = Instant::now();

        let latest = &self.latest;
        let generation = self.generation;
        self.consumers.retain(|weak| match weak.upgrade() {
            Some(consumer) => {
                consumer.borrow_mut().composite_updated(latest, generation);
                true
            }
            None => false,
        });
        Arc::clone(&self.latest)
    }

    /// Timer hook: recomposite when the refresh interval has elapsed.
    /// Returns whether a publish happened.
    pub fn tick(&mut self, stack: &LayerStack, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_publish) < self.refresh_interval {
            return false;
        }
        self.recomposite(stack);
        true
    }
}

// ============================================================================
// CONSUMERS
// ============================================================================

/// Texture handle for an external renderer that polls once per frame.
///
/// The pipeline flags it dirty; the renderer calls [`take_update`] and
/// re-uploads when it gets `Some`.
///
/// [`take_update`]: SharedTexture::take_update
#[derive(Default)]
pub struct SharedTexture {
    current: Option<Arc<PixelBuffer>>,
    generation: u64,
    needs_update: bool,
}

impl SharedTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The composite, if it changed since the last call.
    pub fn take_update(&mut self) -> Option<Arc<PixelBuffer>> {
        if !self.needs_update {
            return None;
        }
        self.needs_update = false;
        self.current.clone()
    }
}

impl CompositeConsumer for SharedTexture {
    fn composite_updated(&mut self, composite: &Arc<PixelBuffer>, generation: u64) {
        self.current = Some(Arc::clone(composite));
        self.generation = generation;
        self.needs_update = true;
    }
}

/// Enlarged, unsmoothed copy of the composite for the 2D preview panel.
pub struct PreviewSurface {
    scale: u32,
    image: RgbaImage,
    dirty: bool,
}

impl PreviewSurface {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
            image: RgbaImage::new(1, 1),
            dirty: false,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether the image changed since the last [`mark_clean`](Self::mark_clean).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

impl CompositeConsumer for PreviewSurface {
    fn composite_updated(&mut self, composite: &Arc<PixelBuffer>, _generation: u64) {
        let (w, h) = composite.dimensions();
        self.image = image::imageops::resize(
            composite.as_rgba_image(),
            w.saturating_mul(self.scale),
            h.saturating_mul(self.scale),
            FilterType::Nearest,
        );
        self.dirty = true;
    }
}
