//! In-process map host used by the viewer and tests.

use std::collections::HashSet;
use std::time::Instant;

use tiny_skia::{FilterQuality, Pixmap, PixmapPaint};
use tracing::{debug, warn};

use crate::host::{EventKind, LayerContext, LayerId, MapEvent, MapHost, ViewInfo};
use crate::layer::OverlayLayer;
use crate::scheduler::Scheduler;
use crate::{RenderError, RenderResult};

const DEFAULT_PANES: [&str; 3] = ["tilePane", "overlayPane", "markerPane"];

struct LayerEntry {
    id: LayerId,
    layer: Box<dyn OverlayLayer>,
    subscriptions: HashSet<EventKind>,
}

/// Counters returned by [`HeadlessMap::pump`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub timers_fired: usize,
    pub redraws: usize,
}

/// A Web Mercator map without a window.
///
/// Owns its layers, routes events to subscribers, runs layer timers and
/// composites every surface into one image.
pub struct HeadlessMap {
    center: (f64, f64),
    zoom: f64,
    width: u32,
    height: u32,
    panes: Vec<String>,
    layers: Vec<LayerEntry>,
    scheduler: Scheduler,
    next_layer_id: u64,
}

impl HeadlessMap {
    pub fn new(width: u32, height: u32, center: (f64, f64), zoom: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
            panes: DEFAULT_PANES.iter().map(|p| p.to_string()).collect(),
            layers: Vec::new(),
            scheduler: Scheduler::new(Instant::now()),
            next_layer_id: 1,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Add a layer on top and attach it. A layer that fails to attach is dropped.
    pub fn add_layer(&mut self, layer: Box<dyn OverlayLayer>) -> RenderResult<LayerId> {
        self.insert_layer(self.layers.len(), layer)
    }

    /// Add a layer at `index` in paint order, 0 being the bottom.
    pub fn insert_layer(&mut self, index: usize, mut layer: Box<dyn OverlayLayer>) -> RenderResult<LayerId> {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;

        let view = self.view();
        let mut subscriptions = HashSet::new();
        {
            let mut ctx = LayerContext::new(id, view, &self.panes, &mut self.scheduler, &mut subscriptions);
            layer.attach(&mut ctx)?;
        }

        let index = index.min(self.layers.len());
        self.layers.insert(
            index,
            LayerEntry {
                id,
                layer,
                subscriptions,
            },
        );
        debug!(layer = %id, layers = self.layers.len(), "layer added");
        Ok(id)
    }

    /// Detach and hand back a layer.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Box<dyn OverlayLayer>> {
        let pos = self.layers.iter().position(|e| e.id == id)?;
        let mut entry = self.layers.remove(pos);

        let view = self.view();
        {
            let mut ctx = LayerContext::new(id, view, &self.panes, &mut self.scheduler, &mut entry.subscriptions);
            entry.layer.detach(&mut ctx);
        }
        self.scheduler.cancel_layer(id);
        debug!(layer = %id, layers = self.layers.len(), "layer removed");
        Some(entry.layer)
    }

    pub fn has_layer(&self, id: LayerId) -> bool {
        self.layers.iter().any(|e| e.id == id)
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|e| e.id).collect()
    }

    /// Paint-order position of a layer.
    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|e| e.id == id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Typed access to a layer.
    pub fn layer<T: OverlayLayer + 'static>(&self, id: LayerId) -> Option<&T> {
        self.layers
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.layer.as_any().downcast_ref::<T>())
    }

    pub fn layer_mut<T: OverlayLayer + 'static>(&mut self, id: LayerId) -> Option<&mut T> {
        self.layers
            .iter_mut()
            .find(|e| e.id == id)
            .and_then(|e| e.layer.as_any_mut().downcast_mut::<T>())
    }

    /// Run `f` on a typed layer with a context, for operations that
    /// subscribe, unsubscribe or touch timers.
    pub fn with_layer<T, R>(&mut self, id: LayerId, f: impl FnOnce(&mut T, &mut LayerContext<'_>) -> R) -> Option<R>
    where
        T: OverlayLayer + 'static,
    {
        let view = self.view();
        let Self {
            layers,
            scheduler,
            panes,
            ..
        } = self;

        let entry = layers.iter_mut().find(|e| e.id == id)?;
        let layer = entry.layer.as_any_mut().downcast_mut::<T>()?;
        let mut ctx = LayerContext::new(id, view, panes, scheduler, &mut entry.subscriptions);
        Some(f(layer, &mut ctx))
    }

    /// Whether the layer currently listens to `kind`.
    pub fn is_subscribed(&self, id: LayerId, kind: EventKind) -> bool {
        self.layers
            .iter()
            .find(|e| e.id == id)
            .is_some_and(|e| e.subscriptions.contains(&kind))
    }

    /// Deliver an event to the layers subscribed to its kind.
    pub fn dispatch(&mut self, event: MapEvent) {
        let view = self.view();
        let kind = event.kind();
        let Self {
            layers,
            scheduler,
            panes,
            ..
        } = self;

        for entry in layers.iter_mut() {
            if !entry.subscriptions.contains(&kind) {
                continue;
            }
            let mut ctx = LayerContext::new(entry.id, view, panes, scheduler, &mut entry.subscriptions);
            entry.layer.handle_event(&event, &mut ctx);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.dispatch(MapEvent::Resize { width, height });
    }

    pub fn pan_to(&mut self, center: (f64, f64)) {
        self.dispatch(MapEvent::MoveStart);
        self.center = center;
        self.dispatch(MapEvent::MoveEnd);
    }

    /// Change zoom, animating the transition when `animate` is set.
    pub fn set_zoom(&mut self, zoom: f64, animate: bool) {
        if (zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        self.dispatch(MapEvent::ZoomStart);
        self.dispatch(MapEvent::MoveStart);
        if animate {
            self.dispatch(MapEvent::ZoomAnim {
                center: self.center,
                zoom,
            });
        }
        self.zoom = zoom;
        self.dispatch(MapEvent::ZoomEnd);
        self.dispatch(MapEvent::MoveEnd);
    }

    /// Click at a container pixel.
    pub fn click(&mut self, x: f64, y: f64) {
        let (lon, lat) = self.unproject(x, y);
        self.dispatch(MapEvent::Click { lon, lat });
    }

    /// Pointer moved to a container pixel.
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        let (lon, lat) = self.unproject(x, y);
        self.dispatch(MapEvent::PointerMove { lon, lat });
    }

    /// Fire due timers, then flush pending redraws.
    pub fn pump(&mut self, now: Instant) -> PumpStats {
        let view = self.view();
        let mut stats = PumpStats::default();
        let Self {
            layers,
            scheduler,
            panes,
            ..
        } = self;

        for (layer_id, _timer) in scheduler.due(now) {
            let Some(entry) = layers.iter_mut().find(|e| e.id == layer_id) else {
                continue;
            };
            let mut ctx = LayerContext::new(entry.id, view, panes, scheduler, &mut entry.subscriptions);
            entry.layer.on_timer(&mut ctx);
            stats.timers_fired += 1;
        }

        for entry in layers.iter_mut() {
            if !entry.layer.surface_mut().take_redraw() {
                continue;
            }
            let mut ctx = LayerContext::new(entry.id, view, panes, scheduler, &mut entry.subscriptions);
            match entry.layer.draw(&mut ctx) {
                Ok(()) => stats.redraws += 1,
                Err(err) => warn!(layer = %entry.id, error = %err, "layer draw failed"),
            }
        }

        stats
    }

    /// Composite every visible surface, bottom layer first.
    pub fn compose(&self) -> RenderResult<Pixmap> {
        let mut canvas = Pixmap::new(self.width, self.height).ok_or(RenderError::Surface {
            width: self.width,
            height: self.height,
        })?;

        for entry in &self.layers {
            let surface = entry.layer.surface();
            if !surface.is_visible() || surface.opacity() <= 0.0 {
                continue;
            }
            let Some(pixmap) = surface.pixmap() else {
                continue;
            };
            let paint = PixmapPaint {
                opacity: surface.opacity(),
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            };
            canvas.draw_pixmap(0, 0, pixmap.as_ref(), &paint, surface.transform(), None);
        }

        Ok(canvas)
    }
}

impl MapHost for HeadlessMap {
    fn view(&self) -> ViewInfo {
        ViewInfo::centered(self.center, self.zoom, self.width, self.height)
    }

    fn has_pane(&self, name: &str) -> bool {
        self.panes.iter().any(|p| p == name)
    }
}
