//! Raster surface bound to the map's coordinate system.

use tiny_skia::{Color, Pixmap, Transform};
use tracing::{debug, warn};

use crate::host::{EventKind, LayerContext, MapEvent, ViewInfo, OVERLAY_PANE};
use crate::{RenderError, RenderResult};

/// Events every surface listens to while attached.
const SURFACE_EVENTS: [EventKind; 4] = [
    EventKind::Resize,
    EventKind::MoveEnd,
    EventKind::ZoomAnim,
    EventKind::ZoomEnd,
];

/// An RGBA buffer the size of the viewport, placed in a map pane.
///
/// The surface follows pan/zoom/resize on its own. Owners draw into
/// [`CanvasSurface::pixmap_mut`] from their `draw` and call
/// [`CanvasSurface::request_redraw`] when content is stale.
#[derive(Debug)]
pub struct CanvasSurface {
    pane: String,
    pixmap: Option<Pixmap>,
    attached: bool,
    visible: bool,
    redraw_pending: bool,
    opacity: f32,
    /// Transform applied while a zoom animation is in progress
    transform: Transform,
    /// View the pixmap content was drawn for
    frame: Option<ViewInfo>,
}

impl Default for CanvasSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasSurface {
    pub fn new() -> Self {
        Self::with_pane(OVERLAY_PANE)
    }

    pub fn with_pane(pane: impl Into<String>) -> Self {
        Self {
            pane: pane.into(),
            pixmap: None,
            attached: false,
            visible: true,
            redraw_pending: false,
            opacity: 1.0,
            transform: Transform::identity(),
            frame: None,
        }
    }

    /// Create the buffer at viewport size and start following the map.
    pub fn attach(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        if !ctx.has_pane(&self.pane) {
            return Err(RenderError::UnknownPane(self.pane.clone()));
        }

        let view = *ctx.view();
        self.pixmap = Some(allocate(view.width, view.height)?);
        for kind in SURFACE_EVENTS {
            ctx.subscribe(kind);
        }

        self.attached = true;
        self.reset_frame(view);
        self.request_redraw();
        debug!(layer = %ctx.layer_id(), pane = %self.pane, "surface attached");
        Ok(())
    }

    /// Stop following the map and drop the buffer.
    pub fn detach(&mut self, ctx: &mut LayerContext<'_>) {
        for kind in SURFACE_EVENTS {
            ctx.unsubscribe(kind);
        }
        self.pixmap = None;
        self.attached = false;
        self.redraw_pending = false;
        self.frame = None;
        self.transform = Transform::identity();
        debug!(layer = %ctx.layer_id(), "surface detached");
    }

    /// Mark the surface stale. Returns `false` when a redraw was already pending.
    pub fn request_redraw(&mut self) -> bool {
        let fresh = !self.redraw_pending;
        self.redraw_pending = true;
        fresh
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw_pending
    }

    /// Consume the pending flag; the host calls `draw` when this is true.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw_pending) && self.attached
    }

    /// React to map lifecycle events.
    pub fn handle_event(&mut self, event: &MapEvent, ctx: &mut LayerContext<'_>) {
        if !self.attached {
            return;
        }

        match *event {
            MapEvent::Resize { width, height } => match allocate(width, height) {
                Ok(pixmap) => {
                    self.pixmap = Some(pixmap);
                    self.reset_frame(*ctx.view());
                    self.request_redraw();
                }
                Err(err) => warn!(error = %err, "surface resize failed"),
            },
            MapEvent::MoveEnd | MapEvent::ZoomEnd => {
                self.reset_frame(*ctx.view());
                self.request_redraw();
            }
            MapEvent::ZoomAnim { center, zoom } => {
                if let Some(frame) = self.frame {
                    let target = ViewInfo::centered(center, zoom, frame.width, frame.height);
                    self.transform = zoom_transform(&frame, &target);
                }
            }
            _ => {}
        }
    }

    /// Whether drawing is possible right now. Logs when it is not.
    pub fn ready_to_draw(&self) -> bool {
        if !self.attached || self.pixmap.is_none() {
            warn!(pane = %self.pane, "draw requested before the surface was attached, skipping");
            return false;
        }
        true
    }

    /// Record the view the next content is drawn for.
    pub fn reset_frame(&mut self, view: ViewInfo) {
        self.frame = Some(view);
        self.transform = Transform::identity();
    }

    pub fn clear(&mut self) {
        if let Some(pixmap) = self.pixmap.as_mut() {
            pixmap.fill(Color::TRANSPARENT);
        }
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn pixmap_mut(&mut self) -> Option<&mut Pixmap> {
        self.pixmap.as_mut()
    }

    pub fn pane(&self) -> &str {
        &self.pane
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Rendered opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    }

    /// Transform to apply when compositing the buffer.
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn frame(&self) -> Option<&ViewInfo> {
        self.frame.as_ref()
    }
}

fn allocate(width: u32, height: u32) -> RenderResult<Pixmap> {
    Pixmap::new(width, height).ok_or(RenderError::Surface { width, height })
}

/// Maps pixels drawn for `from` onto where they appear in `to`.
fn zoom_transform(from: &ViewInfo, to: &ViewInfo) -> Transform {
    let scale = 2f64.powf(to.zoom - from.zoom);
    let tx = from.origin.0 * scale - to.origin.0;
    let ty = from.origin.1 * scale - to.origin.1;
    Transform::from_row(scale as f32, 0.0, 0.0, scale as f32, tx as f32, ty as f32)
}
