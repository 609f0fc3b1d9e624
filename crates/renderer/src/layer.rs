//! Capability trait implemented by every overlay.

use std::any::Any;

use crate::host::{LayerContext, MapEvent};
use crate::surface::CanvasSurface;
use crate::{RenderError, RenderResult};

/// A layer that owns a canvas surface inside a map.
///
/// The map calls `attach` once when the layer is added, routes only
/// subscribed events to `handle_event`, calls `on_timer` for timers the
/// layer scheduled, and invokes `draw` when a redraw was requested.
pub trait OverlayLayer: Send {
    fn surface(&self) -> &CanvasSurface;

    fn surface_mut(&mut self) -> &mut CanvasSurface;

    fn attach(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        self.surface_mut().attach(ctx)
    }

    fn detach(&mut self, ctx: &mut LayerContext<'_>) {
        self.surface_mut().detach(ctx);
    }

    /// Ask for a redraw on the next flush. Repeated requests coalesce.
    fn request_redraw(&mut self) {
        self.surface_mut().request_redraw();
    }

    fn draw(&mut self, _ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        Err(RenderError::DrawNotImplemented)
    }

    fn handle_event(&mut self, event: &MapEvent, ctx: &mut LayerContext<'_>) {
        self.surface_mut().handle_event(event, ctx);
    }

    fn on_timer(&mut self, _ctx: &mut LayerContext<'_>) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
