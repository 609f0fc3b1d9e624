//! Color-mapped scalar grids.

use std::any::Any;
use std::sync::Arc;

use tiny_skia::ColorU8;
use tracing::{debug, warn};

use field::ScalarField;
use forecast_common::ColorRamp;

use crate::field_overlay::FieldOverlay;
use crate::host::{LayerContext, MapEvent};
use crate::layer::OverlayLayer;
use crate::surface::CanvasSurface;
use crate::RenderResult;

/// Paints every viewport pixel with the ramp color of the value under it.
pub struct ScalarFieldOverlay {
    base: FieldOverlay<f32>,
    ramp: ColorRamp,
    interpolate: bool,
    warned_not_ready: bool,
}

impl ScalarFieldOverlay {
    pub fn new(ramp: ColorRamp) -> Self {
        Self {
            base: FieldOverlay::new(),
            ramp,
            interpolate: false,
            warned_not_ready: false,
        }
    }

    pub fn with_field(ramp: ColorRamp, field: Arc<ScalarField>) -> Self {
        let mut overlay = Self::new(ramp);
        overlay.set_field(field);
        overlay
    }

    /// Sample bilinearly instead of by containing cell.
    pub fn interpolated(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    pub fn base(&self) -> &FieldOverlay<f32> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FieldOverlay<f32> {
        &mut self.base
    }

    pub fn field(&self) -> Option<&Arc<ScalarField>> {
        self.base.field()
    }

    pub fn set_field(&mut self, field: Arc<ScalarField>) {
        self.warned_not_ready = false;
        self.base.set_field(field);
    }

    pub fn ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    pub fn set_ramp(&mut self, ramp: ColorRamp) {
        self.ramp = ramp;
        self.base.surface_mut().request_redraw();
    }

    pub fn show(&mut self, ctx: &mut LayerContext<'_>) {
        self.base.show(ctx);
    }

    pub fn hide(&mut self, ctx: &mut LayerContext<'_>) {
        self.base.hide(ctx);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.base.set_opacity(opacity);
    }

    fn value_at(&self, lon: f64, lat: f64) -> Option<f32> {
        if self.interpolate {
            self.base.sample_interpolated(lon, lat)
        } else {
            self.base.sample(lon, lat)
        }
    }
}

impl OverlayLayer for ScalarFieldOverlay {
    fn surface(&self) -> &CanvasSurface {
        self.base.surface()
    }

    fn surface_mut(&mut self) -> &mut CanvasSurface {
        self.base.surface_mut()
    }

    fn attach(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        self.base.attach(ctx)
    }

    fn detach(&mut self, ctx: &mut LayerContext<'_>) {
        self.base.detach(ctx);
    }

    fn draw(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        if !self.base.surface().ready_to_draw() {
            return Ok(());
        }
        self.base.surface_mut().clear();
        if !self.base.is_visible() {
            return Ok(());
        }
        if self.base.field().is_none() {
            if !self.warned_not_ready {
                warn!(layer = %ctx.layer_id(), "scalar field not ready, skipping draw");
                self.warned_not_ready = true;
            }
            return Ok(());
        }

        let view = *ctx.view();
        let width = view.width as usize;
        let colors: Vec<_> = (0..view.height as usize * width)
            .map(|idx| {
                let px = (idx % width) as f64 + 0.5;
                let py = (idx / width) as f64 + 0.5;
                let (lon, lat) = view.unproject(px, py);
                self.value_at(lon, lat)
                    .map(|v| self.ramp.color_at(v as f64))
                    .filter(|c| c.a > 0)
            })
            .collect();

        let Some(pixmap) = self.base.surface_mut().pixmap_mut() else {
            return Ok(());
        };
        let mut painted = 0usize;
        for (pixel, color) in pixmap.pixels_mut().iter_mut().zip(colors) {
            if let Some(c) = color {
                *pixel = ColorU8::from_rgba(c.r, c.g, c.b, c.a).premultiply();
                painted += 1;
            }
        }

        debug!(layer = %ctx.layer_id(), painted, "scalar overlay drawn");
        Ok(())
    }

    fn handle_event(&mut self, event: &MapEvent, ctx: &mut LayerContext<'_>) {
        self.base.handle_event(event, ctx);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
