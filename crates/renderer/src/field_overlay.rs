//! Field-bound overlay: query semantics shared by scalar and vector layers.

use std::sync::Arc;

use field::{FieldValue, GriddedField};
use forecast_common::BoundingBox;
use tracing::debug;

use crate::host::{EventKind, LayerContext, MapEvent};
use crate::surface::CanvasSurface;
use crate::RenderResult;

/// Predicate applied to every sample of the bound field.
pub type FieldFilter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Result of a click or pointer query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample<T> {
    pub lon: f64,
    pub lat: f64,
    /// `None` outside the field's valid domain or when filtered out
    pub value: Option<T>,
}

pub type SampleCallback<T> = Box<dyn Fn(&FieldSample<T>) + Send + Sync>;
pub type LoadedCallback = Box<dyn Fn(Option<BoundingBox>) + Send + Sync>;
/// Receives `true` when the pointer is over a value.
pub type CursorCallback = Box<dyn Fn(bool) + Send + Sync>;

const QUERY_EVENTS: [EventKind; 2] = [EventKind::Click, EventKind::PointerMove];

/// A canvas surface bound to a [`GriddedField`].
pub struct FieldOverlay<T> {
    surface: CanvasSurface,
    field: Option<Arc<GriddedField<T>>>,
    filter: Option<FieldFilter<T>>,
    visible: bool,
    on_loaded: Option<LoadedCallback>,
    on_click: Option<SampleCallback<T>>,
    on_pointer_move: Option<SampleCallback<T>>,
    on_cursor: Option<CursorCallback>,
}

impl<T: FieldValue> Default for FieldOverlay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FieldValue> FieldOverlay<T> {
    pub fn new() -> Self {
        Self {
            surface: CanvasSurface::new(),
            field: None,
            filter: None,
            visible: true,
            on_loaded: None,
            on_click: None,
            on_pointer_move: None,
            on_cursor: None,
        }
    }

    pub fn surface(&self) -> &CanvasSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut CanvasSurface {
        &mut self.surface
    }

    pub fn field(&self) -> Option<&Arc<GriddedField<T>>> {
        self.field.as_ref()
    }

    /// Bind a new field, notify listeners and schedule a redraw.
    pub fn set_field(&mut self, field: Arc<GriddedField<T>>) {
        let bounds = field.valid_extent();
        debug!(
            cols = field.n_cols(),
            rows = field.n_rows(),
            valid = field.valid_count(),
            "field bound to overlay"
        );
        self.field = Some(field);
        if let Some(on_loaded) = &self.on_loaded {
            on_loaded(bounds);
        }
        self.surface.request_redraw();
    }

    /// Replace the sample filter; `None` accepts every value.
    pub fn set_filter(&mut self, filter: Option<FieldFilter<T>>) {
        self.filter = filter;
        self.surface.request_redraw();
    }

    pub fn on_loaded(&mut self, callback: impl Fn(Option<BoundingBox>) + Send + Sync + 'static) {
        self.on_loaded = Some(Box::new(callback));
    }

    pub fn on_click(&mut self, callback: impl Fn(&FieldSample<T>) + Send + Sync + 'static) {
        self.on_click = Some(Box::new(callback));
    }

    pub fn on_pointer_move(&mut self, callback: impl Fn(&FieldSample<T>) + Send + Sync + 'static) {
        self.on_pointer_move = Some(Box::new(callback));
    }

    pub fn on_cursor(&mut self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.on_cursor = Some(Box::new(callback));
    }

    /// Extent of the field's valid cells.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.field.as_ref().and_then(|f| f.valid_extent())
    }

    fn accept(&self, value: Option<T>) -> Option<T> {
        match (&self.filter, value) {
            (Some(filter), Some(v)) if !filter(&v) => None,
            (_, v) => v,
        }
    }

    /// Filtered value of the cell containing the point.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<T> {
        self.accept(self.field.as_ref()?.value_at(lon, lat))
    }

    /// Filtered, bilinearly interpolated value at the point.
    pub fn sample_interpolated(&self, lon: f64, lat: f64) -> Option<T> {
        self.accept(self.field.as_ref()?.interpolated_value_at(lon, lat))
    }

    pub fn has_value(&self, lon: f64, lat: f64) -> bool {
        self.sample(lon, lat).is_some()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show the overlay and start answering click/pointer queries.
    pub fn show(&mut self, ctx: &mut LayerContext<'_>) {
        self.visible = true;
        self.surface.set_visible(true);
        if self.surface.is_attached() {
            for kind in QUERY_EVENTS {
                ctx.subscribe(kind);
            }
        }
        self.surface.request_redraw();
    }

    /// Hide the overlay and stop answering queries.
    pub fn hide(&mut self, ctx: &mut LayerContext<'_>) {
        self.visible = false;
        self.surface.set_visible(false);
        for kind in QUERY_EVENTS {
            ctx.unsubscribe(kind);
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.surface.set_opacity(opacity);
    }

    pub fn opacity(&self) -> f32 {
        self.surface.opacity()
    }

    pub fn attach(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        self.surface.attach(ctx)?;
        if self.visible {
            for kind in QUERY_EVENTS {
                ctx.subscribe(kind);
            }
        }
        Ok(())
    }

    pub fn detach(&mut self, ctx: &mut LayerContext<'_>) {
        for kind in QUERY_EVENTS {
            ctx.unsubscribe(kind);
        }
        self.surface.detach(ctx);
    }

    /// Surface lifecycle plus click/pointer queries.
    pub fn handle_event(&mut self, event: &MapEvent, ctx: &mut LayerContext<'_>) {
        match *event {
            MapEvent::Click { lon, lat } if self.visible => {
                let sample = FieldSample {
                    lon,
                    lat,
                    value: self.sample(lon, lat),
                };
                if let Some(on_click) = &self.on_click {
                    on_click(&sample);
                }
            }
            MapEvent::PointerMove { lon, lat } if self.visible => {
                let sample = FieldSample {
                    lon,
                    lat,
                    value: self.sample(lon, lat),
                };
                if let Some(on_cursor) = &self.on_cursor {
                    on_cursor(sample.value.is_some());
                }
                if let Some(on_pointer_move) = &self.on_pointer_move {
                    on_pointer_move(&sample);
                }
            }
            _ => self.surface.handle_event(event, ctx),
        }
    }
}
