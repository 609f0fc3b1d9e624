//! The contract between overlays and the map that hosts them.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use forecast_common::BoundingBox;
use projection::WebMercator;

use crate::scheduler::{Scheduler, TimerHandle};

/// Pane overlays are inserted into unless told otherwise.
pub const OVERLAY_PANE: &str = "overlayPane";

/// Identifier of a layer added to a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// Snapshot of the viewport handed to overlays when they draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewInfo {
    /// Geographic bounds of the visible area
    pub bounds: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    /// Projected world pixel of the container's top-left corner
    pub origin: (f64, f64),
}

impl ViewInfo {
    /// Build the view centred on `center` (lon, lat).
    pub fn centered(center: (f64, f64), zoom: f64, width: u32, height: u32) -> Self {
        let (cx, cy) = WebMercator::project(center.0, center.1, zoom);
        let origin = (cx - width as f64 / 2.0, cy - height as f64 / 2.0);
        Self {
            bounds: WebMercator::pixel_bounds(origin, width as f64, height as f64, zoom),
            width,
            height,
            zoom,
            origin,
        }
    }

    /// Geographic coordinate to container pixel.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = WebMercator::project(lon, lat, self.zoom);
        (x - self.origin.0, y - self.origin.1)
    }

    /// Container pixel to geographic coordinate.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        WebMercator::unproject(x + self.origin.0, y + self.origin.1, self.zoom)
    }

    pub fn center(&self) -> (f64, f64) {
        self.unproject(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

/// Events a map delivers to subscribed layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    Resize { width: u32, height: u32 },
    MoveStart,
    MoveEnd,
    ZoomStart,
    /// Animated zoom towards `zoom` around `center` (lon, lat)
    ZoomAnim { center: (f64, f64), zoom: f64 },
    ZoomEnd,
    Click { lon: f64, lat: f64 },
    PointerMove { lon: f64, lat: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Resize,
    MoveStart,
    MoveEnd,
    ZoomStart,
    ZoomAnim,
    ZoomEnd,
    Click,
    PointerMove,
}

impl MapEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Resize { .. } => EventKind::Resize,
            MapEvent::MoveStart => EventKind::MoveStart,
            MapEvent::MoveEnd => EventKind::MoveEnd,
            MapEvent::ZoomStart => EventKind::ZoomStart,
            MapEvent::ZoomAnim { .. } => EventKind::ZoomAnim,
            MapEvent::ZoomEnd => EventKind::ZoomEnd,
            MapEvent::Click { .. } => EventKind::Click,
            MapEvent::PointerMove { .. } => EventKind::PointerMove,
        }
    }
}

/// What a map widget must provide to host overlays.
pub trait MapHost {
    fn view(&self) -> ViewInfo;

    fn has_pane(&self, name: &str) -> bool;

    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.view().project(lon, lat)
    }

    fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        self.view().unproject(x, y)
    }
}

/// Per-call access a layer gets to its host.
pub struct LayerContext<'a> {
    layer_id: LayerId,
    view: ViewInfo,
    panes: &'a [String],
    scheduler: &'a mut Scheduler,
    subscriptions: &'a mut HashSet<EventKind>,
}

impl<'a> LayerContext<'a> {
    pub fn new(
        layer_id: LayerId,
        view: ViewInfo,
        panes: &'a [String],
        scheduler: &'a mut Scheduler,
        subscriptions: &'a mut HashSet<EventKind>,
    ) -> Self {
        Self {
            layer_id,
            view,
            panes,
            scheduler,
            subscriptions,
        }
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn view(&self) -> &ViewInfo {
        &self.view
    }

    pub fn has_pane(&self, name: &str) -> bool {
        self.panes.iter().any(|p| p == name)
    }

    pub fn subscribe(&mut self, kind: EventKind) {
        self.subscriptions.insert(kind);
    }

    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.subscriptions.remove(&kind);
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.subscriptions.contains(&kind)
    }

    /// Start a repeating timer delivered to this layer's `on_timer`.
    pub fn schedule_repeating(&mut self, period: Duration) -> TimerHandle {
        self.scheduler.schedule_repeating(self.layer_id, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_view_projects_center_to_middle() {
        let view = ViewInfo::centered((10.0, 45.0), 5.0, 400, 300);
        let (x, y) = view.project(10.0, 45.0);
        assert!((x - 200.0).abs() < 1e-6);
        assert!((y - 150.0).abs() < 1e-6);

        let (lon, lat) = view.center();
        assert!((lon - 10.0).abs() < 1e-9);
        assert!((lat - 45.0).abs() < 1e-9);
        assert!(view.bounds.contains_point(10.0, 45.0));
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(MapEvent::Resize { width: 1, height: 1 }.kind(), EventKind::Resize);
        assert_eq!(MapEvent::Click { lon: 0.0, lat: 0.0 }.kind(), EventKind::Click);
        assert_eq!(
            MapEvent::ZoomAnim { center: (0.0, 0.0), zoom: 3.0 }.kind(),
            EventKind::ZoomAnim
        );
    }
}
