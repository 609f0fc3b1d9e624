//! Animated wind particles advected through a vector field.
//!
//! Each tick every particle takes one Euler step through the field, then
//! the surface is faded with a destination-in fill and the new segments
//! are stroked on top, so trails decay instead of being cleared.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{BlendMode, LineCap, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::{debug, warn};

use field::{Vector, VectorField};
use forecast_common::{ColorRamp, Rgba};

use crate::field_overlay::FieldOverlay;
use crate::host::{EventKind, LayerContext, MapEvent, ViewInfo};
use crate::layer::OverlayLayer;
use crate::scheduler::TimerHandle;
use crate::surface::CanvasSurface;
use crate::{RenderError, RenderResult};

/// Stroke width of a particle segment.
#[derive(Debug, Clone, PartialEq)]
pub enum StrokeWidth {
    Fixed(f32),
    /// Linear in magnitude over the field's range
    ByMagnitude { min: f32, max: f32 },
}

/// Stroke color of a particle segment.
#[derive(Debug, Clone, PartialEq)]
pub enum StrokeColor {
    Fixed(Rgba),
    /// Looked up by magnitude
    Ramp(ColorRamp),
}

/// One row of a zoom tuning table.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomStep {
    /// Applies from this zoom upwards
    pub min_zoom: f64,
    pub paths: usize,
    pub velocity_scale: f64,
    pub width: f32,
}

/// Zoom-dependent particle parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomTuning {
    steps: Vec<ZoomStep>,
}

impl ZoomTuning {
    pub fn new(mut steps: Vec<ZoomStep>) -> Self {
        steps.sort_by(|a, b| a.min_zoom.total_cmp(&b.min_zoom));
        Self { steps }
    }

    /// Step for a zoom level: the last one whose `min_zoom` is reached.
    pub fn step_for(&self, zoom: f64) -> Option<&ZoomStep> {
        self.steps.iter().rev().find(|s| zoom >= s.min_zoom).or(self.steps.first())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleConfig {
    /// Number of particles in the pool
    pub paths: usize,
    /// Steps a particle lives before respawning
    pub max_age: u32,
    /// Alpha kept by existing trails each frame, in (0, 1)
    pub fade: f32,
    pub width: StrokeWidth,
    pub color: StrokeColor,
    /// Degrees moved per tick per m/s of wind
    pub velocity_scale: f64,
    /// Animation timer period
    pub period: Duration,
    pub zoom_tuning: Option<ZoomTuning>,
    /// Fixed RNG seed, random when unset
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            paths: 800,
            max_age: 200,
            fade: 0.96,
            width: StrokeWidth::Fixed(1.0),
            color: StrokeColor::Fixed(Rgba::WHITE),
            velocity_scale: 1.0 / 5000.0,
            period: Duration::from_millis(20),
            zoom_tuning: None,
            seed: None,
        }
    }
}

impl ParticleConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.paths == 0 {
            return Err(RenderError::invalid_config("paths must be greater than 0"));
        }
        if !(self.fade > 0.0 && self.fade < 1.0) {
            return Err(RenderError::invalid_config(format!(
                "fade must be within (0, 1), got {}",
                self.fade
            )));
        }
        if !(self.velocity_scale > 0.0) {
            return Err(RenderError::invalid_config(format!(
                "velocity_scale must be positive, got {}",
                self.velocity_scale
            )));
        }
        if self.period.is_zero() {
            return Err(RenderError::invalid_config("period must be non-zero"));
        }
        if let StrokeColor::Ramp(ramp) = &self.color {
            ramp.validate().map_err(RenderError::InvalidConfig)?;
        }
        Ok(())
    }
}

/// Transient state of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    /// Position after the pending step, unset right after a respawn
    pub target: Option<(f64, f64)>,
    pub age: u32,
    /// Magnitude at the last step
    pub m: f64,
}

/// Wind overlay animating a particle pool over a [`VectorField`].
pub struct ParticleAnimationOverlay {
    base: FieldOverlay<Vector>,
    config: ParticleConfig,
    particles: Vec<Particle>,
    rng: StdRng,
    timer: Option<TimerHandle>,
    warned_not_ready: bool,
    frames: u64,
}

impl ParticleAnimationOverlay {
    pub fn new(config: ParticleConfig) -> RenderResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            base: FieldOverlay::new(),
            config,
            particles: Vec::new(),
            rng,
            timer: None,
            warned_not_ready: false,
            frames: 0,
        })
    }

    pub fn with_field(config: ParticleConfig, field: Arc<VectorField>) -> RenderResult<Self> {
        let mut overlay = Self::new(config)?;
        overlay.set_field(field);
        Ok(overlay)
    }

    pub fn base(&self) -> &FieldOverlay<Vector> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FieldOverlay<Vector> {
        &mut self.base
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Frames drawn since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_animating(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| t.is_armed())
    }

    pub fn field(&self) -> Option<&Arc<VectorField>> {
        self.base.field()
    }

    /// Bind a field and rebuild the particle pool on it.
    pub fn set_field(&mut self, field: Arc<VectorField>) {
        self.base.set_field(field);
        self.warned_not_ready = false;
        self.rebuild_particles();
    }

    /// Fresh pool of `paths` particles with staggered ages.
    pub fn rebuild_particles(&mut self) {
        let Some(field) = self.base.field().cloned() else {
            self.particles.clear();
            return;
        };

        let max_age = self.config.max_age;
        let rng = &mut self.rng;
        self.particles = (0..self.config.paths)
            .filter_map(|_| {
                let (x, y) = field.random_position(rng)?;
                Some(Particle {
                    x,
                    y,
                    target: None,
                    age: rng.gen_range(0..=max_age),
                    m: 0.0,
                })
            })
            .collect();
        debug!(particles = self.particles.len(), "particle pool rebuilt");
    }

    /// Advance every particle one step.
    pub fn step(&mut self) {
        let Some(field) = self.base.field().cloned() else {
            return;
        };
        let max_age = self.config.max_age;
        let scale = self.config.velocity_scale;

        for par in self.particles.iter_mut() {
            if par.age > max_age {
                par.age = 0;
                par.target = None;
                if let Some((x, y)) = field.random_position(&mut self.rng) {
                    par.x = x;
                    par.y = y;
                }
            }

            match self.base.sample(par.x, par.y) {
                None => par.age = max_age,
                Some(vector) => {
                    let xt = par.x + vector.u * scale;
                    let yt = par.y + vector.v * scale;
                    if self.base.has_value(xt, yt) {
                        par.target = Some((xt, yt));
                        par.m = vector.magnitude();
                    } else {
                        par.age = max_age;
                    }
                }
            }

            par.age += 1;
        }
    }

    /// Fade existing trails and stroke this step's segments.
    ///
    /// Returns the number of segments drawn.
    pub fn draw_frame(&mut self, view: &ViewInfo) -> usize {
        let range = self.base.field().and_then(|f| f.range());
        let max_age = self.config.max_age;
        let Some(pixmap) = self.base.surface_mut().pixmap_mut() else {
            return 0;
        };

        fade(pixmap, self.config.fade);

        let mut stroke = Stroke {
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        let mut paint = Paint {
            anti_alias: true,
            ..Paint::default()
        };

        let mut drawn = 0;
        for par in self.particles.iter_mut() {
            if par.age > max_age || !view.bounds.contains_point(map_lon(par.x), par.y) {
                continue;
            }
            let Some((xt, yt)) = par.target else {
                continue;
            };

            let (ax, ay) = view.project(map_lon(par.x), par.y);
            let (bx, by) = view.project(map_lon(xt), yt);
            par.x = xt;
            par.y = yt;

            let mut pb = PathBuilder::new();
            pb.move_to(ax as f32, ay as f32);
            pb.line_to(bx as f32, by as f32);
            let Some(path) = pb.finish() else {
                continue;
            };

            stroke.width = stroke_width(&self.config.width, par.m, range);
            let color = stroke_color(&self.config.color, par.m);
            paint.set_color_rgba8(color.r, color.g, color.b, color.a);
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            drawn += 1;
        }

        self.frames += 1;
        drawn
    }

    /// Arm the animation timer if it is not running.
    pub fn start(&mut self, ctx: &mut LayerContext<'_>) {
        if !self.is_animating() {
            self.timer = Some(ctx.schedule_repeating(self.config.period));
            debug!(layer = %ctx.layer_id(), "particle animation started");
        }
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            debug!("particle animation stopped");
        }
    }

    pub fn show(&mut self, ctx: &mut LayerContext<'_>) {
        self.base.show(ctx);
    }

    pub fn hide(&mut self, ctx: &mut LayerContext<'_>) {
        self.stop();
        self.base.hide(ctx);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.base.set_opacity(opacity);
    }

    /// Whether the not-ready warning has been logged for the current field.
    pub fn field_warning_logged(&self) -> bool {
        self.warned_not_ready
    }

    fn apply_zoom_tuning(&mut self, zoom: f64) {
        let Some(step) = self
            .config
            .zoom_tuning
            .as_ref()
            .and_then(|t| t.step_for(zoom))
            .cloned()
        else {
            return;
        };

        debug!(zoom, paths = step.paths, velocity_scale = step.velocity_scale, "zoom tuning applied");
        self.config.paths = step.paths.max(1);
        self.config.velocity_scale = step.velocity_scale;
        self.config.width = StrokeWidth::Fixed(step.width);
        self.rebuild_particles();
    }
}

impl OverlayLayer for ParticleAnimationOverlay {
    fn surface(&self) -> &CanvasSurface {
        self.base.surface()
    }

    fn surface_mut(&mut self) -> &mut CanvasSurface {
        self.base.surface_mut()
    }

    fn attach(&mut self, ctx: &mut LayerContext<'_>) -> RenderResult<()> {
        self.base.attach(ctx)?;
        ctx.subscribe(EventKind::MoveStart);
        if self.config.zoom_tuning.is_some() {
            self.apply_zoom_tuning(ctx.view().zoom);
        }
        Ok(())
    }

    fn detach(&mut self, ctx: &mut LayerContext<'_>) {
        self.stop();
        ctx.unsubscribe(EventKind::MoveStart);
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
                warn!(layer = %ctx.layer_id(), "vector field not ready, skipping particle draw");
                self.warned_not_ready = true;
            }
            return Ok(());
        }

        if self.particles.is_empty() {
            self.rebuild_particles();
        }
        self.start(ctx);
        Ok(())
    }

    fn handle_event(&mut self, event: &MapEvent, ctx: &mut LayerContext<'_>) {
        match event {
            MapEvent::MoveStart | MapEvent::Resize { .. } => self.stop(),
            MapEvent::ZoomEnd if self.config.zoom_tuning.is_some() => {
                self.apply_zoom_tuning(ctx.view().zoom);
            }
            _ => {}
        }
        self.base.handle_event(event, ctx);
    }

    fn on_timer(&mut self, ctx: &mut LayerContext<'_>) {
        if !self.base.surface().is_attached() || !self.base.is_visible() || self.base.field().is_none() {
            self.stop();
            return;
        }
        self.step();
        let view = *ctx.view();
        self.draw_frame(&view);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Keep only `alpha` of what is already on the surface.
fn fade(pixmap: &mut Pixmap, alpha: f32) {
    let Some(rect) = Rect::from_xywh(0.0, 0.0, pixmap.width() as f32, pixmap.height() as f32) else {
        return;
    };
    let mut paint = Paint {
        blend_mode: BlendMode::DestinationIn,
        ..Paint::default()
    };
    paint.set_color_rgba8(0, 0, 0, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8);
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

/// Grids on the 0–360° convention hand back longitudes past 180.
fn map_lon(x: f64) -> f64 {
    if x > 180.0 {
        x - 360.0
    } else {
        x
    }
}

fn stroke_width(width: &StrokeWidth, m: f64, range: Option<(f64, f64)>) -> f32 {
    match *width {
        StrokeWidth::Fixed(w) => w,
        StrokeWidth::ByMagnitude { min, max } => {
            let t = match range {
                Some((lo, hi)) if hi > lo => ((m - lo) / (hi - lo)).clamp(0.0, 1.0) as f32,
                _ => 0.0,
            };
            min + (max - min) * t
        }
    }
}

fn stroke_color(color: &StrokeColor, m: f64) -> Rgba {
    match color {
        StrokeColor::Fixed(c) => *c,
        StrokeColor::Ramp(ramp) => ramp.color_at(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MapHost;
    use crate::map::HeadlessMap;
    use forecast_common::GridSpec;

    const ND: f32 = -9999.0;

    /// 40° x 20° box of uniform eastward wind, 1° cells.
    fn uniform_field(u: f32) -> Arc<VectorField> {
        let grid = GridSpec::new(40, 20, -20.0, -10.0, 1.0, 1.0);
        let n = grid.len();
        Arc::new(VectorField::from_components(grid, &vec![u; n], &vec![0.0; n], ND).unwrap())
    }

    fn config() -> ParticleConfig {
        ParticleConfig {
            paths: 50,
            max_age: 10,
            velocity_scale: 0.01,
            seed: Some(42),
            ..ParticleConfig::default()
        }
    }

    fn particle(x: f64, y: f64, age: u32) -> Particle {
        Particle {
            x,
            y,
            target: None,
            age,
            m: 0.0,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ParticleConfig::default().validate().is_ok());
        let bad = [
            ParticleConfig { paths: 0, ..config() },
            ParticleConfig { fade: 1.0, ..config() },
            ParticleConfig { fade: 0.0, ..config() },
            ParticleConfig { velocity_scale: 0.0, ..config() },
            ParticleConfig { velocity_scale: -1.0, ..config() },
        ];
        for cfg in bad {
            assert!(matches!(
                ParticleAnimationOverlay::new(cfg),
                Err(RenderError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_pool_is_built_on_valid_cells() {
        let overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        assert_eq!(overlay.particles().len(), 50);
        let field = overlay.field().unwrap();
        for par in overlay.particles() {
            assert!(field.has_value_at(par.x, par.y));
            assert!(par.age <= 10);
        }
    }

    #[test]
    fn test_euler_step() {
        let mut overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        overlay.particles = vec![particle(0.5, 0.5, 3)];
        overlay.step();

        let par = overlay.particles()[0];
        let (xt, yt) = par.target.unwrap();
        assert!((xt - 0.55).abs() < 1e-9);
        assert!((yt - 0.5).abs() < 1e-9);
        assert_eq!(par.m, 5.0);
        assert_eq!(par.age, 4);
        // Position only commits when drawn
        assert_eq!(par.x, 0.5);
    }

    #[test]
    fn test_expired_particle_respawns() {
        let mut overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(0.0)).unwrap();
        overlay.particles = vec![particle(0.5, 0.5, 11)];
        overlay.step();

        let par = overlay.particles()[0];
        assert_eq!(par.age, 1);
        assert!(overlay.field().unwrap().has_value_at(par.x, par.y));
    }

    #[test]
    fn test_particle_off_field_is_retired() {
        let mut overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        overlay.particles = vec![particle(100.0, 50.0, 2)];
        overlay.step();
        assert_eq!(overlay.particles()[0].age, 11);
        assert_eq!(overlay.particles()[0].target, None);
    }

    #[test]
    fn test_step_leaving_domain_is_retired() {
        let mut overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(50.0)).unwrap();
        // 50 m/s * 0.01 = 0.5° east, past the eastern edge at 20°
        overlay.particles = vec![particle(19.8, 0.5, 2)];
        overlay.step();
        assert_eq!(overlay.particles()[0].age, 11);
    }

    #[test]
    fn test_filtered_samples_retire_particles() {
        let mut overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        overlay.base_mut().set_filter(Some(Arc::new(|v: &Vector| v.magnitude() > 10.0)));
        overlay.particles = vec![particle(0.5, 0.5, 2)];
        overlay.step();
        assert_eq!(overlay.particles()[0].age, 11);
    }

    /// Uniform eastward wind with a band of missing columns in the middle.
    fn holed_field(u: f32) -> Arc<VectorField> {
        let grid = GridSpec::new(40, 20, -20.0, -10.0, 1.0, 1.0);
        let n = grid.len();
        let us: Vec<f32> = (0..n)
            .map(|idx| if (18..22).contains(&(idx % grid.n_cols)) { ND } else { u })
            .collect();
        Arc::new(VectorField::from_components(grid, &us, &vec![0.0; n], ND).unwrap())
    }

    #[test]
    fn test_age_stays_bounded_over_many_ticks() {
        let mut map = HeadlessMap::new(256, 256, (0.0, 0.0), 3.0);
        // One degree per step, so particles keep running into the gap and the edge
        let cfg = ParticleConfig {
            velocity_scale: 0.2,
            ..config()
        };
        let max_age = cfg.max_age;
        let overlay = ParticleAnimationOverlay::with_field(cfg, holed_field(5.0)).unwrap();
        let id = map.add_layer(Box::new(overlay)).unwrap();
        let view = map.view();

        let overlay = map.layer_mut::<ParticleAnimationOverlay>(id).unwrap();
        let mut retired = 0;
        for tick in 0..200 {
            overlay.step();
            for par in overlay.particles() {
                assert!(par.age <= max_age + 1, "tick {}: age {}", tick, par.age);
            }
            retired += overlay.particles().iter().filter(|p| p.age > max_age).count();

            overlay.draw_frame(&view);
            for par in overlay.particles() {
                assert!(par.age <= max_age + 1, "tick {}: age {}", tick, par.age);
            }
        }
        assert!(retired > 0);
        assert_eq!(overlay.frames(), 200);
    }

    #[test]
    fn test_particle_without_target_skips_one_frame() {
        let mut map = HeadlessMap::new(256, 256, (0.0, 0.0), 3.0);
        let overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        let id = map.add_layer(Box::new(overlay)).unwrap();
        let view = map.view();

        let overlay = map.layer_mut::<ParticleAnimationOverlay>(id).unwrap();
        overlay.particles = vec![particle(0.5, 0.5, 3)];
        assert_eq!(overlay.draw_frame(&view), 0);
        assert_eq!((overlay.particles()[0].x, overlay.particles()[0].y), (0.5, 0.5));

        overlay.step();
        assert_eq!(overlay.draw_frame(&view), 1);
        assert!((overlay.particles()[0].x - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_fade_keeps_fraction_of_alpha() {
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        pixmap.fill(tiny_skia::Color::WHITE);
        fade(&mut pixmap, 0.5);
        let alpha = pixmap.pixel(1, 1).unwrap().alpha();
        assert!((126..=129).contains(&alpha), "alpha {}", alpha);
    }

    #[test]
    fn test_magnitude_dependent_stroke() {
        let width = StrokeWidth::ByMagnitude { min: 1.0, max: 3.0 };
        assert_eq!(stroke_width(&width, 0.0, Some((0.0, 10.0))), 1.0);
        assert_eq!(stroke_width(&width, 10.0, Some((0.0, 10.0))), 3.0);
        assert_eq!(stroke_width(&width, 5.0, None), 1.0);

        let ramp = ColorRamp::spread(0.0, 10.0, &[Rgba::new(0, 0, 255, 255), Rgba::new(255, 0, 0, 255)]).unwrap();
        assert_eq!(stroke_color(&StrokeColor::Ramp(ramp), 10.0), Rgba::new(255, 0, 0, 255));
    }

    #[test]
    fn test_zoom_tuning_picks_step() {
        let tuning = ZoomTuning::new(vec![
            ZoomStep { min_zoom: 6.0, paths: 400, velocity_scale: 0.001, width: 1.5 },
            ZoomStep { min_zoom: 0.0, paths: 1000, velocity_scale: 0.01, width: 1.0 },
        ]);
        assert_eq!(tuning.step_for(3.0).unwrap().paths, 1000);
        assert_eq!(tuning.step_for(8.0).unwrap().paths, 400);
    }

    #[test]
    fn test_draw_without_field_warns_once() {
        let mut map = HeadlessMap::new(64, 64, (0.0, 0.0), 3.0);
        let id = map.add_layer(Box::new(ParticleAnimationOverlay::new(config()).unwrap())).unwrap();
        map.pump(map.scheduler().now());

        let overlay = map.layer::<ParticleAnimationOverlay>(id).unwrap();
        assert!(overlay.field_warning_logged());
        assert!(!overlay.is_animating());
    }

    #[test]
    fn test_animation_lifecycle() {
        let mut map = HeadlessMap::new(200, 200, (0.0, 0.0), 3.0);
        let overlay = ParticleAnimationOverlay::with_field(config(), uniform_field(5.0)).unwrap();
        let id = map.add_layer(Box::new(overlay)).unwrap();
        let t0 = map.scheduler().now();

        // First flush draws and arms the timer
        map.pump(t0);
        assert!(map.layer::<ParticleAnimationOverlay>(id).unwrap().is_animating());

        let stats = map.pump(t0 + Duration::from_millis(20));
        assert_eq!(stats.timers_fired, 1);
        assert_eq!(map.layer::<ParticleAnimationOverlay>(id).unwrap().frames(), 1);

        // Move start stops, the redraw after move end restarts
        map.dispatch(MapEvent::MoveStart);
        assert!(!map.layer::<ParticleAnimationOverlay>(id).unwrap().is_animating());
        map.dispatch(MapEvent::MoveEnd);
        map.pump(t0 + Duration::from_millis(30));
        assert!(map.layer::<ParticleAnimationOverlay>(id).unwrap().is_animating());

        // Hide stops and unsubscribes queries
        map.with_layer::<ParticleAnimationOverlay, _>(id, |overlay, ctx| overlay.hide(ctx));
        assert!(!map.layer::<ParticleAnimationOverlay>(id).unwrap().is_animating());
        assert!(!map.is_subscribed(id, EventKind::Click));
        let stats = map.pump(t0 + Duration::from_millis(100));
        assert_eq!(stats.timers_fired, 0);
    }

    #[test]
    fn test_frames_leave_trails_on_the_surface() {
        let mut map = HeadlessMap::new(256, 256, (0.0, 0.0), 3.0);
        let overlay = ParticleAnimationOverlay::with_field(
            ParticleConfig {
                paths: 400,
                max_age: 100,
                velocity_scale: 0.5,
                seed: Some(3),
                ..ParticleConfig::default()
            },
            uniform_field(5.0),
        )
        .unwrap();
        let id = map.add_layer(Box::new(overlay)).unwrap();
        let t0 = map.scheduler().now();
        for i in 0..5 {
            map.pump(t0 + Duration::from_millis(20 * i));
        }

        let surface = map.layer::<ParticleAnimationOverlay>(id).unwrap().surface();
        let painted = surface
            .pixmap()
            .unwrap()
            .pixels()
            .iter()
            .filter(|p| p.alpha() > 0)
            .count();
        assert!(painted > 0);
    }
}
