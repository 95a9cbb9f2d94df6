// Conversions between the four point spaces.
//
// Normalized (0–1000, display-relative) → Local (display-relative logical
// px) → Global (canonical multi-display logical px) → Native (whatever the
// injection backend wants). Nothing here fails: out-of-range input is
// clamped or reinterpreted and logged.
use std::sync::Arc;

use crate::display::types::{
    CoordinateMode, Display, GlobalPoint, LocalPoint, NativePoint, NativeSpace, NormalizedPoint, Topology,
};

pub const NORMALIZED_MAX: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct CoordinateTransformer {
    topology: Arc<Topology>,
}

impl CoordinateTransformer {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn display(&self, display_index: usize) -> &Display {
        self.topology.display(display_index)
    }

    /// `origin(display) + local`. Points outside the display are passed
    /// through with a warning since agents routinely probe edges.
    pub fn to_global(&self, local: LocalPoint, display_index: usize) -> GlobalPoint {
        let d = self.display(display_index);
        if !in_bounds(local, d) {
            tracing::warn!(
                x = local.x,
                y = local.y,
                display = d.index,
                width = d.width,
                height = d.height,
                "local point outside display bounds"
            );
        }
        GlobalPoint::new(d.origin_x + local.x, d.origin_y + local.y)
    }

    /// Finds the display containing `global`, or the nearest one.
    pub fn to_local(&self, global: GlobalPoint) -> (usize, LocalPoint) {
        let d = self
            .topology
            .displays
            .iter()
            .find(|d| d.contains_global(global))
            .or_else(|| self.topology.displays.iter().min_by_key(|d| d.distance_sq(global)))
            .unwrap_or_else(|| self.topology.main());
        (d.index, LocalPoint::new(global.x - d.origin_x, global.y - d.origin_y))
    }

    pub fn normalized_to_local(&self, xn: f64, yn: f64, display_index: usize) -> LocalPoint {
        let d = self.display(display_index);
        let xn = clamp_normalized(xn);
        let yn = clamp_normalized(yn);
        let x = (xn / NORMALIZED_MAX * d.width as f64).round() as i64;
        let y = (yn / NORMALIZED_MAX * d.height as f64).round() as i64;
        LocalPoint::new(
            x.clamp(0, d.width.saturating_sub(1) as i64) as i32,
            y.clamp(0, d.height.saturating_sub(1) as i64) as i32,
        )
    }

    pub fn local_to_normalized(&self, local: LocalPoint, display_index: usize) -> NormalizedPoint {
        let d = self.display(display_index);
        let scale = |v: i32, extent: u32| -> u32 {
            let n = (v as f64 * NORMALIZED_MAX / extent.max(1) as f64).round();
            n.clamp(0.0, NORMALIZED_MAX) as u32
        };
        NormalizedPoint {
            x: scale(local.x, d.width),
            y: scale(local.y, d.height),
        }
    }

    pub fn clamp_local(&self, local: LocalPoint, display_index: usize) -> LocalPoint {
        let d = self.display(display_index);
        LocalPoint::new(
            local.x.clamp(0, d.width.saturating_sub(1) as i32),
            local.y.clamp(0, d.height.saturating_sub(1) as i32),
        )
    }

    /// Interprets caller-supplied coordinates according to `mode`.
    ///
    /// `Auto` treats the point as local pixels unless it falls off the display
    /// while both components sit in 0..=1000, in which case it is read as
    /// normalized. Language models emit both conventions interchangeably.
    pub fn resolve_click_coordinates(&self, x: f64, y: f64, display_index: usize, mode: CoordinateMode) -> LocalPoint {
        let x = if x.is_finite() { x } else { 0.0 };
        let y = if y.is_finite() { y } else { 0.0 };
        match mode {
            CoordinateMode::Normalized => self.normalized_to_local(x, y, display_index),
            CoordinateMode::Absolute => self.clamp_local(round_local(x, y), display_index),
            CoordinateMode::Auto => {
                let d = self.display(display_index);
                let local = round_local(x, y);
                let looks_normalized =
                    (0.0..=NORMALIZED_MAX).contains(&x) && (0.0..=NORMALIZED_MAX).contains(&y);
                if !in_bounds(local, d) && looks_normalized {
                    tracing::info!(x, y, display = d.index, "auto mode: reinterpreting out-of-bounds point as normalized");
                    self.normalized_to_local(x, y, display_index)
                } else {
                    if !in_bounds(local, d) {
                        tracing::warn!(x, y, display = d.index, "auto mode: clamping out-of-bounds point");
                    }
                    self.clamp_local(local, display_index)
                }
            }
        }
    }

    pub fn to_native(&self, global: GlobalPoint, space: NativeSpace) -> NativePoint {
        match space {
            NativeSpace::BottomLeftLogical => NativePoint {
                x: global.x,
                y: self.topology.main().height as i32 - global.y,
            },
            NativeSpace::TopLeftPhysical => {
                let (index, _) = self.to_local(global);
                let s = self.display(index).scale_factor;
                NativePoint {
                    x: (global.x as f64 * s).round() as i32,
                    y: (global.y as f64 * s).round() as i32,
                }
            }
        }
    }

    pub fn from_native(&self, native: NativePoint, space: NativeSpace) -> GlobalPoint {
        match space {
            NativeSpace::BottomLeftLogical => {
                GlobalPoint::new(native.x, self.topology.main().height as i32 - native.y)
            }
            NativeSpace::TopLeftPhysical => {
                let owner = self.topology.displays.iter().find(|d| {
                    let s = d.scale_factor;
                    let probe = GlobalPoint::new(
                        (native.x as f64 / s).round() as i32,
                        (native.y as f64 / s).round() as i32,
                    );
                    d.contains_global(probe)
                });
                let s = owner.unwrap_or_else(|| self.topology.main()).scale_factor;
                GlobalPoint::new(
                    (native.x as f64 / s).round() as i32,
                    (native.y as f64 / s).round() as i32,
                )
            }
        }
    }
}

fn in_bounds(p: LocalPoint, d: &Display) -> bool {
    p.x >= 0 && p.y >= 0 && (p.x as i64) < d.width as i64 && (p.y as i64) < d.height as i64
}

fn clamp_normalized(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, NORMALIZED_MAX)
    } else {
        0.0
    }
}

fn round_local(x: f64, y: f64) -> LocalPoint {
    let r = |v: f64| v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    LocalPoint::new(r(x), r(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::topology::normalize;
    use crate::display::types::{OriginFrame, RawDisplay};

    fn transformer(displays: &[(u32, u32, i32, i32, f64)]) -> CoordinateTransformer {
        let raw = displays
            .iter()
            .enumerate()
            .map(|(i, &(w, h, x, y, s))| RawDisplay {
                name: format!("D{i}"),
                is_main: i == 0,
                width: w,
                height: h,
                origin_x: x,
                origin_y: y,
                scale_factor: s,
                frame: OriginFrame::TopLeft,
            })
            .collect();
        CoordinateTransformer::new(Arc::new(normalize(raw)))
    }

    #[test]
    fn normalized_round_trip_within_one_pixel() {
        for &(w, h) in &[(1920u32, 1080u32), (1000, 1000), (1512, 982), (800, 600)] {
            let t = transformer(&[(w, h, 0, 0, 1.0)]);
            for x in (0..w as i32).step_by(37) {
                for y in (0..h as i32).step_by(41) {
                    let p = LocalPoint::new(x, y);
                    let n = t.local_to_normalized(p, 0);
                    let back = t.normalized_to_local(n.x as f64, n.y as f64, 0);
                    assert!((back.x - x).abs() <= 1, "x {x} -> {n:?} -> {back:?} on {w}x{h}");
                    assert!((back.y - y).abs() <= 1, "y {y} -> {n:?} -> {back:?} on {w}x{h}");
                }
            }
        }
    }

    #[test]
    fn normalized_input_is_clamped() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0)]);
        assert_eq!(t.normalized_to_local(-50.0, 1200.0, 0), LocalPoint::new(0, 1079));
        assert_eq!(t.normalized_to_local(f64::NAN, 1000.0, 0), LocalPoint::new(0, 1079));
        assert_eq!(t.normalized_to_local(500.0, 500.0, 0), LocalPoint::new(960, 540));
    }

    #[test]
    fn local_to_normalized_clamps_off_display_points() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0)]);
        let n = t.local_to_normalized(LocalPoint::new(-10, 5000), 0);
        assert_eq!((n.x, n.y), (0, 1000));
    }

    #[test]
    fn to_global_adds_display_origin() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0), (2560, 1440, 1920, -200, 1.0)]);
        assert_eq!(t.to_global(LocalPoint::new(10, 20), 1), GlobalPoint::new(1930, -180));
        // Out of bounds only warns.
        assert_eq!(t.to_global(LocalPoint::new(5000, 20), 0), GlobalPoint::new(5000, 20));
    }

    #[test]
    fn to_local_finds_owning_display() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0), (2560, 1440, 1920, -200, 1.0)]);
        assert_eq!(t.to_local(GlobalPoint::new(1930, -180)), (1, LocalPoint::new(10, 20)));
        assert_eq!(t.to_local(GlobalPoint::new(100, 100)), (0, LocalPoint::new(100, 100)));
        // In the gap below the secondary display: nearest is the secondary.
        let (idx, _) = t.to_local(GlobalPoint::new(3000, 1300));
        assert_eq!(idx, 1);
    }

    #[test]
    fn resolve_modes() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0)]);
        assert_eq!(
            t.resolve_click_coordinates(500.0, 500.0, 0, CoordinateMode::Absolute),
            LocalPoint::new(500, 500)
        );
        assert_eq!(
            t.resolve_click_coordinates(500.0, 500.0, 0, CoordinateMode::Normalized),
            LocalPoint::new(960, 540)
        );
        // In bounds: stays local.
        assert_eq!(
            t.resolve_click_coordinates(500.0, 500.0, 0, CoordinateMode::Auto),
            LocalPoint::new(500, 500)
        );
        // Absolute clamps instead of failing.
        assert_eq!(
            t.resolve_click_coordinates(-5.0, 99999.0, 0, CoordinateMode::Absolute),
            LocalPoint::new(0, 1079)
        );
    }

    #[test]
    fn auto_reinterprets_small_display_overflow_as_normalized() {
        let t = transformer(&[(800, 600, 0, 0, 1.0)]);
        // (900, 700) is off an 800x600 display but within 0..=1000.
        assert_eq!(
            t.resolve_click_coordinates(900.0, 700.0, 0, CoordinateMode::Auto),
            LocalPoint::new(720, 420)
        );
        // (1500, 700) cannot be normalized: clamp.
        assert_eq!(
            t.resolve_click_coordinates(1500.0, 700.0, 0, CoordinateMode::Auto),
            LocalPoint::new(799, 599)
        );
        assert_eq!(
            t.resolve_click_coordinates(f64::INFINITY, -3.0, 0, CoordinateMode::Auto),
            LocalPoint::new(0, 0)
        );
    }

    #[test]
    fn native_bottom_left_round_trip() {
        let t = transformer(&[(1512, 982, 0, 0, 2.0)]);
        let g = GlobalPoint::new(100, 82);
        let n = t.to_native(g, NativeSpace::BottomLeftLogical);
        assert_eq!(n, NativePoint { x: 100, y: 900 });
        assert_eq!(t.from_native(n, NativeSpace::BottomLeftLogical), g);
    }

    #[test]
    fn native_physical_round_trip() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.5), (1280, 1024, 1920, 0, 1.0)]);
        let g = GlobalPoint::new(400, 300);
        let n = t.to_native(g, NativeSpace::TopLeftPhysical);
        assert_eq!(n, NativePoint { x: 600, y: 450 });
        assert_eq!(t.from_native(n, NativeSpace::TopLeftPhysical), g);
    }

    #[test]
    fn full_chain_stays_on_display() {
        let t = transformer(&[(1920, 1080, 0, 0, 1.0), (1080, 1920, 1920, -420, 1.0)]);
        let local = t.normalized_to_local(1000.0, 1000.0, 1);
        let global = t.to_global(local, 1);
        assert_eq!(t.to_local(global), (1, local));
    }
}
