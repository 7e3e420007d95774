//! Named cartographic projections and fitting them to a pixel size.
//!
//! Every projection maps lon/lat degrees to unit-scale planar coordinates with
//! y growing downward. Fitting is then an affine scale + translate, so a panel
//! can re-fit on resize without re-projecting its geometry.

use geo::{BoundingRect, Coord, MapCoords, MultiPolygon, Rect};
use std::f64::consts::FRAC_PI_4;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_PROJECTION: &str = "albersUsa";

pub trait Projection: fmt::Debug + Send + Sync {
    fn project(&self, lon: f64, lat: f64) -> Coord<f64>;
}

/// Projects every vertex of a shape.
pub fn project_shape(projection: &dyn Projection, shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    shape.map_coords(|c| projection.project(c.x, c.y))
}

type Constructor = fn() -> Arc<dyn Projection>;

const PROJECTIONS: &[(&str, Constructor)] = &[
    ("albersUsa", albers_usa),
    ("albers", albers),
    ("conicEqualArea", albers),
    ("mercator", mercator),
    ("equirectangular", equirectangular),
];

fn albers_usa() -> Arc<dyn Projection> {
    Arc::new(AlbersUsa::new())
}

fn albers() -> Arc<dyn Projection> {
    Arc::new(ConicEqualArea::albers())
}

fn mercator() -> Arc<dyn Projection> {
    Arc::new(Mercator)
}

fn equirectangular() -> Arc<dyn Projection> {
    Arc::new(Equirectangular)
}

/// Stateless name -> projection lookup.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionRegistry {
    entries: &'static [(&'static str, Constructor)],
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self {
            entries: PROJECTIONS,
        }
    }
}

impl ProjectionRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Projection>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, make)| make())
    }
}

/// Conic equal-area projection with a rotation and a center.
#[derive(Debug, Clone)]
pub struct ConicEqualArea {
    rotate: f64,
    n: f64,
    c: f64,
    r0: f64,
    origin: (f64, f64),
}

impl ConicEqualArea {
    /// `rotate` is added to longitude; `center` is given in the rotated frame;
    /// `parallels` are the two standard parallels. All in degrees.
    pub fn new(rotate: f64, center: (f64, f64), parallels: (f64, f64)) -> Self {
        let sy0 = parallels.0.to_radians().sin();
        let n = (sy0 + parallels.1.to_radians().sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;
        let mut projection = Self {
            rotate,
            n,
            c,
            r0,
            origin: (0.0, 0.0),
        };
        projection.origin = projection.raw(center.0.to_radians(), center.1.to_radians());
        projection
    }

    /// Lower-48 Albers parameters.
    pub fn albers() -> Self {
        Self::new(96.0, (-0.6, 38.7), (29.5, 45.5))
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        let a = lambda * self.n;
        (r * a.sin(), self.r0 - r * a.cos())
    }
}

impl Projection for ConicEqualArea {
    fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        let lambda = wrap_degrees(lon + self.rotate).to_radians();
        let (x, y) = self.raw(lambda, lat.to_radians());
        Coord {
            x: x - self.origin.0,
            y: self.origin.1 - y,
        }
    }
}

/// Lower-48 Albers with Alaska and Hawaii drawn as insets to the south-west.
#[derive(Debug, Clone)]
pub struct AlbersUsa {
    lower48: ConicEqualArea,
    alaska: ConicEqualArea,
    hawaii: ConicEqualArea,
}

impl AlbersUsa {
    const ALASKA_SCALE: f64 = 0.35;
    const ALASKA_OFFSET: (f64, f64) = (-0.307, 0.201);
    const HAWAII_OFFSET: (f64, f64) = (-0.205, 0.212);

    pub fn new() -> Self {
        Self {
            lower48: ConicEqualArea::albers(),
            alaska: ConicEqualArea::new(154.0, (-2.0, 58.5), (55.0, 65.0)),
            hawaii: ConicEqualArea::new(157.0, (-3.0, 19.9), (8.0, 18.0)),
        }
    }
}

impl Projection for AlbersUsa {
    fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        let is_alaska = lat >= 50.0 && (lon <= -129.0 || lon >= 170.0);
        let is_hawaii = (18.0..=23.0).contains(&lat) && (-161.0..=-154.0).contains(&lon);
        if is_alaska {
            let p = self.alaska.project(lon, lat);
            Coord {
                x: p.x * Self::ALASKA_SCALE + Self::ALASKA_OFFSET.0,
                y: p.y * Self::ALASKA_SCALE + Self::ALASKA_OFFSET.1,
            }
        } else if is_hawaii {
            let p = self.hawaii.project(lon, lat);
            Coord {
                x: p.x + Self::HAWAII_OFFSET.0,
                y: p.y + Self::HAWAII_OFFSET.1,
            }
        } else {
            self.lower48.project(lon, lat)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Mercator;

impl Mercator {
    const MAX_LAT: f64 = 85.0;
}

impl Projection for Mercator {
    fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        let phi = lat.clamp(-Self::MAX_LAT, Self::MAX_LAT).to_radians();
        Coord {
            x: lon.to_radians(),
            y: -(FRAC_PI_4 + phi / 2.0).tan().ln(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Equirectangular;

impl Projection for Equirectangular {
    fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        Coord {
            x: lon.to_radians(),
            y: -lat.to_radians(),
        }
    }
}

fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Bounding box of already projected shapes, if any has a vertex.
pub fn shapes_bounds<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    shapes
        .into_iter()
        .filter_map(|s| s.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

/// height / width of the bounds; 1.0 when the bounds are empty or flat.
pub fn aspect_ratio(bounds: Option<Rect<f64>>) -> f64 {
    match bounds {
        Some(b) if b.width() > 0.0 && b.height() > 0.0 => b.height() / b.width(),
        _ => 1.0,
    }
}

/// Affine transform that fits unit-scale coordinates into a pixel box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    pub scale: f64,
    pub translate: (f64, f64),
}

impl Fit {
    /// Largest uniform scale that fits `bounds` into `width` x `height`,
    /// centered on both axes.
    pub fn to_size(bounds: Option<Rect<f64>>, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let Some(b) = bounds else {
            return Self {
                scale: 1.0,
                translate: (w / 2.0, h / 2.0),
            };
        };
        let kx = if b.width() > 0.0 { w / b.width() } else { f64::INFINITY };
        let ky = if b.height() > 0.0 { h / b.height() } else { f64::INFINITY };
        let scale = match kx.min(ky) {
            k if k.is_finite() => k,
            _ => 1.0,
        };
        let tx = (w - scale * (b.max().x + b.min().x)) / 2.0;
        let ty = (h - scale * (b.max().y + b.min().y)) / 2.0;
        Self {
            scale,
            translate: (tx, ty),
        }
    }

    pub fn apply(&self, shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let Fit { scale, translate } = *self;
        shape.map_coords(|c| Coord {
            x: c.x * scale + translate.0,
            y: c.y * scale + translate.1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn registry_knows_default_and_rejects_unknown() {
        let registry = ProjectionRegistry::default();
        assert!(registry.contains(DEFAULT_PROJECTION));
        assert!(registry.get("mercator").is_some());
        assert!(registry.get("lambertAzimuthal").is_none());
    }

    #[test]
    fn albers_center_projects_to_origin_and_north_is_up() {
        let albers = ConicEqualArea::albers();
        let center = albers.project(-96.6, 38.7);
        assert!(center.x.abs() < 1e-9 && center.y.abs() < 1e-9);

        let north = albers.project(-96.6, 45.0);
        assert!(north.y < 0.0);
        let east = albers.project(-80.0, 38.7);
        assert!(east.x > 0.0);
    }

    #[test]
    fn albers_usa_places_insets_south_west_of_lower48() {
        let usa = AlbersUsa::new();
        let kansas = usa.project(-98.0, 38.5);
        let anchorage = usa.project(-149.9, 61.2);
        let honolulu = usa.project(-157.8, 21.3);
        assert!(anchorage.x < kansas.x && anchorage.y > kansas.y);
        assert!(honolulu.x < kansas.x && honolulu.y > kansas.y);
    }

    #[test]
    fn mercator_clamps_the_poles() {
        let pole = Mercator.project(0.0, 90.0);
        assert!(pole.y.is_finite());
        assert_eq!(pole, Mercator.project(0.0, 85.0));
    }

    #[test]
    fn fit_centers_and_scales_to_the_tighter_axis() {
        let shape = square(0.0, 0.0, 2.0, 1.0);
        let bounds = shapes_bounds([&shape]);
        assert_eq!(aspect_ratio(bounds), 0.5);

        let fit = Fit::to_size(bounds, 400, 400);
        assert_eq!(fit.scale, 200.0);
        let fitted = fit.apply(&shape).bounding_rect().unwrap();
        assert_eq!(fitted.min(), Coord { x: 0.0, y: 100.0 });
        assert_eq!(fitted.max(), Coord { x: 400.0, y: 300.0 });
    }

    #[test]
    fn bounds_cover_every_shape() {
        let a = square(0.0, 0.0, 1.0, 1.0);
        let b = square(-2.0, 3.0, -1.0, 5.0);
        let bounds = shapes_bounds([&a, &b]).unwrap();
        assert_eq!(bounds.min(), Coord { x: -2.0, y: 0.0 });
        assert_eq!(bounds.max(), Coord { x: 1.0, y: 5.0 });
        assert!(shapes_bounds(std::iter::empty()).is_none());
    }

    #[test]
    fn degenerate_bounds_do_not_divide_by_zero() {
        let point = square(1.0, 1.0, 1.0, 1.0);
        let fit = Fit::to_size(shapes_bounds([&point]), 100, 50);
        assert_eq!(fit.scale, 1.0);
        assert_eq!(aspect_ratio(shapes_bounds([&point])), 1.0);
    }
}
