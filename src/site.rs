//! Site boundary and exclusion regions the envelope must respect.
//!
//! The allocator only needs boolean answers about wedge footprints, so regions are
//! opaque predicates behind the [`Region`] trait. [`Disc`] and [`Polygon`] cover the
//! shapes site descriptions are written in.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::polar_sector::{Point, PolarSector};

/// Grid resolution used when testing a footprint against a region.
pub const FOOTPRINT_RESOLUTION: usize = 8;

#[derive(Error, Debug, PartialEq)]
pub enum SiteError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),
    #[error("disc radius must be positive and finite, got {0}")]
    InvalidRadius(f64),
}

/// A planar region queried by point and by wedge footprint.
pub trait Region: Send + Sync {
    fn contains_point(&self, pt: Point) -> bool;

    /// True if any sample of the footprint falls inside the region.
    fn intersects(&self, footprint: &PolarSector) -> bool {
        footprint
            .samples(FOOTPRINT_RESOLUTION)
            .into_iter()
            .any(|pt| self.contains_point(pt))
    }

    /// True if every sample of the footprint falls inside the region.
    fn encloses(&self, footprint: &PolarSector) -> bool {
        footprint
            .samples(FOOTPRINT_RESOLUTION)
            .into_iter()
            .all(|pt| self.contains_point(pt))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    pub center: Point,
    pub radius: f64,
}

impl Disc {
    pub fn new(center: Point, radius: f64) -> Result<Disc, SiteError> {
        if !(radius.is_finite() && radius > 0.) {
            return Err(SiteError::InvalidRadius(radius));
        }
        Ok(Disc { center, radius })
    }
}

impl Region for Disc {
    fn contains_point(&self, pt: Point) -> bool {
        self.center.dist(&pt) <= self.radius
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Result<Polygon, SiteError> {
        if vertices.len() < 3 {
            return Err(SiteError::DegeneratePolygon(vertices.len()));
        }
        Ok(Polygon { vertices })
    }

    /// Axis-aligned rectangle from two opposite corners.
    pub fn rect(min: Point, max: Point) -> Polygon {
        Polygon {
            vertices: vec![
                min,
                Point::new(max.x, min.y),
                max,
                Point::new(min.x, max.y),
            ],
        }
    }
}

impl Region for Polygon {
    // Even-odd ray casting
    fn contains_point(&self, pt: Point) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (vi, vj) = (self.vertices[i], self.vertices[j]);
            if (vi.y > pt.y) != (vj.y > pt.y)
                && pt.x < (vj.x - vi.x) * (pt.y - vi.y) / (vj.y - vi.y) + vi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Named exclusion zones found on a site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Park,
    Slope,
    ForestEntrance,
    Other(String),
}

impl Display for ObstacleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObstacleKind::Park => write!(f, "park"),
            ObstacleKind::Slope => write!(f, "slope"),
            ObstacleKind::ForestEntrance => write!(f, "forest_entrance"),
            ObstacleKind::Other(name) => write!(f, "{}", name),
        }
    }
}

pub struct Obstacle {
    pub kind: ObstacleKind,
    pub region: Box<dyn Region>,
}

/// A lot boundary plus the exclusion zones inside it.
pub struct Site {
    pub boundary: Box<dyn Region>,
    pub obstacles: Vec<Obstacle>,
}

impl Site {
    pub fn new(boundary: Box<dyn Region>) -> Site {
        Site { boundary, obstacles: Vec::new() }
    }

    pub fn with_obstacle(mut self, kind: ObstacleKind, region: Box<dyn Region>) -> Site {
        self.obstacles.push(Obstacle { kind, region });
        self
    }

    /// Returns the first constraint the footprint breaks, if any.
    pub fn violation(&self, footprint: &PolarSector) -> Option<String> {
        if !self.boundary.encloses(footprint) {
            return Some("boundary".to_string());
        }
        self.obstacles
            .iter()
            .find(|o| o.region.intersects(footprint))
            .map(|o| o.kind.to_string())
    }

    pub fn violates(&self, footprint: &PolarSector) -> bool {
        self.violation(footprint).is_some()
    }
}

/// Serializable region shapes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RegionSpec {
    Disc { center: Point, radius: f64 },
    Polygon { vertices: Vec<Point> },
}

impl RegionSpec {
    pub fn build(&self) -> Result<Box<dyn Region>, SiteError> {
        Ok(match self {
            RegionSpec::Disc { center, radius } => Box::new(Disc::new(*center, *radius)?),
            RegionSpec::Polygon { vertices } => Box::new(Polygon::new(vertices.clone())?),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObstacleSpec {
    pub kind: ObstacleKind,
    pub region: RegionSpec,
}

/// One mass to place on the site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MassSpec {
    pub name: String,
    pub target_area: f64,
    pub center: Point,
    #[serde(default)]
    pub center_radius: f64,
}

/// Site description as read from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteSpec {
    pub boundary: RegionSpec,
    #[serde(default)]
    pub obstacles: Vec<ObstacleSpec>,
    #[serde(default)]
    pub masses: Vec<MassSpec>,
}

impl SiteSpec {
    pub fn build(&self) -> Result<Site, SiteError> {
        let mut site = Site::new(self.boundary.build()?);
        for o in self.obstacles.iter() {
            site = site.with_obstacle(o.kind.clone(), o.region.build()?);
        }
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_site() -> Site {
        Site::new(Box::new(Polygon::rect(
            Point::new(-20., -20.),
            Point::new(20., 20.),
        )))
    }

    #[test]
    fn polygon_contains_interior_points() {
        let sq = Polygon::rect(Point::new(0., 0.), Point::new(10., 10.));
        assert!(sq.contains_point(Point::new(5., 5.)));
        assert!(!sq.contains_point(Point::new(15., 5.)));
        assert!(!sq.contains_point(Point::new(-1., 5.)));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let empty = Polygon { vertices: vec![] };
        assert!(!empty.contains_point(Point::default()));
        let segment = Polygon { vertices: vec![Point::new(0., 0.), Point::new(1., 1.)] };
        assert!(!segment.contains_point(Point::new(0.5, 0.5)));
    }

    #[test]
    fn boundary_violation_when_wedge_leaves_lot() {
        let site = square_site();
        let inside = PolarSector::new(Point::default(), 0., 0.5, 0., 10.);
        let outside = PolarSector::new(Point::default(), 0., 0.5, 0., 25.);
        assert_eq!(site.violation(&inside), None);
        assert_eq!(site.violation(&outside), Some("boundary".to_string()));
    }

    #[test]
    fn obstacle_violation_names_the_zone() {
        let site = square_site().with_obstacle(
            ObstacleKind::Park,
            Box::new(Disc::new(Point::new(8., 1.), 1.5).unwrap()),
        );
        let hit = PolarSector::new(Point::default(), 0., 0.5, 0., 10.);
        let miss = PolarSector::new(Point::default(), 3., 3.5, 0., 10.);
        assert_eq!(site.violation(&hit), Some("park".to_string()));
        assert!(!site.violates(&miss));
    }

    #[test]
    fn rejects_degenerate_regions() {
        assert_eq!(
            Polygon::new(vec![Point::default()]).unwrap_err(),
            SiteError::DegeneratePolygon(1)
        );
        assert!(Disc::new(Point::default(), -1.).is_err());
    }

    #[test]
    fn site_spec_from_json() {
        let json = r#"{
            "boundary": {"shape": "polygon", "vertices": [{"x": -10, "y": -10}, {"x": 10, "y": -10}, {"x": 10, "y": 10}, {"x": -10, "y": 10}]},
            "obstacles": [{"kind": "slope", "region": {"shape": "disc", "center": {"x": 5, "y": 5}, "radius": 2}}],
            "masses": [{"name": "A1", "target_area": 404, "center": {"x": 0, "y": 0}}]
        }"#;
        let spec: SiteSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.masses[0].center_radius, 0.);
        let site = spec.build().unwrap();
        assert_eq!(site.obstacles.len(), 1);
        assert_eq!(site.obstacles[0].kind, ObstacleKind::Slope);
    }
}
