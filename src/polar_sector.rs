use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// A planar point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub fn new(x: f64, y: f64) -> Point {
    Point { x, y }
  }

  pub fn dist(&self, other: &Point) -> f64 {
    ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
  }
}

/// Represent an annular wedge around `center`: angles `a1..a2` in radians, radii `r1..r2`.
///
/// A wedge crossing the 0/2π seam is stored with a negative `a1`; anything testing angular
/// overlap must go through [`PolarSector::intervals`], which splits such a wedge in two.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarSector {
  pub center: Point,
  pub a1: f64,
  pub a2: f64,
  pub r1: f64,
  pub r2: f64,
}

impl PolarSector {
  pub fn new(center: Point, a1: f64, a2: f64, r1: f64, r2: f64) -> PolarSector {
    debug_assert!(r1 >= 0. && r2 >= r1, "invalid radii {r1}..{r2}");
    PolarSector { center, a1, a2, r1, r2 }
  }

  /// Area of the wedge as the allocator measures it: (a2 - a1) * (r2² - r1²).
  pub fn area(&self) -> f64 {
    (self.a2 - self.a1) * (self.r2 * self.r2 - self.r1 * self.r1)
  }

  /// Geometric area of the wedge, ½ * angle * (r2² - r1²).
  pub fn half_angle_area(&self) -> f64 {
    0.5 * self.area()
  }

  /// Angular width in radians.
  pub fn span(&self) -> f64 {
    self.a2 - self.a1
  }

  /// Radial depth.
  pub fn depth(&self) -> f64 {
    self.r2 - self.r1
  }

  /// Inner chord length over radial depth. Zero-depth wedges have an infinite ratio.
  pub fn shape_ratio(&self) -> f64 {
    if self.depth() <= 0. {
      return f64::INFINITY;
    }
    self.r1 * self.span() / self.depth()
  }

  /// Copy of this sector with another outer radius.
  pub fn with_outer(&self, r2: f64) -> PolarSector {
    PolarSector { r2, ..*self }
  }

  /// Copy of this sector with another inner radius.
  pub fn with_inner(&self, r1: f64) -> PolarSector {
    PolarSector { r1, ..*self }
  }

  /// Cuts the sector at `radius`, returning (inner, outer).
  pub fn split_radius(&self, radius: f64) -> (PolarSector, PolarSector) {
    (PolarSector { r2: radius, ..*self }, PolarSector { r1: radius, ..*self })
  }

  /// Cuts `angle` radians off the start of the sector, returning (cut, rest) counter-clockwise.
  pub fn split_angle(&self, angle: f64) -> (PolarSector, PolarSector) {
    let cut = self.a1 + angle;
    (PolarSector { a2: cut, ..*self }, PolarSector { a1: cut, ..*self })
  }

  /// Angular intervals covered by this sector, all within [0, 2π].
  pub fn intervals(&self) -> Vec<(f64, f64)> {
    if self.a1 < 0. {
      vec![(0., self.a2), (self.a1 + TAU, TAU)]
    } else if self.a2 > TAU {
      vec![(self.a1, TAU), (0., self.a2 - TAU)]
    } else {
      vec![(self.a1, self.a2)]
    }
  }

  /// Largest angular overlap between any interval piece of the two sectors (0 if disjoint).
  pub fn angular_overlap(&self, other: &PolarSector) -> f64 {
    let mut best: f64 = 0.;
    for (lo1, hi1) in self.intervals() {
      for (lo2, hi2) in other.intervals() {
        best = best.max(hi1.min(hi2) - lo1.max(lo2));
      }
    }
    best
  }

  /// Checks if this sector overlaps the other sector by more than `tolerance` radians.
  pub fn overlaps(&self, other: &PolarSector, tolerance: f64) -> bool {
    self.angular_overlap(other) > tolerance
  }

  /// Point at polar coordinates (angle, radius) around the center.
  pub fn point_at(&self, angle: f64, radius: f64) -> Point {
    Point::new(self.center.x + radius * angle.cos(), self.center.y + radius * angle.sin())
  }

  /// Mid-angle, mid-radius point of the sector.
  pub fn midpoint(&self) -> Point {
    self.point_at((self.a1 + self.a2) / 2., (self.r1 + self.r2) / 2.)
  }

  /// Sample grid over the wedge (outline included), `resolution` steps in each direction.
  pub fn samples(&self, resolution: usize) -> Vec<Point> {
    let n = resolution.max(1);
    let mut pts = Vec::with_capacity((n + 1) * (n + 1));
    for i in 0..=n {
      let angle = self.a1 + self.span() * i as f64 / n as f64;
      for j in 0..=n {
        let radius = self.r1 + self.depth() * j as f64 / n as f64;
        pts.push(self.point_at(angle, radius));
      }
    }
    pts
  }
}

/// Collapses consecutive sectors (in ring order) into one bounding sector: innermost radius is
/// the largest r1, outermost the smallest r2, angles run from the first start to the last end.
pub fn bounding(sectors: &[PolarSector]) -> PolarSector {
  let first = sectors[0];
  let last = sectors[sectors.len() - 1];
  let r1 = sectors.iter().map(|s| s.r1).fold(f64::MIN, f64::max);
  let r2 = sectors.iter().map(|s| s.r2).fold(f64::MAX, f64::min);
  let mut a1 = first.a1;
  let a2 = last.a2;
  // Crossing the seam
  if a2 < a1 {
    a1 -= TAU;
  }
  PolarSector { center: first.center, a1, a2, r1, r2: r2.max(r1) }
}
