use std::f64::consts::TAU;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::params::Params;
use crate::polar_sector::{Point, PolarSector};
use crate::ring::Ring;
use crate::sector_group::SectorGroup;
use crate::site::Site;

/// Result of shrinking an envelope towards its target area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShrinkOutcome {
  /// Radius decrements applied
  pub steps: usize,
  /// Full cycles over the shrinkable sectors
  pub passes: usize,
  /// True if the area got under target * ratio
  pub reached: bool,
}

/// The raw radial mass around a center: the largest wedges the site allows, trimmed towards a
/// target area. Holds the ring every allocation run starts from.
#[derive(Clone)]
pub struct MassEnvelope {
  pub name: String,
  pub center: Point,
  pub target_area: f64,
  site: Option<Arc<Site>>,
  ring: Ring,
}

impl MassEnvelope {
  /// Ray-marches every angular division against the site, clamps a lone outlier spike, then
  /// shrinks the ring towards the target area.
  pub fn generate(
    name: impl Into<String>,
    center: Point,
    target_area: f64,
    site: Arc<Site>,
    params: &Params,
  ) -> MassEnvelope {
    let name = name.into();
    let n = params.division_count;
    let step = TAU / n as f64;

    let mut sectors = Vec::with_capacity(n);
    for i in 0..n {
      let (a1, a2) = (step * i as f64, step * (i + 1) as f64);
      sectors.push(ray_march(&site, center, a1, a2, params));
    }
    log::debug!(
      "{}: ray lengths {:?}",
      name,
      sectors.iter().map(|s| s.r2).collect::<Vec<_>>()
    );

    cut_outlier(&mut sectors, params.outlier_gap);

    let mut envelope = MassEnvelope::from_sectors(name, center, target_area, sectors);
    envelope.site = Some(site);
    let outcome = envelope.shrink(params);
    log::info!(
      "{}: envelope area {:.1} (target {:.1}) after {} shrink steps",
      envelope.name,
      envelope.total_area(),
      envelope.target_area,
      outcome.steps
    );
    envelope
  }

  /// Envelope over ready-made sectors, one envelope position each, in angular order.
  pub fn from_sectors(
    name: impl Into<String>,
    center: Point,
    target_area: f64,
    sectors: Vec<PolarSector>,
  ) -> MassEnvelope {
    let n = sectors.len();
    let groups = sectors
      .into_iter()
      .enumerate()
      .map(|(i, s)| SectorGroup::single(s, i))
      .collect();
    MassEnvelope {
      name: name.into(),
      center,
      target_area,
      site: None,
      ring: Ring::from_groups(groups, n),
    }
  }

  /// `n` equal wedges of outer radius `radius`.
  pub fn uniform(name: impl Into<String>, center: Point, n: usize, radius: f64, target_area: f64) -> MassEnvelope {
    let step = TAU / n as f64;
    let sectors = (0..n)
      .map(|i| PolarSector::new(center, step * i as f64, step * (i + 1) as f64, 0., radius))
      .collect();
    MassEnvelope::from_sectors(name, center, target_area, sectors)
  }

  pub fn ring(&self) -> &Ring {
    &self.ring
  }

  pub fn site(&self) -> Option<&Site> {
    self.site.as_deref()
  }

  pub fn total_area(&self) -> f64 {
    self.ring.total_area()
  }

  pub fn min_outer_radius(&self) -> f64 {
    self.ring.groups().map(|g| g.bounds.r2).fold(f64::INFINITY, f64::min)
  }

  pub fn max_outer_radius(&self) -> f64 {
    self.ring.groups().map(|g| g.bounds.r2).fold(0., f64::max)
  }

  /// Cyclically takes `shrink_step` off the outer radius of the long sectors until the area is
  /// within `target * shrink_ratio`, or every long sector is down to the floor radius.
  ///
  /// Only sectors longer than (shortest + margin) at the start take part.
  pub fn shrink(&mut self, params: &Params) -> ShrinkOutcome {
    let limit = self.target_area * params.shrink_ratio;
    let min_radius = self.min_outer_radius();
    let shrinking = self
      .ring
      .keys()
      .into_iter()
      .filter(|&k| self.ring.get(k).bounds.r2 > min_radius + params.shrink_margin)
      .collect::<Vec<_>>();

    let mut outcome = ShrinkOutcome { steps: 0, passes: 0, reached: self.total_area() <= limit };
    if shrinking.is_empty() {
      return outcome;
    }

    let mut index = 0;
    // Consecutive sectors found at the floor
    let mut at_floor = 0;
    while self.total_area() > limit {
      let key = shrinking[index % shrinking.len()];
      let group = self.ring.get_mut(key);
      // A hollowed sector bottoms out at its inner radius
      let floor = params.shrink_floor.max(group.bounds.r1);
      if group.bounds.r2 <= floor {
        if at_floor == shrinking.len() {
          log::debug!("{}: nothing left to shrink", self.name);
          break;
        }
        at_floor += 1;
      } else {
        let r2 = (group.bounds.r2 - params.shrink_step).max(group.bounds.r1);
        group.reshape(|s| s.with_outer(r2));
        outcome.steps += 1;
        at_floor = 0;
      }
      index += 1;
    }
    outcome.passes = index / shrinking.len();
    outcome.reached = self.total_area() <= limit;
    outcome
  }

  /// Hollows out the middle: every sector starts at `radius` instead of the center.
  pub fn create_center(&mut self, radius: f64) {
    for key in self.ring.keys() {
      self.ring.get_mut(key).reshape(|s| s.with_inner(radius.min(s.r2)));
    }
  }
}

/// Grows a wedge from the center in unit steps until it breaks a site constraint or the step
/// budget runs out, and returns the last wedge that did not.
fn ray_march(site: &Site, center: Point, a1: f64, a2: f64, params: &Params) -> PolarSector {
  let mut radius = params.min_ray_radius;
  for _ in 0..params.ray_steps {
    let wedge = PolarSector::new(center, a1, a2, 0., radius);
    if let Some(what) = site.violation(&wedge) {
      log::trace!("ray {:.3}..{:.3} stopped by {} at r={}", a1, a2, what, radius);
      break;
    }
    radius += 1.;
  }
  PolarSector::new(center, a1, a2, 0., (radius - 1.).max(0.))
}

/// Clamps the longest sector to the second longest when it sticks out by more than `gap`.
fn cut_outlier(sectors: &mut [PolarSector], gap: f64) {
  if sectors.len() < 2 {
    return;
  }
  let mut order = (0..sectors.len()).collect::<Vec<_>>();
  order.sort_by_key(|&i| OrderedFloat(sectors[i].r2));
  let longest = order[order.len() - 1];
  let second = sectors[order[order.len() - 2]].r2;
  if sectors[longest].r2 - second > gap {
    log::debug!("clamping spike {} -> {}", sectors[longest].r2, second);
    sectors[longest].r2 = second;
  }
}
