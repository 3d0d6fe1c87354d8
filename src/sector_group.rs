use serde::Serialize;
use slotmap::new_key_type;
use thiserror::Error;

use crate::demand::{total_area, DemandItem};
use crate::polar_sector::{bounding, PolarSector};

new_key_type! {
  pub struct GroupKey;
}

#[derive(Error, Debug, PartialEq)]
pub enum GroupError {
    #[error("group at position {0} is already occupied")]
    AlreadyOccupied(usize),
}

/// What a group holds. Groups only ever leave `Vacant`, never return to it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "items", rename_all = "snake_case")]
pub enum Occupancy {
    Vacant,
    /// Too shallow to grow into; treated like an assigned group by neighbour walks
    Blocked,
    Assigned(Vec<DemandItem>),
}

/// One or more consecutive envelope sectors collapsed into a single bounding wedge.
///
/// `origin` and `width` record which envelope positions the group covers, so a
/// complete ring can be checked for full cover of the envelope.
#[derive(Clone, Debug)]
pub struct SectorGroup {
    /// Member sectors in ring order
    pub sectors: Vec<PolarSector>,
    /// Bounding wedge of the members
    pub bounds: PolarSector,
    /// First envelope position covered
    pub origin: usize,
    /// Number of consecutive positions covered
    pub width: usize,
    /// Ring links; null keys while the group is detached
    pub prev: GroupKey,
    pub next: GroupKey,
    occupancy: Occupancy,
}

impl SectorGroup {
    /// A detached, vacant group over a single envelope position.
    pub fn single(sector: PolarSector, position: usize) -> SectorGroup {
        SectorGroup {
            sectors: vec![sector],
            bounds: sector,
            origin: position,
            width: 1,
            prev: GroupKey::default(),
            next: GroupKey::default(),
            occupancy: Occupancy::Vacant,
        }
    }

    /// Merges this group with the one directly after it. The result is detached and vacant.
    pub fn merged(&self, other: &SectorGroup) -> SectorGroup {
        let mut sectors = self.sectors.clone();
        sectors.extend(other.sectors.iter().copied());
        SectorGroup {
            sectors,
            bounds: bounding(&[self.bounds, other.bounds]),
            origin: self.origin,
            width: self.width + other.width,
            prev: GroupKey::default(),
            next: GroupKey::default(),
            occupancy: Occupancy::Vacant,
        }
    }

    /// Unlinked, unassigned copy of the geometry.
    pub fn duplicate(&self) -> SectorGroup {
        SectorGroup {
            sectors: self.sectors.clone(),
            bounds: self.bounds,
            origin: self.origin,
            width: self.width,
            prev: GroupKey::default(),
            next: GroupKey::default(),
            occupancy: Occupancy::Vacant,
        }
    }

    /// Unlinked copy keeping the occupancy.
    pub fn detached(&self) -> SectorGroup {
        SectorGroup {
            prev: GroupKey::default(),
            next: GroupKey::default(),
            ..self.clone()
        }
    }

    pub fn area(&self) -> f64 {
        self.bounds.area()
    }

    /// Applies the same geometric change to every member and to the bounds.
    pub fn reshape(&mut self, f: impl Fn(PolarSector) -> PolarSector) {
        for s in self.sectors.iter_mut() {
            *s = f(*s);
        }
        self.bounds = f(self.bounds);
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self.occupancy, Occupancy::Assigned(_))
    }

    /// Assigned or blocked.
    pub fn is_claimed(&self) -> bool {
        !matches!(self.occupancy, Occupancy::Vacant)
    }

    pub fn items(&self) -> Option<&[DemandItem]> {
        match &self.occupancy {
            Occupancy::Assigned(items) => Some(items),
            _ => None,
        }
    }

    /// Total demand assigned to this group (0 when not assigned).
    pub fn target_area(&self) -> f64 {
        self.items().map(total_area).unwrap_or(0.)
    }

    pub fn assign(&mut self, items: Vec<DemandItem>) -> Result<(), GroupError> {
        if self.is_claimed() {
            return Err(GroupError::AlreadyOccupied(self.origin));
        }
        self.occupancy = Occupancy::Assigned(items);
        Ok(())
    }

    pub fn block(&mut self) -> Result<(), GroupError> {
        if self.is_claimed() {
            return Err(GroupError::AlreadyOccupied(self.origin));
        }
        self.occupancy = Occupancy::Blocked;
        Ok(())
    }

    /// Envelope positions covered, given the envelope's position count.
    pub fn positions(&self, n: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).map(move |i| (self.origin + i) % n)
    }

    /// Wedge proportions are usable when chord over depth exceeds `ratio`.
    pub fn shape_ok(&self, ratio: f64) -> bool {
        self.bounds.shape_ratio() > ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polar_sector::Point;
    use std::f64::consts::TAU;

    fn group(i: usize, r2: f64) -> SectorGroup {
        let step = TAU / 12.;
        SectorGroup::single(
            PolarSector::new(Point::default(), i as f64 * step, (i + 1) as f64 * step, 0., r2),
            i,
        )
    }

    #[test]
    fn merge_spans_both_and_takes_shorter_radius() {
        let m = group(3, 10.).merged(&group(4, 8.));
        assert_eq!(m.width, 2);
        assert_eq!(m.origin, 3);
        assert_eq!(m.sectors.len(), 2);
        assert_eq!(m.bounds.r2, 8.);
        assert_eq!(m.positions(12).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn assignment_is_one_way() {
        let mut g = group(0, 10.);
        g.assign(vec![DemandItem::new(20., "a")]).unwrap();
        assert!(g.is_assigned());
        assert_eq!(
            g.assign(vec![DemandItem::new(5., "b")]).unwrap_err(),
            GroupError::AlreadyOccupied(0)
        );
        assert_eq!(g.block().unwrap_err(), GroupError::AlreadyOccupied(0));
        assert_eq!(g.target_area(), 20.);
    }

    #[test]
    fn duplicate_drops_assignment_but_detached_keeps_it() {
        let mut g = group(5, 10.);
        g.assign(vec![DemandItem::new(20., "a")]).unwrap();
        assert!(!g.duplicate().is_claimed());
        assert!(g.detached().is_assigned());
        assert!(g.is_assigned());
    }

    #[test]
    fn positions_wrap_around() {
        let m = group(11, 10.).merged(&group(0, 10.));
        assert_eq!(m.positions(12).collect::<Vec<_>>(), vec![11, 0]);
        assert!(m.bounds.a1 < 0.);
    }
}
