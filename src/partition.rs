//! Splits an assigned group into one room footprint per demand item.
//!
//! Two layouts exist. `Simple` cuts the wedge into angular slices, largest item first. When any
//! item is larger than `simple_room_max_area` the largest item becomes a big room wrapping the
//! others (`RoomInRoom`): it takes the outer band plus a corridor-wide entrance wedge through
//! the inner band, and the remaining items are sliced out of what is left of the inner band.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::Serialize;
use thiserror::Error;

use crate::demand::{total_area, DemandItem, RoomKind};
use crate::params::Params;
use crate::polar_sector::{Point, PolarSector};
use crate::sector_group::SectorGroup;

#[derive(Error, Debug, PartialEq)]
pub enum PartitionError {
    #[error("group at position {0} carries no demand")]
    Unassigned(usize),
    #[error("cutting radius {radius} outside the band {r1}..{r2}")]
    RadiusOutOfBand { radius: f64, r1: f64, r2: f64 },
    #[error("wedge of {angle:.3} rad leaves no room beside a {corridor:.3} rad entrance")]
    NarrowWedge { angle: f64, corridor: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Simple,
    RoomInRoom,
}

/// A room footprint for one demand item.
#[derive(Clone, Debug, Serialize)]
pub struct Room {
    pub name: String,
    pub target_area: f64,
    pub kind: Option<RoomKind>,
    pub footprints: Vec<PolarSector>,
}

impl Room {
    fn new(item: &DemandItem, footprints: Vec<PolarSector>) -> Room {
        Room {
            name: item.name.clone(),
            target_area: item.area,
            kind: item.kind.or_else(|| RoomKind::from_name(&item.name).ok()),
            footprints,
        }
    }

    /// Geometric floor area of all footprints.
    pub fn area(&self) -> f64 {
        self.footprints.iter().map(|f| f.half_angle_area()).sum()
    }

    pub fn largest(&self) -> Option<&PolarSector> {
        self.footprints.iter().max_by_key(|f| OrderedFloat(f.area()))
    }

    /// Where to put the room's label: the middle of its largest footprint.
    pub fn label_point(&self) -> Option<Point> {
        self.largest().map(|f| f.midpoint())
    }

    /// Inner arc length of the largest footprint.
    pub fn inner_width(&self) -> f64 {
        self.largest().map(|f| f.r1 * f.span()).unwrap_or(0.)
    }
}

/// Rooms whose kind needs a usable inner width and whose largest footprint is narrower than
/// `min_width`.
pub fn narrow_rooms(rooms: &[Room], min_width: f64) -> Vec<&Room> {
    rooms
        .iter()
        .filter(|r| r.kind.map(|k| k.needs_min_width()).unwrap_or(false))
        .filter(|r| r.inner_width() < min_width)
        .collect()
}

/// Resizes the group's outer radius so its floor area matches the assigned total, rounded to
/// a whole radius. Returns the new radius.
pub fn fit_outer_radius(group: &mut SectorGroup) -> Result<f64, PartitionError> {
    let total = match group.items() {
        Some(items) => total_area(items),
        None => return Err(PartitionError::Unassigned(group.origin)),
    };
    let angle = group.bounds.span();
    let r1 = group.bounds.r1;
    let r2 = ((total + angle * r1 * r1 / 2.) * 2. / angle).sqrt().round();
    log::trace!("group at {}: outer radius {} -> {}", group.origin, group.bounds.r2, r2);
    group.reshape(|s| s.with_outer(r2.max(s.r1)));
    Ok(group.bounds.r2)
}

/// Descending by area, ties broken by descending name.
fn by_area_desc(a: &DemandItem, b: &DemandItem) -> Ordering {
    OrderedFloat(b.area)
        .cmp(&OrderedFloat(a.area))
        .then_with(|| b.name.cmp(&a.name))
}

pub struct RoomPartitioner {
    params: Params,
}

impl RoomPartitioner {
    pub fn new(params: &Params) -> RoomPartitioner {
        RoomPartitioner { params: *params }
    }

    pub fn plan_type(&self, items: &[DemandItem]) -> PlanType {
        if items.iter().any(|i| i.area > self.params.simple_room_max_area) {
            PlanType::RoomInRoom
        } else {
            PlanType::Simple
        }
    }

    /// One room per assigned item, cut from the group's bounding wedge.
    pub fn partition(&self, group: &SectorGroup) -> Result<Vec<Room>, PartitionError> {
        let items = group.items().ok_or(PartitionError::Unassigned(group.origin))?;
        let plan = self.plan_type(items);
        log::debug!("group at {}: {:?} plan for {} rooms", group.origin, plan, items.len());
        match plan {
            PlanType::Simple => Ok(self.simple(group.bounds, items)),
            PlanType::RoomInRoom => self.room_in_room(group.bounds, items),
        }
    }

    fn simple(&self, sector: PolarSector, items: &[DemandItem]) -> Vec<Room> {
        let mut sorted = items.to_vec();
        sorted.sort_by(by_area_desc);
        let slices = self.slice_by_areas(sector, &sorted);
        sorted.iter().zip(slices).map(|(item, s)| Room::new(item, vec![s])).collect()
    }

    fn room_in_room(&self, sector: PolarSector, items: &[DemandItem]) -> Result<Vec<Room>, PartitionError> {
        let mut sorted = items.to_vec();
        sorted.sort_by(by_area_desc);
        let big = sorted.remove(0);

        let corridor = self.params.corridor_angle;
        if sector.span() <= corridor {
            return Err(PartitionError::NarrowWedge { angle: sector.span(), corridor });
        }
        let radius = self.cutting_radius(&sector, big.area)?;
        let (inner, outer) = sector.split_radius(radius);
        if sorted.is_empty() {
            return Ok(vec![Room::new(&big, vec![inner, outer])]);
        }
        let (entrance, rest) = inner.split_angle(corridor);
        let mut rooms = vec![Room::new(&big, vec![entrance, outer])];
        // smallest rooms are carved first
        sorted.reverse();
        let slices = self.slice_by_areas(rest, &sorted);
        rooms.extend(sorted.iter().zip(slices).map(|(item, s)| Room::new(item, vec![s])));
        Ok(rooms)
    }

    /// Radius splitting the wedge so the outer band plus a corridor-wide inner entrance holds
    /// `big_area`, floored to a whole radius.
    pub fn cutting_radius(&self, sector: &PolarSector, big_area: f64) -> Result<f64, PartitionError> {
        let corridor = self.params.corridor_angle;
        let angle = sector.span();
        let (r1, r2) = (sector.r1, sector.r2);
        let squared = (2. * big_area - angle * r2 * r2 + corridor * r1 * r1) / (corridor - angle);
        let radius = squared.sqrt().floor();
        // NaN fails both comparisons
        if !(radius >= r1 && radius <= r2) {
            return Err(PartitionError::RadiusOutOfBand { radius, r1, r2 });
        }
        Ok(radius)
    }

    /// Cuts consecutive angular slices, one per item in order. Slices are whole multiples of
    /// the angle quantum rounded down, so a tiny item may get none, and never more than what
    /// is left. The last item takes the remainder.
    fn slice_by_areas(&self, sector: PolarSector, items: &[DemandItem]) -> Vec<PolarSector> {
        let quantum = self.params.angle_quantum;
        let band = sector.r2 * sector.r2 - sector.r1 * sector.r1;
        let mut slices = Vec::with_capacity(items.len());
        let mut rest = sector;
        for (i, item) in items.iter().enumerate() {
            if i + 1 == items.len() {
                slices.push(rest);
                break;
            }
            let exact = 2. * item.area / band;
            let angle = (exact / quantum).floor() * quantum;
            let (cut, remainder) = if angle >= rest.span() {
                (rest, PolarSector { a1: rest.a2, ..rest })
            } else {
                rest.split_angle(angle)
            };
            slices.push(cut);
            rest = remainder;
        }
        slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEFAULT_PARAMS;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assigned(sector: PolarSector, items: &[(f64, &str)]) -> SectorGroup {
        let mut g = SectorGroup::single(sector, 0);
        g.assign(items.iter().map(|&(a, n)| DemandItem::new(a, n)).collect()).unwrap();
        g
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn big_room_wraps_the_small_ones() {
        let sector = PolarSector::new(Point::default(), 0., FRAC_PI_2, 5., 20.);
        let group = assigned(sector, &[(150., "big"), (30., "x"), (20., "y")]);
        let p = RoomPartitioner::new(&DEFAULT_PARAMS);
        assert_eq!(p.plan_type(group.items().unwrap()), PlanType::RoomInRoom);
        assert_eq!(p.cutting_radius(&sector, 150.).unwrap(), 16.);

        let rooms = p.partition(&group).unwrap();
        let names = rooms.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["big", "y", "x"]);
        assert_eq!(rooms[0].footprints.len(), 2);
        assert_eq!(rooms[0].footprints[1].r1, 16.);

        // the pieces tile the wedge
        let total = rooms.iter().map(|r| r.area()).sum::<f64>();
        assert!(close(total, sector.half_angle_area()), "{} vs {}", total, sector.half_angle_area());
        // y gets one whole quantum of the inner band
        assert!(close(rooms[1].footprints[0].span(), PI / 36.));
        assert!(close(rooms[2].footprints[0].a2, FRAC_PI_2));
    }

    #[test]
    fn simple_slices_are_contiguous() {
        let sector = PolarSector::new(Point::default(), 0., PI, 4., 14.);
        let group = assigned(sector, &[(20., "c"), (40., "a"), (30., "b")]);
        let rooms = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap();
        let names = rooms.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(close(rooms[0].footprints[0].span(), 5. * PI / 36.));
        assert!(close(rooms[1].footprints[0].span(), 3. * PI / 36.));
        for pair in rooms.windows(2) {
            assert!(close(pair[0].footprints[0].a2, pair[1].footprints[0].a1));
        }
        assert!(close(rooms[2].footprints[0].a2, PI));
    }

    #[test]
    fn slices_never_overrun_the_wedge() {
        let sector = PolarSector::new(Point::default(), 0., PI / 18., 0., 5.);
        let group = assigned(sector, &[(90., "a"), (80., "b"), (70., "c")]);
        let rooms = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap();
        assert_eq!(rooms.len(), 3);
        assert!(rooms.iter().all(|r| r.footprints[0].a2 <= PI / 18. + 1e-12));
        assert!(rooms.iter().all(|r| r.footprints[0].span() >= 0.));
    }

    #[test]
    fn equal_areas_each_get_a_slice() {
        let sector = PolarSector::new(Point::default(), 0., PI, 0., 10.);
        let group = assigned(sector, &[(20., "a"), (20., "b"), (20., "c")]);
        let rooms = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap();
        assert_eq!(rooms.len(), 3);
        assert!(rooms.iter().all(|r| r.footprints.len() == 1));
    }

    #[test]
    fn tiny_items_floor_to_zero_width() {
        let sector = PolarSector::new(Point::default(), 0., PI, 0., 10.);
        let group = assigned(sector, &[(50., "a"), (1., "b"), (0.5, "c")]);
        let rooms = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap();
        let names = rooms.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(close(rooms[0].footprints[0].span(), 11. * PI / 36.));
        assert!(close(rooms[1].footprints[0].span(), 0.));
        assert!(close(rooms[2].footprints[0].a1, 11. * PI / 36.));
        assert!(close(rooms[2].footprints[0].a2, PI));
    }

    #[test]
    fn lone_big_room_has_two_footprints() {
        let sector = PolarSector::new(Point::default(), 0., FRAC_PI_2, 5., 20.);
        let group = assigned(sector, &[(150., "big")]);
        let rooms = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap();
        assert_eq!(rooms.len(), 1);
        let big = &rooms[0];
        assert_eq!(big.footprints.len(), 2);
        assert!(big.footprints.iter().all(|f| close(f.span(), FRAC_PI_2)));
        assert_eq!(big.footprints[0].r2, 16.);
        assert_eq!(big.footprints[1].r1, 16.);
        assert!(close(big.area(), sector.half_angle_area()));
    }

    #[test]
    fn oversized_big_room_is_rejected() {
        let sector = PolarSector::new(Point::default(), 0., FRAC_PI_2, 5., 20.);
        let group = assigned(sector, &[(500., "big"), (30., "x")]);
        let err = RoomPartitioner::new(&DEFAULT_PARAMS).partition(&group).unwrap_err();
        assert!(matches!(err, PartitionError::RadiusOutOfBand { .. }));
    }

    #[test]
    fn vacant_groups_cannot_be_partitioned() {
        let g = SectorGroup::single(PolarSector::new(Point::default(), 0., 1., 0., 5.), 3);
        assert_eq!(
            RoomPartitioner::new(&DEFAULT_PARAMS).partition(&g).unwrap_err(),
            PartitionError::Unassigned(3)
        );
    }

    #[test]
    fn outer_radius_fits_demand() {
        let mut g = assigned(PolarSector::new(Point::default(), 0., FRAC_PI_2, 0., 30.), &[(100., "a")]);
        assert_eq!(fit_outer_radius(&mut g).unwrap(), 11.);
        assert_eq!(g.sectors[0].r2, 11.);
    }

    #[test]
    fn narrow_offices_are_flagged() {
        let room = |name: &str, r1: f64| Room::new(
            &DemandItem::new(10., name),
            vec![PolarSector::new(Point::default(), 0., 0.5, r1, r1 + 4.)],
        );
        let rooms = vec![room("office", 1.), room("storage", 1.), room("사무실", 6.)];
        let narrow = narrow_rooms(&rooms, 1.5);
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].name, "office");
        assert_eq!(rooms[2].kind, Some(RoomKind::Office));
        let label = rooms[0].label_point().unwrap();
        assert!(label.x > 0. && label.y > 0.);
    }
}
