//! First-position search: match each cluster's largest demands to envelope sectors, escalating
//! to merged runs of adjacent sectors when single sectors are too small, then combine one
//! position per cluster into non-overlapping position scenarios.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::demand::{total_area, AreaCluster, DemandItem};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::envelope::MassEnvelope;
use crate::params::Params;
use crate::ring::Ring;
use crate::sector_group::SectorGroup;
use crate::seed;

/// A sector (or merged run of sectors) matched to a prefix of one cluster's demands.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Index of the cluster in processing order
    pub cluster: usize,
    /// Detached group carrying the matched prefix
    pub group: SectorGroup,
    /// Pairwise merges applied to reach this group
    pub combine_level: usize,
}

/// One first position per cluster, completed into a full ring.
#[derive(Clone, Debug)]
pub struct PositionScenario {
    pub candidates: Vec<Candidate>,
    pub ring: Ring,
}

/// A complete ring with every cluster grown into place, plus any demand that could not be.
#[derive(Clone, Debug)]
pub struct Layout {
    pub ring: Ring,
    /// Items of unmergeable or failed extension buckets
    pub unplaced: Vec<DemandItem>,
}

impl Layout {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Allocation {
    pub layouts: Vec<Layout>,
    /// Clusters below the minimum viable area
    pub skipped: Vec<AreaCluster>,
}

/// Places area clusters onto a mass envelope.
pub struct AllocationEngine<'a> {
    envelope: &'a MassEnvelope,
    params: Params,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(envelope: &'a MassEnvelope, params: &Params) -> AllocationEngine<'a> {
        AllocationEngine { envelope, params: *params }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Runs both search phases. Infeasibility is not an error: it shows up as an empty layout
    /// list and entries in `diag`.
    pub fn allocate(&self, mut clusters: Vec<AreaCluster>, diag: &mut Diagnostics) -> Allocation {
        // Largest program first
        clusters.sort_by_key(|c| Reverse(OrderedFloat(c.total)));

        let mut skipped = Vec::new();
        let mut active = Vec::new();
        let first_positions = match self.first_positions(clusters, &mut active, &mut skipped, diag) {
            Some(fp) if !fp.is_empty() => fp,
            _ => {
                log::info!("{}: no first positions", self.envelope.name);
                return Allocation { layouts: Vec::new(), skipped };
            }
        };

        let scenarios = self.position_scenarios(&first_positions, diag);
        log::info!(
            "{}: {} first position scenarios",
            self.envelope.name,
            scenarios.len()
        );

        let mut layouts = Vec::new();
        for (i, scenario) in scenarios.iter().enumerate() {
            log::debug!("growing position scenario {}", i);
            layouts.extend(seed::grow(
                self.envelope.ring(),
                scenario,
                &active,
                &self.params,
                diag,
            ));
        }
        log::info!("{}: {} layouts", self.envelope.name, layouts.len());
        Allocation { layouts, skipped }
    }

    /// Whether a sector of `area` is a plausible first home for `demand`. Large demands only
    /// take sectors no bigger than themselves.
    pub fn area_is_similar(&self, demand: f64, area: f64) -> bool {
        let p = &self.params;
        if demand > p.large_demand {
            area <= demand && area * p.upper_match_ratio >= demand
        } else {
            area * p.lower_match_ratio <= demand && demand <= area * p.upper_match_ratio
        }
    }

    /// Envelope groups with each one folded together with the next `level` groups along the
    /// ring. Level 0 is the envelope itself.
    pub fn combined_groups(&self, level: usize) -> Vec<SectorGroup> {
        let ring = self.envelope.ring();
        let base = ring.groups().collect::<Vec<_>>();
        let n = base.len();
        (0..n)
            .map(|i| {
                (1..=level).fold(base[i].duplicate(), |acc, j| acc.merged(base[(i + j) % n]))
            })
            .collect()
    }

    /// Finds envelope groups matching the summed demand of `items`, merging adjacent groups
    /// one more level at a time until something matches. Gives up once a merged run is wider
    /// than the over-merge span. The error says why nothing matched.
    pub fn find_matching_area_groups(
        &self,
        cluster: &str,
        items: &[DemandItem],
    ) -> Result<Vec<(SectorGroup, usize)>, Diagnostic> {
        let demand = total_area(items);
        let n = self.envelope.ring().len();
        for level in 0..n {
            let groups = self.combined_groups(level);
            let span = groups.iter().map(|g| g.bounds.span()).fold(0., f64::max);
            if span > self.params.over_merge_span {
                log::debug!("{}: over-merged at level {} ({:.3} rad)", cluster, level, span);
                return Err(Diagnostic::OverMerge { cluster: cluster.to_string(), demand, span });
            }
            let matches = groups
                .into_iter()
                .filter(|g| self.area_is_similar(demand, g.area()))
                .map(|g| (g, level))
                .collect::<Vec<_>>();
            log::trace!(
                "{}: demand {} level {} -> {} matches",
                cluster,
                demand,
                level,
                matches.len()
            );
            if !matches.is_empty() {
                return Ok(matches);
            }
        }
        Err(Diagnostic::InfeasibleDemand { cluster: cluster.to_string(), demand })
    }

    /// Candidate first positions per cluster, in processing order. Clusters below the minimum
    /// area go to `skipped`; the others are moved to `active` in step with the result. Returns
    /// `None` as soon as a cluster has no candidate at all.
    pub fn first_positions(
        &self,
        clusters: Vec<AreaCluster>,
        active: &mut Vec<AreaCluster>,
        skipped: &mut Vec<AreaCluster>,
        diag: &mut Diagnostics,
    ) -> Option<Vec<Vec<Candidate>>> {
        let mut positions = Vec::new();
        for cluster in clusters {
            let total = cluster.item_total();
            if total < self.params.too_small_area {
                log::debug!("{}: too small ({})", cluster.name, total);
                diag.push(Diagnostic::TooSmallDemand { cluster: cluster.name.clone(), total });
                skipped.push(cluster);
                continue;
            }

            let mut items = cluster.items.clone();
            items.sort_by(|a, b| {
                OrderedFloat(b.area)
                    .cmp(&OrderedFloat(a.area))
                    .then_with(|| b.name.cmp(&a.name))
            });

            let mut candidates = Vec::new();
            for i in 0..items.len() {
                let prefix = &items[..=i];
                if total_area(prefix) > self.params.prefix_cap {
                    break;
                }
                match self.find_matching_area_groups(&cluster.name, prefix) {
                    Ok(found) => {
                        for (mut group, combine_level) in found {
                            if group.assign(prefix.to_vec()).is_ok() {
                                candidates.push(Candidate { cluster: active.len(), group, combine_level });
                            }
                        }
                    }
                    // Shorter prefixes already placed the cluster
                    Err(reason) if !candidates.is_empty() => {
                        log::trace!("{}: prefix of {} unmatched: {:?}", cluster.name, i + 1, reason);
                    }
                    Err(reason) => {
                        log::debug!("{}: no match", cluster.name);
                        diag.push(reason);
                        return None;
                    }
                }
            }
            if candidates.is_empty() {
                // Even the largest single item is over the prefix cap
                diag.push(Diagnostic::InfeasibleDemand {
                    cluster: cluster.name.clone(),
                    demand: items.first().map(|i| i.area).unwrap_or(0.),
                });
                return None;
            }
            log::debug!("{}: {} candidates", cluster.name, candidates.len());
            active.push(cluster);
            positions.push(candidates);
        }
        Some(positions)
    }

    /// Every choice of one candidate per cluster whose footprints do not overlap, each
    /// completed into a full ring over the envelope.
    pub fn position_scenarios(
        &self,
        first_positions: &[Vec<Candidate>],
        diag: &mut Diagnostics,
    ) -> Vec<PositionScenario> {
        let mut out = Vec::new();
        let mut stack = Vec::with_capacity(first_positions.len());
        self.extend_positions(first_positions, &mut stack, &mut out, diag);
        out
    }

    fn extend_positions<'c>(
        &self,
        first_positions: &'c [Vec<Candidate>],
        stack: &mut Vec<&'c Candidate>,
        out: &mut Vec<PositionScenario>,
        diag: &mut Diagnostics,
    ) {
        let depth = stack.len();
        if depth == first_positions.len() {
            let claimed = stack.iter().map(|c| c.group.detached()).collect();
            match Ring::assemble(self.envelope.ring(), claimed) {
                Some(ring) => out.push(PositionScenario {
                    candidates: stack.iter().map(|&c| c.clone()).collect(),
                    ring,
                }),
                None => diag.pruned_overlaps += 1,
            }
            return;
        }
        let tolerance = self.params.overlap_tolerance;
        for cand in first_positions[depth].iter() {
            if stack
                .iter()
                .any(|c| c.group.bounds.overlaps(&cand.group.bounds, tolerance))
            {
                log::trace!("pruning overlapping candidate at {}", cand.group.origin);
                diag.pruned_overlaps += 1;
                continue;
            }
            stack.push(cand);
            self.extend_positions(first_positions, stack, out, diag);
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEFAULT_PARAMS;
    use crate::polar_sector::Point;

    fn envelope(radius: f64) -> MassEnvelope {
        MassEnvelope::uniform("A", Point::default(), 12, radius, 1000.)
    }

    #[test]
    fn similarity_bands() {
        let env = envelope(10.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        // small demands: area * 0.85 <= demand <= area * 1.6
        assert!(engine.area_is_similar(100., 110.));
        assert!(engine.area_is_similar(100., 62.5));
        assert!(!engine.area_is_similar(100., 120.));
        assert!(!engine.area_is_similar(100., 60.));
        // large demands never take a larger sector
        assert!(engine.area_is_similar(220., 200.));
        assert!(!engine.area_is_similar(220., 221.));
        assert!(!engine.area_is_similar(220., 130.));
    }

    #[test]
    fn escalates_to_merged_pairs() {
        // each sector is ~52.4, too small for 100 on its own
        let env = envelope(10.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let items = vec![DemandItem::new(60., "a"), DemandItem::new(40., "b")];
        let found = engine.find_matching_area_groups("c", &items).unwrap();
        assert_eq!(found.len(), 12);
        for (g, level) in found.iter() {
            assert_eq!(*level, 1);
            assert_eq!(g.width, 2);
            assert!(g.area() * 0.85 <= 100. && 100. <= g.area() * 1.6);
        }
    }

    #[test]
    fn over_merge_guard_stops_escalation() {
        let env = envelope(3.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let found = engine.find_matching_area_groups("c", &[DemandItem::new(200., "a")]);
        assert!(matches!(found, Err(Diagnostic::OverMerge { .. })));
    }

    #[test]
    fn placed_clusters_carry_no_infeasibility() {
        // ~4.7 per sector: 50 fits seven merged sectors, 60 would need more than 1.2π
        let env = envelope(3.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let (mut active, mut skipped) = (Vec::new(), Vec::new());
        let cluster = AreaCluster::new(
            "c",
            vec![DemandItem::new(50., "a"), DemandItem::new(10., "b")],
        );
        let fp = engine
            .first_positions(vec![cluster], &mut active, &mut skipped, &mut diag)
            .unwrap();
        assert_eq!(fp[0].len(), 12);
        assert!(fp[0].iter().all(|c| c.combine_level == 6));
        assert!(diag.is_empty());
    }

    #[test]
    fn unplaceable_cluster_reports_why() {
        let env = envelope(3.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let (mut active, mut skipped) = (Vec::new(), Vec::new());
        let cluster = AreaCluster::new("c", vec![DemandItem::new(150., "a")]);
        assert!(engine
            .first_positions(vec![cluster], &mut active, &mut skipped, &mut diag)
            .is_none());
        assert_eq!(diag.count(|d| matches!(d, Diagnostic::OverMerge { .. })), 1);
    }

    #[test]
    fn first_positions_collect_every_prefix() {
        let env = envelope(10.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let (mut active, mut skipped) = (Vec::new(), Vec::new());
        let cluster = AreaCluster::new(
            "c",
            vec![DemandItem::new(40., "b"), DemandItem::new(60., "a")],
        );
        let fp = engine
            .first_positions(vec![cluster], &mut active, &mut skipped, &mut diag)
            .unwrap();
        assert_eq!(fp.len(), 1);
        // 12 singles for [a], 12 pairs for [a, b]
        assert_eq!(fp[0].len(), 24);
        let pair = fp[0].iter().find(|c| c.combine_level == 1).unwrap();
        let names = pair.group.items().unwrap().iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
        let single = fp[0].iter().find(|c| c.combine_level == 0).unwrap();
        assert_eq!(single.group.items().unwrap().len(), 1);
    }

    #[test]
    fn too_small_clusters_are_skipped() {
        let env = envelope(10.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let clusters = vec![
            AreaCluster::new("tiny", vec![DemandItem::new(12., "wc")]),
            AreaCluster::new("c", vec![DemandItem::new(60., "a")]),
        ];
        let (mut active, mut skipped) = (Vec::new(), Vec::new());
        let fp = engine
            .first_positions(clusters, &mut active, &mut skipped, &mut diag)
            .unwrap();
        assert_eq!(fp.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].name, "tiny");
        assert_eq!(active[0].name, "c");
    }

    #[test]
    fn unmatched_cluster_aborts_search() {
        let env = envelope(3.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let clusters = vec![AreaCluster::new("c", vec![DemandItem::new(150., "a")])];
        let result = engine.allocate(clusters, &mut diag);
        assert!(result.layouts.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn overlapping_only_candidates_yield_no_scenario() {
        let env = envelope(10.);
        let engine = AllocationEngine::new(&env, &DEFAULT_PARAMS);
        let mut diag = Diagnostics::new();
        let groups = engine.combined_groups(1);
        let cand = |cluster: usize, i: usize| Candidate {
            cluster,
            group: groups[i].clone(),
            combine_level: 1,
        };
        // positions 3-4 and 4-5 share sector 4
        let first = vec![vec![cand(0, 3)], vec![cand(1, 4)]];
        assert!(engine.position_scenarios(&first, &mut diag).is_empty());
        assert_eq!(diag.pruned_overlaps, 1);

        // adjacent but disjoint runs are fine
        let first = vec![vec![cand(0, 3)], vec![cand(1, 5)]];
        let scenarios = engine.position_scenarios(&first, &mut diag);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].ring.len(), 10);
        assert!(scenarios[0].ring.covers_exactly_once());
    }
}
