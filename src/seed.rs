//! Seed growth: every first position grows into the vacant groups around it until its whole
//! cluster is placed.
//!
//! For one position scenario each seed discovers its vacant neighbours on both sides, splits
//! its unmet demand into a prev bucket and a next bucket in every possible way, and picks the
//! closest neighbours that cover each bucket. One extension per seed is then chosen so that no
//! two seeds' footprints overlap, and each such combination becomes a layout.

use fxhash::FxHashMap;

use crate::allocation::{Layout, PositionScenario};
use crate::demand::{total_area, AreaCluster, DemandItem};
use crate::diagnostics::{Diagnostic, Diagnostics, Side};
use crate::params::Params;
use crate::polar_sector::PolarSector;
use crate::ring::Ring;
use crate::sector_group::GroupKey;

/// A proposed growth of one seed.
#[derive(Clone, Debug)]
pub struct ExtensionScenario {
    pub prev_items: Vec<DemandItem>,
    pub next_items: Vec<DemandItem>,
    /// Consumed neighbours, closest to the seed first
    pub prev_groups: Vec<GroupKey>,
    pub next_groups: Vec<GroupKey>,
    /// Seed bounds plus the bounds of every consumed neighbour
    pub footprint: Vec<PolarSector>,
}

impl ExtensionScenario {
    /// True if any part of this footprint overlaps any part of the other by more than
    /// `tolerance` radians.
    pub fn overlaps(&self, other: &ExtensionScenario, tolerance: f64) -> bool {
        self.footprint
            .iter()
            .any(|a| other.footprint.iter().any(|b| a.overlaps(b, tolerance)))
    }
}

/// A first position bound to its cluster.
#[derive(Clone, Debug)]
pub struct Seed {
    pub cluster: String,
    /// Seed group in the scenario ring
    pub key: GroupKey,
    /// Cluster items the first position did not take
    pub unmet: Vec<DemandItem>,
    /// Vacant neighbours, closest first
    pub prev_groups: Vec<GroupKey>,
    pub next_groups: Vec<GroupKey>,
    pub scenarios: Vec<ExtensionScenario>,
}

impl Seed {
    pub fn new(ring: &Ring, key: GroupKey, cluster: &AreaCluster) -> Seed {
        let placed = ring.get(key).items().unwrap_or(&[]);
        Seed {
            cluster: cluster.name.clone(),
            key,
            unmet: cluster.unplaced(placed),
            prev_groups: Vec::new(),
            next_groups: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    pub fn unmet_area(&self) -> f64 {
        total_area(&self.unmet)
    }

    /// Walks both directions from the seed collecting vacant groups, stopping at a claimed
    /// group or back at the seed. A walk that hits the step cap finds nothing.
    pub fn discover_neighbours(&mut self, ring: &Ring, params: &Params, diag: &mut Diagnostics) {
        self.next_groups = self.walk(ring, Side::Next, params.walk_cap, diag);
        self.prev_groups = self.walk(ring, Side::Prev, params.walk_cap, diag);
        log::trace!(
            "{}: {} prev / {} next growable groups",
            self.cluster,
            self.prev_groups.len(),
            self.next_groups.len()
        );
    }

    fn walk(&self, ring: &Ring, side: Side, cap: usize, diag: &mut Diagnostics) -> Vec<GroupKey> {
        let step = |k| match side {
            Side::Next => ring.next(k),
            Side::Prev => ring.prev(k),
        };
        let mut found = Vec::new();
        let mut k = step(self.key);
        while !ring.get(k).is_claimed() && k != self.key {
            if found.len() == cap {
                diag.push(Diagnostic::IterationLimitReached { cluster: self.cluster.clone(), side, cap });
                return Vec::new();
            }
            found.push(k);
            k = step(k);
        }
        found
    }

    pub fn prev_capacity(&self, ring: &Ring) -> f64 {
        self.prev_groups.iter().map(|&k| ring.get(k).area()).sum()
    }

    pub fn next_capacity(&self, ring: &Ring) -> f64 {
        self.next_groups.iter().map(|&k| ring.get(k).area()).sum()
    }

    /// Whether the neighbours on both sides together could hold the unmet demand.
    pub fn is_extendable(&self, ring: &Ring) -> bool {
        self.prev_capacity(ring) + self.next_capacity(ring) >= self.unmet_area()
    }

    /// Enumerates every split of the unmet items into a prev and a next bucket that fits the
    /// capacity on each side, and picks neighbours for each bucket.
    pub fn find_extension_scenarios(&mut self, ring: &Ring, params: &Params, diag: &mut Diagnostics) {
        let k = self.unmet.len();
        if k > params.partition_item_cap {
            diag.push(Diagnostic::PartitionOverflow {
                cluster: self.cluster.clone(),
                items: k,
                cap: params.partition_item_cap,
            });
            self.scenarios = Vec::new();
            return;
        }

        let prev_left = self.prev_capacity(ring);
        let next_left = self.next_capacity(ring);
        let seed_bounds = ring.get(self.key).bounds;

        let mut scenarios = Vec::new();
        // Pattern 0 puts everything in the prev bucket; the first item flips slowest
        for pattern in 0..(1usize << k) {
            let (mut prev_items, mut next_items) = (Vec::new(), Vec::new());
            for (j, item) in self.unmet.iter().enumerate() {
                if pattern >> (k - 1 - j) & 1 == 0 {
                    prev_items.push(item.clone());
                } else {
                    next_items.push(item.clone());
                }
            }
            let prev_total = total_area(&prev_items);
            let next_total = total_area(&next_items);
            if !(prev_total < prev_left && next_total < next_left) {
                continue;
            }

            let prev_groups = self.accumulate(ring, prev_total, Side::Prev, params.accumulate_cap, diag);
            let next_groups = self.accumulate(ring, next_total, Side::Next, params.accumulate_cap, diag);
            if prev_groups.iter().any(|k| next_groups.contains(k)) {
                diag.push(Diagnostic::OverlappingBuckets { cluster: self.cluster.clone() });
                continue;
            }

            let mut footprint = vec![seed_bounds];
            footprint.extend(prev_groups.iter().map(|&k| ring.get(k).bounds));
            footprint.extend(next_groups.iter().map(|&k| ring.get(k).bounds));
            scenarios.push(ExtensionScenario {
                prev_items,
                next_items,
                prev_groups,
                next_groups,
                footprint,
            });
        }
        log::debug!("{}: {} extension scenarios", self.cluster, scenarios.len());
        self.scenarios = scenarios;
    }

    /// Closest neighbours on one side until their area reaches `target`.
    fn accumulate(
        &self,
        ring: &Ring,
        target: f64,
        side: Side,
        cap: usize,
        diag: &mut Diagnostics,
    ) -> Vec<GroupKey> {
        let groups = match side {
            Side::Prev => &self.prev_groups,
            Side::Next => &self.next_groups,
        };
        let mut picked = Vec::new();
        let mut area = 0.;
        while area < target {
            if picked.len() == cap {
                diag.push(Diagnostic::IterationLimitReached { cluster: self.cluster.clone(), side, cap });
                return Vec::new();
            }
            let Some(&k) = groups.get(picked.len()) else {
                return Vec::new();
            };
            area += ring.get(k).area();
            picked.push(k);
        }
        picked
    }

    /// Applies an extension to `ring`: each side's neighbours are merged into one new group
    /// carrying that side's bucket. Buckets over `max_bucket_items` are left unmerged and come
    /// back as unplaced items, as do buckets without neighbours.
    pub fn expand_by(
        &self,
        ring: &mut Ring,
        scenario: &ExtensionScenario,
        params: &Params,
        diag: &mut Diagnostics,
    ) -> Vec<DemandItem> {
        let mut unplaced = Vec::new();
        let sides = [
            (Side::Next, &scenario.next_groups, &scenario.next_items),
            (Side::Prev, &scenario.prev_groups, &scenario.prev_items),
        ];
        for (side, groups, items) in sides {
            if items.is_empty() {
                continue;
            }
            if groups.is_empty() {
                unplaced.extend(items.iter().cloned());
                continue;
            }
            if items.len() > params.max_bucket_items {
                log::warn!(
                    "{}: {} bucket of {} items is too large to merge",
                    self.cluster,
                    side,
                    items.len()
                );
                diag.push(Diagnostic::UnmergeableBucket {
                    cluster: self.cluster.clone(),
                    side,
                    items: items.iter().map(|i| i.name.clone()).collect(),
                });
                unplaced.extend(items.iter().cloned());
                continue;
            }
            // Merge in ring order
            let mut run = groups.clone();
            if side == Side::Prev {
                run.reverse();
            }
            let assigned = ring
                .merge_run(&run)
                .map(|merged| ring.get_mut(merged).assign(items.clone()).is_ok())
                .unwrap_or(false);
            if !assigned {
                unplaced.extend(items.iter().cloned());
            }
        }
        unplaced
    }
}

/// Marks vacant groups too shallow to build in, so walks stop at them.
pub fn block_shallow_groups(ring: &mut Ring, min_depth: f64) {
    for key in ring.keys() {
        let group = ring.get_mut(key);
        if !group.is_claimed() && group.bounds.depth() < min_depth {
            log::trace!("blocking shallow group at {}", group.origin);
            let _ = group.block();
        }
    }
}

/// Grows every seed of a position scenario and returns one layout per valid combination of
/// extensions. Returns nothing if any seed cannot be extended.
pub fn grow(
    envelope: &Ring,
    position: &PositionScenario,
    clusters: &[AreaCluster],
    params: &Params,
    diag: &mut Diagnostics,
) -> Vec<Layout> {
    let mut ring = position.ring.clone();
    block_shallow_groups(&mut ring, params.min_growth_depth);

    let by_origin = ring
        .keys()
        .into_iter()
        .map(|k| (ring.get(k).origin, k))
        .collect::<FxHashMap<_, _>>();

    let mut seeds = Vec::with_capacity(position.candidates.len());
    for cand in position.candidates.iter() {
        let Some(&key) = by_origin.get(&cand.group.origin) else {
            log::warn!("candidate at {} missing from its scenario ring", cand.group.origin);
            return Vec::new();
        };
        let mut seed = Seed::new(&ring, key, &clusters[cand.cluster]);
        seed.discover_neighbours(&ring, params, diag);
        seeds.push(seed);
    }

    for seed in seeds.iter() {
        if !seed.is_extendable(&ring) {
            diag.push(Diagnostic::NotExtendable {
                cluster: seed.cluster.clone(),
                available: seed.prev_capacity(&ring) + seed.next_capacity(&ring),
                needed: seed.unmet_area(),
            });
            return Vec::new();
        }
    }
    for seed in seeds.iter_mut() {
        seed.find_extension_scenarios(&ring, params, diag);
    }

    let combinations = combine_scenarios(&seeds, params.overlap_tolerance, diag);
    log::debug!("{} extension combinations", combinations.len());

    let mut layouts = Vec::with_capacity(combinations.len());
    for combination in combinations {
        let mut grown = ring.clone();
        let mut unplaced = Vec::new();
        for (seed, &choice) in seeds.iter().zip(combination.iter()) {
            unplaced.extend(seed.expand_by(&mut grown, &seed.scenarios[choice], params, diag));
        }
        let claimed = grown
            .groups()
            .filter(|g| g.is_assigned())
            .map(|g| g.detached())
            .collect();
        match Ring::assemble(envelope, claimed) {
            Some(ring) => layouts.push(Layout { ring, unplaced }),
            None => log::warn!("grown ring does not cover the envelope once; dropped"),
        }
    }
    layouts
}

/// Widens badly proportioned or undersized assigned groups by absorbing vacant neighbours,
/// alternating next and prev, one per attempt. A group is rebuilt only once a wider candidate
/// is both shape-OK and larger than its demand; otherwise it is left as it was.
///
/// Returns the number of groups rebuilt.
pub fn horizontal_expand(ring: &mut Ring, params: &Params) -> usize {
    let mut expanded = 0;
    for key in ring.assigned_keys() {
        let group = ring.get(key);
        let demand = group.target_area();
        if group.shape_ok(params.shape_ratio) && group.area() > demand {
            continue;
        }
        let items = group.items().map(<[DemandItem]>::to_vec).unwrap_or_default();

        let (mut first, mut last) = (key, key);
        let mut grown = group.duplicate();
        let mut found = None;
        for attempt in 0..params.expand_attempts {
            let forward = attempt % 2 == 0;
            let k = if forward { ring.next(last) } else { ring.prev(first) };
            let neighbour = ring.get(k);
            if neighbour.is_claimed() || k == first || k == last {
                continue;
            }
            if forward {
                grown = grown.merged(neighbour);
                last = k;
            } else {
                grown = neighbour.merged(&grown);
                first = k;
            }
            if grown.shape_ok(params.shape_ratio) && grown.area() > demand {
                found = Some(grown);
                break;
            }
        }

        let Some(mut wider) = found else {
            log::trace!("group at {} kept its shape", ring.get(key).origin);
            continue;
        };
        log::debug!(
            "group at {} widened to {} positions ({:.1} for {:.1})",
            ring.get(key).origin,
            wider.width,
            wider.area(),
            demand
        );
        if wider.assign(items).is_ok() {
            ring.splice(first, last, wider);
            expanded += 1;
        }
    }
    expanded
}

/// Every choice of one scenario per seed with pairwise non-overlapping footprints, as indices
/// into each seed's scenario list.
pub fn combine_scenarios(seeds: &[Seed], tolerance: f64, diag: &mut Diagnostics) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut stack = Vec::with_capacity(seeds.len());
    extend_combination(seeds, tolerance, &mut stack, &mut out, diag);
    out
}

fn extend_combination(
    seeds: &[Seed],
    tolerance: f64,
    stack: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
    diag: &mut Diagnostics,
) {
    let depth = stack.len();
    if depth == seeds.len() {
        out.push(stack.clone());
        return;
    }
    for (i, scenario) in seeds[depth].scenarios.iter().enumerate() {
        let clash = stack
            .iter()
            .enumerate()
            .any(|(s, &c)| seeds[s].scenarios[c].overlaps(scenario, tolerance));
        if clash {
            diag.pruned_overlaps += 1;
            continue;
        }
        stack.push(i);
        extend_combination(seeds, tolerance, stack, out, diag);
        stack.pop();
    }
}
