//! Circular doubly-linked rings of [`SectorGroup`]s stored in a slotmap arena.
//!
//! Links are arena keys, never references. Merging allocates a new group and rewrites the two
//! neighbour links around it; the merged originals stay in the arena but are no longer
//! reachable from the ring, and go away with the arena. Cloning a ring is a snapshot: keys
//! stay valid in the copy, and nothing done to the copy is visible in the original.

use fxhash::FxHashSet;
use slotmap::SlotMap;

use crate::sector_group::{GroupKey, SectorGroup};

#[derive(Clone, Debug)]
pub struct Ring {
    arena: SlotMap<GroupKey, SectorGroup>,
    /// Any group currently on the ring
    root: GroupKey,
    /// Number of envelope positions the ring covers
    n_positions: usize,
}

impl Ring {
    /// Links groups into a ring ordered by their first envelope position.
    pub fn from_groups(mut groups: Vec<SectorGroup>, n_positions: usize) -> Ring {
        groups.sort_by_key(|g| g.origin);
        let mut arena = SlotMap::with_key();
        let keys = groups
            .into_iter()
            .map(|g| arena.insert(g))
            .collect::<Vec<_>>();
        let n = keys.len();
        for i in 0..n {
            let g = &mut arena[keys[i]];
            g.prev = keys[(i + n - 1) % n];
            g.next = keys[(i + 1) % n];
        }
        Ring {
            arena,
            root: keys.first().copied().unwrap_or_default(),
            n_positions,
        }
    }

    /// Completes a partial set of claimed groups into a full ring: every envelope position no
    /// claimed group covers is refilled with a vacant duplicate of the envelope's group.
    ///
    /// Returns `None` if two claimed groups cover the same position.
    pub fn assemble(envelope: &Ring, claimed: Vec<SectorGroup>) -> Option<Ring> {
        let n = envelope.n_positions;
        let mut covered = FxHashSet::default();
        for g in claimed.iter() {
            for p in g.positions(n) {
                if !covered.insert(p) {
                    log::trace!("position {} claimed twice", p);
                    return None;
                }
            }
        }
        let mut groups = claimed;
        for g in envelope.groups() {
            let taken = g.positions(n).filter(|p| covered.contains(p)).count();
            if taken == 0 {
                groups.push(g.duplicate());
            } else if taken != g.width {
                log::trace!("envelope group at {} partially claimed", g.origin);
                return None;
            }
        }
        Some(Ring::from_groups(groups, n))
    }

    pub fn n_positions(&self) -> usize {
        self.n_positions
    }

    pub fn root(&self) -> GroupKey {
        self.root
    }

    pub fn get(&self, key: GroupKey) -> &SectorGroup {
        &self.arena[key]
    }

    pub fn get_mut(&mut self, key: GroupKey) -> &mut SectorGroup {
        &mut self.arena[key]
    }

    pub fn next(&self, key: GroupKey) -> GroupKey {
        self.arena[key].next
    }

    pub fn prev(&self, key: GroupKey) -> GroupKey {
        self.arena[key].prev
    }

    /// Keys of the groups on the ring, in ring order from the root.
    pub fn keys(&self) -> Vec<GroupKey> {
        let mut keys = Vec::new();
        if !self.arena.contains_key(self.root) {
            return keys;
        }
        let mut k = self.root;
        // Stale arena entries make the arena a safe upper bound on the ring length
        for _ in 0..self.arena.len() {
            keys.push(k);
            k = self.arena[k].next;
            if k == self.root {
                break;
            }
        }
        keys
    }

    /// Groups in ring order from the root.
    pub fn groups(&self) -> impl Iterator<Item = &SectorGroup> + '_ {
        self.keys().into_iter().map(move |k| &self.arena[k])
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_area(&self) -> f64 {
        self.groups().map(|g| g.area()).sum()
    }

    /// Keys of groups carrying an assignment.
    pub fn assigned_keys(&self) -> Vec<GroupKey> {
        self.keys()
            .into_iter()
            .filter(|&k| self.arena[k].is_assigned())
            .collect()
    }

    /// Puts a detached group on the ring in place of the consecutive run `first..=last`.
    pub fn splice(&mut self, first: GroupKey, last: GroupKey, mut group: SectorGroup) -> GroupKey {
        let prev = self.arena[first].prev;
        let next = self.arena[last].next;
        let key = if prev == last {
            // The run was the whole ring
            let key = self.arena.insert(group);
            self.arena[key].prev = key;
            self.arena[key].next = key;
            key
        } else {
            group.prev = prev;
            group.next = next;
            let key = self.arena.insert(group);
            self.arena[prev].next = key;
            self.arena[next].prev = key;
            key
        };
        self.root = key;
        key
    }

    /// Merges `a` with its successor `b` into a new vacant group and relinks the neighbours.
    pub fn merge(&mut self, a: GroupKey, b: GroupKey) -> GroupKey {
        debug_assert_eq!(self.arena[a].next, b, "merge needs adjacent groups");
        let merged = self.arena[a].merged(&self.arena[b]);
        self.splice(a, b, merged)
    }

    /// Folds a consecutive run of keys (in ring order) into one group.
    pub fn merge_run(&mut self, run: &[GroupKey]) -> Option<GroupKey> {
        let (&first, rest) = run.split_first()?;
        Some(rest.iter().fold(first, |acc, &k| self.merge(acc, k)))
    }

    /// Fresh ring holding only the reachable groups, rooted at the lowest envelope position.
    pub fn compact(&self) -> Ring {
        Ring::from_groups(
            self.groups().map(|g| g.detached()).collect(),
            self.n_positions,
        )
    }

    /// True if every envelope position is covered by exactly one group on the ring.
    pub fn covers_exactly_once(&self) -> bool {
        let mut seen = vec![0usize; self.n_positions];
        for g in self.groups() {
            for p in g.positions(self.n_positions) {
                seen[p] += 1;
            }
        }
        seen.iter().all(|&c| c == 1)
    }
}
