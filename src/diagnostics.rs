use std::fmt::Display;

use serde::Serialize;

/// Which side of a seed an extension grows into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Prev,
    Next,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Prev => write!(f, "prev"),
            Side::Next => write!(f, "next"),
        }
    }
}

/// Non-fatal events raised while searching. None of these stop the caller; they explain
/// why a branch or a cluster produced nothing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No sector at any combine level matched the demand prefix
    InfeasibleDemand { cluster: String, demand: f64 },
    /// Combine escalation stopped because merged spans got too wide
    OverMerge { cluster: String, demand: f64, span: f64 },
    /// Cluster skipped for being below the minimum viable area
    TooSmallDemand { cluster: String, total: f64 },
    /// A bounded walk or accumulation ran into its step cap
    IterationLimitReached { cluster: String, side: Side, cap: usize },
    /// A seed's vacant neighbours cannot hold its unmet demand
    NotExtendable { cluster: String, available: f64, needed: f64 },
    /// An extension bucket holds more items than one merge may carry
    UnmergeableBucket { cluster: String, side: Side, items: Vec<String> },
    /// Both sides of one extension consumed the same neighbour
    OverlappingBuckets { cluster: String },
    /// Too many unmet items to enumerate every partition
    PartitionOverflow { cluster: String, items: usize, cap: usize },
}

/// Caller-owned sink for search diagnostics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Diagnostics {
    pub events: Vec<Diagnostic>,
    /// Candidates pruned for overlapping an already committed footprint
    pub pruned_overlaps: usize,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push(&mut self, event: Diagnostic) {
        log::debug!("diagnostic: {:?}", event);
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events matching a predicate.
    pub fn count(&self, pred: impl Fn(&Diagnostic) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}
