use std::f64::consts::PI;
use std::fmt::Display;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
  pub static ref DEFAULT_PARAMS: Params = Params {
    // Radial vectors per full turn
    division_count: 12,
    // Ray marching from the center
    min_ray_radius: 3.,
    ray_steps: 30,
    // Longest ray may exceed the runner-up by this much before it is clamped
    outlier_gap: 3.,

    // Envelope shrink
    shrink_ratio: 1.6,
    shrink_step: 0.5,
    shrink_floor: 7.,
    shrink_margin: 4.,

    // First-position search
    prefix_cap: 230.,
    large_demand: 200.,
    lower_match_ratio: 0.85,
    upper_match_ratio: 1.6,
    over_merge_span: PI * 1.2,
    too_small_area: 20.,
    overlap_tolerance: 0.2,

    // Seed growth
    walk_cap: 100,
    accumulate_cap: 100,
    max_bucket_items: 3,
    min_growth_depth: 3.,
    partition_item_cap: 20,

    // Post-processing
    shape_ratio: 0.8,
    expand_attempts: 10,

    // Room partitioning
    simple_room_max_area: 100.,
    angle_quantum: PI / 36.,
    corridor_angle: PI / 9.,
    min_room_width: 1.5,

    // Default to system physical cores; each mass runs on one worker
    n_threads: num_cpus::get_physical(),
  };
}

/// Tunables for envelope generation, allocation and room partitioning.
///
/// Every field has a default taken from `DEFAULT_PARAMS`, so a partial JSON
/// document deserializes into a complete parameter set.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of angular divisions of the full turn
    pub division_count: usize,
    /// Radius the ray marching starts from
    pub min_ray_radius: f64,
    /// Unit radius increments tried per sector
    pub ray_steps: usize,
    /// Gap above which the longest sector is clamped to the second longest
    pub outlier_gap: f64,

    /// Shrink while envelope area exceeds target * shrink_ratio
    pub shrink_ratio: f64,
    pub shrink_step: f64,
    /// Sectors at or below this outer radius are never shrunk
    pub shrink_floor: f64,
    /// Only sectors longer than (min radius + margin) take part in shrinking
    pub shrink_margin: f64,

    /// Stop growing demand prefixes once their sum exceeds this
    pub prefix_cap: f64,
    /// Demands above this may only match sectors no larger than themselves
    pub large_demand: f64,
    pub lower_match_ratio: f64,
    pub upper_match_ratio: f64,
    /// Merged spans wider than this (radians) abort the combine escalation
    pub over_merge_span: f64,
    /// Clusters whose demand sums below this are skipped
    pub too_small_area: f64,
    /// Angular overlap (radians) tolerated between two footprints
    pub overlap_tolerance: f64,

    /// Step cap for neighbour discovery walks
    pub walk_cap: usize,
    /// Step cap for greedy neighbour accumulation
    pub accumulate_cap: usize,
    /// Largest bucket an extension may merge and assign
    pub max_bucket_items: usize,
    /// Vacant groups shallower than this are blocked before growth
    pub min_growth_depth: f64,
    /// Seeds with more unmet items than this are not partitioned
    pub partition_item_cap: usize,

    /// Minimum chord/depth ratio for a usable wedge
    pub shape_ratio: f64,
    /// Alternating neighbour absorptions tried by horizontal expansion
    pub expand_attempts: usize,

    /// Groups whose items all fit under this use the simple layout
    pub simple_room_max_area: f64,
    /// Slice angles are floored to a multiple of this
    pub angle_quantum: f64,
    /// Entrance wedge angle of a room-in-room layout
    pub corridor_angle: f64,
    /// Minimum inner width of rooms that require one
    pub min_room_width: f64,

    /// Number of worker threads for batch runs
    pub n_threads: usize,
}

impl Default for Params {
    fn default() -> Self {
        *DEFAULT_PARAMS
    }
}

impl Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "===== Radial Allocation Parameters =====")?;
        writeln!(f, "\t - division_count (angular divisions): {}", self.division_count)?;
        writeln!(
            f,
            "\t - ray (start radius, steps): {}, {}",
            self.min_ray_radius, self.ray_steps
        )?;
        writeln!(f, "\t - outlier_gap (spike clamp gap): {}", self.outlier_gap)?;
        writeln!(
            f,
            "\t - shrink (ratio, step, floor, margin): {}, {}, {}, {}",
            self.shrink_ratio, self.shrink_step, self.shrink_floor, self.shrink_margin
        )?;
        writeln!(
            f,
            "\t - prefix_cap (max first-position demand): {}",
            self.prefix_cap
        )?;
        writeln!(
            f,
            "\t - match ratios (lower, upper, large demand): {}, {}, {}",
            self.lower_match_ratio, self.upper_match_ratio, self.large_demand
        )?;
        writeln!(
            f,
            "\t - over_merge_span (max merged angle): {:.3}",
            self.over_merge_span
        )?;
        writeln!(f, "\t - too_small_area (skip threshold): {}", self.too_small_area)?;
        writeln!(
            f,
            "\t - overlap_tolerance (radians): {}",
            self.overlap_tolerance
        )?;
        writeln!(
            f,
            "\t - caps (walk, accumulate, bucket items, partition items): {}, {}, {}, {}",
            self.walk_cap, self.accumulate_cap, self.max_bucket_items, self.partition_item_cap
        )?;
        writeln!(
            f,
            "\t - min_growth_depth (blocked below): {}",
            self.min_growth_depth
        )?;
        writeln!(
            f,
            "\t - horizontal expand (shape ratio, attempts): {}, {}",
            self.shape_ratio, self.expand_attempts
        )?;
        writeln!(
            f,
            "\t - rooms (simple max, quantum, corridor, min width): {}, {:.4}, {:.4}, {}",
            self.simple_room_max_area, self.angle_quantum, self.corridor_angle, self.min_room_width
        )?;
        writeln!(f, "\t - n_threads (n threads to use): {}", self.n_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let params: Params = serde_json::from_str(r#"{"division_count": 16}"#).unwrap();
        assert_eq!(params.division_count, 16);
        assert_eq!(params.walk_cap, DEFAULT_PARAMS.walk_cap);
        assert_eq!(params.prefix_cap, 230.);
    }

    #[test]
    fn display_lists_every_group() {
        let dump = DEFAULT_PARAMS.to_string();
        assert!(dump.contains("division_count"));
        assert!(dump.contains("n_threads"));
    }
}
