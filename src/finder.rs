use std::{sync::Arc, thread};

use crossbeam::channel;
use serde::Serialize;

use crate::allocation::{AllocationEngine, Layout};
use crate::demand::{AreaCluster, DemandItem};
use crate::diagnostics::Diagnostics;
use crate::envelope::MassEnvelope;
use crate::params::Params;
use crate::partition::{fit_outer_radius, narrow_rooms, Room, RoomPartitioner};
use crate::polar_sector::{Point, PolarSector};
use crate::seed::horizontal_expand;
use crate::sector_group::Occupancy;
use crate::site::Site;

/// One building mass to place: where it stands, how big it may get, and what goes in it.
#[derive(Clone, Debug)]
pub struct MassJob {
    pub name: String,
    pub target_area: f64,
    pub center: Point,
    /// Radius of the open courtyard; 0 keeps the center solid
    pub center_radius: f64,
    pub clusters: Vec<AreaCluster>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub origin: usize,
    pub width: usize,
    pub bounds: PolarSector,
    pub occupancy: Occupancy,
}

#[derive(Clone, Debug, Serialize)]
pub struct LayoutReport {
    pub groups: Vec<GroupReport>,
    pub rooms: Vec<Room>,
    pub unplaced: Vec<DemandItem>,
    /// Rooms failing the minimum inner width
    pub narrow_rooms: Vec<String>,
    /// Groups whose rooms could not be laid out, with the reason
    pub partition_errors: Vec<(usize, String)>,
}

impl LayoutReport {
    pub fn is_usable(&self) -> bool {
        self.unplaced.is_empty() && self.narrow_rooms.is_empty() && self.partition_errors.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MassReport {
    pub name: String,
    pub envelope_area: f64,
    pub layouts: Vec<LayoutReport>,
    /// Names of clusters too small to place
    pub skipped: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Runs whole masses through envelope, allocation, widening and room partitioning.
pub struct MassFinder {
    site: Arc<Site>,
    params: Params,
}

impl MassFinder {
    pub fn new(site: Arc<Site>, params: &Params) -> MassFinder {
        MassFinder { site, params: *params }
    }

    /// Evaluates a single mass on the calling thread.
    pub fn evaluate(&self, job: &MassJob) -> MassReport {
        evaluate_job(&self.site, &self.params, job)
    }

    /// Evaluates independent masses on `n_threads` workers. Reports come back in job order.
    pub fn run(&self, jobs: Vec<MassJob>) -> Vec<MassReport> {
        let n_jobs = jobs.len();
        if n_jobs == 0 {
            return Vec::new();
        }
        let jobs = Arc::new(jobs);

        // Queue every job index up front
        let (idx_tx, idx_rx) = channel::bounded(n_jobs);
        for i in 0..n_jobs {
            if idx_tx.send(i).is_err() {
                break;
            }
        }
        drop(idx_tx);

        let (res_tx, res_rx) = channel::bounded(n_jobs);
        let n_threads = self.params.n_threads.clamp(1, n_jobs);
        log::debug!("evaluating {} masses on {} threads", n_jobs, n_threads);
        let mut handles = Vec::with_capacity(n_threads);
        for _ in 0..n_threads {
            let idx_rx = idx_rx.clone();
            let res_tx = res_tx.clone();
            let jobs = jobs.clone();
            let site = self.site.clone();
            let params = self.params;
            handles.push(thread::spawn(move || {
                while let Ok(i) = idx_rx.recv() {
                    log::trace!("evaluating mass {}", jobs[i].name);
                    let report = evaluate_job(&site, &params, &jobs[i]);
                    if res_tx.send((i, report)).is_err() {
                        log::warn!("result channel closed; dropping mass {}", jobs[i].name);
                    }
                }
            }));
        }
        drop(res_tx);

        let mut reports = vec![None; n_jobs];
        for (i, report) in res_rx.iter() {
            reports[i] = Some(report);
        }
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("mass worker panicked");
            }
        }
        reports.into_iter().flatten().collect()
    }
}

fn evaluate_job(site: &Arc<Site>, params: &Params, job: &MassJob) -> MassReport {
    let mut diag = Diagnostics::new();
    let mut envelope = MassEnvelope::generate(&job.name, job.center, job.target_area, site.clone(), params);
    if job.center_radius > 0. {
        envelope.create_center(job.center_radius);
    }

    let engine = AllocationEngine::new(&envelope, params);
    let allocation = engine.allocate(job.clusters.clone(), &mut diag);
    let partitioner = RoomPartitioner::new(params);
    let layouts = allocation
        .layouts
        .into_iter()
        .map(|layout| finish_layout(layout, &partitioner, params))
        .collect::<Vec<_>>();

    log::info!(
        "{}: {} layouts ({} usable), {} clusters skipped, {} diagnostics",
        job.name,
        layouts.len(),
        layouts.iter().filter(|l| l.is_usable()).count(),
        allocation.skipped.len(),
        diag.events.len()
    );
    MassReport {
        name: job.name.clone(),
        envelope_area: envelope.total_area(),
        layouts,
        skipped: allocation.skipped.into_iter().map(|c| c.name).collect(),
        diagnostics: diag,
    }
}

/// Widens the layout's groups, sizes each assigned group to its demand and cuts it into rooms.
fn finish_layout(layout: Layout, partitioner: &RoomPartitioner, params: &Params) -> LayoutReport {
    let Layout { mut ring, unplaced } = layout;
    horizontal_expand(&mut ring, params);
    let ring = ring.compact();

    let mut rooms = Vec::new();
    let mut partition_errors = Vec::new();
    for key in ring.assigned_keys() {
        let mut group = ring.get(key).detached();
        let result = fit_outer_radius(&mut group).and_then(|_| partitioner.partition(&group));
        match result {
            Ok(r) => rooms.extend(r),
            Err(e) => {
                log::debug!("group at {}: {}", group.origin, e);
                partition_errors.push((group.origin, e.to_string()));
            }
        }
    }
    let narrow = narrow_rooms(&rooms, params.min_room_width)
        .into_iter()
        .map(|r| r.name.clone())
        .collect();

    LayoutReport {
        groups: ring
            .groups()
            .map(|g| GroupReport {
                origin: g.origin,
                width: g.width,
                bounds: g.bounds,
                occupancy: g.occupancy().clone(),
            })
            .collect(),
        rooms,
        unplaced,
        narrow_rooms: narrow,
        partition_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEFAULT_PARAMS;
    use crate::site::Polygon;

    fn open_site() -> Arc<Site> {
        Arc::new(Site::new(Box::new(Polygon::rect(Point::new(-100., -100.), Point::new(100., 100.)))))
    }

    fn job(name: &str, clusters: Vec<AreaCluster>) -> MassJob {
        MassJob {
            name: name.to_string(),
            target_area: 400.,
            center: Point::default(),
            center_radius: 0.,
            clusters,
        }
    }

    #[test]
    fn reports_follow_job_order() {
        let params = Params { n_threads: 3, ..*DEFAULT_PARAMS };
        let finder = MassFinder::new(open_site(), &params);
        let jobs = (0..5).map(|i| job(&format!("m{i}"), Vec::new())).collect();
        let reports = finder.run(jobs);
        let names = reports.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(reports.iter().all(|r| r.envelope_area > 0.));
    }

    #[test]
    fn no_jobs_no_reports() {
        let finder = MassFinder::new(open_site(), &DEFAULT_PARAMS);
        assert!(finder.run(Vec::new()).is_empty());
    }

    #[test]
    fn tiny_clusters_are_reported_as_skipped() {
        let finder = MassFinder::new(open_site(), &DEFAULT_PARAMS);
        let tiny = AreaCluster::new("tiny", vec![DemandItem::new(5., "toilet")]);
        let report = finder.evaluate(&job("A", vec![tiny]));
        assert_eq!(report.skipped, vec!["tiny".to_string()]);
        assert!(report.layouts.is_empty());
        let line = serde_json::to_string(&report).unwrap();
        assert!(line.contains("too_small_demand"));
    }
}
