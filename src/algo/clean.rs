//! Global clean pass: stitch coincident vertices and parallel edges.
//!
//! Loaders create every triangle with its own vertices and edges. This pass
//! turns that soup into connected topology in three stages:
//!
//! 1. Sort the vertex store so proximity queries work.
//! 2. Merge every group of vertices within `epsilon` of each other.
//! 3. Merge mesh edges that now join the same two vertices, pooling their
//!    radial loops.
//!
//! # Example
//!
//! ```
//! use polykernel::algo::clean::{clean_and_merge, CleanOptions};
//! use polykernel::algo::progress::{CancellationToken, Progress};
//! use polykernel::mesh::{CreateOption, Mesh};
//! use nalgebra::Point3;
//!
//! let mut mesh: Mesh = Mesh::new();
//! let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
//! let p = |i: usize| Point3::new(square[i][0], square[i][1], 0.0);
//! mesh.create_face_from_positions(&[p(0), p(1), p(2)], CreateOption::CreateNew, 0.0).unwrap();
//! mesh.create_face_from_positions(&[p(0), p(2), p(3)], CreateOption::CreateNew, 0.0).unwrap();
//! assert_eq!(mesh.num_vertices(), 6);
//!
//! let report = clean_and_merge(
//!     &mut mesh,
//!     &CleanOptions::default(),
//!     &CancellationToken::new(),
//!     &Progress::none(),
//! )
//! .unwrap();
//! assert!(!report.cancelled);
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_mesh_edges(), 5);
//! ```

use std::time::Duration;

use tracing::debug;

use super::progress::{CancellationToken, Progress, Stages, Ticker, PROGRESS_SCALE};
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, Mesh, MeshIndex, VertexId};

/// Share of reported progress taken by sorting, vertex merging and edge merging.
pub const STAGE_WEIGHTS: [usize; 3] = [41, 23, 36];

const SORT: usize = 0;
const MERGE_VERTICES: usize = 1;
const MERGE_EDGES: usize = 2;

/// Options for [`clean_and_merge`].
#[derive(Debug, Clone)]
pub struct CleanOptions {
    /// Vertices closer than this are merged. Zero merges exact duplicates only.
    pub epsilon: f64,

    /// Minimum wall time between progress reports and cancellation checks.
    pub report_interval: Duration,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            report_interval: Duration::from_millis(200),
        }
    }
}

impl CleanOptions {
    /// Set the merge distance.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the interval between progress reports.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }
}

/// Outcome of [`clean_and_merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Vertices removed by merging into a coincident one.
    pub vertices_merged: usize,
    /// Mesh edges removed by merging into a parallel one.
    pub edges_merged: usize,
    /// Faces that collapsed below three sides while merging vertices.
    pub faces_removed: usize,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
    /// How far the pass got, out of [`PROGRESS_SCALE`].
    pub progress: usize,
}

/// Progress reporting and cancellation checks for one run.
struct Checkpoints<'a> {
    token: &'a CancellationToken,
    stages: Stages<'a>,
    ticker: Ticker,
}

impl Checkpoints<'_> {
    /// Report and check for cancellation unconditionally.
    fn force(&mut self, stage: usize, done: usize, total: usize, message: &str) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        self.stages.report(stage, done, total, message);
        false
    }

    /// Report and check for cancellation once per report interval.
    fn poll(&mut self, stage: usize, done: usize, total: usize, message: &str) -> bool {
        self.ticker.tick() && self.force(stage, done, total, message)
    }
}

/// Sort, merge coincident vertices, then merge parallel edges.
///
/// Cancellation is checked at the start of each stage and once per
/// [`CleanOptions::report_interval`] within a stage. A cancelled run returns
/// normally with [`CleanReport::cancelled`] set; every merge it committed is
/// complete and the mesh is consistent. Running the pass again finishes the job.
pub fn clean_and_merge<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    options: &CleanOptions,
    token: &CancellationToken,
    progress: &Progress,
) -> Result<CleanReport> {
    if !options.epsilon.is_finite() || options.epsilon < 0.0 {
        return Err(MeshError::invalid_param(
            "epsilon",
            options.epsilon,
            "must be finite and non-negative",
        ));
    }

    let faces_before = mesh.num_faces();
    let mut report = CleanReport::default();
    let mut checks = Checkpoints {
        token,
        stages: Stages::new(progress, &STAGE_WEIGHTS),
        ticker: Ticker::new(options.report_interval),
    };
    let stop = |mut report: CleanReport, mesh: &Mesh<I>, at: usize| {
        report.cancelled = true;
        report.progress = at;
        report.faces_removed = faces_before - mesh.num_faces();
        debug!(progress = at, "clean and merge cancelled");
        report
    };

    // Stage 1: sort
    if checks.force(SORT, 0, 1, "Sorting vertices") {
        return Ok(stop(report, mesh, 0));
    }
    mesh.sort_vertices();

    // Stage 2: merge vertices. Groups are found against the untouched store,
    // then merged with store removals batched into one compaction.
    let vertices: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    let total = vertices.len() * 2;
    if checks.force(MERGE_VERTICES, 0, total, "Merging vertices") {
        let at = checks.stages.position(MERGE_VERTICES, 0, total);
        return Ok(stop(report, mesh, at));
    }
    let mut claimed = vec![false; mesh.vertices.slot_count()];
    let mut pairs: Vec<(VertexId<I>, VertexId<I>)> = Vec::new();
    for (i, &v) in vertices.iter().enumerate() {
        if checks.poll(MERGE_VERTICES, i, total, "Finding coincident vertices") {
            let at = checks.stages.position(MERGE_VERTICES, i, total);
            return Ok(stop(report, mesh, at));
        }
        if claimed[v.index()] {
            continue;
        }
        let position = *mesh.position(v);
        for other in mesh.find_vertices(&position, options.epsilon)? {
            if other != v && !claimed[other.index()] {
                claimed[other.index()] = true;
                pairs.push((v, other));
            }
        }
    }

    let done = vertices.len();
    mesh.defer_vertex_removals();
    let merged = merge_vertex_pairs(mesh, &pairs, &mut checks, done, total);
    mesh.flush_vertex_removals();
    let (count, cancelled_at) = merged?;
    report.vertices_merged = count;
    if let Some(at) = cancelled_at {
        return Ok(stop(report, mesh, at));
    }

    // Stage 3: merge edges
    let edges: Vec<EdgeId<I>> = mesh.mesh_edge_ids().collect();
    let total = edges.len();
    if checks.force(MERGE_EDGES, 0, total, "Merging mesh edges") {
        let at = checks.stages.position(MERGE_EDGES, 0, total);
        return Ok(stop(report, mesh, at));
    }
    for (i, e) in edges.into_iter().enumerate() {
        if checks.poll(MERGE_EDGES, i, total, "Merging mesh edges") {
            let at = checks.stages.position(MERGE_EDGES, i, total);
            return Ok(stop(report, mesh, at));
        }
        if !mesh.contains_mesh_edge(e) {
            continue;
        }
        let [a, b] = mesh.mesh_edge(e).vertices();
        for other in mesh.find_mesh_edges(a, b) {
            if other != e {
                mesh.merge_mesh_edges(e, other)?;
                report.edges_merged += 1;
            }
        }
    }

    checks.stages.report(MERGE_EDGES, total, total, "Done");
    report.progress = PROGRESS_SCALE;
    report.faces_removed = faces_before - mesh.num_faces();
    debug!(
        vertices_merged = report.vertices_merged,
        edges_merged = report.edges_merged,
        faces_removed = report.faces_removed,
        "clean and merge finished"
    );
    Ok(report)
}

/// Merge each `(keep, discard)` pair, returning the number merged and the
/// progress position if the run was cancelled part way.
fn merge_vertex_pairs<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    pairs: &[(VertexId<I>, VertexId<I>)],
    checks: &mut Checkpoints<'_>,
    done: usize,
    total: usize,
) -> Result<(usize, Option<usize>)> {
    for (i, &(keep, discard)) in pairs.iter().enumerate() {
        let step = done + i * (total - done) / pairs.len();
        if checks.poll(MERGE_VERTICES, step, total, "Merging vertices") {
            return Ok((i, Some(checks.stages.position(MERGE_VERTICES, step, total))));
        }
        mesh.merge_vertices(keep, discard)?;
    }
    Ok((pairs.len(), None))
}

impl<I: MeshIndex> Mesh<I> {
    /// Run [`clean_and_merge`] with the given merge distance.
    pub fn clean_and_merge(
        &mut self,
        token: &CancellationToken,
        epsilon: f64,
        progress: &Progress,
    ) -> Result<CleanReport> {
        clean_and_merge(
            self,
            &CleanOptions::default().with_epsilon(epsilon),
            token,
            progress,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, Counts};
    use nalgebra::{Point3, Vector3};
    use std::sync::{Arc, Mutex};

    fn run(mesh: &mut Mesh, epsilon: f64) -> CleanReport {
        mesh.clean_and_merge(&CancellationToken::new(), epsilon, &Progress::none())
            .unwrap()
    }

    #[test]
    fn test_cube_soup() {
        let mut mesh = test_fixtures::cube_soup();
        assert_eq!(mesh.num_vertices(), 24);
        assert_eq!(mesh.num_mesh_edges(), 24);

        let report = run(&mut mesh, 0.0);
        mesh.validate().unwrap();
        assert!(mesh.non_manifold_edges().is_empty());
        assert_eq!(mesh.num_faces(), 6);
        assert_eq!(mesh.num_mesh_edges(), 12);
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(report.vertices_merged, 16);
        assert_eq!(report.edges_merged, 12);
        assert_eq!(report.faces_removed, 0);
        assert_eq!(report.progress, PROGRESS_SCALE);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_grid_soup_stitches() {
        let n = 40;
        let mut mesh = test_fixtures::grid_soup(n);
        assert_eq!(mesh.num_vertices(), n * n * 6);

        let report = run(&mut mesh, 0.0);
        mesh.validate().unwrap();
        assert_eq!(mesh.num_vertices(), (n + 1) * (n + 1));
        assert_eq!(mesh.num_mesh_edges(), 3 * n * n + 2 * n);
        assert_eq!(mesh.num_faces(), 2 * n * n);
        assert_eq!(report.vertices_merged, n * n * 6 - (n + 1) * (n + 1));
        // Only the outer boundary stays open
        assert_eq!(mesh.non_manifold_edges().len(), 4 * n);
    }

    #[test]
    fn test_cancel_while_merging_vertices() {
        let mut mesh = test_fixtures::grid_soup(6);
        let token = CancellationToken::new();
        let trip = token.clone();
        let no_progress = Progress::none();
        let stages = Stages::new(&no_progress, &STAGE_WEIGHTS);
        let halfway = (stages.position(MERGE_VERTICES, 0, 1) + stages.position(MERGE_EDGES, 0, 1)) / 2;
        let progress = Progress::new(move |current, _, _| {
            if current > halfway {
                trip.cancel();
            }
        });
        let options = CleanOptions::default().with_report_interval(Duration::ZERO);

        let report = clean_and_merge(&mut mesh, &options, &token, &progress).unwrap();
        assert!(report.cancelled);
        assert!(report.vertices_merged > 0);
        assert_eq!(mesh.num_vertices(), 6 * 6 * 6 - report.vertices_merged);
        mesh.validate().unwrap();

        let report = run(&mut mesh, 0.0);
        assert!(!report.cancelled);
        assert_eq!(mesh.num_vertices(), 7 * 7);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_idempotent() {
        let mut mesh = test_fixtures::cube_soup();
        run(&mut mesh, 0.0);
        let once = Counts::of(&mesh);
        let report = run(&mut mesh, 0.0);
        assert_eq!(Counts::of(&mesh), once);
        assert_eq!((report.vertices_merged, report.edges_merged), (0, 0));
        mesh.validate().unwrap();
    }

    #[test]
    fn test_triangle_pair_shares_one_edge() {
        let mut mesh = test_fixtures::triangle_pair_soup();
        assert_eq!(mesh.num_vertices(), 6);
        run(&mut mesh, 0.0);
        mesh.validate().unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        let shared: Vec<_> = mesh
            .mesh_edge_ids()
            .filter(|&e| mesh.edge_face_count(e) > 1)
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(mesh.radial_face_edges(shared[0]).count(), 2);
    }

    #[test]
    fn test_epsilon_merges_near_vertices() {
        let mut mesh = test_fixtures::cube_soup();
        let ids: Vec<_> = mesh.vertex_ids().collect();
        for (i, v) in ids.into_iter().enumerate() {
            let jitter = Vector3::new(1.0, -1.0, 0.5) * (1e-7 * (i % 5) as f64);
            let p = mesh.position(v) + jitter;
            mesh.vertices[v.index()].position = p;
        }

        let mut exact = mesh.clone();
        run(&mut exact, 0.0);
        assert!(exact.num_vertices() > 8);
        exact.validate().unwrap();

        run(&mut mesh, 1e-5);
        mesh.validate().unwrap();
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_mesh_edges(), 12);
        assert!(mesh.is_manifold());
    }

    #[test]
    fn test_epsilon_collapses_sliver_faces() {
        let mut mesh: Mesh = Mesh::new();
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        mesh.create_face_from_positions(&tri, crate::mesh::CreateOption::CreateNew, 0.0)
            .unwrap();
        let sliver = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1e-4, 0.0),
        ];
        mesh.create_face_from_positions(&sliver, crate::mesh::CreateOption::CreateNew, 0.0)
            .unwrap();

        let report = mesh
            .clean_and_merge(&CancellationToken::new(), 0.6, &Progress::none())
            .unwrap();
        mesh.validate().unwrap();
        assert!(report.faces_removed >= 1);
        assert!(report.vertices_merged >= 3);
    }

    #[test]
    fn test_rejects_bad_epsilon() {
        let mut mesh = test_fixtures::cube_soup();
        for epsilon in [-1.0, f64::NAN, f64::INFINITY] {
            let result = mesh.clean_and_merge(&CancellationToken::new(), epsilon, &Progress::none());
            assert!(matches!(result, Err(MeshError::InvalidParameter { name: "epsilon", .. })));
        }
        assert_eq!(mesh.num_vertices(), 24);
    }

    #[test]
    fn test_cancelled_before_start_changes_nothing() {
        let mut mesh = test_fixtures::cube_soup();
        let before = Counts::of(&mesh);
        let token = CancellationToken::new();
        token.cancel();

        let report = mesh.clean_and_merge(&token, 0.0, &Progress::none()).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.progress, 0);
        assert_eq!(Counts::of(&mesh), before);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_cancel_between_stages_leaves_consistent_mesh() {
        let mut mesh = test_fixtures::cube_soup();
        let token = CancellationToken::new();
        let trip = token.clone();
        let edge_stage = Stages::new(&Progress::none(), &STAGE_WEIGHTS).position(MERGE_EDGES, 0, 1);
        let progress = Progress::new(move |current, _, _| {
            if current >= edge_stage {
                trip.cancel();
            }
        });
        let options = CleanOptions::default().with_report_interval(Duration::ZERO);

        let report = clean_and_merge(&mut mesh, &options, &token, &progress).unwrap();
        mesh.validate().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.vertices_merged, 16);
        assert_eq!(report.edges_merged, 0);
        assert_eq!(report.progress, edge_stage);
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_mesh_edges(), 24);

        // A second run completes the job
        let report = run(&mut mesh, 0.0);
        assert_eq!(report.edges_merged, 12);
        assert!(mesh.is_manifold());
        mesh.validate().unwrap();
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |current, total, _| {
            sink.lock().unwrap().push((current, total));
        });
        let options = CleanOptions::default().with_report_interval(Duration::ZERO);
        let mut mesh = test_fixtures::cube_soup();
        clean_and_merge(&mut mesh, &options, &CancellationToken::new(), &progress).unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.len() > 3);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(seen.iter().all(|&(_, total)| total == PROGRESS_SCALE));
        assert_eq!(seen.last().map(|s| s.0), Some(PROGRESS_SCALE));
    }
}
