//! Composite index racing the concrete backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::metric::Metric;
use crate::scalar::Scalar;
use crate::{KnnError, Neighbor, Result};

use super::grid::GridIndex;
use super::kdtree::KdTree;
use super::linear::LinearIndex;
use super::{check_query, check_shape, IndexOptions, SpatialIndex};

/// `(input slot, distance)` pairs produced by one backend.
type RawHits = Vec<(usize, f64)>;

/// Completion log shared between a query and its backend threads. Threads
/// append in finish order and signal; the query thread waits on the signal.
#[derive(Default)]
struct RaceBoard {
    finished: Mutex<Vec<(&'static str, Result<RawHits>)>>,
    ready: Condvar,
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Nearest,
    NearestK(usize),
    Radius { radius: f64, cap: Option<usize> },
}

/// Runs the k-d tree and grid backends (plus, optionally, the linear scan)
/// concurrently on every query, one OS thread per backend.
///
/// The two main backends have very different cost profiles — the grid wins
/// on dense uniform low-d data and loses badly on skewed or high-d data —
/// so racing them bounds worst-case latency at the cost of extra work.
///
/// For nearest-1 the first backend to complete wins; laggards run to
/// completion detached and their results are dropped. k-NN and radius
/// queries wait for every backend and merge the outputs in completion
/// order, keeping the first occurrence of each stored entry. A failing
/// backend is ignored as long as any backend succeeds.
///
/// With the cosine metric the grid backend is simply omitted (it has no
/// shell enumerator for it).
#[derive(Debug)]
pub struct Ensemble<T: Scalar, P> {
    dims: usize,
    metric: Metric,
    points: Vec<Box<[T]>>,
    payloads: Vec<P>,
    kd: Arc<KdTree<T, usize>>,
    grid: Option<Arc<GridIndex<T, usize>>>,
    linear: Option<Arc<LinearIndex<T, usize>>>,
}

impl<T: Scalar, P> Ensemble<T, P> {
    /// Build every enabled backend over the same input. Each backend is
    /// keyed by input slot so merged results can be deduplicated exactly
    /// and rehydrated from one canonical copy of the data.
    pub fn build(
        points: Vec<Vec<T>>,
        payloads: Vec<P>,
        options: IndexOptions<T>,
    ) -> Result<Self> {
        let dims = check_shape(&points, payloads.len())?;
        let slots: Vec<usize> = (0..points.len()).collect();

        let kd = Arc::new(KdTree::build(points.clone(), slots.clone(), options.clone())?);
        let grid = if options.metric.grid_compatible() {
            Some(Arc::new(GridIndex::build(
                points.clone(),
                slots.clone(),
                options.clone(),
            )?))
        } else {
            None
        };
        let linear = if options.ensemble_linear {
            Some(Arc::new(LinearIndex::build(
                points.clone(),
                slots,
                options.clone(),
            )?))
        } else {
            None
        };

        Ok(Self {
            dims,
            metric: options.metric,
            points: points.into_iter().map(Vec::into_boxed_slice).collect(),
            payloads,
            kd,
            grid,
            linear,
        })
    }

    /// Which backends a query will race.
    pub fn backend_names(&self) -> Vec<&'static str> {
        let mut names = vec!["kdtree"];
        if self.grid.is_some() {
            names.push("grid");
        }
        if self.linear.is_some() {
            names.push("linear");
        }
        names
    }

    fn neighbor(&self, slot: usize, distance: f64) -> Neighbor<'_, T, P> {
        Neighbor {
            point: &self.points[slot],
            payload: &self.payloads[slot],
            distance,
        }
    }

    fn launch(&self, query: &[T], job: Job) -> (Arc<RaceBoard>, usize) {
        let board = Arc::new(RaceBoard::default());
        let mut spawned = 0;

        spawn_backend(
            Arc::clone(&self.kd),
            "kdtree",
            query.to_vec(),
            job,
            Arc::clone(&board),
        );
        spawned += 1;
        if let Some(grid) = &self.grid {
            spawn_backend(Arc::clone(grid), "grid", query.to_vec(), job, Arc::clone(&board));
            spawned += 1;
        }
        if let Some(linear) = &self.linear {
            spawn_backend(
                Arc::clone(linear),
                "linear",
                query.to_vec(),
                job,
                Arc::clone(&board),
            );
            spawned += 1;
        }
        (board, spawned)
    }

    /// Wait for every backend, then concatenate their outputs in completion
    /// order, keeping the first occurrence of each stored entry.
    fn merged(&self, query: &[T], job: Job, cap: Option<usize>) -> Result<Vec<Neighbor<'_, T, P>>> {
        let (board, spawned) = self.launch(query, job);
        let mut finished = board.finished.lock();
        while finished.len() < spawned {
            board.ready.wait(&mut finished);
        }

        let mut seen = HashSet::new();
        let mut merged: RawHits = Vec::new();
        let mut first_err = None;
        let mut any_ok = false;
        for (_, outcome) in finished.iter() {
            match outcome {
                Ok(hits) => {
                    any_ok = true;
                    for &(slot, distance) in hits {
                        if seen.insert(slot) {
                            merged.push((slot, distance));
                        }
                    }
                }
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err.clone());
                    }
                }
            }
        }
        drop(finished);

        if !any_ok {
            return Err(first_err.unwrap_or(KnnError::EmptyInput));
        }
        if let Some(cap) = cap {
            merged.truncate(cap);
        }
        Ok(merged
            .into_iter()
            .map(|(slot, distance)| self.neighbor(slot, distance))
            .collect())
    }
}

fn spawn_backend<T, I>(
    index: Arc<I>,
    label: &'static str,
    query: Vec<T>,
    job: Job,
    board: Arc<RaceBoard>,
) where
    T: Scalar,
    I: SpatialIndex<T, usize> + Send + Sync + 'static,
{
    thread::spawn(move || {
        let hits = match job {
            Job::Nearest => index
                .nearest(&query)
                .map(|n| vec![(*n.payload, n.distance)]),
            Job::NearestK(k) => index
                .nearest_k(&query, k)
                .map(|ns| ns.iter().map(|n| (*n.payload, n.distance)).collect()),
            Job::Radius { radius, cap } => index
                .within_radius(&query, radius, cap)
                .map(|ns| ns.iter().map(|n| (*n.payload, n.distance)).collect()),
        };
        trace!(backend = label, ok = hits.is_ok(), "ensemble backend finished");
        let mut finished = board.finished.lock();
        finished.push((label, hits));
        board.ready.notify_all();
    });
}

impl<T: Scalar, P> SpatialIndex<T, P> for Ensemble<T, P> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [T], &'a P)> + 'a> {
        Box::new(
            self.points
                .iter()
                .map(|p| &p[..])
                .zip(self.payloads.iter()),
        )
    }

    /// First successful completion wins; the rest are ignored.
    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>> {
        check_query(self.dims, query)?;
        let (board, spawned) = self.launch(query, Job::Nearest);
        let mut finished = board.finished.lock();
        loop {
            if let Some(hits) = finished.iter().find_map(|(_, r)| r.as_ref().ok()) {
                let &(slot, distance) = hits.first().ok_or(KnnError::EmptyInput)?;
                return Ok(self.neighbor(slot, distance));
            }
            if finished.len() == spawned {
                let err = finished
                    .iter()
                    .find_map(|(_, r)| r.as_ref().err().cloned());
                return Err(err.unwrap_or(KnnError::EmptyInput));
            }
            board.ready.wait(&mut finished);
        }
    }

    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        let cap = if k == 0 || k >= self.points.len() {
            None
        } else {
            Some(k)
        };
        self.merged(query, Job::NearestK(k), cap)
    }

    fn within_radius(
        &self,
        query: &[T],
        radius: f64,
        k: Option<usize>,
    ) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        if radius < 0.0 {
            return Ok(Vec::new());
        }
        let cap = match k {
            Some(k) if k > 0 && k < self.points.len() => Some(k),
            _ => None,
        };
        self.merged(query, Job::Radius { radius, cap: k }, cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wikipedia_ensemble(metric: Metric, with_linear: bool) -> Ensemble<f64, &'static str> {
        let points = vec![
            vec![7.0, 2.0],
            vec![5.0, 4.0],
            vec![2.0, 3.0],
            vec![4.0, 7.0],
            vec![9.0, 6.0],
            vec![8.0, 1.0],
        ];
        let payloads = vec!["A", "B", "C", "D", "E", "F"];
        let options = IndexOptions {
            metric,
            dimension_min: None,
            dimension_max: None,
            ensemble_linear: with_linear,
        };
        Ensemble::build(points, payloads, options).unwrap()
    }

    #[test]
    fn races_all_backends() {
        let ensemble = wikipedia_ensemble(Metric::Euclidean, true);
        assert_eq!(ensemble.backend_names(), vec!["kdtree", "grid", "linear"]);

        let hit = ensemble.nearest(&[9.0, 2.0]).unwrap();
        assert_eq!(*hit.payload, "F");
        assert_eq!(hit.distance, 2.0);
    }

    #[test]
    fn nearest_k_merges_without_duplicates() {
        let ensemble = wikipedia_ensemble(Metric::Euclidean, true);
        let hits = ensemble.nearest_k(&[9.0, 2.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        let got: Vec<_> = hits.iter().map(|n| (*n.payload, n.distance)).collect();
        assert_eq!(got, vec![("F", 2.0), ("A", 4.0), ("E", 16.0)]);
    }

    #[test]
    fn radius_results_are_each_entry_once() {
        let ensemble = wikipedia_ensemble(Metric::Euclidean, true);
        let hits = ensemble.within_radius(&[5.0, 5.0], 4.0, None).unwrap();
        assert_eq!(hits.len(), 4);
        let mut got: Vec<_> = hits.iter().map(|n| *n.payload).collect();
        got.sort();
        assert_eq!(got, vec!["A", "B", "C", "D"]);
        // The leading backend's output is sorted; appended stragglers can
        // only be entries it missed, of which an exact race has none.
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn cosine_skips_the_grid_backend() {
        let ensemble = wikipedia_ensemble(Metric::Cosine, false);
        assert_eq!(ensemble.backend_names(), vec!["kdtree"]);
        let hit = ensemble.nearest(&[8.0, 1.0]).unwrap();
        assert_eq!(*hit.payload, "F");
        assert!(hit.distance.abs() < 1e-12);
    }

    #[test]
    fn duplicate_points_are_distinct_entries() {
        let points = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![4.0, 4.0]];
        let payloads = vec!["X", "Y", "Z"];
        let ensemble = Ensemble::build(
            points,
            payloads,
            IndexOptions::with_metric(Metric::Euclidean),
        )
        .unwrap();

        let hits = ensemble.nearest_k(&[1.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|n| n.distance == 0.0));
        let mut got: Vec<_> = hits.iter().map(|n| *n.payload).collect();
        got.sort();
        assert_eq!(got, vec!["X", "Y"]);
    }

    #[test]
    fn degenerate_k_returns_everything() {
        let ensemble = wikipedia_ensemble(Metric::Euclidean, false);
        assert_eq!(ensemble.nearest_k(&[0.0, 0.0], 0).unwrap().len(), 6);
        assert_eq!(ensemble.nearest_k(&[0.0, 0.0], 50).unwrap().len(), 6);
    }

    #[test]
    fn repeated_queries_are_identical() {
        // Tie-free query: with distinct distances every backend returns the
        // same sequence, so the merge is independent of completion order.
        let ensemble = wikipedia_ensemble(Metric::Manhattan, true);
        let first: Vec<_> = ensemble
            .nearest_k(&[6.1, 3.2], 4)
            .unwrap()
            .iter()
            .map(|n| (*n.payload, n.distance))
            .collect();
        for _ in 0..8 {
            let again: Vec<_> = ensemble
                .nearest_k(&[6.1, 3.2], 4)
                .unwrap()
                .iter()
                .map(|n| (*n.payload, n.distance))
                .collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn query_dimension_mismatch() {
        let ensemble = wikipedia_ensemble(Metric::Euclidean, false);
        assert!(ensemble.nearest(&[1.0]).is_err());
        assert!(ensemble.nearest_k(&[1.0], 2).is_err());
        assert!(ensemble.within_radius(&[1.0], 1.0, None).is_err());
    }
}
