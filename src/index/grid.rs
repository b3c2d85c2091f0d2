//! Uniform voxel grid index.

use tracing::debug;

use crate::bounded::BoundedPriorityList;
use crate::metric::Metric;
use crate::scalar::Scalar;
use crate::{KnnError, Neighbor, Result};

use super::{check_query, check_shape, rank_all, IndexOptions, SpatialIndex};

/// Hard cap on the bucket table size.
const MAX_CELLS: usize = 1_000_000;

/// A uniform d-dimensional grid over the data's bounding box.
///
/// Build quantizes each point into a cubic cell chosen so the grid holds
/// roughly `min(N, 10⁶)` cells; each cell's bucket lists the indices of the
/// points inside it. Queries scan buckets outward from the query's home
/// cell in concentric shells matched to the metric (diamonds for L1,
/// squares for L∞, integer-radius spheres for L2) and stop once no
/// unvisited shell can beat the current candidates.
///
/// Cosine distance has no shell enumerator and is rejected at build.
#[derive(Debug)]
pub struct GridIndex<T, P> {
    dims: usize,
    metric: Metric,
    points: Vec<Box<[T]>>,
    payloads: Vec<P>,
    minima: Vec<f64>,
    side_length: f64,
    inv_side: f64,
    cells_per_axis: Vec<usize>,
    axis_multipliers: Vec<usize>,
    buckets: Vec<Vec<u32>>,
}

impl<T: Scalar, P> GridIndex<T, P> {
    /// Build the grid in two passes: bounding box, then bucket fill. O(N).
    pub fn build(
        points: Vec<Vec<T>>,
        payloads: Vec<P>,
        options: IndexOptions<T>,
    ) -> Result<Self> {
        let dims = check_shape(&points, payloads.len())?;
        if !options.metric.grid_compatible() {
            return Err(KnnError::GridUnsupportedMetric(options.metric));
        }
        let n = points.len();

        let mut minima = vec![f64::INFINITY; dims];
        let mut maxima = vec![f64::NEG_INFINITY; dims];
        for point in &points {
            for i in 0..dims {
                let v = point[i].as_f64();
                if v < minima[i] {
                    minima[i] = v;
                }
                if v > maxima[i] {
                    maxima[i] = v;
                }
            }
        }

        let extents: Vec<f64> = (0..dims).map(|i| maxima[i] - minima[i]).collect();
        let target = n.min(MAX_CELLS);

        // Cubic cell volume aiming at ~target cells, over the non-degenerate
        // axes only (a zero-extent axis always quantizes to one cell).
        let mut volume = 1.0;
        let mut live_axes = 0u32;
        for &e in &extents {
            if e > 0.0 {
                volume *= e;
                live_axes += 1;
            }
        }
        let mut side = if live_axes == 0 {
            1.0
        } else {
            (volume / target as f64).powf(1.0 / f64::from(live_axes))
        };
        if !side.is_finite() || side <= 0.0 {
            side = 1.0;
        }

        // Per-axis quantization adds one cell per axis, which can push the
        // table past the cap; widen the cell until the product fits.
        let (cells_per_axis, table_len) = loop {
            let inv = 1.0 / side;
            let cells: Vec<usize> = extents
                .iter()
                .map(|&e| 1 + (e * inv).floor() as usize)
                .collect();
            let mut product = 1u128;
            for &c in &cells {
                product = product.saturating_mul(c as u128);
            }
            if product <= MAX_CELLS as u128 {
                break (cells, product as usize);
            }
            let factor = (product as f64 / MAX_CELLS as f64).powf(1.0 / dims as f64);
            side *= if factor.is_finite() && factor > 1.0 {
                factor * 1.001
            } else {
                2.0
            };
        };

        let mut axis_multipliers = vec![0usize; dims];
        let mut stride = 1;
        for i in 0..dims {
            axis_multipliers[i] = stride;
            stride *= cells_per_axis[i];
        }

        let inv_side = 1.0 / side;
        let mut grid = Self {
            dims,
            metric: options.metric,
            points: points.into_iter().map(Vec::into_boxed_slice).collect(),
            payloads,
            minima,
            side_length: side,
            inv_side,
            cells_per_axis,
            axis_multipliers,
            buckets: vec![Vec::new(); table_len],
        };

        for i in 0..grid.points.len() {
            let bucket = grid.bucket_of(&grid.points[i]);
            grid.buckets[bucket].push(i as u32);
        }

        debug!(
            n,
            dims,
            cells = table_len,
            side = grid.side_length,
            metric = %grid.metric,
            "built grid index"
        );
        Ok(grid)
    }

    /// Side length of a grid cell.
    pub fn side_length(&self) -> f64 {
        self.side_length
    }

    /// Cells along each axis; the bucket table is their product.
    pub fn cells_per_axis(&self) -> &[usize] {
        &self.cells_per_axis
    }

    /// Per-axis cell coordinate of a point, clamped into the grid (queries
    /// may fall outside the data's bounding box).
    fn cell_coords(&self, point: &[T]) -> Vec<i64> {
        (0..self.dims)
            .map(|i| {
                let step = ((point[i].as_f64() - self.minima[i]) * self.inv_side).floor();
                let cap = (self.cells_per_axis[i] - 1) as f64;
                step.clamp(0.0, cap) as i64
            })
            .collect()
    }

    fn bucket_of(&self, point: &[T]) -> usize {
        let coords = self.cell_coords(point);
        coords
            .iter()
            .zip(&self.axis_multipliers)
            .map(|(&c, &m)| c as usize * m)
            .sum()
    }

    /// The largest shell index the grid can contain under this metric.
    fn max_layer(&self) -> usize {
        let spans = self.cells_per_axis.iter().map(|&c| c - 1);
        match self.metric {
            Metric::Manhattan => spans.sum(),
            Metric::Chebyshev => spans.max().unwrap_or(0),
            Metric::Euclidean => spans.map(|s| s * s).sum(),
            Metric::Cosine => 0,
        }
    }

    /// Shell index beyond which no point can lie within `radius`
    /// (un-squared) of the query. Conservative for every dimensionality:
    /// cell offsets differ from true coordinate offsets by at most one cell
    /// per axis.
    fn layer_cap(&self, radius: f64) -> usize {
        let steps = radius * self.inv_side;
        if !steps.is_finite() {
            return usize::MAX;
        }
        match self.metric {
            Metric::Manhattan => (steps.ceil() as usize).saturating_add(self.dims),
            Metric::Chebyshev => (steps.floor() as usize).saturating_add(1),
            Metric::Euclidean => {
                let cells = steps + (self.dims as f64).sqrt();
                (cells * cells).ceil() as usize
            }
            Metric::Cosine => usize::MAX,
        }
    }

    fn consider(&self, index: u32, query: &[T], limit: f64, list: &mut BoundedPriorityList<u32>) {
        let distance = self.metric.distance(&self.points[index as usize], query);
        if distance <= limit {
            list.add(index, distance);
        }
    }

    /// Visit every bucket whose cell sits on `layer` around `home`.
    fn visit_layer(
        &self,
        layer: usize,
        home: &[i64],
        query: &[T],
        limit: f64,
        list: &mut BoundedPriorityList<u32>,
    ) {
        let mut offset = vec![0i64; self.dims];
        let mut visit = |offset: &[i64]| {
            let mut bucket = 0usize;
            for i in 0..self.dims {
                let c = home[i] + offset[i];
                if c < 0 || c >= self.cells_per_axis[i] as i64 {
                    return;
                }
                bucket += c as usize * self.axis_multipliers[i];
            }
            for &index in &self.buckets[bucket] {
                self.consider(index, query, limit, list);
            }
        };
        match self.metric {
            Metric::Manhattan => {
                diamond_shell(layer as i64, 0, &mut offset, &mut visit);
            }
            Metric::Chebyshev => {
                square_shell(layer as i64, 0, false, &mut offset, &mut visit);
            }
            Metric::Euclidean => {
                sphere_shell(layer as i64, 0, &mut offset, &mut visit);
            }
            Metric::Cosine => {}
        }
    }

    /// Shared shell-scanning core. `radius` is the caller-scale radius for
    /// radius queries, `None` for pure k-NN.
    fn collect(
        &self,
        query: &[T],
        capacity: usize,
        radius: Option<f64>,
    ) -> BoundedPriorityList<u32> {
        let mut list = BoundedPriorityList::new(capacity);
        let whole_grid = self.max_layer();

        let limit;
        let mut cap;
        match radius {
            Some(r) => {
                limit = self.metric.effective_radius(r);
                cap = self.layer_cap(r);
                if cap >= whole_grid {
                    // The shells would cover every cell anyway.
                    for i in 0..self.points.len() {
                        self.consider(i as u32, query, limit, &mut list);
                    }
                    return list;
                }
            }
            None => {
                limit = f64::INFINITY;
                cap = whole_grid;
            }
        }

        let home = self.cell_coords(query);
        let mut layer = 0usize;
        while layer <= cap {
            self.visit_layer(layer, &home, query, limit, &mut list);
            if radius.is_none() && list.is_full() {
                if let Some(worst) = list.max_priority() {
                    cap = cap.min(self.layer_cap(self.metric.unsquared(worst)));
                }
            }
            layer += 1;
        }
        list
    }

    fn materialize(&self, list: &BoundedPriorityList<u32>) -> Vec<Neighbor<'_, T, P>> {
        list.iter()
            .map(|(index, distance)| Neighbor {
                point: &self.points[index as usize],
                payload: &self.payloads[index as usize],
                distance,
            })
            .collect()
    }
}

/// Offsets with `Σ|δᵢ| == layer` (L1 diamond shell).
fn diamond_shell(
    remaining: i64,
    axis: usize,
    offset: &mut Vec<i64>,
    visit: &mut dyn FnMut(&[i64]),
) {
    if axis == offset.len() - 1 {
        offset[axis] = remaining;
        visit(offset);
        if remaining > 0 {
            offset[axis] = -remaining;
            visit(offset);
        }
        return;
    }
    for magnitude in 0..=remaining {
        offset[axis] = magnitude;
        diamond_shell(remaining - magnitude, axis + 1, offset, visit);
        if magnitude > 0 {
            offset[axis] = -magnitude;
            diamond_shell(remaining - magnitude, axis + 1, offset, visit);
        }
    }
}

/// Offsets with `max|δᵢ| == layer` (L∞ square shell). `saturated` records
/// whether an earlier axis already hit ±layer.
fn square_shell(
    layer: i64,
    axis: usize,
    saturated: bool,
    offset: &mut Vec<i64>,
    visit: &mut dyn FnMut(&[i64]),
) {
    if axis == offset.len() - 1 {
        if saturated {
            for v in -layer..=layer {
                offset[axis] = v;
                visit(offset);
            }
        } else {
            offset[axis] = layer;
            visit(offset);
            if layer > 0 {
                offset[axis] = -layer;
                visit(offset);
            }
        }
        return;
    }
    for v in -layer..=layer {
        offset[axis] = v;
        square_shell(layer, axis + 1, saturated || v.abs() == layer, offset, visit);
    }
}

/// Offsets with `Σδᵢ² == layer` (L2 integer-radius shell; many layers are
/// empty).
fn sphere_shell(
    remaining: i64,
    axis: usize,
    offset: &mut Vec<i64>,
    visit: &mut dyn FnMut(&[i64]),
) {
    if axis == offset.len() - 1 {
        let root = (remaining as f64).sqrt().round() as i64;
        if root * root == remaining {
            offset[axis] = root;
            visit(offset);
            if root > 0 {
                offset[axis] = -root;
                visit(offset);
            }
        }
        return;
    }
    let mut v = 0i64;
    while v * v <= remaining {
        offset[axis] = v;
        sphere_shell(remaining - v * v, axis + 1, offset, visit);
        if v > 0 {
            offset[axis] = -v;
            sphere_shell(remaining - v * v, axis + 1, offset, visit);
        }
        v += 1;
    }
}

impl<T: Scalar, P> SpatialIndex<T, P> for GridIndex<T, P> {
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

    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>> {
        let mut best = self.nearest_k(query, 1)?;
        best.pop().ok_or(KnnError::EmptyInput)
    }

    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        if k == 0 || k >= self.points.len() {
            return Ok(rank_all(self.metric, query, self.entries()));
        }
        let list = self.collect(query, k, None);
        Ok(self.materialize(&list))
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
        let capacity = match k {
            Some(k) if k > 0 && k < self.points.len() => k,
            _ => self.points.len(),
        };
        let list = self.collect(query, capacity, Some(radius));
        Ok(self.materialize(&list))
    }
}
