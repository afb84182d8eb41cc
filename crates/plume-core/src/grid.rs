//! Cell-centered square grid and the grid/particle coupling used by the
//! environment: bilinear interpolation (grid to agent) and bilinear
//! splatting (agent to grid).
//!
//! The lower-left corner of the domain is fixed at `(0, 0)`, so node `(i, j)`
//! sits at `((i + 0.5) h, (j + 0.5) h)`. All index arithmetic below depends
//! on that placement.

use crate::field::ScalarField;
use std::{error::Error, fmt};

/// Relative tolerance when checking that `length` is a whole number of cells.
const CELL_MULTIPLE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    NonPositiveSpacing(f64),
    NonPositiveLength(f64),
    LengthNotMultiple { length: f64, spacing: f64 },
    TooFewPoints(usize),
    TooManyPoints { max: usize, actual: f64 },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::NonPositiveSpacing(h) => {
                write!(f, "grid spacing must be positive and finite (got {h})")
            }
            GridError::NonPositiveLength(l) => {
                write!(f, "domain length must be positive and finite (got {l})")
            }
            GridError::LengthNotMultiple { length, spacing } => write!(
                f,
                "domain length ({length}) must be a whole multiple of grid spacing ({spacing})"
            ),
            GridError::TooFewPoints(n) => {
                write!(f, "grid needs at least 2 points per side (got {n})")
            }
            GridError::TooManyPoints { max, actual } => {
                write!(f, "grid allows at most {max} points per side (got {actual})")
            }
        }
    }
}

impl Error for GridError {}

/// A query point outside the half-cell margin `[h/2, L - h/2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutOfDomainError {
    pub x: f64,
    pub y: f64,
    pub lower: f64,
    pub upper: f64,
}

impl fmt::Display for OutOfDomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "point ({}, {}) lies outside the interpolation region [{}, {})",
            self.x, self.y, self.lower, self.upper
        )
    }
}

impl Error for OutOfDomainError {}

/// Lower-left node of the cell containing a point plus fractional offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLocation<I> {
    pub i: I,
    pub j: I,
    pub rx: f64,
    pub ry: f64,
}

impl<I> CellLocation<I> {
    /// Bilinear weights for nodes `(i, j)`, `(i, j+1)`, `(i+1, j)`, `(i+1, j+1)`.
    #[inline]
    pub fn weights(&self) -> [f64; 4] {
        let (rx, ry) = (self.rx, self.ry);
        [
            (1.0 - rx) * (1.0 - ry),
            (1.0 - rx) * ry,
            rx * (1.0 - ry),
            rx * ry,
        ]
    }
}

impl CellLocation<usize> {
    /// The four nodes in the same order as [`CellLocation::weights`].
    #[inline]
    pub fn nodes(&self) -> [(usize, usize); 4] {
        let (i, j) = (self.i, self.j);
        [(i, j), (i, j + 1), (i + 1, j), (i + 1, j + 1)]
    }
}

/// Lower-left node and remainders for `(x, y)` on a grid of spacing `h`.
///
/// Indices truncate toward zero, which equals `floor` for every point inside
/// the domain. Points left of or below the first node get remainders outside
/// `[0, 1)`; callers that index with the result must bound-check first (see
/// [`Grid::locate`]).
pub fn locate(x: f64, y: f64, h: f64) -> CellLocation<i64> {
    let fx = x / h - 0.5;
    let fy = y / h - 0.5;
    let i = fx.trunc();
    let j = fy.trunc();
    CellLocation {
        i: i as i64,
        j: j as i64,
        rx: fx - i,
        ry: fy - j,
    }
}

/// Node coordinate arrays `(xg, yg)` of a cell-centered grid.
pub fn make_grid(h: f64, length: f64) -> Result<(ScalarField, ScalarField), GridError> {
    Ok(Grid::new(h, length)?.coordinates())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    h: f64,
    length: f64,
    n: usize,
}

impl Grid {
    pub const MAX_GRID_POINTS: usize = 4096;

    pub fn new(h: f64, length: f64) -> Result<Self, GridError> {
        if !(h.is_finite() && h > 0.0) {
            return Err(GridError::NonPositiveSpacing(h));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(GridError::NonPositiveLength(length));
        }
        let cells = (length / h).round();
        if cells < 1.0 || (cells * h - length).abs() > CELL_MULTIPLE_TOLERANCE * length {
            return Err(GridError::LengthNotMultiple { length, spacing: h });
        }
        if cells > Self::MAX_GRID_POINTS as f64 {
            return Err(GridError::TooManyPoints {
                max: Self::MAX_GRID_POINTS,
                actual: cells,
            });
        }
        let n = cells as usize;
        if n < 2 {
            return Err(GridError::TooFewPoints(n));
        }
        Ok(Self { h, length, n })
    }

    /// Grid with `num_grid_points` nodes per side; `h` is derived.
    pub fn with_points(length: f64, num_grid_points: usize) -> Result<Self, GridError> {
        if !(length.is_finite() && length > 0.0) {
            return Err(GridError::NonPositiveLength(length));
        }
        if num_grid_points < 2 {
            return Err(GridError::TooFewPoints(num_grid_points));
        }
        if num_grid_points > Self::MAX_GRID_POINTS {
            return Err(GridError::TooManyPoints {
                max: Self::MAX_GRID_POINTS,
                actual: num_grid_points as f64,
            });
        }
        Ok(Self {
            h: length / num_grid_points as f64,
            length,
            n: num_grid_points,
        })
    }

    pub fn spacing(&self) -> f64 {
        self.h
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn num_grid_points(&self) -> usize {
        self.n
    }

    pub fn zeros(&self) -> ScalarField {
        ScalarField::zeros(self.n)
    }

    pub fn node_position(&self, i: usize, j: usize) -> [f64; 2] {
        [(i as f64 + 0.5) * self.h, (j as f64 + 0.5) * self.h]
    }

    pub fn coordinates(&self) -> (ScalarField, ScalarField) {
        let xg = ScalarField::from_fn(self.n, |i, _| self.node_position(i, 0)[0]);
        let yg = ScalarField::from_fn(self.n, |_, j| self.node_position(0, j)[1]);
        (xg, yg)
    }

    /// Sample `f(x, y)` at every node.
    pub fn sample(&self, mut f: impl FnMut(f64, f64) -> f64) -> ScalarField {
        ScalarField::from_fn(self.n, |i, j| {
            let [x, y] = self.node_position(i, j);
            f(x, y)
        })
    }

    /// Inclusive lower and exclusive upper bound of the interpolation region.
    pub fn interpolation_bounds(&self) -> (f64, f64) {
        (0.5 * self.h, self.length - 0.5 * self.h)
    }

    /// Whether `(x, y)` lies inside the closed physical domain `[0, L]^2`.
    pub fn in_domain(&self, x: f64, y: f64) -> bool {
        (0.0..=self.length).contains(&x) && (0.0..=self.length).contains(&y)
    }

    /// Bound-checked [`locate`]: all four surrounding nodes exist.
    pub fn locate(&self, x: f64, y: f64) -> Result<CellLocation<usize>, OutOfDomainError> {
        let last = (self.n - 1) as f64;
        let fx = x / self.h - 0.5;
        let fy = y / self.h - 0.5;
        // Negated comparisons also reject NaN.
        if !(fx >= 0.0 && fx < last && fy >= 0.0 && fy < last) {
            let (lower, upper) = self.interpolation_bounds();
            return Err(OutOfDomainError { x, y, lower, upper });
        }
        let i = fx as usize;
        let j = fy as usize;
        Ok(CellLocation {
            i,
            j,
            rx: fx - i as f64,
            ry: fy - j as f64,
        })
    }

    pub fn interpolate(&self, x: f64, y: f64, field: &ScalarField) -> Result<f64, OutOfDomainError> {
        let [value] = self.interpolate_fields(x, y, [field])?;
        Ok(value)
    }

    /// Bilinear interpolation of several fields at one point, sharing the
    /// index and weight computation.
    pub fn interpolate_fields<const K: usize>(
        &self,
        x: f64,
        y: f64,
        fields: [&ScalarField; K],
    ) -> Result<[f64; K], OutOfDomainError> {
        let cell = self.locate(x, y)?;
        let weights = cell.weights();
        let nodes = cell.nodes();
        let mut out = [0.0; K];
        for (value, field) in out.iter_mut().zip(fields.iter()) {
            debug_assert_eq!(field.len_per_side(), self.n, "field must match grid");
            *value = nodes
                .iter()
                .zip(weights.iter())
                .map(|(&(i, j), w)| w * field.get(i, j))
                .sum();
        }
        Ok(out)
    }

    /// Interpolate at many points; fails on the first out-of-margin point.
    pub fn interpolate_points<const K: usize>(
        &self,
        xs: &[f64],
        ys: &[f64],
        fields: [&ScalarField; K],
    ) -> Result<Vec<[f64; K]>, OutOfDomainError> {
        assert_eq!(xs.len(), ys.len(), "x and y arrays must have equal length");
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| self.interpolate_fields(x, y, fields))
            .collect()
    }

    /// Splat each point value onto its four surrounding nodes with the
    /// bilinear weights, accumulating where points share nodes.
    pub fn extrapolate(
        &self,
        xs: &[f64],
        ys: &[f64],
        values: &[f64],
    ) -> Result<ScalarField, OutOfDomainError> {
        assert_eq!(xs.len(), ys.len(), "x and y arrays must have equal length");
        assert_eq!(xs.len(), values.len(), "one value per point is required");
        let mut out = self.zeros();
        for ((&x, &y), &s) in xs.iter().zip(ys.iter()).zip(values.iter()) {
            let cell = self.locate(x, y)?;
            for ((i, j), w) in cell.nodes().into_iter().zip(cell.weights()) {
                out.add(i, j, w * s);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn default_grid() -> Grid {
        Grid::with_points(100.0, 128).unwrap()
    }

    #[test]
    fn first_node_sits_half_a_cell_from_origin() {
        let (xg, yg) = make_grid(0.5, 10.0).unwrap();
        assert_eq!(xg.len_per_side(), 20);
        assert!((xg.get(0, 0) - 0.25).abs() < 1e-12);
        assert!((yg.get(0, 3) - 1.75).abs() < 1e-12);
        assert!((xg.get(19, 7) - 9.75).abs() < 1e-12);
    }

    #[test]
    fn rejects_length_that_is_not_a_multiple_of_spacing() {
        assert!(matches!(
            Grid::new(0.3, 1.0),
            Err(GridError::LengthNotMultiple { .. })
        ));
        assert!(matches!(Grid::new(0.0, 1.0), Err(GridError::NonPositiveSpacing(_))));
        assert!(matches!(Grid::new(0.1, -1.0), Err(GridError::NonPositiveLength(_))));
        assert!(Grid::new(0.25, 1.0).is_ok());
    }

    #[test]
    fn rejects_grids_above_the_point_cap() {
        assert!(matches!(
            Grid::new(1e-6, 100.0),
            Err(GridError::TooManyPoints { max: 4096, .. })
        ));
        assert!(matches!(
            Grid::with_points(100.0, Grid::MAX_GRID_POINTS + 1),
            Err(GridError::TooManyPoints { .. })
        ));
        assert_eq!(Grid::new(100.0 / 4096.0, 100.0).unwrap().num_grid_points(), 4096);
    }

    #[test]
    fn locate_truncates_toward_zero() {
        let cell = locate(1.8, 0.7, 1.0);
        assert_eq!((cell.i, cell.j), (1, 0));
        assert!((cell.rx - 0.3).abs() < 1e-12);
        assert!((cell.ry - 0.2).abs() < 1e-12);

        let below = locate(0.2, 0.2, 1.0);
        assert_eq!(below.i, 0);
        assert!(below.rx < 0.0);
    }

    #[test]
    fn bound_checked_locate_rejects_margin_points() {
        let grid = Grid::new(1.0, 10.0).unwrap();
        assert!(grid.locate(0.5, 0.5).is_ok());
        assert!(grid.locate(0.49, 5.0).is_err());
        assert!(grid.locate(5.0, 9.5).is_err());
        assert!(grid.locate(9.49, 9.49).is_ok());
        assert!(grid.locate(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn interpolation_recovers_affine_fields() {
        let grid = default_grid();
        let rand_vel1 = grid.sample(|x, _| 0.03 * x + 0.1);
        let rand_vel2 = grid.sample(|_, y| -0.02 * y);
        let co2 = grid.sample(|x, y| x + 2.5 * y);

        let [u, v, c] = grid
            .interpolate_fields(48.32, 5.02, [&rand_vel1, &rand_vel2, &co2])
            .unwrap();
        assert!((u - 1.5496).abs() < 1e-10, "u = {u}");
        assert!((v + 0.1004).abs() < 1e-10, "v = {v}");
        assert!((c - (48.32 + 2.5 * 5.02)).abs() < 1e-9, "c = {c}");

        let points = [(16.94, 34.43), (69.50, 90.98)];
        for (x, y) in points {
            let c = grid.interpolate(x, y, &co2).unwrap();
            assert!((c - (x + 2.5 * y)).abs() < 1e-9);
        }
    }

    #[test]
    fn interpolation_is_exact_for_random_points() {
        let grid = default_grid();
        let field = grid.sample(|x, y| -0.7 * x + 0.013 * y + 4.0);
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let xs: Vec<f64> = (0..500).map(|_| 1.0 + 98.0 * rng.random::<f64>()).collect();
        let ys: Vec<f64> = (0..500).map(|_| 1.0 + 98.0 * rng.random::<f64>()).collect();
        let values = grid.interpolate_points(&xs, &ys, [&field]).unwrap();
        for ((x, y), [v]) in xs.iter().zip(&ys).zip(values) {
            assert!((v - (-0.7 * x + 0.013 * y + 4.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn interpolation_outside_margin_is_an_error() {
        let grid = default_grid();
        let field = grid.zeros();
        let err = grid.interpolate(0.1, 50.0, &field).unwrap_err();
        assert_eq!(err.x, 0.1);
        assert!(grid.interpolate(50.0, 99.9, &field).is_err());
    }

    #[test]
    fn extrapolation_conserves_each_point_value() {
        let grid = Grid::with_points(100.0, 512).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(4736829);
        let xs: Vec<f64> = (0..100).map(|_| 1.0 + 98.0 * rng.random::<f64>()).collect();
        let ys: Vec<f64> = (0..100).map(|_| 1.0 + 98.0 * rng.random::<f64>()).collect();
        let values: Vec<f64> = (0..100).map(|_| rng.random::<f64>()).collect();

        for k in 0..xs.len() {
            let single = grid.extrapolate(&xs[k..=k], &ys[k..=k], &values[k..=k]).unwrap();
            let cell = grid.locate(xs[k], ys[k]).unwrap();
            let checksum: f64 = cell.nodes().iter().map(|&(i, j)| single.get(i, j)).sum();
            assert!((checksum - values[k]).abs() < 1e-12);
        }

        let all = grid.extrapolate(&xs, &ys, &values).unwrap();
        assert!((all.total() - values.iter().sum::<f64>()).abs() < 1e-9);
    }

    #[test]
    fn extrapolation_weights_favor_the_closest_node() {
        let grid = Grid::with_points(100.0, 512).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(48758);
        for _ in 0..200 {
            let x = 1.0 + 98.0 * rng.random::<f64>();
            let y = 1.0 + 98.0 * rng.random::<f64>();
            let field = grid.extrapolate(&[x], &[y], &[1.0]).unwrap();
            let cell = grid.locate(x, y).unwrap();
            let nodes = cell.nodes();

            let heaviest = nodes
                .iter()
                .max_by(|a, b| field.get(a.0, a.1).total_cmp(&field.get(b.0, b.1)))
                .copied()
                .unwrap();
            let nearest = nodes
                .iter()
                .min_by(|a, b| {
                    let da = dist_sq(grid.node_position(a.0, a.1), [x, y]);
                    let db = dist_sq(grid.node_position(b.0, b.1), [x, y]);
                    da.total_cmp(&db)
                })
                .copied()
                .unwrap();
            assert_eq!(heaviest, nearest, "point ({x}, {y})");
        }
    }

    #[test]
    fn extrapolation_accumulates_shared_nodes() {
        let grid = Grid::new(1.0, 10.0).unwrap();
        let field = grid.extrapolate(&[2.5, 2.5], &[2.5, 2.5], &[1.0, 2.0]).unwrap();
        assert!((field.get(2, 2) - 3.0).abs() < 1e-12);
        assert!((field.total() - 3.0).abs() < 1e-12);
    }

    fn dist_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
        (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
    }
}
