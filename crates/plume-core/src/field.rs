/// Square scalar field over a cell-centered grid.
///
/// Node `(i, j)` sits at `((i + 0.5) h, (j + 0.5) h)`; `i` indexes x and `j`
/// indexes y. Storage is row-major in `i`, so `data[i * n + j]`.

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    n: usize,
    data: Vec<f64>,
}

impl ScalarField {
    pub fn zeros(n: usize) -> Self {
        Self::filled(n, 0.0)
    }

    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            n,
            data: vec![value; n * n],
        }
    }

    /// Build a field by evaluating `f(i, j)` at every node.
    pub fn from_fn(n: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                data.push(f(i, j));
            }
        }
        Self { n, data }
    }

    /// Wrap raw node values. Panics if `data.len() != n * n`.
    pub fn from_vec(n: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), n * n, "field data must hold n * n values");
        Self { n, data }
    }

    pub fn len_per_side(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.n && j < self.n, "node index out of range");
        i * self.n + j
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }

    /// Accumulate into a node rather than overwrite it.
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] += value;
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// `self + alpha * (other - self)`, node by node.
    pub fn lerp(&self, other: &ScalarField, alpha: f64) -> ScalarField {
        debug_assert_eq!(self.n, other.n, "fields must share a grid");
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + alpha * (b - a))
            .collect();
        ScalarField { n: self.n, data }
    }
}
