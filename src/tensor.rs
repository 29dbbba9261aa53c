//! Matrix Operations for Neural Networks
//!
//! This module provides the dense matrix type every layer, loss and optimizer
//! works with. A [`Tensor`] is always two-dimensional and row-major, and the row
//! dimension is always the minibatch dimension.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f64>` storing all elements in row-major order
//! - **Rows**: Number of samples in the batch (or input dims for a weight matrix)
//! - **Cols**: Features per sample
//!
//! ## Example
//!
//! ```rust
//! use minet::Tensor;
//!
//! // Create a 2x3 matrix
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
//!
//! // Matrix multiplication
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], 3, 2);
//! let c = a.matmul(&b)?;
//! assert_eq!(c.shape(), (2, 2));
//! # Ok::<(), minet::MinetError>(())
//! ```
//!
//! ## Errors
//!
//! Binary operations check operand shapes and return
//! [`MinetError::ShapeMismatch`] instead of panicking, so a badly wired network
//! fails the current training step with a descriptive error. Constructors that
//! receive a flat buffer assert its length, since a wrong length there is always a
//! bug in the caller's arithmetic.

use crate::error::{MinetError, Result};
use std::fmt;

/// A dense row-major matrix of `f64`
///
/// # Memory Layout
///
/// For a `2 x 3` tensor, data is stored as:
/// `[r0c0, r0c1, r0c2, r1c0, r1c1, r1c2]`
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all elements
    pub data: Vec<f64>,
    /// Number of rows (batch dimension)
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
}

impl Tensor {
    /// Create a new tensor from a flat row-major buffer
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Data length ({}) doesn't match shape [{}, {}]",
            data.len(),
            rows,
            cols
        );
        Self { data, rows, cols }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(vec![0.0; rows * cols], rows, cols)
    }

    /// Create a tensor from a list of rows
    ///
    /// Every row must have the same length. An empty list yields a `0 x 0` tensor.
    ///
    /// ```rust
    /// # use minet::Tensor;
    /// let x = Tensor::from_rows(&[vec![0.1, 0.2], vec![0.3, 0.4]])?;
    /// assert_eq!(x.get(1, 0), 0.3);
    /// # Ok::<(), minet::MinetError>(())
    /// ```
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(MinetError::shape(
                    "from_rows",
                    (rows.len(), cols),
                    (rows.len(), row.len()),
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Self::new(data, rows.len(), cols))
    }

    /// Create a single-column tensor (one value per row), e.g. class labels
    pub fn column(values: Vec<f64>) -> Self {
        let rows = values.len();
        Self::new(values, rows, 1)
    }

    /// Create a single-row tensor, e.g. a bias vector
    pub fn row_vector(values: Vec<f64>) -> Self {
        let cols = values.len();
        Self::new(values, 1, cols)
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row as a slice
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    fn ensure_same_shape(&self, other: &Tensor, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(MinetError::shape(op, self.shape(), other.shape()));
        }
        Ok(())
    }

    /// Inner loop of matrix multiplication: `result[j] += a_val * b[j]`
    ///
    /// Kept as a plain zip so LLVM can auto-vectorize it.
    #[inline(always)]
    fn matmul_inner(a_val: f64, b: &[f64], result: &mut [f64]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]` the result is `[m, n]`.
    ///
    /// Uses a cache-blocked i-k-j loop order: for each output row block the inner
    /// loop walks contiguous memory in both `B` and the result.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the inner dimensions differ.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        if self.cols != other.rows {
            return Err(MinetError::shape(
                "matmul",
                (self.cols, other.cols),
                other.shape(),
            ));
        }

        const BLOCK_SIZE: usize = 8;

        let m = self.rows;
        let k = self.cols;
        let n = other.cols;
        let mut result = vec![0.0; m * n];

        for i_start in (0..m).step_by(BLOCK_SIZE) {
            let i_end = (i_start + BLOCK_SIZE).min(m);
            for k_start in (0..k).step_by(BLOCK_SIZE) {
                let k_end = (k_start + BLOCK_SIZE).min(k);
                for i in i_start..i_end {
                    for k_idx in k_start..k_end {
                        let a_val = self.data[i * k + k_idx];
                        Self::matmul_inner(
                            a_val,
                            &other.data[k_idx * n..(k_idx + 1) * n],
                            &mut result[i * n..(i + 1) * n],
                        );
                    }
                }
            }
        }

        Ok(Tensor::new(result, m, n))
    }

    /// Transpose rows and columns
    pub fn transpose(&self) -> Tensor {
        let mut result = vec![0.0; self.data.len()];
        for i in 0..self.rows {
            for j in 0..self.cols {
                result[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Tensor::new(result, self.cols, self.rows)
    }

    /// Element-wise addition (shapes must match)
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Add a `1 x cols` row vector to every row (bias broadcast)
    pub fn add_row_vector(&self, row: &Tensor) -> Result<Tensor> {
        if row.rows != 1 || row.cols != self.cols {
            return Err(MinetError::shape(
                "add_row_vector",
                (1, self.cols),
                row.shape(),
            ));
        }
        let data = self
            .data
            .chunks(self.cols.max(1))
            .flat_map(|r| r.iter().zip(&row.data).map(|(a, b)| a + b))
            .collect();
        Ok(Tensor::new(data, self.rows, self.cols))
    }

    /// Element-wise subtraction
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Element-wise (Hadamard) product
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    fn zip_with<F>(&self, other: &Tensor, op: &'static str, f: F) -> Result<Tensor>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.ensure_same_shape(other, op)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Tensor::new(data, self.rows, self.cols))
    }

    /// Apply a function to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        let data = self.data.iter().map(|&x| f(x)).collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f64) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Sum over rows: `[rows, cols] -> [1, cols]`
    pub fn column_sums(&self) -> Tensor {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols.max(1)) {
            for (s, &v) in sums.iter_mut().zip(row) {
                *s += v;
            }
        }
        Tensor::new(sums, 1, self.cols)
    }

    /// Sum over columns: `[rows, cols] -> [rows, 1]`
    pub fn row_sums(&self) -> Tensor {
        let sums = (0..self.rows).map(|i| self.row(i).iter().sum()).collect();
        Tensor::new(sums, self.rows, 1)
    }

    /// Row-wise softmax
    ///
    /// ```text
    /// softmax(x)[i, j] = exp(x[i, j] - max_i) / sum_k exp(x[i, k] - max_i)
    /// ```
    ///
    /// Subtracting the row maximum prevents overflow in `exp()` without changing the
    /// result, since the factor `exp(-max_i)` cancels in the ratio.
    pub fn softmax_rows(&self) -> Tensor {
        let mut result = Vec::with_capacity(self.data.len());
        for i in 0..self.rows {
            let row = self.row(i);
            let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let exp_values: Vec<f64> = row.iter().map(|&x| (x - max).exp()).collect();
            let sum: f64 = exp_values.iter().sum();
            result.extend(exp_values.into_iter().map(|v| v / sum));
        }
        Tensor::new(result, self.rows, self.cols)
    }

    /// In-place element-wise accumulation: `self += other`
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        self.scaled_add_assign(1.0, other)
    }

    /// In-place scaled accumulation: `self += alpha * other`
    pub fn scaled_add_assign(&mut self, alpha: f64, other: &Tensor) -> Result<()> {
        self.ensure_same_shape(other, "scaled_add_assign")?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += alpha * b;
        }
        Ok(())
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Column index of the maximum of each row
    ///
    /// Ties resolve to the lowest index. A tensor with zero columns yields zeros.
    pub fn row_argmax(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|i| {
                self.row(i)
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 {
                            (j, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }

    /// Gather the given rows, in order, into a new tensor
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Tensor::new(data, indices.len(), self.cols)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{} x {}]", self.rows, self.cols)?;
        for i in 0..self.rows {
            let cells: Vec<String> = self.row(i).iter().map(|v| format!("{:.4}", v)).collect();
            writeln!(f, "  [{}]", cells.join(", "))?;
        }
        Ok(())
    }
}
