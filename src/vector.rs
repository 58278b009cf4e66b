//! Dense fixed-length `f32` vector used for feature rows, biases and input records.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::path::Path;
use std::str::FromStr;

use crate::error::{MfError, Result};

// ── Slice kernels (8-wide unrolled, shared with the training hot loop) ─────

#[inline(always)]
pub(crate) fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    let mut sum = 0.0f32;
    let mut i = 0;
    while i + 8 <= n {
        sum += a[i] * b[i]
            + a[i + 1] * b[i + 1]
            + a[i + 2] * b[i + 2]
            + a[i + 3] * b[i + 3]
            + a[i + 4] * b[i + 4]
            + a[i + 5] * b[i + 5]
            + a[i + 6] * b[i + 6]
            + a[i + 7] * b[i + 7];
        i += 8;
    }
    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

#[inline(always)]
pub(crate) fn axpy_f32(alpha: f32, x: &[f32], y: &mut [f32]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Owned dense vector of `f32`.
///
/// Indexing out of range panics, exactly like slice indexing. Binary
/// operations between vectors of different lengths return
/// [`MfError::ShapeMismatch`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixedVector {
    data: Vec<f32>,
}

impl FixedVector {
    /// Zero vector of length `len`.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn get(&self, i: usize) -> f32 {
        self.data[i]
    }

    /// Overwrite element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn set(&mut self, i: usize, value: f32) {
        self.data[i] = value;
    }

    fn check_len(&self, other: &Self) -> Result<()> {
        if self.len() == other.len() {
            Ok(())
        } else {
            Err(MfError::shape(self.len(), other.len()))
        }
    }

    /// Euclidean distance to `other`.
    pub fn distance_from(&self, other: &Self) -> Result<f32> {
        self.check_len(other)?;
        let total: f32 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (b - a) * (b - a))
            .sum();
        Ok(total.sqrt())
    }

    /// Elementwise `self += other`.
    pub fn add(&mut self, other: &Self) -> Result<()> {
        self.check_len(other)?;
        axpy_f32(1.0, &other.data, &mut self.data);
        Ok(())
    }

    /// Elementwise `self -= other`.
    pub fn subtract(&mut self, other: &Self) -> Result<()> {
        self.check_len(other)?;
        axpy_f32(-1.0, &other.data, &mut self.data);
        Ok(())
    }

    /// Multiply every element by `scalar` in place.
    ///
    /// Returns `self` so a step can be written as
    /// `w.subtract(direction.scale_by(step))`.
    pub fn scale_by(&mut self, scalar: f32) -> &mut Self {
        for v in &mut self.data {
            *v *= scalar;
        }
        self
    }

    pub fn dot(&self, other: &Self) -> Result<f32> {
        self.check_len(other)?;
        Ok(dot_f32(&self.data, &other.data))
    }

    /// Squared L2 norm.
    pub fn square(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Truncate to the first `len` elements.
    ///
    /// Shrink-only: when `len` exceeds the current length the vector is left
    /// untouched rather than padded.
    pub fn reshape(&mut self, len: usize) {
        if len <= self.data.len() {
            self.data.truncate(len);
        }
    }

    /// Parse one whitespace-separated line, attributing errors to `path:line`.
    pub(crate) fn parse_line(text: &str, path: &Path, line: usize) -> Result<Self> {
        let data = text
            .split_whitespace()
            .map(|tok| parse_f32(tok, path, line))
            .collect::<Result<Vec<f32>>>()?;
        Ok(Self { data })
    }
}

pub(crate) fn parse_f32(token: &str, path: &Path, line: usize) -> Result<f32> {
    token.parse::<f32>().map_err(|_| MfError::Parse {
        path: path.to_path_buf(),
        line,
        token: token.to_string(),
    })
}

impl From<Vec<f32>> for FixedVector {
    fn from(data: Vec<f32>) -> Self {
        Self { data }
    }
}

impl Index<usize> for FixedVector {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.data[i]
    }
}

impl IndexMut<usize> for FixedVector {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }
}

/// Space-separated elements, each followed by a single space.
impl fmt::Display for FixedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for v in &self.data {
            write!(f, "{v} ")?;
        }
        Ok(())
    }
}

impl FromStr for FixedVector {
    type Err = MfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_line(s, Path::new("<memory>"), 1)
    }
}
