//! Host-side matrix: a flat row-major `f32` buffer with logical extents.

use crate::error::PipelineError;

/// Row-major matrix of `f32` values, as all kernels assume.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Create a matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wrap an existing flat buffer. The buffer length must equal
    /// `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, PipelineError> {
        if data.len() != rows * cols {
            return Err(PipelineError::SizeMismatch {
                declared: rows * cols * std::mem::size_of::<f32>(),
                actual: data.len() * std::mem::size_of::<f32>(),
            });
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Reinterpret raw device bytes as a matrix of the given shape.
    pub fn from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self, PipelineError> {
        // pod_collect copies, so read-back bytes need not be f32-aligned.
        Self::from_vec(rows, cols, bytemuck::pod_collect_to_vec(bytes))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total size in bytes when mirrored to a device buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Sum of each row — the diagnostic used to validate softmax output.
    pub fn row_sums(&self) -> Vec<f32> {
        self.data
            .chunks(self.cols)
            .map(|row| row.iter().sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_has_uniform_contents() {
        let m = Matrix::filled(3, 4, 2.5);
        assert_eq!(m.len(), 12);
        assert!(m.as_slice().iter().all(|&v| v == 2.5));
        assert_eq!(m.get(2, 3), 2.5);
    }

    #[test]
    fn row_sums_are_per_row() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]).unwrap();
        assert_eq!(m.row_sums(), vec![6.0, 60.0]);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = Matrix::from_vec(2, 2, vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, PipelineError::SizeMismatch { .. }));
    }
}
