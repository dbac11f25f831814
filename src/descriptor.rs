use std::slice::ChunksExact;

use thiserror::Error;

/// Row width of a binary ORB descriptor.
pub const ORB_DESCRIPTOR_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("descriptor matrix has no rows")]
    NoRows,
    #[error("descriptor matrix rows have zero width")]
    ZeroWidth,
    #[error("row {row} has {found} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("value at row {row} column {col} is not a descriptor element: {value}")]
    InvalidValue {
        row: usize,
        col: usize,
        value: String,
    },
}

/// Row-major descriptor storage, one row per keypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorMatrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy> DescriptorMatrix<T> {
    /// Builds a matrix from nested rows.
    ///
    /// Fails on an empty input, zero-width rows or rows of differing length.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, MatrixError> {
        let first = rows.first().ok_or(MatrixError::NoRows)?;
        let cols = first.len();
        if cols == 0 {
            return Err(MatrixError::ZeroWidth);
        }
        let mut matrix = Self::with_cols(cols);
        matrix.data.reserve(rows.len() * cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn from_array_rows<const N: usize>(rows: &[[T; N]]) -> Self {
        Self {
            rows: rows.len(),
            cols: N,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    /// An empty matrix that accepts rows of `cols` elements.
    pub fn with_cols(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: &[T]) -> Result<(), MatrixError> {
        if row.len() != self.cols {
            return Err(MatrixError::Ragged {
                row: self.rows,
                expected: self.cols,
                found: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, index: usize) -> Option<&[T]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    pub fn iter_rows(&self) -> ChunksExact<'_, T> {
        // chunks_exact panics on zero; a zero-width matrix never holds rows anyway
        self.data.chunks_exact(self.cols.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Binary,
    Float,
}

/// Descriptors of one image, either packed binary (ORB) or floating point.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptors {
    Binary(DescriptorMatrix<u8>),
    Float(DescriptorMatrix<f32>),
}

impl Descriptors {
    pub fn rows(&self) -> usize {
        match self {
            Descriptors::Binary(m) => m.rows(),
            Descriptors::Float(m) => m.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            Descriptors::Binary(m) => m.cols(),
            Descriptors::Float(m) => m.cols(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptors::Binary(_) => DescriptorKind::Binary,
            Descriptors::Float(_) => DescriptorKind::Float,
        }
    }

    /// Nested rows as JSON numbers, the catalog wire shape.
    pub fn to_json_rows(&self) -> serde_json::Value {
        match self {
            Descriptors::Binary(m) => serde_json::json!(m.to_rows()),
            Descriptors::Float(m) => serde_json::json!(m.to_rows()),
        }
    }
}

impl From<DescriptorMatrix<u8>> for Descriptors {
    fn from(m: DescriptorMatrix<u8>) -> Self {
        Descriptors::Binary(m)
    }
}

impl From<DescriptorMatrix<f32>> for Descriptors {
    fn from(m: DescriptorMatrix<f32>) -> Self {
        Descriptors::Float(m)
    }
}
