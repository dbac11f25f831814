use poster_scan::descriptor::{DescriptorKind, DescriptorMatrix, Descriptors, MatrixError};

#[test]
fn test_from_rows() {
    let m = DescriptorMatrix::from_rows(&[vec![1u8, 2, 3], vec![4, 5, 6]]).unwrap();
    assert_eq!(m.rows(), 2);
    assert_eq!(m.cols(), 3);
    assert_eq!(m.row(1), Some(&[4u8, 5, 6][..]));
    assert_eq!(m.row(2), None);
    assert_eq!(m.to_rows(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    assert_eq!(m.iter_rows().count(), 2);
}

#[test]
fn test_from_rows_rejects_bad_shapes() {
    let empty: Vec<Vec<u8>> = vec![];
    assert_eq!(DescriptorMatrix::from_rows(&empty), Err(MatrixError::NoRows));
    assert_eq!(
        DescriptorMatrix::<u8>::from_rows(&[vec![], vec![]]),
        Err(MatrixError::ZeroWidth)
    );
    assert_eq!(
        DescriptorMatrix::from_rows(&[vec![1u8, 2], vec![3]]),
        Err(MatrixError::Ragged {
            row: 1,
            expected: 2,
            found: 1
        })
    );
}

#[test]
fn test_push_row() {
    let mut m = DescriptorMatrix::with_cols(2);
    assert!(m.is_empty());
    m.push_row(&[1.0f32, 2.0]).unwrap();
    assert!(m.push_row(&[1.0]).is_err());
    assert_eq!(m.rows(), 1);
}

#[test]
fn test_from_array_rows() {
    let m = DescriptorMatrix::from_array_rows(&[[7u8; 32], [9u8; 32]]);
    assert_eq!((m.rows(), m.cols()), (2, 32));
    let empty = DescriptorMatrix::<u8>::from_array_rows::<32>(&[]);
    assert!(empty.is_empty());
    assert_eq!(empty.cols(), 32);
    assert_eq!(empty.iter_rows().count(), 0);
}

#[test]
fn test_descriptors_kind_and_json() {
    let d: Descriptors = DescriptorMatrix::from_rows(&[vec![0u8, 255]]).unwrap().into();
    assert_eq!(d.kind(), DescriptorKind::Binary);
    assert_eq!(d.to_json_rows(), serde_json::json!([[0, 255]]));

    let f: Descriptors = DescriptorMatrix::from_rows(&[vec![0.5f32]]).unwrap().into();
    assert_eq!(f.kind(), DescriptorKind::Float);
    assert_eq!((f.rows(), f.cols()), (1, 1));
}
