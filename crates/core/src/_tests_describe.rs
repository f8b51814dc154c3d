use crate::describe::{ArrayType, Direction, Placement, Precision, TransformDesc};
use crate::error::FftError;

#[test]
fn default_strides_are_packed_row_major() {
    // Builder input is row-major: slowest dim first.
    let desc = TransformDesc::builder(&[4, 8, 16]).batch(2).build().unwrap();
    // Internally fastest-first.
    assert_eq!(desc.lengths, vec![16, 8, 4]);
    assert_eq!(desc.in_stride, vec![1, 16, 128]);
    assert_eq!(desc.out_stride, vec![1, 16, 128]);
    assert_eq!(desc.in_dist, 512);
    assert_eq!(desc.out_dist, 512);
}

#[test]
fn length_one_dimensions_collapse() {
    let desc = TransformDesc::builder(&[4, 1, 8]).build().unwrap();
    assert_eq!(desc.lengths, vec![8, 4]);

    let desc = TransformDesc::builder(&[1, 1]).build().unwrap();
    assert_eq!(desc.lengths, vec![1]);
}

#[test]
fn inplace_complex_stride_mismatch_rejected() {
    // istride != ostride can never be satisfied in place.
    let err = TransformDesc::builder(&[1024])
        .placement(Placement::InPlace)
        .strides(&[1], &[2])
        .build()
        .unwrap_err();
    assert!(matches!(err, FftError::InvalidArgument(_)), "{err}");
}

#[test]
fn inplace_complex_distance_mismatch_rejected() {
    let err = TransformDesc::builder(&[64])
        .placement(Placement::InPlace)
        .batch(4)
        .distances(64, 80)
        .build()
        .unwrap_err();
    assert!(matches!(err, FftError::InvalidArgument(_)));
}

#[test]
fn real_transform_pairs_real_with_hermitian() {
    let desc = TransformDesc::builder(&[128]).real().build().unwrap();
    assert_eq!(desc.in_type, ArrayType::Real);
    assert_eq!(desc.out_type, ArrayType::HermitianInterleaved);
    // Hermitian side stores ⌊N/2⌋+1 elements.
    assert_eq!(desc.out_dist, 65);

    let err = TransformDesc::builder(&[128])
        .array_types(ArrayType::Real, ArrayType::ComplexInterleaved)
        .build()
        .unwrap_err();
    assert!(matches!(err, FftError::InvalidArgument(_)));
}

#[test]
fn hermitian_input_means_inverse() {
    let err = TransformDesc::builder(&[128])
        .direction(Direction::Forward)
        .array_types(ArrayType::HermitianInterleaved, ArrayType::Real)
        .build()
        .unwrap_err();
    assert!(matches!(err, FftError::InvalidArgument(_)));

    let desc = TransformDesc::builder(&[128])
        .direction(Direction::Inverse)
        .array_types(ArrayType::HermitianInterleaved, ArrayType::Real)
        .build()
        .unwrap();
    assert_eq!(desc.in_dist, 65);
    assert_eq!(desc.out_dist, 128);
}

#[test]
fn inplace_real_requires_unit_inner_stride() {
    let err = TransformDesc::builder(&[64])
        .real()
        .placement(Placement::InPlace)
        .strides(&[2], &[1])
        .build()
        .unwrap_err();
    assert!(matches!(err, FftError::InvalidArgument(_)));
}

#[test]
fn zero_length_and_zero_batch_rejected() {
    assert!(TransformDesc::builder(&[0]).build().is_err());
    assert!(TransformDesc::builder(&[64]).batch(0).build().is_err());
    assert!(TransformDesc::builder(&[]).build().is_err());
}

#[test]
fn inverse_description_swaps_geometry() {
    let desc = TransformDesc::builder(&[256])
        .precision(Precision::Double)
        .batch(3)
        .build()
        .unwrap();
    let inv = desc.inverse();
    assert_eq!(inv.direction, Direction::Inverse);
    assert_eq!(inv.lengths, desc.lengths);
    assert_eq!(inv.in_stride, desc.out_stride);
    assert_eq!(inv.out_dist, desc.in_dist);
}
