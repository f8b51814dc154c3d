use crate::catalog::{Catalog, KernelKey, KernelPool, MAX_SINGLE_KERNEL_LEN};
use crate::describe::Precision;
use crate::scheme::{SbrcVariant, Scheme};

#[test]
fn stockham_entries_cover_both_precisions() {
    let cat = Catalog::builtin();
    for precision in [Precision::Single, Precision::Double] {
        let entry = cat
            .lookup(&KernelKey::new(Scheme::KernelStockham, 1024, precision))
            .expect("1024 is a table length");
        assert_eq!(entry.factors, vec![8, 8, 4, 4]);
        assert_eq!(entry.workgroup_size, 128);
        assert_eq!(entry.threads_per_transform[0], 128);
    }
}

#[test]
fn stockham_factor_products_match_lengths() {
    let cat = Catalog::builtin();
    for &len in cat.supported_lengths(Scheme::KernelStockham) {
        let entry = cat
            .lookup(&KernelKey::new(Scheme::KernelStockham, len, Precision::Single))
            .expect("listed length must resolve");
        assert_eq!(
            entry.factors.iter().product::<usize>(),
            len,
            "factors of {len} are inconsistent"
        );
        assert!(len <= MAX_SINGLE_KERNEL_LEN);
    }
}

#[test]
fn sbcc_table_carries_block_lengths() {
    let cat = Catalog::builtin();
    let lens = cat.supported_lengths(Scheme::KernelStockhamBlockCc);
    for expect in [50, 64, 100, 128, 200, 256, 336] {
        assert!(lens.contains(&expect), "SBCC table should list {expect}");
    }
    let entry = cat
        .lookup(&KernelKey::new(
            Scheme::KernelStockhamBlockCc,
            200,
            Precision::Single,
        ))
        .unwrap();
    assert_eq!(entry.block_width, 16);
    assert_eq!(entry.factors.iter().product::<usize>(), 200);
}

#[test]
fn sbrc_entries_exist_per_variant() {
    let cat = Catalog::builtin();
    for variant in [SbrcVariant::None, SbrcVariant::XyZ, SbrcVariant::ZXy] {
        assert!(
            cat.lookup(
                &KernelKey::new(Scheme::KernelStockhamBlockRc, 200, Precision::Double)
                    .with_sbrc_variant(variant)
            )
            .is_some(),
            "SBRC 200 missing variant {variant:?}"
        );
    }
}

#[test]
fn generic_kernels_match_any_length() {
    let cat = Catalog::builtin();
    for scheme in [
        Scheme::KernelTranspose,
        Scheme::KernelR2cPost,
        Scheme::KernelC2rPre,
        Scheme::KernelChirp,
        Scheme::KernelPadMul,
        Scheme::KernelFftMul,
        Scheme::KernelResMul,
    ] {
        assert!(
            cat.lookup(&KernelKey::new(scheme, 12345, Precision::Single)).is_some(),
            "{scheme} should fall back to its generic entry"
        );
    }
}

#[test]
fn fused_2d_entries_fit_lds() {
    let cat = Catalog::builtin();
    let key = KernelKey::new(Scheme::Kernel2dSingle, 16, Precision::Single).with_length2(16);
    let entry = cat.lookup(&key).expect("16x16 fused kernel");
    assert_eq!(entry.static_dim, 2);
    assert!(entry.lds_bytes() <= crate::catalog::LDS_BYTE_BUDGET);

    // Oversized tiles are left to the decomposed path.
    let big = KernelKey::new(Scheme::Kernel2dSingle, 256, Precision::Double).with_length2(9);
    assert!(cat.lookup(&big).is_none());
}

#[test]
fn pool_synthesizes_runtime_kernels() {
    let mut pool = KernelPool::new(Catalog::builtin());
    // 34 = 2·17 factors over the generator set but has no table entry.
    assert!(pool.stockham_coverable(34, Precision::Single));
    let key = pool.ensure_stockham(34, Precision::Single).unwrap();
    let entry = pool.lookup(&key).unwrap();
    assert!(entry.runtime_compile);
    assert_eq!(entry.factors.iter().product::<usize>(), 34);
    assert!(entry.generator.is_some());

    // 23 is prime and outside the radix set.
    assert!(!pool.stockham_coverable(23, Precision::Single));
    assert!(pool.ensure_stockham(23, Precision::Single).is_err());
}

#[test]
fn wire_format_merge_adds_runtime_entries() {
    let text = r#"{
        "Version": 1,
        "Data": [
            {
                "Problem": { "arch": "gfx90a", "token": "len_9000_sp" },
                "Solutions": [
                    {
                        "SolutionKind": "SOL_KERNEL_ONLY",
                        "Kernel": {
                            "length": 9000,
                            "precision": "single",
                            "scheme": "CS_KERNEL_STOCKHAM",
                            "kernelConfig": {
                                "use_3steps": false,
                                "half_lds": true,
                                "dir_reg": true,
                                "buffer_inst": false,
                                "tpb": 2,
                                "wgs": 256,
                                "tpt": 128,
                                "factors": [10, 10, 10, 9],
                                "direction": 0,
                                "static_dim": 1,
                                "placement": "out-of-place",
                                "iAryType": "complex-interleaved",
                                "oAryType": "complex-interleaved"
                            }
                        }
                    },
                    { "SolutionKind": "SOL_DUMMY" }
                ]
            }
        ]
    }"#;
    let mut cat = Catalog::default();
    let added = cat.merge_wire_format(text).unwrap();
    assert_eq!(added, 1);
    let entry = cat
        .lookup(&KernelKey::new(Scheme::KernelStockham, 9000, Precision::Single))
        .unwrap();
    assert!(entry.runtime_compile);
    assert_eq!(entry.factors, vec![10, 10, 10, 9]);

    // Unknown versions are invalid payloads.
    let bad = text.replace("\"Version\": 1", "\"Version\": 99");
    assert!(cat.merge_wire_format(&bad).is_err());
    assert!(cat.merge_wire_format("not json").is_err());
}
