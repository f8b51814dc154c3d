use crate::catalog::{Catalog, EmbeddedType, KernelKey, KernelPool};
use crate::describe::Precision;
use crate::rtc::{generate_source, KernelSpec};
use crate::scheme::Scheme;

fn spec_for(len: usize) -> KernelSpec {
    let mut pool = KernelPool::new(Catalog::builtin());
    let key = pool.ensure_stockham(len, Precision::Single).unwrap();
    let entry = pool.lookup(&key).unwrap();
    KernelSpec::from_entry(entry).expect("generated entries carry recipes")
}

#[test]
fn kernel_names_encode_precision_scheme_and_length() {
    let spec = spec_for(1024);
    assert_eq!(spec.kernel_name(), "dfn_sp_ci_ci_stoc_1024");

    let mut dp = spec_for(1024);
    dp.precision = Precision::Double;
    assert_eq!(dp.kernel_name(), "dfn_dp_ci_ci_stoc_1024");

    let mut cc = spec_for(64);
    cc.scheme = Scheme::KernelStockhamBlockCc;
    assert_eq!(cc.kernel_name(), "dfn_sp_ci_ci_sbcc_64");
}

#[test]
fn source_emits_one_pass_per_factor() {
    let spec = spec_for(1024);
    let src = generate_source(&spec);
    assert!(src.contains(&spec.kernel_name()));
    for &radix in &spec.factors {
        assert!(
            src.contains(&format!("pass_radix{radix}<")),
            "missing radix-{radix} pass in generated source"
        );
    }
    // The last pass sees the accumulated twiddle offset.
    assert!(src.contains("__shared__ float2"));
    assert!(src.contains("extern \"C\" __global__"));
}

#[test]
fn source_is_deterministic() {
    let spec = spec_for(2304);
    assert_eq!(generate_source(&spec), generate_source(&spec));
}

#[test]
fn embedded_real_variants_change_the_store_path() {
    let mut spec = spec_for(64);
    spec.ebtype = EmbeddedType::R2cPost;
    spec.half_lds = false;
    let src = generate_source(&spec);
    assert!(src.contains("global_store_r2c"));

    spec.ebtype = EmbeddedType::C2rPre;
    let src = generate_source(&spec);
    assert!(src.contains("global_load_c2r"));
}

#[test]
fn fingerprints_separate_distinct_recipes() {
    let base = spec_for(1024);
    let fp = base.fingerprint();
    assert_eq!(fp.len(), 32);
    assert_eq!(fp, base.fingerprint());

    let mut other = base.clone();
    other.half_lds = !other.half_lds;
    assert_ne!(fp, other.fingerprint());

    let mut other = base.clone();
    other.workgroup_size *= 2;
    assert_ne!(fp, other.fingerprint());

    let mut other = base.clone();
    other.precision = Precision::Double;
    assert_ne!(fp, other.fingerprint());
}

#[test]
fn runtime_entries_round_trip_through_specs() {
    // Every runtime-compiled catalog entry must reproduce a spec, or the
    // compile stage cannot rebuild it.
    let mut pool = KernelPool::new(Catalog::builtin());
    let key = pool.ensure_stockham(34, Precision::Single).unwrap();
    let entry = pool.lookup(&key).unwrap();
    let spec = KernelSpec::from_entry(entry).unwrap();
    assert_eq!(spec.length, 34);
    assert_eq!(spec.factors.iter().product::<usize>(), 34);

    let builtin_rtc = Catalog::builtin()
        .lookup(&KernelKey::new(Scheme::KernelStockham, 2304, Precision::Single))
        .unwrap();
    assert!(builtin_rtc.runtime_compile);
    assert!(KernelSpec::from_entry(builtin_rtc).is_some());
}
