//! Runtime kernel generation.
//!
//! Lengths the offline tables miss are covered by generating device source
//! at plan-build time and compiling it through the driver's runtime
//! compiler. The generator emits a Stockham kernel skeleton around the
//! radix butterfly device functions; the butterfly bodies themselves live in
//! the device support header and are opaque to this layer. Compiled code
//! objects are memoized in the process-wide [`crate::cache::RtcCache`] keyed
//! by kernel name, GPU architecture, driver version, and a fingerprint of
//! the generating specification.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::cache;
use crate::catalog::{EmbeddedType, KernelEntry};
use crate::describe::Precision;
use crate::device::DeviceRuntime;
use crate::error::{FftError, Result};
use crate::scheme::Scheme;

/// Bumped whenever emitted source changes shape; folded into fingerprints so
/// stale cache entries never match a newer generator.
const GENERATOR_VERSION: u32 = 3;

/// The structured description the generator consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub length: usize,
    pub precision: Precision,
    pub scheme: Scheme,
    pub factors: Vec<usize>,
    pub threads_per_transform: usize,
    pub workgroup_size: usize,
    pub half_lds: bool,
    pub ebtype: EmbeddedType,
}

impl KernelSpec {
    pub fn from_entry(entry: &KernelEntry) -> Option<KernelSpec> {
        let g = entry.generator.as_ref()?;
        Some(KernelSpec {
            length: entry.key.length,
            precision: entry.key.precision,
            scheme: entry.key.scheme,
            factors: g.factors.clone(),
            threads_per_transform: g.threads_per_transform,
            workgroup_size: g.workgroup_size,
            half_lds: g.half_lds,
            ebtype: g.ebtype,
        })
    }

    /// Device entry point name, in the catalog's naming convention.
    pub fn kernel_name(&self) -> String {
        let prec = match self.precision {
            Precision::Single => "sp",
            Precision::Double => "dp",
        };
        let scheme = match self.scheme {
            Scheme::KernelStockham => "stoc",
            Scheme::KernelStockhamBlockCc => "sbcc",
            Scheme::KernelStockhamBlockRc => "sbrc",
            Scheme::KernelStockhamTranspose => "stoc_tr",
            Scheme::KernelR2cPostTranspose => "r2c_tr",
            Scheme::KernelTransposeC2rPre => "tr_c2r",
            _ => "misc",
        };
        format!("dfn_{prec}_ci_ci_{scheme}_{}", self.length)
    }

    /// Canonical text form hashed into the fingerprint.
    fn canonical(&self) -> String {
        format!(
            "len={};prec={:?};scheme={};factors={:?};tpt={};wgs={};half_lds={};ebtype={:?};gen={}",
            self.length,
            self.precision,
            self.scheme,
            self.factors,
            self.threads_per_transform,
            self.workgroup_size,
            self.half_lds,
            self.ebtype,
            GENERATOR_VERSION,
        )
    }

    pub fn fingerprint(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hasher.finalize().to_vec()
    }
}

/// Emit device source for `spec`.
///
/// The skeleton loads `threads_per_transform`-wide slices into LDS, runs one
/// butterfly pass per factor with the per-pass twiddle subtable, and stores
/// with the kernel's output layout. Butterfly device functions
/// (`fwd_radix<N>` / `inv_radix<N>`) come from the support header.
pub fn generate_source(spec: &KernelSpec) -> String {
    let scalar = match spec.precision {
        Precision::Single => "float2",
        Precision::Double => "double2",
    };
    let name = spec.kernel_name();
    let lds_elems = if spec.half_lds {
        spec.length / 2
    } else {
        spec.length
    };

    let mut src = String::new();
    let _ = writeln!(src, "// generated by rotorfft kernel generator v{GENERATOR_VERSION}");
    let _ = writeln!(src, "#include \"rotorfft_butterfly.h\"");
    let _ = writeln!(src);
    let _ = writeln!(
        src,
        "extern \"C\" __global__ __launch_bounds__({}) void {}(",
        spec.workgroup_size, name
    );
    let _ = writeln!(src, "    const {scalar}* __restrict__ twiddles,");
    let _ = writeln!(src, "    const {scalar}* __restrict__ twiddles_large,");
    let _ = writeln!(src, "    const {scalar}* __restrict__ buf_in,");
    let _ = writeln!(src, "    {scalar}* __restrict__ buf_out,");
    let _ = writeln!(src, "    const size_t* __restrict__ lengths,");
    let _ = writeln!(src, "    const size_t* __restrict__ stride_in,");
    let _ = writeln!(src, "    const size_t* __restrict__ stride_out,");
    let _ = writeln!(src, "    const int direction,");
    let _ = writeln!(src, "    const size_t batch,");
    let _ = writeln!(src, "    void* __restrict__ load_cb, void* __restrict__ load_cb_data,");
    let _ = writeln!(src, "    void* __restrict__ store_cb, void* __restrict__ store_cb_data)");
    let _ = writeln!(src, "{{");
    let _ = writeln!(
        src,
        "    __shared__ {scalar} lds[{} * {}];",
        lds_elems,
        spec.workgroup_size / spec.threads_per_transform.max(1)
    );
    let _ = writeln!(
        src,
        "    const size_t transform = blockIdx.x * {} + threadIdx.x / {};",
        spec.workgroup_size / spec.threads_per_transform.max(1),
        spec.threads_per_transform.max(1)
    );
    let _ = writeln!(src, "    if (transform >= batch) return;");
    let _ = writeln!(
        src,
        "    const unsigned int me = threadIdx.x % {};",
        spec.threads_per_transform.max(1)
    );
    let _ = writeln!(
        src,
        "    global_load_{}<{scalar}>(lds, buf_in, lengths, stride_in, transform, me, load_cb, load_cb_data);",
        if spec.ebtype == EmbeddedType::C2rPre { "c2r" } else { "lin" }
    );

    let mut twiddle_base = 0usize;
    let mut span = 1usize;
    for (pass, &radix) in spec.factors.iter().enumerate() {
        let _ = writeln!(src, "    __syncthreads();");
        let _ = writeln!(
            src,
            "    pass_radix{radix}<{scalar}, {span}>(lds, twiddles + {twiddle_base}, me, direction); // pass {pass}"
        );
        twiddle_base += (radix - 1) * span;
        span *= radix;
    }

    let _ = writeln!(src, "    __syncthreads();");
    match spec.scheme {
        Scheme::KernelStockhamBlockCc => {
            let _ = writeln!(
                src,
                "    apply_large_twiddle<{scalar}>(lds, twiddles_large, transform, me, direction);"
            );
            let _ = writeln!(
                src,
                "    global_store_col<{scalar}>(buf_out, lds, lengths, stride_out, transform, me, store_cb, store_cb_data);"
            );
        }
        Scheme::KernelStockhamBlockRc | Scheme::KernelStockhamTranspose => {
            let _ = writeln!(
                src,
                "    global_store_transposed<{scalar}>(buf_out, lds, lengths, stride_out, transform, me, store_cb, store_cb_data);"
            );
        }
        _ => {
            let store = if spec.ebtype == EmbeddedType::R2cPost {
                "r2c"
            } else {
                "lin"
            };
            let _ = writeln!(
                src,
                "    global_store_{store}<{scalar}>(buf_out, lds, lengths, stride_out, transform, me, store_cb, store_cb_data);"
            );
        }
    }
    let _ = writeln!(src, "}}");
    src
}

/// Compile `spec`, going through the process cache when it is live.
///
/// A cache miss invokes the runtime compiler and populates the cache (unless
/// the cache is read-only); compiler failure surfaces as
/// `unsupported-configuration` per the error policy.
pub fn compile_with_cache(spec: &KernelSpec, runtime: &dyn DeviceRuntime) -> Result<Vec<u8>> {
    let name = spec.kernel_name();
    let arch = runtime.arch();
    let driver_ver = runtime.driver_version();
    let fp = spec.fingerprint();

    if let Some(store) = cache::cache() {
        if let Some(code) = store.get(&name, &arch, driver_ver, &fp)? {
            log::debug!("rtc cache hit for {name}");
            return Ok(code);
        }
    }

    let source = generate_source(spec);
    let code = runtime.compile(&name, &source).map_err(|e| {
        FftError::unsupported(format!("runtime compilation of {name} failed: {e}"))
    })?;

    if let Some(store) = cache::cache() {
        store.put(&name, &arch, driver_ver, &fp, &code)?;
    }
    Ok(code)
}
