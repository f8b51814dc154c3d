//! The kernel catalog: every leaf kernel the runtime may dispatch.
//!
//! The catalog is immutable after process init. Entries are keyed by
//! `(scheme, length, second length, precision, sbrc variant)`; a lookup
//! either returns the single matching entry or tells the tree builder to try
//! a different decomposition. Offline-tuned tables can be merged in from the
//! JSON wire format before the catalog is frozen.
//!
//! Generic data-movement kernels (transposes, real pre/post processing,
//! Bluestein component kernels) are registered once under length 0 and match
//! any length.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::describe::Precision;
use crate::error::{FftError, Result};
use crate::scheme::{SbrcVariant, Scheme};

/// On-chip shared memory budget per workgroup.
pub const LDS_BYTE_BUDGET: usize = 64 * 1024;

/// Largest length a single Stockham kernel covers.
pub const MAX_SINGLE_KERNEL_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub scheme: Scheme,
    pub length: usize,
    /// Second dimension for fused 2D kernels, otherwise 0.
    pub length2: usize,
    pub precision: Precision,
    pub sbrc_variant: SbrcVariant,
}

impl KernelKey {
    pub fn new(scheme: Scheme, length: usize, precision: Precision) -> Self {
        KernelKey {
            scheme,
            length,
            length2: 0,
            precision,
            sbrc_variant: SbrcVariant::None,
        }
    }

    pub fn with_length2(mut self, length2: usize) -> Self {
        self.length2 = length2;
        self
    }

    pub fn with_sbrc_variant(mut self, variant: SbrcVariant) -> Self {
        self.sbrc_variant = variant;
        self
    }
}

/// Parameters needed to re-create a runtime-compiled kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub factors: Vec<usize>,
    pub threads_per_transform: usize,
    pub workgroup_size: usize,
    pub half_lds: bool,
    /// Embedded real pre/post processing type compiled into the kernel.
    pub ebtype: EmbeddedType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedType {
    #[default]
    None,
    R2cPost,
    C2rPre,
}

/// One dispatchable kernel with its launch shape constraints.
#[derive(Debug, Clone)]
pub struct KernelEntry {
    pub key: KernelKey,
    /// Threads per workgroup.
    pub workgroup_size: usize,
    /// Threads cooperating on one transform (per dimension for 2D).
    pub threads_per_transform: [usize; 2],
    pub transforms_per_block: usize,
    pub factors: Vec<usize>,
    /// Second-dimension factors for fused 2D kernels.
    pub factors2: Vec<usize>,
    pub half_lds: bool,
    /// Whether the kernel applies the decomposed 3-step large twiddle,
    /// per precision (single, double).
    pub use_3steps_large_twd: [bool; 2],
    /// Tile rows an SBCC/SBRC kernel carries per block.
    pub block_width: usize,
    pub requires_unit_stride: bool,
    pub supports_strided: bool,
    /// SBCC only: the store side can absorb a following transpose.
    pub folds_output_transpose: bool,
    pub runtime_compile: bool,
    pub generator: Option<GeneratorParams>,
    /// Compile-time dimension count baked into 2D/3D kernels (0 = dynamic).
    pub static_dim: usize,
}

impl KernelEntry {
    /// LDS bytes this kernel requests at launch.
    pub fn lds_bytes(&self) -> usize {
        let elems = if self.key.scheme == Scheme::Kernel2dSingle {
            self.key.length * self.key.length2 * self.transforms_per_block
        } else {
            self.key.length * self.transforms_per_block.max(self.block_width.max(1))
        };
        let bytes = elems * self.key.precision.complex_bytes();
        if self.half_lds {
            bytes / 2
        } else {
            bytes
        }
    }

    pub fn use_large_twiddle(&self) -> bool {
        match self.key.precision {
            Precision::Single => self.use_3steps_large_twd[0],
            Precision::Double => self.use_3steps_large_twd[1],
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<KernelKey, KernelEntry>,
    lengths_by_scheme: HashMap<Scheme, Vec<usize>>,
}

impl Catalog {
    /// The process-wide catalog, built once from the generator tables.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(build_builtin)
    }

    fn insert(&mut self, entry: KernelEntry) {
        let lens = self.lengths_by_scheme.entry(entry.key.scheme).or_default();
        if entry.key.length != 0 && !lens.contains(&entry.key.length) {
            lens.push(entry.key.length);
            lens.sort_unstable();
        }
        self.entries.insert(entry.key, entry);
    }

    /// Exact lookup; generic (length-0) kernels match any length.
    pub fn lookup(&self, key: &KernelKey) -> Option<&KernelEntry> {
        self.entries.get(key).or_else(|| {
            let generic = KernelKey {
                length: 0,
                length2: 0,
                ..*key
            };
            self.entries.get(&generic)
        })
    }

    pub fn has(&self, scheme: Scheme, length: usize, precision: Precision) -> bool {
        self.lookup(&KernelKey::new(scheme, length, precision)).is_some()
    }

    /// Sorted lengths with a dedicated entry for `scheme` (generic entries
    /// excluded). Used when factoring a long transform into kernel products.
    pub fn supported_lengths(&self, scheme: Scheme) -> &[usize] {
        self.lengths_by_scheme
            .get(&scheme)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Merge offline-tuned solutions from the JSON wire format. Returns how
    /// many kernel entries were added.
    pub fn merge_wire_format(&mut self, text: &str) -> Result<usize> {
        let file: CatalogFile = serde_json::from_str(text)
            .map_err(|e| FftError::invalid(format!("malformed catalog payload: {e}")))?;
        if file.version != CATALOG_WIRE_VERSION {
            return Err(FftError::invalid(format!(
                "catalog wire version {} not supported",
                file.version
            )));
        }
        let mut added = 0usize;
        for problem in &file.data {
            for sol in &problem.solutions {
                if sol.kind != SolutionKind::KernelOnly {
                    continue;
                }
                let Some(kernel) = &sol.kernel else { continue };
                let entry = kernel.to_entry()?;
                self.insert(entry);
                added += 1;
            }
        }
        Ok(added)
    }
}

// ============================================================================
// Per-plan overlay
// ============================================================================

/// The builtin catalog plus the runtime-compiled entries one plan has
/// synthesized for lengths the offline tables do not cover.
#[derive(Debug)]
pub struct KernelPool<'a> {
    base: &'a Catalog,
    extra: HashMap<KernelKey, KernelEntry>,
}

impl<'a> KernelPool<'a> {
    pub fn new(base: &'a Catalog) -> Self {
        KernelPool {
            base,
            extra: HashMap::new(),
        }
    }

    pub fn lookup(&self, key: &KernelKey) -> Option<&KernelEntry> {
        self.extra.get(key).or_else(|| self.base.lookup(key))
    }

    pub fn supported_lengths(&self, scheme: Scheme) -> &[usize] {
        self.base.supported_lengths(scheme)
    }

    /// Whether a single Stockham kernel can cover `len`, either from the
    /// tables or through the runtime generator.
    pub fn stockham_coverable(&self, len: usize, precision: Precision) -> bool {
        if self.base.has(Scheme::KernelStockham, len, precision) {
            return true;
        }
        len <= MAX_SINGLE_KERNEL_LEN
            && crate::factor::is_factorable(len, crate::factor::GENERATOR_RADICES)
    }

    /// Resolve the Stockham kernel key for `len`, synthesizing a
    /// runtime-compiled entry when the tables miss.
    pub fn ensure_stockham(&mut self, len: usize, precision: Precision) -> Result<KernelKey> {
        let key = KernelKey::new(Scheme::KernelStockham, len, precision);
        if self.lookup(&key).is_some() {
            return Ok(key);
        }
        if len > MAX_SINGLE_KERNEL_LEN {
            return Err(FftError::unsupported(format!(
                "length {len} exceeds the single-kernel budget"
            )));
        }
        let factors = crate::factor::factorize(len, crate::factor::GENERATOR_RADICES)
            .ok_or_else(|| {
                FftError::unsupported(format!("length {len} has no supported factorization"))
            })?;
        let min_factor = *factors.iter().min().expect("factorization nonempty");
        let tpt = (len / min_factor).max(1);
        let wgs = [64usize, 128, 256, 512]
            .into_iter()
            .find(|&w| w >= tpt)
            .unwrap_or(512);
        log::debug!("synthesizing runtime Stockham kernel for length {len}");
        self.extra.insert(
            key,
            KernelEntry {
                key,
                workgroup_size: wgs,
                threads_per_transform: [tpt, 0],
                transforms_per_block: (wgs / tpt).max(1),
                factors: factors.clone(),
                factors2: Vec::new(),
                half_lds: true,
                use_3steps_large_twd: [false, false],
                block_width: 0,
                requires_unit_stride: false,
                supports_strided: true,
                folds_output_transpose: false,
                runtime_compile: true,
                generator: Some(GeneratorParams {
                    factors,
                    threads_per_transform: tpt,
                    workgroup_size: wgs,
                    half_lds: true,
                    ebtype: EmbeddedType::None,
                }),
                static_dim: 0,
            },
        );
        Ok(key)
    }

}

// ============================================================================
// Wire format (offline-generated solution tables)
// ============================================================================

pub const CATALOG_WIRE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(rename = "Version")]
    pub version: u32,
    #[serde(rename = "Data")]
    pub data: Vec<ProblemEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemEntry {
    #[serde(rename = "Problem")]
    pub problem: Problem,
    #[serde(rename = "Solutions")]
    pub solutions: Vec<Solution>,
}

/// A tuned problem: target architecture plus the problem token the tuner
/// derived from the transform description.
#[derive(Debug, Serialize, Deserialize)]
pub struct Problem {
    pub arch: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionKind {
    #[serde(rename = "SOL_KERNEL_ONLY")]
    KernelOnly,
    #[serde(rename = "SOL_LEAF_NODE")]
    LeafNode,
    #[serde(rename = "SOL_INTERNAL_NODE")]
    InternalNode,
    #[serde(rename = "SOL_DUMMY")]
    Dummy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Solution {
    #[serde(rename = "SolutionKind")]
    pub kind: SolutionKind,
    /// Kernel payload for `SOL_KERNEL_ONLY`.
    #[serde(rename = "Kernel", default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<KernelSolution>,
    /// Child solution indices for leaf/internal nodes.
    #[serde(rename = "Children", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelSolution {
    pub length: usize,
    #[serde(default)]
    pub length2: usize,
    pub precision: Precision,
    pub scheme: String,
    #[serde(default)]
    pub sbrc_variant: String,
    #[serde(rename = "kernelConfig")]
    pub config: KernelConfig,
}

/// Tuning knobs recorded for an offline-generated kernel.
#[derive(Debug, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub use_3steps: bool,
    #[serde(default)]
    pub half_lds: bool,
    /// Keep butterfly data in registers between passes.
    #[serde(default)]
    pub dir_reg: bool,
    /// Use buffer load/store instructions instead of flat addressing.
    #[serde(default)]
    pub buffer_inst: bool,
    pub tpb: usize,
    pub wgs: usize,
    pub tpt: usize,
    pub factors: Vec<usize>,
    #[serde(default)]
    pub ebtype: EmbeddedType,
    /// -1 forward, 1 inverse, 0 either.
    #[serde(default)]
    pub direction: i32,
    #[serde(default)]
    pub static_dim: usize,
    #[serde(default)]
    pub placement: String,
    #[serde(rename = "iAryType", default)]
    pub i_ary_type: String,
    #[serde(rename = "oAryType", default)]
    pub o_ary_type: String,
}

impl KernelSolution {
    fn to_entry(&self) -> Result<KernelEntry> {
        let scheme = parse_scheme_token(&self.scheme)?;
        let variant = match self.sbrc_variant.as_str() {
            "" | "NONE" => SbrcVariant::None,
            "SBRC_XY_Z" => SbrcVariant::XyZ,
            "SBRC_Z_XY" => SbrcVariant::ZXy,
            "SBRC_ERC_Z_XY" => SbrcVariant::ErcZXy,
            other => {
                return Err(FftError::invalid(format!("unknown sbrc variant {other}")));
            }
        };
        let key = KernelKey {
            scheme,
            length: self.length,
            length2: self.length2,
            precision: self.precision,
            sbrc_variant: variant,
        };
        Ok(KernelEntry {
            key,
            workgroup_size: self.config.wgs,
            threads_per_transform: [self.config.tpt, 0],
            transforms_per_block: self.config.tpb,
            factors: self.config.factors.clone(),
            factors2: Vec::new(),
            half_lds: self.config.half_lds,
            use_3steps_large_twd: [self.config.use_3steps, self.config.use_3steps],
            block_width: 0,
            requires_unit_stride: false,
            supports_strided: true,
            folds_output_transpose: false,
            runtime_compile: true,
            generator: Some(GeneratorParams {
                factors: self.config.factors.clone(),
                threads_per_transform: self.config.tpt,
                workgroup_size: self.config.wgs,
                half_lds: self.config.half_lds,
                ebtype: self.config.ebtype,
            }),
            static_dim: self.config.static_dim,
        })
    }
}

pub fn parse_scheme_token(token: &str) -> Result<Scheme> {
    Ok(match token {
        "CS_KERNEL_STOCKHAM" => Scheme::KernelStockham,
        "CS_KERNEL_STOCKHAM_BLOCK_CC" => Scheme::KernelStockhamBlockCc,
        "CS_KERNEL_STOCKHAM_BLOCK_RC" => Scheme::KernelStockhamBlockRc,
        "CS_KERNEL_TRANSPOSE" => Scheme::KernelTranspose,
        "CS_KERNEL_2D_SINGLE" => Scheme::Kernel2dSingle,
        "CS_KERNEL_R2C_POST" => Scheme::KernelR2cPost,
        "CS_KERNEL_C2R_PRE" => Scheme::KernelC2rPre,
        other => {
            return Err(FftError::invalid(format!("unknown scheme token {other}")));
        }
    })
}

// ============================================================================
// Builtin tables
// ============================================================================

struct Seed {
    len: usize,
    wgs: usize,
    tpt: usize,
    factors: &'static [usize],
    half_lds: bool,
    rtc: bool,
}

const fn s(len: usize, wgs: usize, tpt: usize, factors: &'static [usize]) -> Seed {
    Seed {
        len,
        wgs,
        tpt,
        factors,
        half_lds: true,
        rtc: false,
    }
}

const fn s_nh(len: usize, wgs: usize, tpt: usize, factors: &'static [usize]) -> Seed {
    Seed {
        len,
        wgs,
        tpt,
        factors,
        half_lds: false,
        rtc: false,
    }
}

const fn s_rtc(len: usize, wgs: usize, tpt: usize, factors: &'static [usize]) -> Seed {
    Seed {
        len,
        wgs,
        tpt,
        factors,
        half_lds: true,
        rtc: true,
    }
}

/// Single-kernel Stockham lengths with their tuned launch shapes.
#[rustfmt::skip]
const STOCKHAM_SEEDS: &[Seed] = &[
    s(1, 64, 1, &[1]),          s(2, 64, 1, &[2]),          s(3, 64, 1, &[3]),
    s(4, 128, 1, &[4]),         s(5, 128, 1, &[5]),         s(6, 128, 1, &[6]),
    s(7, 64, 1, &[7]),          s(8, 64, 4, &[4, 2]),       s(9, 64, 3, &[3, 3]),
    s(10, 64, 1, &[10]),        s(11, 128, 1, &[11]),       s(12, 128, 6, &[6, 2]),
    s(13, 64, 1, &[13]),        s(14, 128, 7, &[7, 2]),     s(15, 128, 5, &[3, 5]),
    s(16, 64, 4, &[4, 4]),      s(17, 256, 1, &[17]),       s(18, 64, 6, &[3, 6]),
    s(20, 256, 10, &[5, 4]),    s(21, 128, 7, &[3, 7]),     s(22, 64, 2, &[11, 2]),
    s(24, 256, 8, &[8, 3]),     s(25, 256, 5, &[5, 5]),     s(26, 64, 2, &[13, 2]),
    s(27, 256, 9, &[3, 3, 3]),  s(28, 64, 4, &[7, 4]),      s(30, 128, 10, &[10, 3]),
    s(32, 64, 16, &[16, 2]),    s(36, 64, 6, &[6, 6]),      s(40, 128, 10, &[10, 4]),
    s(42, 256, 7, &[7, 6]),     s(44, 64, 4, &[11, 4]),     s(45, 128, 15, &[5, 3, 3]),
    s(48, 64, 16, &[4, 3, 4]),  s(49, 64, 7, &[7, 7]),      s(50, 256, 10, &[10, 5]),
    s(52, 64, 4, &[13, 4]),     s(54, 256, 18, &[6, 3, 3]), s(56, 128, 8, &[7, 8]),
    s(60, 64, 10, &[6, 10]),    s(64, 64, 16, &[4, 4, 4]),  s(72, 64, 9, &[8, 3, 3]),
    s(75, 256, 25, &[5, 5, 3]), s(80, 64, 10, &[5, 2, 8]),  s(81, 128, 27, &[3, 3, 3, 3]),
    s(84, 128, 12, &[7, 2, 6]), s(88, 128, 11, &[11, 8]),   s(90, 64, 9, &[3, 3, 10]),
    s_nh(96, 128, 16, &[6, 16]),
    s(100, 64, 10, &[10, 10]),  s(104, 64, 8, &[13, 8]),    s(108, 256, 36, &[6, 6, 3]),
    s_nh(112, 256, 16, &[16, 7]),
    s(120, 64, 12, &[6, 10, 2]), s(121, 128, 11, &[11, 11]),
    s_nh(125, 256, 25, &[5, 5, 5]),
    s(128, 256, 16, &[16, 8]),  s(135, 128, 9, &[5, 3, 3, 3]), s(144, 128, 12, &[6, 6, 4]),
    s(150, 64, 5, &[10, 5, 3]), s(160, 256, 16, &[16, 10]), s(162, 256, 27, &[6, 3, 3, 3]),
    s_nh(168, 256, 56, &[8, 7, 3]),
    s(169, 256, 13, &[13, 13]), s(176, 64, 16, &[11, 16]),
    s_nh(180, 256, 60, &[10, 6, 3]),
    s(192, 128, 16, &[6, 4, 4, 2]), s(200, 64, 20, &[10, 10, 2]), s(208, 64, 16, &[13, 16]),
    s(216, 256, 36, &[6, 6, 6]), s(224, 64, 16, &[7, 2, 2, 2, 2, 2]), s(225, 256, 75, &[5, 5, 3, 3]),
    s(240, 128, 48, &[8, 5, 6]), s(243, 256, 81, &[3, 3, 3, 3, 3]), s(250, 128, 25, &[10, 5, 5]),
    s(256, 64, 64, &[4, 4, 4, 4]), s(270, 128, 27, &[10, 3, 3, 3]), s(272, 128, 17, &[16, 17]),
    s(288, 128, 24, &[6, 6, 4, 2]), s(300, 64, 30, &[10, 10, 3]), s(320, 64, 16, &[10, 4, 4, 2]),
    s(324, 64, 54, &[3, 6, 6, 3]), s(336, 128, 56, &[8, 7, 6]), s(343, 256, 49, &[7, 7, 7]),
    s(360, 256, 60, &[10, 6, 6]), s(375, 128, 25, &[5, 5, 5, 3]), s(384, 128, 32, &[6, 4, 4, 4]),
    s(400, 128, 40, &[4, 10, 10]), s(405, 128, 27, &[5, 3, 3, 3, 3]), s(432, 64, 27, &[3, 16, 3, 3]),
    s(450, 128, 30, &[10, 5, 3, 3]), s(480, 64, 16, &[10, 8, 6]), s(486, 256, 162, &[6, 3, 3, 3, 3]),
    s(500, 128, 100, &[10, 5, 10]), s(512, 64, 64, &[8, 8, 8]), s(528, 64, 48, &[4, 4, 3, 11]),
    s(540, 256, 54, &[3, 10, 6, 3]), s(576, 128, 96, &[16, 6, 6]), s(600, 64, 60, &[10, 6, 10]),
    s(625, 128, 125, &[5, 5, 5, 5]), s(640, 128, 64, &[8, 10, 8]), s(648, 256, 216, &[8, 3, 3, 3, 3]),
    s(675, 256, 225, &[5, 5, 3, 3, 3]), s(720, 256, 120, &[10, 3, 8, 3]), s(729, 256, 243, &[3, 3, 3, 3, 3, 3]),
    s(750, 256, 250, &[10, 5, 3, 5]), s(768, 64, 48, &[16, 3, 16]), s(800, 256, 160, &[16, 5, 10]),
    s(810, 128, 81, &[3, 10, 3, 3, 3]), s(864, 64, 54, &[3, 6, 16, 3]), s(900, 256, 90, &[10, 10, 3, 3]),
    s_nh(960, 256, 160, &[16, 10, 6]),
    s(972, 256, 162, &[3, 6, 3, 6, 3]), s(1000, 128, 100, &[10, 10, 10]), s(1024, 128, 128, &[8, 8, 4, 4]),
    s(1040, 256, 208, &[13, 16, 5]), s(1080, 256, 108, &[6, 10, 6, 3]), s(1125, 256, 225, &[5, 5, 3, 3, 5]),
    s(1152, 256, 144, &[4, 3, 8, 3, 4]), s(1200, 256, 75, &[5, 5, 16, 3]), s(1215, 256, 243, &[5, 3, 3, 3, 3, 3]),
    s(1250, 256, 250, &[5, 10, 5, 5]), s(1280, 128, 80, &[16, 5, 16]), s(1296, 128, 108, &[6, 6, 6, 6]),
    s(1350, 256, 135, &[5, 10, 3, 3, 3]), s(1440, 128, 90, &[10, 16, 3, 3]), s(1458, 256, 243, &[6, 3, 3, 3, 3, 3]),
    s(1500, 256, 150, &[5, 10, 10, 3]), s(1536, 256, 256, &[16, 16, 6]), s(1600, 256, 100, &[10, 16, 10]),
    s(1620, 256, 162, &[10, 3, 3, 6, 3]), s(1728, 128, 108, &[3, 6, 6, 16]), s(1800, 256, 180, &[10, 6, 10, 3]),
    s(1875, 256, 125, &[5, 5, 5, 5, 3]), s(1920, 256, 120, &[10, 6, 16, 2]), s(1944, 256, 243, &[3, 3, 3, 3, 8, 3]),
    s(2000, 128, 125, &[5, 5, 5, 16]), s(2025, 256, 135, &[3, 3, 5, 5, 3, 3]), s(2048, 256, 256, &[16, 16, 8]),
    s(2160, 256, 60, &[10, 6, 6, 6]), s(2187, 256, 243, &[3, 3, 3, 3, 3, 3, 3]), s(2250, 256, 90, &[10, 3, 5, 3, 5]),
    s_rtc(2304, 256, 192, &[6, 6, 4, 4, 4]),
    s(2400, 256, 240, &[4, 10, 10, 6]), s(2430, 256, 81, &[10, 3, 3, 3, 3, 3]), s(2500, 256, 250, &[10, 5, 10, 5]),
    s(2560, 128, 128, &[4, 4, 4, 10, 4]), s(2592, 256, 216, &[6, 6, 6, 6, 2]), s(2700, 128, 90, &[3, 10, 10, 3, 3]),
    s(2880, 256, 96, &[10, 6, 6, 2, 2, 2]), s(2916, 256, 243, &[6, 6, 3, 3, 3, 3]), s(3000, 128, 100, &[10, 3, 10, 10]),
    s(3072, 256, 256, &[6, 4, 4, 4, 4, 2]), s(3125, 128, 125, &[5, 5, 5, 5, 5]), s(3200, 256, 160, &[10, 10, 4, 4, 2]),
    s(3240, 128, 108, &[3, 3, 10, 6, 6]), s(3375, 256, 225, &[5, 5, 5, 3, 3, 3]), s(3456, 256, 144, &[6, 6, 6, 4, 4]),
    s(3600, 256, 120, &[10, 10, 6, 6]), s(3645, 256, 243, &[5, 3, 3, 3, 3, 3, 3]), s(3750, 256, 125, &[3, 5, 5, 10, 5]),
    s(3840, 256, 128, &[10, 6, 2, 2, 2, 2, 2, 2]), s(3888, 512, 324, &[16, 3, 3, 3, 3, 3]), s(4000, 256, 200, &[10, 10, 10, 4]),
    s(4050, 256, 135, &[10, 5, 3, 3, 3, 3]), s(4096, 256, 256, &[16, 16, 16]),
];

struct SbccSeed {
    len: usize,
    factors: &'static [usize],
    use3: [bool; 2],
    wgs: usize,
}

const fn c(len: usize, factors: &'static [usize], sp: bool, dp: bool, wgs: usize) -> SbccSeed {
    SbccSeed {
        len,
        factors,
        use3: [sp, dp],
        wgs,
    }
}

/// Block column-column kernels; `wgs == 0` means the default 16-wide tile
/// sizing (16 · len / min(factor)).
#[rustfmt::skip]
const SBCC_SEEDS: &[SbccSeed] = &[
    c(50, &[10, 5], true, true, 256),    c(52, &[13, 4], true, true, 0),
    c(60, &[6, 10], false, false, 0),    c(64, &[8, 8], true, false, 0),
    c(72, &[8, 3, 3], true, false, 0),   c(80, &[10, 8], false, false, 0),
    c(81, &[3, 3, 3, 3], true, true, 0), c(84, &[7, 2, 6], true, true, 0),
    c(96, &[6, 16], false, false, 0),    c(100, &[5, 5, 4], true, false, 100),
    c(104, &[13, 8], true, false, 0),    c(108, &[6, 6, 3], true, false, 0),
    c(112, &[4, 7, 4], false, false, 0), c(128, &[8, 4, 4], true, true, 256),
    c(160, &[4, 10, 4], false, false, 0), c(168, &[7, 6, 4], true, false, 128),
    c(200, &[8, 5, 5], false, false, 0), c(208, &[13, 16], false, false, 0),
    c(216, &[8, 3, 3, 3], false, false, 0), c(224, &[8, 7, 4], false, false, 0),
    c(240, &[8, 5, 6], false, false, 0), c(256, &[8, 4, 8], true, false, 0),
    c(336, &[6, 7, 8], false, false, 0),
];

struct SbrcSeed {
    len: usize,
    factors: &'static [usize],
    wgs: usize,
    tpt: usize,
    bw: usize,
}

#[rustfmt::skip]
const SBRC_SEEDS: &[SbrcSeed] = &[
    SbrcSeed { len: 50, factors: &[10, 5], wgs: 50, tpt: 5, bw: 10 },
    SbrcSeed { len: 64, factors: &[4, 4, 4], wgs: 128, tpt: 16, bw: 16 },
    SbrcSeed { len: 81, factors: &[3, 3, 3, 3], wgs: 81, tpt: 27, bw: 9 },
    SbrcSeed { len: 100, factors: &[5, 5, 4], wgs: 100, tpt: 25, bw: 4 },
    SbrcSeed { len: 128, factors: &[8, 4, 4], wgs: 128, tpt: 16, bw: 8 },
    SbrcSeed { len: 200, factors: &[10, 10, 2], wgs: 100, tpt: 10, bw: 10 },
    SbrcSeed { len: 256, factors: &[4, 4, 4, 4], wgs: 256, tpt: 64, bw: 8 },
];

struct Seed2d {
    len: [usize; 2],
    factors: (&'static [usize], &'static [usize]),
    tpt: [usize; 2],
    wgs: usize,
}

const fn d(
    l0: usize,
    l1: usize,
    f0: &'static [usize],
    f1: &'static [usize],
    t0: usize,
    t1: usize,
    wgs: usize,
) -> Seed2d {
    Seed2d {
        len: [l0, l1],
        factors: (f0, f1),
        tpt: [t0, t1],
        wgs,
    }
}

/// Fused 2D kernels: both dimensions transformed in one LDS-resident pass.
#[rustfmt::skip]
const SINGLE_2D_SEEDS: &[Seed2d] = &[
    d(4, 4, &[2, 2], &[2, 2], 2, 2, 8),       d(4, 8, &[2, 2], &[4, 2], 2, 2, 16),
    d(4, 9, &[2, 2], &[3, 3], 2, 3, 18),      d(4, 16, &[2, 2], &[4, 4], 2, 4, 32),
    d(4, 25, &[2, 2], &[5, 5], 2, 5, 50),     d(4, 27, &[2, 2], &[3, 3, 3], 2, 9, 54),
    d(4, 32, &[2, 2], &[8, 4], 2, 4, 64),     d(4, 64, &[2, 2], &[4, 4, 4], 2, 16, 128),
    d(4, 81, &[2, 2], &[3, 3, 3, 3], 2, 27, 162), d(4, 125, &[2, 2], &[5, 5, 5], 2, 25, 250),
    d(4, 128, &[2, 2], &[8, 4, 4], 2, 16, 256), d(4, 243, &[2, 2], &[3, 3, 3, 3, 3], 2, 81, 486),
    d(4, 256, &[2, 2], &[4, 4, 4, 4], 2, 64, 512),
    d(8, 4, &[4, 2], &[2, 2], 2, 2, 16),      d(8, 8, &[4, 2], &[4, 2], 2, 2, 16),
    d(8, 9, &[4, 2], &[3, 3], 2, 3, 24),      d(8, 16, &[4, 2], &[4, 4], 2, 4, 32),
    d(8, 25, &[4, 2], &[5, 5], 2, 5, 50),     d(8, 27, &[4, 2], &[3, 3, 3], 2, 9, 72),
    d(8, 32, &[4, 2], &[8, 4], 2, 4, 64),     d(8, 64, &[4, 2], &[4, 4, 4], 2, 16, 128),
    d(8, 81, &[4, 2], &[3, 3, 3, 3], 2, 27, 216), d(8, 125, &[4, 2], &[5, 5, 5], 2, 25, 250),
    d(8, 128, &[4, 2], &[8, 4, 4], 2, 16, 256), d(8, 243, &[4, 2], &[3, 3, 3, 3, 3], 2, 81, 648),
    d(8, 256, &[4, 2], &[4, 4, 4, 4], 2, 64, 512),
    d(9, 4, &[3, 3], &[2, 2], 3, 2, 18),      d(9, 8, &[3, 3], &[4, 2], 3, 2, 24),
    d(9, 9, &[3, 3], &[3, 3], 3, 3, 27),      d(9, 16, &[3, 3], &[4, 4], 3, 4, 48),
    d(9, 25, &[3, 3], &[5, 5], 3, 5, 75),     d(9, 27, &[3, 3], &[3, 3, 3], 3, 9, 81),
    d(9, 32, &[3, 3], &[8, 4], 3, 4, 96),     d(9, 64, &[3, 3], &[4, 4, 4], 3, 16, 192),
    d(9, 81, &[3, 3], &[3, 3, 3, 3], 3, 27, 243), d(9, 125, &[3, 3], &[5, 5, 5], 3, 25, 375),
    d(9, 128, &[3, 3], &[8, 4, 4], 3, 16, 384), d(9, 243, &[3, 3], &[3, 3, 3, 3, 3], 3, 81, 729),
    d(9, 256, &[3, 3], &[4, 4, 4, 4], 3, 64, 768),
    d(16, 4, &[4, 4], &[2, 2], 4, 2, 32),     d(16, 8, &[4, 4], &[4, 2], 4, 2, 32),
    d(16, 9, &[4, 4], &[3, 3], 4, 3, 48),     d(16, 16, &[4, 4], &[4, 4], 4, 4, 64),
    d(16, 25, &[4, 4], &[5, 5], 4, 5, 100),   d(16, 27, &[4, 4], &[3, 3, 3], 4, 9, 144),
    d(16, 32, &[4, 4], &[8, 4], 4, 4, 128),   d(16, 64, &[4, 4], &[4, 4, 4], 4, 16, 256),
    d(16, 81, &[4, 4], &[3, 3, 3, 3], 4, 27, 432), d(16, 125, &[4, 4], &[5, 5, 5], 4, 25, 500),
    d(16, 128, &[4, 4], &[8, 4, 4], 4, 16, 512),
    d(25, 4, &[5, 5], &[2, 2], 5, 2, 50),     d(25, 8, &[5, 5], &[4, 2], 5, 2, 50),
    d(25, 9, &[5, 5], &[3, 3], 5, 3, 75),     d(25, 16, &[5, 5], &[4, 4], 5, 4, 100),
    d(25, 25, &[5, 5], &[5, 5], 5, 5, 125),   d(25, 27, &[5, 5], &[3, 3, 3], 5, 9, 225),
    d(25, 32, &[5, 5], &[8, 4], 5, 4, 160),   d(25, 64, &[5, 5], &[4, 4, 4], 5, 16, 400),
    d(25, 81, &[5, 5], &[3, 3, 3, 3], 5, 27, 675), d(25, 125, &[5, 5], &[5, 5, 5], 5, 25, 625),
    d(25, 128, &[5, 5], &[8, 4, 4], 5, 16, 640),
    d(27, 4, &[3, 3, 3], &[2, 2], 9, 2, 54),  d(27, 8, &[3, 3, 3], &[4, 2], 9, 2, 72),
    d(27, 9, &[3, 3, 3], &[3, 3], 9, 3, 81),  d(27, 16, &[3, 3, 3], &[4, 4], 9, 4, 144),
    d(27, 25, &[3, 3, 3], &[5, 5], 9, 5, 225), d(27, 27, &[3, 3, 3], &[3, 3, 3], 9, 9, 243),
    d(27, 32, &[3, 3, 3], &[8, 4], 9, 4, 288), d(27, 64, &[3, 3, 3], &[4, 4, 4], 9, 16, 576),
    d(27, 81, &[3, 3, 3], &[3, 3, 3, 3], 9, 27, 729),
    d(32, 4, &[8, 4], &[2, 2], 4, 2, 64),     d(32, 8, &[8, 4], &[4, 2], 4, 2, 64),
    d(32, 9, &[8, 4], &[3, 3], 4, 3, 96),     d(32, 16, &[8, 4], &[4, 4], 4, 4, 128),
    d(32, 25, &[8, 4], &[5, 5], 4, 5, 160),   d(32, 27, &[8, 4], &[3, 3, 3], 4, 9, 288),
    d(32, 32, &[8, 4], &[8, 4], 4, 4, 128),   d(32, 64, &[8, 4], &[4, 4, 4], 4, 16, 512),
    d(32, 81, &[8, 4], &[3, 3, 3, 3], 4, 27, 864), d(32, 125, &[8, 4], &[5, 5, 5], 4, 25, 800),
    d(32, 128, &[8, 4], &[8, 4, 4], 4, 16, 512),
    d(64, 4, &[4, 4, 4], &[2, 2], 16, 2, 128), d(64, 8, &[4, 4, 4], &[4, 2], 16, 2, 128),
    d(64, 9, &[4, 4, 4], &[3, 3], 16, 3, 192), d(64, 16, &[4, 4, 4], &[4, 4], 16, 4, 256),
    d(64, 25, &[4, 4, 4], &[5, 5], 16, 5, 400), d(64, 27, &[4, 4, 4], &[3, 3, 3], 16, 9, 576),
    d(64, 32, &[4, 4, 4], &[8, 4], 16, 4, 512),
    d(81, 4, &[3, 3, 3, 3], &[2, 2], 27, 2, 162), d(81, 8, &[3, 3, 3, 3], &[4, 2], 27, 2, 216),
    d(81, 9, &[3, 3, 3, 3], &[3, 3], 27, 3, 243), d(81, 16, &[3, 3, 3, 3], &[4, 4], 27, 4, 432),
    d(81, 25, &[3, 3, 3, 3], &[5, 5], 27, 5, 675), d(81, 27, &[3, 3, 3, 3], &[3, 3, 3], 27, 9, 729),
    d(81, 32, &[3, 3, 3, 3], &[8, 4], 27, 4, 864),
    d(125, 4, &[5, 5, 5], &[2, 2], 25, 2, 250), d(125, 8, &[5, 5, 5], &[4, 2], 25, 2, 250),
    d(125, 9, &[5, 5, 5], &[3, 3], 25, 3, 375), d(125, 16, &[5, 5, 5], &[4, 4], 25, 4, 500),
    d(125, 25, &[5, 5, 5], &[5, 5], 25, 5, 625), d(125, 32, &[5, 5, 5], &[8, 4], 25, 4, 800),
    d(128, 4, &[8, 4, 4], &[2, 2], 16, 2, 256), d(128, 8, &[8, 4, 4], &[4, 2], 16, 2, 256),
    d(128, 9, &[8, 4, 4], &[3, 3], 16, 3, 384), d(128, 16, &[8, 4, 4], &[4, 4], 16, 4, 512),
    d(128, 25, &[8, 4, 4], &[5, 5], 16, 5, 640), d(128, 32, &[8, 4, 4], &[8, 4], 16, 4, 512),
    d(243, 4, &[3, 3, 3, 3, 3], &[2, 2], 81, 2, 486), d(243, 8, &[3, 3, 3, 3, 3], &[4, 2], 81, 2, 648),
    d(243, 9, &[3, 3, 3, 3, 3], &[3, 3], 81, 3, 729),
    d(256, 4, &[4, 4, 4, 4], &[2, 2], 64, 2, 512), d(256, 8, &[4, 4, 4, 4], &[4, 2], 64, 2, 512),
    d(256, 9, &[4, 4, 4, 4], &[3, 3], 64, 3, 768),
];

fn build_builtin() -> Catalog {
    let mut cat = Catalog::default();

    for precision in [Precision::Single, Precision::Double] {
        for seed in STOCKHAM_SEEDS {
            let tpb = (seed.wgs / seed.tpt.max(1)).max(1);
            cat.insert(KernelEntry {
                key: KernelKey::new(Scheme::KernelStockham, seed.len, precision),
                workgroup_size: seed.wgs,
                threads_per_transform: [seed.tpt, 0],
                transforms_per_block: tpb,
                factors: seed.factors.to_vec(),
                factors2: Vec::new(),
                half_lds: seed.half_lds,
                use_3steps_large_twd: [false, false],
                block_width: 0,
                requires_unit_stride: false,
                supports_strided: true,
                folds_output_transpose: false,
                runtime_compile: seed.rtc,
                generator: Some(GeneratorParams {
                    factors: seed.factors.to_vec(),
                    threads_per_transform: seed.tpt,
                    workgroup_size: seed.wgs,
                    half_lds: seed.half_lds,
                    ebtype: EmbeddedType::None,
                }),
                static_dim: 0,
            });
        }

        for seed in SBCC_SEEDS {
            let min_factor = *seed.factors.iter().min().expect("factors nonempty");
            let wgs = if seed.wgs != 0 {
                seed.wgs
            } else {
                16 * seed.len / min_factor
            };
            cat.insert(KernelEntry {
                key: KernelKey::new(Scheme::KernelStockhamBlockCc, seed.len, precision),
                workgroup_size: wgs,
                threads_per_transform: [seed.len / min_factor, 0],
                transforms_per_block: 16,
                factors: seed.factors.to_vec(),
                factors2: Vec::new(),
                half_lds: false,
                use_3steps_large_twd: seed.use3,
                block_width: 16,
                requires_unit_stride: false,
                supports_strided: true,
                folds_output_transpose: true,
                runtime_compile: false,
                generator: Some(GeneratorParams {
                    factors: seed.factors.to_vec(),
                    threads_per_transform: seed.len / min_factor,
                    workgroup_size: wgs,
                    half_lds: false,
                    ebtype: EmbeddedType::None,
                }),
                static_dim: 0,
            });
        }

        for seed in SBRC_SEEDS {
            for variant in [
                SbrcVariant::None,
                SbrcVariant::XyZ,
                SbrcVariant::ZXy,
                SbrcVariant::ErcZXy,
            ] {
                cat.insert(KernelEntry {
                    key: KernelKey::new(Scheme::KernelStockhamBlockRc, seed.len, precision)
                        .with_sbrc_variant(variant),
                    workgroup_size: seed.wgs,
                    threads_per_transform: [seed.tpt, 0],
                    transforms_per_block: seed.bw,
                    factors: seed.factors.to_vec(),
                    factors2: Vec::new(),
                    half_lds: false,
                    use_3steps_large_twd: [false, false],
                    block_width: seed.bw,
                    requires_unit_stride: false,
                    supports_strided: true,
                    folds_output_transpose: false,
                    runtime_compile: false,
                    generator: None,
                    static_dim: 0,
                });
            }
        }

        for seed in SINGLE_2D_SEEDS {
            let entry = KernelEntry {
                key: KernelKey::new(Scheme::Kernel2dSingle, seed.len[0], precision)
                    .with_length2(seed.len[1]),
                workgroup_size: seed.wgs,
                threads_per_transform: seed.tpt,
                transforms_per_block: seed.wgs / (seed.tpt[0] * seed.tpt[1]).max(1),
                factors: seed.factors.0.to_vec(),
                factors2: seed.factors.1.to_vec(),
                half_lds: false,
                use_3steps_large_twd: [false, false],
                block_width: 0,
                requires_unit_stride: false,
                supports_strided: true,
                folds_output_transpose: false,
                runtime_compile: false,
                generator: None,
                static_dim: 2,
            };
            // Double-precision tiles for the largest pairs blow the LDS
            // budget; leave those to the decomposed path.
            if entry.lds_bytes() <= LDS_BYTE_BUDGET {
                cat.insert(entry);
            }
        }

        // Generic data-movement kernels: one entry covers all lengths.
        for (scheme, wgs) in [
            (Scheme::KernelTranspose, 256),
            (Scheme::KernelR2cPost, 256),
            (Scheme::KernelC2rPre, 256),
            (Scheme::KernelChirp, 256),
            (Scheme::KernelPadMul, 256),
            (Scheme::KernelFftMul, 256),
            (Scheme::KernelResMul, 256),
        ] {
            cat.insert(KernelEntry {
                key: KernelKey::new(scheme, 0, precision),
                workgroup_size: wgs,
                threads_per_transform: [wgs, 0],
                transforms_per_block: 1,
                factors: Vec::new(),
                factors2: Vec::new(),
                half_lds: false,
                use_3steps_large_twd: [false, false],
                block_width: 0,
                requires_unit_stride: false,
                supports_strided: true,
                folds_output_transpose: false,
                runtime_compile: false,
                generator: None,
                static_dim: 0,
            });
        }
    }

    derive_fused_entries(&mut cat);
    cat
}

/// Fused shim kernels are runtime-compiled from the base Stockham recipe;
/// register one for every base length whose fused form still fits in LDS.
fn derive_fused_entries(cat: &mut Catalog) {
    let mut fused = Vec::new();
    for entry in cat.entries.values() {
        if entry.key.scheme != Scheme::KernelStockham || entry.key.length < 2 {
            continue;
        }
        let base = entry.clone();

        // Diagonal-transpose fusion applies to power-of-two lengths.
        if base.key.length.is_power_of_two() {
            let mut e = base.clone();
            e.key.scheme = Scheme::KernelStockhamTranspose;
            e.half_lds = false;
            e.runtime_compile = true;
            if e.lds_bytes() <= LDS_BYTE_BUDGET {
                fused.push(e);
            }
        }

        // Real pre/post fusions exist for even lengths.
        if base.key.length % 2 == 0 {
            for (scheme, ebtype) in [
                (Scheme::KernelR2cPostTranspose, EmbeddedType::R2cPost),
                (Scheme::KernelTransposeC2rPre, EmbeddedType::C2rPre),
            ] {
                let mut e = base.clone();
                e.key.scheme = scheme;
                e.half_lds = false;
                e.runtime_compile = true;
                if let Some(g) = &mut e.generator {
                    g.ebtype = ebtype;
                    g.half_lds = false;
                }
                if e.lds_bytes() <= LDS_BYTE_BUDGET {
                    fused.push(e);
                }
            }
        }
    }
    for e in fused {
        cat.insert(e);
    }
}
