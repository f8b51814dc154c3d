//! Twiddle factory: precomputed roots-of-unity tables.
//!
//! Tables are computed on the host in the forward sign convention (kernels
//! conjugate for inverse transforms), uploaded to the device once per plan,
//! and deduplicated per `(length, precision, kind)` by [`TwiddleRepo`].

use std::collections::HashMap;

use num_complex::Complex64;

use crate::describe::Precision;

/// Base of the chunked large-twiddle decomposition: each chunk covers 8 bits
/// of the butterfly index.
pub const LARGE_TWIDDLE_BASE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TwiddleKind {
    /// Per-pass Stockham subtables: for pass radix r after cumulative length
    /// L, the (r-1)·L entries w_N^{j·k}.
    Stages(Vec<usize>),
    /// 3-step large twiddle, chunked by [`LARGE_TWIDDLE_BASE`].
    Large3Step,
    /// Half-length real pre/post table: w_N^k for k in [0, N/2).
    HalfReal,
    /// Bluestein chirp phases z_k = e^{-πi·k²/N} for k in [0, N).
    Chirp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TwiddleSpec {
    pub length: usize,
    pub precision: Precision,
    pub kind: TwiddleKind,
}

impl TwiddleSpec {
    pub fn stages(length: usize, precision: Precision, factors: &[usize]) -> Self {
        TwiddleSpec {
            length,
            precision,
            kind: TwiddleKind::Stages(factors.to_vec()),
        }
    }

    pub fn large(length: usize, precision: Precision) -> Self {
        TwiddleSpec {
            length,
            precision,
            kind: TwiddleKind::Large3Step,
        }
    }

    pub fn half_real(length: usize, precision: Precision) -> Self {
        TwiddleSpec {
            length,
            precision,
            kind: TwiddleKind::HalfReal,
        }
    }

    pub fn chirp(length: usize, precision: Precision) -> Self {
        TwiddleSpec {
            length,
            precision,
            kind: TwiddleKind::Chirp,
        }
    }
}

/// A host-computed table, interleaved re/im at the table's precision.
#[derive(Debug, Clone)]
pub struct TwiddleTable {
    pub spec: TwiddleSpec,
    pub values: Vec<Complex64>,
}

impl TwiddleTable {
    pub fn generate(spec: &TwiddleSpec) -> TwiddleTable {
        let values = match &spec.kind {
            TwiddleKind::Stages(factors) => stage_table(spec.length, factors),
            TwiddleKind::Large3Step => large_table(spec.length),
            TwiddleKind::HalfReal => half_real_table(spec.length),
            TwiddleKind::Chirp => chirp_table(spec.length),
        };
        TwiddleTable {
            spec: spec.clone(),
            values,
        }
    }

    /// Size of the uploaded table in bytes at the spec's precision.
    pub fn device_bytes(&self) -> usize {
        self.values.len() * self.spec.precision.complex_bytes()
    }

    /// Interleaved re/im bytes ready for upload.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.spec.precision {
            Precision::Single => {
                let mut flat = Vec::with_capacity(self.values.len() * 2);
                for v in &self.values {
                    flat.push(v.re as f32);
                    flat.push(v.im as f32);
                }
                bytemuck::cast_slice(&flat).to_vec()
            }
            Precision::Double => {
                let mut flat = Vec::with_capacity(self.values.len() * 2);
                for v in &self.values {
                    flat.push(v.re);
                    flat.push(v.im);
                }
                bytemuck::cast_slice(&flat).to_vec()
            }
        }
    }
}

#[inline]
fn root(n: usize, k: usize) -> Complex64 {
    let theta = -2.0 * std::f64::consts::PI * (k as f64) / (n as f64);
    Complex64::new(theta.cos(), theta.sin())
}

fn stage_table(length: usize, factors: &[usize]) -> Vec<Complex64> {
    let mut table = Vec::new();
    let mut l = 1usize;
    for &radix in factors {
        // Butterfly j of width `l` multiplies its lanes 1..radix by
        // w_{l·radix}^{j·k}.
        let span = l * radix;
        for j in 0..l {
            for k in 1..radix {
                table.push(root(span, j * k));
            }
        }
        l = span;
    }
    debug_assert_eq!(l, length);
    table
}

fn large_table(length: usize) -> Vec<Complex64> {
    let chunks = {
        let mut c = 0usize;
        let mut covered = 1usize;
        while covered < length {
            covered *= LARGE_TWIDDLE_BASE;
            c += 1;
        }
        c.max(1)
    };
    let mut table = Vec::with_capacity(chunks * LARGE_TWIDDLE_BASE);
    let mut scale = 1usize;
    for _ in 0..chunks {
        for k in 0..LARGE_TWIDDLE_BASE {
            table.push(root(length, (k * scale) % length));
        }
        scale *= LARGE_TWIDDLE_BASE;
    }
    table
}

fn half_real_table(length: usize) -> Vec<Complex64> {
    (0..length / 2).map(|k| root(length, k)).collect()
}

fn chirp_table(length: usize) -> Vec<Complex64> {
    (0..length)
        .map(|k| {
            let theta = -std::f64::consts::PI * ((k * k) % (2 * length)) as f64 / (length as f64);
            Complex64::new(theta.cos(), theta.sin())
        })
        .collect()
}

/// Per-plan table store; tables are owned by the plan and released with it.
#[derive(Debug, Default)]
pub struct TwiddleRepo {
    tables: HashMap<TwiddleSpec, TwiddleTable>,
}

impl TwiddleRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate-or-reuse for `spec`.
    pub fn request(&mut self, spec: &TwiddleSpec) -> &TwiddleTable {
        self.tables
            .entry(spec.clone())
            .or_insert_with(|| TwiddleTable::generate(spec))
    }

    pub fn get(&self, spec: &TwiddleSpec) -> Option<&TwiddleTable> {
        self.tables.get(spec)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TwiddleSpec, &TwiddleTable)> {
        self.tables.iter()
    }
}
