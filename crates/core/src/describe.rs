//! Transform descriptions: the declarative input to plan construction.
//!
//! A [`TransformDesc`] captures everything the caller can say about a batched
//! multidimensional transform before any decomposition happens: lengths,
//! strides, batch geometry, precision, direction, real/complex flavor, and
//! placement. Lengths and strides are stored fastest-dimension-first
//! internally; the builder accepts row-major input by default and honors the
//! `ROTORFFT_LAYOUT` environment override for column-major callers.

use serde::{Deserialize, Serialize};

use crate::error::{FftError, Result};

/// Floating-point width of the transform data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    /// Bytes per complex element.
    #[inline]
    pub fn complex_bytes(self) -> usize {
        match self {
            Precision::Single => 8,
            Precision::Double => 16,
        }
    }

    /// Bytes per real element.
    #[inline]
    pub fn real_bytes(self) -> usize {
        self.complex_bytes() / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    /// Sign of the exponent in e^{sign·2πi·k/N}.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => -1,
            Direction::Inverse => 1,
        }
    }

    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Inverse,
            Direction::Inverse => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    InPlace,
    OutOfPlace,
}

/// Memory layout of an input or output array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayType {
    ComplexInterleaved,
    ComplexPlanar,
    Real,
    HermitianInterleaved,
    HermitianPlanar,
}

impl ArrayType {
    #[inline]
    pub fn is_real(self) -> bool {
        matches!(self, ArrayType::Real)
    }

    #[inline]
    pub fn is_hermitian(self) -> bool {
        matches!(
            self,
            ArrayType::HermitianInterleaved | ArrayType::HermitianPlanar
        )
    }

    #[inline]
    pub fn is_planar(self) -> bool {
        matches!(self, ArrayType::ComplexPlanar | ArrayType::HermitianPlanar)
    }

    /// Complex-valued on the wire (interleaved or planar, hermitian or full).
    #[inline]
    pub fn is_complex(self) -> bool {
        !self.is_real()
    }
}

impl std::fmt::Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArrayType::ComplexInterleaved => "complex-interleaved",
            ArrayType::ComplexPlanar => "complex-planar",
            ArrayType::Real => "real",
            ArrayType::HermitianInterleaved => "hermitian-interleaved",
            ArrayType::HermitianPlanar => "hermitian-planar",
        };
        f.write_str(s)
    }
}

/// Index order of length/stride vectors handed to the public builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiLayout {
    /// Slowest dimension first (C order). The default.
    RowMajor,
    /// Fastest dimension first (Fortran order).
    ColMajor,
}

impl ApiLayout {
    /// Reads `ROTORFFT_LAYOUT`; anything other than `column-major` (or
    /// `col-major`) means row-major.
    pub fn from_env() -> Self {
        match std::env::var("ROTORFFT_LAYOUT") {
            Ok(v) if v.eq_ignore_ascii_case("column-major") || v.eq_ignore_ascii_case("col-major") => {
                ApiLayout::ColMajor
            }
            _ => ApiLayout::RowMajor,
        }
    }
}

/// A fully-specified transform request.
///
/// Construct through [`TransformDesc::builder`]; `validate` both checks the
/// spec-level constraints and fills in defaulted strides and distances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformDesc {
    /// Per-dimension lengths, fastest (unit-stride) dimension first.
    pub lengths: Vec<usize>,
    /// Input element strides, same order as `lengths`.
    pub in_stride: Vec<usize>,
    /// Output element strides, same order as `lengths`.
    pub out_stride: Vec<usize>,
    pub batch: usize,
    /// Elements between consecutive batch inputs.
    pub in_dist: usize,
    /// Elements between consecutive batch outputs.
    pub out_dist: usize,
    pub precision: Precision,
    pub direction: Direction,
    pub placement: Placement,
    pub in_type: ArrayType,
    pub out_type: ArrayType,
    /// Caller-registered callback identifiers; resolved to pointers at
    /// execution time.
    pub load_callback: Option<String>,
    pub store_callback: Option<String>,
    /// Caller-promised work buffer size in bytes, if any.
    pub work_buffer_bytes: Option<usize>,
}

pub struct TransformDescBuilder {
    layout: ApiLayout,
    lengths: Vec<usize>,
    in_stride: Option<Vec<usize>>,
    out_stride: Option<Vec<usize>>,
    batch: usize,
    in_dist: Option<usize>,
    out_dist: Option<usize>,
    precision: Precision,
    direction: Direction,
    placement: Placement,
    in_type: Option<ArrayType>,
    out_type: Option<ArrayType>,
    real: bool,
    load_callback: Option<String>,
    store_callback: Option<String>,
    work_buffer_bytes: Option<usize>,
}

impl TransformDesc {
    /// Start a description for a transform of the given lengths, interpreted
    /// per the process layout setting (row-major unless overridden).
    pub fn builder(lengths: &[usize]) -> TransformDescBuilder {
        TransformDescBuilder {
            layout: ApiLayout::from_env(),
            lengths: lengths.to_vec(),
            in_stride: None,
            out_stride: None,
            batch: 1,
            in_dist: None,
            out_dist: None,
            precision: Precision::Single,
            direction: Direction::Forward,
            placement: Placement::OutOfPlace,
            in_type: None,
            out_type: None,
            real: false,
            load_callback: None,
            store_callback: None,
            work_buffer_bytes: None,
        }
    }

    /// Number of dimensions after validation (length-1 dims collapsed).
    #[inline]
    pub fn dim(&self) -> usize {
        self.lengths.len()
    }

    /// Total complex points of the logical transform (full lengths, not the
    /// hermitian-compacted ones).
    pub fn total_elements(&self) -> usize {
        self.lengths.iter().product::<usize>().max(1)
    }

    /// The description of the mathematically inverse transform: direction
    /// flipped, input/output geometry swapped.
    pub fn inverse(&self) -> TransformDesc {
        TransformDesc {
            lengths: self.lengths.clone(),
            in_stride: self.out_stride.clone(),
            out_stride: self.in_stride.clone(),
            batch: self.batch,
            in_dist: self.out_dist,
            out_dist: self.in_dist,
            precision: self.precision,
            direction: self.direction.reversed(),
            placement: self.placement,
            in_type: self.out_type,
            out_type: self.in_type,
            load_callback: None,
            store_callback: None,
            work_buffer_bytes: None,
        }
    }

    /// Length of the innermost dimension as stored on the complex side of a
    /// real transform: ⌊N/2⌋+1.
    #[inline]
    pub fn hermitian_len(full: usize) -> usize {
        full / 2 + 1
    }

    /// Lengths of the input array as laid out in memory (hermitian compaction
    /// applied when the input side is hermitian).
    pub fn in_mem_lengths(&self) -> Vec<usize> {
        let mut l = self.lengths.clone();
        if self.in_type.is_hermitian() {
            l[0] = Self::hermitian_len(l[0]);
        }
        l
    }

    pub fn out_mem_lengths(&self) -> Vec<usize> {
        let mut l = self.lengths.clone();
        if self.out_type.is_hermitian() {
            l[0] = Self::hermitian_len(l[0]);
        }
        l
    }

    fn default_strides(mem_lengths: &[usize]) -> Vec<usize> {
        let mut strides = Vec::with_capacity(mem_lengths.len());
        let mut acc = 1usize;
        for &l in mem_lengths {
            strides.push(acc);
            acc *= l;
        }
        strides
    }

    /// Check spec constraints and normalize. Returns the validated
    /// description with strides/distances filled in and length-1 dimensions
    /// collapsed.
    pub fn validated(mut self) -> Result<TransformDesc> {
        if self.lengths.is_empty() || self.lengths.len() > 3 {
            return Err(FftError::invalid(format!(
                "transform must have 1 to 3 dimensions, got {}",
                self.lengths.len()
            )));
        }
        if self.lengths.iter().any(|&l| l == 0) {
            return Err(FftError::invalid("zero-length dimension"));
        }
        if self.batch == 0 {
            return Err(FftError::invalid("batch must be at least 1"));
        }

        // Real transforms pair a real side with a hermitian side.
        let real_flavor = self.in_type.is_real() || self.out_type.is_real();
        if real_flavor {
            let ok = (self.in_type.is_real() && self.out_type.is_hermitian())
                || (self.in_type.is_hermitian() && self.out_type.is_real());
            if !ok {
                return Err(FftError::invalid(format!(
                    "real transform requires a real/hermitian array pair, got {} -> {}",
                    self.in_type, self.out_type
                )));
            }
            if self.in_type.is_real() && self.direction != Direction::Forward {
                return Err(FftError::invalid("real input transforms are forward"));
            }
            if self.in_type.is_hermitian() && self.direction != Direction::Inverse {
                return Err(FftError::invalid("hermitian input transforms are inverse"));
            }
        } else if self.in_type.is_hermitian() || self.out_type.is_hermitian() {
            return Err(FftError::invalid(
                "hermitian arrays only appear in real transforms",
            ));
        }

        // Length-1 dimensions collapse to the remaining dimensions; a fully
        // degenerate transform keeps one length-1 dim.
        if self.lengths.len() > 1 {
            let keep: Vec<usize> = (0..self.lengths.len())
                .filter(|&i| self.lengths[i] > 1)
                .collect();
            if keep.len() < self.lengths.len() {
                let pick = |v: &[usize]| -> Vec<usize> {
                    if keep.is_empty() {
                        vec![v[0]]
                    } else {
                        keep.iter().map(|&i| v[i]).collect()
                    }
                };
                self.lengths = pick(&self.lengths);
                if self.in_stride.len() > 1 {
                    self.in_stride = pick(&self.in_stride);
                }
                if self.out_stride.len() > 1 {
                    self.out_stride = pick(&self.out_stride);
                }
            }
        }

        let mut in_mem = self.in_mem_lengths();
        let mut out_mem = self.out_mem_lengths();
        // In-place real transforms use the padded layout: the real side
        // reserves 2·(⌊N/2⌋+1) slots per line so the hermitian data fits
        // over it.
        if self.placement == Placement::InPlace {
            if self.in_type.is_real() {
                in_mem[0] = 2 * Self::hermitian_len(self.lengths[0]);
            }
            if self.out_type.is_real() {
                out_mem[0] = 2 * Self::hermitian_len(self.lengths[0]);
            }
        }

        if self.in_stride.is_empty() {
            self.in_stride = Self::default_strides(&in_mem);
        }
        if self.out_stride.is_empty() {
            self.out_stride = Self::default_strides(&out_mem);
        }
        if self.in_stride.len() != self.lengths.len() || self.out_stride.len() != self.lengths.len()
        {
            return Err(FftError::invalid(format!(
                "stride rank {}/{} does not match length rank {}",
                self.in_stride.len(),
                self.out_stride.len(),
                self.lengths.len()
            )));
        }

        if self.in_dist == 0 {
            self.in_dist = in_mem
                .iter()
                .zip(&self.in_stride)
                .map(|(l, s)| l * s)
                .max()
                .unwrap_or(1);
        }
        if self.out_dist == 0 {
            self.out_dist = out_mem
                .iter()
                .zip(&self.out_stride)
                .map(|(l, s)| l * s)
                .max()
                .unwrap_or(1);
        }

        if self.placement == Placement::InPlace {
            if !real_flavor {
                // In-place complex keeps one layout for both sides.
                if self.in_type != self.out_type {
                    return Err(FftError::invalid(
                        "in-place complex transform cannot change array type",
                    ));
                }
                if self.in_stride != self.out_stride || self.in_dist != self.out_dist {
                    return Err(FftError::invalid(
                        "in-place complex transform requires identical input/output strides and distances",
                    ));
                }
            } else {
                // In-place real/complex needs the unit-stride dimension to
                // actually be unit on both sides.
                if self.in_stride[0] != 1 || self.out_stride[0] != 1 {
                    return Err(FftError::invalid(
                        "in-place real transform requires unit innermost strides",
                    ));
                }
                if self.in_type.is_planar() || self.out_type.is_planar() {
                    return Err(FftError::invalid(
                        "in-place real transform cannot use planar arrays",
                    ));
                }
            }
        }

        Ok(self)
    }
}

impl TransformDescBuilder {
    pub fn layout(mut self, layout: ApiLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn strides(mut self, in_stride: &[usize], out_stride: &[usize]) -> Self {
        self.in_stride = Some(in_stride.to_vec());
        self.out_stride = Some(out_stride.to_vec());
        self
    }

    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    pub fn distances(mut self, in_dist: usize, out_dist: usize) -> Self {
        self.in_dist = Some(in_dist);
        self.out_dist = Some(out_dist);
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn array_types(mut self, in_type: ArrayType, out_type: ArrayType) -> Self {
        self.in_type = Some(in_type);
        self.out_type = Some(out_type);
        self
    }

    /// Shorthand for a real↔hermitian transform with interleaved complex
    /// side; direction decides which side is real.
    pub fn real(mut self) -> Self {
        self.real = true;
        self
    }

    pub fn load_callback(mut self, id: impl Into<String>) -> Self {
        self.load_callback = Some(id.into());
        self
    }

    pub fn store_callback(mut self, id: impl Into<String>) -> Self {
        self.store_callback = Some(id.into());
        self
    }

    pub fn work_buffer_bytes(mut self, bytes: usize) -> Self {
        self.work_buffer_bytes = Some(bytes);
        self
    }

    /// Validate and produce the normalized description.
    pub fn build(self) -> Result<TransformDesc> {
        let reorder = |mut v: Vec<usize>, layout: ApiLayout| -> Vec<usize> {
            if layout == ApiLayout::RowMajor {
                v.reverse();
            }
            v
        };

        let (in_type, out_type) = if self.real {
            match self.direction {
                Direction::Forward => (ArrayType::Real, ArrayType::HermitianInterleaved),
                Direction::Inverse => (ArrayType::HermitianInterleaved, ArrayType::Real),
            }
        } else {
            (
                self.in_type.unwrap_or(ArrayType::ComplexInterleaved),
                self.out_type.unwrap_or(ArrayType::ComplexInterleaved),
            )
        };

        let desc = TransformDesc {
            lengths: reorder(self.lengths, self.layout),
            in_stride: self
                .in_stride
                .map(|s| reorder(s, self.layout))
                .unwrap_or_default(),
            out_stride: self
                .out_stride
                .map(|s| reorder(s, self.layout))
                .unwrap_or_default(),
            batch: self.batch,
            in_dist: self.in_dist.unwrap_or(0),
            out_dist: self.out_dist.unwrap_or(0),
            precision: self.precision,
            direction: self.direction,
            placement: self.placement,
            in_type,
            out_type,
            load_callback: self.load_callback,
            store_callback: self.store_callback,
            work_buffer_bytes: self.work_buffer_bytes,
        };
        desc.validated()
    }
}
