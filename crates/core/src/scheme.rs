//! Scheme tags: the closed set of node kinds in a plan tree.
//!
//! Dispatch is on the tag everywhere (the tree rewrites pattern-match on tag
//! pairs), with the per-scheme facts that cannot be expressed in match arms
//! kept in [`SchemeInfo`], a table indexed by tag.

use serde::{Deserialize, Serialize};

/// Node kind. `Kernel*` tags are leaves that dispatch exactly one device
/// kernel; the rest are composites that only structure their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    // Leaf kernels.
    KernelStockham,
    KernelStockhamBlockCc,
    KernelStockhamBlockRc,
    KernelTranspose,
    KernelR2cPost,
    KernelC2rPre,
    Kernel2dSingle,
    // Fused leaves produced by the shim pass.
    KernelR2cPostTranspose,
    KernelTransposeC2rPre,
    KernelStockhamTranspose,
    // Bluestein component leaves.
    KernelChirp,
    KernelPadMul,
    KernelFftMul,
    KernelResMul,

    // 1D composites.
    L1dTrtrt,
    L1dCc,
    L1dCrt,
    // 2D composites.
    Dim2Rtrt,
    Dim2Rc,
    // 3D composites.
    Dim3Rtrtrt,
    Dim3Trtrtr,
    Dim3BlockRc,
    Dim3Rc,
    // Real-transform composites.
    RealTransformEven,
    Real3dEven,
    RealTransformUsingCmplx,
    Bluestein,
}

/// Tile orientation of a transpose kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransposeVariant {
    /// Plain square-tiled transpose of the two fastest dimensions.
    #[default]
    TileAligned,
    /// Diagonally-reordered tiles (pow2 sizes, avoids channel conflicts).
    Diagonal,
    /// 3D rotation moving Z innermost: (x,y,z) -> (z,x,y).
    ZXy,
    /// 3D rotation moving Z outermost: (x,y,z) -> (y,z,x).
    XyZ,
}

/// SBRC kernels come in per-use variants depending on which transpose their
/// store performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SbrcVariant {
    #[default]
    None,
    XyZ,
    ZXy,
    ErcZXy,
}

/// Per-tag facts used by the builder, fuse pass, and buffer assigner.
#[derive(Debug, Clone, Copy)]
pub struct SchemeInfo {
    /// Number of children an internal node of this scheme carries, when
    /// fixed; `None` for leaves and variable-arity composites.
    pub child_count: Option<usize>,
    /// Leaves that can never run in-place (their access pattern writes a
    /// different footprint than it reads).
    pub forbids_inplace: bool,
    /// Whether a leaf of this scheme multiplies by the large (3-step)
    /// twiddle table.
    pub uses_large_twiddle: bool,
}

impl Scheme {
    #[inline]
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            Scheme::KernelStockham
                | Scheme::KernelStockhamBlockCc
                | Scheme::KernelStockhamBlockRc
                | Scheme::KernelTranspose
                | Scheme::KernelR2cPost
                | Scheme::KernelC2rPre
                | Scheme::Kernel2dSingle
                | Scheme::KernelR2cPostTranspose
                | Scheme::KernelTransposeC2rPre
                | Scheme::KernelStockhamTranspose
                | Scheme::KernelChirp
                | Scheme::KernelPadMul
                | Scheme::KernelFftMul
                | Scheme::KernelResMul
        )
    }

    #[inline]
    pub fn is_internal(self) -> bool {
        !self.is_leaf()
    }

    /// Leaves whose store side performs a transpose.
    #[inline]
    pub fn transposes_output(self) -> bool {
        matches!(
            self,
            Scheme::KernelTranspose
                | Scheme::KernelStockhamBlockRc
                | Scheme::KernelR2cPostTranspose
                | Scheme::KernelStockhamTranspose
        )
    }

    pub fn info(self) -> SchemeInfo {
        use Scheme::*;
        match self {
            L1dTrtrt => SchemeInfo {
                child_count: Some(5),
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            L1dCc | L1dCrt | Dim2Rc => SchemeInfo {
                child_count: Some(2),
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            Dim2Rtrt => SchemeInfo {
                child_count: Some(4),
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            Dim3Rtrtrt | Dim3Trtrtr => SchemeInfo {
                child_count: Some(6),
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            Dim3Rc | Dim3BlockRc => SchemeInfo {
                child_count: None,
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            RealTransformEven | Real3dEven | RealTransformUsingCmplx | Bluestein => SchemeInfo {
                child_count: None,
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            KernelTranspose | KernelStockhamBlockRc | KernelR2cPostTranspose
            | KernelStockhamTranspose => SchemeInfo {
                child_count: None,
                forbids_inplace: true,
                uses_large_twiddle: false,
            },
            KernelR2cPost | KernelC2rPre | KernelTransposeC2rPre => SchemeInfo {
                child_count: None,
                // The hermitian side occupies N/2+1 slots against N/2; the
                // pre/post kernels handle the overlap only with unit stride.
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
            KernelStockhamBlockCc => SchemeInfo {
                child_count: None,
                forbids_inplace: false,
                uses_large_twiddle: true,
            },
            KernelPadMul | KernelResMul => SchemeInfo {
                child_count: None,
                forbids_inplace: true,
                uses_large_twiddle: false,
            },
            _ => SchemeInfo {
                child_count: None,
                forbids_inplace: false,
                uses_large_twiddle: false,
            },
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Scheme::KernelStockham => "KERNEL_STOCKHAM",
            Scheme::KernelStockhamBlockCc => "KERNEL_STOCKHAM_BLOCK_CC",
            Scheme::KernelStockhamBlockRc => "KERNEL_STOCKHAM_BLOCK_RC",
            Scheme::KernelTranspose => "KERNEL_TRANSPOSE",
            Scheme::KernelR2cPost => "KERNEL_R2C_POST",
            Scheme::KernelC2rPre => "KERNEL_C2R_PRE",
            Scheme::Kernel2dSingle => "KERNEL_2D_SINGLE",
            Scheme::KernelR2cPostTranspose => "KERNEL_R2C_POST_TRANSPOSE",
            Scheme::KernelTransposeC2rPre => "KERNEL_TRANSPOSE_C2R_PRE",
            Scheme::KernelStockhamTranspose => "KERNEL_STOCKHAM_TRANSPOSE",
            Scheme::KernelChirp => "KERNEL_CHIRP",
            Scheme::KernelPadMul => "KERNEL_PAD_MUL",
            Scheme::KernelFftMul => "KERNEL_FFT_MUL",
            Scheme::KernelResMul => "KERNEL_RES_MUL",
            Scheme::L1dTrtrt => "L1D_TRTRT",
            Scheme::L1dCc => "L1D_CC",
            Scheme::L1dCrt => "L1D_CRT",
            Scheme::Dim2Rtrt => "2D_RTRT",
            Scheme::Dim2Rc => "2D_RC",
            Scheme::Dim3Rtrtrt => "3D_RTRTRT",
            Scheme::Dim3Trtrtr => "3D_TRTRTR",
            Scheme::Dim3BlockRc => "3D_BLOCK_RC",
            Scheme::Dim3Rc => "3D_RC",
            Scheme::RealTransformEven => "REAL_TRANSFORM_EVEN",
            Scheme::Real3dEven => "REAL_3D_EVEN",
            Scheme::RealTransformUsingCmplx => "REAL_TRANSFORM_USING_CMPLX",
            Scheme::Bluestein => "BLUESTEIN",
        };
        f.write_str(s)
    }
}
