//! Host interpretations of the leaf kernels.
//!
//! Each op reads a snapshot of its input allocation, computes in f64, and
//! writes the results back through the runtime. Snapshotting first makes
//! in-place launches safe without tracking aliasing.
//!
//! Conventions shared with the planner:
//! - `lengths[0]` is the transform (or processing) dimension; the remaining
//!   dims are batch-like loops with their own strides.
//! - Block kernels with a nonzero `large1d` multiply output element `k` of
//!   the line at second-dim coordinate `j` by `w_N^{j·k}` (the decomposed
//!   3-step twiddle), conjugated for inverse transforms.
//! - Forward transforms are unnormalized DFTs; inverse transforms are
//!   unnormalized inverse DFTs.

use num_complex::Complex64;

use rotorfft_core::describe::{ArrayType, Direction};
use rotorfft_core::device::{KernelArgs, LaunchRequest};
use rotorfft_core::error::{FftError, Result};

use crate::{load_elem, store_elem, HostRuntime};

/// Unit root e^{sign·2πi·m/n}.
fn root(sign: f64, m: usize, n: usize) -> Complex64 {
    let theta = sign * 2.0 * std::f64::consts::PI * ((m % n) as f64) / (n as f64);
    Complex64::new(theta.cos(), theta.sin())
}

fn dir_sign(direction: Direction) -> f64 {
    match direction {
        Direction::Forward => -1.0,
        Direction::Inverse => 1.0,
    }
}

fn dot(stride: &[usize], idx: &[usize]) -> usize {
    stride.iter().zip(idx).map(|(s, i)| s * i).sum()
}

/// Odometer over `dims`, invoking `f` with each multi-index.
fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    let mut idx = vec![0usize; dims.len()];
    loop {
        f(&idx);
        let mut d = 0;
        loop {
            if d == dims.len() {
                return;
            }
            idx[d] += 1;
            if idx[d] < dims[d] {
                break;
            }
            idx[d] = 0;
            d += 1;
        }
    }
}

struct Source {
    plane0: Vec<u8>,
    plane1: Option<Vec<u8>>,
    ty: ArrayType,
}

impl Source {
    fn open(rt: &HostRuntime, args: &KernelArgs) -> Result<Source> {
        let plane0 = rt.snapshot(args.buf_in[0])?;
        let plane1 = if args.in_type.is_planar() {
            Some(rt.snapshot(args.buf_in[1])?)
        } else {
            None
        };
        Ok(Source {
            plane0,
            plane1,
            ty: args.in_type,
        })
    }

    fn load(&self, args: &KernelArgs, idx: usize) -> Complex64 {
        load_elem(
            &self.plane0,
            self.plane1.as_deref(),
            args.precision,
            self.ty,
            idx,
        )
    }
}

/// Flush computed `(element index, value)` pairs to the output arrays.
fn write_out(rt: &HostRuntime, args: &KernelArgs, writes: &[(usize, Complex64)]) -> Result<()> {
    let ty = args.out_type;
    if ty.is_planar() {
        let precision = args.precision;
        let real_bytes = precision.real_bytes();
        let write = |bytes: &mut [u8], at: usize, x: f64| match precision {
            rotorfft_core::describe::Precision::Single => {
                bytes[at..at + 4].copy_from_slice(&(x as f32).to_le_bytes())
            }
            rotorfft_core::describe::Precision::Double => {
                bytes[at..at + 8].copy_from_slice(&x.to_le_bytes())
            }
        };
        rt.with_dst(args.buf_out[0], |p0| {
            for &(i, v) in writes {
                write(p0, i * real_bytes, v.re);
            }
        })?;
        rt.with_dst(args.buf_out[1], |p1| {
            for &(i, v) in writes {
                write(p1, i * real_bytes, v.im);
            }
        })?;
    } else {
        rt.with_dst(args.buf_out[0], |p0| {
            for &(i, v) in writes {
                store_elem(p0, None, args.precision, ty, i, v);
            }
        })?;
    }
    Ok(())
}

/// Batched 1D FFT along `lengths[0]` with arbitrary input/output strides,
/// covering the row, block-column, block-row, and fused-transpose kernels.
pub(crate) fn strided_fft(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let len = args.lengths[0];
    let fft = rt.fft(len, args.direction);
    let src = Source::open(rt, args)?;
    let sign = dir_sign(args.direction);

    let mut writes = Vec::new();
    let mut line = vec![Complex64::default(); len];
    let mut scratch = vec![Complex64::default(); fft.get_inplace_scratch_len()];
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for (i, slot) in line.iter_mut().enumerate() {
                *slot = src.load(args, in_off + i * args.in_stride[0]);
            }
            fft.process_with_scratch(&mut line, &mut scratch);
            if args.large1d > 0 {
                let j = idx.first().copied().unwrap_or(0);
                for (k, v) in line.iter_mut().enumerate() {
                    *v *= root(sign, j * k, args.large1d);
                }
            }
            for (k, v) in line.iter().enumerate() {
                writes.push((out_off + k * args.out_stride[0], *v));
            }
        });
    }
    write_out(rt, args, &writes)
}

/// Fused 2D kernel: both dims transformed in one tile.
pub(crate) fn fft_2d_tile(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let (l0, l1) = (args.lengths[0], args.lengths[1]);
    let fft0 = rt.fft(l0, args.direction);
    let fft1 = rt.fft(l1, args.direction);
    let src = Source::open(rt, args)?;

    let mut writes = Vec::new();
    let mut tile = vec![Complex64::default(); l0 * l1];
    let mut col = vec![Complex64::default(); l1];
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[2..], |idx| {
            let in_off = in_base + dot(&args.in_stride[2..], idx);
            let out_off = out_base + dot(&args.out_stride[2..], idx);
            for i1 in 0..l1 {
                for i0 in 0..l0 {
                    tile[i0 + l0 * i1] = src.load(
                        args,
                        in_off + i0 * args.in_stride[0] + i1 * args.in_stride[1],
                    );
                }
            }
            for row in tile.chunks_exact_mut(l0) {
                fft0.process(row);
            }
            for i0 in 0..l0 {
                for i1 in 0..l1 {
                    col[i1] = tile[i0 + l0 * i1];
                }
                fft1.process(&mut col);
                for i1 in 0..l1 {
                    tile[i0 + l0 * i1] = col[i1];
                }
            }
            for i1 in 0..l1 {
                for i0 in 0..l0 {
                    writes.push((
                        out_off + i0 * args.out_stride[0] + i1 * args.out_stride[1],
                        tile[i0 + l0 * i1],
                    ));
                }
            }
        });
    }
    write_out(rt, args, &writes)
}

/// Strided copy; a nonzero `large1d` folds the decomposed twiddle
/// w^{i0·i1} into the move.
pub(crate) fn transpose_copy(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let src = Source::open(rt, args)?;
    let sign = dir_sign(args.direction);

    let mut writes = Vec::new();
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths, |idx| {
            let mut v = src.load(args, in_base + dot(&args.in_stride, idx));
            if args.large1d > 0 {
                v *= root(sign, idx[0] * idx.get(1).copied().unwrap_or(0), args.large1d);
            }
            writes.push((out_base + dot(&args.out_stride, idx), v));
        });
    }
    write_out(rt, args, &writes)
}

/// Hermitian unpack after the half-length complex FFT of packed real data.
///
/// With Z the length-L FFT of z_j = x_{2j} + i·x_{2j+1} and w = e^{-2πi/N},
/// N = 2L:  X[k] = (Z[k] + conj(Z[L-k]))/2 - i·w^k·(Z[k] - conj(Z[L-k]))/2
/// for k = 0..=L.
pub(crate) fn r2c_post(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let herm = args.lengths[0];
    let l = herm - 1;
    let n = 2 * l;
    let src = Source::open(rt, args)?;

    let mut writes = Vec::new();
    let mut z = vec![Complex64::default(); l];
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for (i, slot) in z.iter_mut().enumerate() {
                *slot = src.load(args, in_off + i * args.in_stride[0]);
            }
            for k in 0..=l {
                let zk = z[k % l];
                let zl = z[(l - k) % l].conj();
                let a = zk + zl;
                let d = zk - zl;
                let w = root(-1.0, k, n);
                let h = 0.5 * (a - Complex64::i() * w * d);
                writes.push((out_off + k * args.out_stride[0], h));
            }
        });
    }
    write_out(rt, args, &writes)
}

/// Hermitian pack before the half-length inverse FFT. Produces
/// Z'[k] = X[k] + conj(X[L-k]) + i·e^{+2πik/N}·(X[k] - conj(X[L-k])),
/// which carries the factor 2 that makes the whole inverse pipeline the
/// unnormalized inverse of length N.
pub(crate) fn c2r_pre(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let herm = args.lengths[0];
    let l = herm - 1;
    let n = 2 * l;
    let src = Source::open(rt, args)?;

    let mut writes = Vec::new();
    let mut x = vec![Complex64::default(); herm];
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for (i, slot) in x.iter_mut().enumerate() {
                *slot = src.load(args, in_off + i * args.in_stride[0]);
            }
            for k in 0..l {
                let a = x[k] + x[l - k].conj();
                let d = x[k] - x[l - k].conj();
                let w = root(1.0, k, n);
                let z = a + Complex64::i() * w * d;
                writes.push((out_off + k * args.out_stride[0], z));
            }
        });
    }
    write_out(rt, args, &writes)
}

/// Fill the plan's chirp storage: slots [0, M) hold the wrapped convolution
/// sequence b (later FFT'd in place), slots [M, M+N) the raw chirp phases
/// t_j = e^{sign·iπ·j²/N}.
pub(crate) fn chirp_fill(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let m = args.lengths[0];
    let n = args.large1d;
    let sign = dir_sign(args.direction);

    let chirp_at = |j: usize| -> Complex64 {
        let theta = sign * std::f64::consts::PI * ((j * j) % (2 * n)) as f64 / (n as f64);
        Complex64::new(theta.cos(), theta.sin())
    };

    let mut writes = Vec::with_capacity(m + n);
    for j in 0..m {
        writes.push((j, Complex64::default()));
    }
    writes[0].1 = chirp_at(0).conj();
    for j in 1..n {
        let u = chirp_at(j).conj();
        writes[j].1 = u;
        writes[m - j].1 = u;
    }
    for j in 0..n {
        writes.push((m + j, chirp_at(j)));
    }
    write_out(rt, args, &writes)
}

/// a_j = x_j · t_j for j < N, zero-padded to M. Hermitian inputs are
/// expanded through conjugate symmetry; real inputs are widened.
pub(crate) fn pad_mul(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let m = args.lengths[0];
    let n = args.large1d;
    let src = Source::open(rt, args)?;
    let chirp = rt.snapshot(args.chirp)?;
    let t = |j: usize| -> Complex64 {
        load_elem(
            &chirp,
            None,
            args.precision,
            ArrayType::ComplexInterleaved,
            m + j,
        )
    };

    let load_logical = |in_off: usize, j: usize| -> Complex64 {
        if args.in_type.is_hermitian() && j > n / 2 {
            src.load(args, in_off + (n - j) * args.in_stride[0]).conj()
        } else {
            src.load(args, in_off + j * args.in_stride[0])
        }
    };

    let mut writes = Vec::new();
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for j in 0..m {
                let v = if j < n {
                    load_logical(in_off, j) * t(j)
                } else {
                    Complex64::default()
                };
                writes.push((out_off + j * args.out_stride[0], v));
            }
        });
    }
    write_out(rt, args, &writes)
}

/// Pointwise multiply by the FFT'd chirp sequence B (chirp slots [0, M)).
pub(crate) fn fft_mul(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let m = args.lengths[0];
    let src = Source::open(rt, args)?;
    let chirp = rt.snapshot(args.chirp)?;

    let mut writes = Vec::new();
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for j in 0..m {
                let bj = load_elem(
                    &chirp,
                    None,
                    args.precision,
                    ArrayType::ComplexInterleaved,
                    j,
                );
                let v = src.load(args, in_off + j * args.in_stride[0]) * bj;
                writes.push((out_off + j * args.out_stride[0], v));
            }
        });
    }
    write_out(rt, args, &writes)
}

/// X_k = t_k · c_k / M over the output span (N, or the hermitian half for
/// real transforms).
pub(crate) fn res_mul(rt: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    let args = &req.args;
    let out_len = args.lengths[0];
    let pass: usize = args.lengths[1..].iter().product::<usize>().max(1);
    if args.in_dist % pass != 0 {
        return Err(FftError::DeviceFailure(
            "res_mul expects a packed convolution layout".into(),
        ));
    }
    let m = args.in_dist / pass;
    let scale = 1.0 / (m as f64);
    let src = Source::open(rt, args)?;
    let chirp = rt.snapshot(args.chirp)?;
    let t = |j: usize| -> Complex64 {
        load_elem(
            &chirp,
            None,
            args.precision,
            ArrayType::ComplexInterleaved,
            m + j,
        )
    };

    let mut writes = Vec::new();
    for b in 0..args.batch {
        let in_base = b * args.in_dist;
        let out_base = b * args.out_dist;
        for_each_index(&args.lengths[1..], |idx| {
            let in_off = in_base + dot(&args.in_stride[1..], idx);
            let out_off = out_base + dot(&args.out_stride[1..], idx);
            for k in 0..out_len {
                let v = src.load(args, in_off + k * args.in_stride[0]) * t(k) * scale;
                writes.push((out_off + k * args.out_stride[0], v));
            }
        });
    }
    write_out(rt, args, &writes)
}
