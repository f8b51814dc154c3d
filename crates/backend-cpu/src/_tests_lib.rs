//! End-to-end transforms against the host runtime: round trips and
//! reference-DFT comparisons across every decomposition path.

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::FftPlanner;

use rotorfft_core::describe::{ArrayType, Direction, Placement, Precision, TransformDesc};
use rotorfft_core::device::DeviceRuntime;
use rotorfft_core::exec::ExecutionInfo;
use rotorfft_core::plan::Plan;

use crate::HostRuntime;

const TOL_SINGLE: f64 = 1e-4;
const TOL_DOUBLE: f64 = 1e-11;

/// Deterministic test signal, rounded to the storage precision so reference
/// transforms see exactly the stored values.
fn signal(n: usize, precision: Precision) -> Vec<Complex64> {
    (0..n)
        .map(|j| {
            let re = (0.7 * j as f64 + 0.3).sin();
            let im = (1.3 * j as f64 - 0.1).cos();
            match precision {
                Precision::Single => Complex64::new(re as f32 as f64, im as f32 as f64),
                Precision::Double => Complex64::new(re, im),
            }
        })
        .collect()
}

fn real_signal(n: usize, precision: Precision) -> Vec<f64> {
    (0..n)
        .map(|j| {
            let v = (0.9 * j as f64).sin() + 0.25 * (2.1 * j as f64).cos();
            match precision {
                Precision::Single => v as f32 as f64,
                Precision::Double => v,
            }
        })
        .collect()
}

fn complex_bytes(data: &[Complex64], precision: Precision) -> Vec<u8> {
    let mut out = Vec::new();
    for v in data {
        match precision {
            Precision::Single => {
                out.extend_from_slice(&(v.re as f32).to_le_bytes());
                out.extend_from_slice(&(v.im as f32).to_le_bytes());
            }
            Precision::Double => {
                out.extend_from_slice(&v.re.to_le_bytes());
                out.extend_from_slice(&v.im.to_le_bytes());
            }
        }
    }
    out
}

fn complex_from_bytes(bytes: &[u8], precision: Precision) -> Vec<Complex64> {
    match precision {
        Precision::Single => bytes
            .chunks_exact(8)
            .map(|c| {
                Complex64::new(
                    f32::from_le_bytes(c[0..4].try_into().unwrap()) as f64,
                    f32::from_le_bytes(c[4..8].try_into().unwrap()) as f64,
                )
            })
            .collect(),
        Precision::Double => bytes
            .chunks_exact(16)
            .map(|c| {
                Complex64::new(
                    f64::from_le_bytes(c[0..8].try_into().unwrap()),
                    f64::from_le_bytes(c[8..16].try_into().unwrap()),
                )
            })
            .collect(),
    }
}

fn real_bytes(data: &[f64], precision: Precision) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in data {
        match precision {
            Precision::Single => out.extend_from_slice(&(v as f32).to_le_bytes()),
            Precision::Double => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    out
}

fn real_from_bytes(bytes: &[u8], precision: Precision) -> Vec<f64> {
    match precision {
        Precision::Single => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
            .collect(),
        Precision::Double => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn max_abs(data: &[Complex64]) -> f64 {
    data.iter().map(|v| v.norm()).fold(0.0, f64::max)
}

fn assert_close(actual: &[Complex64], expect: &[Complex64], tol: f64, what: &str) {
    assert_eq!(actual.len(), expect.len(), "{what}: length mismatch");
    let scale = max_abs(expect).max(1.0);
    for (i, (a, e)) in actual.iter().zip(expect).enumerate() {
        let err = (a - e).norm() / scale;
        assert!(
            err < tol,
            "{what}: element {i} off by {err:.3e} ({a} vs {e})"
        );
    }
}

/// Naive O(N²) DFT in f64.
fn naive_dft(x: &[Complex64], direction: Direction) -> Vec<Complex64> {
    let n = x.len();
    let sign = match direction {
        Direction::Forward => -1.0,
        Direction::Inverse => 1.0,
    };
    (0..n)
        .map(|k| {
            let mut acc = Complex64::default();
            for (j, v) in x.iter().enumerate() {
                let theta = sign * 2.0 * std::f64::consts::PI * ((j * k) % n) as f64 / n as f64;
                acc += v * Complex64::new(theta.cos(), theta.sin());
            }
            acc
        })
        .collect()
}

/// Multi-dimensional reference FFT over packed data, dims fastest-first.
fn reference_fft_md(data: &[Complex64], dims: &[usize], direction: Direction) -> Vec<Complex64> {
    let mut planner = FftPlanner::<f64>::new();
    let mut out = data.to_vec();
    let total: usize = dims.iter().product();
    assert_eq!(out.len(), total);

    let mut stride = 1usize;
    for &len in dims {
        let fft = match direction {
            Direction::Forward => planner.plan_fft_forward(len),
            Direction::Inverse => planner.plan_fft_inverse(len),
        };
        let mut line = vec![Complex64::default(); len];
        for base in 0..total / len {
            let inner = base % stride;
            let outer = base / stride;
            let start = outer * stride * len + inner;
            for (i, slot) in line.iter_mut().enumerate() {
                *slot = out[start + i * stride];
            }
            fft.process(&mut line);
            for (i, slot) in line.iter().enumerate() {
                out[start + i * stride] = *slot;
            }
        }
        stride *= len;
    }
    out
}

/// Plan + execute an out-of-place complex transform over packed data.
fn run_complex(rt: &Arc<HostRuntime>, desc: TransformDesc, input: &[Complex64]) -> Vec<Complex64> {
    let precision = desc.precision;
    let total = input.len();
    let mut plan = Plan::create(desc, rt.clone()).expect("plan should build");
    let in_buf = rt.alloc(total * precision.complex_bytes()).unwrap();
    let out_buf = rt.alloc(total * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &complex_bytes(input, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .expect("execution should succeed");
    let bytes = rt
        .download(out_buf, total * precision.complex_bytes())
        .unwrap();
    complex_from_bytes(&bytes, precision)
}

fn scaled(data: &[Complex64], factor: f64) -> Vec<Complex64> {
    data.iter().map(|v| v * factor).collect()
}

// ============================================================================
// 1D complex
// ============================================================================

#[test]
fn single_kernel_1024_round_trip_inplace() {
    // Forward then inverse restores N·x.
    init_logs();
    let rt = HostRuntime::new();
    let n = 1024;
    let batch = 3;
    let precision = Precision::Single;
    let input: Vec<Complex64> = (0..batch)
        .flat_map(|b| {
            signal(n, precision)
                .into_iter()
                .map(move |v| v * (b + 1) as f64)
        })
        .collect();

    let fwd_desc = TransformDesc::builder(&[n])
        .batch(batch)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let inv_desc = fwd_desc.inverse();

    let buf = rt.alloc(input.len() * precision.complex_bytes()).unwrap();
    rt.upload(buf, &complex_bytes(&input, precision)).unwrap();

    let mut fwd = Plan::create(fwd_desc, rt.clone()).unwrap();
    assert_eq!(fwd.work_buffer_bytes(), 0);
    fwd.execute(&[buf], &[], &ExecutionInfo::new()).unwrap();
    let mut inv = Plan::create(inv_desc, rt.clone()).unwrap();
    inv.execute(&[buf], &[], &ExecutionInfo::new()).unwrap();

    let got = complex_from_bytes(
        &rt.download(buf, input.len() * precision.complex_bytes())
            .unwrap(),
        precision,
    );
    assert_close(
        &scaled(&got, 1.0 / n as f64),
        &input,
        TOL_SINGLE,
        "1024 round trip",
    );
}

#[test]
fn small_lengths_match_naive_dft() {
    let rt = HostRuntime::new();
    // 8: tiny table kernel; 34: runtime-generated; 23: Bluestein.
    for n in [8usize, 34, 23] {
        let input = signal(n, Precision::Single);
        let desc = TransformDesc::builder(&[n]).build().unwrap();
        let got = run_complex(&rt, desc, &input);
        let expect = naive_dft(&input, Direction::Forward);
        assert_close(&got, &expect, TOL_SINGLE, &format!("length {n} forward"));
    }
}

#[test]
fn bluestein_inverse_matches_naive() {
    let rt = HostRuntime::new();
    let n = 23;
    let input = signal(n, Precision::Single);
    let desc = TransformDesc::builder(&[n])
        .direction(Direction::Inverse)
        .build()
        .unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = naive_dft(&input, Direction::Inverse);
    assert_close(&got, &expect, TOL_SINGLE, "bluestein inverse");
}

#[test]
fn large_1d_cc_matches_reference() {
    // 40000 goes through the two-column-kernel path.
    let rt = HostRuntime::new();
    let n = 40000;
    let input = signal(n, Precision::Single);
    let desc = TransformDesc::builder(&[n]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &[n], Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "40000 forward");
}

#[test]
fn large_1d_crt_matches_reference() {
    let rt = HostRuntime::new();
    let n = 1400;
    let input = signal(n, Precision::Single);
    let desc = TransformDesc::builder(&[n]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &[n], Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "1400 forward");
}

#[test]
fn large_1d_trtrt_matches_reference() {
    let rt = HostRuntime::new();
    let n = 14641;
    let input = signal(n, Precision::Single);
    let desc = TransformDesc::builder(&[n]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &[n], Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "14641 forward");
}

#[test]
fn double_precision_round_trip_40000() {
    let rt = HostRuntime::new();
    let n = 40000;
    let input = signal(n, Precision::Double);
    let fwd_desc = TransformDesc::builder(&[n])
        .precision(Precision::Double)
        .build()
        .unwrap();
    let inv_desc = fwd_desc.inverse();
    let spectrum = run_complex(&rt, fwd_desc, &input);
    let back = run_complex(&rt, inv_desc, &spectrum);
    assert_close(
        &scaled(&back, 1.0 / n as f64),
        &input,
        TOL_DOUBLE,
        "40000 double round trip",
    );
}

#[test]
fn batched_transform_with_custom_distances() {
    let rt = HostRuntime::new();
    let n = 64;
    let batch = 3;
    let (idist, odist) = (70usize, 80usize);
    let precision = Precision::Single;

    let mut input = vec![Complex64::default(); idist * batch];
    let mut lines = Vec::new();
    for b in 0..batch {
        let line = signal(n, precision);
        input[b * idist..b * idist + n].copy_from_slice(&line);
        lines.push(line);
    }

    let desc = TransformDesc::builder(&[n])
        .batch(batch)
        .distances(idist, odist)
        .build()
        .unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(idist * batch * precision.complex_bytes()).unwrap();
    let out_buf = rt.alloc(odist * batch * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &complex_bytes(&input, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .unwrap();
    let out = complex_from_bytes(
        &rt.download(out_buf, odist * batch * precision.complex_bytes())
            .unwrap(),
        precision,
    );

    for (b, line) in lines.iter().enumerate() {
        let expect = naive_dft(line, Direction::Forward);
        assert_close(
            &out[b * odist..b * odist + n],
            &expect,
            TOL_SINGLE,
            &format!("batch {b}"),
        );
    }
}

#[test]
fn planar_arrays_match_reference() {
    let rt = HostRuntime::new();
    let n = 256;
    let precision = Precision::Single;
    let input = signal(n, precision);

    let re: Vec<f64> = input.iter().map(|v| v.re).collect();
    let im: Vec<f64> = input.iter().map(|v| v.im).collect();
    let in_re = rt.alloc(n * 4).unwrap();
    let in_im = rt.alloc(n * 4).unwrap();
    rt.upload(in_re, &real_bytes(&re, precision)).unwrap();
    rt.upload(in_im, &real_bytes(&im, precision)).unwrap();
    let out_re = rt.alloc(n * 4).unwrap();
    let out_im = rt.alloc(n * 4).unwrap();

    let desc = TransformDesc::builder(&[n])
        .array_types(ArrayType::ComplexPlanar, ArrayType::ComplexPlanar)
        .build()
        .unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    plan.execute(&[in_re, in_im], &[out_re, out_im], &ExecutionInfo::new())
        .unwrap();

    let got_re = real_from_bytes(&rt.download(out_re, n * 4).unwrap(), precision);
    let got_im = real_from_bytes(&rt.download(out_im, n * 4).unwrap(), precision);
    let got: Vec<Complex64> = got_re
        .iter()
        .zip(&got_im)
        .map(|(&r, &i)| Complex64::new(r, i))
        .collect();
    let expect = naive_dft(&input, Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "planar forward");
}

// ============================================================================
// 2D / 3D complex
// ============================================================================

#[test]
fn fused_2d_single_matches_reference() {
    let rt = HostRuntime::new();
    for dims in [[16usize, 16], [16, 25]] {
        let total = dims.iter().product();
        let input = signal(total, Precision::Single);
        // Builder input is row-major (slow dim first).
        let desc = TransformDesc::builder(&[dims[1], dims[0]]).build().unwrap();
        let got = run_complex(&rt, desc, &input);
        let expect = reference_fft_md(&input, &dims, Direction::Forward);
        assert_close(
            &got,
            &expect,
            TOL_SINGLE,
            &format!("{}x{} fused", dims[0], dims[1]),
        );
    }
}

#[test]
fn two_d_row_column_matches_reference() {
    let rt = HostRuntime::new();
    let dims = [100usize, 100];
    let input = signal(10000, Precision::Single);
    let desc = TransformDesc::builder(&[100, 100]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &dims, Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "100x100");
}

#[test]
fn two_d_rtrt_matches_reference() {
    let rt = HostRuntime::new();
    let dims = [44usize, 44];
    let input = signal(44 * 44, Precision::Single);
    let desc = TransformDesc::builder(&[44, 44]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &dims, Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "44x44");
}

#[test]
fn two_d_fused_diagonal_transpose_round_trip() {
    // 512 is a pow2 with no fused-2D or block kernel: 2D_RTRT whose
    // row+transpose pairs fuse into diagonal-store kernels.
    let rt = HostRuntime::new();
    let n = 512;
    let input = signal(n * n, Precision::Single);
    let fwd_desc = TransformDesc::builder(&[n, n]).build().unwrap();
    let inv_desc = fwd_desc.inverse();
    let spectrum = run_complex(&rt, fwd_desc, &input);
    let back = run_complex(&rt, inv_desc, &spectrum);
    assert_close(
        &scaled(&back, 1.0 / (n * n) as f64),
        &input,
        TOL_SINGLE,
        "512x512 round trip",
    );
}

#[test]
fn three_d_rotation_path_matches_reference() {
    let rt = HostRuntime::new();
    let dims = [48usize, 48, 48];
    let input = signal(48 * 48 * 48, Precision::Single);
    let desc = TransformDesc::builder(&[48, 48, 48]).build().unwrap();
    let got = run_complex(&rt, desc, &input);
    let expect = reference_fft_md(&input, &dims, Direction::Forward);
    assert_close(&got, &expect, TOL_SINGLE, "48^3");
}

#[test]
fn three_d_row_column_column_round_trip() {
    let rt = HostRuntime::new();
    let dims = [64usize, 64, 64];
    let total: usize = dims.iter().product();
    let input = signal(total, Precision::Single);
    let fwd_desc = TransformDesc::builder(&[64, 64, 64]).build().unwrap();
    let inv_desc = fwd_desc.inverse();
    let spectrum = run_complex(&rt, fwd_desc, &input);
    let expect = reference_fft_md(&input, &dims, Direction::Forward);
    assert_close(&spectrum, &expect, TOL_SINGLE, "64^3 forward");
    let back = run_complex(&rt, inv_desc, &spectrum);
    assert_close(
        &scaled(&back, 1.0 / total as f64),
        &input,
        TOL_SINGLE,
        "64^3 round trip",
    );
}

// ============================================================================
// Real transforms
// ============================================================================

#[test]
fn real_even_1d_matches_reference() {
    let rt = HostRuntime::new();
    let n = 128;
    let precision = Precision::Single;
    let x = real_signal(n, precision);
    let widened: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let full = naive_dft(&widened, Direction::Forward);

    let desc = TransformDesc::builder(&[n]).real().build().unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(n * precision.real_bytes()).unwrap();
    let out_buf = rt.alloc((n / 2 + 1) * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .unwrap();
    let got = complex_from_bytes(
        &rt.download(out_buf, (n / 2 + 1) * precision.complex_bytes())
            .unwrap(),
        precision,
    );
    assert_close(&got, &full[..n / 2 + 1], TOL_SINGLE, "r2c 128");
}

#[test]
fn real_even_1d_round_trip() {
    let rt = HostRuntime::new();
    let n = 200;
    let precision = Precision::Single;
    let x = real_signal(n, precision);

    let fwd_desc = TransformDesc::builder(&[n]).real().build().unwrap();
    let inv_desc = fwd_desc.inverse();

    let mut fwd = Plan::create(fwd_desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(n * precision.real_bytes()).unwrap();
    let spec_buf = rt.alloc((n / 2 + 1) * precision.complex_bytes()).unwrap();
    let back_buf = rt.alloc(n * precision.real_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    fwd.execute(&[in_buf], &[spec_buf], &ExecutionInfo::new())
        .unwrap();

    let mut inv = Plan::create(inv_desc, rt.clone()).unwrap();
    inv.execute(&[spec_buf], &[back_buf], &ExecutionInfo::new())
        .unwrap();
    let back = real_from_bytes(
        &rt.download(back_buf, n * precision.real_bytes()).unwrap(),
        precision,
    );
    for (i, (&b, &e)) in back.iter().zip(&x).enumerate() {
        let err = (b / n as f64 - e).abs();
        assert!(err < TOL_SINGLE, "element {i} off by {err:.3e}");
    }
}

#[test]
fn real_odd_bluestein_matches_reference() {
    let rt = HostRuntime::new();
    let n = 15;
    let precision = Precision::Single;
    let x = real_signal(n, precision);
    let widened: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let full = naive_dft(&widened, Direction::Forward);

    let desc = TransformDesc::builder(&[n]).real().build().unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(n * precision.real_bytes()).unwrap();
    let out_buf = rt.alloc((n / 2 + 1) * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .unwrap();
    let got = complex_from_bytes(
        &rt.download(out_buf, (n / 2 + 1) * precision.complex_bytes())
            .unwrap(),
        precision,
    );
    assert_close(&got, &full[..n / 2 + 1], TOL_SINGLE, "r2c 15");
}

#[test]
fn real_even_1d_inplace_padded_round_trip() {
    // In-place real transforms use the padded 2·(N/2+1) line layout.
    let rt = HostRuntime::new();
    let n = 64;
    let batch = 2;
    let pad = 2 * (n / 2 + 1);
    let precision = Precision::Single;

    let mut data = vec![0.0f64; pad * batch];
    let mut lines = Vec::new();
    for b in 0..batch {
        let line = real_signal(n, precision);
        data[b * pad..b * pad + n].copy_from_slice(&line);
        lines.push(line);
    }

    let fwd_desc = TransformDesc::builder(&[n])
        .real()
        .batch(batch)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let inv_desc = TransformDesc::builder(&[n])
        .real()
        .direction(Direction::Inverse)
        .batch(batch)
        .placement(Placement::InPlace)
        .build()
        .unwrap();

    let buf = rt.alloc(pad * batch * precision.real_bytes()).unwrap();
    rt.upload(buf, &real_bytes(&data, precision)).unwrap();

    let mut fwd = Plan::create(fwd_desc, rt.clone()).unwrap();
    fwd.execute(&[buf], &[], &ExecutionInfo::new()).unwrap();
    let mut inv = Plan::create(inv_desc, rt.clone()).unwrap();
    inv.execute(&[buf], &[], &ExecutionInfo::new()).unwrap();

    let back = real_from_bytes(
        &rt.download(buf, pad * batch * precision.real_bytes())
            .unwrap(),
        precision,
    );
    for (b, line) in lines.iter().enumerate() {
        for (i, &e) in line.iter().enumerate() {
            let err = (back[b * pad + i] / n as f64 - e).abs();
            assert!(err < TOL_SINGLE, "batch {b} element {i} off by {err:.3e}");
        }
    }
}

#[test]
fn real_2d_with_fused_shims_matches_reference() {
    // 64-fast × 48-slow: the second dim has no block kernel, so the tree
    // carries the transpose fallback and the fused r2c shim.
    let rt = HostRuntime::new();
    let (nx, ny) = (64usize, 48);
    let cx = nx / 2 + 1;
    let precision = Precision::Single;
    let x: Vec<f64> = real_signal(nx * ny, precision);
    let widened: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let full = reference_fft_md(&widened, &[nx, ny], Direction::Forward);

    let desc = TransformDesc::builder(&[ny, nx]).real().build().unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(nx * ny * precision.real_bytes()).unwrap();
    let out_buf = rt.alloc(cx * ny * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .unwrap();
    let got = complex_from_bytes(
        &rt.download(out_buf, cx * ny * precision.complex_bytes())
            .unwrap(),
        precision,
    );
    let scale = max_abs(&full).max(1.0);
    for ky in 0..ny {
        for kx in 0..cx {
            let g = got[kx + cx * ky];
            let e = full[kx + nx * ky];
            let err = (g - e).norm() / scale;
            assert!(err < TOL_SINGLE, "bin ({kx},{ky}) off by {err:.3e}");
        }
    }
}

#[test]
fn real_3d_even_matches_reference() {
    // 64³ real forward: the full three-stage real pipeline.
    init_logs();
    let rt = HostRuntime::new();
    let n = 64usize;
    let cx = n / 2 + 1;
    let precision = Precision::Single;
    let x = real_signal(n * n * n, precision);
    let widened: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let full = reference_fft_md(&widened, &[n, n, n], Direction::Forward);

    let desc = TransformDesc::builder(&[n, n, n]).real().build().unwrap();
    let mut plan = Plan::create(desc, rt.clone()).unwrap();
    assert!(plan.launch_count() <= 6);
    let in_buf = rt.alloc(n * n * n * precision.real_bytes()).unwrap();
    let out_buf = rt.alloc(cx * n * n * precision.complex_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    plan.execute(&[in_buf], &[out_buf], &ExecutionInfo::new())
        .unwrap();
    let got = complex_from_bytes(
        &rt.download(out_buf, cx * n * n * precision.complex_bytes())
            .unwrap(),
        precision,
    );
    let scale = max_abs(&full).max(1.0);
    for kz in 0..n {
        for ky in 0..n {
            for kx in 0..cx {
                let g = got[kx + cx * (ky + n * kz)];
                let e = full[kx + n * (ky + n * kz)];
                let err = (g - e).norm() / scale;
                assert!(err < TOL_SINGLE, "bin ({kx},{ky},{kz}) off by {err:.3e}");
            }
        }
    }
}

#[test]
fn real_3d_even_round_trip() {
    let rt = HostRuntime::new();
    let n = 64usize;
    let cx = n / 2 + 1;
    let total = n * n * n;
    let precision = Precision::Single;
    let x = real_signal(total, precision);

    let fwd_desc = TransformDesc::builder(&[n, n, n]).real().build().unwrap();
    let inv_desc = fwd_desc.inverse();

    let mut fwd = Plan::create(fwd_desc, rt.clone()).unwrap();
    let in_buf = rt.alloc(total * precision.real_bytes()).unwrap();
    let spec_buf = rt.alloc(cx * n * n * precision.complex_bytes()).unwrap();
    let back_buf = rt.alloc(total * precision.real_bytes()).unwrap();
    rt.upload(in_buf, &real_bytes(&x, precision)).unwrap();
    fwd.execute(&[in_buf], &[spec_buf], &ExecutionInfo::new())
        .unwrap();
    let mut inv = Plan::create(inv_desc, rt.clone()).unwrap();
    inv.execute(&[spec_buf], &[back_buf], &ExecutionInfo::new())
        .unwrap();

    let back = real_from_bytes(
        &rt.download(back_buf, total * precision.real_bytes()).unwrap(),
        precision,
    );
    for (i, (&b, &e)) in back.iter().zip(&x).enumerate() {
        let err = (b / total as f64 - e).abs();
        assert!(err < TOL_SINGLE, "element {i} off by {err:.3e}");
    }
}
