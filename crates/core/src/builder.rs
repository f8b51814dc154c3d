//! The node tree builder: from a transform description to the initial tree.
//!
//! Decompositions follow a fixed preference order per dimension count, with
//! the catalog deciding what a single kernel can cover. Every leaf leaves
//! here with a resolved kernel key and its twiddle requirements recorded;
//! intermediate results always use packed layouts, while the first and last
//! leaves of the chain carry the caller's strides.
//!
//! Index conventions for the large-1D split N = N1·N2 (input index
//! n = a + N1·b, output index k = k2 + N2·k1):
//!
//! - `L1D_CC`: column FFT over b (stride N1, large twiddle w_N^{a·k2}),
//!   then column FFT over a writing k1 at stride N2. No transpose.
//! - `L1D_TRTRT`: transpose, row FFT over b, twiddle-applying transpose,
//!   row FFT over a, transpose.
//! - `L1D_CRT`: column FFT over b with twiddle, row FFT over a, transpose.

use crate::catalog::{KernelKey, KernelPool, MAX_SINGLE_KERNEL_LEN};
use crate::describe::{ArrayType, Direction, Placement, Precision, TransformDesc};
use crate::error::{FftError, Result};
use crate::factor::{self, GENERATOR_RADICES};
use crate::node::{BufferId, Node, NodeId, PlanTree};
use crate::scheme::{SbrcVariant, Scheme, TransposeVariant};
use crate::twiddle::TwiddleSpec;

/// Geometry and typing of the transform a subtree must implement.
#[derive(Debug, Clone)]
struct Frame {
    /// Transform dim first, passenger (batch-like) dims after.
    lengths: Vec<usize>,
    in_stride: Vec<usize>,
    out_stride: Vec<usize>,
    in_dist: usize,
    out_dist: usize,
    batch: usize,
    precision: Precision,
    direction: Direction,
    placement: Placement,
    in_type: ArrayType,
    out_type: ArrayType,
}

impl Frame {
    fn from_desc(desc: &TransformDesc) -> Frame {
        Frame {
            lengths: desc.lengths.clone(),
            in_stride: desc.in_stride.clone(),
            out_stride: desc.out_stride.clone(),
            in_dist: desc.in_dist,
            out_dist: desc.out_dist,
            batch: desc.batch,
            precision: desc.precision,
            direction: desc.direction,
            placement: desc.placement,
            in_type: desc.in_type,
            out_type: desc.out_type,
        }
    }

    fn node(&self, scheme: Scheme) -> Node {
        let mut n = Node::new(scheme);
        n.lengths = self.lengths.clone();
        n.in_stride = self.in_stride.clone();
        n.out_stride = self.out_stride.clone();
        n.in_dist = self.in_dist;
        n.out_dist = self.out_dist;
        n.batch = self.batch;
        n.precision = self.precision;
        n.direction = self.direction;
        n.placement = self.placement;
        n.in_type = self.in_type;
        n.out_type = self.out_type;
        n
    }

    fn passengers(&self) -> &[usize] {
        &self.lengths[1..]
    }
}

/// Packed strides for dims `[lines..., passengers...]`, plus the batch
/// distance of that layout.
fn packed(dims: &[usize]) -> (Vec<usize>, usize) {
    let mut strides = Vec::with_capacity(dims.len());
    let mut acc = 1usize;
    for &d in dims {
        strides.push(acc);
        acc *= d;
    }
    (strides, acc)
}

pub fn build_tree(desc: &TransformDesc, pool: &mut KernelPool<'_>) -> Result<PlanTree> {
    let mut tree = PlanTree::new();
    let frame = Frame::from_desc(desc);
    let real_flavor = desc.in_type.is_real() || desc.out_type.is_real();
    let root = if real_flavor {
        build_real(&mut tree, pool, &frame)?
    } else {
        build_complex(&mut tree, pool, &frame)?
    };
    tree.set_root(root);
    log::debug!("built plan tree:\n{}", tree.render());
    Ok(tree)
}

fn build_complex(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    match f.lengths.len() {
        1 => build_1d(tree, pool, f),
        2 => build_2d(tree, pool, f),
        3 => build_3d(tree, pool, f),
        d => Err(FftError::unsupported(format!("{d}-dimensional transform"))),
    }
}

// ============================================================================
// 1D
// ============================================================================

fn build_1d(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let n = f.lengths[0];
    if pool.stockham_coverable(n, f.precision) {
        return stockham_leaf(tree, pool, f, 0);
    }
    if !factor::is_factorable(n, GENERATOR_RADICES) {
        return build_bluestein(tree, pool, f, Scheme::Bluestein);
    }

    let sbcc: Vec<usize> = pool
        .supported_lengths(Scheme::KernelStockhamBlockCc)
        .to_vec();

    // L1D_CC: both halves column kernels, no transpose.
    if let Some((n1, n2)) = factor::split_supported(n, &sbcc, &sbcc) {
        if n2 >= n1 {
            return build_l1d_cc(tree, pool, f, n1, n2);
        }
    }

    // L1D_CRT: column kernel for the tall half, row kernel for the rest.
    {
        let mut pick = None;
        for &n2 in sbcc.iter().rev() {
            if n % n2 == 0 && pool.stockham_coverable(n / n2, f.precision) {
                pick = Some((n / n2, n2));
                break;
            }
        }
        if let Some((n1, n2)) = pick {
            return build_l1d_crt(tree, pool, f, n1, n2);
        }
    }

    // L1D_TRTRT: transpose sandwich; the second half may recurse.
    let sqrt = (n as f64).sqrt() as usize;
    let mut best: Option<usize> = None;
    for d in 2..=MAX_SINGLE_KERNEL_LEN.min(n / 2) {
        if n % d == 0 && pool.stockham_coverable(d, f.precision) {
            match best {
                Some(b) if b.abs_diff(sqrt) <= d.abs_diff(sqrt) => {}
                _ => best = Some(d),
            }
        }
    }
    match best {
        Some(n1) => build_l1d_trtrt(tree, pool, f, n1, n / n1),
        None => build_bluestein(tree, pool, f, Scheme::Bluestein),
    }
}

fn stockham_leaf(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    large1d: usize,
) -> Result<NodeId> {
    let n = f.lengths[0];
    let key = pool.ensure_stockham(n, f.precision)?;
    let entry = pool.lookup(&key).expect("just ensured");
    let mut node = f.node(Scheme::KernelStockham);
    node.kernel = Some(key);
    node.large1d = large1d;
    node.small_twiddle = Some(TwiddleSpec::stages(n, f.precision, &entry.factors));
    if large1d > 0 {
        node.large_twiddle = Some(TwiddleSpec::large(large1d, f.precision));
    }
    Ok(tree.alloc(node))
}

/// Column-kernel leaf along `dims[0]`; SBCC when the catalog covers the
/// length, otherwise a strided Stockham kernel.
#[allow(clippy::too_many_arguments)]
fn col_leaf(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    lengths: Vec<usize>,
    in_stride: Vec<usize>,
    out_stride: Vec<usize>,
    in_dist: usize,
    out_dist: usize,
    boundary: Boundary,
    large1d: usize,
) -> Result<NodeId> {
    let n = lengths[0];
    let sbcc_key = KernelKey::new(Scheme::KernelStockhamBlockCc, n, f.precision);
    let (scheme, key) = if pool.lookup(&sbcc_key).is_some() {
        (Scheme::KernelStockhamBlockCc, sbcc_key)
    } else {
        (Scheme::KernelStockham, pool.ensure_stockham(n, f.precision)?)
    };
    let entry = pool.lookup(&key).expect("resolved above");
    let factors = entry.factors.clone();

    let mut node = f.node(scheme);
    node.lengths = lengths;
    node.in_stride = in_stride;
    node.out_stride = out_stride;
    node.in_dist = in_dist;
    node.out_dist = out_dist;
    node.in_type = boundary.in_type(f);
    node.out_type = boundary.out_type(f);
    node.kernel = Some(key);
    node.large1d = large1d;
    node.small_twiddle = Some(TwiddleSpec::stages(n, f.precision, &factors));
    if large1d > 0 {
        node.large_twiddle = Some(TwiddleSpec::large(large1d, f.precision));
    }
    Ok(tree.alloc(node))
}

/// Which ends of the leaf chain this node touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    First,
    Last,
    Interior,
}

impl Boundary {
    fn in_type(self, f: &Frame) -> ArrayType {
        match self {
            Boundary::First => f.in_type,
            _ => ArrayType::ComplexInterleaved,
        }
    }

    fn out_type(self, f: &Frame) -> ArrayType {
        match self {
            Boundary::Last => f.out_type,
            _ => ArrayType::ComplexInterleaved,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn transpose_leaf(
    tree: &mut PlanTree,
    f: &Frame,
    lengths: Vec<usize>,
    in_stride: Vec<usize>,
    out_stride: Vec<usize>,
    in_dist: usize,
    out_dist: usize,
    boundary: Boundary,
    variant: TransposeVariant,
    large1d: usize,
) -> NodeId {
    let mut node = f.node(Scheme::KernelTranspose);
    node.kernel = Some(KernelKey::new(
        Scheme::KernelTranspose,
        lengths[0],
        f.precision,
    ));
    node.lengths = lengths;
    node.in_stride = in_stride;
    node.out_stride = out_stride;
    node.in_dist = in_dist;
    node.out_dist = out_dist;
    node.in_type = boundary.in_type(f);
    node.out_type = boundary.out_type(f);
    node.transpose_variant = variant;
    node.large1d = large1d;
    if large1d > 0 {
        node.large_twiddle = Some(TwiddleSpec::large(large1d, f.precision));
    }
    tree.alloc(node)
}

fn build_l1d_cc(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    n1: usize,
    n2: usize,
) -> Result<NodeId> {
    let n = n1 * n2;
    let pass = f.passengers().to_vec();
    let parent = tree.alloc(f.node(Scheme::L1dCc));
    let s_in = f.in_stride[0];
    let s_out = f.out_stride[0];
    let (mid_stride, mid_dist) = packed_line(&[n1, n2], &pass);

    // Column FFT over b: reads n = a + N1·b, applies w_N^{a·k2}, keeps the
    // [a + N1·k2] layout.
    let c0 = col_leaf(
        tree,
        pool,
        f,
        join(&[n2, n1], &pass),
        join(&[n1 * s_in, s_in], &f.in_stride[1..]),
        vec![mid_stride[1], mid_stride[0]]
            .into_iter()
            .chain(mid_stride[2..].iter().copied())
            .collect(),
        f.in_dist,
        mid_dist,
        Boundary::First,
        n,
    )?;

    // Column FFT over a: writes k1 at stride N2 so output lands in natural
    // order.
    let c1 = col_leaf(
        tree,
        pool,
        f,
        join(&[n1, n2], &pass),
        mid_stride.clone(),
        join(&[n2 * s_out, s_out], &f.out_stride[1..]),
        mid_dist,
        f.out_dist,
        Boundary::Last,
        0,
    )?;

    tree.add_child(parent, c0);
    tree.add_child(parent, c1);
    Ok(parent)
}

fn build_l1d_crt(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    n1: usize,
    n2: usize,
) -> Result<NodeId> {
    let n = n1 * n2;
    let pass = f.passengers().to_vec();
    let parent = tree.alloc(f.node(Scheme::L1dCrt));
    let s_in = f.in_stride[0];
    let s_out = f.out_stride[0];
    let (mid_stride, mid_dist) = packed_line(&[n1, n2], &pass);

    // Column FFT over b with the large twiddle, layout preserved.
    let c0 = col_leaf(
        tree,
        pool,
        f,
        join(&[n2, n1], &pass),
        join(&[n1 * s_in, s_in], &f.in_stride[1..]),
        vec![mid_stride[1], mid_stride[0]]
            .into_iter()
            .chain(mid_stride[2..].iter().copied())
            .collect(),
        f.in_dist,
        mid_dist,
        Boundary::First,
        n,
    )?;

    // Row FFT over a.
    let row_frame = Frame {
        lengths: join(&[n1, n2], &pass),
        in_stride: mid_stride.clone(),
        out_stride: mid_stride.clone(),
        in_dist: mid_dist,
        out_dist: mid_dist,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let c1 = build_1d(tree, pool, &row_frame)?;

    // Transpose [k1 + N1·k2] to the natural output order.
    let c2 = transpose_leaf(
        tree,
        f,
        join(&[n1, n2], &pass),
        mid_stride,
        join(&[n2 * s_out, s_out], &f.out_stride[1..]),
        mid_dist,
        f.out_dist,
        Boundary::Last,
        TransposeVariant::TileAligned,
        0,
    );

    for c in [c0, c1, c2] {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

fn build_l1d_trtrt(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    n1: usize,
    n2: usize,
) -> Result<NodeId> {
    let n = n1 * n2;
    let pass = f.passengers().to_vec();
    let parent = tree.alloc(f.node(Scheme::L1dTrtrt));
    let s_in = f.in_stride[0];
    let s_out = f.out_stride[0];
    let (lay_ab, dist) = packed_line(&[n1, n2], &pass); // [a fast, b]
    let (lay_ba, _) = packed_line(&[n2, n1], &pass); // [b fast, a]

    // T: x[a + N1·b] -> B[b + N2·a].
    let t0 = transpose_leaf(
        tree,
        f,
        join(&[n1, n2], &pass),
        join(&[s_in, n1 * s_in], &f.in_stride[1..]),
        vec![lay_ba[1], lay_ba[0]]
            .into_iter()
            .chain(lay_ba[2..].iter().copied())
            .collect(),
        f.in_dist,
        dist,
        Boundary::First,
        TransposeVariant::TileAligned,
        0,
    );

    // R: rows of length N2 over b.
    let r0_frame = Frame {
        lengths: join(&[n2, n1], &pass),
        in_stride: lay_ba.clone(),
        out_stride: lay_ba.clone(),
        in_dist: dist,
        out_dist: dist,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let r0 = build_1d(tree, pool, &r0_frame)?;

    // T with large twiddle: y[k2 + N2·a]·w_N^{a·k2} -> C[a + N1·k2].
    let t1 = transpose_leaf(
        tree,
        f,
        join(&[n2, n1], &pass),
        lay_ba.clone(),
        vec![lay_ab[1], lay_ab[0]]
            .into_iter()
            .chain(lay_ab[2..].iter().copied())
            .collect(),
        dist,
        dist,
        Boundary::Interior,
        TransposeVariant::TileAligned,
        n,
    );

    // R: rows of length N1 over a.
    let r1_frame = Frame {
        lengths: join(&[n1, n2], &pass),
        in_stride: lay_ab.clone(),
        out_stride: lay_ab.clone(),
        in_dist: dist,
        out_dist: dist,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let r1 = build_1d(tree, pool, &r1_frame)?;

    // T: z[k1 + N1·k2] -> X[k2 + N2·k1].
    let t2 = transpose_leaf(
        tree,
        f,
        join(&[n1, n2], &pass),
        lay_ab,
        join(&[n2 * s_out, s_out], &f.out_stride[1..]),
        dist,
        f.out_dist,
        Boundary::Last,
        TransposeVariant::TileAligned,
        0,
    );

    for c in [t0, r0, t1, r1, t2] {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

fn join(line: &[usize], pass: &[usize]) -> Vec<usize> {
    line.iter().chain(pass.iter()).copied().collect()
}

/// Packed layout for a decomposed line `[d0, d1, ...]` followed by passenger
/// dims, passenger strides sized after the whole line.
fn packed_line(line: &[usize], pass: &[usize]) -> (Vec<usize>, usize) {
    let dims = join(line, pass);
    packed(&dims)
}

// ============================================================================
// Bluestein
// ============================================================================

fn build_bluestein(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    wrapper: Scheme,
) -> Result<NodeId> {
    let n = f.lengths[0];
    let m = factor::next_pow2(2 * n - 1);
    if m > MAX_SINGLE_KERNEL_LEN {
        return Err(FftError::unsupported(format!(
            "length {n} needs a {m}-point Bluestein convolution, beyond the single-kernel budget"
        )));
    }
    let pass = f.passengers().to_vec();
    let parent = tree.alloc(f.node(wrapper));

    // Chirp: fills the plan-owned buffer with the padded b-sequence and the
    // raw chirp phases; its FFT runs in place over the same buffer.
    let mut chirp = f.node(Scheme::KernelChirp);
    chirp.lengths = vec![m];
    chirp.in_stride = vec![1];
    chirp.out_stride = vec![1];
    chirp.in_dist = m;
    chirp.out_dist = m;
    chirp.batch = 1;
    chirp.large1d = n;
    chirp.in_type = ArrayType::ComplexInterleaved;
    chirp.out_type = ArrayType::ComplexInterleaved;
    chirp.kernel = Some(KernelKey::new(Scheme::KernelChirp, m, f.precision));
    chirp.in_buf = BufferId::TempBluestein;
    chirp.out_buf = BufferId::TempBluestein;
    chirp.bluestein_aux = true;
    let chirp = tree.alloc(chirp);

    let chirp_fft_frame = Frame {
        lengths: vec![m],
        in_stride: vec![1],
        out_stride: vec![1],
        in_dist: m,
        out_dist: m,
        batch: 1,
        direction: Direction::Forward,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let chirp_fft = stockham_leaf(tree, pool, &chirp_fft_frame, 0)?;
    {
        let node = tree.get_mut(chirp_fft);
        node.in_buf = BufferId::TempBluestein;
        node.out_buf = BufferId::TempBluestein;
        node.bluestein_aux = true;
    }

    let (pad_stride, pad_dist) = packed_line(&[m], &pass);

    // a_j = x_j · t_j, zero-padded to M.
    let mut pad = f.node(Scheme::KernelPadMul);
    pad.lengths = join(&[m], &pass);
    pad.in_stride = f.in_stride.clone();
    pad.out_stride = pad_stride.clone();
    pad.in_dist = f.in_dist;
    pad.out_dist = pad_dist;
    pad.large1d = n;
    pad.out_type = ArrayType::ComplexInterleaved;
    pad.kernel = Some(KernelKey::new(Scheme::KernelPadMul, m, f.precision));
    pad.bluestein_aux = true;
    let pad = tree.alloc(pad);

    let conv_frame = Frame {
        lengths: join(&[m], &pass),
        in_stride: pad_stride.clone(),
        out_stride: pad_stride.clone(),
        in_dist: pad_dist,
        out_dist: pad_dist,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        direction: Direction::Forward,
        ..f.clone()
    };
    let fft_fwd = stockham_leaf(tree, pool, &conv_frame, 0)?;

    let mut mul = f.node(Scheme::KernelFftMul);
    mul.lengths = join(&[m], &pass);
    mul.in_stride = pad_stride.clone();
    mul.out_stride = pad_stride.clone();
    mul.in_dist = pad_dist;
    mul.out_dist = pad_dist;
    mul.large1d = n;
    mul.in_type = ArrayType::ComplexInterleaved;
    mul.out_type = ArrayType::ComplexInterleaved;
    mul.kernel = Some(KernelKey::new(Scheme::KernelFftMul, m, f.precision));
    mul.bluestein_aux = true;
    let mul = tree.alloc(mul);

    let inv_frame = Frame {
        direction: Direction::Inverse,
        ..conv_frame.clone()
    };
    let fft_inv = stockham_leaf(tree, pool, &inv_frame, 0)?;

    // X_k = t_k · c_k / M over the first n (or hermitian-compacted) slots.
    let out_len = if f.out_type.is_hermitian() {
        TransformDesc::hermitian_len(n)
    } else {
        n
    };
    let mut res = f.node(Scheme::KernelResMul);
    res.lengths = join(&[out_len], &pass);
    res.in_stride = pad_stride;
    res.out_stride = f.out_stride.clone();
    res.in_dist = pad_dist;
    res.out_dist = f.out_dist;
    res.large1d = n;
    res.in_type = ArrayType::ComplexInterleaved;
    res.kernel = Some(KernelKey::new(Scheme::KernelResMul, m, f.precision));
    res.bluestein_aux = true;
    let res = tree.alloc(res);

    for c in [chirp, chirp_fft, pad, fft_fwd, mul, fft_inv, res] {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

// ============================================================================
// 2D
// ============================================================================

fn build_2d(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let (l0, l1) = (f.lengths[0], f.lengths[1]);

    let single = KernelKey::new(Scheme::Kernel2dSingle, l0, f.precision).with_length2(l1);
    if let Some(entry) = pool.lookup(&single) {
        let mut node = f.node(Scheme::Kernel2dSingle);
        node.kernel = Some(single);
        let combined: Vec<usize> = entry
            .factors
            .iter()
            .chain(entry.factors2.iter())
            .copied()
            .collect();
        node.small_twiddle = Some(TwiddleSpec::stages(l0 * l1, f.precision, &combined));
        return Ok(tree.alloc(node));
    }

    let sbcc = pool.supported_lengths(Scheme::KernelStockhamBlockCc);
    if sbcc.contains(&l1) {
        // 2D_RC: rows along dim 0, column kernel along dim 1.
        let parent = tree.alloc(f.node(Scheme::Dim2Rc));
        let (mid_stride, mid_dist) = packed(&f.lengths);
        let row_frame = Frame {
            out_stride: mid_stride.clone(),
            out_dist: mid_dist,
            out_type: ArrayType::ComplexInterleaved,
            ..f.clone()
        };
        let c0 = build_1d(tree, pool, &row_frame)?;
        let c1 = col_leaf(
            tree,
            pool,
            f,
            vec![l1, l0],
            vec![mid_stride[1], mid_stride[0]],
            vec![f.out_stride[1], f.out_stride[0]],
            mid_dist,
            f.out_dist,
            Boundary::Last,
            0,
        )?;
        tree.add_child(parent, c0);
        tree.add_child(parent, c1);
        return Ok(parent);
    }

    // 2D_RTRT.
    let parent = tree.alloc(f.node(Scheme::Dim2Rtrt));
    let (lay_xy, dist) = packed(&[l0, l1]);
    let (lay_yx, _) = packed(&[l1, l0]);

    let row0_frame = Frame {
        out_stride: lay_xy.clone(),
        out_dist: dist,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let c0 = build_1d(tree, pool, &row0_frame)?;

    let c1 = transpose_leaf(
        tree,
        f,
        vec![l0, l1],
        lay_xy.clone(),
        vec![lay_yx[1], lay_yx[0]],
        dist,
        dist,
        Boundary::Interior,
        TransposeVariant::TileAligned,
        0,
    );

    let row1_frame = Frame {
        lengths: vec![l1, l0],
        in_stride: lay_yx.clone(),
        out_stride: lay_yx.clone(),
        in_dist: dist,
        out_dist: dist,
        in_type: ArrayType::ComplexInterleaved,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let c2 = build_1d(tree, pool, &row1_frame)?;

    let c3 = transpose_leaf(
        tree,
        f,
        vec![l1, l0],
        lay_yx,
        vec![f.out_stride[1], f.out_stride[0]],
        dist,
        f.out_dist,
        Boundary::Last,
        TransposeVariant::TileAligned,
        0,
    );

    for c in [c0, c1, c2, c3] {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

// ============================================================================
// 3D
// ============================================================================

fn build_3d(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let (l0, l1, l2) = (f.lengths[0], f.lengths[1], f.lengths[2]);
    let sbcc = pool.supported_lengths(Scheme::KernelStockhamBlockCc);
    let sbrc = pool.supported_lengths(Scheme::KernelStockhamBlockRc);

    if sbcc.contains(&l1) && sbcc.contains(&l2) {
        return build_3d_rc(tree, pool, f);
    }
    if sbrc.contains(&l0) && sbrc.contains(&l1) && sbrc.contains(&l2) {
        return build_3d_block_rc(tree, pool, f);
    }
    if pool.stockham_coverable(l0, f.precision) {
        build_3d_rtrtrt(tree, pool, f)
    } else {
        build_3d_trtrtr(tree, pool, f)
    }
}

fn build_3d_rc(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let (l0, l1, l2) = (f.lengths[0], f.lengths[1], f.lengths[2]);
    let parent = tree.alloc(f.node(Scheme::Dim3Rc));
    let (lay, dist) = packed(&f.lengths);

    let row_frame = Frame {
        out_stride: lay.clone(),
        out_dist: dist,
        out_type: ArrayType::ComplexInterleaved,
        ..f.clone()
    };
    let c0 = build_1d(tree, pool, &row_frame)?;

    let c1 = col_leaf(
        tree,
        pool,
        f,
        vec![l1, l0, l2],
        vec![lay[1], lay[0], lay[2]],
        vec![lay[1], lay[0], lay[2]],
        dist,
        dist,
        Boundary::Interior,
        0,
    )?;

    let c2 = col_leaf(
        tree,
        pool,
        f,
        vec![l2, l0, l1],
        vec![lay[2], lay[0], lay[1]],
        vec![f.out_stride[2], f.out_stride[0], f.out_stride[1]],
        dist,
        f.out_dist,
        Boundary::Last,
        0,
    )?;

    for c in [c0, c1, c2] {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

/// Orientation `i`: the plan's dims rotated left by `i`, so `orient(i)[0]`
/// is the dimension currently fastest in memory.
fn orient(dims: [usize; 3], i: usize) -> [usize; 3] {
    [dims[i % 3], dims[(i + 1) % 3], dims[(i + 2) % 3]]
}

/// Strides, aligned to orientation `i`'s dim order, that store each element
/// into the packed layout of orientation `i + 1` (the middle dimension
/// becomes fastest).
fn rotation_out_strides(dims: [usize; 3], i: usize) -> (Vec<usize>, usize) {
    let next = orient(dims, i + 1);
    let (lay_next, dist) = packed(&next);
    (vec![lay_next[2], lay_next[0], lay_next[1]], dist)
}

/// Three block-RC kernels; each transforms the currently-fastest dimension
/// and its tiled store rotates the layout so the next dimension comes in
/// fast. After three rotations the data is back in the caller's orientation.
fn build_3d_block_rc(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let parent = tree.alloc(f.node(Scheme::Dim3BlockRc));
    let dims = [f.lengths[0], f.lengths[1], f.lengths[2]];

    for step in 0..3 {
        let cur = orient(dims, step);
        let (lay_in, dist_in) = packed(&cur);
        let (rot_stride, rot_dist) = rotation_out_strides(dims, step);

        let boundary = match step {
            0 => Boundary::First,
            2 => Boundary::Last,
            _ => Boundary::Interior,
        };
        let (in_stride, in_dist) = if boundary == Boundary::First {
            (f.in_stride.clone(), f.in_dist)
        } else {
            (lay_in, dist_in)
        };
        let (out_stride, out_dist) = if boundary == Boundary::Last {
            // The final rotation restores the original orientation; write
            // with the caller's strides, aligned to this orientation.
            (
                vec![f.out_stride[2], f.out_stride[0], f.out_stride[1]],
                f.out_dist,
            )
        } else {
            (rot_stride, rot_dist)
        };

        let n = cur[0];
        let key = KernelKey::new(Scheme::KernelStockhamBlockRc, n, f.precision)
            .with_sbrc_variant(SbrcVariant::ZXy);
        let entry = pool
            .lookup(&key)
            .ok_or_else(|| FftError::unsupported(format!("no SBRC kernel for length {n}")))?;
        let factors = entry.factors.clone();
        let mut node = f.node(Scheme::KernelStockhamBlockRc);
        node.lengths = cur.to_vec();
        node.in_stride = in_stride;
        node.out_stride = out_stride;
        node.in_dist = in_dist;
        node.out_dist = out_dist;
        node.in_type = boundary.in_type(f);
        node.out_type = boundary.out_type(f);
        node.sbrc_variant = SbrcVariant::ZXy;
        node.kernel = Some(key);
        node.small_twiddle = Some(TwiddleSpec::stages(n, f.precision, &factors));
        let c = tree.alloc(node);
        tree.add_child(parent, c);
    }
    Ok(parent)
}

fn build_3d_rtrtrt(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let parent = tree.alloc(f.node(Scheme::Dim3Rtrtrt));
    build_3d_row_rotations(tree, pool, f, parent, false)?;
    Ok(parent)
}

fn build_3d_trtrtr(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let parent = tree.alloc(f.node(Scheme::Dim3Trtrtr));
    build_3d_row_rotations(tree, pool, f, parent, true)?;
    Ok(parent)
}

/// Shared 3D fallback: three row transforms interleaved with rotation
/// transposes. `transpose_first` rotates before each transform instead of
/// after, bringing a supported length innermost before the first row pass.
fn build_3d_row_rotations(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
    parent: NodeId,
    transpose_first: bool,
) -> Result<NodeId> {
    let dims = [f.lengths[0], f.lengths[1], f.lengths[2]];
    let mut children = Vec::new();

    for step in 0..3 {
        if transpose_first {
            // T: rotate orientation `step` to `step + 1`.
            let cur = orient(dims, step);
            let (lay_cur, dist_cur) = packed(&cur);
            let (rot_stride, rot_dist) = rotation_out_strides(dims, step);
            let first = step == 0;
            let t = transpose_leaf(
                tree,
                f,
                cur.to_vec(),
                if first { f.in_stride.clone() } else { lay_cur },
                rot_stride,
                if first { f.in_dist } else { dist_cur },
                rot_dist,
                if first { Boundary::First } else { Boundary::Interior },
                TransposeVariant::ZXy,
                0,
            );
            children.push(t);

            // R over the newly-fastest dimension; the third row pass runs in
            // the caller's orientation and writes caller strides.
            let next = orient(dims, step + 1);
            let (lay_next, dist_next) = packed(&next);
            let last = step == 2;
            let row_frame = Frame {
                lengths: next.to_vec(),
                in_stride: lay_next.clone(),
                out_stride: if last { f.out_stride.clone() } else { lay_next.clone() },
                in_dist: dist_next,
                out_dist: if last { f.out_dist } else { dist_next },
                in_type: ArrayType::ComplexInterleaved,
                out_type: if last { f.out_type } else { ArrayType::ComplexInterleaved },
                ..f.clone()
            };
            children.push(build_1d(tree, pool, &row_frame)?);
        } else {
            // R over orientation `step`'s fastest dimension.
            let cur = orient(dims, step);
            let (lay_cur, dist_cur) = packed(&cur);
            let first = step == 0;
            let row_frame = Frame {
                lengths: cur.to_vec(),
                in_stride: if first { f.in_stride.clone() } else { lay_cur.clone() },
                out_stride: lay_cur.clone(),
                in_dist: if first { f.in_dist } else { dist_cur },
                out_dist: dist_cur,
                in_type: if first { f.in_type } else { ArrayType::ComplexInterleaved },
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            children.push(build_1d(tree, pool, &row_frame)?);

            // T: rotate so the next dimension comes in fast; the final
            // rotation restores the caller's orientation and strides.
            let (rot_stride, rot_dist) = rotation_out_strides(dims, step);
            let last = step == 2;
            let t = transpose_leaf(
                tree,
                f,
                cur.to_vec(),
                lay_cur,
                if last {
                    vec![f.out_stride[2], f.out_stride[0], f.out_stride[1]]
                } else {
                    rot_stride
                },
                dist_cur,
                if last { f.out_dist } else { rot_dist },
                if last { Boundary::Last } else { Boundary::Interior },
                TransposeVariant::ZXy,
                0,
            );
            children.push(t);
        }
    }

    for c in children {
        tree.add_child(parent, c);
    }
    Ok(parent)
}

// ============================================================================
// Real transforms
// ============================================================================

fn build_real(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let n0 = f.lengths[0];
    let real_side_stride = if f.in_type.is_real() {
        f.in_stride[0]
    } else {
        f.out_stride[0]
    };
    if real_side_stride != 1 {
        return Err(FftError::unsupported(
            "real transforms require unit stride on the real side",
        ));
    }

    if n0 % 2 != 0 {
        if f.lengths.len() > 1 {
            return Err(FftError::unsupported(
                "odd-length real transforms are 1D only",
            ));
        }
        return build_bluestein(tree, pool, f, Scheme::RealTransformUsingCmplx);
    }

    match f.lengths.len() {
        1 | 2 => build_real_even(tree, pool, f),
        3 => build_real_3d_even(tree, pool, f),
        d => Err(FftError::unsupported(format!("{d}-dimensional transform"))),
    }
}

/// Even-length real transform: complex subtransform of length N/2 plus the
/// hermitian pre/post kernel. Handles the 1D case and the 2D case (where the
/// remaining dimension gets a column transform).
fn build_real_even(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let n0 = f.lengths[0];
    let half = n0 / 2;
    let herm = TransformDesc::hermitian_len(n0);
    let md = f.lengths.len() == 2;
    let parent = tree.alloc(f.node(Scheme::RealTransformEven));

    match f.direction {
        Direction::Forward => {
            // Complex FFT of length N/2 over the packed real input.
            let half_in_stride = view_real_as_complex(&f.in_stride, f.in_dist)?;
            let (mid_stride, mid_dist) = packed(&join(&[half], f.passengers()));
            let sub_frame = Frame {
                lengths: join(&[half], f.passengers()),
                in_stride: half_in_stride.0,
                out_stride: mid_stride.clone(),
                in_dist: half_in_stride.1,
                out_dist: mid_dist,
                in_type: ArrayType::ComplexInterleaved,
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let sub = build_1d(tree, pool, &sub_frame)?;

            // Hermitian unpack into the caller's layout (or packed when a
            // column stage follows).
            let (post_out_stride, post_out_dist, post_boundary) = if md {
                let (lay, dist) = packed(&join(&[herm], f.passengers()));
                (lay, dist, Boundary::Interior)
            } else {
                (f.out_stride.clone(), f.out_dist, Boundary::Last)
            };
            let mut post = f.node(Scheme::KernelR2cPost);
            post.lengths = join(&[herm], f.passengers());
            post.in_stride = mid_stride;
            post.out_stride = post_out_stride;
            post.in_dist = mid_dist;
            post.out_dist = post_out_dist;
            post.in_type = ArrayType::ComplexInterleaved;
            post.out_type = post_boundary.out_type(f);
            post.kernel = Some(KernelKey::new(Scheme::KernelR2cPost, herm, f.precision));
            post.small_twiddle = Some(TwiddleSpec::half_real(n0, f.precision));
            let post = tree.alloc(post);

            tree.add_child(parent, sub);
            tree.add_child(parent, post);

            if md {
                let l1 = f.lengths[1];
                let (lay, dist) = packed(&[herm, l1]);
                if pool
                    .supported_lengths(Scheme::KernelStockhamBlockCc)
                    .contains(&l1)
                {
                    let c = col_leaf(
                        tree,
                        pool,
                        f,
                        vec![l1, herm],
                        vec![lay[1], lay[0]],
                        vec![f.out_stride[1], f.out_stride[0]],
                        dist,
                        f.out_dist,
                        Boundary::Last,
                        0,
                    )?;
                    tree.add_child(parent, c);
                } else {
                    // No column kernel for the second dimension: transpose,
                    // run it as rows, transpose back.
                    let (lay_t, dist_t) = packed(&[l1, herm]);
                    let t0 = transpose_leaf(
                        tree,
                        f,
                        vec![herm, l1],
                        lay.clone(),
                        vec![lay_t[1], lay_t[0]],
                        dist,
                        dist_t,
                        Boundary::Interior,
                        TransposeVariant::TileAligned,
                        0,
                    );
                    let row_frame = Frame {
                        lengths: vec![l1, herm],
                        in_stride: lay_t.clone(),
                        out_stride: lay_t.clone(),
                        in_dist: dist_t,
                        out_dist: dist_t,
                        in_type: ArrayType::ComplexInterleaved,
                        out_type: ArrayType::ComplexInterleaved,
                        ..f.clone()
                    };
                    let r = build_1d(tree, pool, &row_frame)?;
                    let t1 = transpose_leaf(
                        tree,
                        f,
                        vec![l1, herm],
                        lay_t,
                        vec![f.out_stride[1], f.out_stride[0]],
                        dist_t,
                        f.out_dist,
                        Boundary::Last,
                        TransposeVariant::TileAligned,
                        0,
                    );
                    for c in [t0, r, t1] {
                        tree.add_child(parent, c);
                    }
                }
            }
        }
        Direction::Inverse => {
            if md {
                let l1 = f.lengths[1];
                let (lay, dist) = packed(&[herm, l1]);
                if pool
                    .supported_lengths(Scheme::KernelStockhamBlockCc)
                    .contains(&l1)
                {
                    let c = col_leaf(
                        tree,
                        pool,
                        f,
                        vec![l1, herm],
                        vec![f.in_stride[1], f.in_stride[0]],
                        vec![lay[1], lay[0]],
                        f.in_dist,
                        dist,
                        Boundary::First,
                        0,
                    )?;
                    tree.add_child(parent, c);
                } else {
                    let (lay_t, dist_t) = packed(&[l1, herm]);
                    let t0 = transpose_leaf(
                        tree,
                        f,
                        vec![herm, l1],
                        vec![f.in_stride[0], f.in_stride[1]],
                        vec![lay_t[1], lay_t[0]],
                        f.in_dist,
                        dist_t,
                        Boundary::First,
                        TransposeVariant::TileAligned,
                        0,
                    );
                    let row_frame = Frame {
                        lengths: vec![l1, herm],
                        in_stride: lay_t.clone(),
                        out_stride: lay_t.clone(),
                        in_dist: dist_t,
                        out_dist: dist_t,
                        in_type: ArrayType::ComplexInterleaved,
                        out_type: ArrayType::ComplexInterleaved,
                        ..f.clone()
                    };
                    let r = build_1d(tree, pool, &row_frame)?;
                    let t1 = transpose_leaf(
                        tree,
                        f,
                        vec![l1, herm],
                        lay_t,
                        vec![lay[1], lay[0]],
                        dist_t,
                        dist,
                        Boundary::Interior,
                        TransposeVariant::TileAligned,
                        0,
                    );
                    for c in [t0, r, t1] {
                        tree.add_child(parent, c);
                    }
                }
            }

            // Hermitian pack down to N/2 complex.
            let (pre_in_stride, pre_in_dist, pre_boundary) = if md {
                let (lay, dist) = packed(&join(&[herm], f.passengers()));
                (lay, dist, Boundary::Interior)
            } else {
                (f.in_stride.clone(), f.in_dist, Boundary::First)
            };
            let (mid_stride, mid_dist) = packed(&join(&[half], f.passengers()));
            let mut pre = f.node(Scheme::KernelC2rPre);
            pre.lengths = join(&[herm], f.passengers());
            pre.in_stride = pre_in_stride;
            pre.out_stride = mid_stride.clone();
            pre.in_dist = pre_in_dist;
            pre.out_dist = mid_dist;
            pre.in_type = pre_boundary.in_type(f);
            pre.out_type = ArrayType::ComplexInterleaved;
            pre.kernel = Some(KernelKey::new(Scheme::KernelC2rPre, herm, f.precision));
            pre.small_twiddle = Some(TwiddleSpec::half_real(n0, f.precision));
            let pre = tree.alloc(pre);
            tree.add_child(parent, pre);

            // Complex inverse FFT of length N/2 writing the packed real
            // output.
            let half_out_stride = view_real_as_complex(&f.out_stride, f.out_dist)?;
            let sub_frame = Frame {
                lengths: join(&[half], f.passengers()),
                in_stride: mid_stride,
                out_stride: half_out_stride.0,
                in_dist: mid_dist,
                out_dist: half_out_stride.1,
                in_type: ArrayType::ComplexInterleaved,
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let sub = build_1d(tree, pool, &sub_frame)?;
            tree.add_child(parent, sub);
        }
    }
    Ok(parent)
}

/// Real strides viewed as complex pairs: the unit innermost stride stays 1,
/// the others halve. Odd outer strides cannot alias complex elements.
fn view_real_as_complex(strides: &[usize], dist: usize) -> Result<(Vec<usize>, usize)> {
    let mut out = Vec::with_capacity(strides.len());
    for (i, &s) in strides.iter().enumerate() {
        if i == 0 {
            out.push(1);
        } else {
            if s % 2 != 0 {
                return Err(FftError::unsupported(
                    "real transform outer strides must be even",
                ));
            }
            out.push(s / 2);
        }
    }
    if dist % 2 != 0 {
        // A batch distance that splits a complex pair cannot be viewed.
        return Err(FftError::unsupported(
            "real transform batch distance must be even",
        ));
    }
    Ok((out, dist / 2))
}

fn build_real_3d_even(tree: &mut PlanTree, pool: &mut KernelPool<'_>, f: &Frame) -> Result<NodeId> {
    let (n0, l1, l2) = (f.lengths[0], f.lengths[1], f.lengths[2]);
    let herm = TransformDesc::hermitian_len(n0);
    let parent = tree.alloc(f.node(Scheme::Real3dEven));
    let (lay, dist) = packed(&[herm, l1, l2]);

    match f.direction {
        Direction::Forward => {
            let even_frame = Frame {
                lengths: vec![n0, l1, l2],
                out_stride: lay.clone(),
                out_dist: dist,
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let c0 = build_real_even_1d_with_passengers(tree, pool, &even_frame)?;

            let c1 = col_leaf(
                tree,
                pool,
                f,
                vec![l1, herm, l2],
                vec![lay[1], lay[0], lay[2]],
                vec![lay[1], lay[0], lay[2]],
                dist,
                dist,
                Boundary::Interior,
                0,
            )?;

            let c2 = col_leaf(
                tree,
                pool,
                f,
                vec![l2, herm, l1],
                vec![lay[2], lay[0], lay[1]],
                vec![f.out_stride[2], f.out_stride[0], f.out_stride[1]],
                dist,
                f.out_dist,
                Boundary::Last,
                0,
            )?;

            for c in [c0, c1, c2] {
                tree.add_child(parent, c);
            }
        }
        Direction::Inverse => {
            let c0 = col_leaf(
                tree,
                pool,
                f,
                vec![l2, herm, l1],
                vec![f.in_stride[2], f.in_stride[0], f.in_stride[1]],
                vec![lay[2], lay[0], lay[1]],
                f.in_dist,
                dist,
                Boundary::First,
                0,
            )?;

            let c1 = col_leaf(
                tree,
                pool,
                f,
                vec![l1, herm, l2],
                vec![lay[1], lay[0], lay[2]],
                vec![lay[1], lay[0], lay[2]],
                dist,
                dist,
                Boundary::Interior,
                0,
            )?;

            let even_frame = Frame {
                lengths: vec![n0, l1, l2],
                in_stride: lay,
                in_dist: dist,
                in_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let c2 = build_real_even_1d_with_passengers(tree, pool, &even_frame)?;

            for c in [c0, c1, c2] {
                tree.add_child(parent, c);
            }
        }
    }
    Ok(parent)
}

fn build_real_even_1d_with_passengers(
    tree: &mut PlanTree,
    pool: &mut KernelPool<'_>,
    f: &Frame,
) -> Result<NodeId> {
    let n0 = f.lengths[0];
    let half = n0 / 2;
    let herm = TransformDesc::hermitian_len(n0);
    let parent = tree.alloc(f.node(Scheme::RealTransformEven));

    match f.direction {
        Direction::Forward => {
            let (in_view, in_view_dist) = view_real_as_complex(&f.in_stride, f.in_dist)?;
            let (mid_stride, mid_dist) = packed(&join(&[half], f.passengers()));
            let sub_frame = Frame {
                lengths: join(&[half], f.passengers()),
                in_stride: in_view,
                out_stride: mid_stride.clone(),
                in_dist: in_view_dist,
                out_dist: mid_dist,
                in_type: ArrayType::ComplexInterleaved,
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let sub = build_1d(tree, pool, &sub_frame)?;

            let mut post = f.node(Scheme::KernelR2cPost);
            post.lengths = join(&[herm], f.passengers());
            post.in_stride = mid_stride;
            post.out_stride = f.out_stride.clone();
            post.in_dist = mid_dist;
            post.out_dist = f.out_dist;
            post.in_type = ArrayType::ComplexInterleaved;
            post.out_type = f.out_type;
            post.kernel = Some(KernelKey::new(Scheme::KernelR2cPost, herm, f.precision));
            post.small_twiddle = Some(TwiddleSpec::half_real(n0, f.precision));
            let post = tree.alloc(post);

            tree.add_child(parent, sub);
            tree.add_child(parent, post);
        }
        Direction::Inverse => {
            let (mid_stride, mid_dist) = packed(&join(&[half], f.passengers()));
            let mut pre = f.node(Scheme::KernelC2rPre);
            pre.lengths = join(&[herm], f.passengers());
            pre.in_stride = f.in_stride.clone();
            pre.out_stride = mid_stride.clone();
            pre.in_dist = f.in_dist;
            pre.out_dist = mid_dist;
            pre.in_type = f.in_type;
            pre.out_type = ArrayType::ComplexInterleaved;
            pre.kernel = Some(KernelKey::new(Scheme::KernelC2rPre, herm, f.precision));
            pre.small_twiddle = Some(TwiddleSpec::half_real(n0, f.precision));
            let pre = tree.alloc(pre);
            tree.add_child(parent, pre);

            let (out_view, out_view_dist) = view_real_as_complex(&f.out_stride, f.out_dist)?;
            let sub_frame = Frame {
                lengths: join(&[half], f.passengers()),
                in_stride: mid_stride,
                out_stride: out_view,
                in_dist: mid_dist,
                out_dist: out_view_dist,
                in_type: ArrayType::ComplexInterleaved,
                out_type: ArrayType::ComplexInterleaved,
                ..f.clone()
            };
            let sub = build_1d(tree, pool, &sub_frame)?;
            tree.add_child(parent, sub);
        }
    }
    Ok(parent)
}
