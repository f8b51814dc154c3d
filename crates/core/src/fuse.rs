//! The fuse-shim pass: fewer launches, fewer global-memory round trips.
//!
//! Patterns match adjacent leaf pairs inside one parent's child list and
//! rewrite them into a single fused leaf when the catalog carries a kernel
//! for the combined shape. The pass runs bottom-up and repeats until no
//! pattern fires; a fuse at one level can expose another one level up.
//! Fuses only ever replace pure data-movement pairs; the mathematical
//! decomposition is never changed.

use crate::catalog::{KernelKey, KernelPool};
use crate::node::{Node, NodeId, PlanTree};
use crate::scheme::{Scheme, TransposeVariant};

/// Rewrite `tree` to fixed point. Returns the number of fuses applied.
pub fn fuse_shims(tree: &mut PlanTree, pool: &KernelPool<'_>) -> usize {
    let mut total = 0;
    loop {
        let mut changed = false;
        for id in tree.post_order() {
            if tree.get(id).is_leaf() {
                continue;
            }
            if fuse_children(tree, pool, id) {
                changed = true;
                total += 1;
            }
        }
        if !changed {
            break;
        }
    }
    if total > 0 {
        log::debug!("fuse pass applied {total} rewrites:\n{}", tree.render());
    }
    total
}

/// Try each window of `parent`'s children once; returns true on the first
/// rewrite (the caller loops to fixed point).
fn fuse_children(tree: &mut PlanTree, pool: &KernelPool<'_>, parent: NodeId) -> bool {
    let children = tree.get(parent).children.clone();

    // Transposes that move nothing get dropped before any pairing, so a
    // pointless copy never ends up fused into a kernel.
    for i in 0..children.len() {
        if drop_noop_transpose(tree, parent, &children, i) {
            return true;
        }
    }

    for i in 0..children.len() {
        if i + 1 >= children.len() {
            continue;
        }
        let (a, b) = (children[i], children[i + 1]);
        if !tree.get(a).is_leaf() || !tree.get(b).is_leaf() {
            continue;
        }
        if !flows_into(tree.get(a), tree.get(b)) {
            continue;
        }
        let pair = (tree.get(a).scheme, tree.get(b).scheme);
        let fused = match pair {
            (Scheme::KernelStockham, Scheme::KernelTranspose) => {
                fuse_stockham_transpose(tree, pool, a, b)
            }
            (Scheme::KernelR2cPost, Scheme::KernelTranspose) => {
                fuse_r2c_post_transpose(tree, pool, a, b)
            }
            (Scheme::KernelTranspose, Scheme::KernelC2rPre) => {
                fuse_transpose_c2r_pre(tree, pool, a, b)
            }
            (Scheme::KernelStockhamBlockCc, Scheme::KernelTranspose) => {
                fold_sbcc_transpose(tree, pool, a, b)
            }
            _ => None,
        };
        if let Some(node) = fused {
            let new_id = tree.alloc(node);
            tree.splice_children(parent, i, 2, vec![new_id]);
            return true;
        }
    }
    false
}

/// Producer/consumer stride continuity: `b` reads exactly the layout `a`
/// wrote. Buffer identities are not assigned yet, so geometry is the test.
fn flows_into(a: &Node, b: &Node) -> bool {
    a.out_dist == b.in_dist && a.out_type == b.in_type
}

fn drop_noop_transpose(
    tree: &mut PlanTree,
    parent: NodeId,
    children: &[NodeId],
    i: usize,
) -> bool {
    let id = children[i];
    let node = tree.get(id);
    if node.scheme != Scheme::KernelTranspose || children.len() < 2 {
        return false;
    }
    // Only interior copies with identical source and destination layouts
    // are no-ops; boundary transposes carry the caller's strides or types.
    let interior = i > 0 && i + 1 < children.len();
    if !interior
        || node.large1d != 0
        || node.in_type != node.out_type
        || node.in_stride != node.out_stride
        || node.in_dist != node.out_dist
    {
        return false;
    }
    log::debug!("dropping no-op transpose at child {i}");
    tree.splice_children(parent, i, 1, Vec::new());
    true
}

/// Stockham followed by a transpose becomes the diagonal-store kernel for
/// power-of-two lengths.
fn fuse_stockham_transpose(
    tree: &PlanTree,
    pool: &KernelPool<'_>,
    a: NodeId,
    b: NodeId,
) -> Option<Node> {
    let (r, t) = (tree.get(a), tree.get(b));
    let len = r.lengths[0];
    if !len.is_power_of_two() || r.lengths.len() > 3 {
        return None;
    }
    // The transpose must consume the row kernel's layout unchanged.
    if t.lengths != r.lengths || t.in_stride != r.out_stride {
        return None;
    }
    let key = KernelKey::new(Scheme::KernelStockhamTranspose, len, r.precision);
    pool.lookup(&key)?;

    let mut fused = r.clone();
    fused.scheme = Scheme::KernelStockhamTranspose;
    fused.kernel = Some(key);
    fused.out_stride = t.out_stride.clone();
    fused.out_dist = t.out_dist;
    fused.out_type = t.out_type;
    fused.transpose_variant = TransposeVariant::Diagonal;
    fused.large1d = t.large1d;
    fused.large_twiddle = t.large_twiddle.clone();
    fused.children = Vec::new();
    Some(fused)
}

/// Hermitian unpack fused with the following transpose. Fused entries are
/// registered under the complex half length.
fn fuse_r2c_post_transpose(
    tree: &PlanTree,
    pool: &KernelPool<'_>,
    a: NodeId,
    b: NodeId,
) -> Option<Node> {
    let (post, t) = (tree.get(a), tree.get(b));
    let half = post.lengths[0].checked_sub(1)?;
    if t.lengths != post.lengths || t.in_stride != post.out_stride || t.large1d != 0 {
        return None;
    }
    let key = KernelKey::new(Scheme::KernelR2cPostTranspose, half, post.precision);
    pool.lookup(&key)?;

    let mut fused = post.clone();
    fused.scheme = Scheme::KernelR2cPostTranspose;
    fused.kernel = Some(key);
    fused.out_stride = t.out_stride.clone();
    fused.out_dist = t.out_dist;
    fused.out_type = t.out_type;
    fused.children = Vec::new();
    Some(fused)
}

/// Transpose fused with the following hermitian pack. The transpose's dims
/// may be listed in a different order than the pack's; remap its input
/// strides into the pack's dim order before folding them in.
fn fuse_transpose_c2r_pre(
    tree: &PlanTree,
    pool: &KernelPool<'_>,
    a: NodeId,
    b: NodeId,
) -> Option<Node> {
    let (t, pre) = (tree.get(a), tree.get(b));
    let half = pre.lengths[0].checked_sub(1)?;
    if t.large1d != 0 || t.out_dist != pre.in_dist {
        return None;
    }
    let remapped = remap_strides(
        &t.lengths,
        &t.out_stride,
        &t.in_stride,
        &pre.lengths,
        &pre.in_stride,
    )?;
    let key = KernelKey::new(Scheme::KernelTransposeC2rPre, half, pre.precision);
    pool.lookup(&key)?;

    let mut fused = pre.clone();
    fused.scheme = Scheme::KernelTransposeC2rPre;
    fused.kernel = Some(key);
    fused.in_stride = remapped;
    fused.in_dist = t.in_dist;
    fused.in_type = t.in_type;
    fused.children = Vec::new();
    Some(fused)
}

/// For each consumer dim, find the producer dim writing the layout the
/// consumer reads and return the producer's input stride in consumer dim
/// order. Fails when the two nodes do not describe the same layout.
fn remap_strides(
    prod_lengths: &[usize],
    prod_out: &[usize],
    prod_in: &[usize],
    cons_lengths: &[usize],
    cons_in: &[usize],
) -> Option<Vec<usize>> {
    if prod_lengths.len() != cons_lengths.len() {
        return None;
    }
    let mut used = vec![false; prod_lengths.len()];
    let mut out = Vec::with_capacity(cons_lengths.len());
    for (cl, cs) in cons_lengths.iter().zip(cons_in) {
        let q = (0..prod_lengths.len()).find(|&q| {
            !used[q] && prod_lengths[q] == *cl && prod_out[q] == *cs
        })?;
        used[q] = true;
        out.push(prod_in[q]);
    }
    Some(out)
}

/// An SBCC kernel whose entry supports a transposed store absorbs a
/// trailing transpose at the end of a large-1D chain.
fn fold_sbcc_transpose(
    tree: &PlanTree,
    pool: &KernelPool<'_>,
    a: NodeId,
    b: NodeId,
) -> Option<Node> {
    let (cc, t) = (tree.get(a), tree.get(b));
    if t.large1d != 0 || t.lengths != cc.lengths || t.in_stride != cc.out_stride {
        return None;
    }
    let entry = pool.lookup(cc.kernel.as_ref()?)?;
    if !entry.folds_output_transpose {
        return None;
    }
    let mut fused = cc.clone();
    fused.out_stride = t.out_stride.clone();
    fused.out_dist = t.out_dist;
    fused.out_type = t.out_type;
    fused.children = Vec::new();
    Some(fused)
}
