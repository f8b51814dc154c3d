//! Buffer assignment: give every node an input and output identity.
//!
//! After fusing, the leaves form a linear pipeline: each leaf consumes the
//! buffer the previous leaf produced. The search walks that chain in order,
//! trying in-place first, then the user output as scratch, then the smallest
//! temp not currently holding live data. Among feasible assignments it keeps
//! the one with the smallest peak temporary footprint, breaking ties on the
//! number of out-of-place writes. Bluestein chirp leaves are pinned to the
//! plan-owned chirp buffer before the search and stay out of it.

use crate::describe::Placement;
use crate::error::{FftError, Result};
use crate::node::{BufferId, NodeId, PlanTree};

/// Region alignment for the work buffer partitions.
pub const WORK_BUFFER_ALIGN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Bytes required for TEMP_A, TEMP_B, TEMP_C, each aligned.
    pub temp_bytes: [usize; 3],
    pub oop_writes: usize,
}

impl Assignment {
    /// Total caller-visible work buffer requirement.
    pub fn work_bytes(&self) -> usize {
        self.temp_bytes.iter().sum()
    }
}

fn align_up(bytes: usize) -> usize {
    bytes.div_ceil(WORK_BUFFER_ALIGN) * WORK_BUFFER_ALIGN
}

struct SearchCtx<'t> {
    tree: &'t PlanTree,
    chain: Vec<NodeId>,
    placement: Placement,
    /// Extent of the caller's output buffer, for scratch feasibility.
    user_out_bytes: usize,
    /// Whether the caller's output is a planar pair; interleaved
    /// intermediates cannot be parked there if so.
    user_out_planar: bool,
    best: Option<(Score, Vec<BufferId>)>,
}

type Score = (usize, usize); // (work bytes, out-of-place writes)

pub fn assign_buffers(
    tree: &mut PlanTree,
    placement: Placement,
    user_out_bytes: usize,
) -> Result<Assignment> {
    let user_out_planar = {
        let root = tree.get(tree.root());
        root.out_type.is_planar()
    };
    let chain: Vec<NodeId> = tree
        .leaves()
        .into_iter()
        .filter(|&id| tree.get(id).in_buf == BufferId::Unset)
        .collect();
    if chain.is_empty() {
        return Err(FftError::unsupported("plan has no dispatchable leaves"));
    }

    let (score, picks) = {
        let mut ctx = SearchCtx {
            tree: &*tree,
            chain: chain.clone(),
            placement,
            user_out_bytes,
            user_out_planar,
            best: None,
        };
        let mut picks = Vec::with_capacity(ctx.chain.len());
        search(&mut ctx, 0, BufferId::UserIn, [0usize; 3], 0, &mut picks);
        ctx.best.take().ok_or_else(|| {
            FftError::unsupported("no feasible buffer assignment for this transform")
        })?
    };

    // Commit the winning outputs along the chain.
    let mut cur = BufferId::UserIn;
    let mut temp_bytes = [0usize; 3];
    for (&id, &out) in chain.iter().zip(&picks) {
        let node = tree.get_mut(id);
        node.in_buf = cur;
        node.out_buf = out;
        if let Some(t) = temp_index(out) {
            temp_bytes[t] = temp_bytes[t].max(align_up(node.out_bytes()));
        }
        cur = out;
    }

    propagate_to_internal(tree);
    log::debug!(
        "buffer assignment: work={} bytes, {} out-of-place writes\n{}",
        score.0,
        score.1,
        tree.render()
    );

    Ok(Assignment {
        temp_bytes,
        oop_writes: score.1,
    })
}

fn temp_index(buf: BufferId) -> Option<usize> {
    match buf {
        BufferId::TempA => Some(0),
        BufferId::TempB => Some(1),
        BufferId::TempC => Some(2),
        _ => None,
    }
}

fn search(
    ctx: &mut SearchCtx<'_>,
    idx: usize,
    cur: BufferId,
    temp_bytes: [usize; 3],
    oop: usize,
    picks: &mut Vec<BufferId>,
) {
    let partial: Score = (temp_bytes.iter().sum(), oop);
    if let Some((best, _)) = &ctx.best {
        if partial >= *best {
            return;
        }
    }
    if idx == ctx.chain.len() {
        ctx.best = Some((partial, picks.clone()));
        return;
    }

    let id = ctx.chain[idx];
    let last = idx + 1 == ctx.chain.len();

    let mut candidates: Vec<BufferId> = Vec::with_capacity(3);
    if last {
        candidates.push(BufferId::UserOut);
    } else {
        // In-place first (smallest working set), then the caller's output
        // as scratch, then the smallest temp not holding live data.
        candidates.push(cur);
        if cur != BufferId::UserOut {
            candidates.push(BufferId::UserOut);
        }
        for t in [BufferId::TempA, BufferId::TempB, BufferId::TempC] {
            if t != cur {
                candidates.push(t);
                break;
            }
        }
    }

    for out in candidates {
        if !feasible(ctx, id, cur, out) {
            continue;
        }
        let mut next_bytes = temp_bytes;
        if let Some(t) = temp_index(out) {
            next_bytes[t] = next_bytes[t].max(align_up(ctx.tree.get(id).out_bytes()));
        }
        let next_oop = oop + usize::from(out != cur);
        picks.push(out);
        search(ctx, idx + 1, out, next_bytes, next_oop, picks);
        picks.pop();
    }
}

/// Can leaf `id`, reading `cur`, write `out`?
fn feasible(ctx: &SearchCtx<'_>, id: NodeId, cur: BufferId, out: BufferId) -> bool {
    let node = ctx.tree.get(id);

    // The caller's input stays pristine for out-of-place plans; under an
    // in-place plan it is the output alias, and writing it is just the
    // in-place step.
    if out == BufferId::UserIn && !(ctx.placement == Placement::InPlace && cur == BufferId::UserIn)
    {
        return false;
    }

    // Planar user arrays never round-trip through interleaved temps.
    if node.out_type.is_planar() && !matches!(out, BufferId::UserOut | BufferId::UserIn) {
        return false;
    }

    if out == BufferId::UserOut {
        // The caller's output buffer must actually hold the intermediate,
        // and a planar pair cannot park interleaved scratch.
        if node.out_bytes() > ctx.user_out_bytes {
            return false;
        }
        if ctx.user_out_planar && !node.out_type.is_planar() {
            return false;
        }
    }

    // Writing the buffer being read means physically in-place, including
    // the aliased pair of an in-place plan.
    let aliased_inplace = ctx.placement == Placement::InPlace
        && cur == BufferId::UserIn
        && out == BufferId::UserOut;
    if out == cur || aliased_inplace {
        if node.scheme.info().forbids_inplace {
            return false;
        }
        if node.in_stride != node.out_stride || node.in_dist != node.out_dist {
            return false;
        }
    }
    true
}

/// Internal nodes take the boundary identities of their leaf span.
fn propagate_to_internal(tree: &mut PlanTree) {
    for id in tree.post_order() {
        if tree.get(id).is_leaf() {
            continue;
        }
        let children = tree.get(id).children.clone();
        if children.is_empty() {
            continue;
        }
        // Chirp leaves pinned to the Bluestein buffer sit outside the data
        // chain; the composite's boundary is the chain boundary.
        let in_buf = children
            .iter()
            .map(|&c| tree.get(c).in_buf)
            .find(|&b| b != BufferId::TempBluestein)
            .unwrap_or(BufferId::TempBluestein);
        let out_buf = children
            .iter()
            .rev()
            .map(|&c| tree.get(c).out_buf)
            .find(|&b| b != BufferId::TempBluestein)
            .unwrap_or(BufferId::TempBluestein);
        let node = tree.get_mut(id);
        node.in_buf = in_buf;
        node.out_buf = out_buf;
    }
}
