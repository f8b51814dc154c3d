//! The plan tree: an arena of execution nodes.
//!
//! The tree is built once by the tree builder, rewritten locally by the
//! fuse-shim pass, then frozen. Nodes live in a flat arena indexed by
//! [`NodeId`]; children are owned by their parent, parent links are
//! lookup-only, so no cycles and no shared ownership.

use crate::catalog::KernelKey;
use crate::describe::{ArrayType, Direction, Placement, Precision};
use crate::scheme::{SbrcVariant, Scheme, TransposeVariant};
use crate::twiddle::TwiddleSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Where a node reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    UserIn,
    UserOut,
    TempA,
    TempB,
    TempC,
    /// Plan-owned Bluestein chirp storage; never part of the A/B/C search.
    TempBluestein,
    /// Not yet decided by the buffer assigner.
    Unset,
}

impl BufferId {
    #[inline]
    pub fn is_temp(self) -> bool {
        matches!(self, BufferId::TempA | BufferId::TempB | BufferId::TempC)
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BufferId::UserIn => "USER_IN",
            BufferId::UserOut => "USER_OUT",
            BufferId::TempA => "TEMP_A",
            BufferId::TempB => "TEMP_B",
            BufferId::TempC => "TEMP_C",
            BufferId::TempBluestein => "TEMP_BLUESTEIN",
            BufferId::Unset => "UNSET",
        };
        f.write_str(s)
    }
}

/// One element of the plan tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub scheme: Scheme,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,

    /// Lengths at this level, fastest dimension first.
    pub lengths: Vec<usize>,
    pub in_stride: Vec<usize>,
    pub out_stride: Vec<usize>,
    pub in_dist: usize,
    pub out_dist: usize,
    pub batch: usize,

    pub precision: Precision,
    pub direction: Direction,
    pub placement: Placement,
    pub in_type: ArrayType,
    pub out_type: ArrayType,

    /// Full length of the enclosing large-1D transform on intermediate
    /// stages that apply the decomposed twiddle; 0 elsewhere.
    pub large1d: usize,
    pub transpose_variant: TransposeVariant,
    pub sbrc_variant: SbrcVariant,

    pub small_twiddle: Option<TwiddleSpec>,
    pub large_twiddle: Option<TwiddleSpec>,

    /// Catalog key, resolved for leaves.
    pub kernel: Option<KernelKey>,

    /// Leaf also reads the plan's Bluestein chirp buffer as a side input.
    pub bluestein_aux: bool,

    pub in_buf: BufferId,
    pub out_buf: BufferId,
}

impl Node {
    pub fn new(scheme: Scheme) -> Node {
        Node {
            scheme,
            parent: None,
            children: Vec::new(),
            lengths: Vec::new(),
            in_stride: Vec::new(),
            out_stride: Vec::new(),
            in_dist: 0,
            out_dist: 0,
            batch: 1,
            precision: Precision::Single,
            direction: Direction::Forward,
            placement: Placement::OutOfPlace,
            in_type: ArrayType::ComplexInterleaved,
            out_type: ArrayType::ComplexInterleaved,
            large1d: 0,
            transpose_variant: TransposeVariant::default(),
            sbrc_variant: SbrcVariant::default(),
            small_twiddle: None,
            large_twiddle: None,
            kernel: None,
            bluestein_aux: false,
            in_buf: BufferId::Unset,
            out_buf: BufferId::Unset,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.scheme.is_leaf()
    }

    /// Complex elements one batch of this node's output occupies.
    pub fn out_elements(&self) -> usize {
        self.lengths.iter().product::<usize>().max(1)
    }

    /// Bytes this node's output footprint spans across the batch. The batch
    /// distance covers the strided extent, not just the element count.
    pub fn out_bytes(&self) -> usize {
        self.out_dist.max(1) * self.batch * self.precision.complex_bytes()
    }
}

#[derive(Debug, Default)]
pub struct PlanTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl PlanTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> NodeId {
        self.root.expect("plan tree has no root")
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Replace `parent`'s children `[at, at + removed)` with `with`.
    pub fn splice_children(&mut self, parent: NodeId, at: usize, removed: usize, with: Vec<NodeId>) {
        for &c in &with {
            self.nodes[c.0].parent = Some(parent);
        }
        self.nodes[parent.0].children.splice(at..at + removed, with);
    }

    /// Leaves in execution order (post-order over the tree).
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(self.root(), &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = self.get(id);
        if node.is_leaf() {
            out.push(id);
        } else {
            for &c in &node.children {
                self.collect_leaves(c, out);
            }
        }
    }

    /// All nodes, post-order.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_post(self.root(), &mut out);
        out
    }

    fn walk_post(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &c in &self.get(id).children {
            self.walk_post(c, out);
        }
        out.push(id);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Multi-line rendering for logs and tests, one node per line.
    pub fn render(&self) -> String {
        let mut s = String::new();
        self.render_node(self.root(), 0, &mut s);
        s
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.get(id);
        use std::fmt::Write;
        let _ = writeln!(
            out,
            "{:indent$}{} len={:?} {}->{}",
            "",
            node.scheme,
            node.lengths,
            node.in_buf,
            node.out_buf,
            indent = depth * 2
        );
        for &c in &node.children {
            self.render_node(c, depth + 1, out);
        }
    }
}
