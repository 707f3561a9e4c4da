use crate::connection::Connection;
use fpga_common::geom::rect::TileRect;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Cut position sits halfway between two tile columns (or rows).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cut {
    pub axis: Axis,
    pub position: f32,
}

/// Ternary spatial tree over connection indices. Leaves carry the
/// connections; internal nodes split into disjoint `left`/`right` halves
/// and a `middle` holding the connections that straddle the cut.
#[derive(Debug)]
pub struct PartitionNode {
    pub bbox: TileRect,
    pub connections: Vec<usize>,
    pub cut: Option<Cut>,
    pub left: Option<Box<PartitionNode>>,
    pub right: Option<Box<PartitionNode>>,
    pub middle: Option<Box<PartitionNode>>,
}

impl PartitionNode {
    fn leaf(bbox: TileRect, connections: Vec<usize>) -> Self {
        Self {
            bbox,
            connections,
            cut: None,
            left: None,
            right: None,
            middle: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.cut.is_none()
    }

    pub fn depth(&self) -> usize {
        [&self.left, &self.right, &self.middle]
            .into_iter()
            .flatten()
            .map(|c| c.depth())
            .max()
            .map_or(1, |d| d + 1)
    }

    /// Connection indices in this subtree, middle first.
    pub fn collect(&self, out: &mut Vec<usize>) {
        if self.is_leaf() {
            out.extend_from_slice(&self.connections);
            return;
        }
        for child in [&self.middle, &self.left, &self.right].into_iter().flatten() {
            child.collect(out);
        }
    }
}

pub struct PartitionTree {
    pub root: PartitionNode,
}

impl PartitionTree {
    /// `order` lists connection indices in routing order; every node keeps
    /// that relative order.
    pub fn build(connections: &[Connection], order: &[usize], columns: i32, rows: i32) -> Self {
        let device_box = TileRect::new(0, (columns - 1).max(0), 0, (rows - 1).max(0));
        let spans: Vec<TileRect> = connections
            .iter()
            .map(|c| clamp_to(c.bbox, device_box))
            .collect();
        let root = build_node(&spans, device_box, order.to_vec());
        Self { root }
    }

    /// Hands out one `&mut` per connection, arranged like the tree.
    pub fn bind<'c>(&self, connections: &'c mut [Connection]) -> BoundNode<'c> {
        let mut slots: Vec<Option<&'c mut Connection>> = connections.iter_mut().map(Some).collect();
        bind_node(&self.root, &mut slots)
    }
}

fn clamp_to(r: TileRect, bounds: TileRect) -> TileRect {
    TileRect::new(
        r.min_x.clamp(bounds.min_x, bounds.max_x),
        r.max_x.clamp(bounds.min_x, bounds.max_x),
        r.min_y.clamp(bounds.min_y, bounds.max_y),
        r.max_y.clamp(bounds.min_y, bounds.max_y),
    )
}

/// Best balanced cut along one axis. `spans` yields each connection's
/// `(start, end)` offsets relative to the node's low edge.
fn best_cut_on_axis(
    spans: impl Iterator<Item = (i32, i32)>,
    size: i32,
    origin: i32,
    axis: Axis,
    best: &mut Option<(f32, Cut)>,
) {
    if size < 2 {
        return;
    }
    let n = (size - 1) as usize;
    let mut before = vec![0u32; n];
    let mut after = vec![0u32; n];
    for (start, end) in spans {
        if (start as usize) < n {
            before[start as usize] += 1;
        }
        let end = (end as usize).min(n);
        if end > 0 {
            after[end - 1] += 1;
        }
    }
    for i in 1..n {
        before[i] += before[i - 1];
    }
    for i in (0..n - 1).rev() {
        after[i] += after[i + 1];
    }

    let max_before = before[n - 1];
    let max_after = after[0];
    for i in 0..n {
        let (b, a) = (before[i], after[i]);
        if b == max_before || a == max_after {
            continue;
        }
        let score = b.abs_diff(a) as f32 / b.max(a) as f32;
        if best.is_none_or(|(s, _)| score < s) {
            *best = Some((
                score,
                Cut {
                    axis,
                    position: origin as f32 + i as f32 + 0.5,
                },
            ));
        }
    }
}

fn build_node(spans: &[TileRect], bbox: TileRect, connections: Vec<usize>) -> PartitionNode {
    let mut best = None;
    best_cut_on_axis(
        connections
            .iter()
            .map(|&i| (spans[i].min_x.max(bbox.min_x) - bbox.min_x, spans[i].max_x.min(bbox.max_x) - bbox.min_x)),
        bbox.width(),
        bbox.min_x,
        Axis::X,
        &mut best,
    );
    best_cut_on_axis(
        connections
            .iter()
            .map(|&i| (spans[i].min_y.max(bbox.min_y) - bbox.min_y, spans[i].max_y.min(bbox.max_y) - bbox.min_y)),
        bbox.height(),
        bbox.min_y,
        Axis::Y,
        &mut best,
    );

    let Some((_, cut)) = best else {
        return PartitionNode::leaf(bbox, connections);
    };

    let (mut left, mut right, mut middle) = (Vec::new(), Vec::new(), Vec::new());
    for &i in &connections {
        let (lo, hi) = match cut.axis {
            Axis::X => (spans[i].min_x, spans[i].max_x),
            Axis::Y => (spans[i].min_y, spans[i].max_y),
        };
        if (hi as f32) < cut.position {
            left.push(i);
        } else if (lo as f32) > cut.position {
            right.push(i);
        } else {
            middle.push(i);
        }
    }

    let split = cut.position.floor() as i32;
    let (left_box, right_box) = match cut.axis {
        Axis::X => (
            TileRect::new(bbox.min_x, split, bbox.min_y, bbox.max_y),
            TileRect::new(split + 1, bbox.max_x, bbox.min_y, bbox.max_y),
        ),
        Axis::Y => (
            TileRect::new(bbox.min_x, bbox.max_x, bbox.min_y, split),
            TileRect::new(bbox.min_x, bbox.max_x, split + 1, bbox.max_y),
        ),
    };

    PartitionNode {
        bbox,
        connections: Vec::new(),
        cut: Some(cut),
        left: Some(Box::new(build_node(spans, left_box, left))),
        right: Some(Box::new(build_node(spans, right_box, right))),
        middle: (!middle.is_empty()).then(|| Box::new(build_node(spans, bbox, middle))),
    }
}

/// A partition tree holding mutable connection references, so disjoint
/// subtrees can be routed on different threads.
pub struct BoundNode<'c> {
    pub connections: Vec<&'c mut Connection>,
    pub left: Option<Box<BoundNode<'c>>>,
    pub right: Option<Box<BoundNode<'c>>>,
    pub middle: Option<Box<BoundNode<'c>>>,
}

fn bind_node<'c>(node: &PartitionNode, slots: &mut [Option<&'c mut Connection>]) -> BoundNode<'c> {
    let mut bind_child =
        |child: &Option<Box<PartitionNode>>| child.as_ref().map(|c| Box::new(bind_node(c, slots)));
    let middle = bind_child(&node.middle);
    let left = bind_child(&node.left);
    let right = bind_child(&node.right);
    BoundNode {
        connections: node
            .connections
            .iter()
            .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
            .collect(),
        left,
        right,
        middle,
    }
}

impl BoundNode<'_> {
    /// Visits leaves in routing order: the middle subtree first, then both
    /// halves concurrently.
    pub fn route<F>(&mut self, f: &F)
    where
        F: Fn(&mut Connection) + Sync,
    {
        if let Some(middle) = self.middle.as_deref_mut() {
            middle.route(f);
        }
        match (self.left.as_deref_mut(), self.right.as_deref_mut()) {
            (Some(left), Some(right)) => {
                rayon::join(|| left.route(f), || right.route(f));
            }
            _ => {
                for conn in self.connections.iter_mut() {
                    f(conn);
                }
            }
        }
    }
}
