use crate::connection::Connection;
use crate::graph::node::CAPACITY;
use crate::graph::{NodeKind, RouteNode, RouteNodeGraph};
use crate::net::NetWrapper;
use fpga_common::db::device::ResourceClass;
use fpga_common::db::indices::VertexId;
use fpga_common::util::config::RouterConfig;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

const NO_PREV: u32 = u32::MAX;

#[derive(Copy, Clone, PartialEq)]
struct State {
    total: f32,
    partial: f32,
    index: u32,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| self.partial.total_cmp(&other.partial))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-thread search state indexed by vertex. A generation tag replaces
/// clearing the arrays between searches.
pub struct SearchScratch {
    prev: Vec<u32>,
    cost: Vec<f32>,
    visited_tag: Vec<u32>,
    current_tag: u32,
    heap: BinaryHeap<State>,
}

impl SearchScratch {
    pub fn new(capacity: usize) -> Self {
        Self {
            prev: vec![NO_PREV; capacity],
            cost: vec![f32::INFINITY; capacity],
            visited_tag: vec![0; capacity],
            current_tag: 1,
            heap: BinaryHeap::new(),
        }
    }

    fn ensure_capacity(&mut self, size: usize) {
        if size > self.prev.len() {
            self.prev.resize(size, NO_PREV);
            self.cost.resize(size, f32::INFINITY);
            self.visited_tag.resize(size, 0);
        }
    }

    fn reset(&mut self) {
        self.heap.clear();
        self.current_tag = self.current_tag.wrapping_add(1);
        if self.current_tag == 0 {
            self.visited_tag.fill(0);
            self.current_tag = 1;
        }
    }

    #[inline(always)]
    fn is_visited(&self, i: usize) -> bool {
        self.visited_tag[i] == self.current_tag
    }

    fn reconstruct_path(&self, sink: usize) -> Vec<VertexId> {
        let mut path = Vec::new();
        let mut cur = sink;
        loop {
            path.push(VertexId::new(cur));
            let prev = self.prev[cur];
            if prev == NO_PREV {
                break;
            }
            cur = prev as usize;
        }
        path.reverse();
        path
    }
}

thread_local! {
    static SCRATCH: RefCell<SearchScratch> = RefCell::new(SearchScratch::new(0));
}

/// Runs `f` with this thread's search scratch.
pub fn with_thread_scratch<R>(f: impl FnOnce(&mut SearchScratch) -> R) -> R {
    SCRATCH.with(|cell| f(&mut cell.borrow_mut()))
}

#[derive(Default, Debug)]
pub struct SearchStats {
    pub connections_routed: AtomicUsize,
    pub nodes_popped: AtomicUsize,
    pub nodes_pushed: AtomicUsize,
}

impl SearchStats {
    pub fn take_routed(&self) -> usize {
        self.connections_routed.swap(0, AtomicOrdering::Relaxed)
    }
}

/// Everything a search reads besides the connection itself. Shared by all
/// tasks routing within one iteration.
pub struct SearchContext<'a> {
    pub graph: &'a RouteNodeGraph,
    pub config: &'a RouterConfig,
    pub nets: &'a [NetWrapper],
    pub present_factor: f32,
    pub timing_weight: f32,
    pub stats: &'a SearchStats,
}

/// Criticality blend of the cost terms for one connection.
#[derive(Clone, Copy, Debug)]
pub struct CostWeights {
    pub node_cost: f32,
    pub share: f32,
    pub wirelength: f32,
    pub est_wirelength: f32,
    pub delay: f32,
    pub est_delay: f32,
}

impl CostWeights {
    pub fn new(config: &RouterConfig, criticality: f32, timing_weight: f32) -> Self {
        let crit = if config.timing_driven { criticality } else { 0.0 };
        let node_cost = 1.0 - crit;
        Self {
            node_cost,
            share: node_cost.powf(config.share_exponent),
            wirelength: node_cost * (1.0 - config.wirelength_weight),
            est_wirelength: node_cost * config.wirelength_weight,
            delay: crit * (1.0 - timing_weight) / 100.0,
            est_delay: crit * timing_weight,
        }
    }
}

/// Rips up `conn` and searches a new path for it. On failure the connection
/// is left unrouted.
pub fn route_connection(
    ctx: &SearchContext<'_>,
    conn: &mut Connection,
    scratch: &mut SearchScratch,
) -> bool {
    conn.rip_up(ctx.graph, ctx.present_factor);
    ctx.stats
        .connections_routed
        .fetch_add(1, AtomicOrdering::Relaxed);

    match find_path(ctx, conn, scratch) {
        Some(path) => {
            conn.commit(ctx.graph, path, ctx.present_factor);
            true
        }
        None => false,
    }
}

pub fn find_path(
    ctx: &SearchContext<'_>,
    conn: &Connection,
    scratch: &mut SearchScratch,
) -> Option<Vec<VertexId>> {
    let graph = ctx.graph;
    let config = ctx.config;
    let device = graph.device();
    let net = &ctx.nets[conn.wrapper];
    let timing = config.timing_driven;
    let weights = CostWeights::new(config, conn.criticality, ctx.timing_weight);

    let sink_node = graph.get_or_create(conn.sink, NodeKind::SinkPin);
    let sink_end = sink_node.end();
    let sll = device.super_long_line_length();

    scratch.ensure_capacity(device.num_vertices());
    scratch.reset();

    let start = conn.source.index();
    graph.get_or_create(conn.source, NodeKind::SourcePin);
    scratch.prev[start] = NO_PREV;
    scratch.cost[start] = 0.0;
    scratch.visited_tag[start] = scratch.current_tag;
    scratch.heap.push(State {
        total: 0.0,
        partial: 0.0,
        index: start as u32,
    });

    let mut popped = 0usize;
    let mut pushed = 1usize;
    let mut found = false;

    while let Some(State { partial, index, .. }) = scratch.heap.pop() {
        let cur = index as usize;
        if partial > scratch.cost[cur] {
            continue;
        }
        popped += 1;
        if cur == conn.sink.index() {
            found = true;
            break;
        }

        let Some(node) = graph.get(VertexId(index)) else {
            continue;
        };
        let long_parent = timing
            && matches!(node.class(), ResourceClass::HLong | ResourceClass::VLong);
        let children = graph.expand_children(node);

        for &v in children.iter() {
            let Some(child) = graph.get(v) else {
                continue;
            };
            let is_target = v == conn.sink;
            if !is_target && !is_explorable(ctx, conn, child, sink_end) {
                continue;
            }

            let same_net_uses = child.count_connections_of_user(conn.net);
            let sharing = 1.0 + weights.share * same_net_uses as f32;
            let node_cost = node_cost(ctx, net, child, same_net_uses, sharing, is_target);

            let mut new_partial = partial
                + weights.node_cost * node_cost
                + weights.wirelength * child.length() as f32 / sharing;
            if timing {
                new_partial +=
                    weights.delay * (child.delay() + graph.extra_delay(child, long_parent));
            }

            let end = child.end();
            let dx = (end.x - sink_end.x).abs();
            let mut dy = (end.y - sink_end.y).abs();
            if conn.cross_slr && child.slr().abs_diff(sink_node.slr()) == 1 {
                // adjacent SLRs closer than one SLL would overshoot
                let overshoot = dy - sll;
                if overshoot < 0 {
                    dy = sll - overshoot;
                }
            }

            let mut new_total =
                new_partial + weights.est_wirelength * (dx + dy) as f32 / sharing;
            if timing {
                new_total += weights.est_delay * (dx as f32 * 0.32 + dy as f32 * 0.16);
            }

            let i = v.index();
            if !scratch.is_visited(i) || new_partial < scratch.cost[i] {
                scratch.prev[i] = cur as u32;
                scratch.cost[i] = new_partial;
                scratch.visited_tag[i] = scratch.current_tag;
                scratch.heap.push(State {
                    total: new_total,
                    partial: new_partial,
                    index: i as u32,
                });
                pushed += 1;
            }
        }
    }

    ctx.stats
        .nodes_popped
        .fetch_add(popped, AtomicOrdering::Relaxed);
    ctx.stats
        .nodes_pushed
        .fetch_add(pushed, AtomicOrdering::Relaxed);

    found.then(|| scratch.reconstruct_path(conn.sink.index()))
}

fn is_explorable(
    ctx: &SearchContext<'_>,
    conn: &Connection,
    child: &RouteNode,
    sink_end: fpga_common::geom::coord::TileCoord,
) -> bool {
    let config = ctx.config;
    match child.kind() {
        NodeKind::SourcePin | NodeKind::SinkPin => false,
        NodeKind::LagunaPin => conn.cross_slr,
        NodeKind::SuperLongLine => true,
        NodeKind::Wire => {
            if config.use_bounding_box && !conn.in_bounding_box(child.end()) {
                return false;
            }
            config.use_u_turn_nodes || !ctx.graph.device().is_u_turn(child.vertex())
        }
        NodeKind::PinBounce => {
            if config.use_bounding_box && !conn.in_bounding_box(child.end()) {
                return false;
            }
            let end = child.end();
            end.x == sink_end.x && (end.y - sink_end.y).abs() <= 1
        }
    }
}

/// Congestion plus bias cost of entering `node`.
fn node_cost(
    ctx: &SearchContext<'_>,
    net: &NetWrapper,
    node: &RouteNode,
    same_net_uses: u32,
    sharing: f32,
    is_target: bool,
) -> f32 {
    let present = if same_net_uses > 0 {
        // the net is already counted in the occupancy
        let over = node.occupancy().saturating_sub(CAPACITY);
        1.0 + over as f32 * ctx.present_factor
    } else {
        node.present_cost()
    };

    let bias = if is_target {
        0.0
    } else {
        let end = node.end();
        node.base_cost() / net.num_connections().max(1) as f32
            * ((end.x as f32 - net.x_center).abs() + (end.y as f32 - net.y_center).abs())
            / net.double_hpwl
    };

    node.base_cost() * node.historical_cost() * present / sharing + bias
}
