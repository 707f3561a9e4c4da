use crate::graph::exclusion::{ExclusionPolicy, FabricExclusion};
use crate::graph::latch::CountingLatch;
use crate::graph::node::{NodeKind, RouteNode};
use crate::timing::{DelayModel, DeviceDelay};
use dashmap::DashMap;
use fpga_common::db::device::Device;
use fpga_common::db::indices::{NetId, VertexId};
use fpga_common::util::config::{BaseCostTable, RouterConfig};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Routing resource graph. Nodes live in a flat arena indexed by device
/// vertex and are materialized the first time anything references them.
pub struct RouteNodeGraph {
    device: Arc<dyn Device>,
    costs: BaseCostTable,
    exclusion: Box<dyn ExclusionPolicy>,
    delay_model: Option<Box<dyn DelayModel>>,
    nodes: Vec<OnceLock<Box<RouteNode>>>,
    created: AtomicUsize,
    preserved: DashMap<VertexId, NetId>,
    pending: CountingLatch,
    next_laguna: Vec<i32>,
    prev_laguna: Vec<i32>,
}

impl RouteNodeGraph {
    pub fn new(device: Arc<dyn Device>, config: &RouterConfig) -> Self {
        let exclusion = Box::new(FabricExclusion {
            mask_clock_boundary: config.mask_nodes_cross_rclk,
        });
        let delay_model: Option<Box<dyn DelayModel>> = if config.timing_driven {
            Some(Box::new(DeviceDelay))
        } else {
            None
        };
        Self::with_policies(device, config.base_cost.clone(), exclusion, delay_model)
    }

    pub fn with_policies(
        device: Arc<dyn Device>,
        costs: BaseCostTable,
        exclusion: Box<dyn ExclusionPolicy>,
        delay_model: Option<Box<dyn DelayModel>>,
    ) -> Self {
        let n = device.num_vertices();
        let mut nodes = Vec::with_capacity(n);
        nodes.resize_with(n, OnceLock::new);

        let (next_laguna, prev_laguna) = laguna_lookup(device.columns(), device.laguna_columns());

        Self {
            device,
            costs,
            exclusion,
            delay_model,
            nodes,
            created: AtomicUsize::new(0),
            preserved: DashMap::new(),
            pending: CountingLatch::new(),
            next_laguna,
            prev_laguna,
        }
    }

    pub fn device(&self) -> &dyn Device {
        &*self.device
    }

    pub fn kind_of(&self, v: VertexId) -> NodeKind {
        NodeKind::of(self.device.resource_class_of(v))
    }

    #[inline]
    pub fn get(&self, v: VertexId) -> Option<&RouteNode> {
        self.nodes.get(v.index()).and_then(|slot| slot.get()).map(|b| &**b)
    }

    /// Returns the node for `v`, creating it with `kind` on first reference.
    /// Concurrent callers racing on the same vertex all observe one node.
    pub fn get_or_create(&self, v: VertexId, kind: NodeKind) -> &RouteNode {
        self.nodes[v.index()].get_or_init(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            let delay = self
                .delay_model
                .as_ref()
                .map(|m| m.node_delay(&*self.device, v))
                .unwrap_or(0.0);
            Box::new(RouteNode::new(&*self.device, v, kind, &self.costs, delay))
        })
    }

    pub fn extra_delay(&self, child: &RouteNode, long_parent: bool) -> f32 {
        self.delay_model
            .as_ref()
            .map(|m| m.extra_delay(&*self.device, child.vertex(), long_parent))
            .unwrap_or(0.0)
    }

    /// Downstream vertices of `node` that the router may enter. Computed on
    /// first use and cached until a vertex below it is unpreserved.
    pub fn expand_children(&self, node: &RouteNode) -> Arc<[VertexId]> {
        if let Some(children) = node
            .children
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Arc::clone(children);
        }

        let parent = node.vertex();
        let children: Arc<[VertexId]> = self
            .device
            .downstream_of(parent)
            .iter()
            .copied()
            .filter(|&child| {
                !self.preserved.contains_key(&child)
                    && !self.exclusion.is_excluded(&*self.device, parent, child)
            })
            .collect();
        for &child in children.iter() {
            self.get_or_create(child, self.kind_of(child));
        }

        let mut slot = node
            .children
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slot.get_or_insert(children))
    }

    /// Claims `v` for `net`. Returns the other owner if it was already taken.
    pub fn preserve(&self, v: VertexId, net: NetId) -> Option<NetId> {
        let owner = *self.preserved.entry(v).or_insert(net);
        (owner != net).then_some(owner)
    }

    pub fn preserve_all(&self, vertices: &[VertexId], net: NetId) -> usize {
        vertices
            .iter()
            .filter(|&&v| self.preserve(v, net).is_some())
            .count()
    }

    /// Preserves on the rayon pool; `await_preserve` must run before searching.
    pub fn async_preserve(self: &Arc<Self>, net: NetId, vertices: Vec<VertexId>) {
        self.pending.count_up();
        let graph = Arc::clone(self);
        rayon::spawn(move || {
            let conflicts = graph.preserve_all(&vertices, net);
            if conflicts > 0 {
                log::warn!(
                    "{:?}: {} vertices already preserved by another net",
                    net,
                    conflicts
                );
            }
            graph.pending.count_down();
        });
    }

    pub fn await_preserve(&self) {
        self.pending.wait();
    }

    /// Releases `v` and drops cached child lists that were filtered against it.
    pub fn unpreserve(&self, v: VertexId) -> bool {
        if self.preserved.remove(&v).is_none() {
            return false;
        }
        for &up in self.device.upstream_of(v) {
            if let Some(parent) = self.get(up) {
                *parent
                    .children
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            }
        }
        true
    }

    pub fn preserved_net(&self, v: VertexId) -> Option<NetId> {
        self.preserved.get(&v).map(|entry| *entry.value())
    }

    pub fn num_preserved(&self) -> usize {
        self.preserved.len()
    }

    pub fn preserved_vertices_of(&self, net: NetId) -> Vec<VertexId> {
        self.preserved
            .iter()
            .filter(|entry| *entry.value() == net)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn num_nodes_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RouteNode> {
        self.nodes.iter().filter_map(|slot| slot.get()).map(|b| &**b)
    }

    /// End-of-iteration cost update. Returns the nodes still overused.
    pub fn update_costs(&self, present_factor: f32, historical_factor: f32) -> Vec<VertexId> {
        let mut overused: Vec<VertexId> = self
            .nodes
            .par_iter()
            .filter_map(|slot| slot.get())
            .filter_map(|node| {
                let overused = node.is_overused();
                if overused {
                    node.update_historical_cost(historical_factor);
                }
                node.update_present_cost(present_factor);
                overused.then_some(node.vertex())
            })
            .collect();
        overused.sort_unstable();
        overused
    }

    pub fn overused_nodes(&self) -> Vec<VertexId> {
        self.nodes()
            .filter(|n| n.is_overused())
            .map(|n| n.vertex())
            .collect()
    }

    /// First Laguna column at or right of `x`.
    pub fn next_laguna_column(&self, x: i32) -> Option<i32> {
        lookup(&self.next_laguna, x).filter(|&c| c != i32::MAX)
    }

    /// Last Laguna column at or left of `x`.
    pub fn prev_laguna_column(&self, x: i32) -> Option<i32> {
        lookup(&self.prev_laguna, x).filter(|&c| c != i32::MIN)
    }
}

fn lookup(table: &[i32], x: i32) -> Option<i32> {
    if x < 0 {
        return None;
    }
    table.get(x as usize).copied()
}

fn laguna_lookup(columns: i32, laguna: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let n = columns.max(0) as usize;
    let mut next = vec![i32::MAX; n];
    let mut prev = vec![i32::MIN; n];

    let mut nearest = i32::MAX;
    for x in (0..n).rev() {
        if laguna.binary_search(&(x as i32)).is_ok() {
            nearest = x as i32;
        }
        next[x] = nearest;
    }
    let mut nearest = i32::MIN;
    for x in 0..n {
        if laguna.binary_search(&(x as i32)).is_ok() {
            nearest = x as i32;
        }
        prev[x] = nearest;
    }
    (next, prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::device::{FabricBuilder, ResourceClass, TileClass, VertexSpec};
    use fpga_common::geom::coord::TileCoord;

    fn fan_out() -> (Arc<dyn Device>, Vec<VertexId>) {
        let mut b = FabricBuilder::new(8, 2);
        let mut v = Vec::new();
        let specs = [
            ("root", TileClass::Interconnect, ResourceClass::Single),
            ("a", TileClass::Interconnect, ResourceClass::Single),
            ("b", TileClass::Interconnect, ResourceClass::Single),
            ("site", TileClass::Site, ResourceClass::PinFeed),
            ("rt", TileClass::Interconnect, ResourceClass::Single),
        ];
        for (i, (name, tile, class)) in specs.into_iter().enumerate() {
            let c = TileCoord::new(i as i32, 0);
            v.push(b.add_vertex(VertexSpec::new(name, tile, class, c, c)).unwrap());
        }
        b.add_edge(v[0], v[1]);
        b.add_edge(v[0], v[2]);
        b.add_edge(v[0], v[3]);
        b.add_route_through(v[0], v[4]);
        b.set_laguna_columns(vec![2, 5]);
        (Arc::new(b.build().unwrap()), v)
    }

    #[test]
    fn children_skip_sites_route_throughs_and_preserved() {
        let (device, v) = fan_out();
        let graph = RouteNodeGraph::new(device, &RouterConfig::default());
        graph.preserve(v[2], NetId(9));

        let root = graph.get_or_create(v[0], NodeKind::Wire);
        let children = graph.expand_children(root);
        assert_eq!(&*children, &[v[1]]);
        assert!(graph.get(v[1]).is_some());
        assert!(graph.get(v[3]).is_none());

        assert!(graph.unpreserve(v[2]));
        assert!(!graph.unpreserve(v[2]));
        let root = graph.get(v[0]).unwrap();
        assert_eq!(&*graph.expand_children(root), &[v[1], v[2]]);
    }

    #[test]
    fn creation_is_single_winner() {
        let (device, v) = fan_out();
        let graph = RouteNodeGraph::new(device, &RouterConfig::default());
        let ptrs: Vec<usize> = (0..64)
            .into_par_iter()
            .map(|_| graph.get_or_create(v[1], NodeKind::Wire) as *const RouteNode as usize)
            .collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(graph.num_nodes_created(), 1);
    }

    #[test]
    fn async_preserve_is_complete_after_await() {
        let (device, v) = fan_out();
        let graph = Arc::new(RouteNodeGraph::new(device, &RouterConfig::default()));
        graph.async_preserve(NetId(1), vec![v[1], v[2]]);
        graph.async_preserve(NetId(2), vec![v[4]]);
        graph.await_preserve();
        assert_eq!(graph.preserved_net(v[1]), Some(NetId(1)));
        assert_eq!(graph.preserved_net(v[4]), Some(NetId(2)));
        assert_eq!(graph.preserve(v[1], NetId(3)), Some(NetId(1)));
        assert_eq!(graph.preserve(v[1], NetId(1)), None);
        assert_eq!(graph.num_preserved(), 3);
    }

    #[test]
    fn laguna_neighbours() {
        let (device, _) = fan_out();
        let graph = RouteNodeGraph::new(device, &RouterConfig::default());
        assert_eq!(graph.next_laguna_column(0), Some(2));
        assert_eq!(graph.next_laguna_column(3), Some(5));
        assert_eq!(graph.next_laguna_column(6), None);
        assert_eq!(graph.prev_laguna_column(4), Some(2));
        assert_eq!(graph.prev_laguna_column(1), None);
    }

    #[test]
    fn cost_update_reports_overuse_and_grows_history() {
        let (device, v) = fan_out();
        let graph = RouteNodeGraph::new(device, &RouterConfig::default());
        let n = graph.get_or_create(v[1], NodeKind::Wire);
        n.increment_user(NetId(0));
        n.increment_user(NetId(1));
        assert_eq!(graph.update_costs(0.5, 1.0), vec![v[1]]);
        assert_eq!(n.historical_cost(), 2.0);
        assert_eq!(n.present_cost(), 2.0);
        graph.update_costs(1.0, 1.0);
        assert_eq!(n.historical_cost(), 3.0);
    }
}
