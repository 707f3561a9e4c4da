use fpga_common::db::device::{Device, ResourceClass};
use fpga_common::db::indices::{NetId, VertexId};
use fpga_common::geom::coord::TileCoord;
use fpga_common::util::config::BaseCostTable;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Legal number of nets per node.
pub const CAPACITY: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SourcePin,
    SinkPin,
    PinBounce,
    Wire,
    SuperLongLine,
    LagunaPin,
}

impl NodeKind {
    pub fn of(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Output => NodeKind::SourcePin,
            ResourceClass::PinFeed => NodeKind::SinkPin,
            ResourceClass::PinBounce => NodeKind::PinBounce,
            ResourceClass::SuperLong => NodeKind::SuperLongLine,
            ResourceClass::LagunaInput => NodeKind::LagunaPin,
            _ => NodeKind::Wire,
        }
    }
}

/// `f32` stored as raw bits so concurrent routing tasks can update costs.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn fetch_add(&self, delta: f32) -> f32 {
        let prev = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f32::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f32::from_bits(prev)
    }
}

#[derive(Default, Debug)]
struct Occupancy {
    /// net -> number of its connections routed through this node
    users: HashMap<NetId, u32>,
    /// upstream node -> number of connections entering from it
    drivers: HashMap<VertexId, u32>,
}

#[derive(Debug)]
pub struct RouteNode {
    vertex: VertexId,
    kind: NodeKind,
    class: ResourceClass,
    begin: TileCoord,
    end: TileCoord,
    length: i32,
    slr: u32,
    delay: f32,
    base_cost: f32,
    present_cost: AtomicF32,
    historical_cost: AtomicF32,
    occupancy: Mutex<Occupancy>,
    pub(crate) children: RwLock<Option<Arc<[VertexId]>>>,
}

impl RouteNode {
    pub fn new(
        device: &dyn Device,
        vertex: VertexId,
        kind: NodeKind,
        costs: &BaseCostTable,
        delay: f32,
    ) -> Self {
        let class = device.resource_class_of(vertex);
        let begin = device.begin_of(vertex);
        let end = device.end_of(vertex);
        let length = match kind {
            NodeKind::SuperLongLine => device.super_long_line_length(),
            _ => begin.manhattan(end),
        };
        Self {
            vertex,
            kind,
            class,
            begin,
            end,
            length,
            slr: device.slr_index(vertex),
            delay,
            base_cost: base_cost(kind, class, begin, end, length, costs),
            present_cost: AtomicF32::new(1.0),
            historical_cost: AtomicF32::new(1.0),
            occupancy: Mutex::new(Occupancy::default()),
            children: RwLock::new(None),
        }
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
    pub fn class(&self) -> ResourceClass {
        self.class
    }
    pub fn begin(&self) -> TileCoord {
        self.begin
    }
    pub fn end(&self) -> TileCoord {
        self.end
    }
    pub fn length(&self) -> i32 {
        self.length
    }
    pub fn slr(&self) -> u32 {
        self.slr
    }
    pub fn delay(&self) -> f32 {
        self.delay
    }
    pub fn base_cost(&self) -> f32 {
        self.base_cost
    }
    pub fn present_cost(&self) -> f32 {
        self.present_cost.load()
    }
    pub fn historical_cost(&self) -> f32 {
        self.historical_cost.load()
    }

    fn usage(&self) -> MutexGuard<'_, Occupancy> {
        self.occupancy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of distinct nets on this node.
    pub fn occupancy(&self) -> usize {
        self.usage().users.len()
    }

    pub fn is_overused(&self) -> bool {
        self.occupancy() > CAPACITY
    }

    pub fn users(&self) -> Vec<NetId> {
        self.usage().users.keys().copied().collect()
    }

    pub fn count_connections_of_user(&self, net: NetId) -> u32 {
        self.usage().users.get(&net).copied().unwrap_or(0)
    }

    pub fn increment_user(&self, net: NetId) {
        *self.usage().users.entry(net).or_insert(0) += 1;
    }

    pub fn decrement_user(&self, net: NetId) {
        let mut usage = self.usage();
        if let Some(count) = usage.users.get_mut(&net) {
            *count -= 1;
            if *count == 0 {
                usage.users.remove(&net);
            }
        }
    }

    pub fn increment_driver(&self, parent: VertexId) {
        *self.usage().drivers.entry(parent).or_insert(0) += 1;
    }

    pub fn decrement_driver(&self, parent: VertexId) {
        let mut usage = self.usage();
        if let Some(count) = usage.drivers.get_mut(&parent) {
            *count -= 1;
            if *count == 0 {
                usage.drivers.remove(&parent);
            }
        }
    }

    pub fn unique_driver_count(&self) -> usize {
        self.usage().drivers.len()
    }

    /// Recomputes the present-congestion cost from the current occupancy.
    /// A node already at capacity charges the next net to join it.
    /// Count and store both happen under the occupancy lock.
    pub fn update_present_cost(&self, present_factor: f32) {
        let usage = self.usage();
        self.present_cost
            .store(present_cost_for(usage.users.len(), present_factor));
    }

    pub fn update_historical_cost(&self, historical_factor: f32) {
        let occ = self.occupancy();
        if occ > CAPACITY {
            self.historical_cost
                .fetch_add((occ - CAPACITY) as f32 * historical_factor);
        }
    }
}

/// `1` below capacity, otherwise `1 + (overuse + 1) * factor`.
pub fn present_cost_for(occupancy: usize, present_factor: f32) -> f32 {
    if occupancy < CAPACITY {
        1.0
    } else {
        1.0 + (occupancy - CAPACITY + 1) as f32 * present_factor
    }
}

pub fn base_cost(
    kind: NodeKind,
    class: ResourceClass,
    begin: TileCoord,
    end: TileCoord,
    length: i32,
    costs: &BaseCostTable,
) -> f32 {
    let len = length.max(1) as f32;
    match kind {
        NodeKind::SourcePin => costs.source_pin,
        NodeKind::SinkPin | NodeKind::LagunaPin => costs.sink_pin,
        NodeKind::PinBounce => costs.pin,
        NodeKind::SuperLongLine => costs.wire * len,
        NodeKind::Wire => match class {
            ResourceClass::PinFeed | ResourceClass::PinBounce | ResourceClass::Output => {
                costs.pin
            }
            ResourceClass::Double if end.x != begin.x => costs.double * len,
            ResourceClass::Double => costs.double,
            ResourceClass::HQuad => costs.hquad * len,
            ResourceClass::VQuad if length != 0 => costs.vquad * len,
            ResourceClass::VQuad => costs.wire,
            ResourceClass::HLong => costs.hlong * len,
            ResourceClass::VLong => costs.vlong,
            _ if length > 0 => costs.wire * len,
            _ => costs.wire,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_cost_with_two_nets_and_half_factor() {
        assert_eq!(present_cost_for(2, 0.5), 2.0);
        assert_eq!(present_cost_for(0, 0.5), 1.0);
        assert_eq!(present_cost_for(1, 0.5), 1.5);
    }

    #[test]
    fn atomic_f32_accumulates() {
        let a = AtomicF32::new(1.0);
        assert_eq!(a.fetch_add(0.5), 1.0);
        assert_eq!(a.load(), 1.5);
        a.store(3.0);
        assert_eq!(a.load(), 3.0);
    }

    #[test]
    fn base_cost_scales_with_length_per_class() {
        let t = BaseCostTable::default();
        let o = TileCoord::new(0, 0);
        let e2 = TileCoord::new(2, 0);
        let n4 = TileCoord::new(0, 4);
        let dbl = base_cost(NodeKind::Wire, ResourceClass::Double, o, e2, 2, &t);
        assert!((dbl - 0.8).abs() < 1e-6);
        let vq = base_cost(NodeKind::Wire, ResourceClass::VQuad, o, n4, 4, &t);
        assert!((vq - 0.6).abs() < 1e-6);
        let vl = base_cost(NodeKind::Wire, ResourceClass::VLong, o, n4, 12, &t);
        assert!((vl - 0.7).abs() < 1e-6);
        let single = base_cost(NodeKind::Wire, ResourceClass::Single, o, o, 0, &t);
        assert!((single - 0.4).abs() < 1e-6);
        assert_eq!(base_cost(NodeKind::SourcePin, ResourceClass::Output, o, o, 0, &t), 1.0);
    }

    #[test]
    fn occupancy_counts_nets_not_connections() {
        use fpga_common::db::device::{FabricBuilder, TileClass, VertexSpec};
        let mut b = FabricBuilder::new(1, 1);
        let v = b
            .add_vertex(VertexSpec::new(
                "w",
                TileClass::Interconnect,
                ResourceClass::Single,
                TileCoord::new(0, 0),
                TileCoord::new(0, 0),
            ))
            .unwrap();
        let g = b.build().unwrap();
        let node = RouteNode::new(&g, v, NodeKind::Wire, &BaseCostTable::default(), 0.0);

        node.increment_user(NetId(0));
        node.increment_user(NetId(0));
        assert_eq!(node.occupancy(), 1);
        assert_eq!(node.count_connections_of_user(NetId(0)), 2);
        node.increment_user(NetId(1));
        assert!(node.is_overused());

        node.update_historical_cost(1.0);
        assert_eq!(node.historical_cost(), 2.0);
        node.update_present_cost(0.5);
        assert_eq!(node.present_cost(), 2.0);

        node.decrement_user(NetId(1));
        node.decrement_user(NetId(0));
        assert_eq!(node.count_connections_of_user(NetId(0)), 1);
        assert!(!node.is_overused());
    }
    #[test]
    fn present_cost_tracks_concurrent_users() {
        use fpga_common::db::device::{FabricBuilder, TileClass, VertexSpec};
        let mut b = FabricBuilder::new(1, 1);
        let v = b
            .add_vertex(VertexSpec::new(
                "w",
                TileClass::Interconnect,
                ResourceClass::Single,
                TileCoord::new(0, 0),
                TileCoord::new(0, 0),
            ))
            .unwrap();
        let g = b.build().unwrap();
        let node = RouteNode::new(&g, v, NodeKind::Wire, &BaseCostTable::default(), 0.0);

        std::thread::scope(|s| {
            for t in 0..4u32 {
                let node = &node;
                s.spawn(move || {
                    for i in 0..50u32 {
                        let net = NetId(t * 100 + i);
                        node.increment_user(net);
                        node.update_present_cost(0.5);
                        if i % 2 == 1 {
                            node.decrement_user(net);
                            node.update_present_cost(0.5);
                        }
                    }
                });
            }
        });

        assert_eq!(node.occupancy(), 100);
        assert_eq!(node.present_cost(), present_cost_for(100, 0.5));
    }
}
