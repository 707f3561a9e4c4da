use crate::graph::RouteNodeGraph;
use crate::net::NetWrapper;
use fpga_common::db::indices::{ConnectionId, NetId, PinId, VertexId};
use fpga_common::geom::coord::TileCoord;
use fpga_common::geom::rect::TileRect;
use std::collections::{HashMap, HashSet};

/// One source-to-sink pair of a net.
#[derive(Clone, Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub net: NetId,
    /// Index of the owning `NetWrapper`.
    pub wrapper: usize,
    pub source_pin: PinId,
    pub sink_pin: PinId,
    pub source: VertexId,
    pub sink: VertexId,
    pub alt_source: Option<(PinId, VertexId)>,
    /// Vertices from source to sink, inclusive. Empty while unrouted.
    pub path: Vec<VertexId>,
    pub bbox: TileRect,
    pub hpwl: i32,
    pub criticality: f32,
    pub delay: f32,
    pub direct: bool,
    pub cross_slr: bool,
    pub routed: bool,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        net: NetId,
        wrapper: usize,
        (source_pin, source): (PinId, VertexId),
        (sink_pin, sink): (PinId, VertexId),
    ) -> Self {
        Self {
            id,
            net,
            wrapper,
            source_pin,
            sink_pin,
            source,
            sink,
            alt_source: None,
            path: Vec::new(),
            bbox: TileRect::default(),
            hpwl: 0,
            criticality: 0.0,
            delay: 0.0,
            direct: false,
            cross_slr: false,
            routed: false,
        }
    }

    /// Refreshes the per-endpoint facts that depend on which source is used.
    pub fn update_endpoints(&mut self, graph: &RouteNodeGraph) {
        let device = graph.device();
        let s = device.end_of(self.source);
        let t = device.end_of(self.sink);
        self.hpwl = (s.x - t.x).abs() + 1 + (s.y - t.y).abs() + 1;
        self.cross_slr = device.slr_index(self.source) != device.slr_index(self.sink);
    }

    pub fn compute_bounding_box(
        &mut self,
        graph: &RouteNodeGraph,
        wrapper: &NetWrapper,
        ext_x: i32,
        ext_y: i32,
    ) {
        let device = graph.device();
        let s = device.end_of(self.source);
        let t = device.end_of(self.sink);
        let xc = wrapper.x_center.ceil() as i32;
        let yc = wrapper.y_center.ceil() as i32;

        let mut x_min = s.x.min(t.x).min(xc);
        let mut x_max = s.x.max(t.x).max(xc);
        let y_min = s.y.min(t.y).min(yc);
        let y_max = s.y.max(t.y).max(yc);

        if self.cross_slr {
            // at least one Laguna column inside before extension
            if let Some(c) = graph.next_laguna_column(x_min) {
                x_max = x_max.max(c);
            }
            if let Some(c) = graph.prev_laguna_column(x_max) {
                x_min = x_min.min(c);
            }
        }

        let mut bbox = TileRect::new(x_min - ext_x, x_max + ext_x, y_min - ext_y, y_max + ext_y);

        if self.cross_slr {
            let sll = device.super_long_line_length();
            if (bbox.max_y - bbox.min_y - 1) - sll < 0 {
                if s.y <= t.y {
                    bbox.max_y = y_min + sll + 1;
                } else {
                    bbox.min_y = y_max - sll - 1;
                }
            }
        }

        bbox.clamp_min(-1);
        self.bbox = bbox;
    }

    pub fn enlarge_bounding_box(&mut self, dx: i32, dy: i32) {
        self.bbox.expand(dx, dy);
        self.bbox.clamp_min(-1);
    }

    #[inline]
    pub fn in_bounding_box(&self, p: TileCoord) -> bool {
        self.bbox.contains_strict(p)
    }

    pub fn is_congested(&self, graph: &RouteNodeGraph) -> bool {
        self.path
            .iter()
            .any(|&v| graph.get(v).is_some_and(|n| n.is_overused()))
    }

    /// Releases the current path and refreshes the cost of every node it held.
    pub fn rip_up(&mut self, graph: &RouteNodeGraph, present_factor: f32) {
        for &v in &self.path {
            if let Some(node) = graph.get(v) {
                node.decrement_user(self.net);
                node.update_present_cost(present_factor);
            }
        }
        for hop in self.path.windows(2) {
            if let Some(node) = graph.get(hop[1]) {
                node.decrement_driver(hop[0]);
            }
        }
        self.path.clear();
        self.routed = false;
    }

    /// Claims `path` for this connection's net.
    pub fn commit(&mut self, graph: &RouteNodeGraph, path: Vec<VertexId>, present_factor: f32) {
        for &v in &path {
            let node = graph.get_or_create(v, graph.kind_of(v));
            node.increment_user(self.net);
            node.update_present_cost(present_factor);
        }
        for hop in path.windows(2) {
            if let Some(node) = graph.get(hop[1]) {
                node.increment_driver(hop[0]);
            }
        }
        self.path = path;
        self.routed = true;
    }

    pub fn path_delay(&self, graph: &RouteNodeGraph) -> f32 {
        self.path
            .iter()
            .filter_map(|&v| graph.get(v))
            .map(|n| n.delay())
            .sum()
    }

    /// Makes the alternate source the primary one. Returns false when the net
    /// has no alternate.
    pub fn swap_source(&mut self) -> bool {
        let Some((pin, vertex)) = self.alt_source else {
            return false;
        };
        self.alt_source = Some((self.source_pin, self.source));
        self.source_pin = pin;
        self.source = vertex;
        true
    }

    /// Rebuilds the path from a net's existing routed edges by walking
    /// driver links back from the sink.
    pub fn path_from_edges(&self, drivers: &HashMap<VertexId, VertexId>) -> Option<Vec<VertexId>> {
        let mut path = vec![self.sink];
        let mut seen = HashSet::from([self.sink]);
        let mut cur = self.sink;
        while cur != self.source {
            let prev = *drivers.get(&cur)?;
            if !seen.insert(prev) {
                return None;
            }
            path.push(prev);
            cur = prev;
        }
        path.reverse();
        Some(path)
    }

    /// Walks `prev` back from the sink until a vertex without a predecessor.
    /// The returned path starts at that root, which need not be `source`.
    pub fn path_to_root(&self, prev: &HashMap<VertexId, VertexId>) -> Option<Vec<VertexId>> {
        let mut path = vec![self.sink];
        let mut seen = HashSet::from([self.sink]);
        let mut cur = self.sink;
        while let Some(&p) = prev.get(&cur) {
            if !seen.insert(p) {
                return None;
            }
            path.push(p);
            cur = p;
        }
        if path.len() < 2 {
            return None;
        }
        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new(
            ConnectionId(0),
            NetId(0),
            0,
            (PinId(0), VertexId(0)),
            (PinId(1), VertexId(3)),
        )
    }

    #[test]
    fn path_is_recovered_from_edge_drivers() {
        let c = conn();
        let drivers = HashMap::from([
            (VertexId(3), VertexId(2)),
            (VertexId(2), VertexId(1)),
            (VertexId(1), VertexId(0)),
        ]);
        assert_eq!(
            c.path_from_edges(&drivers),
            Some(vec![VertexId(0), VertexId(1), VertexId(2), VertexId(3)])
        );

        let cyclic = HashMap::from([(VertexId(3), VertexId(2)), (VertexId(2), VertexId(3))]);
        assert_eq!(c.path_from_edges(&cyclic), None);
        assert_eq!(c.path_from_edges(&HashMap::new()), None);
    }

    #[test]
    fn swap_source_round_trips() {
        let mut c = conn();
        assert!(!c.swap_source());
        c.alt_source = Some((PinId(7), VertexId(9)));
        assert!(c.swap_source());
        assert_eq!(c.source, VertexId(9));
        assert_eq!(c.alt_source, Some((PinId(0), VertexId(0))));
    }

    #[test]
    fn enlarging_keeps_floor_at_minus_one() {
        let mut c = conn();
        c.bbox = TileRect::new(0, 4, 2, 6);
        c.enlarge_bounding_box(1, 5);
        assert_eq!(c.bbox, TileRect::new(-1, 5, -1, 11));
        assert!(c.in_bounding_box(TileCoord::new(0, 0)));
        assert!(!c.in_bounding_box(TileCoord::new(5, 0)));
    }
}
