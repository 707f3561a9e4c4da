use crate::connection::Connection;
use crate::graph::RouteNodeGraph;
use fpga_common::db::indices::{ConnectionId, NetId};

/// Router-side view of one net: its connections plus the geometry used by
/// the bias term of the cost function.
#[derive(Clone, Debug)]
pub struct NetWrapper {
    pub net: NetId,
    pub name: String,
    pub connections: Vec<ConnectionId>,
    pub x_center: f32,
    pub y_center: f32,
    pub double_hpwl: f32,
}

impl NetWrapper {
    pub fn new(net: NetId, name: impl Into<String>) -> Self {
        Self {
            net,
            name: name.into(),
            connections: Vec::new(),
            x_center: 0.0,
            y_center: 0.0,
            double_hpwl: 2.0,
        }
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Center is the mean of the source (counted once) and every indirect sink.
    pub fn compute_geometry(&mut self, connections: &[Connection], graph: &RouteNodeGraph) {
        let device = graph.device();
        let (mut x_min, mut x_max) = (i32::MAX, i32::MIN);
        let (mut y_min, mut y_max) = (i32::MAX, i32::MIN);
        let (mut x_sum, mut y_sum) = (0i64, 0i64);
        let mut count = 0i64;
        let mut source_added = false;

        for &id in &self.connections {
            let conn = &connections[id.index()];
            if conn.direct {
                continue;
            }
            let mut points = Vec::with_capacity(2);
            if !source_added {
                let p = device.end_of(conn.source);
                points.push(p);
                source_added = true;
                if conn.cross_slr {
                    if let Some(c) = graph.prev_laguna_column(p.x) {
                        x_min = x_min.min(c);
                    }
                    if let Some(c) = graph.next_laguna_column(p.x) {
                        x_max = x_max.max(c);
                    }
                }
            }
            points.push(device.end_of(conn.sink));

            for p in points {
                x_min = x_min.min(p.x);
                x_max = x_max.max(p.x);
                y_min = y_min.min(p.y);
                y_max = y_max.max(p.y);
                x_sum += p.x as i64;
                y_sum += p.y as i64;
                count += 1;
            }
        }

        if count == 0 {
            return;
        }
        self.double_hpwl = ((x_max - x_min + 1 + y_max - y_min + 1) * 2) as f32;
        self.x_center = x_sum as f32 / count as f32;
        self.y_center = y_sum as f32 / count as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::device::{FabricBuilder, ResourceClass, TileClass, VertexSpec};
    use fpga_common::db::indices::{PinId, VertexId};
    use fpga_common::geom::coord::TileCoord;
    use fpga_common::util::config::RouterConfig;
    use std::sync::Arc;

    #[test]
    fn geometry_counts_source_once_and_skips_direct_sinks() {
        let mut b = FabricBuilder::new(8, 8);
        let mut at = |name: &str, x, y| {
            let c = TileCoord::new(x, y);
            b.add_vertex(VertexSpec::new(name, TileClass::Interconnect, ResourceClass::PinFeed, c, c))
                .unwrap()
        };
        let src = at("src", 0, 0);
        let t0 = at("t0", 4, 0);
        let t1 = at("t1", 2, 3);
        let far = at("far", 7, 7);
        let graph = RouteNodeGraph::new(Arc::new(b.build().unwrap()), &RouterConfig::default());

        let conn = |i: usize, sink: VertexId| {
            Connection::new(
                ConnectionId::new(i),
                NetId(0),
                0,
                (PinId(0), src),
                (PinId(i as u32 + 1), sink),
            )
        };
        let mut connections = vec![conn(0, t0), conn(1, t1), conn(2, far)];
        connections[2].direct = true;

        let mut wrapper = NetWrapper::new(NetId(0), "n");
        wrapper.connections = connections.iter().map(|c| c.id).collect();
        wrapper.compute_geometry(&connections, &graph);

        assert_eq!(wrapper.num_connections(), 3);
        assert!((wrapper.x_center - 2.0).abs() < 1e-6);
        assert!((wrapper.y_center - 1.0).abs() < 1e-6);
        assert_eq!(wrapper.double_hpwl, 18.0);
    }
}
