use crate::graph::RouteNodeGraph;
use fpga_common::db::indices::{NetId, VertexId};
use std::collections::{HashMap, VecDeque};

/// Breadth-first search over raw device edges for connections that leave
/// the interconnect fabric. No congestion is tracked on these paths; only
/// vertices preserved by other nets are avoided.
pub fn route_direct(
    graph: &RouteNodeGraph,
    net: NetId,
    source: VertexId,
    sink: VertexId,
) -> Option<Vec<VertexId>> {
    let device = graph.device();
    let mut prev: HashMap<VertexId, VertexId> = HashMap::new();
    let mut queue = VecDeque::from([source]);
    prev.insert(source, source);

    while let Some(u) = queue.pop_front() {
        if u == sink {
            let mut path = vec![sink];
            let mut cur = sink;
            while cur != source {
                cur = prev[&cur];
                path.push(cur);
            }
            path.reverse();
            return Some(path);
        }
        for &v in device.downstream_of(u) {
            if prev.contains_key(&v) {
                continue;
            }
            if graph.preserved_net(v).is_some_and(|owner| owner != net) {
                continue;
            }
            prev.insert(v, u);
            queue.push_back(v);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::device::{FabricBuilder, ResourceClass, TileClass, VertexSpec};
    use fpga_common::geom::coord::TileCoord;
    use fpga_common::util::config::RouterConfig;
    use std::sync::Arc;

    #[test]
    fn finds_shortest_dedicated_path_around_foreign_preserved_vertices() {
        let mut b = FabricBuilder::new(4, 1);
        let v: Vec<VertexId> = ["out", "short", "long1", "long2", "in"]
            .iter()
            .map(|n| {
                let c = TileCoord::new(0, 0);
                b.add_vertex(VertexSpec::new(*n, TileClass::Site, ResourceClass::Local, c, c))
                    .unwrap()
            })
            .collect();
        b.add_edge(v[0], v[1]);
        b.add_edge(v[1], v[4]);
        b.add_edge(v[0], v[2]);
        b.add_edge(v[2], v[3]);
        b.add_edge(v[3], v[4]);
        let graph = RouteNodeGraph::new(Arc::new(b.build().unwrap()), &RouterConfig::default());

        assert_eq!(
            route_direct(&graph, NetId(0), v[0], v[4]),
            Some(vec![v[0], v[1], v[4]])
        );

        graph.preserve(v[1], NetId(7));
        assert_eq!(
            route_direct(&graph, NetId(0), v[0], v[4]),
            Some(vec![v[0], v[2], v[3], v[4]])
        );

        graph.preserve(v[2], NetId(7));
        assert_eq!(route_direct(&graph, NetId(0), v[0], v[4]), None);
        assert!(route_direct(&graph, NetId(7), v[0], v[4]).is_some());
    }
}
