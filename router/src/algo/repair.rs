use crate::connection::Connection;
use crate::graph::RouteNodeGraph;
use fpga_common::db::device::ResourceClass;
use fpga_common::db::indices::VertexId;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Distance key for the repair queue. Smaller distances have higher priority.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Dist(f32);

impl Eq for Dist {}

impl Ord for Dist {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.total_cmp(&self.0)
    }
}

impl PartialOrd for Dist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// True when some node on the net's paths is entered from more than one
/// predecessor.
pub fn has_multi_driver(graph: &RouteNodeGraph, connections: &[&mut Connection]) -> bool {
    connections.iter().any(|c| {
        c.path
            .iter()
            .skip(1)
            .any(|&v| graph.get(v).is_some_and(|n| n.unique_driver_count() > 1))
    })
}

/// Re-derives a single predecessor per node over the union of the net's
/// paths and rewrites each connection from it. Every source in use is a
/// root, so connections moved to the alternate source take part too.
/// Returns the number of connections whose path changed.
pub fn repair_net(
    graph: &RouteNodeGraph,
    connections: &mut [&mut Connection],
    present_factor: f32,
) -> usize {
    let mut sources: Vec<VertexId> = connections
        .iter()
        .filter(|c| c.routed)
        .map(|c| c.source)
        .collect();
    sources.sort_unstable();
    sources.dedup();
    if sources.is_empty() {
        return 0;
    }

    let mut successors: HashMap<VertexId, HashSet<VertexId>> = HashMap::new();
    for conn in connections.iter().filter(|c| c.routed) {
        for hop in conn.path.windows(2) {
            successors.entry(hop[0]).or_default().insert(hop[1]);
        }
    }

    let prev = shortest_path_tree(graph, &sources, &successors);

    let mut changed = 0;
    for conn in connections.iter_mut() {
        if !conn.routed {
            continue;
        }
        let Some(path) = conn.path_to_root(&prev) else {
            log::warn!(
                "{:?}: repaired tree does not reach sink {:?}",
                conn.id,
                conn.sink
            );
            continue;
        };
        if path == conn.path {
            continue;
        }
        // the merged tree may reach this sink from the net's other source pin
        if path[0] != conn.source {
            if conn.alt_source.map(|(_, v)| v) != Some(path[0]) {
                log::warn!(
                    "{:?}: repaired path starts at an unknown source {:?}",
                    conn.id,
                    path[0]
                );
                continue;
            }
            conn.swap_source();
        }
        conn.rip_up(graph, present_factor);
        conn.commit(graph, path, present_factor);
        changed += 1;
    }
    changed
}

/// Multi-source Dijkstra over `successors`. Entering a node costs its delay
/// plus the extra delay charged after a long wire, as in the search.
fn shortest_path_tree(
    graph: &RouteNodeGraph,
    sources: &[VertexId],
    successors: &HashMap<VertexId, HashSet<VertexId>>,
) -> HashMap<VertexId, VertexId> {
    let mut dist: HashMap<VertexId, f32> = sources.iter().map(|&s| (s, 0.0)).collect();
    let mut prev: HashMap<VertexId, VertexId> = HashMap::new();
    let mut done: HashSet<VertexId> = HashSet::new();
    let mut queue = PriorityQueue::new();
    for &s in sources {
        queue.push(s, Dist(0.0));
    }

    while let Some((u, Dist(d))) = queue.pop() {
        done.insert(u);
        let Some(next) = successors.get(&u) else {
            continue;
        };
        let long_parent = graph
            .get(u)
            .is_some_and(|n| matches!(n.class(), ResourceClass::HLong | ResourceClass::VLong));
        let mut next: Vec<VertexId> = next.iter().copied().collect();
        next.sort_unstable();
        for v in next {
            if done.contains(&v) {
                continue;
            }
            let weight = graph
                .get(v)
                .map_or(0.0, |n| n.delay() + graph.extra_delay(n, long_parent));
            let nd = d + weight;
            if dist.get(&v).is_none_or(|&old| nd < old) {
                dist.insert(v, nd);
                prev.insert(v, u);
                queue.push_increase(v, Dist(nd));
            }
        }
    }
    prev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use fpga_common::db::device::{FabricBuilder, TileClass, VertexSpec};
    use fpga_common::db::indices::{ConnectionId, NetId, PinId};
    use fpga_common::geom::coord::TileCoord;
    use fpga_common::util::config::RouterConfig;
    use std::sync::Arc;

    /// One vertex per `(name, class, delay)` in a row of tiles, with `edges`
    /// given as index pairs.
    fn fabric(
        vertices: &[(&str, ResourceClass, f32)],
        edges: &[(usize, usize)],
    ) -> (RouteNodeGraph, Vec<VertexId>) {
        let mut b = FabricBuilder::new(vertices.len() as i32, 1);
        let v: Vec<VertexId> = vertices
            .iter()
            .enumerate()
            .map(|(i, &(name, class, delay))| {
                let c = TileCoord::new(i as i32, 0);
                b.add_vertex(
                    VertexSpec::new(name, TileClass::Interconnect, class, c, c).with_delay(delay),
                )
                .unwrap()
            })
            .collect();
        for &(x, y) in edges {
            b.add_edge(v[x], v[y]);
        }
        let graph = RouteNodeGraph::new(Arc::new(b.build().unwrap()), &RouterConfig::default());
        (graph, v)
    }

    fn conn(id: u32, source: VertexId, sink: VertexId) -> Connection {
        Connection::new(ConnectionId(id), NetId(0), 0, (PinId(0), source), (PinId(id + 1), sink))
    }

    // src -> a -> t1, src -> b -> a -> t2 leaves `a` with two drivers.
    #[test]
    fn divergent_predecessors_are_merged() {
        use fpga_common::db::device::ResourceClass::Single;
        let (graph, v) = fabric(
            &[
                ("src", Single, 10.0),
                ("a", Single, 10.0),
                ("b", Single, 10.0),
                ("t1", Single, 10.0),
                ("t2", Single, 10.0),
            ],
            &[(0, 1), (0, 2), (2, 1), (1, 3), (1, 4)],
        );
        graph.get_or_create(v[0], NodeKind::SourcePin);

        let mut c1 = conn(0, v[0], v[3]);
        let mut c2 = conn(1, v[0], v[4]);
        c1.commit(&graph, vec![v[0], v[1], v[3]], 0.5);
        c2.commit(&graph, vec![v[0], v[2], v[1], v[4]], 0.5);

        let mut conns = vec![&mut c1, &mut c2];
        assert!(has_multi_driver(&graph, &conns));
        assert_eq!(repair_net(&graph, &mut conns, 0.5), 1);
        assert!(!has_multi_driver(&graph, &conns));
        assert_eq!(c2.path, vec![v[0], v[1], v[4]]);
        assert_eq!(graph.get(v[2]).unwrap().occupancy(), 0);
        assert_eq!(graph.get(v[1]).unwrap().count_connections_of_user(NetId(0)), 2);
    }

    // s1 -> a -> t1 on the primary source, s2 -> b -> a -> t2 on the
    // alternate: the second connection is regrown from s1.
    #[test]
    fn connections_on_the_alternate_source_are_merged() {
        use fpga_common::db::device::ResourceClass::{Output, Single};
        let (graph, v) = fabric(
            &[
                ("s1", Output, 10.0),
                ("s2", Output, 10.0),
                ("a", Single, 10.0),
                ("b", Single, 10.0),
                ("t1", Single, 10.0),
                ("t2", Single, 10.0),
            ],
            &[(0, 2), (1, 3), (3, 2), (2, 4), (2, 5)],
        );
        let (s1, s2, a, b, t1, t2) = (v[0], v[1], v[2], v[3], v[4], v[5]);

        let mut c1 = conn(0, s1, t1);
        c1.alt_source = Some((PinId(9), s2));
        let mut c2 = conn(1, s1, t2);
        c2.alt_source = Some((PinId(9), s2));
        assert!(c2.swap_source());
        c1.commit(&graph, vec![s1, a, t1], 0.5);
        c2.commit(&graph, vec![s2, b, a, t2], 0.5);

        let mut conns = vec![&mut c1, &mut c2];
        assert!(has_multi_driver(&graph, &conns));
        assert_eq!(repair_net(&graph, &mut conns, 0.5), 1);
        assert!(!has_multi_driver(&graph, &conns));

        assert_eq!(c2.path, vec![s1, a, t2]);
        assert_eq!(c2.source, s1);
        assert_eq!(c2.alt_source.map(|(_, v)| v), Some(s2));
        assert_eq!(graph.get(b).unwrap().occupancy(), 0);
        assert_eq!(graph.get(s2).unwrap().occupancy(), 0);
        assert_eq!(graph.get(a).unwrap().unique_driver_count(), 1);
    }

    // Reaching `a` from the long wire costs 10 + 10 + 1 once the extra hop
    // delay is charged, so the two-wire route (5 + 5.5 + 10) wins.
    #[test]
    fn tree_charges_extra_delay_after_long_wires() {
        use fpga_common::db::device::ResourceClass::{HLong, Output, Single};
        let (graph, v) = fabric(
            &[
                ("s", Output, 0.0),
                ("long", HLong, 10.0),
                ("p", Single, 5.0),
                ("q", Single, 5.5),
                ("a", Single, 10.0),
                ("t1", Single, 1.0),
                ("t2", Single, 1.0),
            ],
            &[(0, 1), (0, 2), (2, 3), (1, 4), (3, 4), (4, 5), (4, 6)],
        );
        let (s, long, p, q, a, t1, t2) = (v[0], v[1], v[2], v[3], v[4], v[5], v[6]);

        let mut c1 = conn(0, s, t1);
        let mut c2 = conn(1, s, t2);
        c1.commit(&graph, vec![s, long, a, t1], 0.5);
        c2.commit(&graph, vec![s, p, q, a, t2], 0.5);

        let mut conns = vec![&mut c1, &mut c2];
        assert_eq!(repair_net(&graph, &mut conns, 0.5), 1);
        assert_eq!(c1.path, vec![s, p, q, a, t1]);
        assert_eq!(graph.get(long).unwrap().occupancy(), 0);
    }
}
