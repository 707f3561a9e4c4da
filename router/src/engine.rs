use crate::algo::direct::route_direct;
use crate::algo::maze::{self, SearchContext, SearchStats};
use crate::algo::repair;
use crate::connection::Connection;
use crate::error::RouteError;
use crate::graph::{ExclusionPolicy, NodeKind, RouteNodeGraph};
use crate::net::NetWrapper;
use crate::partition::PartitionTree;
use crate::report::RouteReport;
use crate::timing::{ConnectionDelayTimer, DelayModel, TimingModel};
use fpga_common::db::core::{Design, NetKind};
use fpga_common::db::device::Device;
use fpga_common::db::indices::{ConnectionId, NetId, PinId, VertexId};
use fpga_common::util::config::RouterConfig;
use fpga_common::util::profiler::ScopedTimer;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Pins and existing routing of one net, copied out of the design so nets
/// can be (re)wrapped later without holding on to it.
#[derive(Clone, Debug)]
struct NetSnapshot {
    id: NetId,
    name: String,
    source: (PinId, VertexId),
    alt_source: Option<(PinId, VertexId)>,
    /// `(pin, vertex, already routed)`
    sinks: Vec<(PinId, VertexId, bool)>,
    edges: Vec<(VertexId, VertexId)>,
}

impl NetSnapshot {
    fn capture(design: &Design, id: NetId) -> Result<Self, RouteError> {
        let net = design.net(id);
        let source = net.source.ok_or_else(|| RouteError::MissingSource {
            net: id,
            name: net.name.clone(),
        })?;
        let pin = |p: PinId| (p, design.pin(p).vertex);
        Ok(Self {
            id,
            name: net.name.clone(),
            source: pin(source),
            alt_source: net.alt_source.map(pin),
            sinks: net
                .sinks
                .iter()
                .map(|&s| (s, design.pin(s).vertex, design.pin(s).routed))
                .collect(),
            edges: net.edges.clone(),
        })
    }

    fn check_vertices(&self, num_vertices: usize) -> Result<(), RouteError> {
        let pins = std::iter::once(self.source.1)
            .chain(self.alt_source.map(|(_, v)| v))
            .chain(self.sinks.iter().map(|&(_, v, _)| v));
        let routed = self.edges.iter().flat_map(|&(a, b)| [a, b]);
        match pins.chain(routed).find(|v| v.index() >= num_vertices) {
            Some(v) => Err(RouteError::UnknownVertex(v)),
            None => Ok(()),
        }
    }
}

fn edge_vertices(edges: &[(VertexId, VertexId)]) -> Vec<VertexId> {
    let mut vertices: Vec<VertexId> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
    vertices.sort_unstable();
    vertices.dedup();
    vertices
}

fn should_route(conn: &Connection, graph: &RouteNodeGraph, timing: bool, threshold: f32) -> bool {
    !conn.direct
        && (!conn.routed
            || conn.is_congested(graph)
            || (timing && conn.criticality > threshold))
}

#[derive(Clone, Debug)]
pub struct IterationStats {
    pub iteration: usize,
    pub connections_routed: usize,
    pub failed: usize,
    pub overused: usize,
    pub unrouted: usize,
    pub nodes_created: usize,
    pub max_delay: f32,
    pub elapsed_ms: u128,
}

/// Negotiated-congestion router over one design. Construction classifies
/// the nets; `route` runs iterations until convergence or the cap, and
/// `finish` writes the result back.
pub struct Router {
    config: RouterConfig,
    graph: Arc<RouteNodeGraph>,
    timing: Box<dyn TimingModel>,
    nets: Vec<NetWrapper>,
    connections: Vec<Connection>,
    /// Indirect connections in routing order.
    sorted: Vec<usize>,
    preserved: HashMap<NetId, NetSnapshot>,
    preserved_global: usize,
    failed_nets: Vec<(NetId, String)>,
    tree: Option<PartitionTree>,
    stats: SearchStats,
    total_routed: usize,
    iteration: usize,
    present_factor: f32,
    timing_weight: f32,
    reroute_threshold: f32,
    max_delay: f32,
    overused: Vec<VertexId>,
    converged: bool,
}

impl Router {
    pub fn new(
        design: &Design,
        device: Arc<dyn Device>,
        config: &RouterConfig,
    ) -> Result<Self, RouteError> {
        config.validate()?;
        let graph = RouteNodeGraph::new(device, config);
        Ok(Self::build(design, graph, config))
    }

    /// Routes over a graph that uses the given exclusion policy and delay
    /// model instead of the ones derived from `config`.
    pub fn with_policies(
        design: &Design,
        device: Arc<dyn Device>,
        config: &RouterConfig,
        exclusion: Box<dyn ExclusionPolicy>,
        delay_model: Option<Box<dyn DelayModel>>,
    ) -> Result<Self, RouteError> {
        config.validate()?;
        let graph =
            RouteNodeGraph::with_policies(device, config.base_cost.clone(), exclusion, delay_model);
        Ok(Self::build(design, graph, config))
    }

    fn build(design: &Design, graph: RouteNodeGraph, config: &RouterConfig) -> Self {
        let mut router = Self {
            config: config.clone(),
            graph: Arc::new(graph),
            timing: Box::new(ConnectionDelayTimer),
            nets: Vec::new(),
            connections: Vec::new(),
            sorted: Vec::new(),
            preserved: HashMap::new(),
            preserved_global: 0,
            failed_nets: Vec::new(),
            tree: None,
            stats: SearchStats::default(),
            total_routed: 0,
            iteration: 0,
            present_factor: config.initial_present_congestion_factor,
            timing_weight: config.timing_weight,
            reroute_threshold: config.min_reroute_criticality,
            max_delay: 0.0,
            overused: Vec::new(),
            converged: false,
        };
        router.classify(design);
        router
    }

    /// Replaces the default per-connection delay timer.
    pub fn with_timing_model(mut self, timing: Box<dyn TimingModel>) -> Self {
        self.timing = timing;
        self.update_timing();
        self
    }

    pub fn graph(&self) -> &RouteNodeGraph {
        &self.graph
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn nets(&self) -> &[NetWrapper] {
        &self.nets
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn present_factor(&self) -> f32 {
        self.present_factor
    }

    pub fn overused(&self) -> &[VertexId] {
        &self.overused
    }

    pub fn failed_nets(&self) -> &[(NetId, String)] {
        &self.failed_nets
    }

    fn classify(&mut self, design: &Design) {
        let _timer = ScopedTimer::new("classify nets");
        let num_vertices = self.graph.device().num_vertices();
        let mut to_route = Vec::new();

        for i in 0..design.num_nets() {
            let id = NetId::new(i);
            let net = design.net(id);

            if net.kind != NetKind::Wire {
                if design.has_routing(id) {
                    self.graph.async_preserve(id, edge_vertices(&net.edges));
                    self.preserved_global += 1;
                } else {
                    log::info!(
                        "Skipping unrouted {} net '{}'",
                        net.kind.as_str(),
                        net.name
                    );
                }
                continue;
            }
            if net.sinks.is_empty() {
                if design.has_routing(id) {
                    self.graph.async_preserve(id, edge_vertices(&net.edges));
                    self.preserved_global += 1;
                }
                continue;
            }

            let snapshot = match NetSnapshot::capture(design, id)
                .and_then(|s| s.check_vertices(num_vertices).map(|_| s))
            {
                Ok(s) => s,
                Err(err) => {
                    log::error!("{}", err);
                    self.failed_nets.push((id, err.to_string()));
                    continue;
                }
            };

            if design.is_fully_routed(id) {
                self.graph
                    .async_preserve(id, edge_vertices(&snapshot.edges));
                self.preserved.insert(id, snapshot);
            } else {
                to_route.push(snapshot);
            }
        }
        self.graph.await_preserve();

        for mut snapshot in to_route {
            let result = self
                .resolve_source(&mut snapshot)
                .and_then(|_| self.add_net(&snapshot));
            if let Err(err) = result {
                log::error!("{}", err);
                self.failed_nets.push((snapshot.id, err.to_string()));
            }
        }

        self.sort_connections();
        self.update_timing();

        let direct = self.connections.iter().filter(|c| c.direct).count();
        log::info!(
            "Nets: {} to route ({} connections, {} direct), {} preserved, {} failed",
            self.nets.len(),
            self.connections.len(),
            direct,
            self.preserved.len() + self.preserved_global,
            self.failed_nets.len()
        );
    }

    /// Moves to the alternate source when the primary one is held by another
    /// net's preserved routing.
    fn resolve_source(&self, snapshot: &mut NetSnapshot) -> Result<(), RouteError> {
        let blocked = |v: VertexId| {
            self.graph
                .preserved_net(v)
                .is_some_and(|owner| owner != snapshot.id)
        };
        if !blocked(snapshot.source.1) {
            return Ok(());
        }
        match snapshot.alt_source {
            Some(alt) if !blocked(alt.1) => {
                log::info!(
                    "Net '{}': source is preserved by another net, using alternate source",
                    snapshot.name
                );
                snapshot.alt_source = Some(snapshot.source);
                snapshot.source = alt;
                Ok(())
            }
            _ => Err(RouteError::BlockedSource {
                net: snapshot.id,
                name: snapshot.name.clone(),
            }),
        }
    }

    /// Wraps a net and creates its connections. Sinks already routed in the
    /// design get their path back from the existing edges.
    fn add_net(&mut self, snapshot: &NetSnapshot) -> Result<usize, RouteError> {
        let graph = Arc::clone(&self.graph);
        let device = graph.device();
        let index = self.nets.len();
        let base = self.connections.len();

        let mut connections = Vec::with_capacity(snapshot.sinks.len());
        let mut restore = Vec::new();
        for &(sink_pin, sink, routed) in &snapshot.sinks {
            if sink == snapshot.source.1 {
                continue;
            }
            let id = ConnectionId::new(base + connections.len());
            let mut conn = Connection::new(id, snapshot.id, index, snapshot.source, (sink_pin, sink));
            conn.alt_source = snapshot.alt_source;
            conn.update_endpoints(&graph);

            if device.tile_class_of(sink).is_routable() {
                graph.get_or_create(conn.source, NodeKind::SourcePin);
                graph.get_or_create(sink, NodeKind::SinkPin);
                if routed {
                    restore.push(connections.len());
                }
            } else {
                let path = route_direct(&graph, snapshot.id, conn.source, sink).ok_or(
                    RouteError::UnreachableDirect {
                        from: conn.source,
                        to: sink,
                    },
                )?;
                conn.direct = true;
                conn.path = path;
                conn.routed = true;
            }
            connections.push(conn);
        }

        let mut wrapper = NetWrapper::new(snapshot.id, snapshot.name.clone());
        wrapper.connections = connections.iter().map(|c| c.id).collect();
        self.connections.extend(connections);
        wrapper.compute_geometry(&self.connections, &graph);

        let drivers: HashMap<VertexId, VertexId> =
            snapshot.edges.iter().map(|&(from, to)| (to, from)).collect();
        for conn in &mut self.connections[base..] {
            if conn.direct {
                continue;
            }
            conn.compute_bounding_box(
                &graph,
                &wrapper,
                self.config.bounding_box_extension_x,
                self.config.bounding_box_extension_y,
            );
        }
        for k in restore {
            let conn = &mut self.connections[base + k];
            match conn.path_from_edges(&drivers) {
                Some(path) => conn.commit(&graph, path, self.present_factor),
                None => log::debug!(
                    "Net '{}': existing edges do not reach {}",
                    snapshot.name,
                    device.vertex_name(conn.sink)
                ),
            }
        }

        self.nets.push(wrapper);
        Ok(index)
    }

    /// Bigger nets first, then shorter connections.
    fn sort_connections(&mut self) {
        let connections = &self.connections;
        let nets = &self.nets;
        let mut sorted: Vec<usize> = (0..connections.len())
            .filter(|&i| !connections[i].direct)
            .collect();
        sorted.sort_by(|&a, &b| {
            let (ca, cb) = (&connections[a], &connections[b]);
            nets[cb.wrapper]
                .num_connections()
                .cmp(&nets[ca.wrapper].num_connections())
                .then(ca.hpwl.cmp(&cb.hpwl))
                .then(ca.id.cmp(&cb.id))
        });
        self.sorted = sorted;
        self.tree = None;
    }

    fn update_timing(&mut self) {
        if self.config.timing_driven {
            self.max_delay = self.timing.update(
                &self.graph,
                &mut self.connections,
                self.config.criticality_exponent,
            );
        }
    }

    /// Keeps critical reroutes to the top `reroute_percentage` percent.
    fn update_reroute_threshold(&mut self) {
        let min = self.config.min_reroute_criticality;
        self.reroute_threshold = min;
        if !self.config.timing_driven {
            return;
        }
        let mut critical: Vec<f32> = self
            .sorted
            .iter()
            .map(|&i| self.connections[i].criticality)
            .filter(|&c| c > min)
            .collect();
        let limit =
            (0.01 * self.config.reroute_percentage as f32 * self.sorted.len() as f32) as usize;
        if critical.len() > limit {
            critical.sort_unstable_by(|a, b| b.total_cmp(a));
            self.reroute_threshold = critical[limit];
        }
    }

    fn needs_routing(&self) -> bool {
        let timing = self.config.timing_driven;
        !self.overused.is_empty()
            || self.sorted.iter().any(|&i| {
                should_route(&self.connections[i], &self.graph, timing, self.reroute_threshold)
            })
    }

    /// Iterates until no node is overused and every connection has a path,
    /// or until the iteration cap. Returns whether it converged.
    pub fn route(&mut self) -> bool {
        let _timer = ScopedTimer::new("route");
        while self.iteration < self.config.max_iterations {
            self.update_reroute_threshold();
            if !self.needs_routing() {
                self.converged = true;
                break;
            }
            let stats = self.run_iteration();
            if stats.overused == 0 && stats.unrouted == 0 {
                self.converged = true;
                break;
            }
        }

        if self.converged {
            log::info!("Routing converged after {} iterations", self.iteration);
        } else {
            let unrouted = self.sorted.iter().filter(|&&i| !self.connections[i].routed);
            let device = self.graph.device();
            log::error!(
                "Iteration cap {} reached: {} overused nodes, {} unrouted connections",
                self.config.max_iterations,
                self.overused.len(),
                unrouted.clone().count()
            );
            for &v in self.overused.iter().take(10) {
                log::error!("  overused: {}", device.vertex_name(v));
            }
            for &i in unrouted.take(10) {
                let conn = &self.connections[i];
                log::error!(
                    "  unrouted: net '{}' {} -> {}",
                    self.nets[conn.wrapper].name,
                    device.vertex_name(conn.source),
                    device.vertex_name(conn.sink)
                );
            }
        }
        self.converged
    }

    /// One rip-up and reroute pass followed by the timing and cost updates.
    pub fn run_iteration(&mut self) -> IterationStats {
        let start = Instant::now();
        self.iteration += 1;
        self.update_reroute_threshold();

        let failed = if self.config.parallel {
            self.route_parallel()
        } else {
            self.route_serial()
        };
        let failed_count = failed.len();
        self.handle_failures(failed);

        if self.config.enlarge_bounding_box {
            let (dx, dy) = (
                self.config.extension_x_increment,
                self.config.extension_y_increment,
            );
            for &i in &self.sorted {
                let conn = &mut self.connections[i];
                if conn.routed && conn.is_congested(&self.graph) {
                    conn.enlarge_bounding_box(dx, dy);
                }
            }
            self.tree = None;
        }

        if self.config.timing_driven {
            self.update_timing();
            self.timing_weight = (self.timing_weight * self.config.timing_multiplier).min(1.0);
        }

        self.present_factor = if self.iteration == 1 {
            self.config.initial_present_congestion_factor
        } else {
            self.present_factor * self.config.present_congestion_multiplier
        };
        self.overused = self
            .graph
            .update_costs(self.present_factor, self.config.historical_congestion_factor);

        let routed = self.stats.take_routed();
        self.total_routed += routed;
        let stats = IterationStats {
            iteration: self.iteration,
            connections_routed: routed,
            failed: failed_count,
            overused: self.overused.len(),
            unrouted: self
                .sorted
                .iter()
                .filter(|&&i| !self.connections[i].routed)
                .count(),
            nodes_created: self.graph.num_nodes_created(),
            max_delay: self.max_delay,
            elapsed_ms: start.elapsed().as_millis(),
        };

        if self.config.timing_driven {
            log::info!(
                "Iter {}: Routed: {}, Failed: {}, Overused: {}, Unrouted: {}, Nodes: {}, Max delay: {:.1}, Time: {}ms",
                stats.iteration,
                stats.connections_routed,
                stats.failed,
                stats.overused,
                stats.unrouted,
                stats.nodes_created,
                stats.max_delay,
                stats.elapsed_ms
            );
        } else {
            log::info!(
                "Iter {}: Routed: {}, Failed: {}, Overused: {}, Unrouted: {}, Nodes: {}, Time: {}ms",
                stats.iteration,
                stats.connections_routed,
                stats.failed,
                stats.overused,
                stats.unrouted,
                stats.nodes_created,
                stats.elapsed_ms
            );
        }
        stats
    }

    fn route_serial(&mut self) -> Vec<usize> {
        let timing = self.config.timing_driven;
        let threshold = self.reroute_threshold;
        let ctx = SearchContext {
            graph: &self.graph,
            config: &self.config,
            nets: &self.nets,
            present_factor: self.present_factor,
            timing_weight: self.timing_weight,
            stats: &self.stats,
        };

        let mut failed = Vec::new();
        for &i in &self.sorted {
            let conn = &mut self.connections[i];
            if !should_route(conn, ctx.graph, timing, threshold) {
                continue;
            }
            if !maze::with_thread_scratch(|scratch| maze::route_connection(&ctx, conn, scratch)) {
                failed.push(i);
            }
        }
        failed
    }

    fn route_parallel(&mut self) -> Vec<usize> {
        let tree = match self.tree.take() {
            Some(tree) if self.iteration > 1 => tree,
            _ => {
                let _timer = ScopedTimer::with_level("partition", log::Level::Debug);
                let device = self.graph.device();
                PartitionTree::build(&self.connections, &self.sorted, device.columns(), device.rows())
            }
        };

        let timing = self.config.timing_driven;
        let threshold = self.reroute_threshold;
        let ctx = SearchContext {
            graph: &self.graph,
            config: &self.config,
            nets: &self.nets,
            present_factor: self.present_factor,
            timing_weight: self.timing_weight,
            stats: &self.stats,
        };
        let failed = Mutex::new(Vec::new());

        tree.bind(&mut self.connections).route(&|conn: &mut Connection| {
            if !should_route(conn, ctx.graph, timing, threshold) {
                return;
            }
            if !maze::with_thread_scratch(|scratch| maze::route_connection(&ctx, conn, scratch)) {
                failed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(conn.id.index());
            }
        });

        self.tree = Some(tree);
        let mut failed = failed
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        failed.sort_unstable();
        failed
    }

    fn handle_failures(&mut self, failed: Vec<usize>) {
        let graph = Arc::clone(&self.graph);
        let device = graph.device();
        let mut resort = false;
        let mut release = Vec::new();
        if !failed.is_empty() {
            self.tree = None;
        }

        for i in failed {
            let conn = &mut self.connections[i];
            let wrapper = &self.nets[conn.wrapper];
            log::warn!(
                "Iter {}: no path for net '{}' {} -> {}",
                self.iteration,
                wrapper.name,
                device.vertex_name(conn.source),
                device.vertex_name(conn.sink)
            );

            if self.iteration == 1 && conn.swap_source() {
                conn.update_endpoints(&graph);
                graph.get_or_create(conn.source, NodeKind::SourcePin);
                conn.compute_bounding_box(
                    &graph,
                    wrapper,
                    self.config.bounding_box_extension_x,
                    self.config.bounding_box_extension_y,
                );
                resort = true;
            }
            conn.enlarge_bounding_box(
                self.config.extension_x_increment,
                self.config.extension_y_increment,
            );

            if self.config.soft_preserve && self.iteration == 2 {
                let mut nearby = vec![conn.sink];
                nearby.extend_from_slice(device.upstream_of(conn.sink));
                nearby.extend_from_slice(device.downstream_of(conn.source));
                release.extend(
                    nearby
                        .into_iter()
                        .filter_map(|v| graph.preserved_net(v))
                        .filter(|&owner| owner != conn.net),
                );
            }
        }

        release.sort_unstable();
        release.dedup();
        for net in release {
            resort |= self.unpreserve_net(net);
        }
        if resort {
            self.sort_connections();
        }
    }

    /// Gives a preserved net's resources back and turns it into a routable
    /// net whose current routing is kept as its starting point.
    fn unpreserve_net(&mut self, net: NetId) -> bool {
        let Some(snapshot) = self.preserved.remove(&net) else {
            return false;
        };
        for v in self.graph.preserved_vertices_of(net) {
            self.graph.unpreserve(v);
        }
        log::info!("Released preserved net '{}'", snapshot.name);
        match self.add_net(&snapshot) {
            Ok(_) => true,
            Err(err) => {
                log::error!("{}", err);
                self.failed_nets.push((net, err.to_string()));
                false
            }
        }
    }

    /// Repairs multi-driver nets and writes every wrapped net's edges and
    /// sink status back into `design`.
    pub fn finish(mut self, design: &mut Design) -> RouteReport {
        let _timer = ScopedTimer::new("finalize");
        let graph = Arc::clone(&self.graph);
        let mut routed_nets = 0;
        let mut total_wirelength = 0i64;
        let mut usage_by_class = BTreeMap::new();
        let mut repaired = 0;

        {
            let mut groups: Vec<Vec<&mut Connection>> =
                (0..self.nets.len()).map(|_| Vec::new()).collect();
            for conn in self.connections.iter_mut() {
                groups[conn.wrapper].push(conn);
            }

            for group in groups.iter_mut() {
                let mut indirect: Vec<&mut Connection> = group
                    .iter_mut()
                    .filter(|c| !c.direct)
                    .map(|c| &mut **c)
                    .collect();
                if repair::has_multi_driver(&graph, &indirect) {
                    repaired += repair::repair_net(&graph, &mut indirect, self.present_factor);
                }
            }

            for (wrapper, group) in self.nets.iter().zip(&groups) {
                let mut seen = HashSet::new();
                let mut edges = Vec::new();
                let mut used = HashSet::new();
                for conn in group {
                    design.pins[conn.sink_pin.index()].routed = conn.routed;
                    if !conn.routed {
                        continue;
                    }
                    for hop in conn.path.windows(2) {
                        if seen.insert((hop[0], hop[1])) {
                            edges.push((hop[0], hop[1]));
                        }
                    }
                    if !conn.direct {
                        used.extend(conn.path.iter().copied());
                    }
                }
                for v in used {
                    if let Some(node) = graph.get(v) {
                        if matches!(node.kind(), NodeKind::Wire | NodeKind::SuperLongLine) {
                            total_wirelength += node.length() as i64;
                        }
                        *usage_by_class.entry(node.class()).or_insert(0) += 1;
                    }
                }
                if group.iter().all(|c| c.routed) {
                    routed_nets += 1;
                }
                design.nets[wrapper.net.index()].edges = edges;
            }
        }
        if repaired > 0 {
            log::info!("Repaired {} connection paths", repaired);
        }

        let max_delay = self
            .connections
            .iter()
            .filter(|c| c.routed && !c.direct)
            .map(|c| c.path_delay(&graph))
            .fold(0.0f32, f32::max);
        let mut overused_nodes = graph.overused_nodes();
        overused_nodes.sort_unstable();

        RouteReport {
            converged: self.converged,
            iterations: self.iteration,
            connections: self.connections.len(),
            direct_connections: self.connections.iter().filter(|c| c.direct).count(),
            preserved_nets: self.preserved.len() + self.preserved_global,
            routed_nets,
            failed_nets: std::mem::take(&mut self.failed_nets),
            unrouted_connections: self
                .connections
                .iter()
                .filter(|c| !c.routed)
                .map(|c| c.id)
                .collect(),
            overused_nodes,
            nodes_created: graph.num_nodes_created(),
            nodes_popped: self.stats.nodes_popped.load(Ordering::Relaxed),
            nodes_pushed: self.stats.nodes_pushed.load(Ordering::Relaxed),
            connections_routed: self.total_routed,
            total_wirelength,
            usage_by_class,
            max_delay: if self.config.timing_driven { max_delay } else { 0.0 },
        }
    }
}
