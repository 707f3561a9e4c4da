use fpga_common::db::device::ResourceClass;
use fpga_common::db::indices::{ConnectionId, NetId, VertexId};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one routing run. A run that hits the iteration cap is still
/// returned here with `converged == false`.
#[derive(Clone, Debug, Default)]
pub struct RouteReport {
    pub converged: bool,
    pub iterations: usize,
    pub connections: usize,
    pub direct_connections: usize,
    pub preserved_nets: usize,
    pub routed_nets: usize,
    /// Nets skipped before routing, with the reason.
    pub failed_nets: Vec<(NetId, String)>,
    pub unrouted_connections: Vec<ConnectionId>,
    pub overused_nodes: Vec<VertexId>,
    pub nodes_created: usize,
    pub nodes_popped: usize,
    pub nodes_pushed: usize,
    pub connections_routed: usize,
    pub total_wirelength: i64,
    pub usage_by_class: BTreeMap<ResourceClass, usize>,
    pub max_delay: f32,
}

impl RouteReport {
    pub fn is_legal(&self) -> bool {
        self.converged && self.overused_nodes.is_empty() && self.unrouted_connections.is_empty()
    }
}

impl fmt::Display for RouteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} after {} iterations",
            if self.converged { "Converged" } else { "Not converged" },
            self.iterations
        )?;
        writeln!(
            f,
            "  connections: {} ({} direct), routed {} times",
            self.connections, self.direct_connections, self.connections_routed
        )?;
        writeln!(
            f,
            "  nets: {} routed, {} preserved, {} failed",
            self.routed_nets,
            self.preserved_nets,
            self.failed_nets.len()
        )?;
        writeln!(
            f,
            "  nodes: {} created, {} pushed, {} popped",
            self.nodes_created, self.nodes_pushed, self.nodes_popped
        )?;
        writeln!(f, "  wirelength: {}", self.total_wirelength)?;
        for (class, count) in &self.usage_by_class {
            writeln!(f, "    {:<10} {}", class.as_str(), count)?;
        }
        if self.max_delay > 0.0 {
            writeln!(f, "  max delay: {:.1}", self.max_delay)?;
        }
        if !self.unrouted_connections.is_empty() || !self.overused_nodes.is_empty() {
            writeln!(
                f,
                "  unrouted connections: {}, overused nodes: {}",
                self.unrouted_connections.len(),
                self.overused_nodes.len()
            )?;
        }
        Ok(())
    }
}
