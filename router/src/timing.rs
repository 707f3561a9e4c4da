use crate::connection::Connection;
use crate::graph::RouteNodeGraph;
use fpga_common::db::device::{Device, ResourceClass};
use fpga_common::db::indices::VertexId;

/// Ceiling for connection criticality.
pub const MAX_CRITICALITY: f32 = 0.99;

/// Per-tile delay estimates used before a connection has a route.
const EST_DELAY_PER_TILE_X: f32 = 32.0;
const EST_DELAY_PER_TILE_Y: f32 = 16.0;

/// Delay of routing resources as seen by the timing-driven cost terms.
pub trait DelayModel: Send + Sync {
    fn node_delay(&self, device: &dyn Device, v: VertexId) -> f32;

    /// Penalty for entering `child` straight from a long-distance wire.
    fn extra_delay(&self, _device: &dyn Device, _child: VertexId, _long_parent: bool) -> f32 {
        0.0
    }
}

/// Takes delays directly from the device model.
pub struct DeviceDelay;

impl DelayModel for DeviceDelay {
    fn node_delay(&self, device: &dyn Device, v: VertexId) -> f32 {
        device.delay_of(v)
    }

    fn extra_delay(&self, device: &dyn Device, child: VertexId, long_parent: bool) -> f32 {
        // stepping off a long wire onto a shorter one adds a local hop
        if long_parent
            && !matches!(
                device.resource_class_of(child),
                ResourceClass::HLong | ResourceClass::VLong
            )
        {
            device.delay_of(child) * 0.1
        } else {
            0.0
        }
    }
}

/// Source of per-connection criticality for the timing-driven router.
pub trait TimingModel: Send {
    /// Recomputes delay and criticality of every connection and returns the
    /// largest connection delay.
    fn update(
        &mut self,
        graph: &RouteNodeGraph,
        connections: &mut [Connection],
        criticality_exponent: f32,
    ) -> f32;
}

/// Treats every connection as its own timing path: its slack is measured
/// against the slowest connection in the design.
#[derive(Default)]
pub struct ConnectionDelayTimer;

impl ConnectionDelayTimer {
    pub fn estimate(graph: &RouteNodeGraph, conn: &Connection) -> f32 {
        let device = graph.device();
        let s = device.end_of(conn.source);
        let t = device.end_of(conn.sink);
        (s.x - t.x).abs() as f32 * EST_DELAY_PER_TILE_X
            + (s.y - t.y).abs() as f32 * EST_DELAY_PER_TILE_Y
    }
}

impl TimingModel for ConnectionDelayTimer {
    fn update(
        &mut self,
        graph: &RouteNodeGraph,
        connections: &mut [Connection],
        criticality_exponent: f32,
    ) -> f32 {
        let mut max_delay = 0.0f32;
        for conn in connections.iter_mut() {
            if conn.direct {
                continue;
            }
            conn.delay = if conn.routed {
                conn.path_delay(graph)
            } else {
                Self::estimate(graph, conn)
            };
            max_delay = max_delay.max(conn.delay);
        }

        for conn in connections.iter_mut() {
            conn.criticality = if conn.direct || max_delay <= 0.0 {
                0.0
            } else {
                criticality(max_delay - conn.delay, max_delay, criticality_exponent)
            };
        }
        max_delay
    }
}

pub fn criticality(slack: f32, max_delay: f32, exponent: f32) -> f32 {
    let c = (1.0 - slack / max_delay).clamp(0.0, 1.0);
    (c.powf(exponent) * MAX_CRITICALITY).min(MAX_CRITICALITY)
}
