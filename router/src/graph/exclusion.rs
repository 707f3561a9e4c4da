use fpga_common::db::device::Device;
use fpga_common::db::indices::VertexId;
use std::collections::HashSet;

/// Decides which downstream edges are dropped when a node's children are
/// first expanded. Preservation is checked separately by the graph.
pub trait ExclusionPolicy: Send + Sync {
    fn is_excluded(&self, device: &dyn Device, parent: VertexId, child: VertexId) -> bool;
}

/// Default policy: only interconnect fabric is routable, route-through edges
/// are never taken, and clock-boundary crossings are masked on request.
pub struct FabricExclusion {
    pub mask_clock_boundary: bool,
}

impl ExclusionPolicy for FabricExclusion {
    fn is_excluded(&self, device: &dyn Device, parent: VertexId, child: VertexId) -> bool {
        if !device.tile_class_of(child).is_routable() {
            return true;
        }
        if device.is_route_through(parent, child) {
            return true;
        }
        self.mask_clock_boundary && device.crosses_clock_boundary(child)
    }
}

/// Extends another policy with an explicit set of forbidden vertices, as used
/// by incremental repair flows that must steer around specific resources.
pub struct BlockList<P> {
    pub inner: P,
    pub blocked: HashSet<VertexId>,
}

impl<P: ExclusionPolicy> ExclusionPolicy for BlockList<P> {
    fn is_excluded(&self, device: &dyn Device, parent: VertexId, child: VertexId) -> bool {
        self.blocked.contains(&child) || self.inner.is_excluded(device, parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::device::{FabricBuilder, ResourceClass, TileClass, VertexSpec};
    use fpga_common::geom::coord::TileCoord;

    #[test]
    fn fabric_policy_masks_sites_route_throughs_and_clock_crossings() {
        let c = TileCoord::new(0, 0);
        let spec = |name: &str, tile| VertexSpec::new(name, tile, ResourceClass::Single, c, c);
        let mut b = FabricBuilder::new(1, 1);
        let from = b.add_vertex(spec("from", TileClass::Interconnect)).unwrap();
        let wire = b.add_vertex(spec("wire", TileClass::Interconnect)).unwrap();
        let site = b.add_vertex(spec("site", TileClass::Site)).unwrap();
        let bypass = b.add_vertex(spec("bypass", TileClass::Interconnect)).unwrap();
        let rclk = b
            .add_vertex(VertexSpec {
                crosses_clock: true,
                ..spec("rclk", TileClass::Interconnect)
            })
            .unwrap();
        b.add_edge(from, wire);
        b.add_edge(from, site);
        b.add_route_through(from, bypass);
        b.add_edge(from, rclk);
        let device = b.build().unwrap();

        let open = FabricExclusion {
            mask_clock_boundary: false,
        };
        assert!(!open.is_excluded(&device, from, wire));
        assert!(open.is_excluded(&device, from, site));
        assert!(open.is_excluded(&device, from, bypass));
        assert!(!open.is_excluded(&device, from, rclk));

        let masked = FabricExclusion {
            mask_clock_boundary: true,
        };
        assert!(masked.is_excluded(&device, from, rclk));

        let blocked = BlockList {
            inner: open,
            blocked: HashSet::from([wire]),
        };
        assert!(blocked.is_excluded(&device, from, wire));
        assert!(!blocked.is_excluded(&device, from, rclk));
    }
}
