#![allow(dead_code)]

use fpga_common::db::core::{Design, NetKind};
use fpga_common::db::device::{FabricBuilder, FabricGraph, ResourceClass, TileClass, VertexSpec};
use fpga_common::db::indices::{NetId, VertexId};
use fpga_common::db::parser::{fabric, netlist};
use fpga_common::geom::coord::TileCoord;
use fpga_common::util::config::RouterConfig;
use fpga_common::util::generator::{GeneratorParams, generate_to};
use std::sync::Arc;

pub fn site_output(b: &mut FabricBuilder, name: &str, x: i32, y: i32) -> VertexId {
    let c = TileCoord::new(x, y);
    b.add_vertex(VertexSpec::new(name, TileClass::Site, ResourceClass::Output, c, c).with_delay(20.0))
        .unwrap()
}

pub fn pin_feed(b: &mut FabricBuilder, name: &str, x: i32, y: i32) -> VertexId {
    let c = TileCoord::new(x, y);
    b.add_vertex(
        VertexSpec::new(name, TileClass::Interconnect, ResourceClass::PinFeed, c, c).with_delay(15.0),
    )
    .unwrap()
}

pub fn single(b: &mut FabricBuilder, name: &str, from: (i32, i32), to: (i32, i32)) -> VertexId {
    b.add_vertex(
        VertexSpec::new(
            name,
            TileClass::Interconnect,
            ResourceClass::Single,
            TileCoord::new(from.0, from.1),
            TileCoord::new(to.0, to.1),
        )
        .with_delay(45.0),
    )
    .unwrap()
}

pub fn wire_net(design: &mut Design, name: &str, source: VertexId, sinks: &[VertexId]) -> NetId {
    let net = design.add_net(name, NetKind::Wire);
    design.add_pin(net, format!("{name}_o"), source, true);
    for (i, &s) in sinks.iter().enumerate() {
        design.add_pin(net, format!("{name}_i{i}"), s, false);
    }
    net
}

pub fn untimed() -> RouterConfig {
    RouterConfig {
        timing_driven: false,
        ..RouterConfig::default()
    }
}

/// Vertices of every routed hop of `net`.
pub fn net_vertices(design: &Design, net: NetId) -> Vec<VertexId> {
    let mut v: Vec<VertexId> = design.nets[net.index()]
        .edges
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .collect();
    v.sort_unstable();
    v.dedup();
    v
}

pub fn generated(params: &GeneratorParams) -> (Arc<FabricGraph>, Design) {
    let (mut fab, mut nets) = (Vec::new(), Vec::new());
    generate_to(params, &mut fab, &mut nets).unwrap();
    let device = fabric::parse_str(std::str::from_utf8(&fab).unwrap()).unwrap();
    let design = netlist::parse_str(std::str::from_utf8(&nets).unwrap(), &device).unwrap();
    (Arc::new(device), design)
}

pub fn small_grid() -> GeneratorParams {
    GeneratorParams {
        columns: 12,
        rows: 12,
        tracks: 2,
        nets: 10,
        max_fanout: 3,
        radius: 3,
        seed: 7,
    }
}
