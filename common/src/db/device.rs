use crate::db::indices::VertexId;
use crate::geom::coord::TileCoord;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileClass {
    #[default]
    Interconnect,
    Laguna,
    Clock,
    Site,
}

impl TileClass {
    /// Interconnect and SLR-crossing tiles are the only ones the router may enter.
    pub fn is_routable(&self) -> bool {
        matches!(self, TileClass::Interconnect | TileClass::Laguna)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileClass::Interconnect => "INT",
            TileClass::Laguna => "LAGUNA",
            TileClass::Clock => "CLK",
            TileClass::Site => "SITE",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    Output,
    PinFeed,
    PinBounce,
    #[default]
    Single,
    Double,
    HQuad,
    VQuad,
    HLong,
    VLong,
    SuperLong,
    LagunaInput,
    Local,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Output => "OUTPUT",
            ResourceClass::PinFeed => "PINFEED",
            ResourceClass::PinBounce => "PINBOUNCE",
            ResourceClass::Single => "SINGLE",
            ResourceClass::Double => "DOUBLE",
            ResourceClass::HQuad => "HQUAD",
            ResourceClass::VQuad => "VQUAD",
            ResourceClass::HLong => "HLONG",
            ResourceClass::VLong => "VLONG",
            ResourceClass::SuperLong => "SLL",
            ResourceClass::LagunaInput => "LAGUNA_I",
            ResourceClass::Local => "LOCAL",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("unknown tile class '{0}'")]
    UnknownTileClass(String),
    #[error("unknown resource class '{0}'")]
    UnknownResourceClass(String),
    #[error("duplicate vertex name '{0}'")]
    DuplicateVertex(String),
    #[error("edge references vertex {0} but only {1} vertices exist")]
    DanglingEdge(u32, usize),
}

impl FromStr for TileClass {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INT" => Ok(TileClass::Interconnect),
            "LAGUNA" => Ok(TileClass::Laguna),
            "CLK" => Ok(TileClass::Clock),
            "SITE" => Ok(TileClass::Site),
            other => Err(DeviceError::UnknownTileClass(other.to_string())),
        }
    }
}

impl FromStr for ResourceClass {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let class = match s {
            "OUTPUT" => ResourceClass::Output,
            "PINFEED" => ResourceClass::PinFeed,
            "PINBOUNCE" => ResourceClass::PinBounce,
            "SINGLE" => ResourceClass::Single,
            "DOUBLE" => ResourceClass::Double,
            "HQUAD" => ResourceClass::HQuad,
            "VQUAD" => ResourceClass::VQuad,
            "HLONG" => ResourceClass::HLong,
            "VLONG" => ResourceClass::VLong,
            "SLL" => ResourceClass::SuperLong,
            "LAGUNA_I" => ResourceClass::LagunaInput,
            "LOCAL" => ResourceClass::Local,
            other => return Err(DeviceError::UnknownResourceClass(other.to_string())),
        };
        Ok(class)
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity model of the target device. The router only ever searches
/// over what this trait exposes.
pub trait Device: Send + Sync {
    fn num_vertices(&self) -> usize;
    fn columns(&self) -> i32;
    fn rows(&self) -> i32;

    fn downstream_of(&self, v: VertexId) -> &[VertexId];
    fn upstream_of(&self, v: VertexId) -> &[VertexId];

    fn tile_class_of(&self, v: VertexId) -> TileClass;
    fn resource_class_of(&self, v: VertexId) -> ResourceClass;
    fn begin_of(&self, v: VertexId) -> TileCoord;
    fn end_of(&self, v: VertexId) -> TileCoord;
    fn slr_index(&self, v: VertexId) -> u32;
    fn delay_of(&self, v: VertexId) -> f32;

    fn is_route_through(&self, _parent: VertexId, _child: VertexId) -> bool {
        false
    }
    fn crosses_clock_boundary(&self, _v: VertexId) -> bool {
        false
    }
    fn is_u_turn(&self, _v: VertexId) -> bool {
        false
    }

    /// Columns holding SLR-crossing resources, sorted ascending.
    fn laguna_columns(&self) -> &[i32] {
        &[]
    }
    fn super_long_line_length(&self) -> i32 {
        0
    }

    fn vertex_name(&self, v: VertexId) -> String {
        format!("v{}", v.0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct VertexSpec {
    pub name: String,
    pub tile: TileClass,
    pub resource: ResourceClass,
    pub begin: TileCoord,
    pub end: TileCoord,
    pub slr: u32,
    pub delay: f32,
    pub u_turn: bool,
    pub crosses_clock: bool,
}

impl VertexSpec {
    pub fn new(
        name: impl Into<String>,
        tile: TileClass,
        resource: ResourceClass,
        begin: TileCoord,
        end: TileCoord,
    ) -> Self {
        Self {
            name: name.into(),
            tile,
            resource,
            begin,
            end,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_slr(mut self, slr: u32) -> Self {
        self.slr = slr;
        self
    }
}

/// In-memory device with compressed adjacency in both directions.
#[derive(Debug)]
pub struct FabricGraph {
    columns: i32,
    rows: i32,
    vertices: Vec<VertexSpec>,
    down_offsets: Vec<u32>,
    down_targets: Vec<VertexId>,
    up_offsets: Vec<u32>,
    up_targets: Vec<VertexId>,
    route_throughs: HashSet<(VertexId, VertexId)>,
    laguna_columns: Vec<i32>,
    sll_length: i32,
    name_map: HashMap<String, VertexId>,
}

impl FabricGraph {
    pub fn vertex_by_name(&self, name: &str) -> Option<VertexId> {
        self.name_map.get(name).copied()
    }

    pub fn spec(&self, v: VertexId) -> &VertexSpec {
        &self.vertices[v.index()]
    }

    pub fn num_edges(&self) -> usize {
        self.down_targets.len()
    }

    pub fn route_throughs(&self) -> impl Iterator<Item = &(VertexId, VertexId)> {
        self.route_throughs.iter()
    }
}

impl Device for FabricGraph {
    fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
    fn columns(&self) -> i32 {
        self.columns
    }
    fn rows(&self) -> i32 {
        self.rows
    }

    #[inline]
    fn downstream_of(&self, v: VertexId) -> &[VertexId] {
        let i = v.index();
        &self.down_targets[self.down_offsets[i] as usize..self.down_offsets[i + 1] as usize]
    }
    #[inline]
    fn upstream_of(&self, v: VertexId) -> &[VertexId] {
        let i = v.index();
        &self.up_targets[self.up_offsets[i] as usize..self.up_offsets[i + 1] as usize]
    }

    fn tile_class_of(&self, v: VertexId) -> TileClass {
        self.vertices[v.index()].tile
    }
    fn resource_class_of(&self, v: VertexId) -> ResourceClass {
        self.vertices[v.index()].resource
    }
    fn begin_of(&self, v: VertexId) -> TileCoord {
        self.vertices[v.index()].begin
    }
    fn end_of(&self, v: VertexId) -> TileCoord {
        self.vertices[v.index()].end
    }
    fn slr_index(&self, v: VertexId) -> u32 {
        self.vertices[v.index()].slr
    }
    fn delay_of(&self, v: VertexId) -> f32 {
        self.vertices[v.index()].delay
    }
    fn is_route_through(&self, parent: VertexId, child: VertexId) -> bool {
        self.route_throughs.contains(&(parent, child))
    }
    fn crosses_clock_boundary(&self, v: VertexId) -> bool {
        self.vertices[v.index()].crosses_clock
    }
    fn is_u_turn(&self, v: VertexId) -> bool {
        self.vertices[v.index()].u_turn
    }
    fn laguna_columns(&self) -> &[i32] {
        &self.laguna_columns
    }
    fn super_long_line_length(&self) -> i32 {
        self.sll_length
    }
    fn vertex_name(&self, v: VertexId) -> String {
        self.vertices[v.index()].name.clone()
    }
}

#[derive(Default)]
pub struct FabricBuilder {
    columns: i32,
    rows: i32,
    vertices: Vec<VertexSpec>,
    edges: Vec<(VertexId, VertexId)>,
    route_throughs: HashSet<(VertexId, VertexId)>,
    laguna_columns: Vec<i32>,
    sll_length: i32,
    name_map: HashMap<String, VertexId>,
}

impl FabricBuilder {
    pub fn new(columns: i32, rows: i32) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    pub fn set_size(&mut self, columns: i32, rows: i32) {
        self.columns = columns;
        self.rows = rows;
    }

    pub fn add_vertex(&mut self, spec: VertexSpec) -> Result<VertexId, DeviceError> {
        if self.name_map.contains_key(&spec.name) {
            return Err(DeviceError::DuplicateVertex(spec.name));
        }
        let id = VertexId::new(self.vertices.len());
        self.name_map.insert(spec.name.clone(), id);
        self.vertices.push(spec);
        Ok(id)
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<VertexId> {
        self.name_map.get(name).copied()
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId) {
        self.edges.push((from, to));
    }

    pub fn add_route_through(&mut self, from: VertexId, to: VertexId) {
        self.edges.push((from, to));
        self.route_throughs.insert((from, to));
    }

    pub fn set_laguna_columns(&mut self, mut columns: Vec<i32>) {
        columns.sort_unstable();
        columns.dedup();
        self.laguna_columns = columns;
    }

    pub fn set_super_long_line_length(&mut self, length: i32) {
        self.sll_length = length;
    }

    pub fn build(self) -> Result<FabricGraph, DeviceError> {
        let n = self.vertices.len();
        for &(a, b) in &self.edges {
            for v in [a, b] {
                if v.index() >= n {
                    return Err(DeviceError::DanglingEdge(v.0, n));
                }
            }
        }

        let (down_offsets, down_targets) = compress(n, self.edges.iter().map(|&(a, b)| (a, b)));
        let (up_offsets, up_targets) = compress(n, self.edges.iter().map(|&(a, b)| (b, a)));

        Ok(FabricGraph {
            columns: self.columns,
            rows: self.rows,
            vertices: self.vertices,
            down_offsets,
            down_targets,
            up_offsets,
            up_targets,
            route_throughs: self.route_throughs,
            laguna_columns: self.laguna_columns,
            sll_length: self.sll_length,
            name_map: self.name_map,
        })
    }
}

fn compress(
    n: usize,
    edges: impl Iterator<Item = (VertexId, VertexId)> + Clone,
) -> (Vec<u32>, Vec<VertexId>) {
    let mut offsets = vec![0u32; n + 1];
    for (from, _) in edges.clone() {
        offsets[from.index() + 1] += 1;
    }
    for i in 0..n {
        offsets[i + 1] += offsets[i];
    }
    let mut cursor = offsets.clone();
    let mut targets = vec![VertexId(0); offsets[n] as usize];
    for (from, to) in edges {
        let slot = &mut cursor[from.index()];
        targets[*slot as usize] = to;
        *slot += 1;
    }
    (offsets, targets)
}
