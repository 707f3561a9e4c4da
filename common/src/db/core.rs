use crate::db::indices::*;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NetKind {
    #[default]
    Wire,
    Clock,
    Static,
}

impl NetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetKind::Wire => "WIRE",
            NetKind::Clock => "CLOCK",
            NetKind::Static => "STATIC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PinData {
    pub name: String,
    pub net: NetId,
    pub vertex: VertexId,
    pub is_output: bool,
    pub routed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct NetData {
    pub name: String,
    pub kind: NetKind,
    pub source: Option<PinId>,
    pub alt_source: Option<PinId>,
    pub sinks: Vec<PinId>,
    /// Routed hops `(from, to)` in device vertices.
    pub edges: Vec<(VertexId, VertexId)>,
}

pub struct Design {
    pub name: String,
    pub nets: Vec<NetData>,
    pub pins: Vec<PinData>,

    pub net_name_map: HashMap<String, NetId>,
}

impl Design {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nets: Vec::with_capacity(1000),
            pins: Vec::with_capacity(5000),
            net_name_map: HashMap::new(),
        }
    }

    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }
    pub fn num_pins(&self) -> usize {
        self.pins.len()
    }

    pub fn add_net(&mut self, name: impl Into<String>, kind: NetKind) -> NetId {
        let name = name.into();
        if let Some(&id) = self.net_name_map.get(&name) {
            return id;
        }
        let id = NetId::new(self.nets.len());
        self.nets.push(NetData {
            name: name.clone(),
            kind,
            ..Default::default()
        });
        self.net_name_map.insert(name, id);
        id
    }

    /// Attaches a pin to `net`. The first output pin becomes the source,
    /// a second one the alternate source.
    pub fn add_pin(
        &mut self,
        net: NetId,
        name: impl Into<String>,
        vertex: VertexId,
        is_output: bool,
    ) -> PinId {
        let id = PinId::new(self.pins.len());
        self.pins.push(PinData {
            name: name.into(),
            net,
            vertex,
            is_output,
            routed: false,
        });

        let data = &mut self.nets[net.index()];
        if is_output {
            if data.source.is_none() {
                data.source = Some(id);
            } else {
                data.alt_source = Some(id);
            }
        } else {
            data.sinks.push(id);
        }
        id
    }

    pub fn pin(&self, id: PinId) -> &PinData {
        &self.pins[id.index()]
    }

    pub fn net(&self, id: NetId) -> &NetData {
        &self.nets[id.index()]
    }

    pub fn is_fully_routed(&self, id: NetId) -> bool {
        let net = &self.nets[id.index()];
        !net.sinks.is_empty() && net.sinks.iter().all(|&s| self.pins[s.index()].routed)
    }

    pub fn has_routing(&self, id: NetId) -> bool {
        !self.nets[id.index()].edges.is_empty()
    }

    pub fn unroute_net(&mut self, id: NetId) {
        let sinks = self.nets[id.index()].sinks.clone();
        self.nets[id.index()].edges.clear();
        for s in sinks {
            self.pins[s.index()].routed = false;
        }
    }

    pub fn unroute_all(&mut self) {
        for i in 0..self.nets.len() {
            self.unroute_net(NetId::new(i));
        }
    }
}
