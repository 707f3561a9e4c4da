pub mod exclusion;
pub mod latch;
pub mod node;
pub mod rrg;

pub use exclusion::{BlockList, ExclusionPolicy, FabricExclusion};
pub use node::{NodeKind, RouteNode};
pub use rrg::RouteNodeGraph;
