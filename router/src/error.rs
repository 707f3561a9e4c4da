use fpga_common::db::indices::{NetId, VertexId};
use fpga_common::util::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid router configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("net '{name}' has sinks but no source pin")]
    MissingSource { net: NetId, name: String },
    #[error("vertex {0:?} is not part of the device")]
    UnknownVertex(VertexId),
    #[error("source of net '{name}' is preserved by another net and no alternate source exists")]
    BlockedSource { net: NetId, name: String },
    #[error("no dedicated path from {from:?} to {to:?}")]
    UnreachableDirect { from: VertexId, to: VertexId },
}
