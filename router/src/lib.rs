pub mod algo;
pub mod connection;
pub mod engine;
pub mod error;
pub mod graph;
pub mod net;
pub mod partition;
pub mod report;
pub mod timing;

pub use engine::{IterationStats, Router};
pub use error::RouteError;
pub use report::RouteReport;

use fpga_common::db::core::Design;
use fpga_common::db::device::Device;
use fpga_common::util::config::RouterConfig;
use std::sync::Arc;

/// Routes every unrouted net of `design` over `device` and writes the
/// resulting edges back. Not converging within the iteration cap is reported
/// through `RouteReport::converged`, not as an error.
pub fn route(
    design: &mut Design,
    device: Arc<dyn Device>,
    config: &RouterConfig,
) -> Result<RouteReport, RouteError> {
    let mut router = Router::new(design, device, config)?;
    router.route();
    Ok(router.finish(design))
}
