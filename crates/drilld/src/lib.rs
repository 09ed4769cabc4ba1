//! Drill scenario runner: bootstrap flow, workload staging, scenario driver
//! and reports.

pub mod bootstrap;
pub mod report;
pub mod scenario;
pub mod staging;

#[cfg(all(test, unix))]
pub(crate) mod fake;

pub use bootstrap::*;
pub use report::*;
pub use scenario::*;
pub use staging::*;
