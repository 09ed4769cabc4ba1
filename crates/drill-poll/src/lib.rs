pub mod classify;
pub mod poller;
pub mod probe;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::*;
pub use poller::*;
pub use probe::*;
pub use types::*;
