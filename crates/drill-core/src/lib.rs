pub mod config;
pub mod scenario;
pub mod types;
pub mod validation;

pub use config::*;
pub use scenario::*;
pub use types::*;
pub use validation::*;
