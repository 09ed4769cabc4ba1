pub mod command;
pub mod error;
pub mod launcher;

pub use command::*;
pub use error::*;
pub use launcher::*;
