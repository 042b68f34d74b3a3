// Runtime infrastructure shared by the CLI and embedders
pub mod logging;
pub mod parallel;

pub use logging::*;
pub use parallel::*;
