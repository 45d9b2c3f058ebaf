pub mod outcome;
pub mod proxy;
pub mod stats;

pub use outcome::*;
pub use proxy::*;
pub use stats::*;
