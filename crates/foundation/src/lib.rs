pub mod bounds;
pub mod geocell;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use geocell::*;
pub use time::*;
