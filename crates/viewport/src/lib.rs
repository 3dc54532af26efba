pub mod config;
pub mod mode;
pub mod overlay;
pub mod path;
pub mod picker;
pub mod session;
pub mod tracker;

pub use config::*;
pub use mode::*;
pub use overlay::*;
pub use path::*;
pub use picker::*;
pub use session::*;
pub use tracker::*;
