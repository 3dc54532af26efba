pub mod debounce;
pub mod notice;

pub use debounce::*;
pub use notice::*;
