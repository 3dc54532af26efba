pub mod cache;
pub mod coordinator;
pub mod pipeline;
pub mod protocol;
pub mod request;
pub mod residency;
pub mod source;

pub use cache::*;
pub use coordinator::*;
pub use pipeline::*;
pub use protocol::*;
pub use request::*;
pub use residency::*;
pub use source::*;
