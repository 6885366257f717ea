pub mod config;
pub mod coordinator;
pub mod instance;
pub mod pipeline;
pub mod summary;
pub mod util;

pub use config::*;
pub use coordinator::*;
pub use instance::*;
pub use pipeline::*;
pub use summary::*;
pub use util::*;
