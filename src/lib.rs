pub mod cri;
pub mod error;
pub mod pidns;
pub mod topology;

pub use error::{PodtraceError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
