pub mod bundler;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod mode;
pub mod orchestration;
pub mod pipeline;
pub mod server;
pub mod sourcemap;
pub mod stages;
pub mod transform;
pub mod util;
pub mod watch;

pub use error::{Error, Result, TransformError};
pub use mode::{BuildContext, Mode};
pub use pipeline::Project;
