pub mod config;
pub mod edge;
pub mod error;
pub mod logging;
pub mod node;
pub mod traits;
pub mod types;

pub use config::{
    CodeGraphConfig, EmbeddingProviderKind, EmbeddingSettings, GitSettings, GraphSettings,
    LogFormat, LoggingConfig, ScanSettings,
};
pub use edge::*;
pub use error::*;
pub use logging::init_tracing;
pub use node::*;
pub use traits::*;
pub use types::*;
