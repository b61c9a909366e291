pub mod column_mapping;
pub mod config;
pub mod crawler;
pub mod error;
pub mod http_cache;
pub mod http_client;
pub mod pipeline;
pub mod table;
pub mod transform;

pub use error::{PipelineError, Result};
