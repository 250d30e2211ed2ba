pub mod model;
pub mod parser;
pub mod format_cache;
pub mod fields;
pub mod stats;
pub mod context;
pub mod memory;
pub mod config;

pub use config::ExploreConfig;
pub use context::{ContextFetcher, ContextSession, ContextWindow, RowSource};
pub use fields::FieldExtractor;
pub use model::{Field, LogRow, StatItem};
