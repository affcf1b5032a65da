pub mod types;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod store;
pub mod memory;
pub mod publisher;
pub mod diff;
pub mod sweep;
pub mod registration;
pub mod trigger;
pub mod api;
pub mod enrichment;
pub mod config;

pub use types::*;
pub use traits::{EventPublisher, FeedSource, WatermarkStore};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use store::PgWatermarkStore;
pub use memory::{InMemoryWatermarkStore, RecordingPublisher};
pub use publisher::{HttpPublisher, PgOutboxPublisher};
pub use diff::{DiffEngine, NewItems};
pub use sweep::SweepOrchestrator;
pub use trigger::SweepTrigger;
