pub mod defs;

pub use defs::{DispatchEvent, EventDecodeError, FeedItem, FeedRegistration};
