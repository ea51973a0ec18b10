//! Integration tests: the full recommendation pipeline against in-memory
//! odds feeds.

mod mock_feed;
mod pipeline;
