//! Integration tests: full cycles through the public API.

mod mock_source;
mod pipeline;
