//! Integration tests driving the library with in-memory collaborators.

mod mock_extractor;
mod pipeline;
