//! State store adapters.

mod in_memory;
mod json_file;

pub use in_memory::InMemoryStateStore;
pub use json_file::JsonFileStateStore;
