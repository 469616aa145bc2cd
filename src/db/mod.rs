pub mod loader;
pub mod models;
pub mod repository;

pub use loader::{BatchLoader, BatchSink};
pub use repository::Repository;
