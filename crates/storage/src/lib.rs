#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    CatalogRepository, InMemoryRepository, InteractionRepository, ProgressRepository,
    SessionRepository, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
