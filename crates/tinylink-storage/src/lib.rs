pub mod coordinator;
pub mod deleter;
pub mod file;
pub mod memory;
pub mod postgres;

pub use coordinator::{Storage, PING_TIMEOUT};
pub use deleter::{DeleteQueue, DEFAULT_DELETE_WORKERS};
pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
pub use tinylink_core::{ReadRepository, Repository, SoftDeleteRepository, StorageError};
