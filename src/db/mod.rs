pub mod connection;
pub mod memory;
pub mod models;
pub mod repositories;

pub use connection::*;
pub use memory::MemoryDb;
pub use models::*;
pub use repositories::*;
