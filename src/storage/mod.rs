pub mod message_store;
pub mod persistence;

pub use message_store::MessageStore;
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
