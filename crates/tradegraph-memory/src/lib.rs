pub mod error;
pub mod index;
pub mod journal;
pub mod store;

pub use error::MemoryError;
pub use index::{tokenize, TermIndex};
pub use journal::Journal;
pub use store::MemoryStore;
