pub mod account;
pub mod message;

pub use account::Account;
pub use message::{Category, ClassifiedMessage, IndexedRecord, NormalizedMessage, RawMessage};
