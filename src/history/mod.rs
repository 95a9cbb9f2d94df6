pub mod ledger;
pub mod store;
pub mod types;

pub use ledger::{JsonFileLedger, LedgerStore};
pub use store::ClickHistoryStore;
pub use types::{AnnotationCandidate, AppClickHistory, ClickHistoryEntry, StoredClickHistoryEntry};
