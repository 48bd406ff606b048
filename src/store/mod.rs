//! Content store collaborator.
//!
//! The expiration engine never owns records. It lists candidate identifiers,
//! fetches each record and applies one mutation through [`ContentStore`].
//! [`MemoryStore`] is a complete in-process implementation used by the CLI
//! simulator and by tests.

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{ContentStore, ExpiredQuery, FieldPatch, Record, RecordId, RecordStatus};
