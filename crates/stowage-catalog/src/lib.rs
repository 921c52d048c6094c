//! Resource revisions on top of a blob store and a metadata store that share no transactions.
//!
//! A record is only committed after its blob has been written and verified, and a blob whose
//! record can't be committed is deleted again. Readers therefore never see a record that points
//! at missing or mismatched content. The remaining failure mode is an orphaned blob after a crash,
//! which is invisible to readers.

pub mod allocator;
pub mod blob_writer;
pub mod catalog;
pub mod resolver;

pub use catalog::Catalog;
pub use resolver::{Resolver, Selector};
