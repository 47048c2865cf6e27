//! Reference index: labelled reference-image embeddings, rebuilt wholesale
//! and swapped atomically under concurrent readers.

mod index;
pub mod scan;
mod snapshot;

pub use index::ReferenceIndex;
pub use scan::{ReferenceFile, label_for, scan};
pub use snapshot::{ReferenceEntry, Snapshot};

#[cfg(test)]
pub(crate) mod testing;
