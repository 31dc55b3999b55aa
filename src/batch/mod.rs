pub mod extractor;
pub mod types;
pub mod wire;

pub use extractor::extract;
pub use types::{Batch, ChangeOp, Column, FlatMessage, RowChangeRecord};
pub use wire::{BatchEncoder, EntryKind};
