pub mod meta;
pub mod store;
pub mod validation;

pub use meta::{ValidationStatus, VertexMeta};
pub use store::{AcceptRecord, MemoryStore, TipChanges, VertexStore};
pub use validation::{validate_parents, validate_structure, ParentView, ValidationRules};
