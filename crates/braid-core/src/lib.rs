pub mod constants;
pub mod encoding;
pub mod error;
pub mod types;
pub mod vertex;

pub use constants::*;
pub use error::{BraidError, ScriptError};
pub use types::*;
pub use vertex::*;
