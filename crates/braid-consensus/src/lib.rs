pub mod tracker;
pub mod work;

pub use tracker::{ConsensusTracker, ConsensusUpdate};
pub use work::{PowVerifier, WorkVerifier};
