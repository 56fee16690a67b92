//! Shared data model for the hepatic inference workspace.
//!
//! Everything here is created fresh per inference call; nothing in this crate
//! holds state across calls.

pub mod error;
pub mod lesion;
pub mod risk;
pub mod stage;
pub mod types;

pub use error::*;
pub use lesion::*;
pub use risk::*;
pub use stage::*;
pub use types::*;
