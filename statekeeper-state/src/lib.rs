//! Statekeeper State
//!
//! Recovers the backend declaration a working directory was last initialized
//! with, so the engine can tell whether the desired configuration drifted.
//!
//! # Example
//!
//! ```ignore
//! use statekeeper_state::read_backend_record;
//!
//! let existing = read_backend_record(".")?;
//! let needs_reinit = reconciler.has_drifted(&remote_state.config, existing.as_ref());
//! ```

pub mod error;
pub mod local;
pub mod metadata;

pub use error::{StateError, StateResult};
pub use local::{LocalMetadata, read_backend_record};
pub use metadata::{BackendBlock, TerraformMetadata};
