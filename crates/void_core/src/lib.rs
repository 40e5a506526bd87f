//! # void_core - Void Runtime Core
//!
//! Foundational primitives shared by the object-graph runtime:
//! - **Handles**: generational arena indices that fail cleanly once their
//!   target is gone
//! - **Identifiers**: stable string ids for declared objects and instances
//! - **Type factory**: name-keyed constructors registered at start-up
//! - **Errors**: the shared taxonomy and the aggregated [`ErrorReport`]
//! - **Reload phases**: the two-phase stage/commit state machine
//! - **Services**: explicit context passed to init and update calls

pub mod error;
pub mod handle;
pub mod hot_reload;
pub mod id;
pub mod services;
pub mod type_registry;

pub use error::*;
pub use handle::*;
pub use hot_reload::*;
pub use id::*;
pub use services::*;
pub use type_registry::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{BatchResult, Error, ErrorReport, InitError};
    pub use crate::handle::{Handle, HandleMap};
    pub use crate::hot_reload::{FinishMode, ReloadPhase};
    pub use crate::id::ObjectId;
    pub use crate::services::Services;
    pub use crate::type_registry::{AsAny, TypeFactory, TypeInfo};
}
