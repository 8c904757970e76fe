//! Durable key/value state shared between stages.
//!
//! Stages are not guaranteed to run in the same process: a CI job may build
//! images in one invocation and tear them down in another. Everything a
//! later stage needs is therefore written through a [`StateStore`] under an
//! explicit [`Scope`], and read back from the same scope.

mod file;
pub mod keys;
mod memory;
mod scope;
mod store;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use scope::Scope;
pub use store::{validate_key, StateStore, StateStoreExt};
