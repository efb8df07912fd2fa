//! Server-side object personalities (C10-C12, §3).
//!
//! Each store owns its own lock(s) and is registered into a
//! [`cip_core::dispatch::HandlerRegistry`] independently, so an assembly
//! recompute never blocks a tag read and vice versa (§5).

pub mod adapter;
pub mod generic_object;
pub mod identity;
pub mod tag;

pub use adapter::{AdapterStore, Assembly, UpdatePattern};
pub use generic_object::{GenericObjectStore, ObjectClass, ObjectClassSelection};
pub use identity::{IdentityStore, default_identity};
pub use tag::{Tag, TagStore, TagUpdatePattern};
