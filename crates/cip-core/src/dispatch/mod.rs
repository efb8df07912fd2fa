//! Handler registry and request execution (C9, §4.9).

pub mod executor;
pub mod registry;

pub use executor::{build_multiple_service_request, execute};
pub use registry::{Handler, HandlerAction, HandlerRegistry};
