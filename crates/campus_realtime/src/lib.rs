#![forbid(unsafe_code)]

pub mod events;
pub mod registry;
pub mod router;

pub use events::{ClientEvent, ServerEvent};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use router::{EventRouter, RouterConfig, RouterHandle, spawn_event_router};

#[cfg(test)]
mod registry_tests;
