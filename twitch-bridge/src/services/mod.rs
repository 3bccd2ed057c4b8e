//! Service layer module.
//!
//! This module provides the service container that wires the bus, the
//! credential store and the connectors together.

pub mod container;

pub use container::ServiceContainer;
