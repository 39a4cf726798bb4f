//! Windrow - cross-window coordination and schema resolution toolkit
//!
//! Two loosely related halves sharing an async-transport flavour:
//!
//! - [`schema`] resolves `$ref` graphs across remotely fetched JSON Schema
//!   documents, fanning out concurrent fetches and splicing the resolved
//!   documents back into the requesting tree.
//! - [`bus`] coordinates a tree of windows behind a single coordinator,
//!   multiplexing broadcast application messages with the internal get/set
//!   protocol that backs the coordinator's shared key/value store.
//!
//! [`properties`] and [`container`] are the small supporting loaders: a
//! `.properties` reader and a configured-object-graph container.

pub mod bus;
pub mod container;
pub mod properties;
pub mod schema;

pub use bus::window::Window;
pub use bus::BusError;
pub use container::{Container, ContainerConfig, ContainerError};
pub use schema::{SchemaError, SchemaNode, SchemaResolver, SharedSchema};
