//! JSON Schema reference resolution
//!
//! Fetches a schema document by id, discovers every cross-document `$ref`
//! inside it, fetches the referenced documents concurrently through the same
//! resolver, and splices the resolved documents into the requesting tree.
//! Duplicate references are fetched once, and cyclic reference graphs resolve
//! to shared back-edges instead of recursing forever.
//!
//! Only reference resolution is performed: there is no schema validation, and
//! intra-document fragment pointers (`#/...`) get no special handling.

pub mod document;
pub mod error;
pub mod fetch;
pub mod resolver;

pub use document::{SchemaCell, SchemaNode, SharedSchema};
pub use error::SchemaError;
pub use fetch::{
    BaseAddressFormatter, DocumentFetcher, FetchError, HttpFetcher, IdentityFormatter,
    NameFormatter, StaticFetcher,
};
pub use resolver::SchemaResolver;
