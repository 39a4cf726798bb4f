use thiserror::Error;

use super::fetch::FetchError;

/// Errors surfaced by schema fetching and reference resolution.
///
/// Every failure aborts the whole `resolve` call: a single failed fetch or
/// missing reference target fails the resolution outright, with no partial
/// result and no retry.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Schema [{id}] is not valid JSON: {source}")]
    Parse {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema [{id}] references [{reference}], which was not retrieved")]
    UnresolvedReference { id: String, reference: String },

    #[error("Schema [{id}] is part of a reference cycle and has no finite JSON form")]
    CyclicDocument { id: String },
}
