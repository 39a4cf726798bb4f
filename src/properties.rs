//! `.properties` file reading
//!
//! Parses the familiar `key=value` format into a string map: one pair per
//! line, `#` and `!` comment lines, whitespace trimmed around both sides of
//! the first `=`. Not every variant of the format is handled (no line
//! continuations, no escapes), which covers the files seen in practice.

use std::collections::HashMap;

use thiserror::Error;

use crate::schema::{DocumentFetcher, FetchError};

#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Parse properties text into a key/value map.
pub fn parse(text: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
            // A bare key is a key with an empty value.
            None => {
                values.insert(line.to_string(), String::new());
            }
        }
    }

    values
}

/// Fetch a properties file through any [`DocumentFetcher`] and parse it.
pub async fn load(
    fetcher: &dyn DocumentFetcher,
    address: &str,
) -> Result<HashMap<String, String>, PropertiesError> {
    let text = fetcher.fetch(address).await?;
    Ok(parse(&text))
}
