//! Codec for the URL-encoded key/value blob a rendering carries in its
//! parameters field.
//!
//! The blob is the usual `k=v&k2=v2` shape with percent-encoded keys and
//! values. This module only owns the encoding; what the individual values
//! mean is up to the host's field layer, which the delegation seam in
//! [`crate::fields`] reaches through.

use thiserror::Error;

/// A key/value pair failed to percent-decode.
#[derive(Debug, Error)]
#[error("invalid parameter encoding in {pair:?}: {source}")]
pub struct ParameterParseError {
    pub pair: String,
    #[source]
    pub source: std::string::FromUtf8Error,
}

/// Ordered key/value pairs decoded from a parameters blob. Order is
/// preserved through decode and encode; later duplicates of a key are kept
/// as separate entries, the way they arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    entries: Vec<(String, String)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a blob. An empty blob is an empty set; a pair without `=` is
    /// a bare key with an empty value. Malformed percent escapes are an
    /// error, not a silent drop.
    pub fn parse(encoded: &str) -> Result<Self, ParameterParseError> {
        let mut entries = Vec::new();
        for pair in encoded.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key, pair)?;
            let value = decode_component(raw_value, pair)?;
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    pub fn encode(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// First value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first value stored under `key`, or append a new entry.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_component(raw: &str, pair: &str) -> Result<String, ParameterParseError> {
    urlencoding::decode(raw)
        .map(|cow| cow.into_owned())
        .map_err(|source| ParameterParseError {
            pair: pair.to_string(),
            source,
        })
}
