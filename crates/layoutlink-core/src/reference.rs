use crate::error::RewriteError;

/// A link to a content item, carried in both encodings layout documents use:
/// the opaque identifier form and the hierarchical path form.
///
/// Layout documents mix the two encodings inconsistently (a datasource may
/// hold either), so every matching site checks both. Identifiers compare
/// ordinally; paths compare case-insensitively via lowercase folding, which
/// keeps the comparison locale-independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    pub id: String,
    pub path: String,
}

impl ItemReference {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// True when `value` denotes this item in either encoding.
    pub fn matches(&self, value: &str) -> bool {
        self.matches_id(value) || self.matches_path(value)
    }

    /// Ordinal comparison against the identifier form. Empty values never
    /// match, and an empty identifier matches nothing.
    pub fn matches_id(&self, value: &str) -> bool {
        !value.is_empty() && !self.id.is_empty() && value == self.id
    }

    /// Case-insensitive comparison against the path form.
    pub fn matches_path(&self, value: &str) -> bool {
        !value.is_empty()
            && !self.path.is_empty()
            && value.to_lowercase() == self.path.to_lowercase()
    }

    /// Cheap substring pre-filter: does `text` mention this item at all, in
    /// either encoding? Used to skip structured rewrites of fields that
    /// cannot possibly contain the reference.
    pub fn occurs_in(&self, text: &str) -> bool {
        (!self.id.is_empty() && text.contains(&self.id))
            || (!self.path.is_empty() && text.contains(&self.path))
    }

    pub(crate) fn ensure_usable(&self) -> Result<(), RewriteError> {
        if self.id.is_empty() && self.path.is_empty() {
            return Err(RewriteError::EmptyReference);
        }
        Ok(())
    }
}

/// A redirection: every occurrence of `from` is rewritten to denote `to`.
///
/// Identifier-form occurrences receive `to.id`; path-form datasource
/// occurrences receive `to.path`, so path-encoded references stay
/// path-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub from: ItemReference,
    pub to: ItemReference,
}

impl Redirect {
    pub fn new(from: ItemReference, to: ItemReference) -> Self {
        Self { from, to }
    }
}
