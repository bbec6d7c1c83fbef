use thiserror::Error;

/// Failures surfaced by the remove/relink walkers.
///
/// Absence of a match is never an error, and neither is an empty document;
/// both are no-ops. Errors come from malformed data (the document or one of
/// its embedded blobs) or from a delegated rewrite that failed partway.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The reference carries neither an identifier nor a path, so there is
    /// nothing it could ever match.
    #[error("item reference has neither an identifier nor a path")]
    EmptyReference,

    /// The layout document failed to parse or re-serialize.
    #[error("malformed layout document: {0}")]
    MalformedLayout(String),

    /// A rendering's parameters blob was rejected by the peer parser.
    /// Parameters that fail to parse are a data-integrity problem, not an
    /// expected absence, so the failure is never swallowed.
    #[error("malformed rendering parameters: {0}")]
    MalformedParameters(anyhow::Error),

    /// The rules blob came back from the rule peer in a shape that no longer
    /// parses as a single element.
    #[error("malformed rules blob: {0}")]
    MalformedRules(String),

    /// A delegated nested-field rewrite failed. Any edit session the walker
    /// opened around the field has already been closed by the time this
    /// propagates.
    #[error("nested field rewrite failed: {0}")]
    NestedField(anyhow::Error),
}
