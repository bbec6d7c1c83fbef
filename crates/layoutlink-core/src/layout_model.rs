//! In-memory model of one layout document.
//!
//! A layout document is a transient value: it is parsed from a field's
//! current string value, mutated in place by one walker pass, serialized
//! back, and discarded. Nothing here persists across operations.

/// Ordered collection of devices. Order is significant and preserved across
/// every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutDocument {
    pub devices: Vec<Device>,
}

/// A rendering target context (desktop, print, ...) within the document.
///
/// A device with no placeholders and no renderings left is still valid; it
/// is only dropped when the device itself is the removal target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Identifier of the device item. Empty when the wire form omitted it.
    pub id: String,
    /// Identifier of the default layout item, if any.
    pub layout: Option<String>,
    pub placeholders: Vec<Placeholder>,
    pub renderings: Vec<Rendering>,
}

/// A named slot within a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholder {
    pub key: Option<String>,
    pub unique_id: Option<String>,
    /// Reference to the placeholder-settings item. Holds either a path or an
    /// identifier; the document never says which, so matching checks both.
    /// Empty when absent.
    pub metadata: String,
}

/// A presentation component placed on a device, plus its configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendering {
    /// Identifier of the item defining this rendering. Can be absent; a
    /// rendering without a defining item still carries its other fields.
    pub item: Option<String>,
    pub unique_id: Option<String>,
    /// Key of the placeholder this rendering is inserted into.
    pub placeholder: Option<String>,
    /// The content item this rendering reads from, as an identifier or a
    /// path. Empty when absent.
    pub datasource: String,
    /// Identifier of a multivariate test item.
    pub multivariate_test: Option<String>,
    /// URL-encoded key/value blob of rendering parameters. Empty when absent.
    pub parameters: String,
    /// Serialized rules element, kept as raw markup and delegated to the
    /// rule peer for rewriting.
    pub rules: Option<String>,
}
