//! Collaborator seams between the walkers and the host system.
//!
//! The underlying content store, the generic field abstraction, and the two
//! mini-language link maintainers (rendering parameters, rules) all live
//! outside this crate. The walkers reach them through these traits so the
//! core stays testable without a real store.

use crate::reference::{ItemReference, Redirect};

/// Everything the walkers need from the host: item lookup plus the peer
/// parsers for the two embedded mini-documents.
pub trait LinkContext {
    /// Opaque handle to a content item; the parameter parser needs it to
    /// interpret a blob against the defining item's schema.
    type Item;
    type ParameterFields: ParameterFields;
    type RuleField: RuleField;

    /// Resolve an item by identifier. `None` is an expected outcome, not an
    /// error; a rendering can reference parameters without a resolvable
    /// defining item.
    fn item_by_id(&self, id: &str) -> Option<Self::Item>;

    /// Parse a parameters blob against the defining item. Failure here is a
    /// data-integrity problem and propagates to the caller.
    fn parse_parameters(
        &self,
        item: &Self::Item,
        encoded: &str,
    ) -> anyhow::Result<Self::ParameterFields>;

    /// Wrap a rules blob in the rule mini-language's field value.
    fn rule_field(&self, encoded: &str) -> Self::RuleField;
}

/// A parsed parameters blob: the full key/value set, re-encodable after its
/// fields have been rewritten.
pub trait ParameterFields {
    type Field: NestedField;

    fn fields_mut(&mut self) -> &mut [Self::Field];

    /// Re-encode the full set back into blob form.
    fn encode(&self) -> String;
}

/// One field inside a parsed parameters blob, together with the edit-session
/// lifecycle of the item owning it.
pub trait NestedField {
    fn value(&self) -> &str;

    /// Whether the owning item is already inside an edit session.
    fn is_editing(&self) -> bool;
    fn begin_edit(&mut self);
    fn end_edit(&mut self);

    fn remove_reference(&mut self, target: &ItemReference) -> anyhow::Result<()>;
    fn relink_reference(&mut self, redirect: &Redirect) -> anyhow::Result<()>;
}

/// The rule mini-language's view of a rules blob.
pub trait RuleField {
    fn value(&self) -> &str;

    fn remove_reference(&mut self, target: &ItemReference) -> anyhow::Result<()>;
    fn relink_reference(&mut self, redirect: &Redirect) -> anyhow::Result<()>;
}
