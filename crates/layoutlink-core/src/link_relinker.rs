//! Redirect every occurrence of a reference in a layout document to a new
//! target.
//!
//! Relinking substitutes and never removes: a matching device keeps its
//! place with a new id, a matching rendering keeps its configuration with a
//! new defining item. Identifier-form occurrences receive the replacement
//! identifier; a path-form datasource receives the replacement path, so the
//! encoding each reference arrived in is the encoding it leaves in. A
//! placeholder's metadata reference is the one exception: both encodings
//! collapse to the replacement identifier.

use crate::error::RewriteError;
use crate::fields::LinkContext;
use crate::layout_codec;
use crate::link_remover::RewriteResult;
use crate::nested_fields::{self, FieldOp};
use crate::reference::Redirect;

/// Rewrite every occurrence of `redirect.from` in `layout` to denote
/// `redirect.to`. Applying the same redirect a second time is a no-op,
/// since the original reference no longer occurs.
pub fn relink_reference<C: LinkContext>(
    layout: &str,
    redirect: &Redirect,
    ctx: &C,
) -> Result<RewriteResult, RewriteError> {
    redirect.from.ensure_usable()?;
    redirect.to.ensure_usable()?;
    if layout.is_empty() {
        return Ok(RewriteResult::unchanged(layout));
    }

    let mut document = layout_codec::parse(layout)?;
    let mut edits = 0usize;
    let op = FieldOp::Relink(redirect);
    let from = &redirect.from;

    for device in &mut document.devices {
        if from.matches(&device.id) {
            device.id = redirect.to.id.clone();
            edits += 1;
        }
        if device.layout.as_deref().is_some_and(|value| from.matches(value)) {
            device.layout = Some(redirect.to.id.clone());
            edits += 1;
        }

        for placeholder in &mut device.placeholders {
            if from.matches(&placeholder.metadata) {
                placeholder.metadata = redirect.to.id.clone();
                edits += 1;
            }
        }

        for rendering in &mut device.renderings {
            if rendering.item.as_deref().is_some_and(|item| from.matches(item)) {
                rendering.item = Some(redirect.to.id.clone());
                edits += 1;
            }
            // Both datasource checks run in sequence against the current
            // value; a degenerate value equal to both forms receives both
            // substitutions.
            if from.matches_id(&rendering.datasource) {
                rendering.datasource = redirect.to.id.clone();
                edits += 1;
            }
            if from.matches_path(&rendering.datasource) {
                rendering.datasource = redirect.to.path.clone();
                edits += 1;
            }
            edits += nested_fields::rewrite_parameters(rendering, &op, ctx)?;
            edits += nested_fields::rewrite_rules(rendering, &op, ctx)?;
        }
    }

    if edits == 0 {
        return Ok(RewriteResult::unchanged(layout));
    }
    tracing::debug!(edits, "relinked layout references");
    Ok(RewriteResult {
        value: layout_codec::serialize(&document)?,
        edits,
    })
}
