//! Remove every occurrence of a reference from a layout document.

use serde::Serialize;

use crate::error::RewriteError;
use crate::fields::LinkContext;
use crate::layout_codec;
use crate::nested_fields::{self, FieldOp};
use crate::reference::ItemReference;

/// Outcome of one rewrite pass over one layout document.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteResult {
    /// The serialized document after the pass. When nothing matched, this is
    /// the input returned verbatim, byte for byte.
    pub value: String,
    /// Number of rewrites applied anywhere in the document, nested blobs
    /// included.
    pub edits: usize,
}

impl RewriteResult {
    pub(crate) fn unchanged(value: &str) -> Self {
        Self {
            value: value.to_string(),
            edits: 0,
        }
    }
}

/// Remove `target` from the layout document serialized in `layout`.
///
/// A device whose id matches loses the whole device; a matching default
/// layout reference is cleared with the device kept and its children still
/// processed. Matching placeholders and renderings are dropped, matching
/// datasource and multivariate-test fields are cleared, and the parameter
/// and rule blobs of surviving renderings are delegated to their peers
/// through `ctx`. Absence of a match anywhere is a no-op, not an error.
pub fn remove_reference<C: LinkContext>(
    layout: &str,
    target: &ItemReference,
    ctx: &C,
) -> Result<RewriteResult, RewriteError> {
    target.ensure_usable()?;
    if layout.is_empty() {
        return Ok(RewriteResult::unchanged(layout));
    }

    let mut document = layout_codec::parse(layout)?;
    let mut edits = 0usize;
    let op = FieldOp::Remove(target);

    let devices = std::mem::take(&mut document.devices);
    let mut kept_devices = Vec::with_capacity(devices.len());
    for mut device in devices {
        if target.matches(&device.id) {
            // The whole device goes; nothing beneath it is visited.
            edits += 1;
            continue;
        }
        if device.layout.as_deref().is_some_and(|value| target.matches(value)) {
            device.layout = None;
            edits += 1;
        }

        device.placeholders.retain(|placeholder| {
            if target.matches(&placeholder.metadata) {
                edits += 1;
                false
            } else {
                true
            }
        });

        let renderings = std::mem::take(&mut device.renderings);
        let mut kept_renderings = Vec::with_capacity(renderings.len());
        for mut rendering in renderings {
            if target.matches_path(&rendering.datasource) {
                rendering.datasource.clear();
                edits += 1;
            }
            if target.matches_id(&rendering.datasource) {
                rendering.datasource.clear();
                edits += 1;
            }
            if rendering
                .multivariate_test
                .as_deref()
                .is_some_and(|test| target.matches_id(test))
            {
                rendering.multivariate_test = None;
                edits += 1;
            }
            if rendering.item.as_deref().is_some_and(|item| target.matches(item)) {
                // Dropped renderings get no nested delegation.
                edits += 1;
                continue;
            }
            edits += nested_fields::rewrite_parameters(&mut rendering, &op, ctx)?;
            edits += nested_fields::rewrite_rules(&mut rendering, &op, ctx)?;
            kept_renderings.push(rendering);
        }
        device.renderings = kept_renderings;
        kept_devices.push(device);
    }
    document.devices = kept_devices;

    if edits == 0 {
        return Ok(RewriteResult::unchanged(layout));
    }
    tracing::debug!(edits, "removed reference occurrences from layout");
    Ok(RewriteResult {
        value: layout_codec::serialize(&document)?,
        edits,
    })
}
