//! Delegation into the parameter and rule mini-documents.
//!
//! A rendering embeds two sub-documents in string fields: the URL-encoded
//! parameters blob and the rules blob. Both have their own link maintainers
//! living outside this crate; the functions here orchestrate handing each
//! blob to its peer and putting the rewritten form back.

use crate::edit_scope::EditScope;
use crate::error::RewriteError;
use crate::fields::{LinkContext, NestedField, ParameterFields, RuleField};
use crate::layout_model::Rendering;
use crate::reference::{ItemReference, Redirect};

/// The operation being delegated, carried through the seam so both walkers
/// share one delegation path.
pub(crate) enum FieldOp<'a> {
    Remove(&'a ItemReference),
    Relink(&'a Redirect),
}

impl FieldOp<'_> {
    pub(crate) fn target(&self) -> &ItemReference {
        match self {
            FieldOp::Remove(target) => target,
            FieldOp::Relink(redirect) => &redirect.from,
        }
    }

    fn apply_nested<F: NestedField>(&self, field: &mut F) -> anyhow::Result<()> {
        match self {
            FieldOp::Remove(target) => field.remove_reference(target),
            FieldOp::Relink(redirect) => field.relink_reference(redirect),
        }
    }

    fn apply_rule<F: RuleField>(&self, field: &mut F) -> anyhow::Result<()> {
        match self {
            FieldOp::Remove(target) => field.remove_reference(target),
            FieldOp::Relink(redirect) => field.relink_reference(redirect),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters blob
// ---------------------------------------------------------------------------

/// Rewrite references inside a rendering's parameters blob.
///
/// Skipped silently when the rendering has no parameters, no defining item,
/// or a defining item the store cannot resolve; parameters without a
/// resolvable schema cannot be interpreted. A blob that fails to parse is an
/// error. Returns the number of fields rewritten.
pub(crate) fn rewrite_parameters<C: LinkContext>(
    rendering: &mut Rendering,
    op: &FieldOp<'_>,
    ctx: &C,
) -> Result<usize, RewriteError> {
    if rendering.parameters.is_empty() {
        return Ok(0);
    }
    let Some(item_id) = rendering.item.as_deref() else {
        return Ok(0);
    };
    let Some(item) = ctx.item_by_id(item_id) else {
        tracing::debug!(item = item_id, "defining item not found; parameters left untouched");
        return Ok(0);
    };

    let mut fields = ctx
        .parse_parameters(&item, &rendering.parameters)
        .map_err(RewriteError::MalformedParameters)?;

    let mut edits = 0usize;
    for field in fields.fields_mut() {
        if field.value().is_empty() {
            continue;
        }
        if !op.target().occurs_in(field.value()) {
            continue;
        }
        let mut scope = EditScope::enter(field);
        op.apply_nested(scope.field_mut())
            .map_err(RewriteError::NestedField)?;
        edits += 1;
    }

    if edits > 0 {
        rendering.parameters = fields.encode();
    }
    Ok(edits)
}

// ---------------------------------------------------------------------------
// Rules blob
// ---------------------------------------------------------------------------

/// Rewrite references inside a rendering's rules blob.
///
/// The blob is handed to the rule peer whole; if the peer changed it, the
/// result must still parse as a single element before it is reinserted.
pub(crate) fn rewrite_rules<C: LinkContext>(
    rendering: &mut Rendering,
    op: &FieldOp<'_>,
    ctx: &C,
) -> Result<usize, RewriteError> {
    let Some(rules) = rendering.rules.as_deref() else {
        return Ok(0);
    };

    let mut field = ctx.rule_field(rules);
    op.apply_rule(&mut field).map_err(RewriteError::NestedField)?;

    if field.value() == rules {
        return Ok(0);
    }
    crate::layout_codec::ensure_element(field.value()).map_err(RewriteError::MalformedRules)?;
    rendering.rules = Some(field.value().to_string());
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;

    const ITEM: &str = "{11111111-2222-3333-4444-555555555555}";
    const TARGET_ID: &str = "{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}";
    const TARGET_PATH: &str = "/content/home/banner";

    fn target() -> ItemReference {
        ItemReference::new(TARGET_ID, TARGET_PATH)
    }

    fn rendering_with_parameters(parameters: &str) -> Rendering {
        Rendering {
            item: Some(ITEM.to_string()),
            parameters: parameters.to_string(),
            ..Rendering::default()
        }
    }

    // === parameter delegation ===

    #[test]
    fn empty_parameters_are_skipped() {
        let store = FakeStore::new([ITEM]);
        let mut rendering = rendering_with_parameters("");
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
    }

    #[test]
    fn missing_defining_item_skips_delegation() {
        // The store would reject the blob, proving the parser is never
        // reached when the rendering has no defining item.
        let mut store = FakeStore::new([ITEM]);
        store.reject_parameters = true;
        let mut rendering = rendering_with_parameters("text={AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}");
        rendering.item = None;
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
    }

    #[test]
    fn unresolvable_defining_item_skips_delegation() {
        let mut store = FakeStore::new([]);
        store.reject_parameters = true;
        let mut rendering = rendering_with_parameters("text={AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}");
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
    }

    #[test]
    fn parse_failure_propagates() {
        let mut store = FakeStore::new([ITEM]);
        store.reject_parameters = true;
        let mut rendering = rendering_with_parameters("whatever=1");
        let target = target();
        let err =
            rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap_err();
        assert!(matches!(err, RewriteError::MalformedParameters(_)));
    }

    #[test]
    fn rewrites_only_fields_mentioning_the_target() {
        let store = FakeStore::new([ITEM]);
        let blob = format!(
            "text={}&other=plain",
            urlencoding::encode(TARGET_ID)
        );
        let mut rendering = rendering_with_parameters(&blob);
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 1);
        assert!(!rendering.parameters.contains("AAAAAAAA"));
        assert!(rendering.parameters.contains("other=plain"));
        // One session opened for the one rewritten field, and closed again.
        assert_eq!(store.begins(), 1);
        assert_eq!(store.ends(), 1);
    }

    #[test]
    fn untouched_blob_keeps_its_bytes() {
        let store = FakeStore::new([ITEM]);
        let mut rendering = rendering_with_parameters("a=1&b=2");
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
        assert_eq!(rendering.parameters, "a=1&b=2");
        assert_eq!(store.begins(), 0, "no session for fields without the target");
    }

    #[test]
    fn active_session_is_not_reopened() {
        let mut store = FakeStore::new([ITEM]);
        store.already_editing = true;
        let blob = format!("text={}", urlencoding::encode(TARGET_ID));
        let mut rendering = rendering_with_parameters(&blob);
        let target = target();
        let edits = rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 1);
        assert_eq!(store.begins(), 0);
        assert_eq!(store.ends(), 0);
    }

    #[test]
    fn failing_rewrite_still_closes_the_session() {
        let mut store = FakeStore::new([ITEM]);
        store.fail_field_rewrite = true;
        let blob = format!("text={}", urlencoding::encode(TARGET_ID));
        let mut rendering = rendering_with_parameters(&blob);
        let target = target();
        let err =
            rewrite_parameters(&mut rendering, &FieldOp::Remove(&target), &store).unwrap_err();
        assert!(matches!(err, RewriteError::NestedField(_)));
        assert_eq!(store.begins(), 1);
        assert_eq!(store.ends(), 1, "the session must close before the error propagates");
    }

    #[test]
    fn relink_swaps_both_encodings_in_fields() {
        let store = FakeStore::new([ITEM]);
        let blob = format!(
            "ref={}&source={}",
            urlencoding::encode(TARGET_ID),
            urlencoding::encode(TARGET_PATH)
        );
        let mut rendering = rendering_with_parameters(&blob);
        let redirect = Redirect::new(
            target(),
            ItemReference::new("{99999999-8888-7777-6666-555555555555}", "/content/home/hero"),
        );
        let edits =
            rewrite_parameters(&mut rendering, &FieldOp::Relink(&redirect), &store).unwrap();
        assert_eq!(edits, 2);
        let decoded = crate::params::ParameterSet::parse(&rendering.parameters).unwrap();
        assert_eq!(decoded.get("ref"), Some("{99999999-8888-7777-6666-555555555555}"));
        assert_eq!(decoded.get("source"), Some("/content/home/hero"));
    }

    // === rule delegation ===

    #[test]
    fn absent_rules_are_skipped() {
        let store = FakeStore::new([]);
        let mut rendering = Rendering::default();
        let target = target();
        let edits = rewrite_rules(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
    }

    #[test]
    fn unchanged_rules_keep_their_bytes() {
        let store = FakeStore::new([]);
        let rules = r#"<rls><ruleset><rule uid="{OTHER}"/></ruleset></rls>"#;
        let mut rendering = Rendering {
            rules: Some(rules.to_string()),
            ..Rendering::default()
        };
        let target = target();
        let edits = rewrite_rules(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 0);
        assert_eq!(rendering.rules.as_deref(), Some(rules));
    }

    #[test]
    fn rewritten_rules_are_reinserted() {
        let store = FakeStore::new([]);
        let rules = format!(r#"<rls><rule ds="{}"/></rls>"#, TARGET_ID);
        let mut rendering = Rendering {
            rules: Some(rules),
            ..Rendering::default()
        };
        let target = target();
        let edits = rewrite_rules(&mut rendering, &FieldOp::Remove(&target), &store).unwrap();
        assert_eq!(edits, 1);
        let rewritten = rendering.rules.unwrap();
        assert!(!rewritten.contains(TARGET_ID));
    }

    #[test]
    fn broken_peer_output_is_rejected() {
        let mut store = FakeStore::new([]);
        store.forced_rule_value = Some("<rls>".to_string());
        let rules = format!(r#"<rls><rule ds="{}"/></rls>"#, TARGET_ID);
        let mut rendering = Rendering {
            rules: Some(rules),
            ..Rendering::default()
        };
        let target = target();
        let err = rewrite_rules(&mut rendering, &FieldOp::Remove(&target), &store).unwrap_err();
        assert!(matches!(err, RewriteError::MalformedRules(_)));
    }
}
