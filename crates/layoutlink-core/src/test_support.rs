//! In-memory fakes for the collaborator seams, shared across the walker and
//! delegation tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::fields::{LinkContext, NestedField, ParameterFields, RuleField};
use crate::params::ParameterSet;
use crate::reference::{ItemReference, Redirect};

/// Edit-session transitions observed across every field a store handed out.
#[derive(Debug, Default)]
pub(crate) struct EditLog {
    pub begins: usize,
    pub ends: usize,
}

/// Fake content store: resolves a fixed set of item identifiers and backs
/// parameter fields with [`ParameterSet`]. Field rewrites are plain
/// substring operations, which is all the walkers ever observe of the real
/// mini-language maintainers.
pub(crate) struct FakeStore {
    items: HashSet<String>,
    edit_log: Rc<RefCell<EditLog>>,
    /// Hand out fields that are already inside an edit session.
    pub already_editing: bool,
    /// Make every delegated field rewrite fail.
    pub fail_field_rewrite: bool,
    /// Make the parameters parser reject its input.
    pub reject_parameters: bool,
    /// Force the rule peer to return this value regardless of input.
    pub forced_rule_value: Option<String>,
}

impl FakeStore {
    pub fn new<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            items: items.into_iter().map(str::to_string).collect(),
            edit_log: Rc::default(),
            already_editing: false,
            fail_field_rewrite: false,
            reject_parameters: false,
            forced_rule_value: None,
        }
    }

    pub fn begins(&self) -> usize {
        self.edit_log.borrow().begins
    }

    pub fn ends(&self) -> usize {
        self.edit_log.borrow().ends
    }
}

fn scrub(value: &str, target: &ItemReference) -> String {
    let mut out = value.to_string();
    if !target.id.is_empty() {
        out = out.replace(&target.id, "");
    }
    if !target.path.is_empty() {
        out = out.replace(&target.path, "");
    }
    out
}

fn swap(value: &str, redirect: &Redirect) -> String {
    let mut out = value.to_string();
    if !redirect.from.id.is_empty() {
        out = out.replace(&redirect.from.id, &redirect.to.id);
    }
    if !redirect.from.path.is_empty() {
        out = out.replace(&redirect.from.path, &redirect.to.path);
    }
    out
}

pub(crate) struct FakeField {
    key: String,
    value: String,
    editing: bool,
    fail_rewrite: bool,
    log: Rc<RefCell<EditLog>>,
}

impl NestedField for FakeField {
    fn value(&self) -> &str {
        &self.value
    }

    fn is_editing(&self) -> bool {
        self.editing
    }

    fn begin_edit(&mut self) {
        self.editing = true;
        self.log.borrow_mut().begins += 1;
    }

    fn end_edit(&mut self) {
        self.editing = false;
        self.log.borrow_mut().ends += 1;
    }

    fn remove_reference(&mut self, target: &ItemReference) -> anyhow::Result<()> {
        if self.fail_rewrite {
            anyhow::bail!("field rewrite rejected");
        }
        self.value = scrub(&self.value, target);
        Ok(())
    }

    fn relink_reference(&mut self, redirect: &Redirect) -> anyhow::Result<()> {
        if self.fail_rewrite {
            anyhow::bail!("field rewrite rejected");
        }
        self.value = swap(&self.value, redirect);
        Ok(())
    }
}

pub(crate) struct FakeFields {
    fields: Vec<FakeField>,
}

impl ParameterFields for FakeFields {
    type Field = FakeField;

    fn fields_mut(&mut self) -> &mut [FakeField] {
        &mut self.fields
    }

    fn encode(&self) -> String {
        let mut set = ParameterSet::new();
        for field in &self.fields {
            set.set(&field.key, &field.value);
        }
        set.encode()
    }
}

pub(crate) struct FakeRuleField {
    value: String,
    forced: Option<String>,
}

impl RuleField for FakeRuleField {
    fn value(&self) -> &str {
        &self.value
    }

    fn remove_reference(&mut self, target: &ItemReference) -> anyhow::Result<()> {
        self.value = match &self.forced {
            Some(forced) => forced.clone(),
            None => scrub(&self.value, target),
        };
        Ok(())
    }

    fn relink_reference(&mut self, redirect: &Redirect) -> anyhow::Result<()> {
        self.value = match &self.forced {
            Some(forced) => forced.clone(),
            None => swap(&self.value, redirect),
        };
        Ok(())
    }
}

impl LinkContext for FakeStore {
    type Item = String;
    type ParameterFields = FakeFields;
    type RuleField = FakeRuleField;

    fn item_by_id(&self, id: &str) -> Option<String> {
        self.items.contains(id).then(|| id.to_string())
    }

    fn parse_parameters(&self, _item: &String, encoded: &str) -> anyhow::Result<FakeFields> {
        if self.reject_parameters {
            anyhow::bail!("parameters blob rejected");
        }
        let set = ParameterSet::parse(encoded)?;
        Ok(FakeFields {
            fields: set
                .iter()
                .map(|(key, value)| FakeField {
                    key: key.to_string(),
                    value: value.to_string(),
                    editing: self.already_editing,
                    fail_rewrite: self.fail_field_rewrite,
                    log: Rc::clone(&self.edit_log),
                })
                .collect(),
        })
    }

    fn rule_field(&self, encoded: &str) -> FakeRuleField {
        FakeRuleField {
            value: encoded.to_string(),
            forced: self.forced_rule_value.clone(),
        }
    }
}
