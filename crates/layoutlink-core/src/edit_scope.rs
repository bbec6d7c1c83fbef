//! Scoped edit-session guard for nested fields.

use crate::fields::NestedField;

/// Wraps a nested field in an edit session for the duration of a rewrite.
///
/// A session is opened only when the field's owning item is not already
/// inside one; re-entry is a passthrough, not a stacked session. Whatever
/// was opened is closed in `Drop`, so an erroring or panicking rewrite
/// cannot leave the item stuck in an open edit state.
pub struct EditScope<'a, F: NestedField + ?Sized> {
    field: &'a mut F,
    opened: bool,
}

impl<'a, F: NestedField + ?Sized> EditScope<'a, F> {
    pub fn enter(field: &'a mut F) -> Self {
        let opened = !field.is_editing();
        if opened {
            field.begin_edit();
        }
        Self { field, opened }
    }

    pub fn field_mut(&mut self) -> &mut F {
        self.field
    }
}

impl<F: NestedField + ?Sized> Drop for EditScope<'_, F> {
    fn drop(&mut self) {
        if self.opened {
            self.field.end_edit();
        }
    }
}
