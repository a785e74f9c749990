use std::sync::Arc;

use super::controller::{Form, FormResult, SubmitOutcome, read_lock};
use super::emitter::Subscription;
use super::field::{Field, FieldEvent, FieldEventKind};
use super::record::FormRecord;
use super::value::FieldValue;

/// Input surface implemented by an adapter layer (a text box, a checkbox, a
/// test double). The form core never renders anything itself.
pub trait FieldControl: Send + Sync + 'static {
    fn read(&self) -> Option<FieldValue>;
    fn write(&self, value: Option<&FieldValue>);
}

impl<C: FieldControl + ?Sized> FieldControl for Arc<C> {
    fn read(&self) -> Option<FieldValue> {
        (**self).read()
    }

    fn write(&self, value: Option<&FieldValue>) {
        (**self).write(value)
    }
}

/// The event a native submit gesture hands to the form.
pub trait SubmitEvent {
    fn prevent_default(&mut self);
}

impl Field {
    /// Pushes the current value into `control` and keeps it in sync with every
    /// later change.
    pub fn bind<C: FieldControl>(&self, control: C) -> FormResult<Subscription> {
        control.write(self.value()?.as_ref());
        Ok(self.on(FieldEventKind::Change, move |event| {
            if let FieldEvent::Change { value, .. } = event {
                control.write(value.as_ref());
            }
        }))
    }

    /// Reads the displayed value from `control` into the field.
    pub async fn pull<C: FieldControl + ?Sized>(&self, control: &C) -> FormResult<bool> {
        self.set_async(control.read()).await
    }
}

impl<T: FormRecord> Form<T> {
    pub async fn submit_event<E: SubmitEvent + ?Sized>(
        &self,
        event: &mut E,
    ) -> FormResult<SubmitOutcome> {
        event.prevent_default();
        self.submit().await
    }

    /// First error message of `key`, hidden until the field was touched or a
    /// submit was attempted.
    pub fn error_for_display(&self, key: &str) -> FormResult<Option<String>> {
        let submitted =
            read_lock(&self.inner.state, "reading display error message")?.submit_count > 0;
        let Some(field) = self.get_field(key)? else {
            return Ok(None);
        };
        if !submitted && !field.is_touched()? {
            return Ok(None);
        }
        Ok(field
            .errors()?
            .first()
            .map(|error| error.message().to_owned()))
    }
}
