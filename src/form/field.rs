use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, Weak};

use super::controller::{FormResult, ValidationMode, read_lock, write_lock};
use super::emitter::{Emitter, Subscription};
use super::validation::{REQUIRED_MESSAGE, REQUIRED_RULE, Validation, ValidationError};
use super::value::{FieldKey, FieldValue, is_empty_value};

pub type Equality = Arc<dyn Fn(Option<&FieldValue>, Option<&FieldValue>) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct FieldOptions {
    pub required: bool,
    pub validations: Vec<Validation>,
    pub validation_mode: Option<ValidationMode>,
    pub equality: Option<Equality>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    pub fn validations(mut self, validations: impl IntoIterator<Item = Validation>) -> Self {
        self.validations.extend(validations);
        self
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = Some(mode);
        self
    }

    pub fn equality(
        mut self,
        equality: impl Fn(Option<&FieldValue>, Option<&FieldValue>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality = Some(Arc::new(equality));
        self
    }
}

impl Debug for FieldOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOptions")
            .field("required", &self.required)
            .field("validations", &self.validations)
            .field("validation_mode", &self.validation_mode)
            .field("custom_equality", &self.equality.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FieldEventKind {
    Change,
    Validate,
    Reset,
    Touch,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationStatus {
    Valid,
    Invalid(Vec<ValidationError>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldEvent {
    Change {
        prev: Option<FieldValue>,
        value: Option<FieldValue>,
    },
    Validate(ValidationStatus),
    Reset,
    Touch,
}

impl FieldEvent {
    pub fn kind(&self) -> FieldEventKind {
        match self {
            Self::Change { .. } => FieldEventKind::Change,
            Self::Validate(_) => FieldEventKind::Validate,
            Self::Reset => FieldEventKind::Reset,
            Self::Touch => FieldEventKind::Touch,
        }
    }
}

struct FieldState {
    value: Option<FieldValue>,
    default_value: Option<FieldValue>,
    errors: Vec<ValidationError>,
    touched: bool,
    revision: u64,
    container: Option<Subscription>,
}

struct FieldInner {
    key: FieldKey,
    required: bool,
    validations: Vec<Validation>,
    mode: ValidationMode,
    equality: Option<Equality>,
    state: RwLock<FieldState>,
    events: Emitter<FieldEventKind, FieldEvent>,
}

/// A named value slot. Clones share the same state; use [`Field::ptr_eq`] to
/// check identity.
#[derive(Clone)]
pub struct Field {
    inner: Arc<FieldInner>,
}

impl Field {
    pub fn new(
        key: impl Into<FieldKey>,
        default_value: Option<FieldValue>,
        options: FieldOptions,
    ) -> Self {
        let field = Self {
            inner: Arc::new(FieldInner {
                key: key.into(),
                required: options.required,
                validations: options.validations,
                mode: options.validation_mode.unwrap_or(ValidationMode::OnSubmit),
                equality: options.equality,
                state: RwLock::new(FieldState {
                    value: default_value.clone(),
                    default_value: default_value.clone(),
                    errors: Vec::new(),
                    touched: false,
                    revision: 0,
                    container: None,
                }),
                events: Emitter::new(),
            }),
        };
        field.watch_container(None, default_value.as_ref());
        field
    }

    pub fn key(&self) -> &FieldKey {
        &self.inner.key
    }

    pub fn is_required(&self) -> bool {
        self.inner.required
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.inner.mode
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn value(&self) -> FormResult<Option<FieldValue>> {
        Ok(read_lock(&self.inner.state, "reading field value")?.value.clone())
    }

    pub fn default_value(&self) -> FormResult<Option<FieldValue>> {
        Ok(read_lock(&self.inner.state, "reading field default")?
            .default_value
            .clone())
    }

    pub fn errors(&self) -> FormResult<Vec<ValidationError>> {
        Ok(read_lock(&self.inner.state, "reading field errors")?.errors.clone())
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        let state = read_lock(&self.inner.state, "reading field dirty state")?;
        Ok(!self.values_equal(state.default_value.as_ref(), state.value.as_ref()))
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner.state, "reading field validity")?
            .errors
            .is_empty())
    }

    pub fn is_touched(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner.state, "reading field touched state")?.touched)
    }

    pub fn on(
        &self,
        kind: FieldEventKind,
        handler: impl Fn(&FieldEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.on(kind, handler)
    }

    /// Stores `value` and reports whether it differed from the current one.
    /// Any change clears the field's errors before `Change` is emitted.
    pub fn set_value(&self, value: Option<FieldValue>) -> FormResult<bool> {
        let (prev, container) = {
            let mut state = write_lock(&self.inner.state, "writing field value")?;
            if self.values_equal(state.value.as_ref(), value.as_ref()) {
                return Ok(false);
            }
            state.errors.clear();
            state.revision += 1;
            let prev = std::mem::replace(&mut state.value, value.clone());
            (prev, state.container.take())
        };

        self.watch_container(container, value.as_ref());
        log::trace!("field `{}` changed", self.inner.key);
        self.emit(FieldEvent::Change { prev, value });
        Ok(true)
    }

    /// Input path: stores the value, then validates when the field validates
    /// on change.
    pub async fn set_async(&self, value: Option<FieldValue>) -> FormResult<bool> {
        let changed = self.set_value(value)?;
        if changed && self.inner.mode == ValidationMode::OnChange {
            self.validate(true).await?;
        }
        Ok(changed)
    }

    /// Blur path: marks the field touched, then validates when the field
    /// validates on blur.
    pub async fn touch(&self) -> FormResult<()> {
        write_lock(&self.inner.state, "touching field")?.touched = true;
        self.emit(FieldEvent::Touch);
        if self.inner.mode == ValidationMode::OnBlur {
            self.validate(true).await?;
        }
        Ok(())
    }

    pub fn set_default_value(&self, default_value: Option<FieldValue>) -> FormResult<()> {
        write_lock(&self.inner.state, "writing field default")?.default_value = default_value;
        Ok(())
    }

    /// Drops the current errors without touching the value. No event is
    /// emitted.
    pub fn clear_errors(&self) -> FormResult<()> {
        write_lock(&self.inner.state, "clearing field errors")?.errors.clear();
        Ok(())
    }

    /// Makes the current value the new default.
    pub fn commit(&self) -> FormResult<()> {
        let mut state = write_lock(&self.inner.state, "committing field value")?;
        state.default_value = state.value.clone();
        Ok(())
    }

    pub fn reset(&self) -> FormResult<()> {
        let change = {
            let mut state = write_lock(&self.inner.state, "resetting field")?;
            state.errors.clear();
            state.touched = false;
            let next = state.default_value.clone();
            if self.values_equal(state.value.as_ref(), next.as_ref()) {
                None
            } else {
                state.revision += 1;
                let prev = std::mem::replace(&mut state.value, next.clone());
                Some((prev, next, state.container.take()))
            }
        };

        self.emit(FieldEvent::Reset);
        if let Some((prev, value, container)) = change {
            self.watch_container(container, value.as_ref());
            self.emit(FieldEvent::Change { prev, value });
        }
        Ok(())
    }

    /// Runs the required check and then every validation in order, collecting
    /// all failure messages. An empty required field short-circuits with a
    /// single "Required" error. Results computed for a value that changed in
    /// the meantime are dropped.
    pub async fn validate(&self, trigger: bool) -> FormResult<bool> {
        let (value, revision) = {
            let mut state = write_lock(&self.inner.state, "starting field validation")?;
            state.errors.clear();
            (state.value.clone(), state.revision)
        };

        let mut errors = Vec::new();
        if self.inner.required && is_empty_value(value.as_ref()) {
            errors.push(ValidationError::new(REQUIRED_RULE, REQUIRED_MESSAGE));
        } else {
            for validation in &self.inner.validations {
                if !validation.validate(value.as_ref()).await? {
                    errors.push(validation.error_for(&self.inner.key));
                }
            }
        }

        let valid = errors.is_empty();
        {
            let mut state = write_lock(&self.inner.state, "storing field validation")?;
            if state.revision != revision {
                log::trace!(
                    "field `{}` changed during validation; result dropped",
                    self.inner.key
                );
                return Ok(state.errors.is_empty());
            }
            state.errors = errors.clone();
        }

        log::trace!("field `{}` validated: valid={valid}", self.inner.key);
        if trigger {
            let status = if valid {
                ValidationStatus::Valid
            } else {
                ValidationStatus::Invalid(errors)
            };
            self.emit(FieldEvent::Validate(status));
        }
        Ok(valid)
    }

    fn values_equal(&self, left: Option<&FieldValue>, right: Option<&FieldValue>) -> bool {
        match &self.inner.equality {
            Some(equality) => equality(left, right),
            None => left == right,
        }
    }

    fn emit(&self, event: FieldEvent) {
        self.inner.events.emit(&event.kind(), &event);
    }

    fn watch_container(&self, previous: Option<Subscription>, value: Option<&FieldValue>) {
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        let Some(list) = value.and_then(FieldValue::as_observable) else {
            return;
        };

        let field: Weak<FieldInner> = Arc::downgrade(&self.inner);
        let subscription = list.on_change(move |_| {
            if let Some(inner) = field.upgrade() {
                Field { inner }.container_mutated();
            }
        });
        match write_lock(&self.inner.state, "watching field container") {
            Ok(mut state) => state.container = Some(subscription),
            Err(error) => {
                log::warn!("field `{}`: {error}", self.inner.key);
                subscription.unsubscribe();
            }
        }
    }

    fn container_mutated(&self) {
        let value = match write_lock(&self.inner.state, "observing field container") {
            Ok(mut state) => {
                state.errors.clear();
                state.revision += 1;
                state.value.clone()
            }
            Err(error) => {
                log::warn!("field `{}`: {error}", self.inner.key);
                return;
            }
        };
        self.emit(FieldEvent::Change {
            prev: value.clone(),
            value,
        });
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("key", &self.inner.key)
            .field("required", &self.inner.required)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}
