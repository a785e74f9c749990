use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::future::BoxFuture;
use indexmap::IndexMap;

use super::emitter::{Emitter, Subscription};
use super::field::{Field, FieldEvent, FieldEventKind, FieldOptions};
use super::record::{DefaultValues, FormRecord};
use super::validation::{Validation, ValidationError};
use super::value::{FieldKey, FormValues};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormStatus {
    Editing,
    Validating,
    Submitting,
    Failed,
    Resetting,
    Clearing,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid form status transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: FormStatus, to: FormStatus },
    #[error("`{rule}` cannot measure a {kind} value")]
    Unmeasurable {
        rule: &'static str,
        kind: &'static str,
    },
    #[error("index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("field `{field}` does not hold a {expected} value")]
    RecordField {
        field: String,
        expected: &'static str,
    },
}

pub type FormResult<T> = Result<T, FormError>;

/// Failure reported by a submit handler. Stored on the form, never returned
/// from `submit`.
#[derive(Clone, Debug)]
pub struct SubmitError {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl SubmitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for SubmitError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl From<&str> for SubmitError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubmitError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<FormError> for SubmitError {
    fn from(value: FormError) -> Self {
        Self::from_error(value)
    }
}

pub type SubmitFuture = BoxFuture<'static, Result<(), SubmitError>>;
pub type SubmitHandler = Arc<dyn Fn(FormValues) -> SubmitFuture + Send + Sync>;

pub(super) fn submit_handler<F, Fut, E>(handler: F) -> SubmitHandler
where
    F: Fn(FormValues) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<SubmitError>,
{
    Arc::new(move |values| {
        let fut = handler(values);
        Box::pin(async move { fut.await.map_err(Into::into) })
    })
}

#[derive(Clone)]
pub struct FormOptions {
    pub validation_mode: ValidationMode,
    pub submit_on_error: bool,
    pub fields: IndexMap<FieldKey, FieldOptions>,
    pub submit: Option<SubmitHandler>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::OnSubmit,
            submit_on_error: false,
            fields: IndexMap::new(),
            submit: None,
        }
    }
}

impl FormOptions {
    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    pub fn submit_on_error(mut self, value: bool) -> Self {
        self.submit_on_error = value;
        self
    }

    pub fn field(mut self, key: impl Into<FieldKey>, options: FieldOptions) -> Self {
        self.fields.insert(key.into(), options);
        self
    }

    pub fn validations(
        mut self,
        key: impl Into<FieldKey>,
        validations: impl IntoIterator<Item = Validation>,
    ) -> Self {
        self.fields
            .entry(key.into())
            .or_default()
            .validations
            .extend(validations);
        self
    }

    pub fn on_submit<F, Fut, E>(mut self, handler: F) -> Self
    where
        F: Fn(FormValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<SubmitError>,
    {
        self.submit = Some(submit_handler(handler));
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FormEventKind {
    Change,
    Validate,
    Submit,
    Status,
    Field,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationSummary {
    Valid,
    Invalid(BTreeMap<FieldKey, Vec<ValidationError>>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitStatus {
    Submitting,
    Success,
    Error(SubmitError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    Invalid,
    Failed,
    AlreadySubmitting,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldEnvelope {
    pub field: FieldKey,
    pub event: FieldEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormEvent {
    Change,
    Validate(ValidationSummary),
    Submit(SubmitStatus),
    Status(FormStatus),
    Field(FieldEnvelope),
}

impl FormEvent {
    pub fn kind(&self) -> FormEventKind {
        match self {
            Self::Change => FormEventKind::Change,
            Self::Validate(_) => FormEventKind::Validate,
            Self::Submit(_) => FormEventKind::Submit,
            Self::Status(_) => FormEventKind::Status,
            Self::Field(_) => FormEventKind::Field,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub status: FormStatus,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub validation_errors: BTreeMap<FieldKey, Vec<ValidationError>>,
    pub submit_error: Option<SubmitError>,
}

pub(super) struct FormState<T> {
    pub(super) defaults_source: DefaultValues<T>,
    pub(super) defaults: FormValues,
    pub(super) fields: IndexMap<FieldKey, Field>,
    pub(super) status: FormStatus,
    pub(super) submit_error: Option<SubmitError>,
    pub(super) submit_count: u32,
    pub(super) submit_in_flight: bool,
}

pub(super) struct FormInner<T> {
    pub(super) id: FormId,
    pub(super) options: FormOptions,
    pub(super) state: RwLock<FormState<T>>,
    pub(super) events: Emitter<FormEventKind, FormEvent>,
}

/// Aggregate of lazily created fields with derived dirty/valid state and the
/// validate/submit/reset/clear lifecycle. Clones share the same form.
pub struct Form<T: FormRecord = FormValues> {
    pub(super) inner: Arc<FormInner<T>>,
}

impl<T: FormRecord> Clone for Form<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: FormRecord> Form<T> {
    /// Builds the form. Fields with configured options are created right away;
    /// every other field is created on first access.
    pub fn new(defaults: impl Into<DefaultValues<T>>, options: FormOptions) -> Self {
        let defaults_source = defaults.into();
        let defaults = defaults_source.resolve();
        let id = FormId::next();
        let inner = Arc::new_cyclic(|weak: &Weak<FormInner<T>>| {
            let fields = options
                .fields
                .keys()
                .map(|key| {
                    let field = create_field(weak, key.clone(), &options, &defaults);
                    (key.clone(), field)
                })
                .collect::<IndexMap<_, _>>();
            FormInner {
                id,
                state: RwLock::new(FormState {
                    defaults_source,
                    defaults,
                    fields,
                    status: FormStatus::Editing,
                    submit_error: None,
                    submit_count: 0,
                    submit_in_flight: false,
                }),
                options,
                events: Emitter::new(),
            }
        });
        log::debug!("{id} created");
        Self { inner }
    }

    pub fn id(&self) -> FormId {
        self.inner.id
    }

    pub fn options(&self) -> &FormOptions {
        &self.inner.options
    }

    /// Returns the field registered under `key`, creating it from the
    /// configured defaults and options on first access.
    pub fn field(&self, key: impl Into<FieldKey>) -> FormResult<Field> {
        let key = key.into();
        if let Some(field) = read_lock(&self.inner.state, "looking up field")?
            .fields
            .get(&key)
        {
            return Ok(field.clone());
        }

        let mut state = write_lock(&self.inner.state, "registering field")?;
        if let Some(field) = state.fields.get(&key) {
            return Ok(field.clone());
        }
        let field = create_field(
            &Arc::downgrade(&self.inner),
            key.clone(),
            &self.inner.options,
            &state.defaults,
        );
        state.fields.insert(key, field.clone());
        Ok(field)
    }

    /// Looks a field up without creating it.
    pub fn get_field(&self, key: &str) -> FormResult<Option<Field>> {
        Ok(read_lock(&self.inner.state, "looking up existing field")?
            .fields
            .get(key)
            .cloned())
    }

    pub fn fields(&self) -> FormResult<Vec<Field>> {
        Ok(read_lock(&self.inner.state, "listing fields")?
            .fields
            .values()
            .cloned()
            .collect())
    }

    /// Snapshot of the created fields only.
    pub fn values(&self) -> FormResult<FormValues> {
        self.fields()?
            .into_iter()
            .map(|field| Ok((field.key().clone(), field.value()?)))
            .collect()
    }

    pub fn to_json(&self) -> FormResult<serde_json::Value> {
        Ok(self.values()?.to_json())
    }

    /// Typed snapshot: the resolved defaults overlaid with the values of the
    /// created fields.
    pub fn record(&self) -> FormResult<T> {
        let mut values = read_lock(&self.inner.state, "reading defaults for record")?
            .defaults
            .clone();
        for (key, value) in self.values()? {
            values.insert(key, value);
        }
        T::from_values(&values)
    }

    pub fn status(&self) -> FormResult<FormStatus> {
        Ok(read_lock(&self.inner.state, "reading form status")?.status)
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        for field in self.fields()? {
            if field.is_dirty()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        for field in self.fields()? {
            if !field.is_valid()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn submit_error(&self) -> FormResult<Option<SubmitError>> {
        Ok(read_lock(&self.inner.state, "reading submit error")?
            .submit_error
            .clone())
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.inner.state, "reading submit count")?.submit_count)
    }

    /// Errors of every invalid field, read from the fields themselves so the
    /// map can never disagree with `Field::errors`.
    pub fn validation_errors(&self) -> FormResult<BTreeMap<FieldKey, Vec<ValidationError>>> {
        let mut errors = BTreeMap::new();
        for field in self.fields()? {
            let field_errors = field.errors()?;
            if !field_errors.is_empty() {
                errors.insert(field.key().clone(), field_errors);
            }
        }
        Ok(errors)
    }

    pub fn first_error_field(&self) -> FormResult<Option<FieldKey>> {
        for field in self.fields()? {
            if !field.is_valid()? {
                return Ok(Some(field.key().clone()));
            }
        }
        Ok(None)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let (status, submit_count, submit_error) = {
            let state = read_lock(&self.inner.state, "creating form snapshot")?;
            (state.status, state.submit_count, state.submit_error.clone())
        };
        Ok(FormSnapshot {
            values: self.values()?,
            status,
            submit_count,
            is_dirty: self.is_dirty()?,
            is_valid: self.is_valid()?,
            validation_errors: self.validation_errors()?,
            submit_error,
        })
    }

    pub fn on(
        &self,
        kind: FormEventKind,
        handler: impl Fn(&FormEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.on(kind, handler)
    }

    /// Subscribes to the events of a single field, relayed through the form.
    pub fn on_field(
        &self,
        key: impl Into<FieldKey>,
        handler: impl Fn(&FieldEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let key = key.into();
        self.inner.events.on(FormEventKind::Field, move |event| {
            if let FormEvent::Field(envelope) = event {
                if envelope.field == key {
                    handler(&envelope.event);
                }
            }
        })
    }

    /// Validates every created field in registration order. All fields run
    /// even after a failure.
    pub async fn validate(&self) -> FormResult<bool> {
        let previous = self.transition(FormStatus::Validating)?;
        let result = self.validate_fields().await;
        let resting = if previous == FormStatus::Failed {
            FormStatus::Failed
        } else {
            FormStatus::Editing
        };
        self.transition(resting)?;
        result
    }

    async fn validate_fields(&self) -> FormResult<bool> {
        let fields = self.fields()?;
        for field in &fields {
            field.clear_errors()?;
        }

        let mut valid = true;
        for field in fields {
            if !field.validate(true).await? {
                valid = false;
            }
        }

        let summary = if valid {
            ValidationSummary::Valid
        } else {
            ValidationSummary::Invalid(self.validation_errors()?)
        };
        log::debug!("{} validated: valid={valid}", self.inner.id);
        self.emit(FormEvent::Validate(summary));
        Ok(valid)
    }

    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        let handler = self.inner.options.submit.clone();
        self.run_submit(handler).await
    }

    pub async fn submit_with<F, Fut, E>(&self, handler: F) -> FormResult<SubmitOutcome>
    where
        F: Fn(FormValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<SubmitError>,
    {
        self.run_submit(Some(submit_handler(handler))).await
    }

    async fn run_submit(&self, handler: Option<SubmitHandler>) -> FormResult<SubmitOutcome> {
        let previous = {
            let mut state = write_lock(&self.inner.state, "preparing submit")?;
            if state.submit_in_flight {
                log::warn!("{}: submit ignored, one is already in flight", self.inner.id);
                return Ok(SubmitOutcome::AlreadySubmitting);
            }
            state.submit_in_flight = true;
            state.submit_error = None;
            state.submit_count = state.submit_count.saturating_add(1);
            state.status
        };
        let _in_flight = InFlight { form: self };

        if previous == FormStatus::Failed {
            self.transition(FormStatus::Editing)?;
        }

        let valid = if self.inner.options.validation_mode == ValidationMode::OnSubmit {
            self.validate().await?
        } else {
            self.is_valid()?
        };
        if !valid && !self.inner.options.submit_on_error {
            log::debug!("{}: submit aborted by validation", self.inner.id);
            return Ok(SubmitOutcome::Invalid);
        }

        let values = self.values()?;
        self.transition(FormStatus::Submitting)?;
        self.emit(FormEvent::Submit(SubmitStatus::Submitting));
        let result = match handler {
            Some(handler) => handler(values).await,
            None => Ok(()),
        };

        if self.status()? != FormStatus::Submitting {
            log::debug!(
                "{}: submit settled after the form left the submitting state",
                self.inner.id
            );
            return Ok(match result {
                Ok(()) => SubmitOutcome::Submitted,
                Err(_) => SubmitOutcome::Failed,
            });
        }

        match result {
            Ok(()) => {
                for field in self.fields()? {
                    field.commit()?;
                }
                self.transition(FormStatus::Editing)?;
                log::debug!("{}: submitted", self.inner.id);
                self.emit(FormEvent::Submit(SubmitStatus::Success));
                Ok(SubmitOutcome::Submitted)
            }
            Err(error) => {
                log::warn!("{}: submit failed: {error}", self.inner.id);
                write_lock(&self.inner.state, "recording submit error")?.submit_error =
                    Some(error.clone());
                self.transition(FormStatus::Failed)?;
                self.emit(FormEvent::Submit(SubmitStatus::Error(error)));
                Ok(SubmitOutcome::Failed)
            }
        }
    }

    /// Restores every created field to the current defaults. A computed
    /// default source is re-evaluated.
    pub fn reset(&self) -> FormResult<()> {
        self.reset_inner(None)
    }

    /// Replaces the default source with `defaults`, then resets.
    pub fn reset_with(&self, defaults: T) -> FormResult<()> {
        self.reset_inner(Some(defaults))
    }

    fn reset_inner(&self, defaults: Option<T>) -> FormResult<()> {
        self.transition(FormStatus::Resetting)?;
        let result = self.reset_fields(defaults);
        self.transition(FormStatus::Editing)?;
        result?;
        self.emit(FormEvent::Change);
        Ok(())
    }

    fn reset_fields(&self, defaults: Option<T>) -> FormResult<()> {
        let source = match defaults {
            Some(defaults) => DefaultValues::Static(defaults),
            None => read_lock(&self.inner.state, "reading default source")?
                .defaults_source
                .clone(),
        };
        let resolved = source.resolve();

        let fields = {
            let mut state = write_lock(&self.inner.state, "resetting form")?;
            state.defaults_source = source;
            state.defaults = resolved.clone();
            state.submit_error = None;
            state.submit_count = 0;
            state.fields.values().cloned().collect::<Vec<_>>()
        };

        for field in fields {
            if let Some(default) = resolved.entry(field.key().as_str()) {
                field.set_default_value(default.clone())?;
            }
            field.reset()?;
        }
        Ok(())
    }

    /// Sets every created field to undefined without revalidating.
    pub fn clear(&self) -> FormResult<()> {
        self.transition(FormStatus::Clearing)?;
        let result = self.clear_fields();
        self.transition(FormStatus::Editing)?;
        result?;
        self.emit(FormEvent::Change);
        Ok(())
    }

    fn clear_fields(&self) -> FormResult<()> {
        for field in self.fields()? {
            field.set_value(None)?;
            field.clear_errors()?;
        }
        write_lock(&self.inner.state, "clearing form")?.submit_error = None;
        Ok(())
    }

    pub(super) fn transition(&self, next: FormStatus) -> FormResult<FormStatus> {
        let current = {
            let mut state = write_lock(&self.inner.state, "changing form status")?;
            transition_status(&mut state, next)?
        };
        if current != next {
            log::debug!("{}: {current:?} -> {next:?}", self.inner.id);
            self.emit(FormEvent::Status(next));
        }
        Ok(current)
    }

    pub(super) fn emit(&self, event: FormEvent) {
        self.inner.events.emit(&event.kind(), &event);
    }

    fn relay(&self, key: &FieldKey, event: &FieldEvent) {
        let status = match read_lock(&self.inner.state, "relaying field event") {
            Ok(state) => state.status,
            Err(error) => {
                log::warn!("{}: {error}", self.inner.id);
                return;
            }
        };

        self.emit(FormEvent::Field(FieldEnvelope {
            field: key.clone(),
            event: event.clone(),
        }));
        let bulk = matches!(status, FormStatus::Resetting | FormStatus::Clearing);
        if matches!(event, FieldEvent::Change { .. }) && !bulk {
            self.emit(FormEvent::Change);
        }
    }
}

struct InFlight<'a, T: FormRecord> {
    form: &'a Form<T>,
}

impl<T: FormRecord> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        match self.form.inner.state.write() {
            Ok(mut state) => state.submit_in_flight = false,
            Err(poisoned) => poisoned.into_inner().submit_in_flight = false,
        }
    }
}

fn create_field<T: FormRecord>(
    form: &Weak<FormInner<T>>,
    key: FieldKey,
    options: &FormOptions,
    defaults: &FormValues,
) -> Field {
    let mut field_options = options.fields.get(&key).cloned().unwrap_or_default();
    if field_options.validation_mode.is_none() {
        field_options.validation_mode = Some(options.validation_mode);
    }
    let default_value = defaults.get(key.as_str()).cloned();
    let field = Field::new(key.clone(), default_value, field_options);

    for kind in [
        FieldEventKind::Change,
        FieldEventKind::Validate,
        FieldEventKind::Reset,
        FieldEventKind::Touch,
    ] {
        let form = form.clone();
        let key = key.clone();
        field.on(kind, move |event| {
            if let Some(inner) = form.upgrade() {
                Form { inner }.relay(&key, event);
            }
        });
    }
    field
}

pub(super) fn transition_status<T>(
    state: &mut FormState<T>,
    next: FormStatus,
) -> FormResult<FormStatus> {
    let current = state.status;
    if current == next {
        return Ok(current);
    }

    let allowed = matches!(
        (current, next),
        (FormStatus::Editing | FormStatus::Failed, FormStatus::Validating)
            | (FormStatus::Validating, FormStatus::Editing | FormStatus::Failed)
            | (FormStatus::Editing, FormStatus::Submitting)
            | (FormStatus::Submitting, FormStatus::Editing | FormStatus::Failed)
            | (FormStatus::Failed, FormStatus::Editing)
            | (_, FormStatus::Resetting)
            | (_, FormStatus::Clearing)
            | (FormStatus::Resetting | FormStatus::Clearing, FormStatus::Editing)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.status = next;
    Ok(current)
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
