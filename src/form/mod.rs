mod binding;
mod controller;
mod emitter;
mod field;
mod observable;
mod record;
mod validation;
mod value;


pub use binding::{FieldControl, SubmitEvent};
pub use calmform_derive::FormRecord;
pub use controller::{
    FieldEnvelope, Form, FormError, FormEvent, FormEventKind, FormId, FormOptions, FormResult,
    FormSnapshot, FormStatus, SubmitError, SubmitFuture, SubmitHandler, SubmitOutcome,
    SubmitStatus, ValidationMode, ValidationSummary,
};
pub use emitter::{Emitter, Handler, ListenerId, Subscription};
pub use field::{
    Equality, Field, FieldEvent, FieldEventKind, FieldOptions, ValidationStatus,
};
pub use observable::{ListChange, ObservableList};
pub use record::{DefaultValues, FormRecord, FromFieldValue, IntoFieldValue};
pub use validation::{
    AsyncFieldRule, FieldRule, Message, Validation, ValidationError, ValidationFuture,
};
pub use value::{FieldKey, FieldValue, FormValues, is_empty_value};
