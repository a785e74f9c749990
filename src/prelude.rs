pub use crate::form::{
    DefaultValues, Field, FieldControl, FieldEvent, FieldEventKind, FieldKey, FieldOptions,
    FieldValue, Form, FormError, FormEvent, FormEventKind, FormOptions, FormRecord, FormResult,
    FormStatus, FormValues, ObservableList, SubmitError, SubmitEvent, SubmitOutcome, Validation,
    ValidationError, ValidationMode,
};
