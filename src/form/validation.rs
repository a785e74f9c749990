use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use super::controller::FormResult;
use super::value::{FieldKey, FieldValue, is_empty_value};

pub(super) const REQUIRED_RULE: &str = "required";
pub(super) const REQUIRED_MESSAGE: &str = "Required";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValidationError {
    rule: Cow<'static, str>,
    message: String,
}

impl ValidationError {
    pub fn new(rule: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ValidationFuture = BoxFuture<'static, FormResult<bool>>;

/// Synchronous rule. `Ok(false)` is a validation failure; `Err` is a usage
/// error and propagates to the caller.
pub trait FieldRule: Send + Sync {
    fn check(&self, value: Option<&FieldValue>) -> FormResult<bool>;
}

impl<F> FieldRule for F
where
    F: Fn(Option<&FieldValue>) -> FormResult<bool> + Send + Sync,
{
    fn check(&self, value: Option<&FieldValue>) -> FormResult<bool> {
        (self)(value)
    }
}

pub trait AsyncFieldRule: Send + Sync {
    fn check(&self, value: Option<FieldValue>) -> ValidationFuture;
}

impl<F, Fut> AsyncFieldRule for F
where
    F: Fn(Option<FieldValue>) -> Fut + Send + Sync,
    Fut: Future<Output = FormResult<bool>> + Send + 'static,
{
    fn check(&self, value: Option<FieldValue>) -> ValidationFuture {
        Box::pin((self)(value))
    }
}

#[derive(Clone)]
pub enum Message {
    Static(Cow<'static, str>),
    Dynamic(Arc<dyn Fn(&FieldKey) -> String + Send + Sync>),
}

impl Message {
    pub fn resolve(&self, field: &FieldKey) -> String {
        match self {
            Self::Static(message) => message.to_string(),
            Self::Dynamic(render) => render(field),
        }
    }
}

impl From<&'static str> for Message {
    fn from(value: &'static str) -> Self {
        Self::Static(Cow::Borrowed(value))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Static(Cow::Owned(value))
    }
}

#[derive(Clone)]
enum Check {
    Sync(Arc<dyn FieldRule>),
    Async(Arc<dyn AsyncFieldRule>),
}

/// Named pass/fail rule over a field value. Cheap to clone and shareable
/// between fields.
#[derive(Clone)]
pub struct Validation {
    name: Cow<'static, str>,
    message: Message,
    check: Check,
}

impl Validation {
    pub fn custom<R>(
        name: impl Into<Cow<'static, str>>,
        message: impl Into<Message>,
        rule: R,
    ) -> Self
    where
        R: FieldRule + 'static,
    {
        Self {
            name: name.into(),
            message: message.into(),
            check: Check::Sync(Arc::new(rule)),
        }
    }

    pub fn custom_async<R>(
        name: impl Into<Cow<'static, str>>,
        message: impl Into<Message>,
        rule: R,
    ) -> Self
    where
        R: AsyncFieldRule + 'static,
    {
        Self {
            name: name.into(),
            message: message.into(),
            check: Check::Async(Arc::new(rule)),
        }
    }

    pub fn with_message(mut self, message: impl Into<Message>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_message_fn(
        mut self,
        render: impl Fn(&FieldKey) -> String + Send + Sync + 'static,
    ) -> Self {
        self.message = Message::Dynamic(Arc::new(render));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_for(&self, field: &FieldKey) -> String {
        self.message.resolve(field)
    }

    /// Runs the rule. Synchronous rules resolve immediately, so callers can
    /// await every validation the same way.
    pub fn validate(&self, value: Option<&FieldValue>) -> ValidationFuture {
        match &self.check {
            Check::Sync(rule) => Box::pin(future::ready(rule.check(value))),
            Check::Async(rule) => rule.check(value.cloned()),
        }
    }

    pub(super) fn error_for(&self, field: &FieldKey) -> ValidationError {
        ValidationError::new(self.name.clone(), self.message_for(field))
    }

    pub fn required() -> Self {
        Self::custom(
            REQUIRED_RULE,
            "This field is required",
            |value: Option<&FieldValue>| -> FormResult<bool> { Ok(!is_empty_value(value)) },
        )
    }

    pub fn min(limit: impl Into<Decimal>) -> Self {
        let limit = limit.into();
        Self::custom(
            "min",
            format!("Must be at least {limit}"),
            move |value: Option<&FieldValue>| -> FormResult<bool> {
                match value {
                    Some(value) => Ok(value.measure("min")? >= limit),
                    None => Ok(true),
                }
            },
        )
    }

    pub fn max(limit: impl Into<Decimal>) -> Self {
        let limit = limit.into();
        Self::custom(
            "max",
            format!("Must be at most {limit}"),
            move |value: Option<&FieldValue>| -> FormResult<bool> {
                match value {
                    Some(value) => Ok(value.measure("max")? <= limit),
                    None => Ok(true),
                }
            },
        )
    }

    pub fn pattern(pattern: Regex) -> Self {
        Self::custom(
            "pattern",
            "Invalid format",
            move |value: Option<&FieldValue>| -> FormResult<bool> {
                Ok(value.is_none_or(|value| pattern.is_match(&value.to_string())))
            },
        )
    }

    pub fn pattern_str(pattern: &str) -> FormResult<Self> {
        Ok(Self::pattern(Regex::new(pattern)?))
    }

    pub fn email() -> Self {
        Self::custom(
            "email",
            "Invalid email address",
            |value: Option<&FieldValue>| -> FormResult<bool> {
                match value.and_then(FieldValue::as_text) {
                    Some(text) if !text.is_empty() => {
                        Ok(email_address::EmailAddress::is_valid(text))
                    }
                    _ => Ok(true),
                }
            },
        )
    }
}

impl std::fmt::Debug for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormError;
    use futures::executor::block_on;

    fn passes(validation: &Validation, value: Option<FieldValue>) -> bool {
        block_on(validation.validate(value.as_ref())).expect("rule must not error")
    }

    #[test]
    fn required_rejects_empty_values() {
        let required = Validation::required();
        assert!(!passes(&required, None));
        assert!(!passes(&required, Some("".into())));
        assert!(!passes(&required, Some(FieldValue::List(Vec::new()))));
        assert!(!passes(&required, Some(FieldValue::Bytes(Vec::new()))));
        assert!(!passes(&required, Some(0.into())));
        assert!(passes(&required, Some(7.into())));
        assert!(passes(&required, Some("alice".into())));
        assert!(passes(&required, Some(FieldValue::List(vec![1.into()]))));
    }

    #[test]
    fn min_and_max_use_the_value_measure() {
        let min = Validation::min(3);
        assert!(!passes(&min, Some("ab".into())));
        assert!(passes(&min, Some("abc".into())));
        assert!(!passes(&min, Some(FieldValue::List(vec![1.into(), 2.into()]))));
        assert!(passes(&min, Some(5.into())));

        let max = Validation::max(2);
        assert!(passes(&max, Some("ab".into())));
        assert!(!passes(&max, Some(FieldValue::Bytes(vec![0; 3]))));
    }

    #[test]
    fn unmeasurable_value_is_a_usage_error_not_a_failure() {
        let min = Validation::min(1);
        assert_eq!(
            block_on(min.validate(Some(&FieldValue::Bool(true)))),
            Err(FormError::Unmeasurable {
                rule: "min",
                kind: "bool"
            })
        );
    }

    #[test]
    fn pattern_matches_the_stringified_value() {
        let digits = Validation::pattern_str(r"^\d+$").expect("valid pattern");
        assert!(passes(&digits, Some(1234.into())));
        assert!(passes(&digits, Some("42".into())));
        assert!(!passes(&digits, Some("4x2".into())));
        assert!(matches!(
            Validation::pattern_str("("),
            Err(FormError::InvalidPattern(_))
        ));
    }

    #[test]
    fn message_can_depend_on_field_name() {
        let key = FieldKey::new("username");
        let required = Validation::required().with_message_fn(|field| format!("{field} is missing"));
        assert_eq!(required.message_for(&key), "username is missing");
        assert_eq!(
            Validation::min(3).with_message("too short").message_for(&key),
            "too short"
        );
    }

    #[test]
    fn async_rules_resolve_through_the_same_future() {
        let unique = Validation::custom_async(
            "unique",
            "Already taken",
            |value: Option<FieldValue>| async move {
                Ok::<_, FormError>(value.as_ref().and_then(FieldValue::as_text) != Some("admin"))
            },
        );
        assert!(passes(&unique, Some("alice".into())));
        assert!(!passes(&unique, Some("admin".into())));
    }

    #[test]
    fn email_accepts_empty_and_valid_addresses() {
        let email = Validation::email();
        assert!(passes(&email, Some("".into())));
        assert!(passes(&email, Some("user@example.com".into())));
        assert!(!passes(&email, Some("not-an-email".into())));
    }
}
