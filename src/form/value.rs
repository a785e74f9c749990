use std::borrow::{Borrow, Cow};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::controller::{FormError, FormResult};
use super::observable::ObservableList;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldKey(Cow<'static, str>);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_owned()))
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(value: &FieldKey) -> Self {
        value.clone()
    }
}

#[derive(Clone, Debug)]
pub enum FieldValue {
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<FieldValue>),
    Bytes(Vec<u8>),
    Record(BTreeMap<String, FieldValue>),
    Observable(ObservableList),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Bytes(_) => "bytes",
            Self::Record(_) => "record",
            Self::Observable(_) => "observable list",
        }
    }

    /// Length-or-magnitude measure used by `min`/`max`. Booleans have no
    /// measure and produce a usage error rather than a validation failure.
    pub fn measure(&self, rule: &'static str) -> FormResult<Decimal> {
        match self {
            Self::Text(text) => Ok(Decimal::from(text.chars().count())),
            Self::Number(number) => Ok(*number),
            Self::List(items) => Ok(Decimal::from(items.len())),
            Self::Observable(list) => Ok(Decimal::from(list.len())),
            Self::Bytes(bytes) => Ok(Decimal::from(bytes.len())),
            Self::Record(entries) => Ok(Decimal::from(entries.len())),
            Self::Bool(_) => Err(FormError::Unmeasurable {
                rule,
                kind: self.kind(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bool(value) => !value,
            Self::Number(number) => number.is_zero(),
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Record(entries) => entries.is_empty(),
            Self::Observable(list) => list.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_observable(&self) -> Option<&ObservableList> {
        match self {
            Self::Observable(list) => Some(list),
            _ => None,
        }
    }
}

pub fn is_empty_value(value: Option<&FieldValue>) -> bool {
    value.is_none_or(FieldValue::is_empty)
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Observable(a), Self::Observable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => write!(f, "{}", number.normalize()),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => write_joined(f, items),
            Self::Observable(list) => write_joined(f, &list.items()),
            Self::Bytes(_) | Self::Record(_) => {
                let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

fn write_joined(f: &mut Formatter<'_>, items: &[FieldValue]) -> std::fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(number) => match number.fract().is_zero().then(|| number.to_i64()) {
                Some(Some(integer)) => serializer.serialize_i64(integer),
                _ => serializer.serialize_f64(number.to_f64().unwrap_or_default()),
            },
            Self::Text(text) => serializer.serialize_str(text),
            Self::List(items) => items.serialize(serializer),
            Self::Bytes(bytes) => serializer.collect_seq(bytes),
            Self::Record(entries) => entries.serialize(serializer),
            Self::Observable(list) => list.items().serialize(serializer),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::Number(Decimal::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(value: BTreeMap<String, FieldValue>) -> Self {
        Self::Record(value)
    }
}

impl From<ObservableList> for FieldValue {
    fn from(value: ObservableList) -> Self {
        Self::Observable(value)
    }
}

/// Insertion-ordered `name -> value` snapshot of a form. `None` marks an
/// undefined value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormValues(IndexMap<FieldKey, Option<FieldValue>>);

impl FormValues {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with(mut self, key: impl Into<FieldKey>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, Some(value.into()));
        self
    }

    pub fn insert(&mut self, key: impl Into<FieldKey>, value: Option<FieldValue>) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key).and_then(Option::as_ref)
    }

    pub fn entry(&self, key: &str) -> Option<&Option<FieldValue>> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &Option<FieldValue>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(FieldKey, Option<FieldValue>)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (FieldKey, Option<FieldValue>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FormValues {
    type Item = (FieldKey, Option<FieldValue>);
    type IntoIter = indexmap::map::IntoIter<FieldKey, Option<FieldValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for FormValues {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_follows_value_shape() {
        assert_eq!(
            FieldValue::from("héllo").measure("min").expect("text"),
            Decimal::from(5)
        );
        assert_eq!(
            FieldValue::from(42).measure("min").expect("number"),
            Decimal::from(42)
        );
        assert_eq!(
            FieldValue::List(vec![1.into(), 2.into()])
                .measure("min")
                .expect("list"),
            Decimal::from(2)
        );
        assert_eq!(
            FieldValue::Bytes(vec![0; 16]).measure("max").expect("bytes"),
            Decimal::from(16)
        );
        let record = BTreeMap::from([("a".to_string(), FieldValue::from(1))]);
        assert_eq!(
            FieldValue::Record(record).measure("max").expect("record"),
            Decimal::from(1)
        );
    }

    #[test]
    fn bool_measure_is_a_usage_error() {
        assert_eq!(
            FieldValue::Bool(true).measure("min"),
            Err(FormError::Unmeasurable {
                rule: "min",
                kind: "bool"
            })
        );
    }

    #[test]
    fn emptiness_matches_required_semantics() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&"".into())));
        assert!(is_empty_value(Some(&FieldValue::List(Vec::new()))));
        assert!(is_empty_value(Some(&false.into())));
        assert!(is_empty_value(Some(&0.into())));
        assert!(!is_empty_value(Some(&Decimal::new(5, 1).into())));
        assert!(!is_empty_value(Some(&"x".into())));
    }

    #[test]
    fn observable_values_compare_by_identity() {
        let list = ObservableList::new();
        let same = FieldValue::Observable(list.clone());
        let other = FieldValue::Observable(ObservableList::new());
        assert_eq!(FieldValue::Observable(list), same);
        assert_ne!(same, other);
    }

    #[test]
    fn form_values_serialize_in_insertion_order() {
        let mut values = FormValues::new().with("name", "alice").with("age", 30);
        values.insert("nickname", None);
        assert_eq!(
            serde_json::to_string(&values).expect("serialize"),
            r#"{"name":"alice","age":30,"nickname":null}"#
        );
    }

    #[test]
    fn display_stringifies_for_patterns() {
        assert_eq!(FieldValue::from(Decimal::new(500, 2)).to_string(), "5");
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).to_string(),
            "a,b"
        );
        assert_eq!(FieldValue::Bool(false).to_string(), "false");
    }
}
