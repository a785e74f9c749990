use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::controller::FormResult;
use super::observable::ObservableList;
use super::value::{FieldValue, FormValues};

pub trait FormRecord: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
    fn into_values(self) -> FormValues;
    fn from_values(values: &FormValues) -> FormResult<Self>;
}

impl FormRecord for FormValues {
    type Fields = ();

    fn fields() -> Self::Fields {}

    fn into_values(self) -> FormValues {
        self
    }

    fn from_values(values: &FormValues) -> FormResult<Self> {
        Ok(values.clone())
    }
}

pub trait IntoFieldValue {
    fn into_field_value(self) -> Option<FieldValue>;
}

pub trait FromFieldValue: Sized {
    const EXPECTED: &'static str;

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self>;
}

impl IntoFieldValue for FieldValue {
    fn into_field_value(self) -> Option<FieldValue> {
        Some(self)
    }
}

impl FromFieldValue for FieldValue {
    const EXPECTED: &'static str = "defined";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        value.cloned()
    }
}

impl IntoFieldValue for String {
    fn into_field_value(self) -> Option<FieldValue> {
        Some(FieldValue::Text(self))
    }
}

impl FromFieldValue for String {
    const EXPECTED: &'static str = "text";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        value.and_then(FieldValue::as_text).map(str::to_owned)
    }
}

impl IntoFieldValue for bool {
    fn into_field_value(self) -> Option<FieldValue> {
        Some(FieldValue::Bool(self))
    }
}

impl FromFieldValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        value.and_then(FieldValue::as_bool)
    }
}

impl IntoFieldValue for Decimal {
    fn into_field_value(self) -> Option<FieldValue> {
        Some(FieldValue::Number(self))
    }
}

impl FromFieldValue for Decimal {
    const EXPECTED: &'static str = "number";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        value.and_then(FieldValue::as_number)
    }
}

macro_rules! impl_integer_field_value {
    ($($ty:ty => $to:ident),*) => {
        $(
            impl IntoFieldValue for $ty {
                fn into_field_value(self) -> Option<FieldValue> {
                    Some(FieldValue::Number(Decimal::from(self)))
                }
            }

            impl FromFieldValue for $ty {
                const EXPECTED: &'static str = "integer";

                fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
                    let number = value.and_then(FieldValue::as_number)?;
                    if !number.fract().is_zero() {
                        return None;
                    }
                    number.$to()
                }
            }
        )*
    };
}

impl_integer_field_value!(i32 => to_i32, i64 => to_i64, u32 => to_u32, u64 => to_u64, usize => to_usize);

impl<T: IntoFieldValue> IntoFieldValue for Option<T> {
    fn into_field_value(self) -> Option<FieldValue> {
        self.and_then(IntoFieldValue::into_field_value)
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        match value {
            None => Some(None),
            Some(value) => T::from_field_value(Some(value)).map(Some),
        }
    }
}

/// A list has no slot for an undefined element, so a list holding one (a
/// `None` inside `Vec<Option<T>>`) converts to undefined as a whole instead of
/// silently shrinking. Decoding it into a `Vec` then fails loudly.
impl<T: IntoFieldValue> IntoFieldValue for Vec<T> {
    fn into_field_value(self) -> Option<FieldValue> {
        self.into_iter()
            .map(IntoFieldValue::into_field_value)
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::List)
    }
}

impl<T: FromFieldValue> FromFieldValue for Vec<T> {
    const EXPECTED: &'static str = "list";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::List(items) => items
                .iter()
                .map(|item| T::from_field_value(Some(item)))
                .collect(),
            FieldValue::Observable(list) => list
                .items()
                .iter()
                .map(|item| T::from_field_value(Some(item)))
                .collect(),
            _ => None,
        }
    }
}

impl IntoFieldValue for ObservableList {
    fn into_field_value(self) -> Option<FieldValue> {
        Some(FieldValue::Observable(self))
    }
}

impl FromFieldValue for ObservableList {
    const EXPECTED: &'static str = "observable list";

    fn from_field_value(value: Option<&FieldValue>) -> Option<Self> {
        value.and_then(FieldValue::as_observable).cloned()
    }
}

/// Where a form's defaults come from. Resolved once at construction and once
/// per reset.
pub enum DefaultValues<T> {
    Static(T),
    Computed(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: FormRecord> DefaultValues<T> {
    pub fn computed(producer: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(producer))
    }

    pub fn resolve(&self) -> FormValues {
        match self {
            Self::Static(values) => values.clone().into_values(),
            Self::Computed(producer) => producer().into_values(),
        }
    }
}

impl<T: Clone> Clone for DefaultValues<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(values) => Self::Static(values.clone()),
            Self::Computed(producer) => Self::Computed(producer.clone()),
        }
    }
}

impl<T> From<T> for DefaultValues<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_convert_element_by_element() {
        let value = vec![1_u32, 2].into_field_value();
        assert_eq!(
            value,
            Some(FieldValue::List(vec![1.into(), 2.into()]))
        );
        assert_eq!(Vec::<u32>::from_field_value(value.as_ref()), Some(vec![1, 2]));
    }

    #[test]
    fn undefined_list_elements_are_not_dropped() {
        let value = vec![Some(1_u32), None, Some(3)].into_field_value();
        assert_eq!(value, None);
        assert_eq!(Vec::<Option<u32>>::from_field_value(value.as_ref()), None);

        let complete = vec![Some(1_u32), Some(3)].into_field_value();
        assert_eq!(
            Vec::<Option<u32>>::from_field_value(complete.as_ref()),
            Some(vec![Some(1), Some(3)])
        );
    }
}
