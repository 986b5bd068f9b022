use bytes::Bytes;
use serde_json::{Number, Value};

use super::PayloadValue;

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PayloadValue {
                fn from(value: $ty) -> Self {
                    PayloadValue::Number(value.into())
                }
            }
        )*
    };
}

impl_from_integer!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

impl From<()> for PayloadValue {
    fn from(_value: ()) -> Self {
        PayloadValue::Null
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<Number> for PayloadValue {
    fn from(value: Number) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::String(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::String(value.to_string())
    }
}

impl From<Bytes> for PayloadValue {
    fn from(value: Bytes) -> Self {
        PayloadValue::Binary(value)
    }
}

impl From<Vec<PayloadValue>> for PayloadValue {
    fn from(value: Vec<PayloadValue>) -> Self {
        PayloadValue::Array(value)
    }
}

impl<T: Into<PayloadValue>> From<Option<T>> for PayloadValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PayloadValue::Null, Into::into)
    }
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PayloadValue::Null,
            Value::Bool(b) => PayloadValue::Bool(b),
            Value::Number(n) => PayloadValue::Number(n),
            Value::String(s) => PayloadValue::String(s),
            Value::Array(a) => PayloadValue::Array(a.into_iter().map(Into::into).collect()),
            Value::Object(o) => {
                PayloadValue::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
