use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{
    de::{
        self, DeserializeSeed, Deserializer as _, EnumAccess, Error, IntoDeserializer, MapAccess,
        SeqAccess, Unexpected, VariantAccess, Visitor,
        value::{MapDeserializer, SeqDeserializer},
    },
    forward_to_deserialize_any,
};
use serde_json::Number;

use super::PayloadValue;

macro_rules! impl_deser_number {
    ($($method:ident),*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                match self {
                    PayloadValue::Number(n) => n.$method(visitor),
                    _ => Err(self.invalid_type(&visitor)),
                }
            }
        )*
    };
}

impl PayloadValue {
    fn unexpected(&self) -> Unexpected<'_> {
        match self {
            PayloadValue::Null => Unexpected::Unit,
            PayloadValue::Bool(b) => Unexpected::Bool(*b),
            PayloadValue::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
                (Some(n), _, _) => Unexpected::Unsigned(n),
                (_, Some(n), _) => Unexpected::Signed(n),
                (_, _, Some(n)) => Unexpected::Float(n),
                _ => Unexpected::Other("number"),
            },
            PayloadValue::String(s) => Unexpected::Str(s),
            PayloadValue::Binary(data) => Unexpected::Bytes(data),
            PayloadValue::Array(_) => Unexpected::Seq,
            PayloadValue::Object(_) => Unexpected::Map,
        }
    }

    fn invalid_type(&self, exp: &dyn de::Expected) -> serde_json::Error {
        serde_json::Error::invalid_type(self.unexpected(), exp)
    }
}

impl<'de> serde::Deserialize<'de> for PayloadValue {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = PayloadValue;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("any valid payload value")
            }

            fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
                Ok(PayloadValue::Null)
            }

            fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
                Ok(PayloadValue::Null)
            }

            fn visit_some<D: de::Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<Self::Value, D::Error> {
                deserializer.deserialize_any(self)
            }

            fn visit_bool<E: Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(PayloadValue::Bool(v))
            }

            fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(PayloadValue::Number(v.into()))
            }

            fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(PayloadValue::Number(v.into()))
            }

            fn visit_f64<E: Error>(self, v: f64) -> Result<Self::Value, E> {
                Number::from_f64(v)
                    .map(PayloadValue::Number)
                    .ok_or_else(|| E::custom(format!("float {v} is not a valid number")))
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(PayloadValue::String(v.to_string()))
            }

            fn visit_string<E: Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(PayloadValue::String(v))
            }

            fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(PayloadValue::Binary(Bytes::copy_from_slice(v)))
            }

            fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(PayloadValue::Binary(Bytes::from(v)))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(elem) = seq.next_element()? {
                    vec.push(elem);
                }
                Ok(PayloadValue::Array(vec))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut obj = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, PayloadValue>()? {
                    obj.insert(key, value);
                }
                Ok(PayloadValue::Object(obj))
            }
        }

        deserializer.deserialize_any(PayloadVisitor)
    }
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for PayloadValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> de::Deserializer<'de> for PayloadValue {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            PayloadValue::Null => visitor.visit_unit(),
            PayloadValue::Bool(b) => visitor.visit_bool(b),
            PayloadValue::Number(n) => n.deserialize_any(visitor),
            PayloadValue::String(s) => visitor.visit_string(s),
            PayloadValue::Binary(data) => visitor.visit_byte_buf(data.into()),
            PayloadValue::Array(a) => visit_array(a, visitor),
            PayloadValue::Object(o) => visit_object(o, visitor),
        }
    }

    impl_deser_number!(
        deserialize_i8,
        deserialize_i16,
        deserialize_i32,
        deserialize_i64,
        deserialize_u8,
        deserialize_u16,
        deserialize_u32,
        deserialize_u64,
        deserialize_f32,
        deserialize_f64
    );

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            PayloadValue::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            PayloadValue::Array(a) => visit_array(a, visitor),
            // A binary leaf can be read as a sequence of bytes, e.g. a `Vec<u8>`
            PayloadValue::Binary(data) => {
                let mut seq = SeqDeserializer::<_, serde_json::Error>::new(data.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            _ => Err(self.invalid_type(&visitor)),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            PayloadValue::Binary(data) => visitor.visit_byte_buf(data.into()),
            PayloadValue::String(s) => visitor.visit_string(s),
            PayloadValue::Array(a) => visit_array(a, visitor),
            _ => Err(self.invalid_type(&visitor)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let (variant, value) = match self {
            PayloadValue::String(variant) => (variant, None),
            PayloadValue::Object(o) if o.len() == 1 => match o.into_iter().next() {
                Some((variant, value)) => (variant, Some(value)),
                None => return Err(Error::invalid_length(0, &"a map with a single key")),
            },
            PayloadValue::Object(o) => {
                return Err(Error::invalid_length(o.len(), &"a map with a single key"));
            }
            other => return Err(Error::invalid_type(other.unexpected(), &"string or map")),
        };
        visitor.visit_enum(EnumDeserializer { variant, value })
    }

    forward_to_deserialize_any! {
        bool i128 u128 char str string unit unit_struct map struct identifier ignored_any
    }
}

fn visit_array<'de, V: Visitor<'de>>(
    a: Vec<PayloadValue>,
    visitor: V,
) -> Result<V::Value, serde_json::Error> {
    let mut seq = SeqDeserializer::<_, serde_json::Error>::new(a.into_iter());
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

fn visit_object<'de, V: Visitor<'de>>(
    o: IndexMap<String, PayloadValue>,
    visitor: V,
) -> Result<V::Value, serde_json::Error> {
    let mut map = MapDeserializer::<_, serde_json::Error>::new(o.into_iter());
    let value = visitor.visit_map(&mut map)?;
    map.end()?;
    Ok(value)
}

struct EnumDeserializer {
    variant: String,
    value: Option<PayloadValue>,
}

impl<'de> EnumAccess<'de> for EnumDeserializer {
    type Error = serde_json::Error;
    type Variant = VariantDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let variant = seed.deserialize(self.variant.into_deserializer())?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer {
    value: Option<PayloadValue>,
}

impl<'de> VariantAccess<'de> for VariantDeserializer {
    type Error = serde_json::Error;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.value {
            None | Some(PayloadValue::Null) => Ok(()),
            Some(value) => Err(value.invalid_type(&"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        match self.value {
            Some(value) => seed.deserialize(value),
            None => Err(Error::invalid_type(Unexpected::UnitVariant, &"newtype variant")),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Some(PayloadValue::Array(a)) => visit_array(a, visitor),
            Some(value) => Err(value.invalid_type(&"tuple variant")),
            None => Err(Error::invalid_type(Unexpected::UnitVariant, &"tuple variant")),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            Some(PayloadValue::Object(o)) => visit_object(o, visitor),
            Some(value) => Err(value.invalid_type(&"struct variant")),
            None => Err(Error::invalid_type(Unexpected::UnitVariant, &"struct variant")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    enum Command {
        Stop,
        Move { x: i32, y: i32 },
        Say(String),
    }

    #[test]
    fn deserialize_enums() {
        let value = PayloadValue::from(json!(["Stop", { "Move": { "x": 1, "y": -2 } }, { "Say": "hi" }]));
        let cmds: Vec<Command> = value.into_data().unwrap();
        assert_eq!(
            cmds,
            vec![
                Command::Stop,
                Command::Move { x: 1, y: -2 },
                Command::Say("hi".into())
            ]
        );
    }

    #[test]
    fn deserialize_maps_and_options() {
        let value = PayloadValue::from(json!({ "a": 1, "b": null }));
        let map: HashMap<String, Option<u8>> = value.into_data().unwrap();
        assert_eq!(map["a"], Some(1));
        assert_eq!(map["b"], None);
    }

    #[test]
    fn invalid_type_is_reported() {
        let value = PayloadValue::from("text");
        assert!(value.into_data::<u32>().is_err());
    }

    #[test]
    fn deserialize_from_json() {
        let value: PayloadValue = serde_json::from_str(r#"{"a":[1,"b",true,null]}"#).unwrap();
        assert_eq!(value, PayloadValue::from(json!({ "a": [1, "b", true, null] })));
    }
}
