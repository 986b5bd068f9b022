use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{Error, Impossible, Serialize, SerializeMap as _, SerializeSeq as _};
use serde_json::Number;

use super::PayloadValue;

const KEY_STRING_ERROR: &str = "key must be a string";

pub fn to_payload_value<T: Serialize + ?Sized>(data: &T) -> Result<PayloadValue, serde_json::Error> {
    data.serialize(Serializer::default())
}

/// Serialize `data` as a list of event arguments.
///
/// A tuple is spread into one argument per element and `()` gives no argument.
/// Any other value is a single argument.
pub fn to_args<T: Serialize + ?Sized>(data: &T) -> Result<Vec<PayloadValue>, serde_json::Error> {
    match data.serialize(Serializer { args: true })? {
        PayloadValue::Array(args) => Ok(args),
        value => Ok(vec![value]),
    }
}

impl Serialize for PayloadValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PayloadValue::Null => serializer.serialize_unit(),
            PayloadValue::Bool(b) => serializer.serialize_bool(*b),
            PayloadValue::Number(n) => n.serialize(serializer),
            PayloadValue::String(s) => serializer.serialize_str(s),
            PayloadValue::Binary(bin) => serializer.serialize_bytes(bin),
            PayloadValue::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for elem in a {
                    seq.serialize_element(elem)?;
                }
                seq.end()
            }
            PayloadValue::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.len()))?;
                for (key, value) in o {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Serializes any `T` into a [`PayloadValue`], turning byte buffers into binary leaves.
///
/// With `args` set, the top level value is serialized as an argument list:
/// tuples are kept as the list and any other value is wrapped in a one element list.
#[derive(Debug, Clone, Copy, Default)]
struct Serializer {
    args: bool,
}

impl Serializer {
    fn wrap(self, value: PayloadValue) -> PayloadValue {
        wrap(self.args, value)
    }
}

fn wrap(args: bool, value: PayloadValue) -> PayloadValue {
    if args {
        PayloadValue::Array(vec![value])
    } else {
        value
    }
}

impl serde::Serializer for Serializer {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Self::Ok, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Self::Ok, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Self::Ok, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::Number(v.into())))
    }

    fn serialize_u8(self, v: u8) -> Result<Self::Ok, Self::Error> {
        self.serialize_u64(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Self::Ok, Self::Error> {
        self.serialize_u64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Self::Ok, Self::Error> {
        self.serialize_u64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::Number(v.into())))
    }

    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        // Like serde_json, non finite floats become null
        let value = Number::from_f64(v).map_or(PayloadValue::Null, PayloadValue::Number);
        Ok(self.wrap(value))
    }

    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::String(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::Binary(Bytes::copy_from_slice(v))))
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::Null))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        match self.args {
            true => Ok(PayloadValue::Array(Vec::new())),
            false => Ok(PayloadValue::Null),
        }
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(self.wrap(PayloadValue::String(variant.to_string())))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        let mut obj = IndexMap::new();
        obj.insert(variant.to_string(), value.serialize(Serializer::default())?);
        Ok(self.wrap(PayloadValue::Object(obj)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(SerializeVec {
            vec: Vec::with_capacity(len.unwrap_or(0)),
            wrap: self.args,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        // A top level tuple is already the argument list
        Ok(SerializeVec {
            vec: Vec::with_capacity(len),
            wrap: false,
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            vec: Vec::with_capacity(len),
            wrap: self.args,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(SerializeMap {
            map: IndexMap::new(),
            next_key: None,
            wrap: self.args,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(SerializeStructVariant {
            name: variant,
            map: IndexMap::new(),
            wrap: self.args,
        })
    }
}

struct SerializeVec {
    vec: Vec<PayloadValue>,
    wrap: bool,
}

impl serde::ser::SerializeSeq for SerializeVec {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.vec.push(value.serialize(Serializer::default())?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(wrap(self.wrap, PayloadValue::Array(self.vec)))
    }
}

impl serde::ser::SerializeTuple for SerializeVec {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        serde::ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        serde::ser::SerializeSeq::end(self)
    }
}

impl serde::ser::SerializeTupleStruct for SerializeVec {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        serde::ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        serde::ser::SerializeSeq::end(self)
    }
}

struct SerializeTupleVariant {
    name: &'static str,
    vec: Vec<PayloadValue>,
    wrap: bool,
}

impl serde::ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.vec.push(value.serialize(Serializer::default())?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        let mut obj = IndexMap::new();
        obj.insert(self.name.to_string(), PayloadValue::Array(self.vec));
        Ok(wrap(self.wrap, PayloadValue::Object(obj)))
    }
}

struct SerializeMap {
    map: IndexMap<String, PayloadValue>,
    next_key: Option<String>,
    wrap: bool,
}

impl serde::ser::SerializeMap for SerializeMap {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.next_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| serde_json::Error::custom("serialize_value called before serialize_key"))?;
        self.map.insert(key, value.serialize(Serializer::default())?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(wrap(self.wrap, PayloadValue::Object(self.map)))
    }
}

impl serde::ser::SerializeStruct for SerializeMap {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.map.insert(key.to_string(), value.serialize(Serializer::default())?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(wrap(self.wrap, PayloadValue::Object(self.map)))
    }
}

struct SerializeStructVariant {
    name: &'static str,
    map: IndexMap<String, PayloadValue>,
    wrap: bool,
}

impl serde::ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = PayloadValue;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.map.insert(key.to_string(), value.serialize(Serializer::default())?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        let mut obj = IndexMap::new();
        obj.insert(self.name.to_string(), PayloadValue::Object(self.map));
        Ok(wrap(self.wrap, PayloadValue::Object(obj)))
    }
}

/// Object keys must be strings, numbers and chars are stringified like serde_json does.
struct MapKeySerializer;

macro_rules! serialize_key_display {
    ($($method:ident: $ty:ty),*) => {
        $(
            fn $method(self, v: $ty) -> Result<Self::Ok, Self::Error> {
                Ok(v.to_string())
            }
        )*
    };
}

impl serde::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = serde_json::Error;

    type SerializeSeq = Impossible<String, serde_json::Error>;
    type SerializeTuple = Impossible<String, serde_json::Error>;
    type SerializeTupleStruct = Impossible<String, serde_json::Error>;
    type SerializeTupleVariant = Impossible<String, serde_json::Error>;
    type SerializeMap = Impossible<String, serde_json::Error>;
    type SerializeStruct = Impossible<String, serde_json::Error>;
    type SerializeStructVariant = Impossible<String, serde_json::Error>;

    serialize_key_display!(
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_char: char
    );

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_f32(self, _v: f32) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_f64(self, _v: f64) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(serde_json::Error::custom(KEY_STRING_ERROR))
    }
}
