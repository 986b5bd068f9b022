use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Number;

mod de;
mod from;
mod ser;

/// Payload document carried by socket.io packets, similar to [`serde_json::Value`] but able to
/// hold binary leaves.
///
/// When a packet is encoded, every [`PayloadValue::Binary`] leaf is extracted as an attachment
/// and replaced by a `{"_placeholder":true,"num":N}` object. The decoder puts it back at the same
/// position once the attachments have been received.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PayloadValue {
    /// A JSON `null`.
    #[default]
    Null,
    /// A JSON boolean.
    Bool(bool),
    /// A JSON number, integer or float.
    Number(Number),
    /// A JSON string.
    String(String),
    /// A binary payload, sent out-of-band as an attachment.
    Binary(Bytes),
    /// A JSON array.
    Array(Vec<PayloadValue>),
    /// A JSON object. Properties keep their insertion order.
    Object(IndexMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Convert any serializable `T` into a [`PayloadValue`].
    ///
    /// Byte buffers (`serialize_bytes`, e.g. [`Bytes`] or `serde_bytes`) become binary leaves.
    pub fn from_data<T: Serialize + ?Sized>(data: &T) -> Result<PayloadValue, serde_json::Error> {
        ser::to_payload_value(data)
    }

    /// Convert `data` into a list of event arguments.
    ///
    /// Tuples are spread: `("a", 1)` gives two arguments and `()` none.
    /// Any other value is a single argument. Note that serde serializes fixed size arrays
    /// as tuples, use a `Vec` to send a list as one argument.
    pub fn args_from_data<T: Serialize + ?Sized>(
        data: &T,
    ) -> Result<Vec<PayloadValue>, serde_json::Error> {
        ser::to_args(data)
    }

    /// Interpret a [`PayloadValue`] as a `T`.
    ///
    /// Binary leaves deserialize as byte buffers or as sequences of `u8`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        T::deserialize(self)
    }

    /// Determines if `self` contains any binary leaf.
    pub fn has_binary(&self) -> bool {
        match self {
            PayloadValue::Binary(_) => true,
            PayloadValue::Array(a) => a.iter().any(PayloadValue::has_binary),
            PayloadValue::Object(o) => o.values().any(PayloadValue::has_binary),
            _ => false,
        }
    }

    /// Counts the binary leaves contained in `self`.
    pub fn count_binaries(&self) -> usize {
        match self {
            PayloadValue::Binary(_) => 1,
            PayloadValue::Array(a) => a.iter().map(PayloadValue::count_binaries).sum(),
            PayloadValue::Object(o) => o.values().map(PayloadValue::count_binaries).sum(),
            _ => 0,
        }
    }

    /// Returns the string if `self` is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if `self` is a binary leaf.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the elements if `self` is an array.
    pub fn as_array(&self) -> Option<&[PayloadValue]> {
        match self {
            PayloadValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a property of an object.
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        match self {
            PayloadValue::Object(o) => o.get(key),
            _ => None,
        }
    }

    /// Returns true if `self` is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }

    /// Converts `self` to a [`serde_json::Value`], replacing binary leaves by placeholder
    /// objects numbered depth-first. The extracted buffers are appended to `attachments`
    /// in the same order.
    pub fn to_json_with_attachments(self, attachments: &mut Vec<Bytes>) -> serde_json::Value {
        use serde_json::Value;
        match self {
            PayloadValue::Null => Value::Null,
            PayloadValue::Bool(b) => Value::Bool(b),
            PayloadValue::Number(n) => Value::Number(n),
            PayloadValue::String(s) => Value::String(s),
            PayloadValue::Binary(bin) => {
                let num = attachments.len();
                attachments.push(bin);
                placeholder(num)
            }
            PayloadValue::Array(a) => Value::Array(
                a.into_iter()
                    .map(|v| v.to_json_with_attachments(attachments))
                    .collect(),
            ),
            PayloadValue::Object(o) => Value::Object(
                o.into_iter()
                    .map(|(k, v)| (k, v.to_json_with_attachments(attachments)))
                    .collect(),
            ),
        }
    }

    /// Replace every placeholder object of `self` by the binary attachment it references.
    ///
    /// Returns the index of the first placeholder that has no matching attachment.
    pub fn fill_placeholders(&mut self, attachments: &[Bytes]) -> Result<(), usize> {
        match self {
            PayloadValue::Object(o) => match placeholder_num(o) {
                Some(num) => {
                    let bin = attachments.get(num).ok_or(num)?;
                    *self = PayloadValue::Binary(bin.clone());
                    Ok(())
                }
                None => o
                    .values_mut()
                    .try_for_each(|v| v.fill_placeholders(attachments)),
            },
            PayloadValue::Array(a) => a
                .iter_mut()
                .try_for_each(|v| v.fill_placeholders(attachments)),
            _ => Ok(()),
        }
    }
}

fn placeholder(num: usize) -> serde_json::Value {
    let mut map = serde_json::Map::with_capacity(2);
    map.insert("_placeholder".into(), serde_json::Value::Bool(true));
    map.insert("num".into(), serde_json::Value::Number(num.into()));
    serde_json::Value::Object(map)
}

fn placeholder_num(o: &IndexMap<String, PayloadValue>) -> Option<usize> {
    match (o.len(), o.get("_placeholder"), o.get("num")) {
        (2, Some(PayloadValue::Bool(true)), Some(PayloadValue::Number(n))) => {
            n.as_u64().and_then(|n| usize::try_from(n).ok())
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::PayloadValue;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Avatar {
        name: String,
        data: Bytes,
        thumbs: Vec<Bytes>,
        size: Option<u32>,
    }

    fn avatar() -> Avatar {
        Avatar {
            name: "me.png".into(),
            data: Bytes::from_static(&[1, 2, 3]),
            thumbs: vec![Bytes::from_static(&[4]), Bytes::from_static(&[5])],
            size: None,
        }
    }

    #[test]
    fn from_data_extracts_binaries() {
        let value = PayloadValue::from_data(&avatar()).unwrap();
        assert!(value.has_binary());
        assert_eq!(value.count_binaries(), 3);
        assert_eq!(
            value.get("data").and_then(PayloadValue::as_bytes),
            Some(&Bytes::from_static(&[1, 2, 3]))
        );
        assert_eq!(value.get("size"), Some(&PayloadValue::Null));
    }

    #[test]
    fn into_data_round_trip() {
        let value = PayloadValue::from_data(&avatar()).unwrap();
        assert_eq!(value.into_data::<Avatar>().unwrap(), avatar());
    }

    #[test]
    fn tuples_are_spread_into_args() {
        let args = PayloadValue::args_from_data(&("a", 1, Bytes::from_static(&[1]))).unwrap();
        assert_eq!(args, vec![
            PayloadValue::from("a"),
            PayloadValue::from(1),
            PayloadValue::Binary(Bytes::from_static(&[1]))
        ]);
        assert!(PayloadValue::args_from_data(&()).unwrap().is_empty());

        let args = PayloadValue::args_from_data(&vec![1, 2]).unwrap();
        let list = PayloadValue::Array(vec![PayloadValue::from(1), PayloadValue::from(2)]);
        assert_eq!(args, vec![list]);

        let args = PayloadValue::args_from_data(&avatar()).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].count_binaries(), 3);

        let args = PayloadValue::args_from_data("hello").unwrap();
        assert_eq!(args, vec![PayloadValue::from("hello")]);
    }

    #[test]
    fn binary_into_vec() {
        let value = PayloadValue::Binary(Bytes::from_static(&[7, 8]));
        assert_eq!(value.into_data::<Vec<u8>>().unwrap(), vec![7, 8]);
    }

    #[test]
    fn placeholders_are_numbered_depth_first() {
        let value = PayloadValue::from_data(&avatar()).unwrap();
        let mut bins = Vec::new();
        let json = value.to_json_with_attachments(&mut bins);
        assert_eq!(
            json,
            json!({
                "data": { "_placeholder": true, "num": 0 },
                "name": "me.png",
                "size": null,
                "thumbs": [
                    { "_placeholder": true, "num": 1 },
                    { "_placeholder": true, "num": 2 }
                ]
            })
        );
        assert_eq!(bins, vec![
            Bytes::from_static(&[1, 2, 3]),
            Bytes::from_static(&[4]),
            Bytes::from_static(&[5])
        ]);
    }

    #[test]
    fn fill_placeholders() {
        let mut value = PayloadValue::from(json!([{ "a": { "_placeholder": true, "num": 1 } }, {
            "_placeholder": true,
            "num": 0
        }]));
        let bins = [Bytes::from_static(&[0]), Bytes::from_static(&[1])];
        value.fill_placeholders(&bins).unwrap();
        assert_eq!(
            value,
            PayloadValue::Array(vec![
                PayloadValue::Object(
                    [("a".to_string(), PayloadValue::Binary(bins[1].clone()))].into()
                ),
                PayloadValue::Binary(bins[0].clone()),
            ])
        );

        let mut value = PayloadValue::from(json!([{ "_placeholder": true, "num": 3 }]));
        assert_eq!(value.fill_placeholders(&bins), Err(3));
    }

    #[test]
    fn look_alike_objects_are_not_placeholders() {
        let json = json!({ "_placeholder": true, "num": 0, "other": 1 });
        let mut value = PayloadValue::from(json.clone());
        value.fill_placeholders(&[]).unwrap();
        assert_eq!(value, PayloadValue::from(json));
    }
}
