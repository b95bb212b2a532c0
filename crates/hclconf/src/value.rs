//! value representation
//!
//! Every evaluated expression ends up as a [Value]. The data types are
//! - null
//! - boolean (true/false)
//! - integer (signed i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//! - unknown
//!
//! `Unknown` means "not computable with the information available right now". It is what an
//! expression evaluates to while the values it references have not been resolved yet, see
//! [crate::implied] and [crate::locals].
//!
//! Objects merge deeply, see [merge_variables].
use serde::{
    ser::{Error as _, SerializeMap, SerializeSeq},
    Serializer,
};

/// A namespace or object body: ordered mapping from name to value
pub type Object = indexmap::IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Unknown,
}

impl Value {
    /// `false` only for [Value::Unknown] itself, nested values are not inspected
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown)
    }

    /// `true` if there is no unknown value anywhere in this value
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::Array(array) => array.iter().all(Value::is_wholly_known),
            Value::Object(object) => object.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human readable type name used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Integer(_) | Value::Decimal(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "object",
            Value::Unknown => "unknown",
        }
    }

    /// Follow a path of object keys
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self {
            Value::Object(object) => object.get(*first).and_then(|value| value.get_path(rest)),
            _ => None,
        }
    }

    /// Convert into a value the evaluator understands
    ///
    /// Unknown values have no representation there: unknown object members are left out and an
    /// array containing an unknown element is unknown as a whole (`None`). Any expression
    /// referencing them fails to evaluate, which in turn makes its own result unknown.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        let value = match self {
            Value::Unknown => return None,
            Value::Null => hcl::Value::Null,
            Value::Boolean(b) => hcl::Value::Bool(*b),
            Value::Integer(i) => hcl::Value::from(*i),
            Value::Decimal(d) => hcl::Value::from(*d),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::Array(array) => hcl::Value::Array(
                array
                    .iter()
                    .map(Value::to_hcl)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Object(object) => hcl::Value::Object(
                object
                    .iter()
                    .filter_map(|(key, value)| value.to_hcl().map(|value| (key.clone(), value)))
                    .collect(),
            ),
        };

        Some(value)
    }
}

/// Deep merge `src` into `dst`
///
/// Two objects under the same key are merged key by key, anything else overwrites. The only
/// exception: an unknown value never replaces a known one, knowledge only grows.
pub fn merge_variables(dst: &mut Object, src: Object) {
    for (key, value) in src {
        let Some(existing) = dst.get_mut(&key) else {
            dst.insert(key, value);
            continue;
        };

        match (existing, value) {
            (Value::Object(existing), Value::Object(value)) => merge_variables(existing, value),
            (existing, Value::Unknown) if existing.is_known() => {}
            (existing, value) => *existing = value,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(array) => {
                f.write_str("[")?;
                for (index, element) in array.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Value::Object(object) => {
                f.write_str("{")?;
                for (index, (key, value)) in object.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str("}")
            }
            Value::Unknown => f.write_str("(unknown)"),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        match value.as_f64() {
            Some(decimal) => Value::Decimal(decimal),
            // u64 beyond i64::MAX
            None => Value::Decimal(value.as_u64().map_or(f64::NAN, |u| u as f64)),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Value {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.into(),
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(a) => a.into(),
            hcl::Value::Object(o) => Value::Object(
                o.into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Unknown => Err(S::Error::custom("value is not known")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    #[test]
    fn wholly_known_looks_into_nested_values() {
        let value = object([("a", object([("b", Value::Unknown)]))]);
        assert!(value.is_known());
        assert!(!value.is_wholly_known());
        assert!(object([("a", Value::Array(vec![Value::Integer(1)]))]).is_wholly_known());
    }

    #[test]
    fn merge_is_deep() {
        let Value::Object(mut dst) = object([("group", object([("a", object([("x", Value::Integer(1))]))]))])
        else {
            unreachable!()
        };
        let Value::Object(src) = object([("group", object([("b", object([("y", Value::Integer(2))]))]))])
        else {
            unreachable!()
        };

        merge_variables(&mut dst, src);

        assert_eq!(
            Value::Object(dst),
            object([(
                "group",
                object([
                    ("a", object([("x", Value::Integer(1))])),
                    ("b", object([("y", Value::Integer(2))])),
                ])
            )])
        );
    }

    #[test]
    fn merge_never_forgets() {
        let mut dst: Object = [("a".to_string(), Value::Integer(1))].into_iter().collect();
        merge_variables(&mut dst, [("a".to_string(), Value::Unknown)].into_iter().collect());
        assert_eq!(dst["a"], Value::Integer(1));

        merge_variables(&mut dst, [("a".to_string(), Value::from("x"))].into_iter().collect());
        assert_eq!(dst["a"], Value::from("x"));
    }

    #[test]
    fn unknown_members_are_hidden_from_the_evaluator() {
        let value = object([("known", Value::Integer(1)), ("unknown", Value::Unknown)]);
        let hcl = value.to_hcl().expect("object is representable");
        let object = hcl.as_object().expect("is an object");
        assert!(object.contains_key("known"));
        assert!(!object.contains_key("unknown"));

        assert_eq!(Value::Array(vec![Value::Unknown]).to_hcl(), None);
    }

    #[test]
    fn path_lookup() {
        let value = object([("a", object([("b", Value::Integer(3))]))]);
        assert_eq!(value.get_path(&["a", "b"]), Some(&Value::Integer(3)));
        assert_eq!(value.get_path(&["a", "c"]), None);
    }
}
