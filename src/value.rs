// ABOUTME: Dynamic MessagePack value type.
// ABOUTME: Maps keep insertion order for encoding but compare equal regardless of order.

use crate::ext::{Extension, Timestamp};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A MessagePack map: insertion ordered, order-insensitive equality.
pub type Map = IndexMap<MapKey, Value>;

/// A map key. MessagePack allows any value as a key; this codec accepts
/// only strings and integers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    /// A signed integer key
    Int(i64),
    /// An unsigned integer key above `i64::MAX`
    UInt(u64),
    /// A string key, shared so that repeated keys can reuse one allocation
    Str(Arc<str>),
}

impl MapKey {
    /// If this is a string key, returns it.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapKey::Str(s) => Some(s),
            _ => None,
        }
    }

    /// If this is an integer key that fits an i64, returns it.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MapKey::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(n) => write!(f, "{n}"),
            MapKey::UInt(n) => write!(f, "{n}"),
            MapKey::Str(s) => write!(f, "{:?}", &**s),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(n) => write!(f, "{n}"),
            MapKey::UInt(n) => write!(f, "{n}"),
            MapKey::Str(s) => write!(f, "\"{}\"", s.escape_default()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(Arc::from(s))
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for MapKey {
    fn from(s: Arc<str>) -> Self {
        MapKey::Str(s)
    }
}

impl From<i32> for MapKey {
    fn from(n: i32) -> Self {
        MapKey::Int(i64::from(n))
    }
}

impl From<i64> for MapKey {
    fn from(n: i64) -> Self {
        MapKey::Int(n)
    }
}

impl From<u64> for MapKey {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => MapKey::Int(n),
            Err(_) => MapKey::UInt(n),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Int(n) => Value::Int(n),
            MapKey::UInt(n) => Value::UInt(n),
            MapKey::Str(s) => Value::String(s.to_string()),
        }
    }
}

/// An opaque application value. Only a registered extension encoder can
/// turn it into bytes.
#[derive(Clone)]
pub struct Custom(pub Arc<dyn Any + Send + Sync>);

impl Custom {
    /// Wrap an application value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Custom(Arc::new(value))
    }

    /// Borrow the wrapped value as `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Custom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Custom(..)")
    }
}

/// A MessagePack value.
#[derive(Clone, PartialEq, Default)]
pub enum Value {
    /// nil
    #[default]
    Nil,
    /// true or false
    Bool(bool),
    /// A signed 64-bit integer
    Int(i64),
    /// An unsigned 64-bit integer above `i64::MAX`
    UInt(u64),
    /// A float; float 32 input is widened on decode
    Float(f64),
    /// A UTF-8 string
    String(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// An ordered sequence
    Array(Vec<Value>),
    /// A map with string or integer keys
    Map(Map),
    /// An extension value with no registered interpretation
    Ext(Extension),
    /// A point in time, carried by the timestamp extension (type -1)
    Timestamp(Timestamp),
    /// An application value encoded through the extension registry
    Custom(Custom),
}

impl Value {
    /// Returns true if this value is nil.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true if this value is a boolean.
    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Returns true if this value is any numeric type.
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// Returns true if this value is a string.
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Returns true if this value is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Returns true if this value is a map.
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// If this is a boolean, returns the value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// If this is an integer that fits an i64, returns it.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// If this is a non-negative integer, returns it as u64.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(n) => Some(*n),
            Value::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// If this is a number, returns the value as f64.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Intentional: int-to-float conversion may lose precision
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// If this is a string, returns a reference to it.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// If this is binary, returns a reference to the bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// If this is an array, returns a reference to it.
    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// If this is an array, returns a mutable reference to it.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// If this is a map, returns a reference to it.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// If this is a map, returns a mutable reference to it.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Index into an array. Returns None if not an array or index out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.as_array().and_then(|a| a.get(index))
    }

    /// Index into a map by string key. Returns None if not a map or key not found.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(&MapKey::from(key)))
    }

    /// Name of the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Ext(_) => "extension",
            Value::Timestamp(_) => "timestamp",
            Value::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::UInt(n) => write!(f, "UInt({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Binary(b) => write!(f, "Binary({b:02x?})"),
            Value::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Value::Ext(e) => write!(f, "{e:?}"),
            Value::Timestamp(t) => write!(f, "{t:?}"),
            Value::Custom(c) => write!(f, "{c:?}"),
        }
    }
}

// Human-readable, JSON-like output
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::UInt(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Value::Binary(b) => {
                write!(f, "<")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ">")
            }
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Ext(e) => write!(f, "ext({}, {} bytes)", e.type_code, e.data.len()),
            Value::Timestamp(t) => write!(f, "timestamp({}.{:09})", t.seconds(), t.nanoseconds()),
            Value::Custom(_) => write!(f, "custom"),
        }
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i8> for Value {
    fn from(n: i8) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::UInt(n),
        }
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(b.to_vec())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<Extension> for Value {
    fn from(e: Extension) -> Self {
        Value::Ext(e)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Custom> for Value {
    fn from(c: Custom) -> Self {
        Value::Custom(c)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Array(iter.into_iter().map(Into::into).collect())
    }
}

/// Macro for creating MessagePack values easily.
///
/// # Examples
///
/// ```rust
/// use serde_msgpack::msgpack;
///
/// let value = msgpack!({
///     "name": "test",
///     "values": [1, 2, 3],
///     "active": true
/// });
/// ```
#[macro_export]
macro_rules! msgpack {
    // nil
    (nil) => {
        $crate::Value::Nil
    };
    (null) => {
        $crate::Value::Nil
    };

    // bool
    (true) => {
        $crate::Value::Bool(true)
    };
    (false) => {
        $crate::Value::Bool(false)
    };

    // array
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::Array(vec![ $( $crate::msgpack!($elem) ),* ])
    };

    // map
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = $crate::Map::new();
            $(
                map.insert($crate::MapKey::from($key), $crate::msgpack!($value));
            )*
            $crate::Value::Map(map)
        }
    };

    // other expressions (numbers, strings, etc.)
    ($other:expr) => {
        $crate::Value::from($other)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgpack;

    #[test]
    fn test_value_types() {
        assert!(Value::Nil.is_nil());
        assert!(Value::Bool(true).is_bool());
        assert!(Value::Int(42).is_number());
        assert!(Value::Float(2.5).is_number());
        assert!(Value::String("hello".into()).is_string());
        assert!(Value::Array(vec![]).is_array());
        assert!(Value::Map(Map::new()).is_map());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::UInt(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Binary(vec![1, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_u64_normalises() {
        assert_eq!(Value::from(5u64), Value::Int(5));
        assert_eq!(Value::from(u64::MAX), Value::UInt(u64::MAX));
        assert_eq!(MapKey::from(7u64), MapKey::Int(7));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = msgpack!({"a": 1, "b": 2});
        let b = msgpack!({"b": 2, "a": 1});
        assert_eq!(a, b);

        let keys: Vec<_> = a.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec![MapKey::from("a"), MapKey::from("b")]);
    }

    #[test]
    fn test_msgpack_macro() {
        assert!(msgpack!(nil).is_nil());

        let v = msgpack!([1, 2, 3]);
        assert_eq!(v.get(0).and_then(Value::as_i64), Some(1));

        let v = msgpack!({
            "name": "test",
            7: "seven"
        });
        assert_eq!(v.get_key("name").and_then(Value::as_str), Some("test"));
        assert_eq!(
            v.as_map().and_then(|m| m.get(&MapKey::Int(7))),
            Some(&Value::from("seven"))
        );
    }

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![MapKey::from("b"), MapKey::Int(3), MapKey::from("a"), MapKey::Int(-1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![MapKey::Int(-1), MapKey::Int(3), MapKey::from("a"), MapKey::from("b")]
        );
    }

    #[test]
    fn test_custom_equality_is_identity() {
        let c = Custom::new(5u32);
        assert_eq!(Value::Custom(c.clone()), Value::Custom(c.clone()));
        assert_ne!(Value::Custom(c), Value::Custom(Custom::new(5u32)));
    }

    #[test]
    fn test_display() {
        let v = msgpack!({"k": [1, nil, "s"]});
        assert_eq!(v.to_string(), "{\"k\": [1, nil, \"s\"]}");
        assert_eq!(Value::Binary(vec![0xab, 0x01]).to_string(), "<ab01>");
    }
}
