// ABOUTME: Crate-level tests for the top-level encode/decode entry points.
// ABOUTME: Tests roundtrips through Value, serde and streaming, and the msgpack! macro.

use crate::{
    decode, decode_array_stream, decode_multi, decode_multi_stream, decode_stream, encode,
    from_slice, from_value, msgpack, to_vec, Error, ErrorKind, Extension, Timestamp, Value,
};
use serde::{Deserialize, Serialize};

#[test]
fn test_roundtrip_primitives() {
    let bytes = to_vec(&42i32).unwrap();
    assert_eq!(bytes, vec![0x2a]);
    let decoded: i32 = from_slice(&bytes).unwrap();
    assert_eq!(decoded, 42);

    let bytes = to_vec(&"hello").unwrap();
    let decoded: String = from_slice(&bytes).unwrap();
    assert_eq!(decoded, "hello");

    let bytes = to_vec(&true).unwrap();
    assert_eq!(bytes, vec![0xc3]);
    let decoded: bool = from_slice(&bytes).unwrap();
    assert!(decoded);
}

#[test]
fn test_roundtrip_containers() {
    let original = vec![vec![1, 2], vec![3, 4]];
    let bytes = to_vec(&original).unwrap();
    let decoded: Vec<Vec<i32>> = from_slice(&bytes).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_roundtrip_struct() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
        active: bool,
    }

    let original = Person {
        name: "Alice".to_string(),
        age: 30,
        active: true,
    };

    let bytes = to_vec(&original).unwrap();
    // fixmap with three entries
    assert_eq!(bytes[0], 0x83);
    let decoded: Person = from_slice(&bytes).unwrap();
    assert_eq!(decoded, original);

    // The serde output is ordinary MessagePack
    let value = decode(&bytes).unwrap();
    assert_eq!(value.get_key("age").and_then(|v| v.as_i64()), Some(30));
}

#[test]
fn test_value_roundtrip() {
    let value = msgpack!({
        "name": "test",
        "values": [1, 2, 3],
        "nested": {
            "flag": true,
            "nothing": nil
        }
    });

    let bytes = encode(&value).unwrap();
    assert_eq!(decode(&bytes).unwrap(), value);
}

#[test]
fn test_value_serde_matches_encode() {
    let value = msgpack!({"a": [1, (-1), 2.5, "s"], 7: false});
    assert_eq!(to_vec(&value).unwrap(), encode(&value).unwrap());

    let decoded: Value = from_slice(&encode(&value).unwrap()).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn test_value_serde_binary() {
    let value = Value::Binary(vec![1, 2, 3]);
    let bytes = to_vec(&value).unwrap();
    assert_eq!(bytes, vec![0xc4, 0x03, 0x01, 0x02, 0x03]);
    assert_eq!(from_value::<Value>(decode(&bytes).unwrap()).unwrap(), value);
}

#[test]
fn test_value_serde_extensions_as_tuples() {
    let value = Value::Ext(Extension::new(5, vec![0xaa]));
    let bytes = to_vec(&value).unwrap();
    assert_eq!(bytes, vec![0x92, 0x05, 0xc4, 0x01, 0xaa]);

    let ts = Value::Timestamp(Timestamp::new(1, 2).unwrap());
    let bytes = to_vec(&ts).unwrap();
    assert_eq!(bytes, vec![0x92, 0x01, 0x02]);
}

#[test]
fn test_custom_value_needs_codec() {
    let value = Value::Custom(crate::Custom::new(5u8));
    assert!(to_vec(&value).is_err());
    assert_eq!(
        encode(&value).unwrap_err().kind(),
        ErrorKind::UnsupportedValue
    );
}

#[test]
fn test_decode_rejects_trailing_and_truncated() {
    assert_eq!(decode(&[0x01, 0x02]), Err(Error::TrailingBytes(1)));
    assert_eq!(decode(&[0x92, 0x01]), Err(Error::InsufficientData));
    assert_eq!(decode(&[]), Err(Error::InsufficientData));
}

#[test]
fn test_decode_multi_in_order() {
    let mut bytes = encode(&msgpack!("A")).unwrap();
    bytes.extend(encode(&msgpack!("B")).unwrap());
    bytes.extend(encode(&msgpack!("C")).unwrap());

    let values: Vec<Value> = decode_multi(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(values, vec![msgpack!("A"), msgpack!("B"), msgpack!("C")]);
}

#[test]
fn test_decode_stream_entry_points() {
    let bytes = encode(&msgpack!([1, {"k": "v"}])).unwrap();
    assert_eq!(
        decode_stream(bytes.as_slice()).unwrap(),
        msgpack!([1, {"k": "v"}])
    );

    let items: Vec<Value> = decode_array_stream(bytes.as_slice())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(items, vec![msgpack!(1), msgpack!({"k": "v"})]);

    let mut two = bytes.clone();
    two.extend_from_slice(&bytes);
    assert_eq!(decode_multi_stream(two.as_slice()).count(), 2);
}

#[cfg(feature = "async")]
#[test]
fn test_decode_async_entry_point() {
    let bytes = encode(&msgpack!({"x": [true, false]})).unwrap();
    let reader = futures::io::Cursor::new(bytes);
    let value = futures::executor::block_on(crate::decode_async(reader)).unwrap();
    assert_eq!(value, msgpack!({"x": [true, false]}));
}
