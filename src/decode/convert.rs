//! Single value conversion.
//!
//! [`convert_assign`] decodes exactly one value into exactly one destination.
//! Resolution order, first match wins:
//!
//! 1. custom scanners get the raw value
//! 2. dynamic slots take a detached copy of whatever arrived
//! 3. optional slots are cleared on absent, otherwise filled and recursed into
//! 4. sequences and mappings decode element-wise
//! 5. absent into a scalar: `NullToNonNullable` for numbers/booleans,
//!    `Empty` for text-like slots
//! 6. text-like slots copy text/bytes or take the canonical text form
//! 7. numbers and booleans are parsed from the canonical text form with the
//!    width of the target type
//!
//! Anything else is `UnsupportedShape`.

use super::{Dest, ScalarRef};
use crate::error::{ConversionError, Error, Result};
use crate::value::Value;
use bytes::Bytes;
use std::fmt::Display;
use std::str::FromStr;

/// Decodes one value into one destination.
pub fn convert_assign(dest: &mut Dest<'_>, src: &Value) -> Result<()> {
    match dest {
        Dest::Custom(scanner) => scanner.scan_value(src),
        Dest::Dynamic(slot) => {
            **slot = detach(src);
            Ok(())
        }
        Dest::Optional(slot) => {
            if src.is_absent() {
                slot.set_none();
                Ok(())
            } else {
                slot.set_from(src)
            }
        }
        Dest::Sequence(sink) => match src {
            Value::Sequence(items) => {
                sink.clear();
                for item in items {
                    sink.push_value(item)?;
                }
                Ok(())
            }
            Value::Absent => Err(Error::Empty),
            other => Err(unsupported(other, "sequence")),
        },
        Dest::Mapping(sink) => match src {
            Value::Mapping(pairs) => {
                sink.clear();
                for (key, value) in pairs {
                    sink.insert_value(key, value)?;
                }
                Ok(())
            }
            // RESP3 servers answer ZRANGE .. WITHSCORES with [member, score] pairs
            Value::Sequence(items) if !items.is_empty() && items.iter().all(|i| as_pair(i).is_some()) => {
                sink.clear();
                for (key, value) in items.iter().filter_map(as_pair) {
                    sink.insert_value(key, value)?;
                }
                Ok(())
            }
            // RESP2 servers answer HGETALL and friends with flat key/value arrays
            Value::Sequence(items) if items.len() % 2 == 0 => {
                sink.clear();
                for pair in items.chunks_exact(2) {
                    sink.insert_value(&pair[0], &pair[1])?;
                }
                Ok(())
            }
            Value::Absent => Err(Error::Empty),
            other => Err(unsupported(other, "mapping")),
        },
        Dest::Scalar(scalar) => convert_scalar(scalar, src),
    }
}

fn convert_scalar(dest: &mut ScalarRef<'_>, src: &Value) -> Result<()> {
    if !src.is_scalar() {
        return match src {
            Value::Absent if dest.is_text_like() => Err(Error::Empty),
            Value::Absent => Err(ConversionError::NullToNonNullable { kind: dest.kind() }.into()),
            other => Err(unsupported(other, dest.kind())),
        };
    }

    match dest {
        ScalarRef::Text(d) => {
            **d = match src {
                Value::Text(s) => s.clone(),
                Value::Bytes(b) => String::from_utf8(b.to_vec()).map_err(|e| {
                    ConversionError::Parse {
                        text: String::from_utf8_lossy(b).into_owned(),
                        kind: "String",
                        reason: e.to_string(),
                    }
                })?,
                other => other.as_string(),
            };
        }
        ScalarRef::Bytes(d) => **d = canonical_bytes(src),
        ScalarRef::Buf(d) => **d = Bytes::from(canonical_bytes(src)),
        ScalarRef::Bool(d) => **d = parse_bool(src)?,
        ScalarRef::I8(d) => **d = parse_number(src, "i8")?,
        ScalarRef::I16(d) => **d = parse_number(src, "i16")?,
        ScalarRef::I32(d) => **d = parse_number(src, "i32")?,
        ScalarRef::I64(d) => **d = parse_number(src, "i64")?,
        ScalarRef::Isize(d) => **d = parse_number(src, "isize")?,
        ScalarRef::U16(d) => **d = parse_number(src, "u16")?,
        ScalarRef::U32(d) => **d = parse_number(src, "u32")?,
        ScalarRef::U64(d) => **d = parse_number(src, "u64")?,
        ScalarRef::Usize(d) => **d = parse_number(src, "usize")?,
        ScalarRef::F32(d) => {
            **d = match src {
                Value::Float(f) => check_finite(*f as f32, *f, "f32")?,
                other => parse_float::<f32>(other, "f32", |f| f.is_infinite())?,
            }
        }
        ScalarRef::F64(d) => {
            **d = match src {
                Value::Float(f) => *f,
                other => parse_float::<f64>(other, "f64", |f| f.is_infinite())?,
            }
        }
    }

    Ok(())
}

/// Fresh byte buffer for a scalar; never shares the transport's allocation.
fn canonical_bytes(src: &Value) -> Vec<u8> {
    src.as_bytes().unwrap_or_default()
}

/// Deep copy with every byte payload moved into its own allocation.
fn detach(src: &Value) -> Value {
    match src {
        Value::Bytes(b) => Value::Bytes(Bytes::copy_from_slice(b)),
        Value::Sequence(items) => Value::Sequence(items.iter().map(detach).collect()),
        Value::Mapping(pairs) => Value::Mapping(
            pairs
                .iter()
                .map(|(k, v)| (detach(k), detach(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A two element sequence seen as a key/value pair.
fn as_pair(item: &Value) -> Option<(&Value, &Value)> {
    match item {
        Value::Sequence(pair) if pair.len() == 2 => Some((&pair[0], &pair[1])),
        _ => None,
    }
}

fn unsupported(src: &Value, to: &'static str) -> Error {
    ConversionError::UnsupportedShape {
        from: src.kind(),
        to,
    }
    .into()
}

fn parse_error(text: String, kind: &'static str, reason: impl Display) -> Error {
    ConversionError::Parse {
        text,
        kind,
        reason: reason.to_string(),
    }
    .into()
}

fn parse_number<T>(src: &Value, kind: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text = src.as_string();
    text.parse::<T>().map_err(|e| parse_error(text, kind, e))
}

fn parse_float<T>(src: &Value, kind: &'static str, is_infinite: fn(&T) -> bool) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text = src.as_string();
    let value = text
        .parse::<T>()
        .map_err(|e| parse_error(text.clone(), kind, e))?;

    if is_infinite(&value) && !text.to_ascii_lowercase().contains("inf") {
        return Err(parse_error(text, kind, "value out of range"));
    }

    Ok(value)
}

fn check_finite(narrowed: f32, original: f64, kind: &'static str) -> Result<f32> {
    if narrowed.is_infinite() && original.is_finite() {
        return Err(parse_error(original.to_string(), kind, "value out of range"));
    }
    Ok(narrowed)
}

/// Boolean parsing: booleans, the integers 0/1 and the usual spellings of
/// true/false.
fn parse_bool(src: &Value) -> Result<bool> {
    match src {
        Value::Bool(b) => Ok(*b),
        Value::Int(1) | Value::UInt(1) => Ok(true),
        Value::Int(0) | Value::UInt(0) => Ok(false),
        Value::Int(_) | Value::UInt(_) | Value::Float(_) => Err(parse_error(
            src.as_string(),
            "bool",
            "value out of range",
        )),
        _ => {
            let text = src.as_string();
            match text.as_str() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                _ => Err(parse_error(text, "bool", "invalid syntax")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Scan;

    fn convert<T: Scan>(dest: &mut T, src: Value) -> Result<()> {
        convert_assign(&mut dest.dest(), &src)
    }

    #[test]
    fn test_text_round_trips() {
        let mut s = String::new();
        convert(&mut s, Value::from("hello")).unwrap();
        assert_eq!(s, "hello");

        convert(&mut s, Value::Bytes(Bytes::from("bytes"))).unwrap();
        assert_eq!(s, "bytes");

        convert(&mut s, Value::Int(12)).unwrap();
        assert_eq!(s, "12");

        convert(&mut s, Value::Float(0.25)).unwrap();
        assert_eq!(s, "0.25");

        convert(&mut s, Value::Bool(false)).unwrap();
        assert_eq!(s, "false");
    }

    #[test]
    fn test_invalid_utf8_into_string() {
        let mut s = String::new();
        let err = convert(&mut s, Value::Bytes(Bytes::from_static(&[0xff, 0xfe]))).unwrap_err();
        assert!(matches!(
            err,
            Error::Conversion(ConversionError::Parse { kind: "String", .. })
        ));
    }

    #[test]
    fn test_bytes_are_copied_not_shared() {
        let src = Bytes::from(vec![1u8, 2, 3]);
        let mut out = Bytes::new();
        convert(&mut out, Value::Bytes(src.clone())).unwrap();

        assert_eq!(out, src);
        assert_ne!(out.as_ptr(), src.as_ptr());

        let mut dynamic = Value::Absent;
        convert(&mut dynamic, Value::Bytes(src.clone())).unwrap();
        match dynamic {
            Value::Bytes(b) => assert_ne!(b.as_ptr(), src.as_ptr()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_numbers_into_bytes() {
        let mut out: Vec<u8> = Vec::new();
        convert(&mut out, Value::Int(-5)).unwrap();
        assert_eq!(out, b"-5");
    }

    #[test]
    fn test_integer_width_is_enforced() {
        let mut small = 0i8;
        convert(&mut small, Value::Int(127)).unwrap();
        assert_eq!(small, 127);

        let err = convert(&mut small, Value::Int(128)).unwrap_err();
        assert!(matches!(
            err,
            Error::Conversion(ConversionError::Parse { ref text, kind: "i8", .. }) if text == "128"
        ));

        let mut unsigned = 0u32;
        assert!(convert(&mut unsigned, Value::from("-1")).is_err());
        convert(&mut unsigned, Value::Bytes(Bytes::from("4294967295"))).unwrap();
        assert_eq!(unsigned, u32::MAX);
    }

    #[test]
    fn test_parse_failure_carries_text() {
        let mut n = 0i64;
        let err = convert(&mut n, Value::from("abc")).unwrap_err();
        match err {
            Error::Conversion(ConversionError::Parse { text, kind, .. }) => {
                assert_eq!(text, "abc");
                assert_eq!(kind, "i64");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_floats() {
        let mut f = 0f64;
        convert(&mut f, Value::from("3.5")).unwrap();
        assert_eq!(f, 3.5);

        convert(&mut f, Value::from("-inf")).unwrap();
        assert_eq!(f, f64::NEG_INFINITY);

        let mut narrow = 0f32;
        assert!(convert(&mut narrow, Value::from("1e300")).is_err());
        assert!(convert(&mut narrow, Value::Float(1e300)).is_err());
        convert(&mut narrow, Value::Int(2)).unwrap();
        assert_eq!(narrow, 2.0);
    }

    #[test]
    fn test_booleans() {
        let mut b = false;
        convert(&mut b, Value::Int(1)).unwrap();
        assert!(b);
        convert(&mut b, Value::from("false")).unwrap();
        assert!(!b);
        convert(&mut b, Value::Bytes(Bytes::from("t"))).unwrap();
        assert!(b);
        assert!(convert(&mut b, Value::Int(2)).is_err());
        assert!(convert(&mut b, Value::from("yes")).is_err());
    }

    #[test]
    fn test_absent_into_numbers_is_null_error() {
        let mut n = 0u64;
        let err = convert(&mut n, Value::Absent).unwrap_err();
        assert!(matches!(
            err,
            Error::Conversion(ConversionError::NullToNonNullable { kind: "u64" })
        ));

        let mut s = String::new();
        assert!(matches!(convert(&mut s, Value::Absent), Err(Error::Empty)));
    }

    #[test]
    fn test_optional_is_cleared_or_filled() {
        let mut o: Option<i32> = Some(3);
        convert(&mut o, Value::Absent).unwrap();
        assert_eq!(o, None);

        convert(&mut o, Value::from("9")).unwrap();
        assert_eq!(o, Some(9));

        let mut nested: Option<Option<String>> = None;
        convert(&mut nested, Value::from("x")).unwrap();
        assert_eq!(nested, Some(Some("x".to_string())));
    }

    #[test]
    fn test_sequence_elements_with_nil() {
        let src = Value::Sequence(vec![Value::from("a"), Value::Absent]);

        let mut optional: Vec<Option<String>> = Vec::new();
        convert(&mut optional, src.clone()).unwrap();
        assert_eq!(optional, vec![Some("a".to_string()), None]);

        let mut strict: Vec<String> = Vec::new();
        assert!(matches!(convert(&mut strict, src), Err(Error::Empty)));
    }

    #[test]
    fn test_flat_pairs_into_mapping() {
        let src = Value::Sequence(vec![
            Value::from("f1"),
            Value::from("1"),
            Value::from("f2"),
            Value::from("2"),
        ]);
        let mut map = std::collections::BTreeMap::<String, u16>::new();
        convert(&mut map, src).unwrap();
        assert_eq!(map.get("f2"), Some(&2));

        let odd = Value::Sequence(vec![Value::from("lonely")]);
        assert!(matches!(
            convert(&mut map, odd),
            Err(Error::Conversion(ConversionError::UnsupportedShape {
                from: "sequence",
                to: "mapping"
            }))
        ));
    }

    #[test]
    fn test_nested_pairs_into_mapping() {
        let src = Value::Sequence(vec![
            Value::Sequence(vec![Value::from("a"), Value::Float(1.5)]),
            Value::Sequence(vec![Value::from("b"), Value::Float(2.0)]),
        ]);
        let mut map = std::collections::HashMap::<String, f64>::new();
        convert(&mut map, src).unwrap();
        assert_eq!(map.get("a"), Some(&1.5));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_scalar_into_sequence_is_unsupported() {
        let mut list: Vec<String> = Vec::new();
        assert!(matches!(
            convert(&mut list, Value::Int(1)),
            Err(Error::Conversion(ConversionError::UnsupportedShape {
                from: "integer",
                to: "sequence"
            }))
        ));
    }
}
