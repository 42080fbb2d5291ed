//! [`Scan`] implementations for standard library types.
//!
//! `u8` is not a destination on its own: `Vec<u8>` is a byte
//! string, not a sequence of numbers.

use super::{convert_assign, Dest, DestKind, MappingSink, OptionalSink, ScalarRef, Scan, SequenceSink};
use crate::error::Result;
use crate::value::Value;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

macro_rules! impl_scan_scalar {
    ($($t:ty => $variant:ident, $name:literal);* $(;)?) => {
        $(
            impl Scan for $t {
                const KIND: DestKind = DestKind::Scalar($name);

                fn dest(&mut self) -> Dest<'_> {
                    Dest::Scalar(ScalarRef::$variant(self))
                }
            }
        )*
    };
}

impl_scan_scalar! {
    String => Text, "String";
    Vec<u8> => Bytes, "Vec<u8>";
    Bytes => Buf, "Bytes";
    i8 => I8, "i8";
    i16 => I16, "i16";
    i32 => I32, "i32";
    i64 => I64, "i64";
    isize => Isize, "isize";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
    usize => Usize, "usize";
    f32 => F32, "f32";
    f64 => F64, "f64";
    bool => Bool, "bool";
}

impl Scan for Value {
    const KIND: DestKind = DestKind::Dynamic;

    fn dest(&mut self) -> Dest<'_> {
        Dest::Dynamic(self)
    }
}

impl<T: Scan + Default> Scan for Option<T> {
    const KIND: DestKind = T::KIND;

    fn dest(&mut self) -> Dest<'_> {
        Dest::Optional(self)
    }
}

impl<T: Scan + Default> OptionalSink for Option<T> {
    fn set_none(&mut self) {
        *self = None;
    }

    fn set_from(&mut self, src: &Value) -> Result<()> {
        let mut inner = T::default();
        convert_assign(&mut inner.dest(), src)?;
        *self = Some(inner);
        Ok(())
    }

    fn inner_kind(&self) -> DestKind {
        T::KIND
    }
}

impl<T: Scan + Default> Scan for Vec<T> {
    const KIND: DestKind = DestKind::Sequence;

    fn dest(&mut self) -> Dest<'_> {
        Dest::Sequence(self)
    }
}

impl<T: Scan + Default> SequenceSink for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_value(&mut self, src: &Value) -> Result<()> {
        let mut item = T::default();
        convert_assign(&mut item.dest(), src)?;
        self.push(item);
        Ok(())
    }
}

fn decode_pair<K, V>(key: &Value, value: &Value) -> Result<(K, V)>
where
    K: Scan + Default,
    V: Scan + Default,
{
    let mut k = K::default();
    let mut v = V::default();
    convert_assign(&mut k.dest(), key)?;
    convert_assign(&mut v.dest(), value)?;
    Ok((k, v))
}

impl<K, V> Scan for HashMap<K, V>
where
    K: Scan + Default + Eq + Hash,
    V: Scan + Default,
{
    const KIND: DestKind = DestKind::Mapping;

    fn dest(&mut self) -> Dest<'_> {
        Dest::Mapping(self)
    }
}

impl<K, V> MappingSink for HashMap<K, V>
where
    K: Scan + Default + Eq + Hash,
    V: Scan + Default,
{
    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn insert_value(&mut self, key: &Value, value: &Value) -> Result<()> {
        let (k, v) = decode_pair::<K, V>(key, value)?;
        self.insert(k, v);
        Ok(())
    }
}

impl<K, V> Scan for BTreeMap<K, V>
where
    K: Scan + Default + Ord,
    V: Scan + Default,
{
    const KIND: DestKind = DestKind::Mapping;

    fn dest(&mut self) -> Dest<'_> {
        Dest::Mapping(self)
    }
}

impl<K, V> MappingSink for BTreeMap<K, V>
where
    K: Scan + Default + Ord,
    V: Scan + Default,
{
    fn clear(&mut self) {
        BTreeMap::clear(self);
    }

    fn insert_value(&mut self, key: &Value, value: &Value) -> Result<()> {
        let (k, v) = decode_pair::<K, V>(key, value)?;
        self.insert(k, v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::dests;

    #[test]
    fn test_kinds() {
        assert_eq!(<Vec<u8> as Scan>::KIND, DestKind::Scalar("Vec<u8>"));
        assert_eq!(<Vec<String> as Scan>::KIND, DestKind::Sequence);
        assert_eq!(<Option<i64> as Scan>::KIND, DestKind::Scalar("i64"));
        assert_eq!(<Option<Vec<i64>> as Scan>::KIND, DestKind::Sequence);
        assert_eq!(<HashMap<String, String> as Scan>::KIND, DestKind::Mapping);
        assert_eq!(<Value as Scan>::KIND, DestKind::Dynamic);
    }

    #[test]
    fn test_byte_vec_is_a_scalar() {
        let mut raw: Vec<u8> = Vec::new();
        decode(&Value::Bytes(Bytes::from("abc")), dests![raw]).unwrap();
        assert_eq!(raw, b"abc");
    }

    #[test]
    fn test_nested_sequences() {
        let src = Value::Sequence(vec![
            Value::Sequence(vec![Value::from("a"), Value::from("b")]),
            Value::Sequence(vec![]),
        ]);
        let mut out: Vec<Vec<String>> = Vec::new();
        decode(&src, dests![out]).unwrap();
        assert_eq!(out, vec![vec!["a".to_string(), "b".to_string()], vec![]]);
    }

    #[test]
    fn test_sequence_destination_is_cleared_first() {
        let mut out = vec![1i64, 2, 3];
        decode(&Value::Sequence(vec![Value::Int(9)]), dests![out]).unwrap();
        assert_eq!(out, vec![9]);
    }

    #[test]
    fn test_mapping_with_sequence_values() {
        let src = Value::Mapping(vec![(
            Value::from("scores"),
            Value::Sequence(vec![Value::Float(1.5), Value::Int(2)]),
        )]);
        let mut out: HashMap<String, Vec<f64>> = HashMap::new();
        out.insert("stale".to_string(), vec![]);
        decode(&src, dests![out]).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out["scores"], vec![1.5, 2.0]);
    }

    #[test]
    fn test_mapping_key_failure_propagates() {
        let src = Value::Mapping(vec![(Value::from("not-a-number"), Value::from("v"))]);
        let mut out: BTreeMap<i64, String> = BTreeMap::new();
        assert!(decode(&src, dests![out]).is_err());
    }
}
