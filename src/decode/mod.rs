//! Decode Engine
//!
//! This module turns a dynamically shaped [`Value`] into caller supplied,
//! statically typed destinations.
//!
//! ## Destinations
//!
//! A destination is a [`Dest`]: an explicit enum of typed `&mut` references.
//! Ordinary Rust types implement [`Scan`] to describe which kind of slot they
//! are, so callers rarely build a `Dest` by hand:
//!
//! ```text
//! String, Vec<u8>, Bytes, i8..i64, u16..u64, f32, f64, bool  ─> Dest::Scalar
//! Option<T>                                                  ─> Dest::Optional
//! Vec<T>                                                     ─> Dest::Sequence
//! HashMap<K, V>, BTreeMap<K, V>                              ─> Dest::Mapping
//! Value                                                      ─> Dest::Dynamic
//! your type implementing ValueScanner                        ─> Dest::Custom
//! ```
//!
//! ## Shape Rules
//!
//! | source     | destinations | result                                        |
//! |------------|--------------|-----------------------------------------------|
//! | any        | 0            | `Ok(())`                                      |
//! | `Absent`   | >= 1         | [`Error::Empty`]                              |
//! | `Sequence` | 1 sequence   | element-wise into the sequence                |
//! | `Sequence` | N            | N must equal the length, one element per slot |
//! | `Mapping`  | 1            | into a mapping (or custom/dynamic) slot       |
//! | scalar     | 1            | scalar conversion                             |
//! | non-seq    | > 1          | [`Error::MultiValue`]                         |
//!
//! The destination-count rule is strict on every path: trailing elements are
//! never silently dropped.
//!
//! ## Example
//!
//! ```
//! use keyshape::{dests, decode, Value};
//!
//! let reply = Value::Sequence(vec![Value::from("1"), Value::from("2")]);
//!
//! let mut numbers: Vec<u32> = Vec::new();
//! decode::decode(&reply, dests![numbers]).unwrap();
//! assert_eq!(numbers, vec![1, 2]);
//!
//! let (mut a, mut b) = (0i64, String::new());
//! decode::decode(&reply, dests![a, b]).unwrap();
//! assert_eq!((a, b.as_str()), (1, "2"));
//! ```

mod convert;
mod scan;

use crate::error::{Error, Result};
use crate::value::Value;
use bytes::Bytes;

pub use convert::convert_assign;

/// A destination able to decode any value by itself.
///
/// Custom destinations are always tried first and receive the raw value.
pub trait ValueScanner {
    fn scan_value(&mut self, src: &Value) -> Result<()>;
}

/// A growable sequence destination (implemented for `Vec<T>`).
pub trait SequenceSink {
    /// Empties the destination before elements are pushed.
    fn clear(&mut self);

    /// Decodes one element and appends it.
    fn push_value(&mut self, src: &Value) -> Result<()>;
}

/// A mapping destination (implemented for `HashMap` and `BTreeMap`).
pub trait MappingSink {
    /// Empties the destination before pairs are inserted.
    fn clear(&mut self);

    /// Decodes one key/value pair and inserts it.
    fn insert_value(&mut self, key: &Value, value: &Value) -> Result<()>;
}

/// A nullable destination (implemented for `Option<T>`).
pub trait OptionalSink {
    /// Clears the destination to its empty state.
    fn set_none(&mut self);

    /// Allocates the inner value and decodes into it.
    fn set_from(&mut self, src: &Value) -> Result<()>;

    /// Kind of the wrapped destination.
    fn inner_kind(&self) -> DestKind;
}

/// Coarse classification of a destination, used for shape dispatch and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestKind {
    Scalar(&'static str),
    Sequence,
    Mapping,
    Dynamic,
    Custom,
}

impl DestKind {
    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            DestKind::Scalar(name) => name,
            DestKind::Sequence => "sequence",
            DestKind::Mapping => "mapping",
            DestKind::Dynamic => "dynamic value",
            DestKind::Custom => "custom scanner",
        }
    }

    /// Whether a whole sequence may be decoded into a single slot of this kind.
    fn accepts_sequence(self) -> bool {
        matches!(
            self,
            DestKind::Sequence | DestKind::Mapping | DestKind::Dynamic | DestKind::Custom
        )
    }
}

/// A typed reference to a scalar output location.
pub enum ScalarRef<'a> {
    Text(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Buf(&'a mut Bytes),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    Isize(&'a mut isize),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    Usize(&'a mut usize),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Bool(&'a mut bool),
}

impl ScalarRef<'_> {
    /// Name of the target type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarRef::Text(_) => "String",
            ScalarRef::Bytes(_) => "Vec<u8>",
            ScalarRef::Buf(_) => "Bytes",
            ScalarRef::I8(_) => "i8",
            ScalarRef::I16(_) => "i16",
            ScalarRef::I32(_) => "i32",
            ScalarRef::I64(_) => "i64",
            ScalarRef::Isize(_) => "isize",
            ScalarRef::U16(_) => "u16",
            ScalarRef::U32(_) => "u32",
            ScalarRef::U64(_) => "u64",
            ScalarRef::Usize(_) => "usize",
            ScalarRef::F32(_) => "f32",
            ScalarRef::F64(_) => "f64",
            ScalarRef::Bool(_) => "bool",
        }
    }

    /// Text-like destinations accept every scalar; the rest are parsed.
    fn is_text_like(&self) -> bool {
        matches!(
            self,
            ScalarRef::Text(_) | ScalarRef::Bytes(_) | ScalarRef::Buf(_)
        )
    }
}

/// One output slot of a `scan` call.
pub enum Dest<'a> {
    Scalar(ScalarRef<'a>),
    Optional(&'a mut dyn OptionalSink),
    Sequence(&'a mut dyn SequenceSink),
    Mapping(&'a mut dyn MappingSink),
    Dynamic(&'a mut Value),
    Custom(&'a mut dyn ValueScanner),
}

impl Dest<'_> {
    pub fn kind(&self) -> DestKind {
        match self {
            Dest::Scalar(s) => DestKind::Scalar(s.kind()),
            Dest::Optional(o) => o.inner_kind(),
            Dest::Sequence(_) => DestKind::Sequence,
            Dest::Mapping(_) => DestKind::Mapping,
            Dest::Dynamic(_) => DestKind::Dynamic,
            Dest::Custom(_) => DestKind::Custom,
        }
    }
}

/// Types usable as a decode destination.
///
/// Implement it for your own types by returning [`Dest::Custom`] after
/// implementing [`ValueScanner`]:
///
/// ```
/// use keyshape::decode::{Dest, DestKind, Scan, ValueScanner};
/// use keyshape::{Result, Value};
///
/// #[derive(Default)]
/// struct Flag(bool);
///
/// impl ValueScanner for Flag {
///     fn scan_value(&mut self, src: &Value) -> Result<()> {
///         self.0 = src.as_str() == Some("on");
///         Ok(())
///     }
/// }
///
/// impl Scan for Flag {
///     const KIND: DestKind = DestKind::Custom;
///     fn dest(&mut self) -> Dest<'_> {
///         Dest::Custom(self)
///     }
/// }
/// ```
pub trait Scan {
    const KIND: DestKind;

    fn dest(&mut self) -> Dest<'_>;
}

impl<'a, T: Scan> From<&'a mut T> for Dest<'a> {
    fn from(v: &'a mut T) -> Self {
        v.dest()
    }
}

/// Builds a `&mut [Dest]` list from local variables.
///
/// `dests![a, b]` expands to `&mut [Dest::from(&mut a), Dest::from(&mut b)]`;
/// `dests![]` is the empty list (existence/error check only).
#[macro_export]
macro_rules! dests {
    () => {
        &mut ([] as [$crate::decode::Dest<'_>; 0])
    };
    ($($dst:expr),+ $(,)?) => {
        &mut [$($crate::decode::Dest::from(&mut $dst)),+]
    };
}

/// Decodes `src` into the ordered destination list.
///
/// Zero destinations only surface completion. An absent source with at least
/// one destination is always [`Error::Empty`], whatever the destinations are.
pub fn decode(src: &Value, dests: &mut [Dest<'_>]) -> Result<()> {
    if dests.is_empty() {
        return Ok(());
    }

    match src {
        Value::Absent => Err(Error::Empty),
        Value::Sequence(items) => {
            if dests.len() == 1 && dests[0].kind().accepts_sequence() {
                return convert_assign(&mut dests[0], src);
            }

            if dests.len() != items.len() {
                return Err(Error::MultiValue {
                    shape: src.kind(),
                    destinations: dests.len(),
                });
            }

            for (dest, item) in dests.iter_mut().zip(items) {
                convert_assign(dest, item)?;
            }
            Ok(())
        }
        _ => {
            if dests.len() > 1 {
                return Err(Error::MultiValue {
                    shape: src.kind(),
                    destinations: dests.len(),
                });
            }
            convert_assign(&mut dests[0], src)
        }
    }
}
