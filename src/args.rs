//! Command Arguments
//!
//! Arguments travel through the middleware chain as [`Arg`] values. Most are
//! primitives; [`Arg::Deferred`] wraps a [`Valuer`] that only produces its
//! primitive when the innermost DB is about to transmit the command.

use crate::error::{Error, Result};
use crate::value::{format_float, Value};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A value that must be resolved to a primitive argument before transmission.
pub trait Valuer: Send + Sync {
    /// Produces the primitive form. Failures abort the command before any
    /// transport call is made.
    fn value(&self) -> std::result::Result<Arg, String>;
}

/// One argument of a command invocation.
#[derive(Clone)]
pub enum Arg {
    Text(String),
    Bytes(Bytes),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// Resolved lazily through [`Valuer::value`]
    Deferred(Arc<dyn Valuer>),
}

impl Arg {
    /// Wraps a resolvable value.
    pub fn deferred(v: impl Valuer + 'static) -> Self {
        Arg::Deferred(Arc::new(v))
    }

    /// Resolves a deferred argument to its primitive form.
    ///
    /// Primitives are returned unchanged. A valuer returning another deferred
    /// value is resolved again.
    pub fn resolve(self) -> Result<Arg> {
        let mut arg = self;
        while let Arg::Deferred(valuer) = arg {
            arg = valuer.value().map_err(Error::ArgumentResolution)?;
        }
        Ok(arg)
    }

    /// Canonical wire bytes of a primitive argument.
    ///
    /// Deferred arguments must be resolved first; they render as their
    /// generic placeholder otherwise.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Arg::Bytes(b) => b.clone(),
            Arg::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            other => Bytes::from(other.to_string()),
        }
    }

    /// Converts a primitive argument into the equivalent dynamic value.
    pub fn to_value(&self) -> Value {
        match self {
            Arg::Text(s) => Value::Text(s.clone()),
            Arg::Bytes(b) => Value::Bytes(b.clone()),
            Arg::Int(n) => Value::Int(*n),
            Arg::UInt(n) => Value::UInt(*n),
            Arg::Float(f) => Value::Float(*f),
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Deferred(_) => Value::Text(self.to_string()),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(s) => write!(f, "{}", s),
            Arg::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Arg::Int(n) => write!(f, "{}", n),
            Arg::UInt(n) => write!(f, "{}", n),
            Arg::Float(v) => write!(f, "{}", format_float(*v)),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Deferred(_) => write!(f, "<deferred>"),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Deferred(_) => write!(f, "Deferred(..)"),
            other => write!(f, "{:?}", other.to_string()),
        }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::Deferred(a), Arg::Deferred(b)) => Arc::ptr_eq(a, b),
            (Arg::Deferred(_), _) | (_, Arg::Deferred(_)) => false,
            (a, b) => a.to_bytes() == b.to_bytes(),
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Arg {
                fn from(n: $t) -> Self {
                    Arg::$variant(n as $target)
                }
            }
        )*
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64, u8, u16, u32, u64, usize);

impl From<f32> for Arg {
    fn from(f: f32) -> Self {
        Arg::Float(f as f64)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Text(s.clone())
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg::Bytes(b)
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(b))
    }
}

/// Builds a `Vec<Arg>` from anything convertible into [`Arg`].
///
/// ```
/// use keyshape::args;
/// let args = args!["counter", 10, 1.5];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::Arg::from($arg)),+]
    };
}
