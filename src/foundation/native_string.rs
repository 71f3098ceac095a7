use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Owned UTF-16 string that crosses the host boundary.
///
/// Producers always copy into a `NativeString` before handing it over: the
/// source buffer may be mutated or released as soon as the call returns, while
/// the receiver owns the copy until it drops it.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeString {
    units: Box<[u16]>,
}

impl NativeString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a UTF-16 buffer.
    pub fn from_utf16(units: &[u16]) -> Self {
        Self {
            units: units.into(),
        }
    }

    /// Copy an optional buffer coming from the host. A missing or zero-length
    /// buffer is the empty string, never an error.
    pub fn from_raw(units: Option<&[u16]>) -> Self {
        match units {
            Some(units) if !units.is_empty() => Self::from_utf16(units),
            _ => Self::new(),
        }
    }

    /// Length in UTF-16 code units. A supplementary-plane character counts twice.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn as_utf16(&self) -> &[u16] {
        &self.units
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl From<&str> for NativeString {
    fn from(value: &str) -> Self {
        Self {
            units: value.encode_utf16().collect(),
        }
    }
}

impl From<String> for NativeString {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Vec<u16>> for NativeString {
    fn from(units: Vec<u16>) -> Self {
        Self {
            units: units.into_boxed_slice(),
        }
    }
}

impl PartialEq<str> for NativeString {
    fn eq(&self, other: &str) -> bool {
        self.units.iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for NativeString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Well-formed text serializes as a string. Text with an unpaired surrogate
/// has no UTF-8 form and serializes as its array of code units instead.
impl Serialize for NativeString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match String::from_utf16(&self.units) {
            Ok(text) => serializer.serialize_str(&text),
            Err(_) => self.units.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for NativeString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnitsVisitor)
    }
}

struct UnitsVisitor;

impl<'de> Visitor<'de> for UnitsVisitor {
    type Value = NativeString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or an array of UTF-16 code units")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(NativeString::from(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut units = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(unit) = seq.next_element::<u16>()? {
            units.push(unit);
        }
        Ok(NativeString::from(units))
    }
}
