//! The parsed object model the document layer hands to the engine.
//!
//! Objects arrive fully dereferenced: indirect references are the document
//! layer's concern, so a [`Dict`] only ever contains direct values.

use crate::stream::Stream;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

/// A name, used both as dictionary key and as a name value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name(Cow<'static, str>);

impl Name {
    /// Create a new name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The name as a string, without the leading slash of the source syntax.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&'static str> for Name {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// A direct object value.
#[derive(Debug)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Real(f32),
    Name(Name),
    /// A byte string, e.g. an indexed palette lookup table.
    String(Vec<u8>),
    Array(Vec<Object>),
    Stream(Stream),
}

/// Typed extraction out of an [`Object`].
pub trait FromObject: Sized {
    fn from_object(object: &Object) -> Option<Self>;
}

impl FromObject for bool {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromObject for f32 {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Int(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl FromObject for u8 {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Int(i) => u8::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromObject for u16 {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Int(i) => u16::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromObject for u32 {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Int(i) => u32::try_from(*i).ok(),
            Object::Real(r) if *r >= 0.0 && r.fract() == 0.0 => Some(*r as u32),
            _ => None,
        }
    }
}

impl FromObject for Name {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Name(n) => Some(n.clone()),
            _ => None,
        }
    }
}

impl<T: FromObject> FromObject for Vec<T> {
    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::Array(items) => items.iter().map(T::from_object).collect(),
            _ => None,
        }
    }
}

/// A dictionary, mapping name keys to direct objects.
#[derive(Debug, Default)]
pub struct Dict {
    entries: Vec<(Name, Object)>,
}

impl Dict {
    /// Create a new empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the dictionary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<Name>, value: Object) {
        let key = key.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Checks whether the dictionary contains an entry with a specific key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.as_str() == key)
    }

    /// Returns the entry of a key as a specific type.
    pub fn get<T: FromObject>(&self, key: &str) -> Option<T> {
        T::from_object(self.get_raw(key)?)
    }

    /// Return the raw entry for a specific key.
    pub fn get_raw(&self, key: &str) -> Option<&Object> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    /// Remove and return the entry for a specific key.
    pub fn take(&mut self, key: &str) -> Option<Object> {
        let index = self.entries.iter().position(|(k, _)| k.as_str() == key)?;

        Some(self.entries.remove(index).1)
    }
}

/// The keys an image dictionary can carry, with their inline-image
/// abbreviations.
pub mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &str = $e;
        };
    }

    key!(BITS_PER_COMPONENT, "BitsPerComponent");
    key!(BPC, "BPC");
    key!(COLORSPACE, "ColorSpace");
    key!(CS, "CS");
    key!(D, "D");
    key!(DECODE, "Decode");
    key!(H, "H");
    key!(HEIGHT, "Height");
    key!(I, "I");
    key!(IM, "IM");
    key!(IMAGE_MASK, "ImageMask");
    key!(INTERPOLATE, "Interpolate");
    key!(MASK, "Mask");
    key!(MATTE, "Matte");
    key!(SMASK, "SMask");
    key!(W, "W");
    key!(WIDTH, "Width");

    // Color space names.
    key!(CMYK, "CMYK");
    key!(DEVICE_CMYK, "DeviceCMYK");
    key!(DEVICE_GRAY, "DeviceGray");
    key!(DEVICE_RGB, "DeviceRGB");
    key!(G, "G");
    key!(INDEXED, "Indexed");
    key!(RGB, "RGB");
}

#[cfg(test)]
mod tests {
    use super::keys::*;
    use super::*;

    #[test]
    fn typed_get() {
        let mut dict = Dict::new();
        dict.insert(WIDTH, Object::Int(17));
        dict.insert(IMAGE_MASK, Object::Bool(true));
        dict.insert(DECODE, Object::Array(vec![Object::Int(1), Object::Real(0.0)]));

        assert_eq!(dict.get::<u32>(WIDTH), Some(17));
        assert_eq!(dict.get::<bool>(IMAGE_MASK), Some(true));
        assert_eq!(dict.get::<Vec<f32>>(DECODE), Some(vec![1.0, 0.0]));
        assert_eq!(dict.get::<u32>(HEIGHT), None);
    }

    #[test]
    fn mismatched_type_is_none() {
        let mut dict = Dict::new();
        dict.insert(WIDTH, Object::Name("DeviceRGB".into()));

        assert_eq!(dict.get::<u32>(WIDTH), None);
        assert!(dict.get::<Name>(WIDTH).is_some());
    }

    #[test]
    fn insert_replaces() {
        let mut dict = Dict::new();
        dict.insert(HEIGHT, Object::Int(1));
        dict.insert(HEIGHT, Object::Int(2));

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get::<u32>(HEIGHT), Some(2));
    }

    #[test]
    fn take_removes() {
        let mut dict = Dict::new();
        dict.insert(SMASK, Object::Null);

        assert!(matches!(dict.take(SMASK), Some(Object::Null)));
        assert!(dict.take(SMASK).is_none());
        assert!(dict.is_empty());
    }

    #[test]
    fn negative_numbers_do_not_cast() {
        let mut dict = Dict::new();
        dict.insert(WIDTH, Object::Int(-4));

        assert_eq!(dict.get::<u32>(WIDTH), None);
        assert_eq!(dict.get::<f32>(WIDTH), Some(-4.0));
    }
}
