//! Property accessors
//!
//! Accessors are plain function pointers generated at compile time by the
//! [`field_accessor!`](crate::field_accessor) and
//! [`token_accessor!`](crate::token_accessor) macros. The merge engine reads
//! and writes fields through them without knowing the record's layout.

use crate::token::ConcurrencyToken;
use crate::value::FieldValue;
use std::fmt;

/// Get/copy pair for one field of `E`.
pub struct FieldAccessor<E> {
    name: &'static str,
    get: fn(&E) -> FieldValue,
    copy: fn(&E, &mut E),
}

impl<E> FieldAccessor<E> {
    pub const fn new(name: &'static str, get: fn(&E) -> FieldValue, copy: fn(&E, &mut E)) -> Self {
        Self { name, get, copy }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the field
    pub fn get(&self, entity: &E) -> FieldValue {
        (self.get)(entity)
    }

    /// Write `from`'s value of this field into `to`
    pub fn copy(&self, from: &E, to: &mut E) {
        (self.copy)(from, to)
    }
}

impl<E> Clone for FieldAccessor<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldAccessor<E> {}

impl<E> fmt::Debug for FieldAccessor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldAccessor").field(&self.name).finish()
    }
}

/// Read accessor for a record's concurrency token.
pub struct TokenAccessor<E> {
    name: &'static str,
    get: fn(&E) -> Option<&ConcurrencyToken>,
}

impl<E> TokenAccessor<E> {
    pub const fn new(name: &'static str, get: fn(&E) -> Option<&ConcurrencyToken>) -> Self {
        Self { name, get }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<'a>(&self, entity: &'a E) -> Option<&'a ConcurrencyToken> {
        (self.get)(entity)
    }
}

impl<E> Clone for TokenAccessor<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TokenAccessor<E> {}

impl<E> fmt::Debug for TokenAccessor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenAccessor").field(&self.name).finish()
    }
}

/// Build a [`FieldAccessor`] for `Type.field`.
///
/// The field type must be `Clone` and convertible into
/// [`FieldValue`](crate::FieldValue).
#[macro_export]
macro_rules! field_accessor {
    ($ty:ty, $field:ident) => {{
        fn get(entity: &$ty) -> $crate::FieldValue {
            $crate::FieldValue::from(entity.$field.clone())
        }
        fn copy(from: &$ty, to: &mut $ty) {
            to.$field = from.$field.clone();
        }
        $crate::FieldAccessor::<$ty>::new(stringify!($field), get, copy)
    }};
}

/// Build a [`TokenAccessor`] for an `Option<ConcurrencyToken>` field.
#[macro_export]
macro_rules! token_accessor {
    ($ty:ty, $field:ident) => {{
        fn get(entity: &$ty) -> ::std::option::Option<&$crate::ConcurrencyToken> {
            entity.$field.as_ref()
        }
        $crate::TokenAccessor::<$ty>::new(stringify!($field), get)
    }};
}

#[cfg(test)]
mod tests {
    use crate::{ConcurrencyToken, FieldValue};

    #[derive(Debug, Clone, Default)]
    struct Row {
        score: Option<f64>,
        label: String,
        version: Option<ConcurrencyToken>,
    }

    #[test]
    fn test_field_accessor_get_and_copy() {
        let score = field_accessor!(Row, score);
        let label = field_accessor!(Row, label);
        let from = Row { score: Some(1.5), label: "a".into(), version: None };
        let mut to = Row::default();

        assert_eq!(score.name(), "score");
        assert_eq!(score.get(&from), FieldValue::Float(1.5));
        assert_eq!(score.get(&to), FieldValue::Null);

        score.copy(&from, &mut to);
        label.copy(&from, &mut to);
        assert_eq!(to.score, Some(1.5));
        assert_eq!(to.label, "a");
    }

    #[test]
    fn test_token_accessor() {
        let token = token_accessor!(Row, version);
        let row = Row { version: Some(ConcurrencyToken::from_u64(9)), ..Row::default() };
        assert_eq!(token.name(), "version");
        assert_eq!(token.get(&row), Some(&ConcurrencyToken::from_u64(9)));
        assert_eq!(token.get(&Row::default()), None);
    }
}
