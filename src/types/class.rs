//! # Schema Classes
//!
//! A `Class` describes the shape of the values a user stores: a named
//! primitive, a named string, or a named struct composed of other classes.
//! Classes are identified by their canonical string: two classes are the
//! same schema exactly when their canonical strings are equal.
//!
//! ## Canonical form
//!
//! ```text
//! primitive   _int@age_        _unsignedlong@money_        _bool@male_
//! string      _string@name_
//! struct      _struct@person_<_string@name__int@age_>
//! ```
//!
//! A struct wraps the concatenated canonical forms of its fields in
//! `<`...`>`. Because `_`, `@`, `<` and `>` structure the encoding, the
//! identifier grammar excludes them: an identifier is an ASCII letter
//! followed by ASCII letters and digits. Anything else is rejected at
//! construction with `DbError::Type`, which keeps every canonical string
//! unambiguous.

use eyre::Result;

use crate::error::DbError;

/// Machine kinds a primitive field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// 32-bit signed integer, canonical kind `int`.
    Int,
    /// 64-bit unsigned integer, canonical kind `unsignedlong`.
    UnsignedLong,
    /// Single byte, canonical kind `bool`.
    Bool,
}

impl PrimitiveKind {
    pub fn kind_str(&self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::UnsignedLong => "unsignedlong",
            PrimitiveKind::Bool => "bool",
        }
    }

    /// Serialized size of a value of this kind.
    pub fn value_size(&self) -> usize {
        match self {
            PrimitiveKind::Int => 4,
            PrimitiveKind::UnsignedLong => 8,
            PrimitiveKind::Bool => 1,
        }
    }
}

/// A user-declared schema: primitive, string, or struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Class {
    Primitive { kind: PrimitiveKind, name: String },
    String { name: String },
    Struct { name: String, fields: Vec<Class> },
}

impl Class {
    pub fn primitive(kind: PrimitiveKind, name: &str) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Class::Primitive {
            kind,
            name: name.to_string(),
        })
    }

    pub fn string(name: &str) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Class::String {
            name: name.to_string(),
        })
    }

    pub fn structure(name: &str, fields: Vec<Class>) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Class::Struct {
            name: name.to_string(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Class::Primitive { name, .. } | Class::String { name } | Class::Struct { name, .. } => {
                name
            }
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Class::Primitive { kind, .. } => kind.kind_str(),
            Class::String { .. } => "string",
            Class::Struct { .. } => "struct",
        }
    }

    /// The canonical string: the class's identity.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Class::Primitive { kind, name } => {
                out.push('_');
                out.push_str(kind.kind_str());
                out.push('@');
                out.push_str(name);
                out.push('_');
            }
            Class::String { name } => {
                out.push_str("_string@");
                out.push_str(name);
                out.push('_');
            }
            Class::Struct { name, fields } => {
                out.push_str("_struct@");
                out.push_str(name);
                out.push_str("_<");
                for field in fields {
                    field.write_canonical(out);
                }
                out.push('>');
            }
        }
    }
}

/// Accepts an ASCII letter followed by ASCII letters and digits.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric()),
        None => false,
    };

    if !valid {
        return Err(DbError::Type(format!("invalid identifier: '{}'", name)).into());
    }
    Ok(())
}
