//! CWL type specifiers (C2): parses `type:` strings into a structural form
//! and answers nullability/optionality questions used by the command
//! builder and the analyzer's required-input check.

use serde::{Deserialize, Serialize};

/// A parsed CWL type specifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSpec {
    Scalar(String),
    Array(Box<TypeSpec>),
    /// `T?` sugar, or an explicit `[T, "null"]` union.
    Nullable(Box<TypeSpec>),
    /// A union of more than one non-null type, e.g. `[File, string]`.
    Union(Vec<TypeSpec>),
    Record(Vec<(String, TypeSpec)>),
    Enum(Vec<String>),
}

impl TypeSpec {
    /// Parses a type specifier string such as `File`, `File?`, `File[]`,
    /// `string[]?`. Record/array/enum *object* forms (with their own
    /// `fields`/`symbols`/`items` keys) are parsed by
    /// [`TypeSpec::parse_object`], not here.
    pub fn parse(spec: &str) -> TypeSpec {
        let spec = spec.trim();
        if let Some(inner) = spec.strip_suffix('?') {
            return TypeSpec::Nullable(Box::new(TypeSpec::parse(inner)));
        }
        if let Some(inner) = spec.strip_suffix("[]") {
            return TypeSpec::Array(Box::new(TypeSpec::parse(inner)));
        }
        TypeSpec::Scalar(spec.to_string())
    }

    /// Whether `null` is an accepted value for this type.
    pub fn is_nullable(&self) -> bool {
        match self {
            TypeSpec::Nullable(_) => true,
            TypeSpec::Union(members) => members.iter().any(|m| matches!(m, TypeSpec::Scalar(s) if s == "null")),
            _ => false,
        }
    }

    /// A parameter is optional if its type is nullable or it carries a
    /// default value (default handling is the caller's responsibility; this
    /// only answers the type-level half of "IsOptional").
    pub fn is_optional(&self) -> bool {
        self.is_nullable()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeSpec::Array(_))
    }

    /// Strips one level of `Nullable` wrapping, if present.
    pub fn underlying(&self) -> &TypeSpec {
        match self {
            TypeSpec::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn scalar_name(&self) -> Option<&str> {
        match self.underlying() {
            TypeSpec::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_file_or_directory(&self) -> bool {
        matches!(self.scalar_name(), Some("File") | Some("Directory"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar() {
        assert_eq!(TypeSpec::parse("File"), TypeSpec::Scalar("File".into()));
    }

    #[test]
    fn parses_optional_array() {
        let t = TypeSpec::parse("string[]?");
        assert!(t.is_nullable());
        match t {
            TypeSpec::Nullable(inner) => assert!(inner.is_array()),
            _ => panic!("expected nullable wrapper"),
        }
    }

    #[test]
    fn array_of_scalar_is_not_nullable() {
        let t = TypeSpec::parse("File[]");
        assert!(!t.is_nullable());
        assert!(t.is_array());
    }

    #[test]
    fn file_or_directory_detection_through_nullable() {
        let t = TypeSpec::parse("File?");
        assert!(t.is_file_or_directory());
    }
}
