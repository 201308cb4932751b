use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CrystalError;

/// The declared output type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<OutputType>),
    /// Non null type {0}
    NonNull(Box<OutputType>),
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputType::Named(ty) => write!(f, "{ty}"),
            OutputType::List(ty) => write!(f, "[{ty}]"),
            OutputType::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

impl OutputType {
    pub fn named(name: impl Into<String>) -> Self {
        OutputType::Named(name.into())
    }

    pub fn list(inner: OutputType) -> Self {
        OutputType::List(Box::new(inner))
    }

    pub fn non_null(inner: OutputType) -> Self {
        OutputType::NonNull(Box::new(inner))
    }

    /// return the name of the type at the bottom of the list/non-null nesting
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn named_type(&self) -> &str {
        match self {
            OutputType::Named(name) => name.as_str(),
            OutputType::List(inner) | OutputType::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, OutputType::NonNull(_))
    }

    /// The type with its outermost non-null wrapper removed.
    pub fn nullable(&self) -> &OutputType {
        match self {
            OutputType::NonNull(inner) => inner,
            ty => ty,
        }
    }
}

impl FromStr for OutputType {
    type Err = CrystalError;

    /// Parses GraphQL type reference syntax such as `[User!]!`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_suffix('!') {
            let inner: OutputType = inner.parse()?;
            if inner.is_non_null() {
                return Err(invalid_type(s));
            }
            return Ok(OutputType::non_null(inner));
        }
        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| invalid_type(s))?;
            return Ok(OutputType::list(inner.parse()?));
        }
        let is_name = s
            .chars()
            .next()
            .map(|first| first.is_ascii_alphabetic() || first == '_')
            .unwrap_or(false)
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_name {
            Ok(OutputType::named(s))
        } else {
            Err(invalid_type(s))
        }
    }
}

fn invalid_type(s: &str) -> CrystalError {
    CrystalError::Schema {
        reason: format!("'{s}' is not a valid type reference"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_type() {
        let ty: OutputType = "[[User!]]!".parse().unwrap();
        assert_eq!(
            ty,
            OutputType::non_null(OutputType::list(OutputType::list(OutputType::non_null(
                OutputType::named("User")
            ))))
        );
        assert_eq!(ty.to_string(), "[[User!]]!");
        assert_eq!(ty.named_type(), "User");
        assert!(ty.is_non_null());
        assert!(!ty.nullable().is_non_null());
    }

    #[test]
    fn reject_malformed_types() {
        for source in ["", "[User", "User!!", "1User", "Us er"] {
            assert!(
                source.parse::<OutputType>().is_err(),
                "{source:?} should not parse"
            );
        }
    }
}
