//! Types related to GraphQL responses and errors.

use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// Trait used to get extension type from an error.
pub trait ErrorExtension
where
    Self: Sized,
{
    /// The `code` reported in the error's `extensions`.
    fn extension_code(&self) -> String;
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

impl Error {
    /// Builds an error, setting `extensions.code` when a code is given.
    pub fn new(message: impl Into<String>, path: Option<Path>, code: Option<String>) -> Self {
        let mut extensions = Object::new();
        if let Some(code) = code {
            extensions.insert("code".to_string(), Value::String(code));
        }
        Self {
            message: message.into(),
            path,
            extensions,
        }
    }

    /// The `code` stored in the extensions, if any.
    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(Value::as_str)
    }
}

/// A GraphQL response.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data, `None` when the operation failed before execution.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The errors collected while executing, in the order they were raised.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,
}

impl Response {
    pub fn from_errors(errors: Vec<Error>) -> Self {
        Self { data: None, errors }
    }

    /// Errors located at `path`.
    pub fn errors_at(&self, path: &Path) -> Vec<&Error> {
        self.errors
            .iter()
            .filter(|error| error.path.as_ref() == Some(path))
            .collect()
    }
}
