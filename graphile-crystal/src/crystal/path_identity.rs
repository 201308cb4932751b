use std::borrow::Borrow;
use std::fmt;
use std::fmt::Write;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::CrystalError;
use crate::resolver::ResolvePath;

/// The path identity of the operation root; every other identity starts with it.
pub const ROOT_PATH: &str = "~";

/// A position in the response shape with list indices elided.
///
/// Two fields are interchangeable for planning purposes iff their path
/// identities match, e.g. `~>Query.users>User.posts`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathIdentity(Arc<str>);

impl PathIdentity {
    pub fn root() -> Self {
        PathIdentity(Arc::from(ROOT_PATH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT_PATH
    }

    /// The identity of field `field_name` selected on `type_name` below this position.
    pub fn child(&self, type_name: &str, field_name: &str) -> PathIdentity {
        PathIdentity::from(format!("{}>{type_name}.{field_name}", self.0))
    }
}

impl Borrow<str> for PathIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for PathIdentity {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathIdentity {
    fn from(value: &str) -> Self {
        PathIdentity(Arc::from(value))
    }
}

impl From<String> for PathIdentity {
    fn from(value: String) -> Self {
        PathIdentity(Arc::from(value))
    }
}

/// Converts an execution path into its path identity.
pub fn path_to_path_identity(path: &ResolvePath) -> Result<PathIdentity, CrystalError> {
    let mut identity = String::new();
    write_path_identity(path, &mut identity)?;
    Ok(PathIdentity::from(identity))
}

fn write_path_identity(path: &ResolvePath, out: &mut String) -> Result<(), CrystalError> {
    // Skip over list keys.
    let Some(typename) = &path.typename else {
        let prev = path.prev.as_deref().ok_or(CrystalError::InvalidPath)?;
        return write_path_identity(prev, out);
    };
    match path.prev.as_deref() {
        Some(prev) => write_path_identity(prev, out)?,
        None => out.push_str(ROOT_PATH),
    }
    write!(out, ">{typename}.{}", path.key).map_err(|_| CrystalError::InvalidPath)
}
