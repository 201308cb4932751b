//! Crystal errors.
use displaydoc::Display;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Path;

/// Boxed error returned by plans and other pluggable collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types raised while executing an operation through its plan graph.
///
/// Every variant is surfaced to clients as a field error through
/// [`CrystalError::to_graphql_error`]; errors are `Clone` so that a single
/// batch failure can be delivered to every field waiting on that batch.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum CrystalError {
    /// path has no `typename` and no `prev`; seems like an invalid path?
    InvalidPath,

    /// could not find a plan id for path '{path_identity}'
    MissingPlan {
        /// The path identity that has no plan.
        path_identity: String,
    },

    /// expected the parent of '{path_identity}' (which returned a non-crystal object) to be a value plan
    UnexpectedParentPlan {
        /// The path identity of the parent field.
        path_identity: String,
    },

    /// crystal object {crystal_object} belongs to another operation
    ForeignCrystalObject {
        /// The printed crystal object.
        crystal_object: String,
    },

    /// the field at '{path_identity}' returned a value incompatible with '{expected}': '{value}'
    ShapeMismatch {
        /// Where the mismatching value was found.
        path_identity: String,
        /// The GraphQL type the value should have matched.
        expected: String,
        /// The offending value.
        value: String,
    },

    /// plan {plan_id} failed: {reason}
    PlanFailed {
        /// The id of the plan within its aether.
        plan_id: usize,
        /// The reason the plan failed.
        reason: String,
    },

    /// plan {plan_id} returned {actual} results for a batch of {expected}
    BatchSizeMismatch {
        plan_id: usize,
        expected: usize,
        actual: usize,
    },

    /// the batch for plan {plan_id} was dropped before it produced a result
    BatchDropped { plan_id: usize },

    /// ETOOMUCHBLING: this resolver is already wrapped in crystals
    AlreadyWrapped,

    /// operation could not be planned: {reason}
    Planning {
        /// The failure reason.
        reason: String,
    },

    /// {message}
    Resolver {
        /// The message raised by the resolver.
        message: String,
    },

    /// cannot return null for non-nullable field {type_name}.{field_name}
    NullViolation {
        type_name: String,
        field_name: String,
    },

    /// invalid schema: {reason}
    Schema {
        /// Why the schema was rejected.
        reason: String,
    },
}

impl CrystalError {
    /// A resolver error carrying `message`.
    pub fn resolver(message: impl Into<String>) -> Self {
        CrystalError::Resolver {
            message: message.into(),
        }
    }

    /// Convert the crystal error to a GraphQL error located at `path`.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        Error::new(self.to_string(), path, Some(self.extension_code()))
    }

    /// Whether the planning and execution phases disagree about the operation's shape.
    pub fn is_internal_consistency(&self) -> bool {
        matches!(
            self,
            CrystalError::InvalidPath
                | CrystalError::MissingPlan { .. }
                | CrystalError::UnexpectedParentPlan { .. }
                | CrystalError::ForeignCrystalObject { .. }
        )
    }
}

impl ErrorExtension for CrystalError {
    fn extension_code(&self) -> String {
        match self {
            CrystalError::InvalidPath => "INVALID_PATH",
            CrystalError::MissingPlan { .. } => "MISSING_PLAN",
            CrystalError::UnexpectedParentPlan { .. } => "UNEXPECTED_PARENT_PLAN",
            CrystalError::ForeignCrystalObject { .. } => "FOREIGN_CRYSTAL_OBJECT",
            CrystalError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            CrystalError::PlanFailed { .. } => "PLAN_FAILED",
            CrystalError::BatchSizeMismatch { .. } => "BATCH_SIZE_MISMATCH",
            CrystalError::BatchDropped { .. } => "BATCH_DROPPED",
            CrystalError::AlreadyWrapped => "ETOOMUCHBLING",
            CrystalError::Planning { .. } => "PLANNING_FAILED",
            CrystalError::Resolver { .. } => "RESOLVER_ERROR",
            CrystalError::NullViolation { .. } => "NULL_VIOLATION",
            CrystalError::Schema { .. } => "INVALID_SCHEMA",
        }
        .to_string()
    }
}
