//! GraphQL schema and operation model driven by the execution layer.

mod field_type;
mod operation;
mod schema;

pub use field_type::OutputType;
pub use operation::Field;
pub use operation::Fragment;
pub use operation::FragmentSpread;
pub use operation::GroupedFields;
pub use operation::InlineFragment;
pub use operation::Operation;
pub use operation::OperationKind;
pub use operation::Selection;
pub use schema::FieldDefinition;
pub use schema::ObjectType;
pub use schema::Schema;
pub use schema::SchemaBuilder;
