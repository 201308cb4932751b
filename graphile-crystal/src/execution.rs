//! Executes operations against a schema, resolving fields through their
//! resolvers and completing values the way a GraphQL executor does.

use std::sync::Arc;

use futures::future::join_all;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::crystal::AetherCache;
use crate::crystal::AetherKey;
use crate::error::CrystalError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolver::default_field_resolver;
use crate::resolver::FieldSource;
use crate::resolver::FieldValue;
use crate::resolver::ResolveContext;
use crate::resolver::ResolveInfo;
use crate::resolver::ResolvePath;
use crate::spec::Field;
use crate::spec::Operation;
use crate::spec::OperationKind;
use crate::spec::OutputType;
use crate::spec::Schema;
use crate::spec::Selection;

const TYPENAME: &str = "__typename";

/// Everything needed to execute one operation.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub schema: Arc<Schema>,
    pub operation: Arc<Operation>,
    pub variables: Arc<Object>,
    pub root_value: Arc<Value>,
    pub context_data: Arc<Object>,
}

impl ExecutionRequest {
    pub fn new(schema: Arc<Schema>, operation: Arc<Operation>) -> Self {
        Self {
            schema,
            operation,
            variables: Default::default(),
            root_value: Arc::new(Value::Object(Object::new())),
            context_data: Default::default(),
        }
    }

    pub fn with_variables(mut self, variables: Object) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = Arc::new(root_value);
        self
    }

    pub fn with_context_data(mut self, context_data: Object) -> Self {
        self.context_data = Arc::new(context_data);
        self
    }
}

/// Executes `request`, batching plan-backed fields through its aether.
///
/// The aether is established before any field resolves and released once
/// the response is complete, or when the returned future is dropped.
pub async fn execute(request: ExecutionRequest, aethers: &Arc<AetherCache>) -> Response {
    let ctx = ResolveContext::new(request.context_data.clone(), aethers.clone());
    let key = AetherKey::new(
        request.schema.clone(),
        request.operation.clone(),
        request.variables.clone(),
        ctx.id(),
        request.root_value.clone(),
    );
    let release = ReleaseOnDrop {
        aethers: aethers.as_ref(),
        key,
    };
    let aether = match aethers.establish(&release.key) {
        Ok(aether) => aether,
        Err(err) => return Response::from_errors(vec![err.to_graphql_error(None)]),
    };
    let Some(root_type) = request
        .schema
        .root_type(request.operation.kind)
        .map(str::to_string)
    else {
        let err = CrystalError::Schema {
            reason: format!(
                "the schema does not support {:?} operations",
                request.operation.kind
            ),
        };
        return Response::from_errors(vec![err.to_graphql_error(None)]);
    };

    let span = tracing::info_span!(
        "crystal.execute",
        "graphql.operation.name" = request.operation.name.as_deref().unwrap_or_default(),
        "crystal.plans" = aether.plans().len()
    );
    let executor = Executor {
        request,
        ctx,
        errors: Default::default(),
    };
    let data = aether
        .drive(executor.execute_root(&root_type))
        .instrument(span)
        .await;

    Response {
        data: Some(data.unwrap_or(Value::Null)),
        errors: executor.errors.into_inner(),
    }
}

/// Releases the aether of an execution, whether it completed or was dropped
/// half way.
struct ReleaseOnDrop<'a> {
    aethers: &'a AetherCache,
    key: AetherKey,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.aethers.release(&self.key) {
            tracing::trace!("released aether of context {}", self.key.context_id());
        }
    }
}

/// A null that must propagate to the nearest nullable position; the error
/// explaining it has already been recorded.
#[derive(Debug)]
struct Propagate;

type Completion = Result<Value, Propagate>;

/// The fields being completed, and the type that selected them.
#[derive(Clone, Copy)]
struct Selected<'a> {
    parent_type: &'a str,
    fields: &'a [&'a Field],
}

struct Executor {
    request: ExecutionRequest,
    ctx: ResolveContext,
    errors: Mutex<Vec<Error>>,
}

impl Executor {
    async fn execute_root(&self, root_type: &str) -> Completion {
        let source = FieldSource::Raw(self.request.root_value.clone());
        let serial = self.request.operation.kind == OperationKind::Mutation;
        self.execute_selection_set(
            root_type,
            source,
            vec![&self.request.operation.selection_set[..]],
            None,
            serial,
        )
        .await
    }

    fn execute_selection_set<'a>(
        &'a self,
        type_name: &'a str,
        source: FieldSource,
        selection_sets: Vec<&'a [Selection]>,
        path: Option<Arc<ResolvePath>>,
        serial: bool,
    ) -> BoxFuture<'a, Completion> {
        Box::pin(async move {
            let grouped = self
                .request
                .operation
                .collect_fields(type_name, &selection_sets);
            let mut object = Object::new();
            if serial {
                for (response_key, fields) in grouped {
                    let value = self
                        .resolve_field(type_name, &source, fields, path.as_ref())
                        .await?;
                    object.insert(response_key.to_string(), value);
                }
            } else {
                let response_keys: Vec<&str> = grouped.keys().copied().collect();
                let values = join_all(
                    grouped
                        .into_values()
                        .map(|fields| self.resolve_field(type_name, &source, fields, path.as_ref())),
                )
                .await;
                for (response_key, value) in response_keys.into_iter().zip(values) {
                    object.insert(response_key.to_string(), value?);
                }
            }
            Ok(Value::Object(object))
        })
    }

    async fn resolve_field<'a>(
        &'a self,
        type_name: &'a str,
        source: &'a FieldSource,
        fields: Vec<&'a Field>,
        path: Option<&'a Arc<ResolvePath>>,
    ) -> Completion {
        let Some(&field) = fields.first() else {
            return Ok(Value::Null);
        };
        let response_key = field.response_key();
        let field_path = match path {
            Some(prev) => ResolvePath::field(prev, response_key, type_name),
            None => ResolvePath::root(response_key, type_name),
        };
        if field.name == TYPENAME {
            return Ok(Value::String(type_name.to_string()));
        }

        let schema = &self.request.schema;
        let Some(definition) = schema
            .object_type(type_name)
            .and_then(|object_type| object_type.get(&field.name))
        else {
            self.record(
                CrystalError::Schema {
                    reason: format!("cannot query field '{}' on type '{type_name}'", field.name),
                },
                &field_path,
            );
            return Ok(Value::Null);
        };

        let resolver = match (self.request.operation.kind, path, definition.subscriber()) {
            (OperationKind::Subscription, None, Some(subscriber)) => subscriber.clone(),
            _ => definition
                .resolver()
                .cloned()
                .unwrap_or_else(default_field_resolver),
        };
        let info = ResolveInfo {
            field_name: field.name.clone(),
            parent_type: type_name.to_string(),
            return_type: definition.ty.clone(),
            path: field_path.clone(),
            schema: schema.clone(),
            operation: self.request.operation.clone(),
            variables: self.request.variables.clone(),
            root_value: self.request.root_value.clone(),
        };

        tracing::debug!("resolving {}.{}", type_name, field.name);
        let resolved = resolver
            .resolve(source.clone(), &field.arguments, &self.ctx, &info)
            .await;
        tracing::debug!("resolved {}.{}", type_name, field.name);

        match resolved {
            Ok(value) => {
                let selected = Selected {
                    parent_type: type_name,
                    fields: &fields,
                };
                self.complete_value(&definition.ty, selected, value, field_path)
                    .await
            }
            Err(err) => {
                self.record(err, &field_path);
                if definition.ty.is_non_null() {
                    Err(Propagate)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    fn complete_value<'a>(
        &'a self,
        ty: &'a OutputType,
        selected: Selected<'a>,
        value: FieldValue,
        path: Arc<ResolvePath>,
    ) -> BoxFuture<'a, Completion> {
        Box::pin(async move {
            match ty {
                OutputType::NonNull(inner) => {
                    let completed = self.complete_nullable(inner, selected, value, &path).await?;
                    if completed.is_null() {
                        let field_name = selected
                            .fields
                            .first()
                            .map(|field| field.name.clone())
                            .unwrap_or_default();
                        self.record(
                            CrystalError::NullViolation {
                                type_name: selected.parent_type.to_string(),
                                field_name,
                            },
                            &path,
                        );
                        return Err(Propagate);
                    }
                    Ok(completed)
                }
                _ => Ok(self
                    .complete_nullable(ty, selected, value, &path)
                    .await
                    .unwrap_or(Value::Null)),
            }
        })
    }

    async fn complete_nullable<'a>(
        &'a self,
        ty: &'a OutputType,
        selected: Selected<'a>,
        value: FieldValue,
        path: &Arc<ResolvePath>,
    ) -> Completion {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            OutputType::NonNull(_) => self.complete_value(ty, selected, value, path.clone()).await,
            OutputType::List(inner) => {
                let items = match value {
                    FieldValue::List(items) => items,
                    FieldValue::Raw(raw) => match raw.as_array() {
                        Some(items) => items.iter().cloned().map(FieldValue::from).collect(),
                        None => return Err(self.shape_mismatch(ty, &raw, path)),
                    },
                    FieldValue::Crystal(crystal_object) => {
                        return Err(self.shape_mismatch(ty, crystal_object.data(), path))
                    }
                    FieldValue::Null => return Ok(Value::Null),
                };
                let completed = join_all(items.into_iter().enumerate().map(|(index, item)| {
                    self.complete_value(inner, selected, item, ResolvePath::index(path, index))
                }))
                .await;
                completed
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            OutputType::Named(name) if self.request.schema.is_leaf_type(name) => match value {
                FieldValue::Raw(raw) => Ok(Arc::try_unwrap(raw).unwrap_or_else(|raw| (*raw).clone())),
                FieldValue::Crystal(crystal_object) => Ok(crystal_object.data().as_ref().clone()),
                FieldValue::List(_) => Err(self.shape_mismatch(ty, &Value::String("[..]".into()), path)),
                FieldValue::Null => Ok(Value::Null),
            },
            OutputType::Named(name) => {
                let source = match value {
                    FieldValue::Raw(raw) => FieldSource::Raw(raw),
                    FieldValue::Crystal(crystal_object) => FieldSource::Crystal(crystal_object),
                    FieldValue::List(_) => {
                        return Err(self.shape_mismatch(ty, &Value::String("[..]".into()), path))
                    }
                    FieldValue::Null => return Ok(Value::Null),
                };
                let selection_sets = selected
                    .fields
                    .iter()
                    .filter_map(|field| field.selections.as_deref())
                    .collect();
                self.execute_selection_set(name, source, selection_sets, Some(path.clone()), false)
                    .await
            }
        }
    }

    fn shape_mismatch(&self, ty: &OutputType, value: &Value, path: &ResolvePath) -> Propagate {
        self.record(
            CrystalError::ShapeMismatch {
                path_identity: path.to_response_path().to_string(),
                expected: ty.to_string(),
                value: value.to_string(),
            },
            path,
        );
        Propagate
    }

    fn record(&self, error: CrystalError, path: &ResolvePath) {
        tracing::debug!("field error at {}: {}", path.to_response_path(), error);
        self.errors
            .lock()
            .push(error.to_graphql_error(Some(path.to_response_path())));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::configuration::ExecutionConfig;
    use crate::crystal::PlanGraph;
    use crate::json_ext::Path;
    use crate::resolver::FnResolver;
    use crate::spec::FieldDefinition;
    use crate::spec::ObjectType;

    fn ty(source: &str) -> OutputType {
        source.parse().unwrap()
    }

    fn aethers() -> Arc<AetherCache> {
        Arc::new(AetherCache::new(
            Arc::new(PlanGraph::default()),
            ExecutionConfig::default(),
        ))
    }

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .query_type("Query")
                .mutation_type("Mutation")
                .object_type(
                    ObjectType::new("Query")
                        .field(FieldDefinition::new("user", ty("User")))
                        .field(FieldDefinition::new("users", ty("[User!]")))
                        .field(FieldDefinition::new(
                            "broken",
                            ty("String"),
                        ).with_resolver(Arc::new(FnResolver::new("broken", |_, _, _| {
                            Err(CrystalError::resolver("no luck"))
                        }))))
                        .field(FieldDefinition::new("version", ty("String!"))),
                )
                .object_type(
                    ObjectType::new("Mutation").field(FieldDefinition::new("bump", ty("Int"))),
                )
                .object_type(
                    ObjectType::new("User")
                        .field(FieldDefinition::new("id", ty("ID!")))
                        .field(FieldDefinition::new("name", ty("String!"))),
                )
                .build()
                .unwrap(),
        )
    }

    fn operation(value: Value) -> Arc<Operation> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn field(name: &str, selections: Option<Value>) -> Value {
        match selections {
            Some(selections) => json!({ "kind": "Field", "name": name, "selections": selections }),
            None => json!({ "kind": "Field", "name": name }),
        }
    }

    #[tokio::test]
    async fn resolves_raw_values() {
        let operation = operation(json!({
            "selectionSet": [
                field("__typename", None),
                field("version", None),
                field("user", Some(json!([field("id", None), field("name", None)]))),
            ]
        }));
        let request = ExecutionRequest::new(schema(), operation).with_root_value(json!({
            "version": "1.0",
            "user": { "id": "u1", "name": "Ada" }
        }));

        let response = execute(request, &aethers()).await;
        assert_eq!(response.errors, vec![]);
        assert_eq!(
            response.data,
            Some(json!({
                "__typename": "Query",
                "version": "1.0",
                "user": { "id": "u1", "name": "Ada" }
            }))
        );
    }

    #[tokio::test]
    async fn resolver_errors_become_field_errors() {
        let operation = operation(json!({
            "selectionSet": [field("broken", None), field("version", None)]
        }));
        let request =
            ExecutionRequest::new(schema(), operation).with_root_value(json!({ "version": "1" }));

        let response = execute(request, &aethers()).await;
        assert_eq!(response.data, Some(json!({ "broken": null, "version": "1" })));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "no luck");
        assert_eq!(response.errors[0].path, Some(Path::parse("broken")));
    }

    #[tokio::test]
    async fn nulls_bubble_to_the_nearest_nullable_field() {
        let operation = operation(json!({
            "selectionSet": [field("users", Some(json!([field("name", None)])))]
        }));
        let request = ExecutionRequest::new(schema(), operation).with_root_value(json!({
            "users": [{ "name": "Ada" }, { "name": null }]
        }));

        let response = execute(request, &aethers()).await;
        assert_eq!(response.data, Some(json!({ "users": null })));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code(), Some("NULL_VIOLATION"));
        assert_eq!(response.errors[0].path, Some(Path::parse("users/1/name")));
    }

    #[tokio::test]
    async fn non_null_root_field_nulls_the_data() {
        let operation = operation(json!({ "selectionSet": [field("version", None)] }));
        let request = ExecutionRequest::new(schema(), operation);

        let response = execute(request, &aethers()).await;
        assert_eq!(response.data, Some(Value::Null));
        assert_eq!(
            response.errors[0].message,
            "cannot return null for non-nullable field Query.version"
        );
    }

    #[tokio::test]
    async fn aliases_and_fragments() {
        let operation = operation(json!({
            "selectionSet": [
                { "kind": "Field", "alias": "me", "name": "user", "selections": [
                    { "kind": "FragmentSpread", "name": "UserFields" },
                    { "kind": "InlineFragment", "typeCondition": "User", "selections": [field("id", None)] }
                ]}
            ],
            "fragments": {
                "UserFields": { "typeCondition": "User", "selections": [field("name", None)] }
            }
        }));
        let request = ExecutionRequest::new(schema(), operation).with_root_value(json!({
            "user": { "id": "u1", "name": "Ada" }
        }));

        let response = execute(request, &aethers()).await;
        assert_eq!(
            response.data,
            Some(json!({ "me": { "name": "Ada", "id": "u1" } }))
        );
    }

    #[tokio::test]
    async fn unsupported_operation_kind() {
        let schema = Arc::new(
            Schema::builder()
                .query_type("Query")
                .object_type(ObjectType::new("Query").field(FieldDefinition::new("ok", ty("Boolean"))))
                .build()
                .unwrap(),
        );
        let operation = operation(json!({ "kind": "subscription", "selectionSet": [] }));
        let aethers = aethers();

        let response = execute(ExecutionRequest::new(schema, operation), &aethers).await;
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].code(), Some("INVALID_SCHEMA"));
        assert!(aethers.is_empty());
    }

    #[tokio::test]
    async fn mutations_run_in_document_order() {
        let counter = Arc::new(Mutex::new(0));
        let bump = {
            let counter = counter.clone();
            FnResolver::new("bump", move |_, _, _| {
                let mut counter = counter.lock();
                *counter += 1;
                Ok(FieldValue::from(json!(*counter)))
            })
        };
        let schema = Arc::new(
            Schema::builder()
                .query_type("Query")
                .mutation_type("Mutation")
                .object_type(ObjectType::new("Query").field(FieldDefinition::new("ok", ty("Boolean"))))
                .object_type(ObjectType::new("Mutation").field(
                    FieldDefinition::new("bump", ty("Int")).with_resolver(Arc::new(bump)),
                ))
                .build()
                .unwrap(),
        );
        let operation = operation(json!({
            "kind": "mutation",
            "selectionSet": [
                { "kind": "Field", "alias": "first", "name": "bump" },
                { "kind": "Field", "alias": "second", "name": "bump" }
            ]
        }));

        let response = execute(ExecutionRequest::new(schema, operation), &aethers()).await;
        assert_eq!(response.data, Some(json!({ "first": 1, "second": 2 })));
    }
}
