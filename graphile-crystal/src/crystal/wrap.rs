use std::sync::Arc;

use super::CrystalContext;
use super::CrystalObject;
use super::PathIdentity;
use super::PlanId;
use super::UniqueId;
use crate::error::CrystalError;
use crate::json_ext::Value;
use crate::resolver::FieldValue;
use crate::spec::OutputType;

/// Wraps the value a plan produced for a field into crystal objects,
/// following the shape of the field's return type.
pub struct ResultWrapper<'a> {
    pub crystal_context: &'a CrystalContext,
    pub plan_id: PlanId,
    pub parent: Option<&'a CrystalObject>,
    pub path_identity: &'a PathIdentity,
    pub id: &'a UniqueId,
}

impl ResultWrapper<'_> {
    /// Every non-null leaf position of `data` becomes a crystal object
    /// carrying the list indices that lead to it, and nulls stay null at any depth.
    pub fn wrap(
        &self,
        return_type: &OutputType,
        data: Arc<Value>,
        indices: &[usize],
    ) -> Result<FieldValue, CrystalError> {
        if data.is_null() {
            return Ok(FieldValue::Null);
        }
        match return_type {
            OutputType::NonNull(inner) => self.wrap(inner, data, indices),
            OutputType::List(inner) => {
                let items = match Arc::try_unwrap(data) {
                    Ok(Value::Array(items)) => items,
                    Ok(other) => return Err(self.shape_mismatch(return_type, &other, indices)),
                    Err(shared) => match shared.as_array() {
                        Some(items) => items.clone(),
                        None => return Err(self.shape_mismatch(return_type, &shared, indices)),
                    },
                };
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let item_indices: Vec<usize> =
                            indices.iter().copied().chain(Some(index)).collect();
                        self.wrap(inner, Arc::new(item), &item_indices)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::List)
            }
            OutputType::Named(_) => Ok(FieldValue::Crystal(
                self.crystal_context.new_crystal_object(
                    Some(self.plan_id),
                    self.path_identity.clone(),
                    self.id.clone(),
                    indices.to_vec(),
                    data,
                    self.parent,
                ),
            )),
        }
    }

    fn shape_mismatch(&self, expected: &OutputType, value: &Value, indices: &[usize]) -> CrystalError {
        let mut path_identity = self.path_identity.to_string();
        for index in indices {
            path_identity.push_str(&format!("[{index}]"));
        }
        CrystalError::ShapeMismatch {
            path_identity,
            expected: expected.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::crystal::uid;

    fn ty(source: &str) -> OutputType {
        source.parse().unwrap()
    }

    fn wrapper<'a>(
        context: &'a CrystalContext,
        path_identity: &'a PathIdentity,
        id: &'a UniqueId,
    ) -> ResultWrapper<'a> {
        ResultWrapper {
            crystal_context: context,
            plan_id: PlanId(1),
            parent: None,
            path_identity,
            id,
        }
    }

    #[test]
    fn null_stays_null() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let path_identity = PathIdentity::from("~>Query.user");
        let id = uid("user");
        let wrapper = wrapper(&context, &path_identity, &id);
        assert!(wrapper
            .wrap(&ty("User"), Arc::new(Value::Null), &[])
            .unwrap()
            .is_null());
        assert!(wrapper
            .wrap(&ty("[[User]]!"), Arc::new(Value::Null), &[])
            .unwrap()
            .is_null());
    }

    #[test]
    fn objects_keep_their_data() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let path_identity = PathIdentity::from("~>Query.user");
        let id = uid("user");
        let data = Arc::new(json!({ "id": 1 }));

        let wrapped = wrapper(&context, &path_identity, &id)
            .wrap(&ty("User!"), data.clone(), &[])
            .unwrap();
        let crystal_object = wrapped.as_crystal_object().unwrap();
        assert!(Arc::ptr_eq(crystal_object.data(), &data));
        assert_eq!(crystal_object.path_identity(), &path_identity);
        assert_eq!(crystal_object.id(), &id);
        assert!(crystal_object.indices().is_empty());
        assert_eq!(crystal_object.plan_id(), Some(PlanId(1)));
    }

    #[test]
    fn lists_record_indices() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let path_identity = PathIdentity::from("~>Query.users");
        let id = uid("users");

        let wrapped = wrapper(&context, &path_identity, &id)
            .wrap(
                &ty("[[User]]"),
                Arc::new(json!([[{ "id": 1 }, null], [], [{ "id": 2 }]])),
                &[],
            )
            .unwrap();
        let outer = wrapped.as_list().unwrap();
        assert_eq!(outer.len(), 3);

        let first = outer[0].as_list().unwrap();
        assert_eq!(first[0].as_crystal_object().unwrap().indices(), &[0, 0]);
        assert!(first[1].is_null());
        assert!(outer[1].as_list().unwrap().is_empty());
        let last = outer[2].as_list().unwrap()[0].as_crystal_object().unwrap();
        assert_eq!(last.indices(), &[2, 0]);
        assert_eq!(last.data().as_ref(), &json!({ "id": 2 }));
    }

    #[test]
    fn nulls_inside_lists() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let path_identity = PathIdentity::from("~>Query.users");
        let id = uid("users");

        let wrapped = wrapper(&context, &path_identity, &id)
            .wrap(&ty("[User]"), Arc::new(json!([{ "id": 1 }, null, { "id": 3 }])), &[])
            .unwrap();
        let items = wrapped.as_list().unwrap();
        assert_eq!(items[0].as_crystal_object().unwrap().indices(), &[0]);
        assert!(items[1].is_null());
        assert_eq!(items[2].as_crystal_object().unwrap().indices(), &[2]);
    }

    #[test]
    fn non_list_for_list_type_is_rejected() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let path_identity = PathIdentity::from("~>Query.users");
        let id = uid("users");

        let err = wrapper(&context, &path_identity, &id)
            .wrap(&ty("[[User]]"), Arc::new(json!([{ "id": 1 }])), &[])
            .unwrap_err();
        assert_eq!(
            err,
            CrystalError::ShapeMismatch {
                path_identity: "~>Query.users[0]".to_string(),
                expected: "[User]".to_string(),
                value: "{\"id\":1}".to_string(),
            }
        );
    }

    #[test]
    fn children_of_a_parent_keep_its_ancestry() {
        let context = CrystalContext::new(Arc::new(json!({})), false);
        let parent = context.new_crystal_object(
            Some(PlanId(0)),
            PathIdentity::from("~>Query.user"),
            uid("user"),
            vec![],
            Arc::new(json!({ "id": 1 })),
            None,
        );
        let path_identity = PathIdentity::from("~>Query.user>User.friends");
        let id = uid("friends");
        let wrapped = ResultWrapper {
            parent: Some(&parent),
            ..wrapper(&context, &path_identity, &id)
        }
        .wrap(&ty("[User]"), Arc::new(json!([{ "id": 2 }])), &[])
        .unwrap();
        let friend = wrapped.as_list().unwrap()[0].as_crystal_object().unwrap().clone();
        assert_eq!(context.ancestor(&friend, "~>Query.user"), Some(parent));
    }
}
