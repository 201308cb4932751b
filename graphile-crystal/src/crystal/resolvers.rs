//! Field resolver interception.
//!
//! A wrapped resolver looks up the plan of the field it resolves. Fields
//! without a plan fall through to the real resolver; every other field waits
//! on the batch of its plan and hands back crystal objects, so that the
//! fields below it can be batched in turn.

use std::sync::Arc;

use async_trait::async_trait;

use super::path_to_path_identity;
use super::uid;
use super::Aether;
use super::AetherKey;
use super::CrystalContext;
use super::CrystalObject;
use super::PathIdentity;
use super::Plan;
use super::ResultWrapper;
use super::ValuePlanId;
use crate::error::CrystalError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolver::default_field_resolver;
use crate::resolver::FieldResolver;
use crate::resolver::FieldSource;
use crate::resolver::FieldValue;
use crate::resolver::ResolveContext;
use crate::resolver::ResolveInfo;

/// Wraps `resolve` so that it resolves through plans.
///
/// `None` wraps the default field resolver. Wrapping a resolver twice is an
/// error.
pub fn crystal_wrap_resolve(
    resolve: Option<Arc<dyn FieldResolver>>,
) -> Result<Arc<dyn FieldResolver>, CrystalError> {
    let real = resolve.unwrap_or_else(default_field_resolver);
    if real.is_crystal_wrapped() {
        return Err(CrystalError::AlreadyWrapped);
    }
    Ok(Arc::new(CrystalResolver { real }))
}

/// Wraps a subscribe function; each event is then resolved through plans.
pub fn crystal_wrap_subscribe(
    subscribe: Arc<dyn FieldResolver>,
) -> Result<Arc<dyn FieldResolver>, CrystalError> {
    crystal_wrap_resolve(Some(subscribe))
}

/// A resolver intercepting field resolution through the aether of the operation.
#[derive(Debug)]
pub struct CrystalResolver {
    real: Arc<dyn FieldResolver>,
}

#[async_trait]
impl FieldResolver for CrystalResolver {
    async fn resolve(
        &self,
        source: FieldSource,
        args: &Object,
        ctx: &ResolveContext,
        info: &ResolveInfo,
    ) -> Result<FieldValue, CrystalError> {
        let path_identity = path_to_path_identity(&info.path)?;
        let aether = ctx
            .aethers()
            .establish(&AetherKey::from_resolve_info(info, ctx))?;

        let Some(plan_id) = aether.plan_id(&path_identity) else {
            tracing::trace!("no plan at '{}', calling the real resolver", path_identity);
            return self
                .real
                .resolve(FieldSource::Raw(source.into_data()), args, ctx, info)
                .await;
        };

        let batch = aether.get_batch(&path_identity, &source)?;
        let crystal_context = batch.crystal_context().clone();
        let id = uid(&info.field_name);
        let parent = match source {
            FieldSource::Crystal(crystal_object) => crystal_object,
            FieldSource::Raw(_) if info.path.prev.is_none() => {
                crystal_context.root_crystal_object().clone()
            }
            FieldSource::Raw(parent_object) => {
                value_parent(&aether, &crystal_context, info, &path_identity, parent_object)?
            }
        };
        tracing::debug!(
            "resolving '{}' ({}) for {} through plan {}",
            path_identity,
            id,
            parent,
            plan_id
        );

        let result = aether.scheduler().register_entry(&batch, parent.clone()).await?;

        if info.schema.is_leaf_type(info.return_type.named_type()) {
            let mut object_for_resolver = Object::new();
            object_for_resolver.insert(info.field_name.clone(), result);
            return self
                .real
                .resolve(
                    FieldSource::Raw(Arc::new(Value::Object(object_for_resolver))),
                    args,
                    ctx,
                    info,
                )
                .await;
        }

        ResultWrapper {
            crystal_context: &crystal_context,
            plan_id,
            parent: Some(&parent),
            path_identity: &path_identity,
            id: &id,
        }
        .wrap(&info.return_type, Arc::new(result), &[])
    }

    fn is_crystal_wrapped(&self) -> bool {
        true
    }
}

/// The crystal object standing for a raw parent, built from the value plan of
/// the list item (or field) that produced it.
fn value_parent(
    aether: &Aether,
    crystal_context: &CrystalContext,
    info: &ResolveInfo,
    path_identity: &PathIdentity,
    parent_object: Arc<Value>,
) -> Result<CrystalObject, CrystalError> {
    let prev = info.path.prev.as_deref().ok_or(CrystalError::InvalidPath)?;
    let parent_path_identity = path_to_path_identity(prev)?;
    let parent_plan_id = aether
        .item_plan_id(&parent_path_identity)
        .ok_or_else(|| CrystalError::MissingPlan {
            path_identity: parent_path_identity.to_string(),
        })?;
    if !matches!(aether.plan(parent_plan_id), Some(Plan::Value(_))) {
        return Err(CrystalError::UnexpectedParentPlan {
            path_identity: parent_path_identity.to_string(),
        });
    }

    let ValuePlanId { value_id, existed } =
        aether.get_value_plan_id(parent_plan_id, &parent_object, path_identity);
    if existed {
        if let Some(crystal_object) = crystal_context.value_plan_object(parent_plan_id, &value_id)
        {
            return Ok(crystal_object);
        }
        failfast_debug!(
            "value {} of plan {} was never populated",
            value_id,
            parent_plan_id
        );
    }

    let crystal_object = crystal_context.new_crystal_object(
        Some(parent_plan_id),
        parent_path_identity,
        value_id,
        prev.trailing_indices(),
        parent_object,
        None,
    );
    crystal_context.populate_value_plan(parent_plan_id, &crystal_object);
    tracing::debug!(
        "created {} to stand for the raw parent of '{}'",
        crystal_object,
        path_identity
    );
    Ok(crystal_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DefaultFieldResolver;
    use crate::resolver::FnResolver;

    #[test]
    fn wrapping_twice_is_rejected() {
        let wrapped = crystal_wrap_resolve(None).unwrap();
        assert!(wrapped.is_crystal_wrapped());
        assert_eq!(
            crystal_wrap_resolve(Some(wrapped)).unwrap_err(),
            CrystalError::AlreadyWrapped
        );
    }

    #[test]
    fn wrapping_keeps_the_real_resolver() {
        let real: Arc<dyn FieldResolver> =
            Arc::new(FnResolver::new("answer", |_, _, _| Ok(FieldValue::Null)));
        let wrapped = crystal_wrap_subscribe(real).unwrap();
        assert!(format!("{wrapped:?}").contains("answer"));
        assert!(crystal_wrap_resolve(Some(Arc::new(DefaultFieldResolver))).is_ok());
    }
}
