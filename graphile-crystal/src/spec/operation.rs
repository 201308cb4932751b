use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;

/// The kind of an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

/// An executable operation together with the fragments it may spread.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: OperationKind,
    pub selection_set: Vec<Selection>,
    #[serde(default)]
    pub fragments: IndexMap<String, Fragment>,
}

/// A named fragment definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub type_condition: String,
    pub selections: Vec<Selection>,
}

/// A selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),

    /// A spread of a named fragment.
    FragmentSpread(FragmentSpread),
}

/// The field that is used
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// The literal argument values.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub arguments: Object,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selections: Option<Vec<Selection>>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Object::new(),
            selections: None,
        }
    }

    /// The key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An inline fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

/// A spread of a fragment defined on the operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSpread {
    pub name: String,
}

/// Fields grouped by response key, in selection order.
pub type GroupedFields<'a> = IndexMap<&'a str, Vec<&'a Field>>;

impl Operation {
    /// Collects the fields of `selection_sets` that apply to objects of `type_name`.
    ///
    /// Fields sharing a response key are grouped so that their sub-selections
    /// can be merged; unknown fragment spreads are skipped.
    pub fn collect_fields<'a>(
        &'a self,
        type_name: &str,
        selection_sets: &[&'a [Selection]],
    ) -> GroupedFields<'a> {
        let mut grouped = GroupedFields::new();
        let mut visited = Vec::new();
        for &selections in selection_sets {
            self.collect_into(type_name, selections, &mut grouped, &mut visited);
        }
        grouped
    }

    fn collect_into<'a>(
        &'a self,
        type_name: &str,
        selections: &'a [Selection],
        grouped: &mut GroupedFields<'a>,
        visited: &mut Vec<&'a str>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    grouped.entry(field.response_key()).or_default().push(field);
                }
                Selection::InlineFragment(fragment) => {
                    if fragment
                        .type_condition
                        .as_deref()
                        .map_or(true, |condition| condition == type_name)
                    {
                        self.collect_into(type_name, &fragment.selections, grouped, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if visited.contains(&spread.name.as_str()) {
                        continue;
                    }
                    visited.push(spread.name.as_str());
                    match self.fragments.get(&spread.name) {
                        Some(fragment) if fragment.type_condition == type_name => {
                            self.collect_into(type_name, &fragment.selections, grouped, visited);
                        }
                        Some(_) => {}
                        None => {
                            tracing::warn!("unknown fragment '{}' was skipped", spread.name);
                        }
                    }
                }
            }
        }
    }
}
