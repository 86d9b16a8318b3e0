use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A named, typed property of an entity.
///
/// A unique field claims its value among all entities of the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    name: SmolStr,
    value: FieldValue,
    unique: bool,
}

impl Field {
    pub fn new(name: impl Into<SmolStr>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unique: false,
        }
    }

    pub fn new_unique(name: impl Into<SmolStr>, value: impl Into<FieldValue>) -> Self {
        Self {
            unique: true,
            ..Self::new(name, value)
        }
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

/// Doubles are wrapped in [`OrderedFloat`] so that fields can be hashed and compared, which the
/// change log relies on to detect a value written across several versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    String(String),
    Long(i64),
    Double(OrderedFloat<f64>),
    Boolean(bool),
    List(Vec<FieldValue>),
    Entity(BTreeMap<SmolStr, Field>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(OrderedFloat(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        Self::List(value)
    }
}

impl FromIterator<Field> for FieldValue {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Self::Entity(
            iter.into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        )
    }
}
