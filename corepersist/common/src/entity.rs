use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::field::Field;
use crate::id::Id;

/// The set of fields of one entity at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    id: Id,
    fields: BTreeMap<SmolStr, Field>,
}

impl Entity {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.set_field(field);
        self
    }

    #[inline]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Sets a field, returning the previous field with the same name.
    pub fn set_field(&mut self, field: Field) -> Option<Field> {
        self.fields.insert(SmolStr::new(field.name()), field)
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        self.fields.remove(name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.is_unique())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(SmolStr::as_str)
    }

    pub fn into_fields(self) -> impl Iterator<Item = Field> {
        self.fields.into_values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
