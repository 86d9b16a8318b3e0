use bytes::Bytes;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Put { column: Bytes, value: Bytes },
    Delete { column: Bytes },
    DeleteRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub column_family: SmolStr,
    pub row: Bytes,
    pub kind: MutationKind,
}

/// Mutations applied together by [`ColumnStore::execute`](crate::store::ColumnStore::execute).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(
        &mut self,
        column_family: &str,
        row: impl Into<Bytes>,
        column: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.push(column_family, row, MutationKind::Put {
            column: column.into(),
            value: value.into(),
        })
    }

    pub fn delete(
        &mut self,
        column_family: &str,
        row: impl Into<Bytes>,
        column: impl Into<Bytes>,
    ) -> &mut Self {
        self.push(column_family, row, MutationKind::Delete {
            column: column.into(),
        })
    }

    pub fn delete_row(&mut self, column_family: &str, row: impl Into<Bytes>) -> &mut Self {
        self.push(column_family, row, MutationKind::DeleteRow)
    }

    pub fn merge(&mut self, other: MutationBatch) -> &mut Self {
        self.mutations.extend(other.mutations);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    fn push(&mut self, column_family: &str, row: impl Into<Bytes>, kind: MutationKind) -> &mut Self {
        self.mutations.push(Mutation {
            column_family: SmolStr::new(column_family),
            row: row.into(),
            kind,
        });
        self
    }
}

impl IntoIterator for MutationBatch {
    type IntoIter = std::vec::IntoIter<Mutation>;
    type Item = Mutation;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}
