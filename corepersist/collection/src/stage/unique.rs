use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::store::ColumnStoreRef;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{CollectionError, CollectionResult};
use crate::serialization::{UniqueValue, UniqueValueSerialization};

/// Claims the unique field values of a version before it is committed.
///
/// Claims are written first and read back afterwards. Of two entities claiming the same value
/// concurrently, the one with the lower version keeps it.
#[derive(Clone)]
pub(crate) struct UniqueVerify {
    store: ColumnStoreRef,
    values: UniqueValueSerialization,
}

impl UniqueVerify {
    pub(crate) fn new(store: ColumnStoreRef, values: UniqueValueSerialization) -> Self {
        Self { store, values }
    }

    pub(crate) fn verify(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
        fields: &[Field],
    ) -> CollectionResult<()> {
        let mut violations = Vec::new();
        let mut claims = Vec::new();
        for field in fields {
            let held = self.values.load(scope, id.id_type(), field)?;
            if held.iter().any(|v| &v.entity_id != id) {
                violations.push(SmolStr::new(field.name()));
            } else {
                claims.push(UniqueValue::new(field.clone(), id.clone(), version));
            }
        }
        if !violations.is_empty() {
            return Err(self.violation(id, violations));
        }
        if claims.is_empty() {
            return Ok(());
        }

        let mut batch = MutationBatch::new();
        for claim in &claims {
            batch.merge(self.values.write(scope, claim)?);
        }
        self.store.execute(batch)?;

        for claim in &claims {
            let held = self.values.load(scope, id.id_type(), &claim.field)?;
            if held
                .iter()
                .any(|v| &v.entity_id != id && v.entity_version < version)
            {
                violations.push(SmolStr::new(claim.field.name()));
            }
        }
        if !violations.is_empty() {
            self.release(scope, id, |v| v.entity_version == version)?;
            return Err(self.violation(id, violations));
        }
        debug!(%id, %version, claims = claims.len(), "collection.unique.claimed");
        Ok(())
    }

    /// Removes the claims of `id` selected by `released`.
    pub(crate) fn release(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        released: impl Fn(&UniqueValue) -> bool,
    ) -> CollectionResult<usize> {
        let mut batch = MutationBatch::new();
        let mut count = 0;
        for claim in self.values.load_for_entity(scope, id)? {
            if released(&claim) {
                batch.merge(self.values.delete(scope, &claim)?);
                count += 1;
            }
        }
        if count > 0 {
            self.store.execute(batch)?;
            debug!(%id, count, "collection.unique.released");
        }
        Ok(count)
    }

    pub(crate) fn values(&self) -> &UniqueValueSerialization {
        &self.values
    }

    fn violation(&self, id: &Id, fields: Vec<SmolStr>) -> CollectionError {
        warn!(%id, ?fields, "collection.unique.violation");
        CollectionError::UniqueViolation {
            id: id.clone(),
            fields,
        }
    }
}
