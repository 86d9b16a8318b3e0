mod entity;
mod format;
mod log;
mod unique;

pub use entity::{ENTITY_VERSION_DATA, MvccEntitySerialization};
pub use format::{EntityFormat, MIGRATIONS, MigrationRelationship, MvccEntityDataMigration};
pub use log::{ENTITY_LOG, MvccLogEntrySerialization};
pub use unique::{UNIQUE_VALUES, UNIQUE_VALUES_LOG, UniqueValue, UniqueValueSerialization};
