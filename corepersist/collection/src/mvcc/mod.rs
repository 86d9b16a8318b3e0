mod entity;
mod log;
mod mutation;

pub use entity::{EntitySet, FieldSet, MvccEntity, Status};
pub use log::{MvccLogEntry, Stage, State, VersionSet};
pub use mutation::EntityMutation;
