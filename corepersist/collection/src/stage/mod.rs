//! Steps of the entity write and load paths.

pub(crate) mod cleanup;
pub(crate) mod load;
pub(crate) mod unique;
pub(crate) mod write;
