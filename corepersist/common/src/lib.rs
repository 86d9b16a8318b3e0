pub mod entity;
pub mod error;
pub mod field;
pub mod id;
pub mod scope;
pub mod time;
pub mod version;
