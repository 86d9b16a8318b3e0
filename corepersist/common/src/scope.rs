use serde::{Deserialize, Serialize};

use crate::id::Id;

/// The application that owns a piece of data. Every storage row is keyed under a scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationScope {
    application: Id,
}

impl ApplicationScope {
    pub fn new(application: Id) -> Self {
        Self { application }
    }

    #[inline]
    pub fn application(&self) -> &Id {
        &self.application
    }
}
