use crate::cursor::{CursorValue, RequestCursor, StageId};

/// The chain of cursor values that produced a result, newest stage first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePath {
    stage: StageId,
    value: CursorValue,
    previous: Option<Box<EdgePath>>,
}

impl EdgePath {
    pub fn new(stage: StageId, value: CursorValue, previous: Option<EdgePath>) -> Self {
        Self {
            stage,
            value,
            previous: previous.map(Box::new),
        }
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn value(&self) -> &CursorValue {
        &self.value
    }

    pub fn previous(&self) -> Option<&EdgePath> {
        self.previous.as_deref()
    }

    /// A cursor resuming every stage on the path from this result.
    pub fn to_cursor(&self) -> RequestCursor {
        let mut cursor = RequestCursor::default();
        let mut next = Some(self);
        while let Some(path) = next {
            cursor.set(path.stage, path.value.clone());
            next = path.previous();
        }
        cursor
    }
}

/// A value flowing between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult<T> {
    pub value: T,
    pub path: Option<EdgePath>,
}

impl<T> FilterResult<T> {
    pub fn new(value: T, path: Option<EdgePath>) -> Self {
        Self { value, path }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FilterResult<U> {
        FilterResult {
            value: f(self.value),
            path: self.path,
        }
    }
}

/// One page of results and the cursor of the next page, if there may be one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsPage<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> ResultsPage<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use corepersist_common::id::Id;

    use super::*;

    #[test]
    fn test_path_collects_every_stage() {
        let first = Id::generate("user");
        let second = Id::generate("user");
        let root = EdgePath::new(0, CursorValue::Id(first.clone()), None);
        let leaf = EdgePath::new(2, CursorValue::Id(second.clone()), Some(root));

        let cursor = leaf.to_cursor();
        assert_eq!(cursor.get(0), Some(&CursorValue::Id(first)));
        assert_eq!(cursor.get(1), None);
        assert_eq!(cursor.get(2), Some(&CursorValue::Id(second)));
    }
}
