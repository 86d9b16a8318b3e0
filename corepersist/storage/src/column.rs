use bytes::Bytes;
use smol_str::SmolStr;

/// Direction of a column scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnFamilyDefinition {
    pub name: SmolStr,
}

impl ColumnFamilyDefinition {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Bytes,
    pub value: Bytes,
}

/// An inclusive range of column names.
///
/// `start` is where the scan begins: the lower bound for an ascending scan and the upper bound for
/// a descending one. `None` leaves that side open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnRange {
    pub start: Option<Bytes>,
    pub finish: Option<Bytes>,
    pub order: Order,
}

impl ColumnRange {
    pub fn all(order: Order) -> Self {
        Self {
            start: None,
            finish: None,
            order,
        }
    }

    pub fn starting_at(start: impl Into<Bytes>, order: Order) -> Self {
        Self {
            start: Some(start.into()),
            finish: None,
            order,
        }
    }

    pub fn with_finish(mut self, finish: impl Into<Bytes>) -> Self {
        self.finish = Some(finish.into());
        self
    }

    pub fn with_start(mut self, start: Option<Bytes>) -> Self {
        self.start = start;
        self
    }

    /// Lower and upper bound regardless of order.
    pub fn bounds(&self) -> (Option<&Bytes>, Option<&Bytes>) {
        match self.order {
            Order::Ascending => (self.start.as_ref(), self.finish.as_ref()),
            Order::Descending => (self.finish.as_ref(), self.start.as_ref()),
        }
    }
}
