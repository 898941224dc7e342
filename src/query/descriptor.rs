use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// Which fields of each document are returned. Include and exclude are
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    /// Whether the client named a page explicitly.
    pub requested: bool,
}

impl Pagination {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Fully resolved query plan. Built per request and thrown away afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub filter: Value,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: Option<Pagination>,
}

impl QueryDescriptor {
    pub fn for_filter(filter: Value) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            projection: Projection::All,
            page: None,
        }
    }

    pub fn sorted_by(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }
}
