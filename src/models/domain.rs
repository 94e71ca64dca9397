use serde::Serialize;

/// A row of one of the name-keyed tables (`sources` or `domains`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    pub favourite: bool,
}
