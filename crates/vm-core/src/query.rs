//! Row-level query primitives understood by every `VillaStore`.

use uuid::Uuid;

use crate::models::VillaStatus;

/// Villa columns that can be filtered or ordered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    Location,
    Description,
    MonthlyPrice,
    CreatedAt,
    UpdatedAt,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Location => "location",
            Column::Description => "description",
            Column::MonthlyPrice => "monthly_price",
            Column::CreatedAt => "created_at",
            Column::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Id(Uuid),
    Status(VillaStatus),
    /// Case-insensitive substring match on any of `columns`.
    Matches { columns: Vec<Column>, needle: String },
}

impl Filter {
    /// The free-text search filter: name, location and description.
    pub fn search(needle: impl Into<String>) -> Self {
        Filter::Matches {
            columns: vec![Column::Name, Column::Location, Column::Description],
            needle: needle.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: Column,
    pub ascending: bool,
}

impl Order {
    pub fn newest_first() -> Self {
        Self {
            column: Column::CreatedAt,
            ascending: false,
        }
    }
}
