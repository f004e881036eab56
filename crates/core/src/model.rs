//! Queries, filters, item ids and page results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Visibility filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// No visibility filter.
    #[default]
    Any,
    /// Public items only.
    Public,
    /// Private items only.
    Private,
}

impl Visibility {
    /// Query parameter value; `Any` is not sent.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Public => Some("public"),
            Self::Private => Some("private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" => Ok(Self::Any),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(ApiError::validation(format!("unknown visibility: {other}"))),
        }
    }
}

/// Sort order for listings. All orders are descending on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Newest first.
    #[default]
    CreatedAt,
    /// Most liked first.
    Likes,
    /// Most viewed first.
    Views,
}

impl SortKey {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Likes => "likes",
            Self::Views => "views",
        }
    }
}

impl FromStr for SortKey {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "created_at" => Ok(Self::CreatedAt),
            "likes" => Ok(Self::Likes),
            "views" => Ok(Self::Views),
            other => Err(ApiError::validation(format!("unknown sort key: {other}"))),
        }
    }
}

/// Filter and sort part of a [`Query`]. Two queries with equal filters and
/// page size belong to the same lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Filters {
    /// Free-text search over title and content.
    #[serde(default)]
    pub search: String,
    /// Exact category.
    #[serde(default)]
    pub category: Option<String>,
    /// Visibility filter.
    #[serde(default)]
    pub visibility: Visibility,
    /// Tag substring.
    #[serde(default)]
    pub tag: Option<String>,
    /// Sort order.
    #[serde(default)]
    pub sort: SortKey,
}

/// One page request. Immutable per fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// Filter and sort settings.
    pub filters: Filters,
    /// 1-based page number.
    pub page: u32,
    /// Requested number of items per page.
    pub page_size: u32,
}

impl Query {
    /// Builds a query, rejecting `page == 0` and `page_size == 0`.
    pub fn new(filters: Filters, page: u32, page_size: u32) -> Result<Self, ApiError> {
        if page == 0 {
            return Err(ApiError::validation("page must be at least 1"));
        }
        if page_size == 0 {
            return Err(ApiError::validation("page size must be positive"));
        }
        Ok(Self {
            filters,
            page,
            page_size,
        })
    }

    /// Page 1 of a new lineage.
    pub fn first_page(filters: Filters, page_size: u32) -> Result<Self, ApiError> {
        Self::new(filters, 1, page_size)
    }

    /// The page after this one, same lineage.
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }

    /// True if `other` differs from `self` at most in the page number.
    pub fn same_lineage(&self, other: &Query) -> bool {
        self.filters == other.filters && self.page_size == other.page_size
    }

    /// Upstream query parameters. Empty filters are omitted.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("per_page", self.page_size.to_string()),
        ];
        let search = self.filters.search.trim();
        if !search.is_empty() {
            params.push(("search", search.to_string()));
        }
        if let Some(category) = non_empty(&self.filters.category) {
            params.push(("category", category.to_string()));
        }
        if let Some(visibility) = self.filters.visibility.as_param() {
            params.push(("visibility", visibility.to_string()));
        }
        if let Some(tag) = non_empty(&self.filters.tag) {
            params.push(("tag", tag.to_string()));
        }
        params.push(("sort", self.filters.sort.as_str().to_string()));
        params
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Item identifier. The upstream API uses integers for some resources and
/// strings for others; both normalize to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub String);

impl ItemId {
    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl TryFrom<&Value> for ItemId {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self(s.clone())),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(format!("item id must be a string or number, got {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ItemId::try_from(&value).map_err(serde::de::Error::custom)
    }
}

/// Anything the loader can deduplicate.
pub trait Keyed {
    /// Stable unique id.
    fn key(&self) -> &ItemId;
}

/// Opaque item (post, job, message...). Only `id` is interpreted; every
/// other field is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    id: ItemId,
    fields: Map<String, Value>,
}

impl Record {
    /// Item id.
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Raw field lookup (including `id`).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = fields
            .get("id")
            .ok_or_else(|| "record has no id field".to_string())
            .and_then(ItemId::try_from)?;
        Ok(Self { id, fields })
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

impl Keyed for Record {
    fn key(&self) -> &ItemId {
        &self.id
    }
}

/// Pagination block returned by list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number echoed by the server.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size actually applied (the server caps it at 50).
    #[serde(default)]
    pub per_page: Option<u32>,
    /// Total number of matching items.
    #[serde(default)]
    pub total: Option<u64>,
    /// Total number of pages.
    #[serde(default)]
    pub pages: Option<u32>,
    /// Whether a following page exists.
    #[serde(default)]
    pub has_next: Option<bool>,
    /// Whether a preceding page exists.
    #[serde(default)]
    pub has_prev: Option<bool>,
}

/// Wire envelope of list endpoints: `{items|posts|jobs: [...], pagination?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingEnvelope<T> {
    /// Items of the page, in server order.
    #[serde(alias = "posts", alias = "jobs", alias = "messages")]
    pub items: Vec<T>,
    /// Optional pagination metadata.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Result of one page fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    /// Items of the page, in server order.
    pub items: Vec<T>,
    /// The query that produced this page.
    pub requested_query: Query,
    /// Server pagination metadata, when supplied.
    pub pagination: Option<Pagination>,
}

impl<T> PageResult<T> {
    /// Page without server metadata.
    pub fn new(items: Vec<T>, requested_query: Query) -> Self {
        Self {
            items,
            requested_query,
            pagination: None,
        }
    }

    /// Builds a page from a decoded wire envelope.
    pub fn from_envelope(envelope: ListingEnvelope<T>, requested_query: Query) -> Self {
        Self {
            items: envelope.items,
            requested_query,
            pagination: envelope.pagination,
        }
    }

    /// Whether another page should be requested.
    ///
    /// Server metadata wins when present (`has_next`, then `total`);
    /// otherwise a short page (fewer items than requested) is the last one.
    pub fn has_more(&self) -> bool {
        let query = &self.requested_query;
        if let Some(pagination) = &self.pagination {
            if let Some(has_next) = pagination.has_next {
                return has_next;
            }
            if let Some(total) = pagination.total {
                return u64::from(query.page) * u64::from(query.page_size) < total;
            }
        }
        self.items.len() >= query.page_size as usize
    }
}
