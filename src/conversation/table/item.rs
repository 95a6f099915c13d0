//! Item, key and request types exchanged with a table.

use serde_json::{Map, Value};

/// Attribute map of an item, excluding its primary key.
pub type Attributes = Map<String, Value>;

/// Primary key of an item: partition key plus sort key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimaryKey {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
}

impl PrimaryKey {
    /// Build a primary key.
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// A stored row.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Primary key.
    pub key: PrimaryKey,
    /// Non-key attributes.
    pub attributes: Attributes,
}

impl Item {
    /// Build an item.
    #[must_use]
    pub const fn new(key: PrimaryKey, attributes: Attributes) -> Self {
        Self { key, attributes }
    }

    /// Keep only the named attributes. Key fields are always kept.
    #[must_use]
    pub fn project(mut self, names: &[String]) -> Self {
        self.attributes.retain(|name, _| names.contains(name));
        self
    }
}

/// Size of an item as counted against a page limit.
///
/// Measured on the stored form (keys plus serialized attributes) before any
/// projection, so a projected page spans the same items as a full one.
#[must_use]
pub fn stored_size(pk: &str, sk: &str, attributes_json: &str) -> usize {
    pk.len() + sk.len() + attributes_json.len()
}

/// Query over one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionQuery {
    /// Partition to read.
    pub partition_key: String,
    /// Only sort keys starting with this prefix.
    pub sort_key_prefix: Option<String>,
    /// Descending sort key order when `true`.
    pub descending: bool,
    /// Attribute names to return; all attributes when `None`.
    pub projection: Option<Vec<String>>,
    /// Resume strictly after this key (in query order).
    pub exclusive_start_key: Option<PrimaryKey>,
}

impl PartitionQuery {
    /// Ascending query over a whole partition.
    #[must_use]
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key_prefix: None,
            descending: false,
            projection: None,
            exclusive_start_key: None,
        }
    }

    /// Restrict to sort keys beginning with `prefix`.
    #[must_use]
    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    /// Return items in descending sort key order.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Return only the named attributes.
    #[must_use]
    pub fn project<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Continue after a previous page.
    #[must_use]
    pub fn start_after(mut self, key: PrimaryKey) -> Self {
        self.exclusive_start_key = Some(key);
        self
    }

    /// Whether `sort_key` falls within the prefix and after the start key.
    #[must_use]
    pub fn admits(&self, sort_key: &str) -> bool {
        if let Some(prefix) = &self.sort_key_prefix {
            if !sort_key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        match &self.exclusive_start_key {
            Some(start) if self.descending => sort_key < start.sk.as_str(),
            Some(start) => sort_key > start.sk.as_str(),
            None => true,
        }
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    /// Items of this page.
    pub items: Vec<Item>,
    /// Key to resume from; `None` when the query is exhausted.
    pub last_evaluated_key: Option<PrimaryKey>,
}

/// One operation of an atomic multi-item write.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Insert or fully replace an item.
    Put(Item),
    /// Set attributes on an item, creating it when absent (an upsert).
    Update {
        /// Target item.
        key: PrimaryKey,
        /// Attributes to set.
        set: Attributes,
    },
    /// Remove an item if present.
    Delete(PrimaryKey),
}

impl WriteOp {
    /// Primary key touched by the operation.
    #[must_use]
    pub const fn key(&self) -> &PrimaryKey {
        match self {
            Self::Put(item) => &item.key,
            Self::Update { key, .. } | Self::Delete(key) => key,
        }
    }
}
