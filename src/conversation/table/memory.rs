//! In-memory table for tests and local runs.
//!
//! Follows the same page, projection, scoping and transaction rules as the
//! `SQLite` table, and adds fault injection plus call counters so callers can
//! observe atomicity and page caps.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::conversation::core::ids::UserId;
use crate::conversation::table::item::stored_size;
use crate::conversation::table::{
    Attributes, Item, PartitionQuery, PrimaryKey, QueryPage, StoreFuture, Table, TableError,
    TableProvider, TableResult, WriteOp, authorize,
};

#[derive(Debug, Default)]
struct FaultPlan {
    transact_op: Option<usize>,
    deletes_before_failure: Option<usize>,
}

#[derive(Debug, Default)]
struct TableState {
    items: BTreeMap<PrimaryKey, Attributes>,
    faults: FaultPlan,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<TableState>,
    page_size_bytes: usize,
    query_calls: AtomicUsize,
}

/// Provider of scoped handles onto one shared in-memory table.
#[derive(Clone, Debug)]
pub struct InMemoryTableProvider {
    shared: Arc<Shared>,
}

impl InMemoryTableProvider {
    /// Create an empty table whose pages hold at most `page_size_bytes`.
    #[must_use]
    pub fn new(page_size_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TableState::default()),
                page_size_bytes,
                query_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next multi-item write fail at operation `index`.
    pub async fn fail_transaction_at(&self, index: usize) {
        self.shared.state.lock().await.faults.transact_op = Some(index);
    }

    /// Let `count` more single-item deletes succeed, then fail the next one.
    pub async fn fail_delete_after(&self, count: usize) {
        self.shared.state.lock().await.faults.deletes_before_failure = Some(count);
    }

    /// Read an item regardless of scope.
    pub async fn item(&self, key: &PrimaryKey) -> Option<Item> {
        let state = self.shared.state.lock().await;
        state
            .items
            .get(key)
            .map(|attributes| Item::new(key.clone(), attributes.clone()))
    }

    /// Insert or replace an item regardless of scope.
    pub async fn seed(&self, item: Item) {
        let mut state = self.shared.state.lock().await;
        state.items.insert(item.key, item.attributes);
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.items.len()
    }

    /// Whether the table holds no item.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of partition queries served so far.
    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.shared.query_calls.load(Ordering::SeqCst)
    }
}

impl TableProvider for InMemoryTableProvider {
    fn table_for_user(&self, user_id: &UserId) -> TableResult<Arc<dyn Table>> {
        Ok(Arc::new(InMemoryTable {
            shared: Arc::clone(&self.shared),
            scope: user_id.as_str().to_string(),
        }))
    }
}

/// Handle onto the in-memory table, scoped to one partition.
#[derive(Debug)]
pub struct InMemoryTable {
    shared: Arc<Shared>,
    scope: String,
}

impl Table for InMemoryTable {
    fn query(&self, query: PartitionQuery) -> StoreFuture<'_, TableResult<QueryPage>> {
        Box::pin(async move {
            authorize(&self.scope, &query.partition_key)?;
            self.shared.query_calls.fetch_add(1, Ordering::SeqCst);

            let state = self.shared.state.lock().await;
            let mut candidates: Vec<(&PrimaryKey, &Attributes)> = state
                .items
                .range(PrimaryKey::new(query.partition_key.clone(), String::new())..)
                .take_while(|(key, _)| key.pk == query.partition_key)
                .filter(|(key, _)| query.admits(&key.sk))
                .collect();
            if query.descending {
                candidates.reverse();
            }

            let mut items = Vec::new();
            let mut used = 0;
            let mut more = false;
            for (key, attributes) in candidates {
                let size = stored_size(&key.pk, &key.sk, &serde_json::to_string(attributes)?);
                if !items.is_empty() && used + size > self.shared.page_size_bytes {
                    more = true;
                    break;
                }
                used += size;
                let item = Item::new(key.clone(), attributes.clone());
                items.push(match &query.projection {
                    Some(names) => item.project(names),
                    None => item,
                });
            }

            let last_evaluated_key = if more {
                items.last().map(|item: &Item| item.key.clone())
            } else {
                None
            };
            Ok(QueryPage {
                items,
                last_evaluated_key,
            })
        })
    }

    fn query_sort_key_index(&self, sort_key: &str) -> StoreFuture<'_, TableResult<Vec<Item>>> {
        let sort_key = sort_key.to_string();
        Box::pin(async move {
            let state = self.shared.state.lock().await;
            Ok(state
                .items
                .iter()
                .filter(|(key, _)| key.sk == sort_key && key.pk == self.scope)
                .map(|(key, attributes)| Item::new(key.clone(), attributes.clone()))
                .collect())
        })
    }

    fn get_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<Option<Item>>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let state = self.shared.state.lock().await;
            Ok(state
                .items
                .get(&key)
                .map(|attributes| Item::new(key.clone(), attributes.clone())))
        })
    }

    fn transact_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            for op in &ops {
                authorize(&self.scope, &op.key().pk)?;
            }

            let mut state = self.shared.state.lock().await;
            let fail_at = state.faults.transact_op.take();
            let mut staged = state.items.clone();
            for (index, op) in ops.into_iter().enumerate() {
                if fail_at == Some(index) {
                    return Err(TableError::TransactionCanceled {
                        index,
                        reason: "injected failure".to_string(),
                    });
                }
                apply(&mut staged, op);
            }
            state.items = staged;
            Ok(())
        })
    }

    fn update_item(&self, key: PrimaryKey, set: Attributes) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let mut state = self.shared.state.lock().await;
            if !state.items.contains_key(&key) {
                return Err(TableError::ConditionFailed { sort_key: key.sk });
            }
            apply(&mut state.items, WriteOp::Update { key, set });
            Ok(())
        })
    }

    fn delete_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let mut state = self.shared.state.lock().await;
            match state.faults.deletes_before_failure {
                Some(0) => {
                    state.faults.deletes_before_failure = None;
                    return Err(TableError::Injected(format!("delete of {}", key.sk)));
                }
                Some(remaining) => state.faults.deletes_before_failure = Some(remaining - 1),
                None => {}
            }
            state.items.remove(&key);
            Ok(())
        })
    }
}

fn apply(items: &mut BTreeMap<PrimaryKey, Attributes>, op: WriteOp) {
    match op {
        WriteOp::Put(item) => {
            items.insert(item.key, item.attributes);
        }
        WriteOp::Update { key, set } => {
            items.entry(key).or_default().extend(set);
        }
        WriteOp::Delete(key) => {
            items.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn item(pk: &str, sk: &str, title: &str) -> Item {
        let mut attributes = Attributes::new();
        attributes.insert("Title".to_string(), json!(title));
        Item::new(PrimaryKey::new(pk, sk), attributes)
    }

    #[tokio::test]
    async fn test_query_orders_and_filters_by_prefix() {
        let provider = InMemoryTableProvider::new(1024 * 1024);
        provider.seed(item("u", "u#CONV#a", "a")).await;
        provider.seed(item("u", "u#CONV#b", "b")).await;
        provider.seed(item("u", "u#BOT#x", "bot")).await;
        provider.seed(item("v", "v#CONV#c", "other user")).await;

        let table = provider.table_for_user(&user("u")).unwrap();
        let page = table
            .query(PartitionQuery::new("u").begins_with("u#CONV#").descending())
            .await
            .unwrap();
        let keys: Vec<_> = page.items.iter().map(|i| i.key.sk.as_str()).collect();
        assert_eq!(keys, vec!["u#CONV#b", "u#CONV#a"]);
        assert!(page.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_pages_are_size_limited() {
        let provider = InMemoryTableProvider::new(40);
        for n in 0..5 {
            provider.seed(item("u", &format!("u#CONV#{n}"), "title")).await;
        }
        let table = provider.table_for_user(&user("u")).unwrap();

        let mut seen = Vec::new();
        let mut query = PartitionQuery::new("u").begins_with("u#CONV#");
        loop {
            let page = table.query(query.clone()).await.unwrap();
            assert!(!page.items.is_empty());
            seen.extend(page.items.into_iter().map(|i| i.key.sk));
            match page.last_evaluated_key {
                Some(key) => query = query.start_after(key),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
        assert!(provider.query_calls() > 1);
    }

    #[tokio::test]
    async fn test_scope_is_enforced() {
        let provider = InMemoryTableProvider::new(1024);
        provider.seed(item("v", "v#CONV#c", "theirs")).await;
        let table = provider.table_for_user(&user("u")).unwrap();

        let err = table.query(PartitionQuery::new("v")).await.unwrap_err();
        assert!(matches!(err, TableError::AccessDenied { .. }));
        assert!(table.query_sort_key_index("v#CONV#c").await.unwrap().is_empty());
        assert!(table.delete_item(PrimaryKey::new("v", "v#CONV#c")).await.is_err());
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_injected_transaction_failure_applies_nothing() {
        let provider = InMemoryTableProvider::new(1024);
        let table = provider.table_for_user(&user("u")).unwrap();
        provider.fail_transaction_at(1).await;

        let err = table
            .transact_write(vec![
                WriteOp::Put(item("u", "u#CONV#a", "a")),
                WriteOp::Put(item("u", "u#BOT#b", "b")),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::TransactionCanceled { index: 1, .. }));
        assert!(provider.is_empty().await);

        table
            .transact_write(vec![WriteOp::Put(item("u", "u#CONV#a", "a"))])
            .await
            .unwrap();
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_merges_attributes() {
        let provider = InMemoryTableProvider::new(1024);
        provider.seed(item("u", "u#BOT#b", "My bot")).await;
        let table = provider.table_for_user(&user("u")).unwrap();

        let mut set = Attributes::new();
        set.insert("LastBotUsed".to_string(), json!(12.5));
        table
            .update_item(PrimaryKey::new("u", "u#BOT#b"), set)
            .await
            .unwrap();

        let stored = provider.item(&PrimaryKey::new("u", "u#BOT#b")).await.unwrap();
        assert_eq!(stored.attributes["Title"], json!("My bot"));
        assert_eq!(stored.attributes["LastBotUsed"], json!(12.5));
    }

    #[tokio::test]
    async fn test_update_of_missing_item_creates_nothing() {
        let provider = InMemoryTableProvider::new(1024);
        let table = provider.table_for_user(&user("u")).unwrap();

        let mut set = Attributes::new();
        set.insert("Title".to_string(), json!("orphan"));
        let err = table
            .update_item(PrimaryKey::new("u", "u#CONV#gone"), set)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::ConditionFailed { ref sort_key } if sort_key == "u#CONV#gone"
        ));
        assert!(provider.is_empty().await);
    }
}
