//! `SQLite` rendition of the single backing table.
//!
//! Every entity kind shares one table keyed by `(pk, sk)`, with attributes
//! stored as a JSON object. A second index on `sk` serves exact-match lookups
//! that do not know the partition.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::conversation::core::config::StorageConfig;
use crate::conversation::core::ids::UserId;
use crate::conversation::table::item::stored_size;
use crate::conversation::table::{
    Attributes, Item, PartitionQuery, PrimaryKey, QueryPage, StoreFuture, Table, TableError,
    TableProvider, TableResult, WriteOp, authorize,
};

type RawRow = (String, String, String);

enum UpdateOutcome {
    Applied,
    Missing,
    Failed(String),
}

/// Provider of scoped handles sharing one `SQLite` connection.
#[derive(Clone)]
pub struct SqliteTableProvider {
    conn: Arc<Connection>,
    table: String,
    index: String,
    page_size_bytes: usize,
}

impl SqliteTableProvider {
    /// Open the database and create the table and sort key index if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn new(config: &StorageConfig) -> TableResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(Arc::new(conn), config).await
    }

    /// Use an existing connection and create the table and index if needed.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn with_connection(conn: Arc<Connection>, config: &StorageConfig) -> TableResult<Self> {
        let table = config.table_name.clone();
        let index = format!("{}_{}", config.table_name, config.sort_key_index);
        let table_name = table.clone();
        let index_name = index.clone();

        conn.call(move |db| {
            db.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    pk TEXT NOT NULL,
                    sk TEXT NOT NULL,
                    attributes TEXT NOT NULL,
                    PRIMARY KEY (pk, sk)
                ) WITHOUT ROWID;
                CREATE INDEX IF NOT EXISTS {index_name}
                    ON {table_name} (sk);"
            ))?;
            Ok(())
        })
        .await?;

        info!(table = %table, index = %index, "sqlite table ready");

        Ok(Self {
            conn,
            table,
            index,
            page_size_bytes: config.page_size_bytes,
        })
    }
}

impl TableProvider for SqliteTableProvider {
    fn table_for_user(&self, user_id: &UserId) -> TableResult<Arc<dyn Table>> {
        Ok(Arc::new(SqliteTable {
            conn: Arc::clone(&self.conn),
            table: self.table.clone(),
            index: self.index.clone(),
            page_size_bytes: self.page_size_bytes,
            scope: user_id.as_str().to_string(),
        }))
    }
}

/// Handle onto the `SQLite` table, scoped to one partition.
pub struct SqliteTable {
    conn: Arc<Connection>,
    table: String,
    index: String,
    page_size_bytes: usize,
    scope: String,
}

impl Table for SqliteTable {
    fn query(&self, query: PartitionQuery) -> StoreFuture<'_, TableResult<QueryPage>> {
        Box::pin(async move {
            authorize(&self.scope, &query.partition_key)?;

            let table = self.table.clone();
            let limit = self.page_size_bytes;
            let descending = query.descending;
            let partition = query.partition_key.clone();
            let prefix = query.sort_key_prefix.clone().unwrap_or_default();
            let start = query.exclusive_start_key.as_ref().map(|key| key.sk.clone());

            let (rows, more) = self
                .conn
                .call(move |db| {
                    let (order, after) = if descending { ("DESC", "<") } else { ("ASC", ">") };
                    let mut stmt = db.prepare(&format!(
                        "SELECT pk, sk, attributes
                         FROM {table}
                         WHERE pk = ?1
                           AND substr(sk, 1, length(?2)) = ?2
                           AND (?3 IS NULL OR sk {after} ?3)
                         ORDER BY sk {order}"
                    ))?;
                    let mut cursor = stmt.query(rusqlite::params![partition, prefix, start])?;

                    let mut page: Vec<RawRow> = Vec::new();
                    let mut used = 0;
                    let mut has_more = false;
                    while let Some(row) = cursor.next()? {
                        let pk: String = row.get(0)?;
                        let sk: String = row.get(1)?;
                        let attributes: String = row.get(2)?;
                        let size = stored_size(&pk, &sk, &attributes);
                        if !page.is_empty() && used + size > limit {
                            has_more = true;
                            break;
                        }
                        used += size;
                        page.push((pk, sk, attributes));
                    }
                    Ok((page, has_more))
                })
                .await?;

            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let item = decode_row(row)?;
                items.push(match &query.projection {
                    Some(names) => item.project(names),
                    None => item,
                });
            }

            let last_evaluated_key = if more {
                items.last().map(|item| item.key.clone())
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
            let table = self.table.clone();
            let index = self.index.clone();
            let rows = self
                .conn
                .call(move |db| {
                    let mut stmt = db.prepare(&format!(
                        "SELECT pk, sk, attributes FROM {table} INDEXED BY {index} WHERE sk = ?1"
                    ))?;
                    let matches = stmt
                        .query_map(rusqlite::params![sort_key], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                        })?
                        .collect::<Result<Vec<RawRow>, rusqlite::Error>>()?;
                    Ok(matches)
                })
                .await?;

            rows.into_iter()
                .filter(|(pk, _, _)| *pk == self.scope)
                .map(decode_row)
                .collect()
        })
    }

    fn get_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<Option<Item>>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let table = self.table.clone();
            let lookup = key.clone();
            let attributes = self
                .conn
                .call(move |db| Ok(stored_attributes(db, &table, &lookup)?))
                .await?;

            match attributes {
                Some(json) => Ok(Some(Item::new(key, serde_json::from_str(&json)?))),
                None => Ok(None),
            }
        })
    }

    fn transact_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            for op in &ops {
                authorize(&self.scope, &op.key().pk)?;
            }
            self.apply_all(ops).await
        })
    }

    fn update_item(&self, key: PrimaryKey, set: Attributes) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let table = self.table.clone();
            let sort_key = key.sk.clone();
            let outcome = self
                .conn
                .call(move |db| {
                    let tx = db.transaction()?;
                    if stored_attributes(&tx, &table, &key)?.is_none() {
                        return Ok(UpdateOutcome::Missing);
                    }
                    if let Err(err) = apply_op(&tx, &table, WriteOp::Update { key, set }) {
                        return Ok(UpdateOutcome::Failed(err.to_string()));
                    }
                    tx.commit()?;
                    Ok(UpdateOutcome::Applied)
                })
                .await?;

            match outcome {
                UpdateOutcome::Applied => Ok(()),
                UpdateOutcome::Missing => Err(TableError::ConditionFailed { sort_key }),
                UpdateOutcome::Failed(reason) => {
                    Err(TableError::TransactionCanceled { index: 0, reason })
                }
            }
        })
    }

    fn delete_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<()>> {
        Box::pin(async move {
            authorize(&self.scope, &key.pk)?;
            let table = self.table.clone();
            self.conn
                .call(move |db| {
                    db.execute(
                        &format!("DELETE FROM {table} WHERE pk = ?1 AND sk = ?2"),
                        rusqlite::params![key.pk, key.sk],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

impl SqliteTable {
    /// Run `ops` in one transaction; nothing is committed if any of them fails.
    async fn apply_all(&self, ops: Vec<WriteOp>) -> TableResult<()> {
        let table = self.table.clone();
        let failure = self
            .conn
            .call(move |db| {
                let tx = db.transaction()?;
                for (index, op) in ops.into_iter().enumerate() {
                    if let Err(err) = apply_op(&tx, &table, op) {
                        return Ok(Some((index, err.to_string())));
                    }
                }
                tx.commit()?;
                Ok(None)
            })
            .await?;

        match failure {
            Some((index, reason)) => Err(TableError::TransactionCanceled { index, reason }),
            None => Ok(()),
        }
    }
}

fn apply_op(tx: &rusqlite::Transaction<'_>, table: &str, op: WriteOp) -> TableResult<()> {
    match op {
        WriteOp::Put(item) => {
            let attributes = serde_json::to_string(&item.attributes)?;
            tx.execute(
                &format!("INSERT OR REPLACE INTO {table} (pk, sk, attributes) VALUES (?1, ?2, ?3)"),
                rusqlite::params![item.key.pk, item.key.sk, attributes],
            )?;
        }
        WriteOp::Update { key, set } => {
            let mut attributes: Attributes = match stored_attributes(tx, table, &key)? {
                Some(json) => serde_json::from_str(&json)?,
                None => Attributes::new(),
            };
            attributes.extend(set);
            let attributes = serde_json::to_string(&attributes)?;
            tx.execute(
                &format!("INSERT OR REPLACE INTO {table} (pk, sk, attributes) VALUES (?1, ?2, ?3)"),
                rusqlite::params![key.pk, key.sk, attributes],
            )?;
        }
        WriteOp::Delete(key) => {
            tx.execute(
                &format!("DELETE FROM {table} WHERE pk = ?1 AND sk = ?2"),
                rusqlite::params![key.pk, key.sk],
            )?;
        }
    }
    Ok(())
}

fn stored_attributes(
    db: &rusqlite::Connection,
    table: &str,
    key: &PrimaryKey,
) -> rusqlite::Result<Option<String>> {
    db.query_row(
        &format!("SELECT attributes FROM {table} WHERE pk = ?1 AND sk = ?2"),
        rusqlite::params![key.pk, key.sk],
        |row| row.get(0),
    )
    .optional()
}

fn decode_row((pk, sk, attributes): RawRow) -> TableResult<Item> {
    Ok(Item::new(
        PrimaryKey::new(pk, sk),
        serde_json::from_str(&attributes)?,
    ))
}
