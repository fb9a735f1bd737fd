use std::{borrow::Cow, sync::LazyLock};

use futures::StreamExt;
use redis::{Script, aio::ConnectionManager, cmd};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{CasOutcome, DocRef, DocSnapshot, DocumentStore, Feed};
use crate::{errors::StoreError, keys::KeyContext, query::Query};

const DOCUMENT_WRITE_SCRIPT_BODY: &str = include_str!("../../lua/document_write.lua");
const DOCUMENT_CAS_SCRIPT_BODY: &str = include_str!("../../lua/document_cas.lua");
const DOCUMENT_DELETE_SCRIPT_BODY: &str = include_str!("../../lua/document_delete.lua");

static DOCUMENT_WRITE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(DOCUMENT_WRITE_SCRIPT_BODY));
static DOCUMENT_CAS_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(DOCUMENT_CAS_SCRIPT_BODY));
static DOCUMENT_DELETE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(DOCUMENT_DELETE_SCRIPT_BODY));

const SCAN_COUNT: usize = 512;

/// Document store backed by Redis.
///
/// Each document is a hash `{prefix}:docs:{collection}:{id}` holding `version` and the
/// JSON-encoded `data`. Every write runs as a Lua script that bumps the version and publishes
/// the document id on `{prefix}:changes:{collection}`; feeds subscribe to that channel and
/// re-read on each notification.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub fn new(client: redis::Client, conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            client,
            conn,
            prefix: prefix.into(),
        }
    }

    /// Opens a managed connection to `url`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self::new(client, conn, prefix))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn keys(&self) -> KeyContext<'_> {
        KeyContext::new(&self.prefix)
    }

    /// Deletes every key under this store's prefix (SCAN + DEL, non-blocking).
    pub async fn cleanup(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

async fn read_document(conn: &mut ConnectionManager, key: &str, id: &str) -> Result<Option<DocSnapshot>, StoreError> {
    let (version, data): (Option<u64>, Option<String>) =
        cmd("HMGET").arg(key).arg("version").arg("data").query_async(conn).await?;
    match (version, data) {
        (Some(version), Some(data)) => Ok(Some(DocSnapshot {
            id: id.to_string(),
            version,
            data: serde_json::from_str(&data)?,
        })),
        _ => Ok(None),
    }
}

async fn run_query(conn: &mut ConnectionManager, prefix: &str, query: &Query) -> Result<Vec<DocSnapshot>, StoreError> {
    let keys = KeyContext::new(prefix);
    let pattern = keys.collection_pattern(&query.collection);
    let mut cursor: u64 = 0;
    let mut snapshots = Vec::new();

    loop {
        let (next_cursor, batch): (u64, Vec<String>) = cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await?;
        for key in &batch {
            let Some(id) = keys.document_id_from_key(&query.collection, key) else {
                continue;
            };
            if let Some(snapshot) = read_document(conn, key, id).await? {
                snapshots.push(snapshot);
            }
        }
        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(query.apply(snapshots))
}

/// Decodes a script reply, turning `{"error": ...}` payloads into store errors.
fn parse_script_reply(raw: &str, doc: &DocRef) -> Result<Value, StoreError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| StoreError::Other {
        message: Cow::Owned(format!("failed to parse lua response: {err}")),
    })?;

    match value.get("error").and_then(Value::as_str) {
        None => Ok(value),
        Some("already_exists") => Err(StoreError::AlreadyExists { path: doc.path() }),
        Some("not_found") => Err(StoreError::not_found(doc.path())),
        // Version conflicts are an outcome, not an error; the caller inspects `actual`.
        Some("version_conflict") => Ok(value),
        Some(other) => Err(StoreError::Other {
            message: Cow::Owned(other.to_string()),
        }),
    }
}

fn reply_version(value: &Value) -> Result<u64, StoreError> {
    value.get("version").and_then(Value::as_u64).ok_or_else(|| StoreError::Other {
        message: Cow::Borrowed("lua response carried no version"),
    })
}

impl RedisStore {
    async fn write(&self, doc: &DocRef, data: &Value, only_if_absent: bool) -> Result<u64, StoreError> {
        let keys = self.keys();
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_WRITE_SCRIPT.prepare_invoke();
        invocation.key(keys.document(&doc.collection, &doc.id));
        invocation.arg(serde_json::to_string(data)?);
        invocation.arg(keys.changes_channel(&doc.collection));
        invocation.arg(&doc.id);
        invocation.arg(if only_if_absent { "1" } else { "0" });
        let raw: String = invocation.invoke_async(&mut conn).await?;
        reply_version(&parse_script_reply(&raw, doc)?)
    }
}

impl DocumentStore for RedisStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        read_document(&mut conn, &self.keys().document(&doc.collection, &doc.id), &doc.id).await
    }

    async fn create(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
        self.write(doc, &data, true).await
    }

    async fn set(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
        self.write(doc, &data, false).await
    }

    async fn compare_and_set(
        &self,
        doc: &DocRef,
        expected_version: u64,
        data: Value,
    ) -> Result<CasOutcome, StoreError> {
        let keys = self.keys();
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_CAS_SCRIPT.prepare_invoke();
        invocation.key(keys.document(&doc.collection, &doc.id));
        invocation.arg(expected_version);
        invocation.arg(serde_json::to_string(&data)?);
        invocation.arg(keys.changes_channel(&doc.collection));
        invocation.arg(&doc.id);
        let raw: String = invocation.invoke_async(&mut conn).await?;

        let reply = parse_script_reply(&raw, doc)?;
        if reply.get("error").is_some() {
            let actual = reply.get("actual").and_then(Value::as_u64).unwrap_or_default();
            return Ok(CasOutcome::Stale { actual });
        }
        Ok(CasOutcome::Written {
            version: reply_version(&reply)?,
        })
    }

    async fn delete(&self, doc: &DocRef) -> Result<bool, StoreError> {
        let keys = self.keys();
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_DELETE_SCRIPT.prepare_invoke();
        invocation.key(keys.document(&doc.collection, &doc.id));
        invocation.arg(keys.changes_channel(&doc.collection));
        invocation.arg(&doc.id);
        let raw: String = invocation.invoke_async(&mut conn).await?;
        let reply = parse_script_reply(&raw, doc)?;
        Ok(reply.get("removed").and_then(Value::as_u64) == Some(1))
    }

    async fn query(&self, query: &Query) -> Result<Vec<DocSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        run_query(&mut conn, &self.prefix, query).await
    }

    async fn watch_document(&self, doc: &DocRef) -> Result<Feed<Option<DocSnapshot>>, StoreError> {
        let keys = self.keys();
        let key = keys.document(&doc.collection, &doc.id);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(keys.changes_channel(&doc.collection)).await?;

        // Read only after subscribing, so a write landing in between is still announced.
        let (tx, rx) = mpsc::unbounded_channel();
        let mut conn = self.conn.clone();
        let _ = tx.send(read_document(&mut conn, &key, &doc.id).await?);

        let doc = doc.clone();
        let pump = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let Ok(changed_id) = message.get_payload::<String>() else {
                    continue;
                };
                if changed_id != doc.id {
                    continue;
                }
                match read_document(&mut conn, &key, &doc.id).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("redis store: failed to refresh {doc}: {err}"),
                }
            }
            log::debug!("redis store: document feed for {doc} ended");
        });

        Ok(Feed::with_pump(rx, pump.abort_handle()))
    }

    async fn watch_query(&self, query: &Query) -> Result<Feed<Vec<DocSnapshot>>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.keys().changes_channel(&query.collection)).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut conn = self.conn.clone();
        let _ = tx.send(run_query(&mut conn, &self.prefix, query).await?);

        let prefix = self.prefix.clone();
        let query = query.clone();
        let pump = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while messages.next().await.is_some() {
                match run_query(&mut conn, &prefix, &query).await {
                    Ok(results) => {
                        if tx.send(results).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("redis store: failed to refresh query on {}: {err}", query.collection),
                }
            }
            log::debug!("redis store: query feed on {} ended", query.collection);
        });

        Ok(Feed::with_pump(rx, pump.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_errors_map_to_store_errors() {
        let doc = DocRef::new("posts", "p1");
        assert!(matches!(
            parse_script_reply(r#"{"error":"not_found"}"#, &doc),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            parse_script_reply(r#"{"error":"already_exists"}"#, &doc),
            Err(StoreError::AlreadyExists { .. })
        ));
        let conflict = parse_script_reply(r#"{"error":"version_conflict","expected":1,"actual":3}"#, &doc).unwrap();
        assert_eq!(conflict.get("actual").and_then(Value::as_u64), Some(3));
        assert_eq!(reply_version(&parse_script_reply(r#"{"version":4}"#, &doc).unwrap()).unwrap(), 4);
    }
}
