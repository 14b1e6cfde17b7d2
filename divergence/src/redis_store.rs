// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::store::{DivergenceStore, NodeStat, StoreError};

/// All entries live in a single Redis hash keyed by the root path, one
/// field per entry, valued `"<version>|<content>"`. Keeping everything
/// on one key makes `create_or_set` and the conditional delete
/// single-key scripts and `HGETALL` a consistent snapshot.
const CREATE_OR_SET_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[1], ARGV[1])
local version = 0
if cur then
  local sep = string.find(cur, '|', 1, true)
  version = tonumber(string.sub(cur, 1, sep - 1)) + 1
end
redis.call('HSET', KEYS[1], ARGV[1], version .. '|' .. ARGV[2])
return version
"#;

const CONDITIONAL_DELETE_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[1], ARGV[1])
if not cur then
  return 0
end
local sep = string.find(cur, '|', 1, true)
local version = tonumber(string.sub(cur, 1, sep - 1))
if tonumber(ARGV[2]) == -1 or version == tonumber(ARGV[2]) then
  redis.call('HDEL', KEYS[1], ARGV[1])
  return 1
end
return 0
"#;

/// Redis-backed registry shared by a fleet of workers.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    root: String,
}

impl RedisStore {
    pub async fn new(client: redis::Client, root: impl Into<String>) -> Result<Self, StoreError> {
        let conn = client.get_tokio_connection_manager().await?;
        Ok(RedisStore {
            conn,
            root: root.into(),
        })
    }

    /// Round-trip check used at startup, before any convergence runs.
    pub async fn verify_connection(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

/// Split a stored `"<version>|<content>"` field value.
fn parse_entry(raw: &str) -> Result<(i64, &str), StoreError> {
    let (version, content) = raw
        .split_once('|')
        .ok_or_else(|| StoreError::Internal(format!("Malformed registry entry: {raw}")))?;
    let version = version
        .parse::<i64>()
        .map_err(|_| StoreError::Internal(format!("Malformed registry version: {raw}")))?;
    Ok((version, content))
}

#[async_trait]
impl DivergenceStore for RedisStore {
    async fn create_or_set(&self, name: &str, content: &[u8]) -> Result<NodeStat, StoreError> {
        let mut conn = self.conn.clone();
        let version: i64 = Script::new(CREATE_OR_SET_SCRIPT)
            .key(&self.root)
            .arg(name)
            .arg(content)
            .invoke_async(&mut conn)
            .await?;
        Ok(NodeStat { version })
    }

    async fn get_children_with_stats(&self) -> Result<Vec<(String, NodeStat)>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&self.root)
            .query_async(&mut conn)
            .await?;
        let mut children = raw
            .into_iter()
            .map(|(name, value)| {
                let (version, _) = parse_entry(&value)?;
                Ok((name, NodeStat { version }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    async fn delete(&self, name: &str, expected_version: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(CONDITIONAL_DELETE_SCRIPT)
            .key(&self.root)
            .arg(name)
            .arg(expected_version)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::parse_entry;
    use crate::store::StoreError;

    #[test]
    fn parses_version_and_content() {
        assert_eq!(parse_entry("3|dirty").unwrap(), (3, "dirty"));
        assert_eq!(parse_entry("0|").unwrap(), (0, ""));
        // Content may itself contain the separator.
        assert_eq!(parse_entry("7|a|b").unwrap(), (7, "a|b"));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(matches!(
            parse_entry("dirty"),
            Err(StoreError::Internal(_))
        ));
        assert!(matches!(
            parse_entry("x|dirty"),
            Err(StoreError::Internal(_))
        ));
    }
}
