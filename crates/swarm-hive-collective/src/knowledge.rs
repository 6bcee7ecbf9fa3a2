//! Knowledge store seam.
//!
//! The engine writes votes, round context and execution results to a
//! namespaced key-value store as an audit trail. Nothing in the engine reads
//! the store back to make a decision, so a failing store degrades the audit
//! trail but never a run.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::warn;

/// Trait for the namespaced key-value store the engine records into.
///
/// Keys are hierarchical, `/`-separated paths such as
/// `hive/consensus/{roundId}/results`.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Store a value, replacing any previous value under the same key.
    async fn store(&self, key: &str, value: Value) -> Result<()>;

    /// Return up to `limit` values whose keys match `pattern`.
    async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<Value>>;
}

/// Builds the hierarchical keys used by the engine under one namespace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: namespace.trim_end_matches('/').to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn consensus_context(&self, round_id: &str) -> String {
        format!("{}/consensus/{}/context", self.namespace, round_id)
    }

    pub fn consensus_results(&self, round_id: &str) -> String {
        format!("{}/consensus/{}/results", self.namespace, round_id)
    }

    pub fn execution(&self, agent_id: &str, timestamp_nanos: i64) -> String {
        format!("{}/execution/{}/{}", self.namespace, agent_id, timestamp_nanos)
    }

    pub fn run_config(&self, run_id: &str) -> String {
        format!("{}/hive/{}/config", self.namespace, run_id)
    }

    pub fn run_results(&self, run_id: &str) -> String {
        format!("{}/hive/{}/results", self.namespace, run_id)
    }
}

/// Write an audit record, logging instead of failing when the store errors.
pub(crate) async fn record(store: &dyn KnowledgeStore, key: &str, value: Value) {
    if let Err(e) = store.store(key, value).await {
        warn!("Failed to record {} in knowledge store: {}", key, e);
    }
}

/// In-process store backed by an ordered map.
///
/// Patterns use `*` as a wildcard spanning any characters, including `/`.
/// A pattern without a wildcard matches every key it prefixes.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a single value by exact key.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Keys matching `pattern`, in key order.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = compile_pattern(pattern)?;
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn store(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<Value>> {
        let matcher = compile_pattern(pattern)?;
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(k, _)| matcher.is_match(k))
            .take(limit)
            .map(|(_, v)| v.clone())
            .collect())
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    let anchored = if pattern.contains('*') {
        format!("^{}$", body)
    } else {
        format!("^{}", body)
    };
    Ok(Regex::new(&anchored)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_space_layout() {
        let keys = KeySpace::new("hive/");
        assert_eq!(keys.namespace(), "hive");
        assert_eq!(keys.consensus_context("r1"), "hive/consensus/r1/context");
        assert_eq!(keys.consensus_results("r1"), "hive/consensus/r1/results");
        assert_eq!(keys.execution("agent-1", 42), "hive/execution/agent-1/42");
        assert_eq!(keys.run_config("run-9"), "hive/hive/run-9/config");
        assert_eq!(keys.run_results("run-9"), "hive/hive/run-9/results");
    }

    #[tokio::test]
    async fn test_search_with_wildcard() {
        let store = InMemoryKnowledgeStore::new();
        store.store("hive/consensus/a/context", json!({"n": 1})).await.unwrap();
        store.store("hive/consensus/a/results", json!({"n": 2})).await.unwrap();
        store.store("hive/consensus/b/results", json!({"n": 3})).await.unwrap();
        store.store("hive/execution/x/1", json!({"n": 4})).await.unwrap();

        let results = store.search("hive/consensus/*/results", 10).await.unwrap();
        assert_eq!(results, vec![json!({"n": 2}), json!({"n": 3})]);

        let limited = store.search("hive/*", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_search_without_wildcard_is_prefix() {
        let store = InMemoryKnowledgeStore::new();
        store.store("hive/execution/a/1", json!(1)).await.unwrap();
        store.store("hive/execution/a/2", json!(2)).await.unwrap();
        store.store("hive/execution/b/1", json!(3)).await.unwrap();

        let results = store.search("hive/execution/a/", 10).await.unwrap();
        assert_eq!(results, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_store_overwrites_same_key() {
        let store = InMemoryKnowledgeStore::new();
        store.store("hive/hive/run/results", json!({"passed": false})).await.unwrap();
        store.store("hive/hive/run/results", json!({"passed": true})).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("hive/hive/run/results").await,
            Some(json!({"passed": true}))
        );
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let matcher = compile_pattern("hive/run.1/*").unwrap();
        assert!(matcher.is_match("hive/run.1/config"));
        assert!(!matcher.is_match("hive/runx1/config"));
    }
}
