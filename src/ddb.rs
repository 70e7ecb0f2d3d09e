use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb as ddb;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use chrono::{DateTime, Utc};
use ddb::types::AttributeValue as Av;

use crate::clicks::{ClickEvent, ClickSink};
use crate::error::{ClickError, ResolveError, Result};
use crate::model::{Namespace, Shortcut};
use crate::repository::{order_candidates, ShortcutRepository};

/// Upper bound on pages read for one candidate query.
const MAX_QUERY_PAGES: usize = 8;

fn unavailable<E>(op: &str, e: E) -> ResolveError
where
    E: std::error::Error + ProvideErrorMetadata + 'static,
{
    tracing::error!(op, code = ?e.code(), msg = ?e.message(), "ddb call failed");
    ResolveError::RepositoryUnavailable(format!("{op}: {}", DisplayErrorContext(&e)))
}

fn s<'a>(item: &'a HashMap<String, Av>, name: &str) -> Option<&'a String> {
    item.get(name).and_then(|v| v.as_s().ok())
}

fn n(item: &HashMap<String, Av>, name: &str) -> Option<i64> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse::<i64>().ok())
}

fn ts(item: &HashMap<String, Av>, name: &str) -> Option<DateTime<Utc>> {
    n(item, name).and_then(|secs| DateTime::from_timestamp(secs, 0))
}

pub(crate) fn shortcut_from_item(item: &HashMap<String, Av>) -> Option<Shortcut> {
    let namespace = Namespace::parse(s(item, "namespace")?)?;
    let key = s(item, "key")?.clone();
    let destination = s(item, "destination")?.clone();
    let created_at = ts(item, "created_at").unwrap_or_default();
    Some(Shortcut {
        namespace,
        key,
        destination_template: destination,
        owner: s(item, "owner_id").cloned().unwrap_or_else(|| "system".to_string()),
        created_at,
        updated_at: ts(item, "updated_at").unwrap_or(created_at),
        visit_count: n(item, "visits").unwrap_or(0).max(0) as u64,
        last_used_at: ts(item, "last_used_at"),
    })
}

/// Partition key `namespace`, sort key `key`. `destination` and `owner_id` are
/// strings; `created_at`, `updated_at`, `last_used_at` and `visits` are numbers.
#[derive(Clone)]
pub struct DynamoRepository {
    ddb: ddb::Client,
    table: String,
}

impl DynamoRepository {
    pub fn new(ddb: ddb::Client, table: impl Into<String>) -> Self {
        Self {
            ddb,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ShortcutRepository for DynamoRepository {
    async fn lookup(&self, namespace: &Namespace, key: &str) -> Result<Option<Shortcut>> {
        let r = self
            .ddb
            .get_item()
            .table_name(&self.table)
            .key("namespace", Av::S(namespace.to_string()))
            .key("key", Av::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| unavailable("get_item", e))?;

        Ok(r.item().and_then(|item| {
            let parsed = shortcut_from_item(item);
            if parsed.is_none() {
                tracing::warn!(namespace = %namespace, key, "skipping malformed shortcut item");
            }
            parsed
        }))
    }

    async fn lookup_prefix_candidates(
        &self,
        namespace: &Namespace,
        key_prefix: &str,
    ) -> Result<Vec<Shortcut>> {
        let mut found = Vec::new();
        let mut start: Option<HashMap<String, Av>> = None;

        for _ in 0..MAX_QUERY_PAGES {
            let resp = self
                .ddb
                .query()
                .table_name(&self.table)
                .key_condition_expression("#ns = :ns AND begins_with(#k, :p)")
                .expression_attribute_names("#ns", "namespace")
                .expression_attribute_names("#k", "key")
                .expression_attribute_values(":ns", Av::S(namespace.to_string()))
                .expression_attribute_values(":p", Av::S(key_prefix.to_string()))
                .consistent_read(true)
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(|e| unavailable("query", e))?;

            found.extend(resp.items().iter().filter_map(shortcut_from_item));

            match resp.last_evaluated_key() {
                Some(lek) if !lek.is_empty() => start = Some(lek.clone()),
                _ => break,
            }
        }
        if start.is_some() {
            tracing::warn!(namespace = %namespace, key_prefix, "candidate query truncated");
        }

        Ok(order_candidates(key_prefix, found))
    }
}

/// Increments `visits` and stamps `last_used_at` on the matched item.
#[derive(Clone)]
pub struct DynamoClickSink {
    ddb: ddb::Client,
    table: String,
}

impl DynamoClickSink {
    pub fn new(ddb: ddb::Client, table: impl Into<String>) -> Self {
        Self {
            ddb,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ClickSink for DynamoClickSink {
    async fn record(&self, event: ClickEvent) -> std::result::Result<(), ClickError> {
        let r = self
            .ddb
            .update_item()
            .table_name(&self.table)
            .key("namespace", Av::S(event.namespace.to_string()))
            .key("key", Av::S(event.key.clone()))
            .update_expression("ADD visits :inc SET last_used_at = :ts")
            // a shortcut deleted since resolution must not come back as a stub
            .condition_expression("attribute_exists(#k)")
            .expression_attribute_names("#k", "key")
            .expression_attribute_values(":inc", Av::N("1".into()))
            .expression_attribute_values(":ts", Av::N(event.at.timestamp().to_string()))
            .send()
            .await;

        match r {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.code() == Some("ConditionalCheckFailedException") {
                    tracing::debug!(namespace = %event.namespace, key = %event.key, "shortcut gone before click landed");
                    return Ok(());
                }
                Err(ClickError::Store(DisplayErrorContext(&e).to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pairs: &[(&str, Av)]) -> HashMap<String, Av> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn parses_full_item() {
        let it = item(&[
            ("namespace", Av::S("org:eng".into())),
            ("key", Av::S("oncall".into())),
            ("destination", Av::S("https://pager.example.com/*".into())),
            ("owner_id", Av::S("alice".into())),
            ("created_at", Av::N("1700000000".into())),
            ("visits", Av::N("12".into())),
            ("last_used_at", Av::N("1700000500".into())),
        ]);
        let s = shortcut_from_item(&it).unwrap();
        assert_eq!(s.namespace, Namespace::org("eng"));
        assert_eq!(s.key, "oncall");
        assert_eq!(s.owner, "alice");
        assert_eq!(s.visit_count, 12);
        assert_eq!(s.created_at.timestamp(), 1_700_000_000);
        assert_eq!(s.updated_at, s.created_at);
        assert_eq!(s.last_used_at.map(|t| t.timestamp()), Some(1_700_000_500));
    }

    #[test]
    fn missing_destination_is_rejected() {
        let it = item(&[
            ("namespace", Av::S("global".into())),
            ("key", Av::S("docs".into())),
        ]);
        assert!(shortcut_from_item(&it).is_none());
    }

    #[test]
    fn owner_defaults_to_system() {
        let it = item(&[
            ("namespace", Av::S("global".into())),
            ("key", Av::S("docs".into())),
            ("destination", Av::S("https://docs.example.com".into())),
        ]);
        assert_eq!(shortcut_from_item(&it).unwrap().owner, "system");
    }
}
