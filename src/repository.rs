use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ResolveError, Result};
use crate::model::{Namespace, Shortcut};

/// The query contract the resolver depends on.
///
/// Implementations must tolerate many concurrent readers. Every call is an
/// independent read; nothing is cached between calls by the resolver.
#[async_trait]
pub trait ShortcutRepository: Send + Sync + 'static {
    /// Exact match on a canonical key. `Ok(None)` is a plain miss.
    async fn lookup(&self, namespace: &Namespace, key: &str) -> Result<Option<Shortcut>>;

    /// Every shortcut in `namespace` whose key is `key_prefix` or starts with
    /// `key_prefix/`, longest key first, then by key.
    async fn lookup_prefix_candidates(
        &self,
        namespace: &Namespace,
        key_prefix: &str,
    ) -> Result<Vec<Shortcut>>;
}

/// Keep only keys that sit on a segment boundary under `prefix`, in contract order.
pub fn order_candidates(prefix: &str, mut found: Vec<Shortcut>) -> Vec<Shortcut> {
    let boundary = format!("{prefix}/");
    found.retain(|s| s.key == prefix || s.key.starts_with(&boundary));
    found.sort_by(|a, b| b.key.len().cmp(&a.key.len()).then_with(|| a.key.cmp(&b.key)));
    found
}

/// Process-local repository for tests and local runs.
#[derive(Default)]
pub struct InMemoryRepository {
    items: RwLock<BTreeMap<(Namespace, String), Shortcut>>,
    unavailable: RwLock<Option<String>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shortcuts(shortcuts: impl IntoIterator<Item = Shortcut>) -> Self {
        let repo = Self::new();
        for s in shortcuts {
            repo.upsert(s);
        }
        repo
    }

    pub fn upsert(&self, shortcut: Shortcut) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.insert((shortcut.namespace.clone(), shortcut.key.clone()), shortcut);
    }

    pub fn remove(&self, namespace: &Namespace, key: &str) -> Option<Shortcut> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.remove(&(namespace.clone(), key.to_string()))
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<Shortcut> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.get(&(namespace.clone(), key.to_string())).cloned()
    }

    /// Simulate a datastore outage; `None` restores service.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        let mut u = self.unavailable.write().unwrap_or_else(|e| e.into_inner());
        *u = reason.map(str::to_string);
    }

    fn check_available(&self) -> Result<()> {
        let u = self.unavailable.read().unwrap_or_else(|e| e.into_inner());
        match u.as_ref() {
            Some(reason) => Err(ResolveError::RepositoryUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ShortcutRepository for InMemoryRepository {
    async fn lookup(&self, namespace: &Namespace, key: &str) -> Result<Option<Shortcut>> {
        self.check_available()?;
        Ok(self.get(namespace, key))
    }

    async fn lookup_prefix_candidates(
        &self,
        namespace: &Namespace,
        key_prefix: &str,
    ) -> Result<Vec<Shortcut>> {
        self.check_available()?;
        let found: Vec<Shortcut> = {
            let items = self.items.read().unwrap_or_else(|e| e.into_inner());
            items
                .range((namespace.clone(), key_prefix.to_string())..)
                .take_while(|((ns, key), _)| ns == namespace && key.starts_with(key_prefix))
                .map(|(_, s)| s.clone())
                .collect()
        };
        Ok(order_candidates(key_prefix, found))
    }
}
