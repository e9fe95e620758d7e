use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use retailops_core::TenantId;

/// Keyed storage for a disposable read model, partitioned by tenant.
///
/// A tenant can only ever see its own rows; `clear_tenant` is used when a
/// projection is rebuilt.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    fn clear_tenant(&self, tenant_id: TenantId);
}

/// One map per tenant behind a single lock.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    partitions: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let partitions = self.partitions.read().ok()?;
        partitions.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut partitions) = self.partitions.write() {
            partitions.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        self.partitions
            .read()
            .ok()
            .and_then(|p| p.get(&tenant_id).map(|rows| rows.values().cloned().collect()))
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut partitions) = self.partitions.write() {
            partitions.remove(&tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_do_not_see_each_other() {
        let store = InMemoryTenantStore::<u32, &str>::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, 1, "a-one");
        store.upsert(b, 1, "b-one");

        assert_eq!(store.get(a, &1), Some("a-one"));
        assert_eq!(store.get(b, &1), Some("b-one"));
        assert_eq!(store.list(a), vec!["a-one"]);
    }

    #[test]
    fn clear_tenant_only_drops_that_tenant() {
        let store = InMemoryTenantStore::<u32, u32>::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, 1, 10);
        store.upsert(b, 1, 20);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some(20));
    }
}
