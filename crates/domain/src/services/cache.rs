use std::{sync::Arc, time::Duration};

use moka::sync::Cache;

use crate::model::{ApiKeyHash, ServiceId, ServiceRecord};

/// Resolves API key hashes to their owning service without a database
/// round-trip on every authenticated request. Entries expire on their own;
/// deleting a key must call [`ApiKeyCache::invalidate`].
#[derive(Debug, Clone)]
pub struct ApiKeyCache {
    entries: Cache<String, ServiceId>,
}

impl ApiKeyCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub fn get(&self, hash: &ApiKeyHash) -> Option<ServiceId> {
        self.entries.get(hash.as_str())
    }

    pub fn insert(&self, hash: &ApiKeyHash, service_id: ServiceId) {
        self.entries.insert(hash.as_str().to_owned(), service_id);
    }

    pub fn invalidate(&self, hash: &ApiKeyHash) {
        self.entries.invalidate(hash.as_str());
    }
}

impl Default for ApiKeyCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

/// Tag-addressed cache for per-user service lists (`user-{id}-services`).
/// Writers revalidate by dropping the tag; the next read repopulates it.
#[derive(Debug, Clone)]
pub struct TaggedCache {
    entries: Cache<String, Arc<Vec<ServiceRecord>>>,
}

impl TaggedCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(Self::DEFAULT_CAPACITY)
                .build(),
        }
    }

    pub fn get(&self, tag: &str) -> Option<Arc<Vec<ServiceRecord>>> {
        self.entries.get(tag)
    }

    pub fn insert(&self, tag: impl Into<String>, value: Vec<ServiceRecord>) -> Arc<Vec<ServiceRecord>> {
        let value = Arc::new(value);
        self.entries.insert(tag.into(), Arc::clone(&value));
        value
    }

    pub fn revalidate(&self, tag: &str) {
        self.entries.invalidate(tag);
    }
}

impl Default for TaggedCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{hash_api_key, UserId};
    use chrono::Utc;

    #[test]
    fn api_key_cache_hits_and_invalidates() {
        let cache = ApiKeyCache::default();
        let hash = hash_api_key("npk_test");
        let service = ServiceId::new_v4();
        assert_eq!(cache.get(&hash), None);
        cache.insert(&hash, service);
        assert_eq!(cache.get(&hash), Some(service));
        cache.invalidate(&hash);
        assert_eq!(cache.get(&hash), None);
    }

    #[test]
    fn api_key_cache_expires() {
        let cache = ApiKeyCache::new(Duration::from_millis(10));
        let hash = hash_api_key("npk_short");
        cache.insert(&hash, ServiceId::new_v4());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&hash), None);
    }

    #[test]
    fn tagged_cache_revalidates() {
        let cache = TaggedCache::default();
        let user_id = UserId::new_v4();
        let tag = crate::model::user_services_tag(&user_id);
        let service = ServiceRecord {
            id: ServiceId::new_v4(),
            user_id,
            name: "shop".into(),
            display_name: "shop".into(),
            avatar_url: None,
            description: None,
            website: None,
            contact_email: None,
            created_at: Utc::now(),
        };
        cache.insert(tag.clone(), vec![service]);
        assert_eq!(cache.get(&tag).map(|list| list.len()), Some(1));
        cache.revalidate(&tag);
        assert!(cache.get(&tag).is_none());
    }
}
