use dashmap::DashMap;

/// Remembers listing results per prefix until they are invalidated.
///
/// Object listings are the one read that may be served stale; existence
/// checks and reads always go to the store.
#[derive(Debug, Default)]
pub struct ListingCache {
    entries: DashMap<String, Vec<String>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prefix: &str) -> Option<Vec<String>> {
        self.entries.get(prefix).map(|keys| keys.clone())
    }

    pub fn insert(&self, prefix: &str, keys: Vec<String>) {
        self.entries.insert(prefix.to_string(), keys);
    }

    /// Drops every cached listing at or below `prefix`.
    pub fn invalidate(&self, prefix: &str) {
        self.entries.retain(|cached, _| !cached.starts_with(prefix));
    }
}
