//! Render cache with sliding and absolute expiration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::render::Params;
use super::types::RenderedEmail;
use crate::config::TemplatesConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    template: String,
    params_hash: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    rendered: RenderedEmail,
    /// `updated_at` of the template the entry was rendered from
    template_updated_at: DateTime<Utc>,
    inserted_at: Instant,
    last_access: Instant,
}

/// Cache expiration settings
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub sliding: Duration,
    pub absolute: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sliding: Duration::from_secs(300),
            absolute: Duration::from_secs(3600),
            max_entries: 1000,
        }
    }
}

impl From<&TemplatesConfig> for CacheConfig {
    fn from(config: &TemplatesConfig) -> Self {
        Self {
            sliding: Duration::from_secs(config.cache_sliding_seconds),
            absolute: Duration::from_secs(config.cache_absolute_seconds),
            max_entries: config.cache_max_entries.max(1),
        }
    }
}

/// Rendered output keyed by template name and a digest of the parameters.
///
/// Entries die when idle longer than `sliding`, when older than `absolute`,
/// or when the template's `updated_at` no longer matches.
pub struct RenderCache {
    entries: DashMap<CacheKey, CacheEntry>,
    config: CacheConfig,
}

impl RenderCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn get(
        &self,
        template: &str,
        params: &Params,
        template_updated_at: DateTime<Utc>,
    ) -> Option<RenderedEmail> {
        let key = cache_key(template, params);
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(&key) {
            if entry.template_updated_at == template_updated_at && self.is_fresh(&entry, now) {
                entry.last_access = now;
                return Some(entry.rendered.clone());
            }
        } else {
            return None;
        }

        // Decided again under the shard lock, so an entry a concurrent insert
        // just wrote is not evicted on the strength of the old one
        self.entries
            .remove_if(&key, |_, entry| self.is_stale(entry, template_updated_at, now));
        None
    }

    pub fn insert(
        &self,
        template: &str,
        params: &Params,
        template_updated_at: DateTime<Utc>,
        rendered: RenderedEmail,
    ) {
        let key = cache_key(template, params);
        let now = Instant::now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.evict(now);
        }

        self.entries.insert(
            key,
            CacheEntry {
                rendered,
                template_updated_at,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    /// Drop every entry rendered from `template`.
    pub fn invalidate(&self, template: &str) {
        self.entries.retain(|key, _| key.template != template);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.last_access) < self.config.sliding
            && now.duration_since(entry.inserted_at) < self.config.absolute
    }

    /// Expired, or rendered from an older version of the template than the
    /// caller has seen. An entry from a newer version is left for its readers.
    fn is_stale(&self, entry: &CacheEntry, template_updated_at: DateTime<Utc>, now: Instant) -> bool {
        entry.template_updated_at < template_updated_at || !self.is_fresh(entry, now)
    }

    /// Remove expired entries, then the least recently used one if still full.
    fn evict(&self, now: Instant) {
        self.entries.retain(|_, entry| self.is_fresh(entry, now));

        if self.entries.len() < self.config.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

fn cache_key(template: &str, params: &Params) -> CacheKey {
    CacheKey {
        template: template.to_string(),
        params_hash: hash_params(params),
    }
}

/// SHA-256 over the parameters sorted by key, hex encoded.
pub fn hash_params(params: &Params) -> String {
    let mut pairs: Vec<_> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (key, value) in pairs {
        let value = value.to_string();
        // Length prefixes keep ("ab","c") and ("a","bc") apart
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
