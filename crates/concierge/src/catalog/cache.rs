//! Product Cache & Tag Matcher
//!
//! Holds one time-limited snapshot of the catalog. Refresh happens lazily on
//! the first read after expiry, and a snapshot is only replaced by a non-empty
//! fetch: a failed or empty refresh keeps serving the previous items.
//!
//! Concurrent stale reads may each fetch upstream; the last writer wins.
//! A failed refresh leaves `fetched_at` untouched, so during an outage every
//! read retries upstream and can wait up to the fetch timeout.

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CatalogQuery, CatalogSource, Product};
use crate::config::CacheConfig;
use crate::error::{ConciergeError, Result};

struct Snapshot {
    items: Arc<Vec<Product>>,
    fetched_at: Instant,
}

pub struct ProductCache {
    source: Arc<dyn CatalogSource>,
    snapshot: RwLock<Option<Snapshot>>,
    ttl: Duration,
    fetch_limit: usize,
    fetch_timeout: Duration,
    rng: Mutex<StdRng>,
}

impl ProductCache {
    pub fn new(source: Arc<dyn CatalogSource>, config: &CacheConfig) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            ttl: config.ttl(),
            fetch_limit: config.fetch_limit,
            fetch_timeout: config.fetch_timeout(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.rng.lock() = rng;
        self
    }

    /// Drop the snapshot; the next read refetches.
    pub fn clear(&self) {
        *self.snapshot.write() = None;
        tracing::debug!("Product cache cleared");
    }

    pub fn is_fresh(&self) -> bool {
        self.snapshot
            .read()
            .as_ref()
            .is_some_and(|s| s.fetched_at.elapsed() < self.ttl)
    }

    /// Current items, refreshing first when the snapshot is stale or absent.
    ///
    /// Errors only when the fetch fails and there is no snapshot to fall back on.
    pub async fn products(&self) -> Result<Arc<Vec<Product>>> {
        let stale = {
            let guard = self.snapshot.read();
            match guard.as_ref() {
                Some(s) if s.fetched_at.elapsed() < self.ttl => return Ok(s.items.clone()),
                Some(s) => Some(s.items.clone()),
                None => None,
            }
        };

        match self.fetch().await {
            Ok(items) if !items.is_empty() => {
                let items = Arc::new(items);
                *self.snapshot.write() = Some(Snapshot {
                    items: items.clone(),
                    fetched_at: Instant::now(),
                });
                tracing::debug!(count = items.len(), "Product cache refreshed");
                Ok(items)
            }
            Ok(_) => {
                tracing::warn!("Catalog returned no products, keeping previous snapshot");
                Ok(stale.unwrap_or_default())
            }
            Err(e) => match stale {
                Some(items) => {
                    tracing::warn!(error = %e, "Catalog refresh failed, serving stale snapshot");
                    Ok(items)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch(&self) -> Result<Vec<Product>> {
        let query = CatalogQuery {
            limit: self.fetch_limit,
            collection: None,
        };
        let raw = tokio::time::timeout(self.fetch_timeout, self.source.list(&query))
            .await
            .map_err(|_| ConciergeError::CatalogTimeout(self.fetch_timeout))?
            .map_err(ConciergeError::Catalog)?;
        Ok(raw.into_iter().map(Product::from).collect())
    }

    fn shuffled(&self, mut items: Vec<Product>, limit: usize) -> Vec<Product> {
        items.shuffle(&mut *self.rng.lock());
        items.truncate(limit);
        items
    }

    /// Products whose tags overlap any query tag (substring either way).
    ///
    /// Query entries may themselves be comma-separated lists. Matches come back
    /// shuffled. With no match, `fallback_to_random` returns a random slice of
    /// the whole snapshot instead of nothing.
    pub async fn get_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        limit: usize,
        fallback_to_random: bool,
    ) -> Result<Vec<Product>> {
        let wanted: Vec<String> = tags
            .iter()
            .flat_map(|t| t.as_ref().split(','))
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let items = self.products().await?;
        let matched: Vec<Product> = items
            .iter()
            .filter(|p| wanted.iter().any(|t| p.matches_tag(t)))
            .cloned()
            .collect();

        tracing::debug!(tags = ?wanted, matched = matched.len(), "Tag lookup");

        if !matched.is_empty() {
            Ok(self.shuffled(matched, limit))
        } else if fallback_to_random {
            Ok(self.shuffled(items.as_ref().clone(), limit))
        } else {
            Ok(Vec::new())
        }
    }

    /// Products sharing the most tags with `product`, or a random slice of the
    /// rest when nothing shares a tag.
    pub async fn recommend_for(&self, product: &Product, limit: usize) -> Result<Vec<Product>> {
        let others = self.others(product).await?;

        let mut scored: Vec<(usize, Product)> = others
            .iter()
            .map(|p| (p.shared_tag_count(product), p.clone()))
            .filter(|(score, _)| *score > 0)
            .collect();

        if scored.is_empty() {
            return Ok(self.shuffled(others, limit));
        }

        // Stable: equal scores keep snapshot order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, p)| p).collect())
    }

    /// Random products other than `product`, without any tag scoring.
    pub async fn unrelated(&self, product: &Product, limit: usize) -> Result<Vec<Product>> {
        let others = self.others(product).await?;
        Ok(self.shuffled(others, limit))
    }

    async fn others(&self, product: &Product) -> Result<Vec<Product>> {
        let exclude = product.normalized_id().to_string();
        let items = self.products().await?;
        Ok(items
            .iter()
            .filter(|p| p.normalized_id() != exclude)
            .cloned()
            .collect())
    }

    /// Snapshot lookup first, then the catalog's own handle lookup.
    pub async fn find_by_handle(&self, handle: &str) -> Result<Option<Product>> {
        let wanted = handle.trim();
        if let Ok(items) = self.products().await {
            if let Some(found) = items.iter().find(|p| p.handle == wanted) {
                return Ok(Some(found.clone()));
            }
        }
        let raw = self
            .with_timeout(self.source.by_handle(wanted))
            .await?;
        Ok(raw.map(Product::from))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Product>> {
        let wanted = super::normalize_id(id).to_string();
        if let Ok(items) = self.products().await {
            if let Some(found) = items.iter().find(|p| p.normalized_id() == wanted) {
                return Ok(Some(found.clone()));
            }
        }
        let raw = self.with_timeout(self.source.by_id(&wanted)).await?;
        Ok(raw.map(Product::from))
    }

    /// Free-text search over titles and tags; asks the catalog when the
    /// snapshot has no hit.
    pub async fn search(&self, text: &str, limit: usize) -> Result<Vec<Product>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        if let Ok(items) = self.products().await {
            let hits: Vec<Product> = items
                .iter()
                .filter(|p| {
                    p.title.to_lowercase().contains(&needle)
                        || p.tags.iter().any(|t| t.contains(&needle))
                })
                .take(limit)
                .cloned()
                .collect();
            if !hits.is_empty() {
                return Ok(hits);
            }
        }

        let raw = self.with_timeout(self.source.search(&needle, limit)).await?;
        Ok(raw.into_iter().map(Product::from).collect())
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| ConciergeError::CatalogTimeout(self.fetch_timeout))?
            .map_err(ConciergeError::Catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawProduct, StaticCatalog};
    use async_trait::async_trait;
    use std::collections::HashSet;

    fn raw(id: usize, tags: &str) -> RawProduct {
        serde_json::from_value(serde_json::json!({
            "id": format!("gid://shop/Product/{}", id),
            "title": format!("Product {}", id),
            "handle": format!("product-{}", id),
            "tags": tags,
        }))
        .unwrap()
    }

    /// Ten products, two of them tagged with something containing "crystal".
    fn ten_products() -> Vec<RawProduct> {
        (0..10)
            .map(|i| match i {
                2 => raw(i, "crystal-bracelet, amethyst"),
                7 => raw(i, "Crystal"),
                i if i % 2 == 0 => raw(i, "course, tier"),
                _ => raw(i, "bundle"),
            })
            .collect()
    }

    fn cache_over(source: Arc<dyn CatalogSource>, ttl_secs: u64) -> ProductCache {
        let config = CacheConfig {
            ttl_secs,
            ..CacheConfig::default()
        };
        ProductCache::new(source, &config).with_rng(StdRng::seed_from_u64(3))
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Serve,
        Empty,
        Fail,
        Slow,
    }

    struct FlakyCatalog {
        inner: StaticCatalog,
        mode: Mutex<Mode>,
    }

    impl FlakyCatalog {
        fn new(products: Vec<RawProduct>) -> Self {
            Self {
                inner: StaticCatalog::new(products),
                mode: Mutex::new(Mode::Serve),
            }
        }

        fn set(&self, mode: Mode) {
            *self.mode.lock() = mode;
        }
    }

    #[async_trait]
    impl CatalogSource for FlakyCatalog {
        async fn list(&self, query: &CatalogQuery) -> anyhow::Result<Vec<RawProduct>> {
            let mode = *self.mode.lock();
            match mode {
                Mode::Serve => self.inner.list(query).await,
                Mode::Empty => Ok(Vec::new()),
                Mode::Fail => Err(anyhow::anyhow!("upstream unavailable")),
                Mode::Slow => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    self.inner.list(query).await
                }
            }
        }
    }

    #[tokio::test]
    async fn test_tag_match_returns_only_matching_products() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let found = cache.get_by_tags(&["crystal"], 3, true).await.unwrap();

        let ids: HashSet<String> = found.iter().map(|p| p.handle.clone()).collect();
        assert_eq!(found.len(), 2);
        assert!(ids.contains("product-2"));
        assert!(ids.contains("product-7"));
    }

    #[tokio::test]
    async fn test_no_match_without_fallback_is_empty() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let found = cache.get_by_tags(&["zzz-no-match"], 3, false).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_with_fallback_draws_from_everything() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let found = cache.get_by_tags(&["zzz-no-match"], 3, true).await.unwrap();
        assert_eq!(found.len(), 3);
        let unique: HashSet<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_comma_separated_query_tags() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let found = cache.get_by_tags(&["amethyst, nothing"], 5, false).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].handle, "product-2");
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_reused() {
        let source = Arc::new(StaticCatalog::new(ten_products()));
        let cache = cache_over(source.clone(), 300);
        cache.get_by_tags(&["tier"], 3, false).await.unwrap();
        cache.get_by_tags(&["bundle"], 3, false).await.unwrap();
        assert_eq!(source.list_calls(), 1);
        assert!(cache.is_fresh());

        cache.clear();
        assert!(!cache.is_fresh());
        cache.get_by_tags(&["bundle"], 3, false).await.unwrap();
        assert_eq!(source.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_snapshot_survives_empty_and_failed_refresh() {
        let source = Arc::new(FlakyCatalog::new(ten_products()));
        // Zero TTL: every read is a refresh attempt.
        let cache = cache_over(source.clone(), 0);
        assert_eq!(cache.products().await.unwrap().len(), 10);

        source.set(Mode::Empty);
        assert_eq!(cache.products().await.unwrap().len(), 10);

        source.set(Mode::Fail);
        assert_eq!(cache.products().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_snapshot_errors() {
        let source = Arc::new(FlakyCatalog::new(ten_products()));
        source.set(Mode::Fail);
        let cache = cache_over(source.clone(), 300);
        assert!(matches!(
            cache.get_by_tags(&["crystal"], 3, true).await,
            Err(ConciergeError::Catalog(_))
        ));

        source.set(Mode::Empty);
        assert!(cache.get_by_tags(&["crystal"], 3, true).await.unwrap().is_empty());
    }

    fn impatient_cache(source: Arc<dyn CatalogSource>) -> ProductCache {
        let config = CacheConfig {
            ttl_secs: 0,
            fetch_timeout_secs: 1,
            ..CacheConfig::default()
        };
        ProductCache::new(source, &config).with_rng(StdRng::seed_from_u64(3))
    }

    #[tokio::test]
    async fn test_timed_out_fetch_without_snapshot_errors() {
        let source = Arc::new(FlakyCatalog::new(ten_products()));
        source.set(Mode::Slow);
        let cache = impatient_cache(source);
        assert!(matches!(
            cache.products().await,
            Err(ConciergeError::CatalogTimeout(_))
        ));
        assert!(!cache.is_fresh());
    }

    #[tokio::test]
    async fn test_timed_out_refresh_keeps_stale_snapshot() {
        let source = Arc::new(FlakyCatalog::new(ten_products()));
        let cache = impatient_cache(source.clone());
        assert_eq!(cache.products().await.unwrap().len(), 10);

        source.set(Mode::Slow);
        let started = Instant::now();
        let items = cache.products().await.unwrap();
        assert_eq!(items.len(), 10);
        assert!(started.elapsed() < Duration::from_secs(4));

        let found = cache.get_by_tags(&["crystal"], 3, false).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_recommend_ranks_by_shared_tags() {
        let products = vec![
            raw(1, "crystal, amethyst, bracelet"),
            raw(2, "crystal"),
            raw(3, "crystal, amethyst"),
            raw(4, "course"),
        ];
        let cache = cache_over(Arc::new(StaticCatalog::new(products)), 300);
        let items = cache.products().await.unwrap();
        let anchor = items[0].clone();

        let recommended = cache.recommend_for(&anchor, 2).await.unwrap();
        let handles: Vec<&str> = recommended.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(handles, vec!["product-3", "product-2"]);
    }

    #[tokio::test]
    async fn test_recommend_excludes_anchor_by_normalized_id() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let mut anchor = cache.products().await.unwrap()[4].clone();
        anchor.id = "shop/Product/4".to_string();

        let recommended = cache.recommend_for(&anchor, 10).await.unwrap();
        assert!(recommended.iter().all(|p| p.handle != "product-4"));
        assert!(!recommended.is_empty());
    }

    #[tokio::test]
    async fn test_recommend_falls_back_to_random_when_nothing_shared() {
        let products = vec![raw(1, "alpha"), raw(2, "beta"), raw(3, "gamma")];
        let cache = cache_over(Arc::new(StaticCatalog::new(products)), 300);
        let anchor = cache.products().await.unwrap()[0].clone();

        let recommended = cache.recommend_for(&anchor, 5).await.unwrap();
        assert_eq!(recommended.len(), 2);
        assert!(recommended.iter().all(|p| p.handle != "product-1"));
    }

    #[tokio::test]
    async fn test_unrelated_ignores_tags() {
        let cache = cache_over(Arc::new(StaticCatalog::new(ten_products())), 300);
        let anchor = cache.products().await.unwrap()[2].clone();
        let picks = cache.unrelated(&anchor, 9).await.unwrap();
        assert_eq!(picks.len(), 9);
        assert!(picks.iter().all(|p| p.handle != "product-2"));
    }

    #[tokio::test]
    async fn test_lookups_served_from_snapshot() {
        let source = Arc::new(StaticCatalog::new(ten_products()));
        let cache = cache_over(source.clone(), 300);

        let by_handle = cache.find_by_handle("product-5").await.unwrap().unwrap();
        assert_eq!(by_handle.title, "Product 5");

        let by_id = cache.find_by_id("gid://shop/Product/6").await.unwrap().unwrap();
        assert_eq!(by_id.handle, "product-6");

        let hits = cache.search("amethyst", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_search_falls_through_to_catalog() {
        let source = Arc::new(StaticCatalog::new(ten_products()));
        let cache = cache_over(source.clone(), 300);
        assert!(cache.search("does-not-exist", 5).await.unwrap().is_empty());
        assert!(cache.find_by_handle("missing").await.unwrap().is_none());
    }
}
