//! Storefront catalog
//!
//! Raw catalog records carry tags (and images) either as a list or as one
//! comma-separated string. Both are folded into a canonical [`Product`] on
//! ingestion so the matcher never branches on representation.

pub mod cache;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use cache::ProductCache;
pub use http::HttpCatalog;

/// Default page size for a full listing.
pub const DEFAULT_LIST_LIMIT: usize = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagField {
    /// Scalars are stringified; nulls and nested values are dropped.
    List(Vec<Value>),
    Text(String),
}

impl TagField {
    /// Trimmed, non-empty entries in their original order.
    pub fn entries(&self) -> Vec<String> {
        let split = |s: &str| -> Vec<String> {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        };
        match self {
            TagField::List(items) => items
                .iter()
                .flat_map(|item| match item {
                    Value::String(s) => split(s.as_str()),
                    Value::Number(_) | Value::Bool(_) => split(item.to_string().as_str()),
                    _ => Vec::new(),
                })
                .collect(),
            TagField::Text(text) => split(text),
        }
    }
}

/// Product record as the catalog returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub handle: String,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub compare_at_price: Option<Value>,
    #[serde(default)]
    pub images: Option<TagField>,
    #[serde(default)]
    pub tags: Option<TagField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub price: Option<f64>,
    pub compare_at_price: Option<f64>,
    pub images: Vec<String>,
    /// Lowercased, trimmed, de-duplicated.
    pub tags: BTreeSet<String>,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Null becomes empty and numbers are printed, so one odd record does not
/// fail the whole listing.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(&Value::deserialize(deserializer)?))
}

fn value_to_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

impl From<RawProduct> for Product {
    fn from(raw: RawProduct) -> Self {
        let tags: BTreeSet<String> = raw
            .tags
            .as_ref()
            .map(|t| t.entries().into_iter().map(|tag| tag.to_lowercase()).collect())
            .unwrap_or_default();
        let images = raw.images.as_ref().map(TagField::entries).unwrap_or_default();

        Self {
            id: value_to_string(&raw.id),
            title: raw.title.trim().to_string(),
            handle: raw.handle.trim().to_string(),
            price: raw.price.as_ref().and_then(value_to_price),
            compare_at_price: raw.compare_at_price.as_ref().and_then(value_to_price),
            images,
            tags,
        }
    }
}

impl Product {
    /// Identifier with any `scheme://` prefix removed.
    pub fn normalized_id(&self) -> &str {
        normalize_id(&self.id)
    }

    /// True when either tag contains the other.
    pub fn matches_tag(&self, query_tag: &str) -> bool {
        let query_tag = query_tag.trim().to_lowercase();
        if query_tag.is_empty() {
            return false;
        }
        self.tags
            .iter()
            .any(|tag| tag.contains(&query_tag) || query_tag.contains(tag.as_str()))
    }

    pub fn shared_tag_count(&self, other: &Product) -> usize {
        self.tags.intersection(&other.tags).count()
    }
}

pub fn normalize_id(id: &str) -> &str {
    let id = id.trim();
    match id.find("://") {
        Some(pos) => &id[pos + 3..],
        None => id,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub limit: usize,
    pub collection: Option<String>,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            collection: None,
        }
    }
}

/// Upstream product listing (the storefront backend).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list(&self, query: &CatalogQuery) -> Result<Vec<RawProduct>>;

    async fn by_handle(&self, handle: &str) -> Result<Option<RawProduct>> {
        let wanted = handle.trim();
        let all = self.list(&CatalogQuery::default()).await?;
        Ok(all.into_iter().find(|p| p.handle.trim() == wanted))
    }

    async fn by_id(&self, id: &str) -> Result<Option<RawProduct>> {
        let wanted = normalize_id(id).to_string();
        let all = self.list(&CatalogQuery::default()).await?;
        Ok(all
            .into_iter()
            .find(|p| normalize_id(&value_to_string(&p.id)) == wanted))
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<RawProduct>> {
        let needle = text.trim().to_lowercase();
        let all = self.list(&CatalogQuery::default()).await?;
        Ok(all
            .into_iter()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }
}

/// Fixed in-memory catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    products: Vec<RawProduct>,
    list_calls: AtomicUsize,
}

impl StaticCatalog {
    pub fn new(products: Vec<RawProduct>) -> Self {
        Self {
            products,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Number of `list` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list(&self, query: &CatalogQuery) -> Result<Vec<RawProduct>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let collection = query.collection.as_deref().map(str::to_lowercase);
        Ok(self
            .products
            .iter()
            .filter(|p| match &collection {
                Some(c) => p
                    .extra
                    .get("collection")
                    .and_then(Value::as_str)
                    .is_some_and(|pc| pc.to_lowercase() == *c),
                None => true,
            })
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_list_and_string_normalize_identically() {
        let listed: RawProduct =
            serde_json::from_str(r#"{"id": 1, "tags": [" Crystal ", "Amethyst"]}"#).unwrap();
        let joined: RawProduct =
            serde_json::from_str(r#"{"id": 1, "tags": "crystal, amethyst,"}"#).unwrap();
        assert_eq!(Product::from(listed).tags, Product::from(joined).tags);
    }

    #[test]
    fn test_prices_and_images_normalized() {
        let raw: RawProduct = serde_json::from_str(
            r#"{"id": "gid://shopify/Product/42", "title": " Vòng tay ", "price": "250,000",
                "compareAtPrice": 300000, "images": "a.jpg, b.jpg"}"#,
        )
        .unwrap();
        let product = Product::from(raw);
        assert_eq!(product.title, "Vòng tay");
        assert_eq!(product.price, Some(250000.0));
        assert_eq!(product.compare_at_price, Some(300000.0));
        assert_eq!(product.images, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
        assert_eq!(product.normalized_id(), "shopify/Product/42");
    }

    #[test]
    fn test_tag_match_is_bidirectional_substring() {
        let raw: RawProduct =
            serde_json::from_str(r#"{"id": 1, "tags": ["crystal-bracelet", "tier"]}"#).unwrap();
        let product = Product::from(raw);
        assert!(product.matches_tag("crystal"));
        assert!(product.matches_tag("Tier 2"));
        assert!(!product.matches_tag("course"));
        assert!(!product.matches_tag("  "));
    }

    #[tokio::test]
    async fn test_default_lookups_use_listing() {
        let catalog = StaticCatalog::from_json_str(
            r#"[{"id": "gid://shop/1", "handle": "amethyst", "title": "Amethyst Cluster"},
                {"id": 2, "handle": "citrine", "title": "Citrine Point"}]"#,
        )
        .unwrap();

        let by_handle = catalog.by_handle("citrine").await.unwrap().unwrap();
        assert_eq!(by_handle.title, "Citrine Point");

        let by_id = catalog.by_id("shop/1").await.unwrap().unwrap();
        assert_eq!(by_id.handle, "amethyst");

        let found = catalog.search("cluster", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(catalog.list_calls(), 3);
    }

    #[test]
    fn test_listing_tolerates_null_fields_and_scalar_tags() {
        let catalog = StaticCatalog::from_json_str(
            r#"[{"id": 1, "title": "Amethyst", "handle": "amethyst", "tags": ["crystal"]},
                {"id": 2, "title": null, "handle": null, "tags": ["crystal", 5, null, {"x": 1}]},
                {"id": 3, "title": 7, "images": ["a.jpg", null]}]"#,
        )
        .unwrap();
        let products: Vec<Product> = catalog.products.iter().cloned().map(Product::from).collect();
        assert_eq!(products.len(), 3);

        assert_eq!(products[1].title, "");
        assert_eq!(products[1].handle, "");
        let tags: Vec<&str> = products[1].tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["5", "crystal"]);

        assert_eq!(products[2].title, "7");
        assert_eq!(products[2].images, vec!["a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_collection_filter() {
        let catalog = StaticCatalog::from_json_str(
            r#"[{"id": 1, "collection": "Crystals"}, {"id": 2, "collection": "courses"}]"#,
        )
        .unwrap();
        let query = CatalogQuery {
            limit: 10,
            collection: Some("crystals".into()),
        };
        assert_eq!(catalog.list(&query).await.unwrap().len(), 1);
    }
}
