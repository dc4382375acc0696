//! Storefront catalog over HTTP.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{CatalogQuery, CatalogSource, RawProduct};

/// Listing payloads come back either bare or wrapped in `products`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<RawProduct>),
    Wrapped { products: Vec<RawProduct> },
}

impl Listing {
    fn into_products(self) -> Vec<RawProduct> {
        match self {
            Listing::Bare(products) | Listing::Wrapped { products } => products,
        }
    }
}

pub struct HttpCatalog {
    endpoint: String,
    client: Client,
}

impl HttpCatalog {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<RawProduct>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| anyhow!("Catalog request to {} failed: {}", self.endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read catalog body from {}: {}", self.endpoint, e))?;

        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(anyhow!("Catalog {} returned HTTP {}: {}", self.endpoint, status, preview));
        }
        if body.trim_start().starts_with('<') {
            return Err(anyhow!(
                "Catalog {} returned HTML instead of JSON (HTTP {})",
                self.endpoint,
                status
            ));
        }

        let listing: Listing = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!("Failed to parse catalog JSON from {}: {}. Body: {}", self.endpoint, e, preview)
        })?;
        Ok(listing.into_products())
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn list(&self, query: &CatalogQuery) -> Result<Vec<RawProduct>> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(collection) = &query.collection {
            params.push(("collection", collection.clone()));
        }
        self.fetch(&params).await
    }

    async fn by_handle(&self, handle: &str) -> Result<Option<RawProduct>> {
        let products = self.fetch(&[("handle", handle.to_string())]).await?;
        Ok(products.into_iter().find(|p| p.handle == handle))
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<RawProduct>> {
        let mut products = self
            .fetch(&[("q", text.to_string()), ("limit", limit.to_string())])
            .await?;
        products.truncate(limit);
        Ok(products)
    }
}
