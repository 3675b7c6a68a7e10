//! Content provider access.
//!
//! [`ContentApi`] is the seam to remote content providers; [`HttpContentApi`]
//! talks to OCS-style JSON endpoints with [`reqwest`]. [`OcsApiHandler`]
//! keeps the providers and categories sections of the user config in sync.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::dispatch::HandlerRegistry;
use crate::handlers::config::{ConfigHandler, Section, DEFAULT_INSTALL_TYPE};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One content provider, keyed by its `location` URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub location: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

impl Provider {
    pub fn key(&self) -> &str {
        &self.location
    }
}

/// A category as reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Filters and paging for a content listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub categories: String,
    pub xdg_types: String,
    pub package_types: String,
    pub search: String,
    pub sortmode: String,
    pub pagesize: i64,
    pub page: i64,
}

/// One page of content from a single provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPage {
    pub total_items: u64,
    pub items: Vec<Value>,
}

/// Errors from talking to a content provider.
#[derive(Debug, thiserror::Error)]
pub enum ContentApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider returned {status} for {url}")]
    Status { url: String, status: u16 },

    /// The response was not in the expected shape.
    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Remote content provider operations.
#[async_trait]
pub trait ContentApi: Send + Sync + 'static {
    /// Fetch the providers listed in a provider file.
    async fn fetch_providers(&self, url: &str) -> Result<Vec<Provider>, ContentApiError>;

    async fn fetch_categories(&self, provider: &Provider) -> Result<Vec<Category>, ContentApiError>;

    async fn fetch_contents(
        &self,
        provider: &Provider,
        query: &ContentQuery,
    ) -> Result<ContentPage, ContentApiError>;

    async fn fetch_content(
        &self,
        provider: &Provider,
        content_id: &str,
    ) -> Result<Value, ContentApiError>;
}

// ---------------------------------------------------------------------------
// HttpContentApi
// ---------------------------------------------------------------------------

/// [`ContentApi`] over HTTP.
///
/// Provider files are JSON, either a list of providers or
/// `{"providers": [...]}`. Provider endpoints answer
/// `{"status": "ok", "totalitems": n, "data": [...]}`.
pub struct HttpContentApi {
    client: reqwest::Client,
}

impl HttpContentApi {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ContentApiError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContentApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// GET an endpoint below the provider and return its `data` array.
    async fn get_data(
        &self,
        provider: &Provider,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(Vec<Value>, u64), ContentApiError> {
        let url = endpoint(&provider.location, path);
        let mut full_query = vec![("format", "json".to_string())];
        full_query.extend_from_slice(query);

        let body = self.get_json(&url, &full_query).await?;
        let decode = |reason: &str| ContentApiError::Decode {
            url: url.clone(),
            reason: reason.to_string(),
        };

        if body.get("status").and_then(Value::as_str) != Some("ok") {
            return Err(decode("status is not ok"));
        }
        let data = match body.get("data") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Object(_)) => vec![body["data"].clone()],
            _ => return Err(decode("missing data")),
        };
        let total = body
            .get("totalitems")
            .and_then(Value::as_u64)
            .unwrap_or(data.len() as u64);

        Ok((data, total))
    }
}

impl Default for HttpContentApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn fetch_providers(&self, url: &str) -> Result<Vec<Provider>, ContentApiError> {
        let body = self.get_json(url, &[]).await?;
        let list = match body {
            Value::Object(mut object) => object.remove("providers").unwrap_or(Value::Null),
            other => other,
        };
        serde_json::from_value(list).map_err(|e| ContentApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_categories(&self, provider: &Provider) -> Result<Vec<Category>, ContentApiError> {
        let (data, _) = self.get_data(provider, "content/categories", &[]).await?;
        data.into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| ContentApiError::Decode {
                    url: endpoint(&provider.location, "content/categories"),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn fetch_contents(
        &self,
        provider: &Provider,
        query: &ContentQuery,
    ) -> Result<ContentPage, ContentApiError> {
        let params = [
            ("categories", query.categories.clone()),
            ("xdg_types", query.xdg_types.clone()),
            ("package_types", query.package_types.clone()),
            ("search", query.search.clone()),
            ("sortmode", query.sortmode.clone()),
            ("pagesize", query.pagesize.to_string()),
            ("page", query.page.to_string()),
        ];
        let (items, total_items) = self.get_data(provider, "content/data", &params).await?;
        Ok(ContentPage { total_items, items })
    }

    async fn fetch_content(
        &self,
        provider: &Provider,
        content_id: &str,
    ) -> Result<Value, ContentApiError> {
        let path = format!("content/data/{content_id}");
        let (mut data, _) = self.get_data(provider, &path, &[]).await?;
        if data.is_empty() {
            return Err(ContentApiError::Decode {
                url: endpoint(&provider.location, &path),
                reason: "empty data".to_string(),
            });
        }
        Ok(data.swap_remove(0))
    }
}

fn endpoint(location: &str, path: &str) -> String {
    format!("{}/{}", location.trim_end_matches('/'), path)
}

// ---------------------------------------------------------------------------
// OcsApiHandler
// ---------------------------------------------------------------------------

pub struct OcsApiHandler {
    config: Arc<ConfigHandler>,
    api: Arc<dyn ContentApi>,
}

impl OcsApiHandler {
    pub fn new(config: Arc<ConfigHandler>, api: Arc<dyn ContentApi>) -> Self {
        Self { config, api }
    }

    /// A configured provider, if its stored entry is well formed.
    pub async fn provider(&self, provider_key: &str) -> Option<Provider> {
        let value = self.config.entry(Section::Providers, provider_key).await?;
        serde_json::from_value(value).ok()
    }

    /// Fetch one content entry from a configured provider.
    pub async fn content(
        &self,
        provider_key: &str,
        content_id: &str,
    ) -> Result<Option<Value>, ContentApiError> {
        match self.provider(provider_key).await {
            Some(provider) => self.api.fetch_content(&provider, content_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Add every provider listed in a provider file, then sync their
    /// categories. Returns whether at least one provider was added.
    pub async fn add_providers(&self, provider_file_url: &str) -> bool {
        let providers = match self.api.fetch_providers(provider_file_url).await {
            Ok(providers) => providers,
            Err(e) => {
                tracing::warn!(url = provider_file_url, error = %e, "Failed to fetch providers");
                return false;
            }
        };

        let mut added = 0usize;
        for provider in providers {
            let key = provider.key().to_string();
            let value = match serde_json::to_value(&provider) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(provider = %key, error = %e, "Skipping provider");
                    continue;
                }
            };
            if let Err(e) = self.config.set_entry(Section::Providers, &key, value).await {
                tracing::error!(provider = %key, error = %e, "Failed to store provider");
                continue;
            }
            added += 1;
            self.update_categories(&key, false).await;
        }

        tracing::info!(url = provider_file_url, added, "Providers added");
        added > 0
    }

    pub async fn remove_provider(&self, provider_key: &str) -> bool {
        let removed = self
            .config
            .remove_entry(Section::Providers, provider_key)
            .await
            .and(
                self.config
                    .remove_entry(Section::Categories, provider_key)
                    .await,
            );
        match removed {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(provider = provider_key, error = %e, "Failed to remove provider");
                false
            }
        }
    }

    /// Sync categories for every provider. Returns `false` if any failed.
    pub async fn update_all_categories(&self, force: bool) -> bool {
        let keys: Vec<String> = self
            .config
            .section(Section::Providers)
            .await
            .keys()
            .cloned()
            .collect();

        let mut all_ok = true;
        for key in keys {
            all_ok &= self.update_categories(&key, force).await;
        }
        all_ok
    }

    /// Sync one provider's categories.
    ///
    /// Without `force`, an already synced provider is left alone. Install
    /// types chosen for existing categories are preserved.
    pub async fn update_categories(&self, provider_key: &str, force: bool) -> bool {
        let Some(provider) = self.provider(provider_key).await else {
            tracing::warn!(provider = provider_key, "Unknown provider");
            return false;
        };

        let existing = self.config.entry(Section::Categories, provider_key).await;
        if existing.is_some() && !force {
            return true;
        }

        let categories = match self.api.fetch_categories(&provider).await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!(provider = provider_key, error = %e, "Failed to fetch categories");
                return false;
            }
        };

        let previous = existing
            .as_ref()
            .and_then(|value| value.get("categories"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut synced = Map::new();
        for category in categories {
            let install_type = previous
                .get(&category.id)
                .and_then(|c| c.get("install_type"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_INSTALL_TYPE)
                .to_string();
            synced.insert(
                category.id.clone(),
                json!({
                    "id": category.id,
                    "name": category.name,
                    "install_type": install_type,
                }),
            );
        }

        let count = synced.len();
        let result = self
            .config
            .set_entry(
                Section::Categories,
                provider_key,
                json!({ "categories": synced }),
            )
            .await;
        match result {
            Ok(()) => {
                tracing::info!(provider = provider_key, count, "Categories updated");
                true
            }
            Err(e) => {
                tracing::error!(provider = provider_key, error = %e, "Failed to store categories");
                false
            }
        }
    }

    /// List contents across providers.
    ///
    /// `provider_keys` is comma separated; empty means every provider.
    /// Items are tagged with their `provider` key.
    pub async fn get_contents(&self, provider_keys: &str, query: &ContentQuery) -> Value {
        let keys: Vec<String> = if provider_keys.trim().is_empty() {
            self.config
                .section(Section::Providers)
                .await
                .keys()
                .cloned()
                .collect()
        } else {
            split_list(provider_keys)
        };

        let mut total_items = 0u64;
        let mut items = Vec::new();
        let mut failures = 0usize;

        for key in &keys {
            let Some(provider) = self.provider(key).await else {
                failures += 1;
                continue;
            };
            match self.api.fetch_contents(&provider, query).await {
                Ok(page) => {
                    total_items += page.total_items;
                    items.extend(page.items.into_iter().map(|mut item| {
                        if let Some(object) = item.as_object_mut() {
                            object.insert("provider".to_string(), json!(key));
                        }
                        item
                    }));
                }
                Err(e) => {
                    tracing::warn!(provider = %key, error = %e, "Failed to fetch contents");
                    failures += 1;
                }
            }
        }

        let status = if !keys.is_empty() && failures == keys.len() {
            "error"
        } else {
            "ok"
        };
        json!({
            "status": status,
            "totalitems": total_items,
            "itemsperpage": query.pagesize,
            "data": items,
        })
    }

    pub async fn get_content(&self, provider_key: &str, content_id: &str) -> Value {
        match self.content(provider_key, content_id).await {
            Ok(Some(content)) => json!({ "status": "ok", "data": [content] }),
            Ok(None) => json!({ "status": "error", "message": "Unknown provider" }),
            Err(e) => {
                tracing::warn!(provider = provider_key, content_id, error = %e, "Failed to fetch content");
                json!({ "status": "error", "message": e.to_string() })
            }
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<OcsApiHandler>) {
    registry.bind("OcsApiHandler::addProviders", 1, handler, |h, args| async move {
        let url = args.string(0)?;
        Ok(vec![json!(h.add_providers(&url).await)])
    });
    registry.bind("OcsApiHandler::removeProvider", 1, handler, |h, args| async move {
        let key = args.string(0)?;
        Ok(vec![json!(h.remove_provider(&key).await)])
    });
    registry.bind(
        "OcsApiHandler::updateAllCategories",
        1,
        handler,
        |h, args| async move {
            let force = args.bool(0)?;
            Ok(vec![json!(h.update_all_categories(force).await)])
        },
    );
    registry.bind(
        "OcsApiHandler::updateCategories",
        2,
        handler,
        |h, args| async move {
            let key = args.string(0)?;
            let force = args.bool(1)?;
            Ok(vec![json!(h.update_categories(&key, force).await)])
        },
    );
    registry.bind("OcsApiHandler::getContents", 8, handler, |h, args| async move {
        let provider_keys = args.string(0)?;
        let query = ContentQuery {
            categories: args.string(1)?,
            xdg_types: args.string(2)?,
            package_types: args.string(3)?,
            search: args.string(4)?,
            sortmode: args.string(5)?,
            pagesize: args.int(6)?,
            page: args.int(7)?,
        };
        Ok(vec![h.get_contents(&provider_keys, &query).await])
    });
    registry.bind("OcsApiHandler::getContent", 2, handler, |h, args| async move {
        let key = args.string(0)?;
        let content_id = args.string(1)?;
        Ok(vec![h.get_content(&key, &content_id).await])
    });
}
