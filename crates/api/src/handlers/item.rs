//! Item download, install and uninstall.
//!
//! `getItem` starts a download job keyed by the item key. When the download
//! succeeds the item is saved and installed in a follow-up task, and the
//! result is recorded in the installed items section. Every step is
//! broadcast as an item lifecycle event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocs_core::job::{JobKind, JobOutcome};
use ocs_events::{EventBus, ItemPhase, ItemResult, ServerEvent};
use ocs_jobs::{ByteCount, JobCompletion, JobRegistry, JobReporter, JobSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::dispatch::HandlerRegistry;
use crate::handlers::config::{ConfigHandler, Section};
use crate::handlers::download::{download_operation, filename_from_url};
use crate::handlers::install;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// What a client asked to fetch. Carried in every item event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub url: String,
    pub install_type: String,
    pub provider: String,
    pub content_id: String,
    pub filename: String,
    pub item_key: String,
}

impl ItemMetadata {
    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// An entry of the installed items section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledItem {
    pub url: String,
    pub filename: String,
    pub install_type: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub content_id: String,
    /// Installed names, relative to the install type's destination.
    #[serde(default)]
    pub files: Vec<String>,
    /// Provider-reported change marker of the installed version.
    #[serde(default)]
    pub changed: String,
    #[serde(default)]
    pub installed_at: i64,
}

impl InstalledItem {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Target of an `ocs://` or `ocss://` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcsUrl {
    pub url: String,
    pub install_type: String,
    pub filename: String,
}

/// Parse `ocs://{download|install}?url=...&type=...&filename=...`.
pub fn parse_ocs_url(ocs_url: &str) -> Option<OcsUrl> {
    let parsed = reqwest::Url::parse(ocs_url).ok()?;
    if !matches!(parsed.scheme(), "ocs" | "ocss") {
        return None;
    }
    if !matches!(parsed.host_str(), Some("download") | Some("install")) {
        return None;
    }

    let mut target = OcsUrl {
        url: String::new(),
        install_type: "downloads".to_string(),
        filename: String::new(),
    };
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            "url" => target.url = value.into_owned(),
            "type" if !value.is_empty() => target.install_type = value.into_owned(),
            "filename" => target.filename = value.into_owned(),
            _ => {}
        }
    }

    (!target.url.is_empty()).then_some(target)
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Turns a download job's lifecycle into item events.
struct DownloadReporter {
    events: Arc<EventBus>,
    metadata: Value,
}

impl JobReporter for DownloadReporter {
    fn started(&self, _key: &str) {
        self.events.publish(ServerEvent::Item {
            phase: ItemPhase::DownloadStarted,
            result: ItemResult::success("downloadstart", "Downloading", self.metadata.clone()),
        });
    }

    fn progress(&self, key: &str, progress: f64, bytes: Option<ByteCount>) {
        let bytes = bytes.unwrap_or_default();
        self.events.publish(ServerEvent::DownloadProgress {
            item_key: key.to_string(),
            progress,
            received: bytes.received,
            total: bytes.total,
        });
    }

    fn finished(&self, _key: &str, outcome: &JobOutcome) {
        let result = match outcome {
            JobOutcome::Succeeded => {
                ItemResult::success("download", "Downloaded", self.metadata.clone())
            }
            JobOutcome::Failed { detail } => {
                ItemResult::error("download", detail.clone(), self.metadata.clone())
            }
        };
        self.events.publish(ServerEvent::Item {
            phase: ItemPhase::DownloadFinished,
            result,
        });
    }
}

// ---------------------------------------------------------------------------
// ItemHandler
// ---------------------------------------------------------------------------

pub struct ItemHandler {
    config: Arc<ConfigHandler>,
    jobs: Arc<JobRegistry>,
    events: Arc<EventBus>,
    http: reqwest::Client,
    staging_dir: PathBuf,
    /// Metadata of items currently being fetched, by item key.
    metadata_set: RwLock<Map<String, Value>>,
}

impl ItemHandler {
    pub fn new(
        config: Arc<ConfigHandler>,
        jobs: Arc<JobRegistry>,
        events: Arc<EventBus>,
        http: reqwest::Client,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            jobs,
            events,
            http,
            staging_dir,
            metadata_set: RwLock::new(Map::new()),
        }
    }

    pub async fn metadata_set(&self) -> Map<String, Value> {
        self.metadata_set.read().await.clone()
    }

    fn publish_item(&self, phase: ItemPhase, result: ItemResult) {
        self.events.publish(ServerEvent::Item { phase, result });
    }

    /// Fill in defaults and validate a fetch request.
    fn prepare(&self, mut metadata: ItemMetadata) -> Result<ItemMetadata, (String, ItemMetadata)> {
        if metadata.item_key.is_empty() {
            metadata.item_key = metadata.url.clone();
        }
        if metadata.filename.is_empty() {
            metadata.filename = filename_from_url(&metadata.url).unwrap_or_default();
        }

        let scheme_ok = reqwest::Url::parse(&metadata.url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Err(("Invalid URL".to_string(), metadata));
        }
        if !self.config.is_install_type(&metadata.install_type) {
            return Err(("Invalid install type".to_string(), metadata));
        }
        if metadata.filename.is_empty() || metadata.filename.contains(['/', '\\']) {
            return Err(("Invalid filename".to_string(), metadata));
        }
        Ok(metadata)
    }

    /// Start fetching an item. Returns whether a download job was started.
    pub async fn get_item(self: &Arc<Self>, metadata: ItemMetadata) -> bool {
        let metadata = match self.prepare(metadata) {
            Ok(metadata) => metadata,
            Err((reason, metadata)) => {
                tracing::warn!(url = %metadata.url, reason = %reason, "Rejected item request");
                self.publish_item(
                    ItemPhase::DownloadStarted,
                    ItemResult::error("downloadstart", reason, metadata.to_value()),
                );
                return false;
            }
        };

        let key = metadata.item_key.clone();
        if self.jobs.ignore_duplicate(&key) {
            tracing::info!(item_key = %key, "Item is already being fetched");
            return false;
        }

        // The key stays reserved until `complete` has saved and installed
        // the item, well after the download job itself is gone.
        {
            let mut fetching = self.metadata_set.write().await;
            if fetching.contains_key(&key) {
                tracing::info!(item_key = %key, "Item is still being installed");
                return false;
            }
            fetching.insert(key.clone(), metadata.to_value());
        }
        self.events.publish(ServerEvent::MetadataSetChanged);

        let staged = self.staging_dir.join(uuid::Uuid::new_v4().to_string());
        let operation = download_operation(self.http.clone(), metadata.url.clone(), staged.clone());
        let reporter = Arc::new(DownloadReporter {
            events: Arc::clone(&self.events),
            metadata: metadata.to_value(),
        });

        match self
            .jobs
            .start_tracked(key.clone(), JobSpec::new(JobKind::Download, operation, reporter))
        {
            Some(completion) => {
                tokio::spawn(Arc::clone(self).complete(metadata, staged, completion));
                true
            }
            None => {
                self.forget(&key).await;
                false
            }
        }
    }

    /// Fetch the target of an `ocs://` link.
    pub async fn get_item_by_ocs_url(
        self: &Arc<Self>,
        ocs_url: &str,
        provider: String,
        content_id: String,
    ) -> bool {
        let Some(target) = parse_ocs_url(ocs_url) else {
            self.publish_item(
                ItemPhase::DownloadStarted,
                ItemResult::error("downloadstart", "Invalid OCS-URL", json!({ "ocs_url": ocs_url })),
            );
            return false;
        };

        self.get_item(ItemMetadata {
            url: target.url,
            install_type: target.install_type,
            provider,
            content_id,
            filename: target.filename,
            item_key: String::new(),
        })
        .await
    }

    async fn forget(&self, key: &str) {
        self.metadata_set.write().await.remove(key);
        self.events.publish(ServerEvent::MetadataSetChanged);
    }

    /// Runs after the download job has finished.
    async fn complete(
        self: Arc<Self>,
        metadata: ItemMetadata,
        staged: PathBuf,
        completion: JobCompletion,
    ) {
        if completion.wait().await.is_success() {
            self.save_and_install(&metadata, &staged).await;
        }
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            tracing::debug!(path = %staged.display(), error = %e, "Staged file not removed");
        }
        self.forget(&metadata.item_key).await;
    }

    async fn save_and_install(&self, metadata: &ItemMetadata, staged: &Path) {
        let meta = metadata.to_value();
        let Some(destination) = self.config.install_destination(&metadata.install_type) else {
            self.publish_item(
                ItemPhase::SaveFinished,
                ItemResult::error("save", "Invalid install type", meta),
            );
            return;
        };

        self.publish_item(
            ItemPhase::SaveStarted,
            ItemResult::success("savestart", "Saving", meta.clone()),
        );
        let saved = match install::save_file(staged, &destination, &metadata.filename).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(item_key = %metadata.item_key, error = %e, "Save failed");
                self.publish_item(
                    ItemPhase::SaveFinished,
                    ItemResult::error("save", e.to_string(), meta),
                );
                return;
            }
        };
        self.publish_item(
            ItemPhase::SaveFinished,
            ItemResult::success("save", "File saved", meta.clone()),
        );

        self.publish_item(
            ItemPhase::InstallStarted,
            ItemResult::success("installstart", "Installing", meta.clone()),
        );
        let installed = install::install_file(&saved, &destination, &metadata.install_type)
            .await
            .map_err(|e| e.to_string());
        let recorded = match installed {
            Ok(files) => {
                let item = InstalledItem {
                    url: metadata.url.clone(),
                    filename: metadata.filename.clone(),
                    install_type: metadata.install_type.clone(),
                    provider: metadata.provider.clone(),
                    content_id: metadata.content_id.clone(),
                    files,
                    changed: String::new(),
                    installed_at: chrono::Utc::now().timestamp(),
                };
                self.config
                    .set_entry(Section::InstalledItems, &metadata.item_key, item.to_value())
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e),
        };

        let result = match recorded {
            Ok(()) => {
                tracing::info!(item_key = %metadata.item_key, "Item installed");
                ItemResult::success("install", "Installed", meta)
            }
            Err(e) => {
                tracing::warn!(item_key = %metadata.item_key, error = %e, "Install failed");
                ItemResult::error("install", e, meta)
            }
        };
        self.publish_item(ItemPhase::InstallFinished, result);
    }

    /// Start removing an installed item. Returns whether it was installed.
    pub async fn uninstall(self: &Arc<Self>, item_key: &str) -> bool {
        let meta = json!({ "item_key": item_key });
        let item = self
            .config
            .entry(Section::InstalledItems, item_key)
            .await
            .and_then(|value| serde_json::from_value::<InstalledItem>(value).ok());
        let Some(item) = item else {
            self.publish_item(
                ItemPhase::UninstallStarted,
                ItemResult::error("uninstallstart", "Not installed", meta),
            );
            return false;
        };

        self.publish_item(
            ItemPhase::UninstallStarted,
            ItemResult::success("uninstallstart", "Uninstalling", meta.clone()),
        );

        let handler = Arc::clone(self);
        let key = item_key.to_string();
        tokio::spawn(async move {
            let result = match handler.remove_installed(&key, &item).await {
                Ok(()) => ItemResult::success("uninstall", "Uninstalled", meta),
                Err(e) => {
                    tracing::warn!(item_key = %key, error = %e, "Uninstall failed");
                    ItemResult::error("uninstall", e, meta)
                }
            };
            handler.publish_item(ItemPhase::UninstallFinished, result);
        });
        true
    }

    async fn remove_installed(&self, key: &str, item: &InstalledItem) -> Result<(), String> {
        let destination = self
            .config
            .install_destination(&item.install_type)
            .ok_or_else(|| format!("Unknown install type {}", item.install_type))?;
        install::uninstall_files(&destination, &item.files)
            .await
            .map_err(|e| e.to_string())?;
        self.config
            .remove_entry(Section::InstalledItems, key)
            .await
            .map_err(|e| e.to_string())?;
        self.config
            .remove_entry(Section::UpdateAvailableItems, key)
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!(item_key = %key, "Item uninstalled");
        Ok(())
    }
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<ItemHandler>) {
    registry.bind("ItemHandler::metadataSet", 0, handler, |h, _| async move {
        Ok(vec![Value::Object(h.metadata_set().await)])
    });
    registry.bind("ItemHandler::getItem", 6, handler, |h, args| async move {
        let metadata = ItemMetadata {
            url: args.string(0)?,
            install_type: args.string(1)?,
            provider: args.string(2)?,
            content_id: args.string(3)?,
            filename: args.string(4)?,
            item_key: args.string(5)?,
        };
        Ok(vec![json!(h.get_item(metadata).await)])
    });
    registry.bind("ItemHandler::getItemByOcsUrl", 3, handler, |h, args| async move {
        let ocs_url = args.string(0)?;
        let started = h
            .get_item_by_ocs_url(&ocs_url, args.string(1)?, args.string(2)?)
            .await;
        Ok(vec![json!(started)])
    });
    registry.bind("ItemHandler::uninstall", 1, handler, |h, args| async move {
        let key = args.string(0)?;
        Ok(vec![json!(h.uninstall(&key).await)])
    });
}
