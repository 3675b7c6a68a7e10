//! Update checks and in-place item updates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ocs_core::job::{JobKind, JobOutcome};
use ocs_events::{EventBus, ServerEvent};
use ocs_jobs::{ByteCount, JobRegistry, JobReporter, JobSpec, TaskOperation};
use serde_json::{json, Map, Value};

use crate::dispatch::HandlerRegistry;
use crate::handlers::config::{ConfigHandler, Section};
use crate::handlers::download::{download_to, filename_from_url};
use crate::handlers::install;
use crate::handlers::item::InstalledItem;
use crate::handlers::ocs_api::OcsApiHandler;

/// Publishes update job events.
struct UpdateReporter {
    events: Arc<EventBus>,
}

impl JobReporter for UpdateReporter {
    fn started(&self, key: &str) {
        self.events.publish(ServerEvent::UpdateStarted {
            item_key: key.to_string(),
            status: true,
        });
    }

    fn progress(&self, key: &str, progress: f64, _bytes: Option<ByteCount>) {
        self.events.publish(ServerEvent::UpdateProgress {
            item_key: key.to_string(),
            progress,
        });
    }

    fn finished(&self, key: &str, outcome: &JobOutcome) {
        self.events.publish(ServerEvent::UpdateFinished {
            item_key: key.to_string(),
            success: outcome.is_success(),
            detail: match outcome {
                JobOutcome::Succeeded => None,
                JobOutcome::Failed { detail } => Some(detail.clone()),
            },
        });
    }
}

/// Compare an installed item with its provider's current content entry.
///
/// Returns the update-available record when the content now points at a
/// different download, or reports a different change marker.
pub fn available_update(item: &InstalledItem, content: &Value) -> Option<Value> {
    let link = content
        .get("downloadlink1")
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())?;
    let changed = content.get("changed").and_then(Value::as_str).unwrap_or("");

    let relinked = link != item.url;
    let rechanged = !changed.is_empty() && !item.changed.is_empty() && changed != item.changed;
    if !relinked && !rechanged {
        return None;
    }

    Some(json!({
        "url": link,
        "filename": filename_from_url(link).unwrap_or_else(|| item.filename.clone()),
        "changed": changed,
    }))
}

/// Everything an update job needs, resolved before it starts.
struct UpdatePlan {
    key: String,
    installed: InstalledItem,
    url: String,
    filename: String,
    changed: String,
}

pub struct UpdateHandler {
    config: Arc<ConfigHandler>,
    ocs: Arc<OcsApiHandler>,
    jobs: Arc<JobRegistry>,
    events: Arc<EventBus>,
    http: reqwest::Client,
    staging_dir: PathBuf,
    checking: AtomicBool,
}

impl UpdateHandler {
    pub fn new(
        config: Arc<ConfigHandler>,
        ocs: Arc<OcsApiHandler>,
        jobs: Arc<JobRegistry>,
        events: Arc<EventBus>,
        http: reqwest::Client,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            ocs,
            jobs,
            events,
            http,
            staging_dir,
            checking: AtomicBool::new(false),
        }
    }

    /// Start checking every installed item for updates.
    ///
    /// Returns `false` if a check is already running.
    pub fn check_all(self: &Arc<Self>) -> bool {
        if self.checking.swap(true, Ordering::SeqCst) {
            tracing::info!("Update check already running");
            return false;
        }

        self.events
            .publish(ServerEvent::CheckAllStarted { status: true });

        let handler = Arc::clone(self);
        tokio::spawn(async move {
            let status = handler.run_check().await;
            handler.checking.store(false, Ordering::SeqCst);
            handler
                .events
                .publish(ServerEvent::CheckAllFinished { status });
        });
        true
    }

    async fn run_check(&self) -> bool {
        let installed = self.config.section(Section::InstalledItems).await;
        let mut available = Map::new();

        for (key, value) in installed {
            let Ok(item) = serde_json::from_value::<InstalledItem>(value) else {
                tracing::warn!(item_key = %key, "Malformed installed item skipped");
                continue;
            };
            if item.provider.is_empty() || item.content_id.is_empty() {
                continue;
            }
            match self.ocs.content(&item.provider, &item.content_id).await {
                Ok(Some(content)) => {
                    if let Some(update) = available_update(&item, &content) {
                        available.insert(key, update);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(item_key = %key, error = %e, "Update check failed for item");
                }
            }
        }

        let count = available.len();
        let stored = self
            .config
            .replace_section(Section::UpdateAvailableItems, available)
            .await
            .and(
                self.config
                    .set_entry(
                        Section::Application,
                        "update_checked_at",
                        json!(chrono::Utc::now().timestamp()),
                    )
                    .await,
            );
        match stored {
            Ok(()) => {
                tracing::info!(count, "Update check finished");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to store update check results");
                false
            }
        }
    }

    /// Start updating an installed item. Returns whether the job was
    /// accepted.
    pub async fn update(&self, item_key: &str) -> bool {
        if self.jobs.ignore_duplicate(item_key) {
            tracing::info!(item_key, "Update already running");
            return false;
        }

        let operation = match self.plan(item_key).await {
            Ok(plan) => self.operation(plan),
            Err(reason) => TaskOperation::refused(reason),
        };
        let reporter = Arc::new(UpdateReporter {
            events: Arc::clone(&self.events),
        });

        self.jobs
            .start(item_key, JobSpec::new(JobKind::Update, operation, reporter))
    }

    async fn plan(&self, key: &str) -> Result<UpdatePlan, String> {
        let update = self
            .config
            .entry(Section::UpdateAvailableItems, key)
            .await
            .ok_or_else(|| "No update available".to_string())?;
        let installed = self
            .config
            .entry(Section::InstalledItems, key)
            .await
            .and_then(|value| serde_json::from_value::<InstalledItem>(value).ok())
            .ok_or_else(|| "Item is not installed".to_string())?;

        let url = update
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| "Update has no download URL".to_string())?
            .to_string();
        let filename = update
            .get("filename")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| installed.filename.clone());
        let changed = update
            .get("changed")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(UpdatePlan {
            key: key.to_string(),
            installed,
            url,
            filename,
            changed,
        })
    }

    /// Download the new version, replace the installed files, and record
    /// the result.
    fn operation(&self, plan: UpdatePlan) -> TaskOperation {
        let config = Arc::clone(&self.config);
        let http = self.http.clone();
        let staged = self.staging_dir.join(uuid::Uuid::new_v4().to_string());

        TaskOperation::new(move |handle| async move {
            let UpdatePlan {
                key,
                installed,
                url,
                filename,
                changed,
            } = plan;
            let destination = config
                .install_destination(&installed.install_type)
                .ok_or_else(|| format!("Unknown install type {}", installed.install_type))?;

            download_to(&http, &url, &staged, &handle)
                .await
                .map_err(|e| format!("Download of {url} failed: {e}"))?;

            let replaced: Result<Vec<String>, install::InstallError> = async {
                install::uninstall_files(&destination, &installed.files).await?;
                let saved = install::save_file(&staged, &destination, &filename).await?;
                install::install_file(&saved, &destination, &installed.install_type).await
            }
            .await;
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                tracing::debug!(path = %staged.display(), error = %e, "Staged file not removed");
            }
            let files = replaced.map_err(|e| e.to_string())?;

            let updated = InstalledItem {
                url,
                filename,
                files,
                changed,
                installed_at: chrono::Utc::now().timestamp(),
                ..installed
            };
            config
                .set_entry(Section::InstalledItems, &key, updated.to_value())
                .await
                .map_err(|e| e.to_string())?;
            config
                .remove_entry(Section::UpdateAvailableItems, &key)
                .await
                .map_err(|e| e.to_string())?;

            tracing::info!(item_key = %key, "Item updated");
            Ok(())
        })
    }
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<UpdateHandler>) {
    registry.bind("UpdateHandler::checkAll", 0, handler, |h, _| async move {
        Ok(vec![json!(h.check_all())])
    });
    registry.bind("UpdateHandler::update", 1, handler, |h, args| async move {
        let key = args.string(0)?;
        Ok(vec![json!(h.update(&key).await)])
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(url: &str, changed: &str) -> InstalledItem {
        InstalledItem {
            url: url.to_string(),
            filename: "theme.zip".to_string(),
            install_type: "themes".to_string(),
            provider: "https://a.example/ocs/v1/".to_string(),
            content_id: "42".to_string(),
            files: vec!["Theme".to_string()],
            changed: changed.to_string(),
            installed_at: 0,
        }
    }

    #[test]
    fn new_download_link_is_an_update() {
        let item = installed("https://dl.example.com/v1/theme.zip", "");
        let content = json!({"downloadlink1": "https://dl.example.com/v2/theme-2.zip", "changed": "2024-05-01"});

        let update = available_update(&item, &content).expect("update");
        assert_eq!(update["url"], "https://dl.example.com/v2/theme-2.zip");
        assert_eq!(update["filename"], "theme-2.zip");
        assert_eq!(update["changed"], "2024-05-01");
    }

    #[test]
    fn changed_marker_alone_is_an_update() {
        let item = installed("https://dl.example.com/theme.zip", "2024-01-01");
        let content = json!({"downloadlink1": "https://dl.example.com/theme.zip", "changed": "2024-05-01"});
        assert!(available_update(&item, &content).is_some());
    }

    #[test]
    fn unchanged_content_is_not_an_update() {
        let item = installed("https://dl.example.com/theme.zip", "2024-01-01");
        let same = json!({"downloadlink1": "https://dl.example.com/theme.zip", "changed": "2024-01-01"});
        assert!(available_update(&item, &same).is_none());

        let no_link = json!({"changed": "2025-01-01"});
        assert!(available_update(&item, &no_link).is_none());
    }
}
