//! User and application configuration.
//!
//! User configuration is a fixed set of JSON object sections, each persisted
//! to `<config_dir>/<section>.json`. Every write goes through to disk before
//! the in-memory copy is replaced, so a failed write leaves the old value.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::dispatch::HandlerRegistry;

/// Errors from loading or persisting configuration sections.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config section {} is not a JSON object: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A persisted user configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Application,
    Providers,
    Categories,
    InstalledItems,
    UpdateAvailableItems,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Application,
        Section::Providers,
        Section::Categories,
        Section::InstalledItems,
        Section::UpdateAvailableItems,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Application => "application",
            Section::Providers => "providers",
            Section::Categories => "categories",
            Section::InstalledItems => "installed_items",
            Section::UpdateAvailableItems => "update_available_items",
        }
    }
}

/// Install types: key, display name, destination relative to the data dir.
const INSTALL_TYPES: &[(&str, &str, &str)] = &[
    ("bin", "Software", "bin"),
    ("downloads", "Downloads", "downloads"),
    ("documents", "Documents", "documents"),
    ("pictures", "Pictures", "pictures"),
    ("music", "Music", "music"),
    ("videos", "Videos", "videos"),
    ("wallpapers", "Wallpapers", "wallpapers"),
    ("fonts", "Fonts", "fonts"),
    ("icons", "Icons", "icons"),
    ("cursors", "Cursors", "icons"),
    ("emoticons", "Emoticons", "emoticons"),
    ("color_schemes", "Color Schemes", "color-schemes"),
    ("themes", "Desktop Themes", "themes"),
    ("gtk2_themes", "GTK2 Themes", "themes"),
    ("gtk3_themes", "GTK3 Themes", "themes"),
    ("gnome_shell_themes", "GNOME Shell Themes", "themes"),
    ("xfwm4_themes", "XFWM4 Themes", "themes"),
    ("plasma_desktopthemes", "Plasma Desktop Themes", "plasma/desktoptheme"),
    ("plasma_look_and_feel", "Plasma Look and Feel", "plasma/look-and-feel"),
    ("plasma_plasmoids", "Plasma Widgets", "plasma/plasmoids"),
];

/// Install type assigned to newly synced categories.
pub const DEFAULT_INSTALL_TYPE: &str = "downloads";

/// Owner of the application constants and the persisted user sections.
pub struct ConfigHandler {
    config_dir: PathBuf,
    data_dir: PathBuf,
    sections: RwLock<HashMap<Section, Map<String, Value>>>,
}

impl ConfigHandler {
    /// Load every section from `config_dir`. Missing files start empty.
    pub async fn load(
        config_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();
        let mut sections = HashMap::new();

        for section in Section::ALL {
            let path = section_path(&config_dir, section);
            let map = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes)
                    .map_err(|source| ConfigError::Json {
                        path: path.clone(),
                        source,
                    })?,
                Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
                Err(source) => return Err(ConfigError::Io { path, source }),
            };
            sections.insert(section, map);
        }

        tracing::info!(config_dir = %config_dir.display(), "User configuration loaded");

        Ok(Self {
            config_dir,
            data_dir: data_dir.into(),
            sections: RwLock::new(sections),
        })
    }

    // ---- application constants ----

    pub fn app_application(&self) -> Map<String, Value> {
        let value = json!({
            "id": "ocs-manager",
            "name": "ocs-manager",
            "version": env!("CARGO_PKG_VERSION"),
            "organization": "opendesktop.org",
            "domain": "org.opendesktop.ocs-manager",
        });
        value.as_object().cloned().unwrap_or_default()
    }

    /// Every install type with its resolved destination directory.
    pub fn app_install_types(&self) -> Map<String, Value> {
        INSTALL_TYPES
            .iter()
            .map(|(key, name, dir)| {
                let destination = self.data_dir.join(dir);
                (
                    key.to_string(),
                    json!({
                        "name": name,
                        "destination": destination.to_string_lossy(),
                    }),
                )
            })
            .collect()
    }

    pub fn is_install_type(&self, install_type: &str) -> bool {
        INSTALL_TYPES.iter().any(|(key, _, _)| *key == install_type)
    }

    pub fn install_destination(&self, install_type: &str) -> Option<PathBuf> {
        INSTALL_TYPES
            .iter()
            .find(|(key, _, _)| *key == install_type)
            .map(|(_, _, dir)| self.data_dir.join(dir))
    }

    // ---- user sections ----

    pub async fn section(&self, section: Section) -> Map<String, Value> {
        self.sections
            .read()
            .await
            .get(&section)
            .cloned()
            .unwrap_or_default()
    }

    /// Look up one entry of a section.
    pub async fn entry(&self, section: Section, key: &str) -> Option<Value> {
        self.sections
            .read()
            .await
            .get(&section)
            .and_then(|map| map.get(key))
            .cloned()
    }

    pub async fn replace_section(
        &self,
        section: Section,
        value: Map<String, Value>,
    ) -> Result<(), ConfigError> {
        self.modify(section, move |map| {
            *map = value;
            true
        })
        .await
        .map(drop)
    }

    pub async fn set_entry(
        &self,
        section: Section,
        key: &str,
        value: Value,
    ) -> Result<(), ConfigError> {
        self.modify(section, |map| {
            map.insert(key.to_string(), value);
            true
        })
        .await
        .map(drop)
    }

    /// Remove one entry. Removing an absent key succeeds.
    pub async fn remove_entry(&self, section: Section, key: &str) -> Result<(), ConfigError> {
        self.modify(section, |map| {
            map.remove(key);
            true
        })
        .await
        .map(drop)
    }

    /// Set the install type of one synced category.
    ///
    /// Returns `Ok(false)` when the provider or category is unknown, or the
    /// install type does not exist.
    pub async fn set_category_install_type(
        &self,
        provider_key: &str,
        category_key: &str,
        install_type: &str,
    ) -> Result<bool, ConfigError> {
        if !self.is_install_type(install_type) {
            return Ok(false);
        }
        self.modify(Section::Categories, |map| {
            let category = map
                .get_mut(provider_key)
                .and_then(|provider| provider.get_mut("categories"))
                .and_then(|categories| categories.get_mut(category_key))
                .and_then(Value::as_object_mut);
            match category {
                Some(category) => {
                    category.insert("install_type".to_string(), json!(install_type));
                    true
                }
                None => false,
            }
        })
        .await
    }

    /// Apply `f` to a copy of `section`; persist and commit it if `f`
    /// returns `true`.
    async fn modify(
        &self,
        section: Section,
        f: impl FnOnce(&mut Map<String, Value>) -> bool,
    ) -> Result<bool, ConfigError> {
        let mut sections = self.sections.write().await;
        let mut updated = sections.get(&section).cloned().unwrap_or_default();
        if !f(&mut updated) {
            return Ok(false);
        }

        self.persist(section, &updated).await?;
        sections.insert(section, updated);
        Ok(true)
    }

    async fn persist(&self, section: Section, map: &Map<String, Value>) -> Result<(), ConfigError> {
        let path = section_path(&self.config_dir, section);
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.config_dir)
            .await
            .map_err(io_err)?;
        let bytes = serde_json::to_vec_pretty(map).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, bytes).await.map_err(io_err)?;

        tracing::debug!(section = section.name(), "Config section saved");
        Ok(())
    }
}

fn section_path(config_dir: &Path, section: Section) -> PathBuf {
    config_dir.join(format!("{}.json", section.name()))
}

/// Log a failed write and turn it into the boolean clients expect.
fn written(func: &str, result: Result<(), ConfigError>) -> Value {
    match result {
        Ok(()) => json!(true),
        Err(e) => {
            tracing::error!(func, error = %e, "Config write failed");
            json!(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Getter and setter funcs for one whole section.
fn bind_section(
    registry: &mut HandlerRegistry,
    handler: &Arc<ConfigHandler>,
    get: &'static str,
    set: &'static str,
    section: Section,
) {
    registry.bind(get, 0, handler, move |h, _| async move {
        Ok(vec![Value::Object(h.section(section).await)])
    });
    registry.bind(set, 1, handler, move |h, args| async move {
        let value = args.object(0)?;
        Ok(vec![written(set, h.replace_section(section, value).await)])
    });
}

/// Set and remove funcs for the entries of one section.
fn bind_entries(
    registry: &mut HandlerRegistry,
    handler: &Arc<ConfigHandler>,
    set: &'static str,
    remove: &'static str,
    section: Section,
) {
    registry.bind(set, 2, handler, move |h, args| async move {
        let key = args.string(0)?;
        let value = args.object(1)?;
        Ok(vec![written(
            set,
            h.set_entry(section, &key, Value::Object(value)).await,
        )])
    });
    registry.bind(remove, 1, handler, move |h, args| async move {
        let key = args.string(0)?;
        Ok(vec![written(remove, h.remove_entry(section, &key).await)])
    });
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<ConfigHandler>) {
    registry.bind(
        "ConfigHandler::getAppConfigApplication",
        0,
        handler,
        |h, _| async move { Ok(vec![Value::Object(h.app_application())]) },
    );
    registry.bind(
        "ConfigHandler::getAppConfigInstallTypes",
        0,
        handler,
        |h, _| async move { Ok(vec![Value::Object(h.app_install_types())]) },
    );

    bind_section(
        registry,
        handler,
        "ConfigHandler::getUsrConfigApplication",
        "ConfigHandler::setUsrConfigApplication",
        Section::Application,
    );
    bind_section(
        registry,
        handler,
        "ConfigHandler::getUsrConfigProviders",
        "ConfigHandler::setUsrConfigProviders",
        Section::Providers,
    );
    bind_section(
        registry,
        handler,
        "ConfigHandler::getUsrConfigCategories",
        "ConfigHandler::setUsrConfigCategories",
        Section::Categories,
    );
    bind_section(
        registry,
        handler,
        "ConfigHandler::getUsrConfigInstalledItems",
        "ConfigHandler::setUsrConfigInstalledItems",
        Section::InstalledItems,
    );
    bind_section(
        registry,
        handler,
        "ConfigHandler::getUsrConfigUpdateAvailableItems",
        "ConfigHandler::setUsrConfigUpdateAvailableItems",
        Section::UpdateAvailableItems,
    );

    bind_entries(
        registry,
        handler,
        "ConfigHandler::setUsrConfigProvidersProvider",
        "ConfigHandler::removeUsrConfigProvidersProvider",
        Section::Providers,
    );
    bind_entries(
        registry,
        handler,
        "ConfigHandler::setUsrConfigCategoriesProvider",
        "ConfigHandler::removeUsrConfigCategoriesProvider",
        Section::Categories,
    );
    bind_entries(
        registry,
        handler,
        "ConfigHandler::setUsrConfigInstalledItemsItem",
        "ConfigHandler::removeUsrConfigInstalledItemsItem",
        Section::InstalledItems,
    );
    bind_entries(
        registry,
        handler,
        "ConfigHandler::setUsrConfigUpdateAvailableItemsItem",
        "ConfigHandler::removeUsrConfigUpdateAvailableItemsItem",
        Section::UpdateAvailableItems,
    );

    registry.bind(
        "ConfigHandler::setUsrConfigCategoriesInstallType",
        3,
        handler,
        |h, args| async move {
            let provider_key = args.string(0)?;
            let category_key = args.string(1)?;
            let install_type = args.string(2)?;
            let applied = h
                .set_category_install_type(&provider_key, &category_key, &install_type)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Config write failed");
                    false
                });
            Ok(vec![json!(applied)])
        },
    );
}
