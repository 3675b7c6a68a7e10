//! Handler subsystems exposed to clients.
//!
//! Each subsystem registers its `Subsystem::operation` funcs into the
//! [`HandlerRegistry`] once at startup; see [`register_all`].

pub mod config;
pub mod desktop_theme;
pub mod download;
pub mod install;
pub mod item;
pub mod ocs_api;
pub mod server_control;
pub mod system;
pub mod update;

use std::sync::Arc;

use crate::dispatch::HandlerRegistry;

pub use config::{ConfigError, ConfigHandler};
pub use desktop_theme::DesktopThemeHandler;
pub use item::ItemHandler;
pub use ocs_api::{ContentApi, HttpContentApi, OcsApiHandler};
pub use server_control::ServerControl;
pub use system::SystemHandler;
pub use update::UpdateHandler;

/// Every handler subsystem, shared with the tasks they spawn.
#[derive(Clone)]
pub struct Handlers {
    pub server: Arc<ServerControl>,
    pub config: Arc<ConfigHandler>,
    pub system: Arc<SystemHandler>,
    pub ocs_api: Arc<OcsApiHandler>,
    pub item: Arc<ItemHandler>,
    pub update: Arc<UpdateHandler>,
    pub desktop_theme: Arc<DesktopThemeHandler>,
}

/// Build the function table for every subsystem.
pub fn register_all(handlers: &Handlers) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    server_control::register(&mut registry, &handlers.server);
    config::register(&mut registry, &handlers.config);
    system::register(&mut registry, &handlers.system);
    ocs_api::register(&mut registry, &handlers.ocs_api);
    item::register(&mut registry, &handlers.item);
    update::register(&mut registry, &handlers.update);
    desktop_theme::register(&mut registry, &handlers.desktop_theme);

    tracing::debug!(count = registry.len(), "Handlers registered");
    registry
}
