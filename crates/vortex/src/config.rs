//! Client configuration.

use crate::session::{FileStore, IdentityStore, MemoryStore};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Handle;

/// Default auto-flush interval.
pub const DEFAULT_AUTO_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the collector health check.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the final `/batch` request made by `shutdown`.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Env var that disables tracking when set to any value.
pub const ENV_DISABLED: &str = "VORTEX_DISABLED";

/// Env var that forces `enabled` on or off (`1`/`true`, `0`/`false`).
pub const ENV_ENABLED: &str = "VORTEX_ENABLED";

/// Build flavour of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeContext {
    /// Running inside an editor or tooling host.
    Editor,
    /// Regular development build.
    #[default]
    Development,
    /// Release build shipped to players/users.
    Shipping,
}

/// Enablement switches. All that apply to the current context must be on
/// for anything to be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Master kill switch.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub enable_in_editor: bool,

    #[serde(default = "default_true")]
    pub enable_in_shipping: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_in_editor: true,
            enable_in_shipping: true,
        }
    }
}

impl Settings {
    /// Settings with the master switch off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether initialization may proceed in `context`.
    pub fn allows(&self, context: RuntimeContext) -> bool {
        if !self.enabled {
            return false;
        }
        match context {
            RuntimeContext::Editor => self.enable_in_editor,
            RuntimeContext::Shipping => self.enable_in_shipping,
            RuntimeContext::Development => true,
        }
    }

    /// Parse the `[vortex]` table of a TOML document. A missing table yields
    /// defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            vortex: Option<Settings>,
        }

        let full: FullConfig = toml::from_str(content)?;
        Ok(full.vortex.unwrap_or_default())
    }

    /// Load settings from a TOML file and apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml_str(&content)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Apply [`ENV_DISABLED`] / [`ENV_ENABLED`] from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup(ENV_DISABLED).is_some() {
            self.enabled = false;
            return;
        }
        if let Some(value) = lookup(ENV_ENABLED) {
            match value.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => self.enabled = false,
                "1" | "true" | "yes" | "on" => self.enabled = true,
                _ => {}
            }
        }
    }
}

/// Resolved manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) settings: Settings,
    pub(crate) context: RuntimeContext,
    pub(crate) app_version: Option<String>,
    pub(crate) timeout: Duration,
    pub(crate) health_check_timeout: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) auto_batching: Option<Duration>,
}

impl Config {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn context(&self) -> RuntimeContext {
        self.context
    }

    /// Host-provided app version, before the `1.0.0` fallback.
    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health_check_timeout(&self) -> Duration {
        self.health_check_timeout
    }

    /// How long `shutdown` waits for its final request before dropping it.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Auto-flush interval to apply at construction, if auto-batching starts on.
    pub fn auto_batching(&self) -> Option<Duration> {
        self.auto_batching
    }
}

/// Builder for [`AnalyticsManager`](crate::AnalyticsManager).
pub struct AnalyticsBuilder {
    settings: Option<Settings>,
    context: RuntimeContext,
    store: Option<Box<dyn IdentityStore>>,
    app_version: Option<String>,
    timeout: Option<Duration>,
    health_check_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    auto_batching: Option<Duration>,
    runtime: Option<Handle>,
}

impl fmt::Debug for AnalyticsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsBuilder")
            .field("settings", &self.settings)
            .field("context", &self.context)
            .field("store", &self.store.as_ref().map(|_| "<dyn IdentityStore>"))
            .field("app_version", &self.app_version)
            .field("timeout", &self.timeout)
            .field("health_check_timeout", &self.health_check_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("auto_batching", &self.auto_batching)
            .finish_non_exhaustive()
    }
}

impl Default for AnalyticsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            context: RuntimeContext::default(),
            store: None,
            app_version: None,
            timeout: None,
            health_check_timeout: None,
            shutdown_timeout: None,
            auto_batching: None,
            runtime: None,
        }
    }

    /// Set enablement switches. Defaults to everything on.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the host build flavour.
    pub fn context(mut self, context: RuntimeContext) -> Self {
        self.context = context;
        self
    }

    /// Set where the anonymous identity is persisted.
    ///
    /// Defaults to [`FileStore::default_location`], falling back to an
    /// in-memory store when the platform has no config dir.
    pub fn store(mut self, store: impl IdentityStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Set the app version reported with every event.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Set the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how long the collector health check may take.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = Some(timeout);
        self
    }

    /// Set how long `shutdown` waits for the final batch.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Start with auto-batching on at the given interval.
    pub fn auto_batching(mut self, interval: Duration) -> Self {
        self.auto_batching = Some(interval);
        self
    }

    /// Set the runtime network tasks and the flush timer are spawned on.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Resolve the configuration.
    pub(crate) fn build_parts(self) -> Result<(Config, Box<dyn IdentityStore>, Handle), Error> {
        if self.auto_batching == Some(Duration::ZERO) {
            return Err(Error::Config("auto-flush interval cannot be zero".into()));
        }

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                Error::Config(
                    "no tokio runtime available, build inside one or set runtime()".into(),
                )
            })?,
        };

        let store = self.store.unwrap_or_else(|| match FileStore::default_location() {
            Some(file) => Box::new(file),
            None => Box::new(MemoryStore::new()),
        });

        let config = Config {
            settings: self.settings.unwrap_or_default(),
            context: self.context,
            app_version: self.app_version,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            health_check_timeout: self
                .health_check_timeout
                .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            auto_batching: self.auto_batching,
        };

        Ok((config, store, runtime))
    }
}
