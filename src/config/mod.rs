//! Layered configuration resolution.
//!
//! Sources merge field-by-field in fixed precedence: built-in defaults <
//! environment-keyed config file < secrets file < explicit application
//! overlay < runtime `configure` mutations. The resolved snapshot is
//! immutable and replaced atomically, so concurrent readers never observe
//! a half-updated configuration; the backend client handle is rebuilt
//! whenever the snapshot is.

mod file;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::client::{ClientConfig, JobClient};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{PriorityMap, RetryPolicy};

/// Lowest-precedence default for the backend URL
pub const URL_ENV_VAR: &str = "OJS_URL";

/// Selects the config file section when the builder sets no environment
pub const ENVIRONMENT_ENV_VAR: &str = "OJS_ENV";

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_ENVIRONMENT: &str = "development";
const SECRETS_NAMESPACE: &str = "ojs";

/// Effective configuration snapshot
#[derive(Debug, Clone)]
pub struct OjsConfig {
    /// Backend URL
    pub url: String,

    /// Prefix prepended to all queue names (e.g. `production`)
    pub queue_prefix: Option<String>,

    /// Queue used when a job specifies none
    pub default_queue: String,

    /// Default retry policy applied to all jobs; attached only when non-empty
    pub retry_policy: RetryPolicy,

    /// Request timeout
    pub timeout: Duration,

    /// Extra transport headers sent with every request
    pub headers: HashMap<String, String>,

    /// Framework → backend priority table
    pub priority_map: PriorityMap,
}

impl Default for OjsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var(URL_ENV_VAR).unwrap_or_else(|_| DEFAULT_URL.to_string()),
            queue_prefix: None,
            default_queue: "default".to_string(),
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            headers: HashMap::new(),
            priority_map: PriorityMap::default(),
        }
    }
}

impl OjsConfig {
    /// Resolve a queue name, applying the configured prefix. Empty or
    /// missing names fall back to the default queue.
    pub fn resolve_queue(&self, name: Option<&str>) -> String {
        let base = match name {
            Some(n) if !n.is_empty() => n,
            _ => self.default_queue.as_str(),
        };
        match &self.queue_prefix {
            Some(prefix) => format!("{prefix}_{base}"),
            None => base.to_string(),
        }
    }

    /// Map a framework priority onto the backend scale
    pub fn resolve_priority(&self, native: Option<i32>) -> Option<i32> {
        self.priority_map.resolve(native)
    }

    /// Connection parameters handed to the client factory
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            timeout: self.timeout,
            headers: self.headers.clone(),
        }
    }
}

/// One layered configuration source. Unset fields never overwrite values
/// resolved from lower-precedence sources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub url: Option<String>,
    pub queue_prefix: Option<String>,
    pub default_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    /// Seconds
    pub timeout: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
    pub priority_map: Option<PriorityMap>,
}

impl ConfigOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_prefix = Some(prefix.into());
        self
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = Some(queue.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(HashMap::new).insert(key.into(), value.into());
        self
    }

    fn apply(&self, config: &mut OjsConfig) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(prefix) = &self.queue_prefix {
            config.queue_prefix = Some(prefix.clone());
        }
        if let Some(queue) = &self.default_queue {
            config.default_queue = queue.clone();
        }
        if let Some(policy) = &self.retry_policy {
            config.retry_policy = policy.clone();
        }
        if let Some(seconds) = self.timeout {
            config.timeout = Duration::from_secs(seconds);
        }
        if let Some(headers) = &self.headers {
            config.headers = headers.clone();
        }
        if let Some(map) = &self.priority_map {
            config.priority_map = map.clone();
        }
    }
}

type ClientFactory = dyn Fn(&ClientConfig) -> Arc<dyn JobClient> + Send + Sync;

struct Resolved {
    config: Arc<OjsConfig>,
    client: Option<Arc<dyn JobClient>>,
}

/// Resolves layered sources into an [`OjsConfig`] snapshot and owns the
/// backend client handle built from it.
pub struct Resolver {
    environment: String,
    config_file: Option<PathBuf>,
    secrets_file: Option<PathBuf>,
    overlay: ConfigOverlay,
    client_factory: Option<Box<ClientFactory>>,
    state: RwLock<Option<Resolved>>,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    /// Merge all sources into an effective snapshot. Lazy and idempotent;
    /// the client handle is constructed once the final configuration is
    /// known. Malformed file content surfaces here, fatally.
    pub fn resolve(&self) -> BridgeResult<Arc<OjsConfig>> {
        {
            let state = self.state.read();
            if let Some(resolved) = state.as_ref() {
                return Ok(resolved.config.clone());
            }
        }

        let merged = self.merge_sources()?;
        let mut state = self.state.write();
        if let Some(resolved) = state.as_ref() {
            return Ok(resolved.config.clone());
        }
        let resolved = self.install(merged);
        let config = resolved.config.clone();
        *state = Some(resolved);
        Ok(config)
    }

    /// The backend client handle. `NotConfigured` when the resolver was
    /// built without a client or factory.
    pub fn client(&self) -> BridgeResult<Arc<dyn JobClient>> {
        self.resolve()?;
        let state = self.state.read();
        state
            .as_ref()
            .and_then(|resolved| resolved.client.clone())
            .ok_or(BridgeError::NotConfigured)
    }

    /// Mutate the current snapshot and rebuild the client handle from the
    /// result. Mutations accumulate across calls; [`Resolver::reset`]
    /// returns to source-derived values. The replacement is atomic.
    pub fn configure(
        &self,
        mutate: impl FnOnce(&mut OjsConfig),
    ) -> BridgeResult<Arc<OjsConfig>> {
        let current = self.resolve()?;
        let mut next = (*current).clone();
        mutate(&mut next);

        let resolved = self.install(next);
        let config = resolved.config.clone();
        *self.state.write() = Some(resolved);
        Ok(config)
    }

    /// Drop the snapshot and client handle; the next `resolve` re-merges
    /// from sources. Mainly for test isolation.
    pub fn reset(&self) {
        *self.state.write() = None;
    }

    fn merge_sources(&self) -> BridgeResult<OjsConfig> {
        let mut config = OjsConfig::default();
        if let Some(path) = &self.config_file {
            file::load_config_file(path, &self.environment)?.apply(&mut config);
        }
        if let Some(path) = &self.secrets_file {
            file::load_secrets_file(path, SECRETS_NAMESPACE)?.apply(&mut config);
        }
        self.overlay.apply(&mut config);
        Ok(config)
    }

    fn install(&self, config: OjsConfig) -> Resolved {
        let config = Arc::new(config);
        let client = self
            .client_factory
            .as_ref()
            .map(|factory| factory(&config.client_config()));
        Resolved { config, client }
    }
}

/// Builder for [`Resolver`]
#[derive(Default)]
pub struct ResolverBuilder {
    environment: Option<String>,
    config_file: Option<PathBuf>,
    secrets_file: Option<PathBuf>,
    overlay: ConfigOverlay,
    client_factory: Option<Box<ClientFactory>>,
}

impl ResolverBuilder {
    /// Runtime environment name selecting the config file section.
    /// Defaults to `OJS_ENV`, then `development`.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_file = Some(path.into());
        self
    }

    /// Explicit application configuration, above file and secrets sources
    pub fn overlay(mut self, overlay: ConfigOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    /// Factory invoked whenever the snapshot is (re)built
    pub fn client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ClientConfig) -> Arc<dyn JobClient> + Send + Sync + 'static,
    {
        self.client_factory = Some(Box::new(factory));
        self
    }

    /// Fixed client handle, reused across reconfigurations
    pub fn client(self, client: Arc<dyn JobClient>) -> Self {
        self.client_factory(move |_| client.clone())
    }

    pub fn build(self) -> Resolver {
        let environment = self.environment.unwrap_or_else(|| {
            std::env::var(ENVIRONMENT_ENV_VAR)
                .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
        });
        Resolver {
            environment,
            config_file: self.config_file,
            secrets_file: self.secrets_file,
            overlay: self.overlay,
            client_factory: self.client_factory,
            state: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn defaults_stand_alone() {
        let config = Resolver::builder().build().resolve().unwrap();
        assert_eq!(config.default_queue, "default");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.queue_prefix.is_none());
        assert!(config.retry_policy.is_empty());
    }

    #[test]
    fn file_values_override_defaults_and_unset_fields_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ojs.yml", "test:\n  url: http://file:8080\n  timeout: 10\n");

        let config = Resolver::builder()
            .environment("test")
            .config_file(path)
            .build()
            .resolve()
            .unwrap();

        assert_eq!(config.url, "http://file:8080");
        assert_eq!(config.timeout, Duration::from_secs(10));
        // untouched by the file
        assert_eq!(config.default_queue, "default");
    }

    #[test]
    fn secrets_override_the_file_and_the_overlay_overrides_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let config_path =
            write_file(&dir, "ojs.yml", "test:\n  url: http://file:8080\n  timeout: 10\n");
        let secrets_path = write_file(&dir, "secrets.yml", "ojs:\n  url: http://secret:8080\n");

        let resolver = Resolver::builder()
            .environment("test")
            .config_file(&config_path)
            .secrets_file(&secrets_path)
            .build();
        let config = resolver.resolve().unwrap();
        assert_eq!(config.url, "http://secret:8080");
        assert_eq!(config.timeout, Duration::from_secs(10));

        let resolver = Resolver::builder()
            .environment("test")
            .config_file(&config_path)
            .secrets_file(&secrets_path)
            .overlay(ConfigOverlay::new().with_url("http://app:8080"))
            .build();
        assert_eq!(resolver.resolve().unwrap().url, "http://app:8080");
    }

    #[test]
    fn configure_wins_over_every_source_and_accumulates() {
        let resolver = Resolver::builder()
            .overlay(ConfigOverlay::new().with_url("http://app:8080"))
            .build();

        resolver.configure(|config| config.url = "http://runtime:8080".to_string()).unwrap();
        resolver.configure(|config| config.queue_prefix = Some("staging".to_string())).unwrap();

        let config = resolver.resolve().unwrap();
        assert_eq!(config.url, "http://runtime:8080");
        assert_eq!(config.queue_prefix.as_deref(), Some("staging"));
    }

    #[test]
    fn reset_returns_to_source_derived_values() {
        let resolver = Resolver::builder()
            .overlay(ConfigOverlay::new().with_default_queue("mailers"))
            .build();

        resolver.configure(|config| config.default_queue = "runtime".to_string()).unwrap();
        assert_eq!(resolver.resolve().unwrap().default_queue, "runtime");

        resolver.reset();
        assert_eq!(resolver.resolve().unwrap().default_queue, "mailers");
    }

    #[test]
    fn malformed_file_is_fatal_at_resolve_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ojs.yml", "url: [unterminated\n");

        let err = Resolver::builder().config_file(path).build().resolve().unwrap_err();
        assert!(matches!(err, BridgeError::MalformedConfiguration(_)));
    }

    #[test]
    fn resolve_queue_falls_back_and_prefixes() {
        let mut config = OjsConfig::default();
        assert_eq!(config.resolve_queue(None), "default");
        assert_eq!(config.resolve_queue(Some("")), "default");
        assert_eq!(config.resolve_queue(Some("mailers")), "mailers");

        config.queue_prefix = Some("production".to_string());
        assert_eq!(config.resolve_queue(Some("mailers")), "production_mailers");
        assert_eq!(config.resolve_queue(None), "production_default");
    }

    #[test]
    fn client_is_not_configured_without_a_factory() {
        let resolver = Resolver::builder().build();
        assert!(matches!(resolver.client().unwrap_err(), BridgeError::NotConfigured));
    }
}
