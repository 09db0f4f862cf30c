//! Handler capabilities and the GeoIP handler.
//!
//! A host builds handlers through three capabilities:
//! - [`ConfigParser`] turns configuration text into settings
//! - [`Provisioner`] builds a handler from settings and releases it again
//! - [`RequestHandler`] resolves one request into published variables
//!
//! [`GeoIpHandler`] implements all three. Handlers configured with the same
//! database path share one [`SharedState`] through the [`InstancePool`]
//! passed in their [`ProvisionContext`].

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};

use crate::config::{
    apply_env_overrides, apply_overrides_from, parse_settings, GeoIpSettings, RefreshConfig,
    COUNTRY_CODE_VARIABLE,
};
use crate::error_handling::{GeoIpError, InitializationError};
use crate::geoip::{
    DatabaseFetcher, DatabaseReader, InstancePool, MaxMindFetcher, MaxMindReader, SharedState,
};
use crate::resolver::{RequestResolver, Resolution, Variables};

/// Reads handler settings from configuration text.
pub trait ConfigParser {
    fn parse_config(input: &str) -> Result<GeoIpSettings, GeoIpError>;
}

/// Builds a handler and tears it down.
#[async_trait]
pub trait Provisioner: Sized {
    async fn provision(settings: GeoIpSettings, ctx: &ProvisionContext) -> Result<Self, GeoIpError>;

    /// Releases shared resources. Calling it more than once is a no-op.
    fn cleanup(&mut self);
}

/// Resolves one request.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, headers: &HeaderMap, peer: Option<SocketAddr>)
        -> Result<Variables, GeoIpError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Collaborators shared by every handler a host provisions.
#[derive(Clone)]
pub struct ProvisionContext {
    pub pool: Arc<InstancePool<SharedState>>,
    pub reader: Arc<dyn DatabaseReader>,
    pub fetcher: Arc<dyn DatabaseFetcher>,
    /// `None` reads the process environment
    env: Option<EnvLookup>,
}

impl ProvisionContext {
    /// Context with explicit collaborators; overrides are read from the
    /// process environment.
    pub fn new(
        pool: Arc<InstancePool<SharedState>>,
        reader: Arc<dyn DatabaseReader>,
        fetcher: Arc<dyn DatabaseFetcher>,
    ) -> Self {
        ProvisionContext {
            pool,
            reader,
            fetcher,
            env: None,
        }
    }

    /// Context backed by MaxMind files and the MaxMind download service.
    pub fn maxmind(pool: Arc<InstancePool<SharedState>>) -> Result<Self, InitializationError> {
        Ok(Self::new(
            pool,
            Arc::new(MaxMindReader),
            Arc::new(MaxMindFetcher::new()?),
        ))
    }

    /// Replaces the environment used for `GEOIP_*` overrides.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Some(Arc::new(lookup));
        self
    }
}

/// Publishes `geoip.country_code` for each request.
pub struct GeoIpHandler {
    settings: GeoIpSettings,
    resolver: RequestResolver,
    state: Arc<SharedState>,
    pool: Arc<InstancePool<SharedState>>,
    pool_key: String,
    released: bool,
}

impl std::fmt::Debug for GeoIpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIpHandler")
            .field("settings", &self.settings)
            .field("pool_key", &self.pool_key)
            .field("released", &self.released)
            .finish()
    }
}

impl GeoIpHandler {
    pub fn settings(&self) -> &GeoIpSettings {
        &self.settings
    }

    /// The shared state this handler resolves against.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }
}

impl ConfigParser for GeoIpHandler {
    fn parse_config(input: &str) -> Result<GeoIpSettings, GeoIpError> {
        parse_settings(input)
    }
}

#[async_trait]
impl Provisioner for GeoIpHandler {
    /// Applies environment overrides, validates, and acquires the shared
    /// state for the database path (building it on first use).
    async fn provision(settings: GeoIpSettings, ctx: &ProvisionContext) -> Result<Self, GeoIpError> {
        let settings = match &ctx.env {
            Some(env) => apply_overrides_from(settings, |name| env(name))?,
            None => apply_env_overrides(settings)?,
        }
        .validate()?;

        let trust_header = settings
            .trust_header
            .as_deref()
            .map(|name| {
                HeaderName::try_from(name).map_err(|e| {
                    GeoIpError::ConfigInvalid(format!("invalid trust_header {name:?}: {e}"))
                })
            })
            .transpose()?;

        let refresh = RefreshConfig::from_settings(&settings);
        let pool_key = settings.pool_key();
        let state = ctx
            .pool
            .acquire_or_create(&pool_key, || {
                SharedState::provision(
                    settings.database_path.clone(),
                    refresh,
                    Arc::clone(&ctx.reader),
                    Arc::clone(&ctx.fetcher),
                )
            })
            .await?;

        if state.refresh() != &RefreshConfig::from_settings(&settings) {
            log::warn!(
                "GeoIP database {} is already provisioned with {} refresh; keeping it",
                settings.database_path.display(),
                state.refresh().mode()
            );
        }
        state.log_status();

        Ok(GeoIpHandler {
            resolver: RequestResolver::new(trust_header, settings.override_code.clone()),
            settings,
            state,
            pool: Arc::clone(&ctx.pool),
            pool_key,
            released: false,
        })
    }

    fn cleanup(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if self.pool.release(&self.pool_key) {
            log::info!("Released last handler for GeoIP database {}", self.pool_key);
        }
    }
}

impl RequestHandler for GeoIpHandler {
    fn handle(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<Variables, GeoIpError> {
        let mut variables = Variables::new();
        match self.resolver.resolve(&self.state, headers, peer) {
            Ok(Resolution::Published(code)) => variables.set(COUNTRY_CODE_VARIABLE, code),
            Ok(Resolution::Skipped) => {}
            Err(e) => {
                log::warn!("GeoIP lookup failed: {:#}", e);
                return Err(e);
            }
        }
        Ok(variables)
    }
}

impl Drop for GeoIpHandler {
    fn drop(&mut self) {
        self.cleanup();
    }
}
