//! Server builder for configuring and creating the ADS server.

use std::sync::Arc;
use std::time::Duration;

use ads_core::{
    AdsError, AdsResult, ResourceGenerator, ScopeResolver, ServiceDirectory,
};

use crate::config::ServerConfig;
use crate::AdsServer;

/// Builder for creating an [`AdsServer`].
///
/// # Example
///
/// ```rust,ignore
/// use ads_server::AdsServerBuilder;
/// use ads_memory::MemEnvironment;
/// use std::sync::Arc;
///
/// let env = Arc::new(MemEnvironment::new());
/// let server = AdsServerBuilder::new()
///     .environment(env)
///     .max_connections(5_000)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AdsServerBuilder {
    generator: Option<Arc<dyn ResourceGenerator>>,
    scope: Option<Arc<dyn ScopeResolver>>,
    directory: Option<Arc<dyn ServiceDirectory>>,
    config: ServerConfig,
}

impl std::fmt::Debug for AdsServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsServerBuilder")
            .field("generator", &self.generator.is_some())
            .field("scope", &self.scope.is_some())
            .field("directory", &self.directory.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AdsServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource generator. Required.
    pub fn generator(mut self, generator: Arc<dyn ResourceGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the scope resolver. Required.
    pub fn scope(mut self, scope: Arc<dyn ScopeResolver>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the service directory. Required.
    pub fn directory(mut self, directory: Arc<dyn ServiceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use one environment as generator, scope resolver and service
    /// directory.
    pub fn environment<E>(self, environment: Arc<E>) -> Self
    where
        E: ResourceGenerator + ScopeResolver + ServiceDirectory,
    {
        self.generator(environment.clone())
            .scope(environment.clone())
            .directory(environment)
    }

    /// Set the per-connection response buffer size.
    pub fn response_buffer_size(mut self, size: usize) -> Self {
        self.config.response_buffer_size = size;
        self
    }

    /// Limit concurrent ADS connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = Some(max);
        self
    }

    /// Set maximum concurrent streams per connection.
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = Some(max);
        self
    }

    /// Set keepalive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = Some(interval);
        self
    }

    /// Set keepalive timeout.
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive_timeout = Some(timeout);
        self
    }

    /// Set how long shutdown waits for connections to drain.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Serve the gRPC health protocol (enabled by default).
    pub fn enable_health(mut self) -> Self {
        self.config.enable_health = true;
        self
    }

    /// Do not serve the gRPC health protocol.
    pub fn disable_health(mut self) -> Self {
        self.config.enable_health = false;
        self
    }

    /// Stamp responses with a control plane identifier.
    pub fn control_plane_id(mut self, id: impl Into<String>) -> Self {
        self.config.control_plane_id = Some(id.into());
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a collaborator (generator, scope, directory) is missing
    /// - the response buffer size or connection limit is zero
    pub fn build(self) -> AdsResult<AdsServer> {
        let generator = self
            .generator
            .ok_or_else(|| AdsError::Configuration("resource generator is required".into()))?;
        let scope = self
            .scope
            .ok_or_else(|| AdsError::Configuration("scope resolver is required".into()))?;
        let directory = self
            .directory
            .ok_or_else(|| AdsError::Configuration("service directory is required".into()))?;

        if self.config.response_buffer_size == 0 {
            return Err(AdsError::Configuration(
                "response buffer size must be at least 1".into(),
            ));
        }
        if self.config.max_connections == Some(0) {
            return Err(AdsError::Configuration(
                "connection limit must be at least 1".into(),
            ));
        }

        Ok(AdsServer::new(generator, scope, directory, self.config))
    }
}
