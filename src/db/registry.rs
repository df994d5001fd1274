//! Named connections.
//!
//! The registry is built once from a [`RegistryConfig`]. It resolves each
//! connection descriptor against its logical unit, obtains the shared factory
//! from the injected [`SessionFactoryCache`], and hands out unopened sessions.

use crate::config::RegistryConfig;
use crate::db::cache::SessionFactoryCache;
use crate::db::factory::{FactoryCacheKey, FactorySpec};
use crate::db::pool::SqlxConnector;
use crate::db::session::Session;
use crate::db::work::WorkScope;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, PersistenceUnit};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ConnectionRegistry {
    units: HashMap<String, PersistenceUnit>,
    /// Registration order
    descriptors: Vec<ConnectionDescriptor>,
    cache: Arc<SessionFactoryCache>,
    closed: AtomicBool,
}

impl ConnectionRegistry {
    /// Validate `config` and build a registry over `cache`.
    pub fn new(config: RegistryConfig, cache: Arc<SessionFactoryCache>) -> DbResult<Self> {
        config.validate()?;
        let RegistryConfig { units, connections } = config;
        info!(
            units = units.len(),
            connections = connections.len(),
            "Connection registry loaded"
        );
        Ok(Self {
            units: units.into_iter().map(|u| (u.name.clone(), u)).collect(),
            descriptors: connections,
            cache,
            closed: AtomicBool::new(false),
        })
    }

    /// Registry backed by the bundled sqlx drivers.
    pub fn with_sqlx(config: RegistryConfig) -> DbResult<Self> {
        let cache = Arc::new(SessionFactoryCache::new(Arc::new(SqlxConnector::new())));
        Self::new(config, cache)
    }

    pub fn cache(&self) -> &Arc<SessionFactoryCache> {
        &self.cache
    }

    pub fn descriptor(&self, name: &str) -> Option<&ConnectionDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Names of connections declaring every flag in `flags`, in registration order.
    pub fn list_connections<S: AsRef<str>>(&self, flags: &[S]) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| d.has_flags(flags))
            .map(|d| d.name.clone())
            .collect()
    }

    /// Resolve a descriptor against its unit.
    fn factory_spec(&self, descriptor: &ConnectionDescriptor) -> DbResult<FactorySpec> {
        let unit = self.units.get(&descriptor.unit).ok_or_else(|| {
            DbError::configuration(format!(
                "Connection '{}' references unknown unit '{}'",
                descriptor.name, descriptor.unit
            ))
        })?;
        let url = descriptor
            .url
            .clone()
            .or_else(|| unit.url.clone())
            .ok_or_else(|| {
                DbError::configuration(format!("Connection '{}' has no URL", descriptor.name))
            })?;

        Ok(FactorySpec {
            key: FactoryCacheKey::new(&unit.name, descriptor.url.clone()),
            url,
            user: descriptor.user.clone().or_else(|| unit.user.clone()),
            password: descriptor.password.clone().or_else(|| unit.password.clone()),
            pool: unit.pool.clone(),
        })
    }

    /// Unopened session on the named connection.
    pub async fn open(&self, name: &str) -> DbResult<Session> {
        if self.is_closed() {
            return Err(DbError::RegistryClosed);
        }
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| DbError::unknown_connection(name))?;
        let spec = self.factory_spec(descriptor)?;
        let factory = self.cache.get_or_create(&spec).await?;
        debug!(connection = %name, factory = %spec.key, "Opening session");
        Session::new(name, factory)
    }

    /// Session on the named connection with its transaction already begun.
    pub async fn open_work(&self, name: &str) -> DbResult<WorkScope> {
        let session = self.open(name).await?;
        WorkScope::begin(session).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release every cached factory. Later `open` calls fail; closing again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing connection registry");
        self.cache.release_all().await;
    }
}
