//! Shared cache of session factories.
//!
//! # Architecture
//!
//! - **`OnceCell` per key**: single-flight factory construction. Concurrent
//!   callers asking for the same key wait on one construction; callers for
//!   different keys never block each other beyond the brief map lock.
//! - **No eviction**: entries live until `release_all()`, which also closes
//!   the cache for good. A factory whose construction finishes after that is
//!   closed on the spot instead of being handed out.
//! - **Failed construction leaves the cell empty**, so a later call retries
//!   instead of caching the error.

use crate::db::factory::{Connector, FactoryCacheKey, FactorySpec, SessionFactory};
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

type FactoryCell = Arc<OnceCell<Arc<dyn SessionFactory>>>;

/// At most one factory per [`FactoryCacheKey`].
pub struct SessionFactoryCache {
    connector: Arc<dyn Connector>,
    factories: RwLock<HashMap<FactoryCacheKey, FactoryCell>>,
    /// Set under the write lock together with the drain in `release_all`.
    released: AtomicBool,
}

impl std::fmt::Debug for SessionFactoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactoryCache")
            .field("connector", &"dyn Connector")
            .finish_non_exhaustive()
    }
}

impl SessionFactoryCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            factories: RwLock::new(HashMap::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Return the cached factory for `spec.key`, constructing it on first use.
    pub async fn get_or_create(&self, spec: &FactorySpec) -> DbResult<Arc<dyn SessionFactory>> {
        let cell = {
            let factories = self.factories.read().await;
            if self.is_released() {
                return Err(DbError::RegistryClosed);
            }
            if let Some(cell) = factories.get(&spec.key) {
                Arc::clone(cell)
            } else {
                drop(factories);
                let mut factories = self.factories.write().await;
                if self.is_released() {
                    return Err(DbError::RegistryClosed);
                }
                // Double-check after acquiring write lock
                Arc::clone(
                    factories
                        .entry(spec.key.clone())
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let factory = cell
            .get_or_try_init(|| async {
                debug!(factory = %spec.key, "Creating session factory");
                self.connector.connect(spec).await
            })
            .await?;

        // The cell may have been drained while the factory was being built
        if self.is_released() {
            debug!(factory = %spec.key, "Cache released during construction");
            factory.close().await;
            return Err(DbError::RegistryClosed);
        }
        Ok(Arc::clone(factory))
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Number of constructed factories.
    pub async fn len(&self) -> usize {
        let factories = self.factories.read().await;
        factories.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close and forget every factory. Later `get_or_create` calls fail.
    pub async fn release_all(&self) {
        let drained: Vec<(FactoryCacheKey, FactoryCell)> = {
            let mut factories = self.factories.write().await;
            self.released.store(true, Ordering::Release);
            factories.drain().collect()
        }; // Lock released here

        for (key, cell) in drained {
            if let Some(factory) = cell.get() {
                info!(factory = %key, "Releasing session factory");
                factory.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::db::factory::SessionContext;
    use crate::error::DbError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Debug)]
    struct NullFactory {
        key: FactoryCacheKey,
        url: String,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionFactory for NullFactory {
        fn key(&self) -> &FactoryCacheKey {
            &self.key
        }

        fn url(&self) -> &str {
            &self.url
        }

        async fn create_context(&self) -> DbResult<Box<dyn SessionContext>> {
            Err(DbError::internal("not used"))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        built: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, spec: &FactorySpec) -> DbResult<Arc<dyn SessionFactory>> {
            if spec.url.starts_with("bad:") {
                return Err(DbError::factory_creation(&spec.key.unit, "bad url", "fix it"));
            }
            self.built.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(NullFactory {
                key: spec.key.clone(),
                url: spec.url.clone(),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn spec(unit: &str, url: Option<&str>) -> FactorySpec {
        FactorySpec {
            key: FactoryCacheKey::new(unit, url.map(String::from)),
            url: url.unwrap_or("sqlite:default.db").to_string(),
            user: None,
            password: None,
            pool: PoolOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_same_key_returns_same_factory() {
        let connector = Arc::new(CountingConnector::default());
        let cache = SessionFactoryCache::new(connector.clone());

        let a = cache.get_or_create(&spec("app", None)).await.unwrap();
        let b = cache.get_or_create(&spec("app", None)).await.unwrap();
        let c = cache
            .get_or_create(&spec("app", Some("sqlite:other.db")))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(connector.built.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_construction_is_not_cached() {
        let connector = Arc::new(CountingConnector::default());
        let cache = SessionFactoryCache::new(connector.clone());

        let err = cache
            .get_or_create(&spec("app", Some("bad:url")))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::FactoryCreation { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_all_closes_each_factory_once() {
        let connector = Arc::new(CountingConnector::default());
        let cache = SessionFactoryCache::new(connector.clone());
        cache.get_or_create(&spec("a", None)).await.unwrap();
        cache.get_or_create(&spec("b", None)).await.unwrap();

        cache.release_all().await;
        cache.release_all().await;

        assert_eq!(connector.closed.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_released_cache_refuses_new_factories() {
        let connector = Arc::new(CountingConnector::default());
        let cache = SessionFactoryCache::new(connector.clone());
        cache.release_all().await;

        let err = cache.get_or_create(&spec("app", None)).await.unwrap_err();
        assert!(matches!(err, DbError::RegistryClosed));
        assert_eq!(connector.built.load(Ordering::SeqCst), 0);
    }

    /// Blocks inside `connect` until the test opens the gate.
    #[derive(Default)]
    struct GatedConnector {
        entered: Notify,
        gate: Notify,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for GatedConnector {
        async fn connect(&self, spec: &FactorySpec) -> DbResult<Arc<dyn SessionFactory>> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(Arc::new(NullFactory {
                key: spec.key.clone(),
                url: spec.url.clone(),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[tokio::test]
    async fn test_factory_built_during_release_is_closed() {
        let connector = Arc::new(GatedConnector::default());
        let cache = Arc::new(SessionFactoryCache::new(connector.clone()));

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_create(&spec("app", None)).await })
        };
        connector.entered.notified().await;
        cache.release_all().await;
        connector.gate.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, DbError::RegistryClosed));
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty().await);
    }
}
