//! Persona registry
//!
//! Personas are served from a cache cell that records when the catalog was
//! fetched. Staleness is checked at the request boundary: a lookup on an
//! expired cache reloads from the source first, and a reload failure keeps
//! serving the previous catalog rather than dropping the request.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use sentinel_config::PersonaCatalog;
use sentinel_core::{AgentPersona, CacheCell, IntentCategory};
use sentinel_persistence::PersonaStore;

use crate::AdvisorError;

/// Where the catalog comes from on each (re)load
#[async_trait]
pub trait PersonaSource: Send + Sync {
    async fn load(&self) -> Result<PersonaCatalog, AdvisorError>;
}

/// YAML catalog file when present, compiled-in personas otherwise
pub struct CatalogFileSource {
    path: String,
}

impl CatalogFileSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PersonaSource for CatalogFileSource {
    async fn load(&self) -> Result<PersonaCatalog, AdvisorError> {
        PersonaCatalog::load_or_default(&self.path)
            .map_err(|e| AdvisorError::Persona(e.to_string()))
    }
}

/// A fixed catalog that reloads to itself. Used by memory-only deployments
/// and tests.
pub struct StaticCatalogSource {
    catalog: PersonaCatalog,
}

impl StaticCatalogSource {
    pub fn new(catalog: PersonaCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl PersonaSource for StaticCatalogSource {
    async fn load(&self) -> Result<PersonaCatalog, AdvisorError> {
        Ok(self.catalog.clone())
    }
}

/// Base catalog overlaid with rows from the agent_definitions table.
///
/// A stored definition replaces the base persona with the same agent_type;
/// unknown types are appended. The merged set is validated before it is
/// served, so a bad row in the table cannot leave the registry without a
/// default persona.
pub struct StoreBackedSource {
    base: Arc<dyn PersonaSource>,
    store: Arc<dyn PersonaStore>,
}

impl StoreBackedSource {
    pub fn new(base: Arc<dyn PersonaSource>, store: Arc<dyn PersonaStore>) -> Self {
        Self { base, store }
    }
}

#[async_trait]
impl PersonaSource for StoreBackedSource {
    async fn load(&self) -> Result<PersonaCatalog, AdvisorError> {
        let mut catalog = self.base.load().await?;
        let overrides = self.store.list().await?;

        for persona in overrides {
            match catalog
                .personas
                .iter_mut()
                .find(|p| p.agent_type == persona.agent_type)
            {
                Some(slot) => *slot = persona,
                None => catalog.personas.push(persona),
            }
        }

        catalog
            .validate()
            .map_err(|e| AdvisorError::Persona(e.to_string()))?;
        Ok(catalog)
    }
}

/// Cached persona registry
pub struct AgentRegistry {
    source: Arc<dyn PersonaSource>,
    cache: CacheCell<PersonaCatalog>,
}

impl AgentRegistry {
    /// Load the catalog once and start the cache clock
    pub async fn new(
        source: Arc<dyn PersonaSource>,
        ttl: Duration,
    ) -> Result<Self, AdvisorError> {
        let catalog = source.load().await?;
        tracing::info!(
            personas = catalog.personas.len(),
            ttl_secs = ttl.as_secs(),
            "Persona registry loaded"
        );
        Ok(Self {
            source,
            cache: CacheCell::new(catalog, ttl),
        })
    }

    /// Current catalog, reloaded first when the TTL has lapsed.
    ///
    /// Reload failures are logged and the previous catalog stays in service.
    pub async fn catalog(&self) -> Arc<PersonaCatalog> {
        let source = self.source.clone();
        let refreshed = self
            .cache
            .refresh_if_stale(move || async move { source.load().await })
            .await;
        if let Err(e) = refreshed {
            tracing::warn!(error = %e, "Persona reload failed; serving previous catalog");
        }
        self.cache.get()
    }

    /// Reload now regardless of age. Returns the persona count.
    pub async fn force_refresh(&self) -> Result<usize, AdvisorError> {
        let catalog = self.source.load().await?;
        let count = catalog.personas.len();
        self.cache.store(catalog);
        tracing::info!(personas = count, "Persona registry reloaded");
        Ok(count)
    }

    /// Age of the catalog currently in service
    pub fn cache_age(&self) -> Duration {
        self.cache.age()
    }

    /// Persona serving a category, or the default persona
    pub async fn select(&self, category: IntentCategory) -> AgentPersona {
        let catalog = self.catalog().await;
        catalog
            .find_for_category(category)
            .unwrap_or_else(|| catalog.default_persona())
            .clone()
    }

    pub async fn by_type(&self, agent_type: &str) -> Option<AgentPersona> {
        self.catalog().await.find_by_type(agent_type).cloned()
    }

    pub async fn list(&self) -> Vec<AgentPersona> {
        self.catalog().await.personas.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sentinel_persistence::InMemoryPersonaStore;

    /// Counts loads and can be told to start failing
    struct CountingSource {
        loads: Mutex<usize>,
        fail: Mutex<bool>,
        catalog: PersonaCatalog,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                loads: Mutex::new(0),
                fail: Mutex::new(false),
                catalog: PersonaCatalog::default(),
            }
        }

        fn loads(&self) -> usize {
            *self.loads.lock()
        }
    }

    #[async_trait]
    impl PersonaSource for CountingSource {
        async fn load(&self) -> Result<PersonaCatalog, AdvisorError> {
            *self.loads.lock() += 1;
            if *self.fail.lock() {
                return Err(AdvisorError::Persona("source down".to_string()));
            }
            Ok(self.catalog.clone())
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_serves_without_reload() {
        let source = Arc::new(CountingSource::new());
        let registry = AgentRegistry::new(source.clone(), Duration::from_secs(300))
            .await
            .unwrap();

        registry.catalog().await;
        registry.catalog().await;
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_reloads_at_lookup() {
        let source = Arc::new(CountingSource::new());
        let registry = AgentRegistry::new(source.clone(), Duration::from_millis(0))
            .await
            .unwrap();

        registry.catalog().await;
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_serves_previous_catalog() {
        let source = Arc::new(CountingSource::new());
        let registry = AgentRegistry::new(source.clone(), Duration::from_millis(0))
            .await
            .unwrap();

        *source.fail.lock() = true;
        let catalog = registry.catalog().await;
        assert_eq!(catalog.personas.len(), 6);
    }

    #[tokio::test]
    async fn test_select_falls_back_to_default_persona() {
        let mut catalog = PersonaCatalog::default();
        catalog.personas.retain(|p| {
            p.is_default || p.agent_type == "billing_specialist"
        });
        let registry = AgentRegistry::new(
            Arc::new(StaticCatalogSource::new(catalog)),
            Duration::from_secs(300),
        )
        .await
        .unwrap();

        let billing = registry.select(IntentCategory::Billing).await;
        assert_eq!(billing.agent_type, "billing_specialist");

        // No persona serves Outreach in the trimmed catalog
        let fallback = registry.select(IntentCategory::Outreach).await;
        assert!(fallback.is_default);
    }

    #[tokio::test]
    async fn test_store_rows_override_catalog() {
        let store = Arc::new(InMemoryPersonaStore::new());
        let mut patched = PersonaCatalog::default().personas[3].clone();
        assert_eq!(patched.agent_type, "billing_specialist");
        patched.temperature = 0.1;
        store.upsert(&patched).await.unwrap();

        let source = StoreBackedSource::new(
            Arc::new(StaticCatalogSource::new(PersonaCatalog::default())),
            store,
        );
        let catalog = source.load().await.unwrap();

        assert_eq!(catalog.personas.len(), 6);
        let billing = catalog.find_by_type("billing_specialist").unwrap();
        assert_eq!(billing.temperature, 0.1);
    }

    #[tokio::test]
    async fn test_force_refresh_resets_age() {
        let source = Arc::new(CountingSource::new());
        let registry = AgentRegistry::new(source.clone(), Duration::from_secs(300))
            .await
            .unwrap();

        let count = registry.force_refresh().await.unwrap();
        assert_eq!(count, 6);
        assert_eq!(source.loads(), 2);
        assert!(registry.cache_age() < Duration::from_secs(1));
    }
}
