use std::collections::BTreeMap;
use std::sync::Arc;

use analysis_core::{AnalysisError, Dimension, DimensionProvider};

/// The closed set of providers, one per dimension, fixed at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<Dimension, Arc<dyn DimensionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(
        providers: impl IntoIterator<Item = Arc<dyn DimensionProvider>>,
    ) -> Result<Self, AnalysisError> {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn DimensionProvider>) -> Result<(), AnalysisError> {
        let dimension = provider.dimension();
        if let Some(existing) = self.providers.get(&dimension) {
            return Err(AnalysisError::ConfigError(format!(
                "{} already provided by {}, cannot register {}",
                dimension,
                existing.name(),
                provider.name()
            )));
        }
        tracing::info!("Registered {} provider: {}", dimension, provider.name());
        self.providers.insert(dimension, provider);
        Ok(())
    }

    pub fn get(&self, dimension: Dimension) -> Option<&Arc<dyn DimensionProvider>> {
        self.providers.get(&dimension)
    }

    /// Providers in dimension order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn DimensionProvider>> {
        self.providers.values()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.providers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
