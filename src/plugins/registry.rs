use crate::config::Config;
use crate::plugins::{
    BasicNormalizer, DomainFilter, OpicScoringFilter, Plugins, ScoringFilter, ScoringFilters,
    UrlFilter, UrlFilters, UrlNormalizer, UrlNormalizers,
};
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

type Factory<T> = Box<dyn Fn(&Config) -> Arc<T> + Send + Sync>;

/// Name-keyed factories for every known plugin
///
/// The registry is consulted once at startup; `resolve` turns the plugin
/// names listed in the configuration into ready chains.
pub struct PluginRegistry {
    filters: HashMap<String, Factory<dyn UrlFilter>>,
    normalizers: HashMap<String, Factory<dyn UrlNormalizer>>,
    scoring: HashMap<String, Factory<dyn ScoringFilter>>,
}

impl PluginRegistry {
    /// Creates a registry with no plugins
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
            normalizers: HashMap::new(),
            scoring: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in plugins
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_filter("domain", |config| {
            Arc::new(DomainFilter::from_config(&config.domain_filter))
        });
        registry.register_normalizer("basic", |_| Arc::new(BasicNormalizer::new()));
        registry.register_scoring("opic", |_| Arc::new(OpicScoringFilter::new()));
        registry
    }

    pub fn register_filter<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Arc<dyn UrlFilter> + Send + Sync + 'static,
    {
        self.filters.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_normalizer<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Arc<dyn UrlNormalizer> + Send + Sync + 'static,
    {
        self.normalizers.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_scoring<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Arc<dyn ScoringFilter> + Send + Sync + 'static,
    {
        self.scoring.insert(name.to_string(), Box::new(factory));
    }

    /// Builds the plugin chains named by `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Plugins)` - Chains in configuration order
    /// * `Err(ConfigError::UnknownPlugin)` - A configured name is not registered
    pub fn resolve(&self, config: &Config) -> Result<Plugins, ConfigError> {
        let filters = build(&self.filters, &config.plugins.url_filters, "url-filter", config)?;
        let normalizers = build(
            &self.normalizers,
            &config.plugins.url_normalizers,
            "url-normalizer",
            config,
        )?;
        let scoring = build(
            &self.scoring,
            &config.plugins.scoring_filters,
            "scoring-filter",
            config,
        )?;

        tracing::debug!(
            "Resolved plugins: filters={:?} normalizers={:?} scoring={:?}",
            config.plugins.url_filters,
            config.plugins.url_normalizers,
            config.plugins.scoring_filters
        );

        Ok(Plugins {
            filters: UrlFilters::new(filters),
            normalizers: UrlNormalizers::new(normalizers),
            scoring: ScoringFilters::new(scoring),
        })
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn build<T: ?Sized>(
    factories: &HashMap<String, Factory<T>>,
    names: &[String],
    kind: &str,
    config: &Config,
) -> Result<Vec<Arc<T>>, ConfigError> {
    names
        .iter()
        .map(|name| {
            factories
                .get(name.as_str())
                .map(|factory| factory(config))
                .ok_or_else(|| ConfigError::UnknownPlugin {
                    kind: kind.to_string(),
                    name: name.clone(),
                })
        })
        .collect()
}
