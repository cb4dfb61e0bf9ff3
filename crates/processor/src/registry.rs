//! ProcessorRegistry - explicit type name -> factory mapping
//!
//! Built once at startup and passed to whatever assembles the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use cache::CacheRegistry;
use contracts::{ContractError, Processor, ProcessorConfig};
use tracing::debug;

use crate::branch::{CatchProcessor, TryProcessor};
use crate::chain::Chain;
use crate::processors::{
    CacheProcessor, DropFailedProcessor, LogProcessor, MetadataProcessor, NoopProcessor,
    ParseJsonProcessor, TextProcessor,
};

/// Builds one processor from its config
pub type ProcessorFactory =
    fn(&ProcessorConfig, &BuildContext<'_>) -> Result<Arc<dyn Processor>, ContractError>;

/// Everything a factory may need while building
pub struct BuildContext<'a> {
    /// Shared cache resources
    pub caches: &'a CacheRegistry,
    /// Registry used to build nested children
    pub registry: &'a ProcessorRegistry,
}

impl BuildContext<'_> {
    /// Build the child stages of a branching processor
    pub fn build_children(
        &self,
        config: &ProcessorConfig,
    ) -> Result<Vec<Arc<dyn Processor>>, ContractError> {
        config
            .processors
            .iter()
            .map(|child| self.registry.build_with(child, self))
            .collect()
    }
}

/// Registry of processor factories
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in processor
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("noop", |_, _| Ok(Arc::new(NoopProcessor)));
        registry.register("drop_failed", |_, _| Ok(Arc::new(DropFailedProcessor)));
        registry.register("parse_json", |_, _| Ok(Arc::new(ParseJsonProcessor)));
        registry.register("text", |config, _| {
            Ok(Arc::new(TextProcessor::from_config(config)?))
        });
        registry.register("metadata", |config, _| {
            Ok(Arc::new(MetadataProcessor::from_config(config)?))
        });
        registry.register("log", |config, _| {
            Ok(Arc::new(LogProcessor::from_config(config)?))
        });
        registry.register("cache", |config, ctx| {
            Ok(Arc::new(CacheProcessor::from_config(config, ctx.caches)?))
        });
        registry.register("try", |config, ctx| {
            Ok(Arc::new(TryProcessor::new(ctx.build_children(config)?)))
        });
        registry.register("catch", |config, ctx| {
            Ok(Arc::new(CatchProcessor::new(ctx.build_children(config)?)))
        });
        registry
    }

    /// Register (or replace) a factory
    pub fn register(&mut self, name: impl Into<String>, factory: ProcessorFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Whether a type name is known
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a single processor
    pub fn build(
        &self,
        config: &ProcessorConfig,
        caches: &CacheRegistry,
    ) -> Result<Arc<dyn Processor>, ContractError> {
        let ctx = BuildContext {
            caches,
            registry: self,
        };
        self.build_with(config, &ctx)
    }

    /// Build the ordered top-level chain
    pub fn build_chain(
        &self,
        configs: &[ProcessorConfig],
        caches: &CacheRegistry,
    ) -> Result<Chain, ContractError> {
        let stages = configs
            .iter()
            .map(|config| self.build(config, caches))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(stages = stages.len(), "processor chain built");
        Ok(Chain::new(stages))
    }

    fn build_with(
        &self,
        config: &ProcessorConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Arc<dyn Processor>, ContractError> {
        let factory = self
            .factories
            .get(&config.processor_type)
            .ok_or_else(|| ContractError::unknown_type("processor", &config.processor_type))?;
        factory(config, ctx)
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Batch, Processor};

    #[test]
    fn test_builtins_registered() {
        let registry = ProcessorRegistry::with_builtins();
        assert_eq!(registry.names(), contracts::BUILTIN_PROCESSORS);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let registry = ProcessorRegistry::with_builtins();
        let err = registry
            .build(&ProcessorConfig::new("sql"), &CacheRegistry::default())
            .err()
            .unwrap();
        assert!(matches!(err, ContractError::UnknownType { .. }));
    }

    #[test]
    fn test_unknown_nested_type_rejected() {
        let registry = ProcessorRegistry::with_builtins();
        let config = ProcessorConfig::new("try").with_children(vec![ProcessorConfig::new("nope")]);
        assert!(registry.build(&config, &CacheRegistry::default()).is_err());
    }

    #[tokio::test]
    async fn test_build_chain_with_try_catch() {
        let registry = ProcessorRegistry::with_builtins();
        let configs = vec![
            ProcessorConfig::new("try").with_children(vec![
                ProcessorConfig::new("parse_json"),
                ProcessorConfig::new("metadata")
                    .with_param("key", "valid")
                    .with_param("value", "yes"),
            ]),
            ProcessorConfig::new("catch").with_children(vec![ProcessorConfig::new("metadata")
                .with_param("key", "valid")
                .with_param("value", "no")]),
        ];

        let chain = registry
            .build_chain(&configs, &CacheRegistry::default())
            .unwrap();
        assert_eq!(chain.stage_names(), vec!["try", "catch"]);

        let out = chain.process(Batch::from_payloads(["{}", "oops"])).await;
        assert_eq!(out.get(0).unwrap().get_metadata("valid"), Some("yes"));
        assert_eq!(out.get(1).unwrap().get_metadata("valid"), Some("no"));
        assert_eq!(out.failed_count(), 0);
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = ProcessorRegistry::new();
        registry.register("passthrough", |_, _| Ok(Arc::new(NoopProcessor)));
        let processor = registry
            .build(&ProcessorConfig::new("passthrough"), &CacheRegistry::default())
            .unwrap();
        assert_eq!(processor.name(), "noop");
    }
}
