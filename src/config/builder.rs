use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use super::bind::{bind, validate};
use super::chain::{resolve_chain, CyclePolicy};
use super::merge::merge_chain;
use super::overrides::Overrides;
use super::resolve::resolve_variables;
use super::source::{DefaultSourceProvider, Origin, SourceProvider};
use super::tree::Node;
use super::{ConfigError, ErrorKind};

/// Origin reported for configurations built from `T::default()`.
const DEFAULT_ORIGIN: &str = "default configuration";

/// Builder for resolving a hierarchical configuration into a typed value.
///
/// A build loads the starting document and every ancestor named through
/// `parentConfigurationFile` / `parentConfigurationUrl`, then:
///
/// 1. deep-merges them, descendants overriding ancestors (nested objects are
///    merged recursively; arrays and scalars are replaced),
/// 2. applies the configured [`Overrides`],
/// 3. substitutes `${path.to.field}` references,
/// 4. deserializes into `T` and runs its `validator` constraints.
///
/// Each build starts from scratch; nothing is cached between builds.
///
/// ## Example
///
/// ```no_run
/// use config_chain::{Config, Overrides};
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// #[serde(deny_unknown_fields)]
/// struct MyConfig {
///     name: String,
///     #[validate(range(min = 1024))]
///     port: u16,
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_overrides(Overrides::from_env("MYAPP", "__"))
///     .build_from_file("config/service.yaml")?;
/// # Ok::<(), config_chain::ConfigError>(())
/// ```
#[derive(Debug)]
#[must_use = "builders do nothing until a build method is called"]
pub struct Config {
    provider: Box<dyn SourceProvider>,
    overrides: Overrides,
    cycle_policy: CyclePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Box::new(DefaultSourceProvider),
            overrides: Overrides::default(),
            cycle_policy: CyclePolicy::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Replaces the provider used to fetch documents.
    pub fn with_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Replaces the override entries applied after merging.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Adds a single override entry.
    pub fn with_override(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(path, value);
        self
    }

    /// Sets how a parent reference back into the chain is handled.
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Loads, merges, overrides and resolves variables, without binding.
    pub fn resolve_tree(&self, origin: Origin) -> Result<Node, ConfigError> {
        let label = origin.to_string();
        let chain = resolve_chain(self.provider.as_ref(), origin, self.cycle_policy)?;
        let tree = merge_chain(chain);
        self.finish_tree(tree, &label)
    }

    /// Builds the configuration rooted at a local file.
    pub fn build_from_file<T>(&self, path: impl AsRef<Path>) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Validate,
    {
        self.build(Origin::file(path))
    }

    /// Builds the configuration rooted at a URL.
    pub fn build_from_url<T>(&self, url: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Validate,
    {
        let origin = Origin::url(url).map_err(|e| {
            ConfigError::builder(ErrorKind::Io, "Invalid configuration URL")
                .detail(e.to_string())
                .cause(e)
                .build(url)
        })?;
        self.build(origin)
    }

    /// Builds the configuration rooted at `origin`.
    pub fn build<T>(&self, origin: Origin) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Validate,
    {
        let label = origin.to_string();
        let tree = self.resolve_tree(origin)?;
        bind_and_validate(tree, &label)
    }

    /// Builds a configuration from `T::default()` with overrides applied.
    pub fn build_default<T>(&self) -> Result<T, ConfigError>
    where
        T: Default + Serialize + DeserializeOwned + Validate,
    {
        let tree = serde_json::to_value(T::default())
            .map(Node::from)
            .map_err(|e| {
                ConfigError::builder(
                    ErrorKind::MalformedBinding,
                    "Unable to represent the default configuration",
                )
                .detail(e.to_string())
                .cause(e)
                .build(DEFAULT_ORIGIN)
            })?;
        let tree = self.finish_tree(tree, DEFAULT_ORIGIN)?;
        bind_and_validate(tree, DEFAULT_ORIGIN)
    }

    fn finish_tree(&self, mut tree: Node, origin: &str) -> Result<Node, ConfigError> {
        self.overrides.apply(&mut tree, origin)?;
        resolve_variables(&mut tree, origin)?;
        Ok(tree)
    }
}

fn bind_and_validate<T>(tree: Node, origin: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let config = bind(tree, origin)?;
    validate(&config, origin)?;
    Ok(config)
}
