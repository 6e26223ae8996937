//! Process-wide scraper and runner registry.
//!
//! Plugins register into a [RegistryBuilder]; [RegistryBuilder::build] resolves name
//! collisions (first registrant wins, later ones are logged and dropped) and injects the final
//! factory map into every kept runner. [global] builds the registry from the built-in plugins
//! once per process; it is read-only afterwards and lives until exit.

use crate::factory::{FactoryMap, ScraperFactory};
use crate::plugins;
use crate::runner::Runner;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    Scraper,
    Runner,
}

impl fmt::Display for CollisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionKind::Scraper => f.write_str("scraper"),
            CollisionKind::Runner => f.write_str("runner"),
        }
    }
}

/// A dropped registration: `dropped` tried to claim `name`, already held by `kept`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub kind: CollisionKind,
    pub name: String,
    pub kept: String,
    pub dropped: String,
}

/// Collects registrations in plugin order.
#[derive(Default)]
pub struct RegistryBuilder {
    factories: Vec<(String, Arc<dyn ScraperFactory>)>,
    runners: Vec<(String, Runner)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every name `factory` advertises, on behalf of `plugin`.
    pub fn add_factory(&mut self, plugin: &str, factory: Arc<dyn ScraperFactory>) -> &mut Self {
        self.factories.push((plugin.to_string(), factory));
        self
    }

    pub fn add_runner(&mut self, plugin: &str, runner: Runner) -> &mut Self {
        self.runners.push((plugin.to_string(), runner));
        self
    }

    pub fn build(self) -> Registry {
        let mut collisions = Vec::new();

        let mut factories = FactoryMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for (plugin, factory) in self.factories {
            let origin = format!("{}::{}", plugin, factory.name());
            for name in factory.available_scrapers() {
                if let Some(kept) = owners.get(&name) {
                    collisions.push(collision(CollisionKind::Scraper, &name, kept, &origin));
                    continue;
                }
                debug!(scraper = %name, factory = %origin, "registered scraper");
                owners.insert(name.clone(), origin.clone());
                factories.insert(name, factory.clone());
            }
        }
        let factories = Arc::new(factories);

        let mut runners = BTreeMap::new();
        let mut runner_owners: BTreeMap<String, String> = BTreeMap::new();
        for (plugin, mut runner) in self.runners {
            if let Some(kept) = runner_owners.get(runner.name()) {
                collisions.push(collision(CollisionKind::Runner, runner.name(), kept, &plugin));
                continue;
            }
            runner.set_factories(factories.clone());
            debug!(runner = runner.name(), plugin = %plugin, "registered runner");
            runner_owners.insert(runner.name().to_string(), plugin);
            runners.insert(runner.name().to_string(), Arc::new(runner));
        }

        Registry {
            factories,
            runners,
            collisions,
        }
    }
}

fn collision(kind: CollisionKind, name: &str, kept: &str, dropped: &str) -> Collision {
    warn!(
        "{} cannot register {} {} because it is already registered by {}",
        dropped, kind, name, kept
    );
    Collision {
        kind,
        name: name.to_string(),
        kept: kept.to_string(),
        dropped: dropped.to_string(),
    }
}

/// Read-only name-to-factory and name-to-runner mappings.
pub struct Registry {
    factories: Arc<FactoryMap>,
    runners: BTreeMap<String, Arc<Runner>>,
    collisions: Vec<Collision>,
}

impl Registry {
    pub fn factories(&self) -> &Arc<FactoryMap> {
        &self.factories
    }

    pub fn factory(&self, scraper_name: &str) -> Option<&Arc<dyn ScraperFactory>> {
        self.factories.get(scraper_name)
    }

    pub fn scraper_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn runner(&self, name: &str) -> Option<Arc<Runner>> {
        self.runners.get(name).cloned()
    }

    /// Runners sorted by name.
    pub fn runners(&self) -> impl Iterator<Item = &Runner> {
        self.runners.values().map(|r| r.as_ref())
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }
}

/// Registry of the built-in plugins, built on first call.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut builder = RegistryBuilder::new();
        plugins::register_all(&mut builder);
        builder.build()
    })
}
