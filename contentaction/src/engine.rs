//! src/engine.rs
//! ============================================================================
//! # ContentActions: The Public Facade
//!
//! Owns the descriptor store and wires the classifier, resolver, dispatcher
//! and highlighter to the collaborators chosen at build time. Production
//! wiring comes from [`ContentActions::from_config`]; tests and embedders
//! use [`ContentActionsBuilder`] and inject their own collaborators.
//!
//! ## Example
//! ```rust,ignore
//! let actions = ContentActions::from_config(&Config::load().await?).await?;
//! let target = Target::from_arg("/home/user/photo.jpg");
//! if let Some(action) = actions.default_action(&target).await? {
//!     actions.trigger(&action, &[target.value().to_string()]).await?;
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use defaults_store::{DefaultsStore, FileDefaults, MemoryDefaults, PersistenceConfig};
use tracing::info;

use crate::config::Config;
use crate::dispatch::{
    BusKind, BusctlTransport, DetachedSpawner, Dispatcher, IpcTransport, ProcessSpawner,
    ServiceDiscovery, ServiceFileDiscovery,
};
use crate::error::ActionResult;
use crate::highlight::{Highlighter, Highlights};
use crate::model::{ActionDescriptor, DescriptorBatch, Target};
use crate::registry::{DescriptorStore, LoadReport};
use crate::resolve::{Classifier, Resolver};
use crate::sources::{
    ConditionEvaluator, ExtensionSniffer, FileCommandSniffer, MimeSniffer, NoConditions,
    SparqlConditionEvaluator, registry_file,
};

pub struct ContentActions {
    store: Arc<DescriptorStore>,

    discovery: Arc<dyn ServiceDiscovery>,

    resolver: Resolver,

    dispatcher: Dispatcher,

    highlighter: Highlighter,

    registry_dirs: Vec<PathBuf>,
}

impl ContentActions {
    pub fn builder() -> ContentActionsBuilder {
        ContentActionsBuilder::default()
    }

    /// Production wiring: file-backed defaults, `file`/`busctl` helpers,
    /// service file discovery, and the configured registry directories
    /// loaded once.
    pub async fn from_config(config: &Config) -> ActionResult<Self> {
        let defaults_path = match &config.defaults_file {
            Some(path) => path.clone(),
            None => FileDefaults::default_path()?,
        };
        let defaults = FileDefaults::open(defaults_path, PersistenceConfig::default()).await?;

        let mut evaluator = SparqlConditionEvaluator::new(config.condition_timeout);
        if let Some(command) = &config.sparql_command {
            evaluator = evaluator.with_command(command.clone());
        }

        let actions = ContentActionsBuilder::default()
            .sniffer(Arc::new(FileCommandSniffer::new(config.condition_timeout)))
            .evaluator(Arc::new(evaluator))
            .defaults(Arc::new(defaults))
            .transport(Arc::new(BusctlTransport::new(config.bus, config.call_timeout)))
            .spawner(Arc::new(DetachedSpawner))
            .discovery(Arc::new(ServiceFileDiscovery::scan(config.service_dirs.clone())))
            .call_timeout(config.call_timeout)
            .condition_timeout(config.condition_timeout)
            .registry_dirs(config.registry_dirs.clone())
            .build();

        actions.reload();
        Ok(actions)
    }

    /// Replace the registry with `batch`.
    pub fn load(&self, batch: DescriptorBatch) -> LoadReport {
        self.store.load(batch, self.discovery.as_ref())
    }

    /// Re-read the registry directories and swap in the result.
    pub fn reload(&self) -> LoadReport {
        let (batch, unreadable) = registry_file::load_dirs(&self.registry_dirs);
        let mut report = self.load(batch);
        report.rejected.extend(unreadable);
        report
    }

    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    /// Installed action by id.
    pub fn action(&self, id: &str) -> Option<Arc<ActionDescriptor>> {
        self.store.by_id(id)
    }

    pub async fn resolve(&self, target: &Target) -> Vec<Arc<ActionDescriptor>> {
        self.resolver.actions_for(target).await
    }

    /// Actions applicable to every target.
    pub async fn resolve_all(&self, targets: &[Target]) -> Vec<Arc<ActionDescriptor>> {
        self.resolver.resolve_all(targets).await
    }

    pub async fn default_action(
        &self,
        target: &Target,
    ) -> ActionResult<Option<Arc<ActionDescriptor>>> {
        self.resolver.default_for(target).await
    }

    /// Default of the first target when it applies to all targets.
    pub async fn default_action_all(
        &self,
        targets: &[Target],
    ) -> ActionResult<Option<Arc<ActionDescriptor>>> {
        self.resolver.default_for_all(targets).await
    }

    pub async fn set_default(&self, key: &str, action_id: &str) -> ActionResult<()> {
        self.resolver.set_default(key, action_id).await
    }

    /// Raw default record for an association key.
    pub async fn default_for_key(&self, key: &str) -> ActionResult<Option<String>> {
        self.resolver.default_for_key(key).await
    }

    pub async fn classes_of(&self, target: &Target) -> Vec<String> {
        self.resolver.classes_of(target).await
    }

    pub async fn trigger(&self, action: &ActionDescriptor, targets: &[String]) -> ActionResult<()> {
        self.dispatcher.trigger(action, targets).await
    }

    /// Trigger with the values of `targets`.
    pub async fn trigger_on(
        &self,
        action: &ActionDescriptor,
        targets: &[Target],
    ) -> ActionResult<()> {
        let values: Vec<String> = targets.iter().map(|t| t.value().to_string()).collect();
        self.trigger(action, &values).await
    }

    pub fn highlight<'t>(&self, text: &'t str) -> Highlights<'t> {
        self.highlighter.highlight(text)
    }
}

/// Assembles a [`ContentActions`]; unset collaborators get inert defaults
/// (in-memory defaults, extension sniffing, no conditions, `busctl` on the
/// session bus, detached spawning, no service discovery).
pub struct ContentActionsBuilder {
    sniffer: Option<Arc<dyn MimeSniffer>>,

    evaluator: Option<Arc<dyn ConditionEvaluator>>,

    defaults: Option<Arc<dyn DefaultsStore>>,

    transport: Option<Arc<dyn IpcTransport>>,

    spawner: Option<Arc<dyn ProcessSpawner>>,

    discovery: Option<Arc<dyn ServiceDiscovery>>,

    call_timeout: Duration,

    condition_timeout: Duration,

    registry_dirs: Vec<PathBuf>,
}

impl Default for ContentActionsBuilder {
    fn default() -> Self {
        Self {
            sniffer: None,
            evaluator: None,
            defaults: None,
            transport: None,
            spawner: None,
            discovery: None,
            call_timeout: Duration::from_secs(5),
            condition_timeout: Duration::from_secs(2),
            registry_dirs: Vec::new(),
        }
    }
}

impl ContentActionsBuilder {
    #[must_use]
    pub fn sniffer(mut self, sniffer: Arc<dyn MimeSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    #[must_use]
    pub fn defaults(mut self, defaults: Arc<dyn DefaultsStore>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn IpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    #[must_use]
    pub fn discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn condition_timeout(mut self, timeout: Duration) -> Self {
        self.condition_timeout = timeout;
        self
    }

    #[must_use]
    pub fn registry_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.registry_dirs = dirs;
        self
    }

    /// Assemble with an empty descriptor store.
    pub fn build(self) -> ContentActions {
        let store = Arc::new(DescriptorStore::new());

        let discovery: Arc<dyn ServiceDiscovery> = self
            .discovery
            .unwrap_or_else(|| Arc::new(ServiceFileDiscovery::default()));

        let classifier = Classifier::new(
            self.sniffer
                .unwrap_or_else(|| Arc::new(ExtensionSniffer::builtin())),
            self.evaluator.unwrap_or_else(|| Arc::new(NoConditions)),
            self.condition_timeout,
        );

        let resolver = Resolver::new(
            Arc::clone(&store),
            classifier,
            self.defaults
                .unwrap_or_else(|| Arc::new(MemoryDefaults::new())),
        );

        let dispatcher = Dispatcher::new(
            self.transport.unwrap_or_else(|| {
                Arc::new(BusctlTransport::new(BusKind::Session, self.call_timeout))
            }),
            self.spawner.unwrap_or_else(|| Arc::new(DetachedSpawner)),
            Arc::clone(&discovery),
            self.call_timeout,
        );

        info!(
            "Content actions assembled ({} registry dirs)",
            self.registry_dirs.len()
        );

        ContentActions {
            highlighter: Highlighter::new(Arc::clone(&store)),
            store,
            discovery,
            resolver,
            dispatcher,
            registry_dirs: self.registry_dirs,
        }
    }
}
