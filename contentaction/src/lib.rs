//! # contentaction
//!
//! Resolves an "actionable thing" (a file URI, a semantically typed object or
//! a snippet of free text) to the registered actions able to handle it,
//! looks up the preferred default, and triggers the chosen action over the
//! right transport.
//!
//! Data flows leaf-first: descriptor store -> classifier -> resolver ->
//! dispatcher, and for free text: descriptor store -> highlighter ->
//! resolver -> dispatcher. [`ContentActions`] wires the pieces together.

pub mod error;

pub mod config;

pub mod logging;

pub mod model {
    pub mod descriptor;
    pub use descriptor::{
        ActionDescriptor, AssociationKey, Condition, ConditionDef, DescriptorBatch,
        DescriptorEntry, HighlightDef, Invocation,
    };

    pub mod target;
    pub use target::Target;
}

pub mod registry {
    pub mod store;
    pub use store::{DescriptorStore, HighlightPattern, LoadReport, Snapshot};
}

pub mod resolve {
    pub mod classifier;
    pub use classifier::{Classifier, mime_keys};

    pub mod resolver;
    pub use resolver::Resolver;
}

pub mod dispatch {
    pub mod discovery;
    pub use discovery::{ServiceDiscovery, ServiceFileDiscovery};

    pub mod exec;
    pub use exec::{DetachedSpawner, ProcessSpawner};

    pub mod transport;
    pub use transport::{BusCall, BusKind, BusctlTransport, IpcTransport};

    pub mod dispatcher;
    pub use dispatcher::Dispatcher;
}

pub mod highlight;
pub use highlight::{Highlighter, Highlights, Match};

pub mod sources {
    pub mod condition;
    pub use condition::{ConditionEvaluator, NoConditions, SparqlConditionEvaluator};

    pub mod mime;
    pub use mime::{ExtensionSniffer, FileCommandSniffer, MimeSniffer};

    pub mod registry_file;
}

pub mod testing;

pub mod engine;
pub use engine::{ContentActions, ContentActionsBuilder};

pub use error::{ActionError, ActionResult, LoadError, LoadErrorKind};
pub use model::{ActionDescriptor, Invocation, Target};
