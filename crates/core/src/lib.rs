//! witr-core: why is this running?
//!
//! OS-agnostic core of witr. Resolves a PID, port or name to one process,
//! walks its ancestry and classifies what launched it. All OS access goes
//! through the traits in [`sources`]; `witr-platform` provides the
//! implementations.
//!
//! # Modules
//!
//! - [`models`] - Core data structures (Target, ProcessRecord, AncestryChain, Source, ...)
//! - [`resolver`] - Target Resolver
//! - [`ancestry`] - Ancestry Walker
//! - [`classifier`] - Origin Classifier and its detectors
//! - [`ambiguity`] - Shared disambiguation for port and name queries
//! - [`analyzer`] - Resolve, walk, classify and collect context into a [`Report`]
//! - [`render`] - Output formatters (human, tree, short, JSON)
//!
//! # Example
//!
//! ```ignore
//! use witr_core::{analyze, AnalyzeOptions, Classifier, Target, render};
//!
//! let sources = witr_platform::native_sources(Default::default());
//! let report = analyze(&Target::port("8080"), &sources, &Classifier::default(), &AnalyzeOptions::default())?;
//! println!("{}", render::render_human(&report));
//! ```

pub mod ambiguity;
pub mod analyzer;
pub mod ancestry;
pub mod classifier;
pub mod error;
pub mod models;
pub mod render;
pub mod report;
pub mod resolver;
pub mod socket;
pub mod sources;
pub mod tables;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at crate root
pub use ambiguity::{Ambiguity, Candidate, CandidateOrigin};
pub use analyzer::{analyze, AnalyzeOptions};
pub use ancestry::walk;
pub use classifier::{classify, Classifier, Detector};
pub use error::{ResolveError, SourceError, SourceResult};
pub use models::{
    AncestryChain, Confidence, Evidence, ProcessFacts, ProcessRecord, ProcessState, Signal, Source,
    SourceKind, Target, TargetKind, Warning,
};
pub use report::Report;
pub use resolver::{ResolutionOutcome, Resolver};
pub use socket::{Connection, ListeningSocket, OwnerHandle, Protocol, TcpState};
pub use sources::{NoServiceManager, ProcessTable, ServiceManager, SocketTable, Sources};
pub use tables::{LaunchTables, TableExtensions};
