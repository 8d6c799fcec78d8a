//! # cotejo
//!
//! Multi-method ensemble resolution for narrative manuscripts.
//!
//! - **NER**: statistical, transformer, gazetteer, heuristic and LLM voters
//! - **Coreference**: pair voting with pro-drop zero subjects and first-person narrators
//! - **Fusion**: alias/name based entity merging (via `cotejo-coalesce`)
//! - **Attributes**: scope-resolved extraction with negation and modality
//! - **Consistency**: categorical, numeric-range and semantic-distance conflicts
//! - **Feedback**: accept/dismiss decisions that reweight the voters
//!
//! Data types (documents, mentions, entities, assertions) live in
//! `cotejo-core` and are re-exported here.
//!
//! # Example
//!
//! ```rust
//! use cotejo::{Engine, RunOutcome};
//! use cotejo_core::parse_conllu;
//!
//! let doc = parse_conllu("\
//! 1\tMaría\tMaría\tPROPN\t_\t_\t2\tnsubj\t_\t_
//! 2\ttenía\ttener\tVERB\t_\t_\t0\troot\t_\t_
//! 3\tlos\tel\tDET\t_\t_\t4\tdet\t_\t_
//! 4\tojos\tojo\tNOUN\t_\t_\t2\tobj\t_\t_
//! 5\tazules\tazul\tADJ\t_\t_\t4\tamod\t_\tSpaceAfter=No
//! 6\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
//! ").unwrap();
//!
//! let engine = Engine::builder().build().unwrap();
//! let result = engine.analyze(&doc).unwrap();
//! assert_eq!(result.outcome, RunOutcome::Completed);
//! assert!(result.findings.is_empty());
//! ```

pub mod attributes;
pub mod config;
pub mod consistency;
pub mod coref;
pub mod error;
pub mod feedback;
pub mod lang;
pub mod ner;
pub mod pipeline;
pub mod scope;
pub mod signals;
pub mod sync;
pub mod voting;

pub use error::{Error, Result};

pub use config::EngineConfig;
pub use consistency::{ConsistencyChecker, SuppressionRule, Suppressions};
pub use feedback::{FeedbackTracker, WeightTable};
pub use pipeline::{CancellationToken, Engine, EngineBuilder, Phase, RunLimits, RunOutcome, RunResult};

pub use cotejo_core::{
    AttributeAssertion, AttributeKey, CoreferenceChain, Document, Entity, EntityId, EntityStore,
    Fingerprint, Inconsistency, InconsistencyKind, Mention, Task, VotingWeights,
};
