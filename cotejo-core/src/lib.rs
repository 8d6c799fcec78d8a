//! # cotejo-core
//!
//! Data model shared by the cotejo crates.
//!
//! This crate provides:
//! - **Input**: `Document`, `Sentence`, `Token` with UD tags and morphology, plus a CoNLL-U reader
//! - **Resolution types**: `Mention`, `CoreferenceChain`, `Entity`, `EntityStore`
//! - **Findings**: `AttributeAssertion`, `Inconsistency`, `Fingerprint`
//! - **Learning state**: `VotingWeights`, `FeedbackRecord`
//!
//! All other crates in the workspace depend on `cotejo-core` so the types line
//! up across the fusion and engine crates.

pub mod attribute;
pub mod chain;
pub mod conllu;
pub mod document;
pub mod entity;
pub mod error;
pub mod feedback;
pub mod inconsistency;
pub mod mention;
pub mod weights;

// Re-exports for convenience
pub use attribute::{
    AssertionId, AssignmentSource, AttributeAssertion, AttributeCategory, AttributeKey, Modality,
};
pub use chain::{check_partition, ChainId, CoreferenceChain};
pub use conllu::parse_conllu;
pub use document::{
    BioTag, Chapter, DepRel, Document, Gender, Mood, Morph, Number, Person, Pos, PronType,
    Sentence, Span, Token, VerbForm,
};
pub use entity::{Entity, EntityId, EntityStore, MergeRecord};
pub use error::{Error, Result};
pub use feedback::{Decision, FeedbackRecord};
pub use inconsistency::{Excerpt, Fingerprint, Inconsistency, InconsistencyKind, Severity};
pub use mention::{EntityKind, Mention, MentionForm, MentionId, VoteSource};
pub use weights::{Task, VotingWeights};
