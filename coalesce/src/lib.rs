//! # cotejo-coalesce
//!
//! Entity fusion across a manuscript.
//!
//! Coreference links mentions inside a window of chapters; this crate decides
//! which of the resulting entities are the same referent ("María" and
//! "María Sánchez", "Paco" and "don Francisco") and merges them in the
//! [`cotejo_core::EntityStore`], leaving redirects behind.
//!
//! # Example
//!
//! ```
//! use cotejo_coalesce::{normalize::normalize_alias, Resolver};
//! use cotejo_core::{EntityKind, EntityStore, MentionId};
//!
//! let mut store = EntityStore::new();
//! for (name, m) in [("María", 1), ("María Sánchez", 2)] {
//!     let id = store.create(name, EntityKind::Person);
//!     store.get_mut(id).unwrap().aliases.insert(normalize_alias(name));
//!     store.attach_mention(id, MentionId(m)).unwrap();
//! }
//!
//! let report = Resolver::new().fuse(&mut store).unwrap();
//! assert_eq!(report.merges.len(), 1);
//! assert_eq!(store.len(), 1);
//! ```

#![warn(missing_docs)]

pub mod normalize;
pub mod resolver;
pub mod similarity;

pub use normalize::{normalize_alias, strip_accents};
pub use resolver::{FusionConfig, FusionReport, MergeEvent, MergeSuggestion, Resolver};
pub use similarity::{
    embedding_similarity, name_similarity, string_similarity, MatchReason, NameMatch,
};
