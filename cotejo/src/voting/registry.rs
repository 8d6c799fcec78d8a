// =============================================================================
// Voter Registry
// =============================================================================

use crate::attributes::{
    AttributeExtractor, DependencyExtractor, EmbeddingsExtractor, LlmExtractor, PatternExtractor,
};
use crate::coref::{EmbeddingsVoter, HeuristicsVoter, LlmPairVoter, MorphoVoter, PairVoter};
use crate::ner::{
    Gazetteer, GazetteerVoter, HeuristicVoter, LlmVoter, SpanVoter, StatisticalVoter,
    TransformerVoter,
};
use crate::signals::Signals;
use cotejo_core::Task;
use std::sync::Arc;

/// Voter implementations per resolution task.
///
/// Consistency detectors are fixed comparator families and are not
/// registered here.
#[derive(Clone, Default)]
pub struct VoterRegistry {
    ner: Vec<Arc<dyn SpanVoter>>,
    coref: Vec<Arc<dyn PairVoter>>,
    attributes: Vec<Arc<dyn AttributeExtractor>>,
}

impl std::fmt::Debug for VoterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoterRegistry")
            .field("ner", &self.names(Task::Ner))
            .field("coref", &self.names(Task::Coreference))
            .field("attributes", &self.names(Task::Attribute))
            .finish()
    }
}

impl VoterRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The offline voters, plus one model-backed voter per task for every
    /// signal provider that is present.
    #[must_use]
    pub fn standard(signals: &Signals, gazetteer: Gazetteer) -> Self {
        let mut registry = Self::new();
        registry.register_ner(Arc::new(StatisticalVoter::new()));
        registry.register_ner(Arc::new(HeuristicVoter::new()));
        registry.register_ner(Arc::new(GazetteerVoter::new(gazetteer)));
        registry.register_coref(Arc::new(MorphoVoter::new()));
        registry.register_coref(Arc::new(HeuristicsVoter::new()));
        registry.register_attribute(Arc::new(PatternExtractor::new()));
        registry.register_attribute(Arc::new(DependencyExtractor::new()));

        if let Some(tagger) = &signals.tagger {
            registry.register_ner(Arc::new(TransformerVoter::new(Arc::clone(tagger))));
        }
        if let Some(generator) = &signals.generator {
            registry.register_ner(Arc::new(LlmVoter::new(Arc::clone(generator))));
            registry.register_coref(Arc::new(LlmPairVoter::new(Arc::clone(generator))));
            registry.register_attribute(Arc::new(LlmExtractor::new(Arc::clone(generator))));
        }
        if let Some(embedder) = &signals.embedder {
            registry.register_coref(Arc::new(EmbeddingsVoter::new(Arc::clone(embedder))));
            registry.register_attribute(Arc::new(EmbeddingsExtractor::new(Arc::clone(embedder))));
        }
        log::debug!("[registry] {registry:?}");
        registry
    }

    /// Register an NER voter.
    pub fn register_ner(&mut self, voter: Arc<dyn SpanVoter>) {
        self.ner.push(voter);
    }

    /// Register a coreference voter.
    pub fn register_coref(&mut self, voter: Arc<dyn PairVoter>) {
        self.coref.push(voter);
    }

    /// Register an attribute extractor.
    pub fn register_attribute(&mut self, extractor: Arc<dyn AttributeExtractor>) {
        self.attributes.push(extractor);
    }

    /// NER voters.
    #[must_use]
    pub fn ner(&self) -> &[Arc<dyn SpanVoter>] {
        &self.ner
    }

    /// Coreference voters.
    #[must_use]
    pub fn coref(&self) -> &[Arc<dyn PairVoter>] {
        &self.coref
    }

    /// Attribute extractors.
    #[must_use]
    pub fn attributes(&self) -> &[Arc<dyn AttributeExtractor>] {
        &self.attributes
    }

    /// Registered names for a task.
    #[must_use]
    pub fn names(&self, task: Task) -> Vec<&str> {
        match task {
            Task::Ner => self.ner.iter().map(|v| v.name()).collect(),
            Task::Coreference => self.coref.iter().map(|v| v.name()).collect(),
            Task::Attribute => self.attributes.iter().map(|v| v.name()).collect(),
            Task::Consistency => Vec::new(),
        }
    }
}
