//! Canonical entities and the store that owns them.
//!
//! An [`Entity`] owns its aliases, mention references and attribute
//! assertions. When fusion decides two entities are the same referent, the
//! absorbed entity's contents are reparented onto the survivor and the
//! absorbed id becomes a redirect in the [`EntityStore`], so findings that
//! already reference it keep resolving.

use crate::attribute::{AssertionId, AttributeAssertion, AttributeKey};
use crate::document::{Gender, Number};
use crate::error::{Error, Result};
use crate::mention::{EntityKind, MentionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Stable identifier of an entity within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A canonical referent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Display name (most specific surface form seen).
    pub name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<Number>,
    /// Normalized aliases (lower-cased, diacritic and honorific stripped).
    pub aliases: BTreeSet<String>,
    /// Surface forms as written.
    pub surface_forms: BTreeSet<String>,
    pub mentions: Vec<MentionId>,
    pub attributes: BTreeMap<AttributeKey, Vec<AttributeAssertion>>,
    /// Context profile embedding, when an embedder was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<f32>>,
    /// First chapter the entity appears in.
    pub first_chapter: u32,
}

impl Entity {
    /// Create an entity with a display name and kind.
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>, kind: EntityKind) -> Self {
        let name = name.into();
        let mut surface_forms = BTreeSet::new();
        surface_forms.insert(name.clone());
        Self {
            id,
            name,
            kind,
            gender: None,
            number: None,
            aliases: BTreeSet::new(),
            surface_forms,
            mentions: Vec::new(),
            attributes: BTreeMap::new(),
            profile: None,
            first_chapter: 0,
        }
    }

    /// Current (non-superseded) assertions for a key.
    pub fn current(&self, key: AttributeKey) -> impl Iterator<Item = &AttributeAssertion> {
        self.attributes
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|a| a.is_current())
    }

    /// Total number of assertions, superseded included.
    #[must_use]
    pub fn assertion_count(&self) -> usize {
        self.attributes.values().map(Vec::len).sum()
    }
}

/// What one merge moved, kept so it can be undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub survivor: EntityId,
    pub absorbed: EntityId,
    /// Similarity that justified the merge.
    pub score: f64,
    /// Snapshot of the absorbed entity before the merge.
    snapshot: Entity,
    previous_name: String,
    previous_gender: Option<Gender>,
    previous_number: Option<Number>,
    previous_first_chapter: u32,
    moved_aliases: Vec<String>,
    moved_surface_forms: Vec<String>,
}

/// Owner of all entities of a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    redirects: BTreeMap<EntityId, EntityId>,
    history: Vec<MergeRecord>,
    #[serde(skip)]
    mention_owner: HashMap<MentionId, EntityId>,
    next_id: u32,
    next_assertion: u32,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity and return its id.
    pub fn create(&mut self, name: impl Into<String>, kind: EntityKind) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, Entity::new(id, name, kind));
        id
    }

    /// Follow redirects to the live entity id.
    #[must_use]
    pub fn resolve(&self, id: EntityId) -> Option<EntityId> {
        let mut current = id;
        // Redirect chains are acyclic; the bound guards against corruption.
        for _ in 0..=self.redirects.len() {
            if self.entities.contains_key(&current) {
                return Some(current);
            }
            current = *self.redirects.get(&current)?;
        }
        None
    }

    /// Live entity by id, following redirects.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.resolve(id).and_then(|id| self.entities.get(&id))
    }

    /// Mutable live entity by id, following redirects.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let id = self.resolve(id)?;
        self.entities.get_mut(&id)
    }

    /// Live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Live entity ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if the store has no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Redirect table (absorbed id to the id it was merged into).
    #[must_use]
    pub fn redirects(&self) -> &BTreeMap<EntityId, EntityId> {
        &self.redirects
    }

    /// Merge history, oldest first.
    #[must_use]
    pub fn history(&self) -> &[MergeRecord] {
        &self.history
    }

    /// Attach a mention to an entity. A mention may belong to one entity only.
    pub fn attach_mention(&mut self, entity: EntityId, mention: MentionId) -> Result<()> {
        let live = self
            .resolve(entity)
            .ok_or_else(|| Error::invalid_input(format!("unknown entity {entity}")))?;
        if let Some(owner) = self.mention_owner.get(&mention) {
            if *owner != live {
                return Err(Error::data_integrity(format!(
                    "mention {mention} already belongs to {owner}, cannot attach to {live}"
                )));
            }
            return Ok(());
        }
        self.mention_owner.insert(mention, live);
        if let Some(e) = self.entities.get_mut(&live) {
            e.mentions.push(mention);
        }
        Ok(())
    }

    /// Entity that owns a mention.
    #[must_use]
    pub fn entity_of_mention(&self, mention: MentionId) -> Option<EntityId> {
        self.mention_owner
            .get(&mention)
            .and_then(|&id| self.resolve(id))
    }

    /// Add an assertion; its `id` and `entity` fields are assigned here.
    pub fn add_assertion(&mut self, mut assertion: AttributeAssertion) -> Result<AssertionId> {
        let live = self.resolve(assertion.entity).ok_or_else(|| {
            Error::invalid_input(format!("assertion targets unknown entity {}", assertion.entity))
        })?;
        let id = AssertionId(self.next_assertion);
        self.next_assertion += 1;
        assertion.id = id;
        assertion.entity = live;
        if let Some(e) = self.entities.get_mut(&live) {
            e.attributes.entry(assertion.key).or_default().push(assertion);
        }
        Ok(id)
    }

    /// Mark `old` as superseded by `by`. Assertions are never deleted.
    pub fn supersede(&mut self, old: AssertionId, by: AssertionId) -> Result<()> {
        for e in self.entities.values_mut() {
            for list in e.attributes.values_mut() {
                if let Some(a) = list.iter_mut().find(|a| a.id == old) {
                    a.superseded_by = Some(by);
                    return Ok(());
                }
            }
        }
        Err(Error::invalid_input(format!("unknown assertion {old}")))
    }

    /// All assertions of live entities, superseded included.
    pub fn assertions(&self) -> impl Iterator<Item = &AttributeAssertion> {
        self.entities
            .values()
            .flat_map(|e| e.attributes.values().flatten())
    }

    /// Live entity owning a normalized alias.
    #[must_use]
    pub fn alias_owner(&self, alias: &str) -> Option<EntityId> {
        self.entities
            .values()
            .find(|e| e.aliases.contains(alias))
            .map(|e| e.id)
    }

    /// Reparent `absorbed` onto `survivor`; `absorbed` becomes a redirect.
    pub fn merge(&mut self, survivor: EntityId, absorbed: EntityId, score: f64) -> Result<&MergeRecord> {
        let s = self
            .resolve(survivor)
            .ok_or_else(|| Error::invalid_input(format!("unknown survivor {survivor}")))?;
        let a = self
            .resolve(absorbed)
            .ok_or_else(|| Error::invalid_input(format!("unknown absorbed entity {absorbed}")))?;
        if s == a {
            return Err(Error::invalid_input(format!(
                "cannot merge {s} into itself"
            )));
        }
        let gone = self
            .entities
            .remove(&a)
            .ok_or_else(|| Error::data_integrity(format!("entity {a} vanished during merge")))?;
        let target = self
            .entities
            .get_mut(&s)
            .ok_or_else(|| Error::data_integrity(format!("entity {s} vanished during merge")))?;

        let mut record = MergeRecord {
            survivor: s,
            absorbed: a,
            score,
            snapshot: gone.clone(),
            previous_name: target.name.clone(),
            previous_gender: target.gender,
            previous_number: target.number,
            previous_first_chapter: target.first_chapter,
            moved_aliases: Vec::new(),
            moved_surface_forms: Vec::new(),
        };

        for alias in gone.aliases {
            if target.aliases.insert(alias.clone()) {
                record.moved_aliases.push(alias);
            }
        }
        for form in gone.surface_forms {
            if target.surface_forms.insert(form.clone()) {
                record.moved_surface_forms.push(form);
            }
        }
        for m in &gone.mentions {
            target.mentions.push(*m);
            self.mention_owner.insert(*m, s);
        }
        for (key, list) in gone.attributes {
            let dest = target.attributes.entry(key).or_default();
            for mut assertion in list {
                assertion.entity = s;
                dest.push(assertion);
            }
        }
        if gone.name.chars().count() > target.name.chars().count() {
            target.name = gone.name;
        }
        if target.gender.is_none() {
            target.gender = gone.gender;
        }
        if target.number.is_none() {
            target.number = gone.number;
        }
        if target.profile.is_none() {
            target.profile = gone.profile;
        }
        if gone.first_chapter != 0
            && (target.first_chapter == 0 || gone.first_chapter < target.first_chapter)
        {
            target.first_chapter = gone.first_chapter;
        }

        self.redirects.insert(a, s);
        self.history.push(record);
        self.history
            .last()
            .ok_or_else(|| Error::data_integrity("merge history is empty after push"))
    }

    /// Undo the merge that absorbed `absorbed`.
    ///
    /// Only possible while the survivor is still live (not itself absorbed
    /// later); undo later merges first.
    pub fn undo_merge(&mut self, absorbed: EntityId) -> Result<()> {
        let pos = self
            .history
            .iter()
            .rposition(|r| r.absorbed == absorbed)
            .ok_or_else(|| Error::invalid_input(format!("{absorbed} was never merged")))?;
        let survivor = self.history[pos].survivor;
        if !self.entities.contains_key(&survivor) {
            return Err(Error::invalid_input(format!(
                "survivor {survivor} was merged again; undo that merge first"
            )));
        }
        let record = self.history.remove(pos);
        let restored = record.snapshot;
        let moved_mentions: BTreeSet<MentionId> = restored.mentions.iter().copied().collect();
        let moved_assertions: BTreeSet<AssertionId> = restored
            .attributes
            .values()
            .flatten()
            .map(|a| a.id)
            .collect();

        let target = self
            .entities
            .get_mut(&survivor)
            .ok_or_else(|| Error::data_integrity(format!("survivor {survivor} vanished")))?;
        for alias in &record.moved_aliases {
            target.aliases.remove(alias);
        }
        for form in &record.moved_surface_forms {
            target.surface_forms.remove(form);
        }
        target.mentions.retain(|m| !moved_mentions.contains(m));
        for list in target.attributes.values_mut() {
            list.retain(|a| !moved_assertions.contains(&a.id));
        }
        target.attributes.retain(|_, list| !list.is_empty());
        target.name = record.previous_name;
        target.gender = record.previous_gender;
        target.number = record.previous_number;
        target.first_chapter = record.previous_first_chapter;

        // Assertions added to the survivor after the merge stay there.
        for m in &restored.mentions {
            self.mention_owner.insert(*m, restored.id);
        }
        self.redirects.remove(&restored.id);
        self.entities.insert(restored.id, restored);
        Ok(())
    }

    /// Make normalized aliases unique across live entities.
    ///
    /// When two entities share an alias, the one with more mentions keeps it
    /// (lower id on ties). Returns `(alias, kept_by, removed_from)` triples.
    pub fn enforce_alias_uniqueness(&mut self) -> Vec<(String, EntityId, EntityId)> {
        let mut owners: BTreeMap<String, Vec<(usize, EntityId)>> = BTreeMap::new();
        for e in self.entities.values() {
            for alias in &e.aliases {
                owners
                    .entry(alias.clone())
                    .or_default()
                    .push((e.mentions.len(), e.id));
            }
        }
        let mut removed = Vec::new();
        for (alias, mut list) in owners {
            if list.len() < 2 {
                continue;
            }
            list.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            let keeper = list[0].1;
            for &(_, loser) in &list[1..] {
                if let Some(e) = self.entities.get_mut(&loser) {
                    e.aliases.remove(&alias);
                    removed.push((alias.clone(), keeper, loser));
                }
            }
        }
        removed
    }

    /// Verify the store's structural invariants.
    pub fn check_integrity(&self) -> Result<()> {
        let mut seen: HashMap<MentionId, EntityId> = HashMap::new();
        let mut aliases: HashMap<&str, EntityId> = HashMap::new();
        for e in self.entities.values() {
            for m in &e.mentions {
                if let Some(other) = seen.insert(*m, e.id) {
                    return Err(Error::data_integrity(format!(
                        "mention {m} is owned by both {other} and {}",
                        e.id
                    )));
                }
            }
            for alias in &e.aliases {
                if let Some(other) = aliases.insert(alias.as_str(), e.id) {
                    return Err(Error::data_integrity(format!(
                        "alias '{alias}' is shared by {other} and {}",
                        e.id
                    )));
                }
            }
            for (key, list) in &e.attributes {
                if let Some(a) = list.iter().find(|a| a.entity != e.id || a.key != *key) {
                    return Err(Error::data_integrity(format!(
                        "assertion {} filed under {}/{} but points at {}/{}",
                        a.id, e.id, key, a.entity, a.key
                    )));
                }
            }
        }
        for from in self.redirects.keys() {
            if self.resolve(*from).is_none() {
                return Err(Error::data_integrity(format!(
                    "redirect from {from} does not reach a live entity"
                )));
            }
        }
        Ok(())
    }

    /// Rebuild the mention index after deserialization.
    pub fn reindex(&mut self) {
        self.mention_owner = self
            .entities
            .values()
            .flat_map(|e| e.mentions.iter().map(move |m| (*m, e.id)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AssignmentSource, Modality};
    use crate::document::Span;

    fn assertion(entity: EntityId, value: &str) -> AttributeAssertion {
        AttributeAssertion {
            id: AssertionId(0),
            key: AttributeKey::EyeColor,
            value: value.to_string(),
            normalized: value.to_string(),
            entity,
            source_mention: None,
            scope: Span::new(0, 10),
            span: Span::new(5, 10),
            excerpt: String::new(),
            confidence: 0.9,
            chapter: 1,
            sentence: 0,
            paragraph: 0,
            modality: Modality::Asserted,
            source: AssignmentSource::Subject,
            methods: vec!["patterns".into()],
            superseded_by: None,
        }
    }

    fn store_with_two() -> (EntityStore, EntityId, EntityId) {
        let mut store = EntityStore::new();
        let a = store.create("María", EntityKind::Person);
        let b = store.create("María Sánchez", EntityKind::Person);
        store.get_mut(a).unwrap().aliases.insert("maria".into());
        store.get_mut(b).unwrap().aliases.insert("maria sanchez".into());
        store.attach_mention(a, MentionId(1)).unwrap();
        store.attach_mention(b, MentionId(2)).unwrap();
        store.add_assertion(assertion(a, "azules")).unwrap();
        store.add_assertion(assertion(b, "verdes")).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_merge_reparents_and_redirects() {
        let (mut store, a, b) = store_with_two();
        store.merge(a, b, 0.9).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(b), Some(a));
        let e = store.get(b).unwrap();
        assert_eq!(e.id, a);
        assert_eq!(e.name, "María Sánchez");
        assert_eq!(e.current(AttributeKey::EyeColor).count(), 2);
        assert!(e.current(AttributeKey::EyeColor).all(|x| x.entity == a));
        assert_eq!(store.entity_of_mention(MentionId(2)), Some(a));
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_undo_restores() {
        let (mut store, a, b) = store_with_two();
        store.merge(a, b, 0.9).unwrap();
        store.undo_merge(b).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.resolve(b), Some(b));
        assert_eq!(store.get(a).unwrap().name, "María");
        assert_eq!(store.get(a).unwrap().current(AttributeKey::EyeColor).count(), 1);
        assert_eq!(store.entity_of_mention(MentionId(2)), Some(b));
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_merge_self_is_error() {
        let (mut store, a, _) = store_with_two();
        assert!(store.merge(a, a, 1.0).is_err());
    }

    #[test]
    fn test_mention_single_owner() {
        let (mut store, _, b) = store_with_two();
        let err = store.attach_mention(b, MentionId(1)).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[test]
    fn test_alias_uniqueness() {
        let mut store = EntityStore::new();
        let a = store.create("García", EntityKind::Person);
        let b = store.create("García", EntityKind::Location);
        store.get_mut(a).unwrap().aliases.insert("garcia".into());
        store.get_mut(b).unwrap().aliases.insert("garcia".into());
        store.attach_mention(b, MentionId(7)).unwrap();
        let removed = store.enforce_alias_uniqueness();
        assert_eq!(removed, vec![("garcia".to_string(), b, a)]);
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_supersede_keeps_assertion() {
        let (mut store, a, _) = store_with_two();
        let newer = store.add_assertion(assertion(a, "grises")).unwrap();
        let old = store.get(a).unwrap().attributes[&AttributeKey::EyeColor][0].id;
        store.supersede(old, newer).unwrap();
        let e = store.get(a).unwrap();
        assert_eq!(e.attributes[&AttributeKey::EyeColor].len(), 2);
        assert_eq!(e.current(AttributeKey::EyeColor).count(), 1);
    }
}
