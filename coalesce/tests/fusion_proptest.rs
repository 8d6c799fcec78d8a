//! Property tests for entity fusion: idempotence, mention conservation, undo.

use cotejo_coalesce::{normalize_alias, Resolver};
use cotejo_core::{EntityKind, EntityStore, MentionId};
use proptest::prelude::*;
use std::collections::BTreeSet;

const NAMES: &[&str] = &[
    "María",
    "María Sánchez",
    "doña María",
    "Paco",
    "Francisco Ruiz",
    "don Francisco",
    "Isabel",
    "Isabel de la Torre",
    "García",
    "Ana García",
    "Luis García",
    "Toledo",
    "Pedro",
];

fn build(entities: &[(usize, bool, u8)]) -> (EntityStore, usize) {
    let mut store = EntityStore::new();
    let mut next = 0u32;
    for &(name, person, mentions) in entities {
        let name = NAMES[name % NAMES.len()];
        let kind = if person { EntityKind::Person } else { EntityKind::Location };
        let id = store.create(name, kind);
        let alias = normalize_alias(name);
        if store.alias_owner(&alias).is_none() {
            store.get_mut(id).unwrap().aliases.insert(alias);
        }
        for _ in 0..=mentions {
            store.attach_mention(id, MentionId(next)).unwrap();
            next += 1;
        }
    }
    (store, next as usize)
}

fn owned_mentions(store: &EntityStore) -> Vec<MentionId> {
    let mut all: Vec<MentionId> = store.iter().flat_map(|e| e.mentions.iter().copied()).collect();
    all.sort();
    all
}

proptest! {
    #[test]
    fn fusion_is_idempotent(entities in prop::collection::vec((0usize..13, any::<bool>(), 0u8..3), 1..12)) {
        let (mut store, _) = build(&entities);
        let resolver = Resolver::new();
        resolver.fuse(&mut store).unwrap();
        let ids = store.ids();
        let again = resolver.fuse(&mut store).unwrap();
        prop_assert!(again.merges.is_empty());
        prop_assert_eq!(store.ids(), ids);
    }

    #[test]
    fn fusion_conserves_mentions(entities in prop::collection::vec((0usize..13, any::<bool>(), 0u8..3), 1..12)) {
        let (mut store, total) = build(&entities);
        Resolver::new().fuse(&mut store).unwrap();
        let owned = owned_mentions(&store);
        prop_assert_eq!(owned.len(), total);
        let unique: BTreeSet<MentionId> = owned.iter().copied().collect();
        prop_assert_eq!(unique.len(), total);
        for m in owned {
            prop_assert!(store.entity_of_mention(m).is_some());
        }
        store.check_integrity().unwrap();
    }
}

#[test]
fn test_undo_merge_restores_entity() {
    let (mut store, _) = build(&[(0, true, 1), (1, true, 0)]);
    let report = Resolver::new().fuse(&mut store).unwrap();
    assert_eq!(report.merges.len(), 1);
    let absorbed = report.merges[0].absorbed;

    store.undo_merge(absorbed).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.redirects().is_empty());
    assert_eq!(store.get(absorbed).unwrap().id, absorbed);
    assert_eq!(owned_mentions(&store).len(), 3);
    store.check_integrity().unwrap();
}
