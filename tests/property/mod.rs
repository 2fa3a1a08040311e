//! Property-based testing for the event pipeline
//!
//! Uses proptest to check the aggregation, filtering, self-modification and
//! reference rewriting invariants across randomly generated event lists.

use ::assetsync::aggregate::aggregate;
use ::assetsync::filter::filter_events;
use ::assetsync::references::{rewrite_reference, Reference};
use ::assetsync::self_modified::SelfModificationSet;
use ::assetsync::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Directories events are drawn from
fn dir_strategy() -> impl Strategy<Value = PathBuf> {
    prop_oneof![
        Just(PathBuf::from("/data")),
        Just(PathBuf::from("/data/sprites")),
        Just(PathBuf::from("/data/levels")),
    ]
}

/// Small set of file names so that folds actually happen
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("hero.png".to_string()),
        Just("hero2.png".to_string()),
        Just("level.scene".to_string()),
        Just("jump.wav".to_string()),
    ]
}

fn path_strategy() -> impl Strategy<Value = PathBuf> {
    (dir_strategy(), name_strategy()).prop_map(|(dir, name)| dir.join(name))
}

/// Generate one normalized event
fn event_strategy() -> impl Strategy<Value = FileEvent> {
    prop_oneof![
        path_strategy().prop_map(|p| FileEvent::created(p, false)),
        path_strategy().prop_map(|p| FileEvent::changed(p, false)),
        path_strategy().prop_map(|p| FileEvent::deleted(p, false)),
        (path_strategy(), path_strategy()).prop_map(|(from, to)| FileEvent::renamed(from, to, false)),
    ]
}

fn events_strategy() -> impl Strategy<Value = Vec<FileEvent>> {
    prop::collection::vec(event_strategy(), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_no_noop_rename_survives(events in events_strategy()) {
        let mut events = events;
        aggregate(&mut events);
        filter_events(&mut events, &SelfModificationSet::new());
        prop_assert!(events.iter().all(|e| !e.is_noop_rename()));
    }

    #[test]
    fn prop_aggregation_reaches_a_fixpoint(events in events_strategy()) {
        let mut once = events;
        aggregate(&mut once);
        let mut twice = once.clone();
        prop_assert_eq!(aggregate(&mut twice), 0);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_aggregation_never_grows_the_list(events in events_strategy()) {
        let before = events.len();
        let mut events = events;
        aggregate(&mut events);
        prop_assert!(events.len() <= before);
    }

    #[test]
    fn prop_rename_chain_collapses(
        dirs in prop::collection::vec(dir_strategy(), 2..8),
    ) {
        // Distinct names per step so that only consecutive renames chain
        let paths: Vec<PathBuf> = dirs
            .iter()
            .enumerate()
            .map(|(i, dir)| dir.join(format!("step{}.png", i)))
            .collect();
        let mut events: Vec<FileEvent> = paths
            .windows(2)
            .map(|w| FileEvent::renamed(&w[0], &w[1], false))
            .collect();

        aggregate(&mut events);
        let first = paths.first().unwrap();
        let last = paths.last().unwrap();
        prop_assert_eq!(events, vec![FileEvent::renamed(first, last, false)]);
    }

    #[test]
    fn prop_delete_create_across_directories_is_a_move(
        from in dir_strategy(),
        to in dir_strategy(),
        name in name_strategy(),
    ) {
        prop_assume!(from != to);
        let mut events = vec![
            FileEvent::deleted(from.join(&name), false),
            FileEvent::created(to.join(&name), false),
        ];
        aggregate(&mut events);
        prop_assert_eq!(events, vec![FileEvent::renamed(from.join(&name), to.join(&name), false)]);
    }

    #[test]
    fn prop_unrelated_events_are_untouched(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..8),
        changed in any::<bool>(),
    ) {
        let events: Vec<FileEvent> = names
            .iter()
            .map(|n| {
                let path = PathBuf::from("/data").join(format!("{}.png", n));
                if changed { FileEvent::changed(path, false) } else { FileEvent::created(path, false) }
            })
            .collect();
        let mut aggregated = events.clone();
        prop_assert_eq!(aggregate(&mut aggregated), 0);
        prop_assert_eq!(aggregated, events);
    }

    #[test]
    fn prop_self_modification_lasts_one_full_cycle(
        flagged in prop::collection::btree_set(path_strategy(), 1..6),
        reflagged in prop::collection::btree_set(path_strategy(), 0..6),
    ) {
        let mut set = SelfModificationSet::new();
        for path in &flagged {
            set.flag(path);
        }
        set.age();
        for path in &reflagged {
            set.flag(path);
        }
        // Everything flagged is still suppressed after one cycle
        prop_assert!(flagged.iter().chain(&reflagged).all(|p| set.contains(p)));

        set.age();
        let expected: BTreeSet<&PathBuf> = reflagged.iter().collect();
        for path in flagged.iter().chain(&reflagged) {
            prop_assert_eq!(set.contains(path), expected.contains(path));
        }
    }

    #[test]
    fn prop_directory_rename_rebases_nested_references(
        nested in prop::collection::vec("[a-z]{1,6}", 1..4),
        name in name_strategy(),
    ) {
        let old_dir = PathBuf::from("/data/sprites");
        let new_dir = PathBuf::from("/data/art");
        let rest: PathBuf = nested.iter().collect::<PathBuf>().join(&name);
        let batch = vec![FileEvent::renamed(&old_dir, &new_dir, true)];

        let mut inside = Reference::new(old_dir.join(&rest));
        prop_assert!(rewrite_reference(&mut inside, &batch));
        prop_assert_eq!(inside.path, new_dir.join(&rest));

        let mut outside = Reference::new(PathBuf::from("/data/spritesheet").join(&rest));
        prop_assert!(!rewrite_reference(&mut outside, &batch));
    }
}
