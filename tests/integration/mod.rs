//! End-to-end scenarios for the sync engine
//!
//! Every test lays out a real project in a temporary directory, performs the
//! file operations an external tool would, feeds the matching raw notifications
//! to the engine and checks the cache, the files on disk and the raised events.

use crate::common::*;
use ::assetsync::collaborators::{ChangedObject, ReloadDecision};
use ::assetsync::events::ResourceEvent;
use ::assetsync::watcher::EventTranslator;
use ::assetsync::*;
use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Collect everything a listener saw
fn events_of(listener: &VetoListener) -> Vec<ResourceEvent> {
    listener.events.borrow().clone()
}

/// Engine over `project` with a recording listener attached
fn engine_with_listener(project: &Project) -> (SyncEngine, VetoListener) {
    let listener = VetoListener::default();
    let engine = project
        .builder()
        .listener(listener.clone())
        .build(project.config())
        .unwrap();
    (engine, listener)
}

/// Rename a data file on disk and report it
fn rename_data(engine: &mut SyncEngine, from: &PathBuf, to: &PathBuf, is_directory: bool) {
    fs::rename(from, to).unwrap();
    push_data(engine, RawEvent::renamed(from, to), is_directory);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_asset_rename_rewrites_references_and_moves_media() {
        let project = Project::new();
        let hero = project.write_data("assets/sprites/hero.png", "png");
        let scene = project.write_scene("level.scene", &["assets/sprites/hero.png"]);
        project.write_media("assets/sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);

        let hero2 = project.data.join("assets/sprites/hero2.png");
        rename_data(&mut engine, &hero, &hero2, false);

        let report = engine.drain();
        assert_eq!(report.renames_batched, 1);
        assert_eq!(report.mirrored_moves.len(), 1);
        assert!(project.media.join("assets/sprites/hero2.png").is_file());
        assert!(!project.media.join("assets/sprites/hero.png").exists());

        // References are only rewritten once the batch is propagated
        assert_eq!(project.scene_refs(&scene), vec!["assets/sprites/hero.png"]);
        assert_eq!(engine.pending_batches(), 1);

        let reports = engine.run_propagation(&mut |_| {});
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].files_saved, vec![scene.clone()]);
        assert_eq!(reports[0].references_rewritten, 1);
        assert!(reports[0].warnings.is_empty());
        assert_eq!(project.scene_refs(&scene), vec!["assets/sprites/hero2.png"]);

        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Renamed {
                path: hero2,
                old_path: hero,
                is_directory: false
            }]
        );
        assert!(engine.self_modified().contains(&scene));
        assert!(!engine.is_propagating());
    }

    #[test]
    fn test_rename_rewrites_cached_document_in_memory() {
        let project = Project::new();
        let hero = project.write_data("assets/sprites/hero.png", "png");
        let scene = project.write_scene("level.scene", &["assets/sprites/hero.png"]);
        let ui = TestUi::answering(ReloadDecision::Reload);
        let mut engine = project.builder().ui(ui.clone()).build(project.config()).unwrap();
        engine.collaborators_mut().cache.request(&scene).unwrap();

        let hero2 = project.data.join("assets/sprites/hero2.png");
        rename_data(&mut engine, &hero, &hero2, false);
        engine.drain();
        let reports = engine.run_propagation(&mut |_| {});

        assert_eq!(reports[0].modified_cached, vec![scene.clone()]);
        assert!(reports[0].files_saved.is_empty());
        // The cached copy changed, the file on disk did not
        assert_eq!(project.scene_refs(&scene), vec!["assets/sprites/hero.png"]);
        let cached = engine.collaborators_mut().cache.loaded_mut(&scene).unwrap();
        assert_eq!(reference_paths(cached), vec![hero2]);
        assert_eq!(ui.0.borrow().notified, vec![ChangedObject::Resource(scene)]);
    }

    #[test]
    fn test_directory_rename_moves_media_and_rewrites_references() {
        let project = Project::new();
        project.write_data("assets/sprites/hero.png", "png");
        let scene = project.write_scene("level.scene", &["assets/sprites/hero.png"]);
        project.write_media("assets/sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);

        let old_dir = project.data.join("assets/sprites");
        let new_dir = project.data.join("assets/art");
        rename_data(&mut engine, &old_dir, &new_dir, true);

        let report = engine.drain();
        assert_eq!(report.renames_batched, 1);
        assert!(project.media.join("assets/art/hero.png").is_file());
        assert!(!project.media.join("assets/sprites").exists());

        let reports = engine.run_propagation(&mut |_| {});
        assert_eq!(reports[0].files_saved, vec![scene.clone()]);
        assert_eq!(project.scene_refs(&scene), vec!["assets/art/hero.png"]);
        assert_eq!(events_of(&listener).len(), 1);
    }

    #[test]
    fn test_directory_delete_evicts_tree_and_recycles_media() {
        let project = Project::new();
        let hero = project.write_data("assets/sprites/hero.png", "png");
        let scene = project.write_scene("level.scene", &[]);
        project.write_media("assets/sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);
        engine.collaborators_mut().cache.request(&hero).unwrap();
        engine.collaborators_mut().cache.request(&scene).unwrap();

        let dir = project.data.join("assets/sprites");
        fs::remove_dir_all(&dir).unwrap();
        push_data(&mut engine, RawEvent::new(&dir, RawEventKind::Deleted), true);

        let report = engine.drain();
        assert_eq!(report.recycled, vec![project.media.join("assets/sprites")]);
        assert!(!engine.collaborators().cache.has(&hero));
        assert!(engine.collaborators().cache.has(&scene));
        assert!(!project.media.join("assets/sprites").exists());
        assert_eq!(project.trashed_files(), vec![PathBuf::from("sprites/hero.png")]);
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Deleted {
                path: dir,
                is_directory: true
            }]
        );
        assert!(!engine.is_propagating());
    }

    /// Remove a cached directory and report it through an [`EventTranslator`]
    /// seeded the way a running watcher is
    fn delete_directory_through_translator(notifications: impl Fn(&Path) -> Vec<notify::Event>, flush: bool) {
        let project = Project::new();
        let hero = project.write_data("assets/sprites/hero.png", "png");
        project.write_media("assets/sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);
        engine.collaborators_mut().cache.request(&hero).unwrap();

        let mut translator = EventTranslator::new();
        translator.seed_directories(&project.data);
        let dir = project.data.join("assets/sprites");
        fs::remove_dir_all(&dir).unwrap();

        let mut translated: Vec<_> = notifications(&dir)
            .iter()
            .flat_map(|event| translator.translate(event))
            .collect();
        if flush {
            translated.extend(translator.flush());
        }
        for (raw, is_directory) in translated {
            push_data(&mut engine, raw, is_directory);
        }

        let report = engine.drain();
        assert!(!engine.collaborators().cache.has(&hero));
        assert_eq!(report.recycled, vec![project.media.join("assets/sprites")]);
        assert!(!project.media.join("assets/sprites").exists());
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Deleted {
                path: dir,
                is_directory: true
            }]
        );
    }

    #[test]
    fn test_directory_removal_reported_without_kind() {
        delete_directory_through_translator(
            |dir| vec![Event::new(EventKind::Remove(RemoveKind::Any)).add_path(dir.to_path_buf())],
            false,
        );
    }

    #[test]
    fn test_directory_moved_out_of_data_tree() {
        delete_directory_through_translator(
            |dir| {
                vec![Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
                    .add_path(dir.to_path_buf())
                    .set_tracker(42)]
            },
            true,
        );
    }

    #[test]
    fn test_directory_deletion_without_flag_is_recognized() {
        let project = Project::new();
        let hero = project.write_data("assets/sprites/hero.png", "png");
        project.write_media("assets/sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);
        engine.collaborators_mut().cache.request(&hero).unwrap();

        let dir = project.data.join("assets/sprites");
        fs::remove_dir_all(&dir).unwrap();
        push_data(&mut engine, RawEvent::new(&dir, RawEventKind::Deleted), false);

        let report = engine.drain();
        assert!(!engine.collaborators().cache.has(&hero));
        assert_eq!(report.recycled, vec![project.media.join("assets/sprites")]);
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Deleted {
                path: dir,
                is_directory: true
            }]
        );
    }

    #[test]
    fn test_asset_delete_recycles_existing_sources_only() {
        let project = Project::new();
        let hero = project.write_data("sprites/hero.png", "png");
        project.write_media("sprites/hero.psd", "layers");
        let mut engine = project.engine();

        fs::remove_file(&hero).unwrap();
        push_data(&mut engine, RawEvent::new(&hero, RawEventKind::Deleted), false);
        let report = engine.drain();

        assert_eq!(report.recycled, vec![project.media.join("sprites/hero.psd")]);
        assert_eq!(project.trashed_files(), vec![PathBuf::from("hero.psd")]);
        // The emptied media directory is pruned, the media root is not
        assert!(!project.media.join("sprites").exists());
        assert!(project.media.is_dir());
    }

    #[test]
    fn test_two_changes_produce_one_modified_event() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let (mut engine, listener) = engine_with_listener(&project);

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        let report = engine.drain();

        assert_eq!(report.events_processed, 1);
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Modified {
                path: scene,
                is_directory: false
            }]
        );
    }

    #[test]
    fn test_safe_save_is_reported_as_modification() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let (mut engine, listener) = engine_with_listener(&project);
        engine.collaborators_mut().cache.request(&scene).unwrap();

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Deleted), false);
        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Created), false);
        let report = engine.drain();

        assert_eq!(report.evictions, 1);
        assert!(!engine.collaborators().cache.has(&scene));
        assert!(project.trashed_files().is_empty());
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Modified {
                path: scene,
                is_directory: false
            }]
        );
    }

    #[test]
    fn test_rename_chain_is_reported_once() {
        let project = Project::new();
        let a = project.write_data("a.png", "png");
        let b = project.data.join("b.png");
        let c = project.data.join("c.png");
        let (mut engine, listener) = engine_with_listener(&project);

        rename_data(&mut engine, &a, &b, false);
        rename_data(&mut engine, &b, &c, false);
        let report = engine.drain();

        assert_eq!(report.renames_batched, 1);
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::Renamed {
                path: c,
                old_path: a,
                is_directory: false
            }]
        );
    }

    #[test]
    fn test_non_asset_files_are_ignored() {
        let project = Project::new();
        let notes = project.write_data("notes.txt", "todo");
        let (mut engine, listener) = engine_with_listener(&project);

        push_data(&mut engine, RawEvent::new(&notes, RawEventKind::Changed), false);
        let report = engine.drain();

        assert_eq!(report.events_received, 1);
        assert!(events_of(&listener).is_empty());
    }

    #[test]
    fn test_hidden_paths_are_never_buffered() {
        let project = Project::new();
        let (mut engine, listener) = engine_with_listener(&project);
        let hidden = project.data.join(".git/index.scene");

        assert!(!engine.push_event(WatchRoot::Data, RawEvent::new(&hidden, RawEventKind::Changed), false));
        assert!(engine.drain().is_empty());
        assert!(events_of(&listener).is_empty());
    }

    #[test]
    fn test_self_modification_is_suppressed_for_a_full_cycle() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let (mut engine, listener) = engine_with_listener(&project);

        engine.flag_path_modified(&scene);
        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        engine.drain();
        assert!(events_of(&listener).is_empty());

        // The notification may arrive one cycle late
        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        engine.drain();
        assert!(events_of(&listener).is_empty());

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        engine.drain();
        assert_eq!(events_of(&listener).len(), 1);
    }

    #[test]
    fn test_self_modification_expires_after_two_cycles() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let (mut engine, listener) = engine_with_listener(&project);

        engine.flag_path_modified(&scene);
        engine.drain();
        engine.drain();
        assert!(!engine.self_modified().contains(&scene));

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        engine.drain();
        assert_eq!(events_of(&listener).len(), 1);
    }

    #[test]
    fn test_self_modification_does_not_hide_renames() {
        let project = Project::new();
        let a = project.write_data("a.png", "png");
        let b = project.data.join("b.png");
        let mut engine = project.engine();

        engine.flag_path_modified(&b);
        rename_data(&mut engine, &a, &b, false);
        assert_eq!(engine.drain().renames_batched, 1);
    }

    #[test]
    fn test_external_change_evicts_cached_asset() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let ui = TestUi::answering(ReloadDecision::Keep);
        let mut engine = project.builder().ui(ui.clone()).build(project.config()).unwrap();
        engine.collaborators_mut().cache.request(&scene).unwrap();

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        let report = engine.drain();

        assert_eq!(report.evictions, 1);
        assert!(!engine.collaborators().cache.has(&scene));
        assert!(ui.0.borrow().prompts.is_empty());
    }

    #[test]
    fn test_active_document_reload_confirmed() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let documents = TestDocuments::default();
        let state = documents.state.clone();
        state.borrow_mut().active = Some(scene.clone());
        let ui = TestUi::answering(ReloadDecision::Reload);
        let mut engine = project
            .builder()
            .documents(documents)
            .ui(ui.clone())
            .build(project.config())
            .unwrap();
        engine.collaborators_mut().cache.request(&scene).unwrap();

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        let report = engine.drain();

        assert_eq!(report.evictions, 1);
        assert!(report.warnings.is_empty());
        assert_eq!(ui.0.borrow().prompts, vec![scene.clone()]);
        // Reloaded from disk and activated again
        assert!(engine.collaborators().cache.has(&scene));
        assert_eq!(state.borrow().switched_to, vec![scene]);
    }

    #[test]
    fn test_active_document_reload_declined() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let documents = TestDocuments::default();
        let state = documents.state.clone();
        state.borrow_mut().active = Some(scene.clone());
        let ui = TestUi::answering(ReloadDecision::Keep);
        let mut engine = project
            .builder()
            .documents(documents)
            .ui(ui.clone())
            .build(project.config())
            .unwrap();
        engine.collaborators_mut().cache.request(&scene).unwrap();

        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        let report = engine.drain();

        assert_eq!(report.evictions, 0);
        assert_eq!(ui.0.borrow().prompts.len(), 1);
        assert!(engine.collaborators().cache.has(&scene));
        assert!(state.borrow().switched_to.is_empty());
    }

    #[test]
    fn test_unsaved_asset_reload_does_not_switch_documents() {
        let project = Project::new();
        let material = project.write_data("hero.material", "{}");
        let documents = TestDocuments::default();
        let state = documents.state.clone();
        state.borrow_mut().unsaved.insert(material.clone());
        let ui = TestUi::answering(ReloadDecision::Reload);
        let mut engine = project
            .builder()
            .documents(documents)
            .ui(ui.clone())
            .build(project.config())
            .unwrap();
        engine.collaborators_mut().cache.request(&material).unwrap();

        push_data(&mut engine, RawEvent::new(&material, RawEventKind::Changed), false);
        engine.drain();

        assert_eq!(ui.0.borrow().prompts, vec![material.clone()]);
        assert!(!engine.collaborators().cache.has(&material));
        assert!(state.borrow().switched_to.is_empty());
    }

    #[test]
    fn test_vetoed_rename_is_neither_propagated_nor_mirrored() {
        let project = Project::new();
        let hero = project.write_data("sprites/hero.png", "png");
        let scene = project.write_scene("level.scene", &["sprites/hero.png"]);
        project.write_media("sprites/hero.png", "layers");
        let (mut engine, listener) = engine_with_listener(&project);
        engine.collaborators_mut().cache.request(&hero).unwrap();

        let hero2 = project.data.join("sprites/hero2.png");
        listener.veto.borrow_mut().insert(hero2.clone());
        rename_data(&mut engine, &hero, &hero2, false);
        let report = engine.drain();

        assert_eq!(report.renames_batched, 0);
        assert!(report.mirrored_moves.is_empty());
        assert!(!engine.is_propagating());
        assert!(project.media.join("sprites/hero.png").is_file());
        assert_eq!(project.scene_refs(&scene), vec!["sprites/hero.png"]);
        // The cache and the listeners still learn about the rename
        assert!(engine.collaborators().cache.has(&hero2));
        assert_eq!(listener.asked.borrow().as_slice(), &[hero2]);
        assert_eq!(events_of(&listener).len(), 1);
    }

    #[test]
    fn test_empty_directory_rename_is_not_propagated() {
        let project = Project::new();
        let old_dir = project.data.join("empty");
        fs::create_dir_all(&old_dir).unwrap();
        let (mut engine, listener) = engine_with_listener(&project);

        let new_dir = project.data.join("still_empty");
        rename_data(&mut engine, &old_dir, &new_dir, true);
        let report = engine.drain();

        assert_eq!(report.renames_batched, 0);
        assert!(listener.asked.borrow().is_empty());
        assert!(!engine.is_propagating());
        assert_eq!(events_of(&listener).len(), 1);
    }

    #[test]
    fn test_tick_never_propagates_inline() {
        let project = Project::new();
        let hero = project.write_data("hero.png", "png");
        let scene = project.write_scene("level.scene", &["hero.png"]);
        let mut engine = project.engine();

        let hero2 = project.data.join("hero2.png");
        rename_data(&mut engine, &hero, &hero2, false);
        let report = engine.tick(Instant::now());

        assert_eq!(report.renames_batched, 1);
        assert!(engine.is_propagating());
        assert_eq!(project.scene_refs(&scene), vec!["hero.png"]);

        for _ in 0..100 {
            if !engine.is_propagating() {
                break;
            }
            engine.tick(Instant::now());
        }
        assert!(!engine.is_propagating());
        assert_eq!(engine.take_propagation_reports().len(), 1);
        assert_eq!(project.scene_refs(&scene), vec!["hero2.png"]);
    }

    #[test]
    fn test_unclaimed_propagation_reports_are_bounded() {
        let project = Project::new();
        let hero = project.write_data("hero.png", "png");
        let hero2 = project.data.join("hero2.png");
        project.write_scene("level.scene", &["hero.png"]);
        let mut engine = project.engine();

        for i in 0..::assetsync::engine::MAX_RETAINED_REPORTS + 8 {
            let (from, to) = if i % 2 == 0 { (&hero, &hero2) } else { (&hero2, &hero) };
            rename_data(&mut engine, from, to, false);
            engine.drain();
            engine.advance_propagation(1000);
            assert!(!engine.is_propagating());
        }

        assert_eq!(engine.take_propagation_reports().len(), ::assetsync::engine::MAX_RETAINED_REPORTS);
        assert!(engine.take_propagation_reports().is_empty());
    }

    #[test]
    fn test_rename_batches_are_queued_in_order() {
        let project = Project::new();
        let a = project.write_data("a.png", "png");
        let b = project.write_data("b.png", "png");
        let scene = project.write_scene("level.scene", &["a.png", "b.png"]);
        let mut engine = project.engine();

        rename_data(&mut engine, &a, &project.data.join("a2.png"), false);
        engine.drain();
        engine.advance_propagation(1);
        assert!(engine.propagation_progress().is_some());

        rename_data(&mut engine, &b, &project.data.join("b2.png"), false);
        engine.drain();
        assert_eq!(engine.pending_batches(), 1);

        let mut fractions = Vec::new();
        let reports = engine.run_propagation(&mut |p| fractions.push(p.fraction));
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.renames == 1));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert_eq!(project.scene_refs(&scene), vec!["a2.png", "b2.png"]);
    }

    #[test]
    fn test_propagate_now_rejects_concurrent_and_non_rename_batches() {
        let project = Project::new();
        let a = project.write_data("a.png", "png");
        let mut engine = project.engine();

        let err = engine
            .propagate_now(vec![FileEvent::changed(&a, false)], &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));

        rename_data(&mut engine, &a, &project.data.join("b.png"), false);
        engine.drain();
        let err = engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("x.png"), project.data.join("y.png"), false)],
                &mut |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::PropagationInProgress));
    }

    #[test]
    fn test_propagate_now_rewrites_settings() {
        let project = Project::new();
        let settings_dir = project.root.join("Settings");
        fs::create_dir_all(&settings_dir).unwrap();
        fs::write(
            settings_dir.join("user.json"),
            r#"{ "lastScene": { "$ref": "levels/one.scene" } }"#,
        )
        .unwrap();
        let rules = project.rules();
        let mut engine = SyncEngine::builder()
            .catalog(rules.clone())
            .cache(::assetsync::json_store::JsonAssetStore::new(&project.data, rules))
            .recycle_bin(::assetsync::json_store::TrashDirectory::new(&project.trash))
            .settings(::assetsync::json_store::JsonSettingsStore::new(
                settings_dir.join("application.json"),
                settings_dir.join("user.json"),
                &project.data,
            ))
            .build(project.config())
            .unwrap();

        let report = engine
            .propagate_now(
                vec![FileEvent::renamed(
                    project.data.join("levels"),
                    project.data.join("stages"),
                    true,
                )],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(report.references_rewritten, 1);
        let user: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(settings_dir.join("user.json")).unwrap()).unwrap();
        assert_eq!(user["lastScene"]["$ref"], "stages/one.scene");
    }

    #[test]
    fn test_sandbox_rewrites_persisted_active_document() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &["hero.png"]);
        let documents = TestDocuments::default();
        {
            let mut state = documents.state.borrow_mut();
            state.active = Some(scene.clone());
            state.sandbox = true;
        }
        let mut engine = project.builder().documents(documents).build(project.config()).unwrap();

        let report = engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("hero.png"), project.data.join("hero2.png"), false)],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(project.scene_refs(&scene), vec!["hero2.png"]);
        assert!(report.files_saved.contains(&scene));
        assert!(engine.self_modified().contains(&scene));
    }

    #[test]
    fn test_runtime_active_document_is_rewritten_in_memory() {
        let project = Project::new();
        let documents = TestDocuments {
            runtime: Some(runtime_scene(&project.data, &["hero.png"])),
            ..Default::default()
        };
        let ui = TestUi::answering(ReloadDecision::Reload);
        let mut engine = project
            .builder()
            .documents(documents)
            .ui(ui.clone())
            .build(project.config())
            .unwrap();

        let hero2 = project.data.join("hero2.png");
        engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("hero.png"), &hero2, false)],
                &mut |_| {},
            )
            .unwrap();

        let runtime = engine.collaborators_mut().documents.runtime_document_mut().unwrap();
        assert_eq!(reference_paths(runtime), vec![hero2]);
        assert_eq!(ui.0.borrow().notified, vec![ChangedObject::ActiveDocument]);
    }

    #[test]
    #[traced_test]
    fn test_unparsable_documents_become_warnings() {
        let project = Project::new();
        let broken = project.write_data("broken.scene", "{ not json");
        let scene = project.write_scene("level.scene", &["hero.png"]);
        let mut engine = project.engine();

        let report = engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("hero.png"), project.data.join("hero2.png"), false)],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(report.files_saved, vec![scene]);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains(&broken.display().to_string()));
    }

    #[test]
    fn test_type_prefilter_skips_unrelated_assets() {
        let project = Project::new();
        // Materials can only reference textures and shaders
        let material = project.write_data(
            "hero.material",
            r#"{ "sound": { "$ref": "jump.wav" } }"#,
        );
        let scene = project.write_scene("level.scene", &["jump.wav"]);
        let mut engine = project.engine();

        let report = engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("jump.wav"), project.data.join("hop.wav"), false)],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(report.files_saved, vec![scene]);
        assert_eq!(report.files_skipped, 1);
        assert!(fs::read_to_string(&material).unwrap().contains("jump.wav"));
    }

    #[test]
    fn test_source_changes_are_reimported_on_focus() {
        let project = Project::new();
        let psd = project.write_media("sprites/hero.psd", "layers");
        let reimporter = TestReimporter::default();
        let mut engine = project
            .builder()
            .reimporter(reimporter.clone())
            .build(project.config())
            .unwrap();

        engine.push_event(WatchRoot::Source, RawEvent::new(&psd, RawEventKind::Changed), false);
        engine.push_event(WatchRoot::Source, RawEvent::new(&psd, RawEventKind::Changed), false);
        let report = engine.drain();
        assert_eq!(report.reimports_scheduled, 1);
        assert_eq!(engine.reimport_schedule().len(), 1);

        assert_eq!(engine.on_focus_regained(), vec![psd.clone()]);
        assert_eq!(reimporter.0.borrow().as_slice(), &[vec![psd]]);
        assert!(engine.reimport_schedule().is_empty());
        assert!(engine.on_focus_regained().is_empty());
    }

    #[test]
    fn test_source_changes_outside_media_are_ignored() {
        let project = Project::new();
        let readme = project.source.join("README.txt");
        fs::write(&readme, "notes").unwrap();
        let mut engine = project.engine();

        engine.push_event(WatchRoot::Source, RawEvent::new(&readme, RawEventKind::Changed), false);
        engine.drain();
        assert!(engine.reimport_schedule().is_empty());
    }

    #[test]
    fn test_plugin_binaries_are_announced_immediately() {
        let project = Project::new();
        let plugins = project.root.join("Plugins");
        let mut config = project.config();
        config.plugin_dirs = vec![plugins.clone()];
        let listener = VetoListener::default();
        let mut engine = project.builder().listener(listener.clone()).build(config).unwrap();

        let binary = plugins.join("Game.core.dll");
        assert!(engine.push_event(WatchRoot::Plugin, RawEvent::new(&binary, RawEventKind::Created), false));
        assert!(!engine.push_event(WatchRoot::Plugin, RawEvent::new(&binary, RawEventKind::Deleted), false));
        assert!(!engine.push_event(
            WatchRoot::Plugin,
            RawEvent::new(plugins.join("readme.txt"), RawEventKind::Changed),
            false
        ));
        assert_eq!(
            events_of(&listener),
            vec![ResourceEvent::PluginBinaryChanged { path: binary }]
        );
    }

    #[test]
    fn test_inbox_feeds_the_next_tick() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let mut engine = project.engine();
        let events = engine.event_channel();
        let inbox = engine.inbox();

        let sender = inbox.clone();
        let path = scene.clone();
        std::thread::spawn(move || {
            assert!(sender.send(WatchRoot::Data, RawEvent::new(path, RawEventKind::Changed), false));
        })
        .join()
        .unwrap();

        engine.tick(Instant::now());
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![ResourceEvent::Modified {
                path: scene.clone(),
                is_directory: false
            }]
        );

        drop(engine);
        assert!(!inbox.send(WatchRoot::Data, RawEvent::new(scene, RawEventKind::Changed), false));
    }

    #[test]
    fn test_unsubscribed_listener_sees_nothing() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &[]);
        let mut engine = project.engine();
        let listener = VetoListener::default();
        let id = engine.subscribe(Box::new(listener.clone()));

        assert!(engine.unsubscribe(id));
        push_data(&mut engine, RawEvent::new(&scene, RawEventKind::Changed), false);
        engine.drain();
        assert!(events_of(&listener).is_empty());
    }

    #[test]
    fn test_builder_requires_core_collaborators() {
        let project = Project::new();
        let err = SyncEngine::builder().build(project.config()).unwrap_err();
        assert!(matches!(err, SyncError::MissingCollaborator(_)));

        let err = SyncEngine::builder()
            .catalog(project.rules())
            .build(project.config())
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingCollaborator("content cache")));
    }

    #[test]
    fn test_builder_rejects_invalid_configuration() {
        let project = Project::new();
        let mut config = project.config();
        config.propagation_steps_per_tick = 0;
        let err = project.builder().build(config).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfiguration(_)));
    }
}
