//! Main test module for assetsync
//!
//! This module includes all test suites:
//! - Shared project harness and collaborator doubles
//! - Integration tests for end-to-end drain and propagation scenarios
//! - Property-based tests for pipeline invariants
//! - Edge cases around unusual names and reference forms

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use crate::common::*;
    use ::assetsync::*;
    use std::fs;

    #[test]
    fn test_special_filenames() {
        let special_names = [
            "file with spaces.png",
            "file-with-dashes.png",
            "file.with.dots.png",
            "file(with)parens.png",
            "файл.png",
            "文件.png",
        ];

        for name in special_names {
            let project = Project::new();
            let old = project.data.join("sprites").join(name);
            if fs::create_dir_all(old.parent().unwrap()).is_err() || fs::write(&old, "png").is_err() {
                // Skip names the file system does not support
                continue;
            }
            let scene = project.write_scene("level.scene", &[format!("sprites/{}", name).as_str()]);
            let mut engine = project.engine();

            let new = project.data.join("renamed").join(name);
            fs::create_dir_all(new.parent().unwrap()).unwrap();
            fs::rename(&old, &new).unwrap();
            push_data(&mut engine, RawEvent::renamed(&old, &new), false);
            engine.drain();
            engine.run_propagation(&mut |_| {});

            assert_eq!(project.scene_refs(&scene), vec![format!("renamed/{}", name)]);
        }
    }

    #[test]
    fn test_null_unset_and_builtin_references_survive_propagation() {
        let project = Project::new();
        let scene = project.write_data(
            "level.scene",
            r#"{ "objects": [ { "$ref": null }, { "$ref": "" }, { "$ref": "default:hero.png" }, { "$ref": "hero.png" } ] }"#,
        );
        let mut engine = project.engine();

        let report = engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("hero.png"), project.data.join("hero2.png"), false)],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(report.references_rewritten, 1);
        let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&scene).unwrap()).unwrap();
        assert!(doc["objects"][0]["$ref"].is_null());
        assert_eq!(doc["objects"][1]["$ref"], "");
        assert_eq!(doc["objects"][2]["$ref"], "default:hero.png");
        assert_eq!(doc["objects"][3]["$ref"], "hero2.png");
    }

    #[test]
    fn test_sibling_directory_with_common_prefix_is_untouched() {
        let project = Project::new();
        let scene = project.write_scene("level.scene", &["sprites/hero.png", "spritesheet/hero.png"]);
        let mut engine = project.engine();

        engine
            .propagate_now(
                vec![FileEvent::renamed(project.data.join("sprites"), project.data.join("art"), true)],
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(project.scene_refs(&scene), vec!["art/hero.png", "spritesheet/hero.png"]);
    }

    #[test]
    fn test_deeply_nested_directory_rename() {
        let project = Project::new();
        let mut relative = String::new();
        for i in 0..12 {
            relative.push_str(&format!("level{}/", i));
        }
        relative.push_str("deep.png");
        project.write_data(&relative, "png");
        project.write_media(&relative, "layers");
        let scene = project.write_scene("level.scene", &[relative.as_str()]);
        let mut engine = project.engine();

        let old_dir = project.data.join("level0");
        let new_dir = project.data.join("top");
        fs::rename(&old_dir, &new_dir).unwrap();
        push_data(&mut engine, RawEvent::renamed(&old_dir, &new_dir), true);
        engine.drain();
        engine.run_propagation(&mut |_| {});

        let expected = relative.replacen("level0", "top", 1);
        assert_eq!(project.scene_refs(&scene), vec![expected.clone()]);
        assert!(project.media.join(&expected).is_file());
    }
}
