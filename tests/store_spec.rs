use std::path::{Path, PathBuf};

use automaker_features::models::*;
use automaker_features::store::layout;
use automaker_features::{FeatureStore, StoreConfig, StoreError};
use serde_json::{json, Value};
use tempfile::TempDir;

fn setup() -> (TempDir, FeatureStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    (dir, FeatureStore::new(StoreConfig::default()))
}

fn features_root(project: &Path) -> PathBuf {
    layout::features_dir(project)
}

fn write_record(project: &Path, relative: &str, record: Value) -> PathBuf {
    let dir = features_root(project).join(relative);
    std::fs::create_dir_all(&dir).expect("Failed to create feature dir");
    std::fs::write(dir.join("feature.json"), record.to_string()).expect("Failed to write record");
    dir
}

fn read_record(dir: &Path) -> Value {
    let raw = std::fs::read_to_string(dir.join("feature.json")).expect("Failed to read record");
    serde_json::from_str(&raw).expect("Record is not JSON")
}

async fn create_titled(store: &FeatureStore, project: &Path, title: &str) -> Feature {
    store
        .create(
            project,
            CreateFeatureInput {
                title: title.to_string(),
                description: format!("{} description", title),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to create feature")
}

mod create {
    use super::*;

    #[tokio::test]
    async fn writes_feature_into_backlog_partition() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Dark mode").await;

        assert_eq!(feature.status, "backlog");
        let dir = features_root(tmp.path()).join("backlog").join(&feature.id);
        assert!(dir.join("feature.json").is_file());
        for sub in layout::FEATURE_SUBDIRS {
            assert!(dir.join(sub).is_dir(), "missing {}", sub);
        }
    }

    #[tokio::test]
    async fn round_trips_through_get() {
        let (tmp, store) = setup();
        let created = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    title: "Login".to_string(),
                    description: "Add OAuth login".to_string(),
                    category: "auth".to_string(),
                    priority: Some(2),
                    is_favorite: true,
                    model: Some("opus".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create");

        let loaded = store
            .get(tmp.path(), &created.id)
            .await
            .expect("Query failed")
            .expect("Feature missing");
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn uses_initial_status_partition() {
        let (tmp, store) = setup();
        let feature = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    description: "Ship it".to_string(),
                    status: Some("in_progress".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create");

        assert!(features_root(tmp.path())
            .join("in_progress")
            .join(&feature.id)
            .is_dir());
    }

    #[tokio::test]
    async fn rejects_explicit_duplicate_id() {
        let (tmp, store) = setup();
        let input = CreateFeatureInput {
            id: Some("my-feature".to_string()),
            ..Default::default()
        };
        store
            .create(tmp.path(), input.clone())
            .await
            .expect("Failed to create");

        let err = store.create(tmp.path(), input).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "my-feature"));
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let (tmp, store) = setup();
        let err = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    id: Some("../escape".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn suffixes_generated_id_on_collision() {
        let (tmp, store) = setup();
        let first = create_titled(&store, tmp.path(), "Same").await;
        let second = create_titled(&store, tmp.path(), "Same").await;

        assert_ne!(first.id, second.id);
        assert!(second.id.starts_with(&format!("{}_", first.id)));
    }

    #[tokio::test]
    async fn imports_images_into_feature_directory() {
        let (tmp, store) = setup();
        let source = tmp.path().join("screenshot.png");
        std::fs::write(&source, b"png").expect("Failed to write image");

        let feature = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    description: "With image".to_string(),
                    image_paths: vec![FeatureImage::Path(
                        source.to_string_lossy().into_owned(),
                    )],
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create");

        let managed = features_root(tmp.path())
            .join("backlog")
            .join(&feature.id)
            .join("images")
            .join("screenshot.png");
        assert_eq!(feature.image_paths[0].path(), managed.to_string_lossy());
        assert!(managed.is_file());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn fails_and_cleans_up_when_image_is_missing() {
        let (tmp, store) = setup();
        let err = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    id: Some("broken".to_string()),
                    image_paths: vec![FeatureImage::Path("missing.png".to_string())],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!features_root(tmp.path()).join("backlog/broken").exists());
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn moves_directory_when_status_changes() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Move me").await;
        let old_dir = features_root(tmp.path()).join("backlog").join(&feature.id);

        let updated = store
            .update(
                tmp.path(),
                &feature.id,
                UpdateFeatureInput::status("in_progress"),
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.status, "in_progress");
        assert!(!old_dir.exists());
        let new_dir = features_root(tmp.path())
            .join("in_progress")
            .join(&feature.id);
        assert!(new_dir.join("feature.json").is_file());

        let loaded = store
            .get(tmp.path(), &feature.id)
            .await
            .expect("Query failed")
            .expect("Feature missing");
        assert_eq!(loaded.status, "in_progress");
        assert_eq!(
            store.feature_dir(tmp.path(), &feature.id).await.unwrap(),
            Some(new_dir)
        );
    }

    #[tokio::test]
    async fn returns_not_found_for_missing_feature() {
        let (tmp, store) = setup();
        let err = store
            .update(tmp.path(), "nope", UpdateFeatureInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn records_description_history() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "History").await;

        let updated = store
            .update(
                tmp.path(),
                &feature.id,
                UpdateFeatureInput {
                    description: Some("Sharper description".to_string()),
                    description_history_source: Some(DescriptionSource::Enhance),
                    enhancement_mode: Some("technical".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.description, "Sharper description");
        assert_eq!(updated.description_history.len(), 1);
        let entry = &updated.description_history[0];
        assert_eq!(entry.source, DescriptionSource::Enhance);
        assert_eq!(entry.enhancement_mode.as_deref(), Some("technical"));

        let unchanged = store
            .update(
                tmp.path(),
                &feature.id,
                UpdateFeatureInput {
                    description: Some("Sharper description".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");
        assert_eq!(unchanged.description_history.len(), 1);
    }

    #[tokio::test]
    async fn preserves_unknown_keys() {
        let (tmp, store) = setup();
        let dir = features_root(tmp.path()).join("backlog").join("custom");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("feature.json"),
            json!({ "id": "custom", "title": "Old", "planSpec": { "steps": 3 } }).to_string(),
        )
        .unwrap();

        store
            .update(
                tmp.path(),
                "custom",
                UpdateFeatureInput {
                    title: Some("New".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");

        let raw = read_record(&dir);
        assert_eq!(raw["title"], "New");
        assert_eq!(raw["planSpec"]["steps"], 3);
    }

    #[tokio::test]
    async fn keeps_bounded_backups() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Backups").await;
        for i in 0..5 {
            store
                .update(
                    tmp.path(),
                    &feature.id,
                    UpdateFeatureInput {
                        title: Some(format!("Title {}", i)),
                        ..Default::default()
                    },
                )
                .await
                .expect("Failed to update");
        }

        let file = features_root(tmp.path())
            .join("backlog")
            .join(&feature.id)
            .join("feature.json");
        for n in 1..=3 {
            assert!(automaker_features::fs::backup_path(&file, n).is_file());
        }
        assert!(!automaker_features::fs::backup_path(&file, 4).exists());
    }

    #[tokio::test]
    async fn deletes_images_removed_from_the_list() {
        let (tmp, store) = setup();
        let first = tmp.path().join("a.png");
        let second = tmp.path().join("b.png");
        std::fs::write(&first, b"a").unwrap();
        std::fs::write(&second, b"b").unwrap();

        let feature = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    description: "Images".to_string(),
                    image_paths: vec![
                        FeatureImage::Path(first.to_string_lossy().into_owned()),
                        FeatureImage::Path(second.to_string_lossy().into_owned()),
                    ],
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create");

        let kept = feature.image_paths[1].clone();
        let dropped = PathBuf::from(feature.image_paths[0].path());
        let updated = store
            .update(
                tmp.path(),
                &feature.id,
                UpdateFeatureInput {
                    image_paths: Some(vec![kept.clone()]),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.image_paths, vec![kept.clone()]);
        assert!(!dropped.exists());
        assert!(Path::new(kept.path()).is_file());
    }

    #[tokio::test]
    async fn rebases_image_paths_after_move() {
        let (tmp, store) = setup();
        let source = tmp.path().join("shot.png");
        std::fs::write(&source, b"png").unwrap();
        let feature = store
            .create(
                tmp.path(),
                CreateFeatureInput {
                    description: "Rebase".to_string(),
                    image_paths: vec![FeatureImage::Path(source.to_string_lossy().into_owned())],
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create");

        let updated = store
            .update(tmp.path(), &feature.id, UpdateFeatureInput::status("verified"))
            .await
            .expect("Failed to update");

        let expected = features_root(tmp.path())
            .join("verified")
            .join(&feature.id)
            .join("images/shot.png");
        assert_eq!(updated.image_paths[0].path(), expected.to_string_lossy());
        assert!(expected.is_file());

        let loaded = store.get(tmp.path(), &feature.id).await.unwrap().unwrap();
        assert_eq!(loaded.image_paths, updated.image_paths);
    }
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn follows_a_directory_moved_behind_the_cache() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Wanderer").await;
        let old_dir = features_root(tmp.path()).join("backlog").join(&feature.id);
        assert_eq!(store.path_cache().get(tmp.path(), &feature.id), Some(old_dir.clone()));

        let new_dir = features_root(tmp.path()).join("verified").join(&feature.id);
        std::fs::create_dir_all(new_dir.parent().unwrap()).unwrap();
        std::fs::rename(&old_dir, &new_dir).unwrap();

        let loaded = store
            .get(tmp.path(), &feature.id)
            .await
            .expect("Query failed")
            .expect("Feature missing");
        assert_eq!(loaded.status, "verified");
        assert_eq!(store.path_cache().get(tmp.path(), &feature.id), Some(new_dir));
    }

    #[tokio::test]
    async fn reads_and_updates_features_in_unrecognised_directories() {
        let (tmp, store) = setup();
        let dir = write_record(
            tmp.path(),
            "custom_stage/f2",
            json!({ "id": "f2", "title": "Before" }),
        );

        let loaded = store.get(tmp.path(), "f2").await.unwrap().unwrap();
        assert_eq!(loaded.status, "custom_stage");

        let updated = store
            .update(
                tmp.path(),
                "f2",
                UpdateFeatureInput {
                    title: Some("After".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.status, "custom_stage");
        assert_eq!(read_record(&dir)["title"], "After");
    }

    #[tokio::test]
    async fn failed_move_keeps_record_at_old_location() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Stuck").await;
        let dir = features_root(tmp.path()).join("backlog").join(&feature.id);
        std::fs::write(features_root(tmp.path()).join("in_progress"), "not a directory")
            .unwrap();

        let updated = store
            .update(
                tmp.path(),
                &feature.id,
                UpdateFeatureInput::status("in_progress"),
            )
            .await
            .expect("Update should succeed despite the failed move");

        assert_eq!(updated.status, "in_progress");
        assert_eq!(read_record(&dir)["status"], "in_progress");

        let listed = store.get_all(tmp.path()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, "backlog");
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn removes_the_feature_directory() {
        let (tmp, store) = setup();
        let feature = create_titled(&store, tmp.path(), "Gone").await;

        assert!(store.delete(tmp.path(), &feature.id).await);
        assert!(store.get(tmp.path(), &feature.id).await.unwrap().is_none());
        assert!(!features_root(tmp.path())
            .join("backlog")
            .join(&feature.id)
            .exists());
    }

    #[tokio::test]
    async fn returns_false_for_unknown_feature() {
        let (tmp, store) = setup();
        assert!(!store.delete(tmp.path(), "never-existed").await);
    }
}

mod sandbox {
    use super::*;

    #[tokio::test]
    async fn refuses_projects_outside_allowed_roots() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(
            StoreConfig::default().with_allowed_roots(vec![allowed.path().to_path_buf()]),
        );

        let err = store
            .create(other.path(), CreateFeatureInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PathOutsideRoot(_)));

        store
            .create(allowed.path(), CreateFeatureInput::default())
            .await
            .expect("Allowed root rejected");
    }
}
