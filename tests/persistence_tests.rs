//! Integration tests for on-disk databases: reopening, save-as and config loading.

use biodata_manager::config::{ConfigLoader, ConfigPaths, ENV_DB_PATH};
use biodata_manager::db::{Database, ImportOptions, ImportRequest, QueryMode};
use biodata_manager::ingest::{ColumnMatch, parse_csv};
use std::path::PathBuf;

fn import_sample(db: &Database) -> i64 {
    let csv = parse_csv("Vrsta,Broj,Datum\nParus major,2,2024-05-01\n").unwrap();
    db.import_csv(
        &ImportRequest::new("sample.csv", "shumske", &csv),
        &ImportOptions::default().with_threshold(0),
        |_: &ColumnMatch| true,
    )
    .unwrap()
    .history_id
}

#[test]
fn reopen_keeps_data_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("survey.db");

    let history_id = {
        let db = Database::open(&path).unwrap();
        db.set_main_tables(vec!["shumske".into()]).unwrap();
        import_sample(&db)
    };

    let db = Database::open(&path).unwrap();
    assert!(db.bootstrap_report().is_clean());
    // Existing settings are not reseeded.
    assert!(!db.bootstrap_report().seeded_defaults);
    assert_eq!(db.main_tables().unwrap(), vec!["shumske"]);
    assert_eq!(db.table_row_count("shumske").unwrap(), 1);

    // Undo works across sessions.
    let undone = db.undo_import_by_id(history_id).unwrap();
    assert_eq!(undone.rows_deleted, 1);
}

#[test]
fn on_disk_database_is_a_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("survey.db");
    let db = Database::open(&path).unwrap();
    import_sample(&db);

    let mode = db.run_query("PRAGMA journal_mode", QueryMode::Any, None).unwrap();
    assert_eq!(mode.rows[0][0], serde_json::json!("delete"));

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["survey.db"]);
}

#[test]
fn save_to_writes_a_standalone_copy() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    import_sample(&db);
    db.save_query("all", "SELECT * FROM shumske").unwrap();

    let target = dir.path().join("copy.db");
    std::fs::write(&target, b"stale contents").unwrap();
    db.save_to(&target).unwrap();

    let copy = Database::open(&target).unwrap();
    assert_eq!(copy.table_row_count("shumske").unwrap(), 1);
    assert_eq!(copy.import_history().unwrap().len(), 1);
    assert!(copy.saved_query("all").unwrap().is_some());

    // No staging file is left next to the target.
    let leftovers: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());

    // The copy is independent of the source.
    copy.run_query("DELETE FROM shumske", QueryMode::Any, None).unwrap();
    assert_eq!(db.table_row_count("shumske").unwrap(), 1);
}

#[test]
fn config_tiers_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        project.join("config.yaml"),
        "import:\n  quality_threshold: 60\n",
    )
    .unwrap();

    let paths = ConfigPaths::with_dirs(Some(project), None);
    let loader = ConfigLoader::load_with(paths, |key| {
        (key == ENV_DB_PATH).then(|| "/data/other.db".to_string())
    })
    .unwrap();

    let config = loader.config();
    assert_eq!(config.import.quality_threshold, 60);
    assert_eq!(config.import.options().quality_threshold, 60);
    assert_eq!(config.database.path, PathBuf::from("/data/other.db"));
    assert_eq!(loader.sources().len(), 1);
}
