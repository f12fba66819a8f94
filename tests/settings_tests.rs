//! Integration tests for the settings store, table promotion and schema management.

use biodata_manager::db::{Database, ImportOptions, QueryMode, TableKind};
use biodata_manager::error::Error;
use biodata_manager::ingest::{ColumnMatch, parse_csv};
use biodata_manager::types::{ColumnRoles, ColumnType, TableMapping};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn store_document(db: &Database, raw: &str) {
    db.run_query(
        &format!("UPDATE app_config SET value = '{}' WHERE key = 'mappings'", raw),
        QueryMode::Any,
        None,
    )
    .unwrap();
}

fn stored_document(db: &Database) -> String {
    let result = db
        .run_query(
            "SELECT value FROM app_config WHERE key = 'mappings'",
            QueryMode::ReadOnly,
            None,
        )
        .unwrap();
    result.rows[0][0].as_str().unwrap().to_string()
}

mod mapping_tests {
    use super::*;

    #[test]
    fn defaults_cover_survey_tables() {
        let db = setup_db();
        let mappings = db.mappings().unwrap();
        for table in ["shumske", "bregunice", "naturalist"] {
            assert!(mappings.contains_key(table), "missing mapping for {}", table);
        }
        let shumske = &mappings["shumske"];
        assert_eq!(shumske.canonical_columns().next(), Some("ime_tacke"));
        assert_eq!(
            shumske.aliases("ime_tacke").unwrap(),
            ["Ime tačke", "Ime tacke", "ime_tacke"]
        );
        assert_eq!(db.main_tables().unwrap(), vec!["shumske", "bregunice", "naturalist"]);
    }

    #[test]
    fn set_mapping_requires_existing_columns() {
        let db = setup_db();

        let err = db
            .set_table_mapping(
                "shumske",
                TableMapping::from_pairs([("no_such_column", vec!["X"])]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));

        let err = db
            .set_table_mapping("nowhere", TableMapping::from_pairs([("a", vec!["A"])]))
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));

        let err = db.set_table_mapping("bad name", TableMapping::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));

        // Nothing was changed by the failed attempts.
        assert_eq!(db.table_mapping("shumske").unwrap().unwrap().len(), 21);
    }

    #[test]
    fn set_mapping_replaces_table_entry() {
        let db = setup_db();
        db.set_table_mapping(
            "shumske",
            TableMapping::from_pairs([("vrsta", vec!["Species", "Vrsta"])]),
        )
        .unwrap();

        let mapping = db.table_mapping("shumske").unwrap().unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.aliases("vrsta").unwrap(), ["Species", "Vrsta", "vrsta"]);
        // Other tables keep their mappings.
        assert!(db.table_mapping("bregunice").unwrap().is_some());
    }

    #[test]
    fn legacy_document_is_read_and_upgraded_on_write() {
        let db = setup_db();
        db.run_query(
            r#"UPDATE app_config SET value = '{"shumske":{"vrsta":["Vrsta"]}}' WHERE key = 'mappings'"#,
            QueryMode::Any,
            None,
        )
        .unwrap();

        let mappings = db.mappings().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings["shumske"].aliases("vrsta").unwrap(), ["Vrsta", "vrsta"]);

        db.set_main_tables(vec!["shumske".into()]).unwrap();
        let stored = db
            .run_query(
                "SELECT value FROM app_config WHERE key = 'mappings'",
                QueryMode::ReadOnly,
                None,
            )
            .unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(stored.rows[0][0].as_str().unwrap()).unwrap();
        assert_eq!(doc["version"], 3);
        assert_eq!(doc["mappings"]["shumske"]["vrsta"][0], "Vrsta");
        assert_eq!(doc["main_tables"][0], "shumske");
    }

    #[test]
    fn column_roles_locate_coordinates() {
        let db = setup_db();
        let columns: Vec<String> = ["ime_tacke", "y_coord", "x_coord", "latituda"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        // Without roles the name heuristic applies.
        let found = db.locate_coordinates("shumske", &columns).unwrap();
        assert_eq!(found.lat, Some(3));
        assert_eq!(found.lon, None);

        db.run_query("ALTER TABLE shumske ADD COLUMN y_coord REAL", QueryMode::Any, None)
            .unwrap();
        db.run_query("ALTER TABLE shumske ADD COLUMN x_coord REAL", QueryMode::Any, None)
            .unwrap();
        db.set_column_roles(
            "shumske",
            ColumnRoles {
                lat: Some("y_coord".into()),
                lon: Some("x_coord".into()),
            },
        )
        .unwrap();

        let found = db.locate_coordinates("shumske", &columns).unwrap();
        assert_eq!(found.lat, Some(1));
        assert_eq!(found.lon, Some(2));
        assert!(found.is_complete());
    }

    #[test]
    fn column_roles_must_name_real_columns() {
        let db = setup_db();
        let err = db
            .set_column_roles(
                "shumske",
                ColumnRoles {
                    lat: Some("nope".into()),
                    lon: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert_eq!(db.column_roles("shumske").unwrap(), ColumnRoles::default());
    }

    #[test]
    fn main_tables_are_deduplicated() {
        let db = setup_db();
        db.set_main_tables(vec!["bregunice".into(), "shumske".into(), "bregunice".into()])
            .unwrap();
        assert_eq!(db.main_tables().unwrap(), vec!["bregunice", "shumske"]);
    }

    #[test]
    fn undecodable_document_is_never_overwritten() {
        let db = setup_db();
        let raw = r#"{"version":3,"mappings":{"shumske":{"vrsta":["Vrsta"]},"custom":{"a":["A",1]}},"theme":"dark"}"#;
        store_document(&db, raw);

        // Reads fall back to the built-in defaults.
        assert!(db.table_mapping("bregunice").unwrap().is_some());

        let err = db
            .set_table_mapping("bregunice", TableMapping::from_pairs([("latituda", vec!["Lat"])]))
            .unwrap_err();
        assert!(matches!(err, Error::UnreadableSettings(_)));
        assert!(db.set_main_tables(vec!["shumske".into()]).is_err());

        let err = db.drop_table("bregunice").unwrap_err();
        assert!(matches!(err, Error::UnreadableSettings(_)));
        assert!(db.table_exists("bregunice").unwrap());

        let csv = parse_csv("Lokalitet\nSava\n").unwrap();
        let err = db.create_table_from_csv("kolonije", &csv).unwrap_err();
        assert!(matches!(err, Error::UnreadableSettings(_)));
        assert!(!db.table_exists("kolonije").unwrap());

        assert_eq!(stored_document(&db), raw);
    }

    #[test]
    fn entries_hidden_on_read_survive_writes() {
        let db = setup_db();
        store_document(
            &db,
            r#"{"mappings":{"shumske":{"vrsta":["Vrsta"]},"bad name":{"a":["A"]}},"main_tables":["shumske"],"theme":"dark"}"#,
        );
        assert!(db.table_mapping("bad_name").unwrap().is_none());
        assert_eq!(db.mappings().unwrap().len(), 1);

        db.set_main_tables(vec!["shumske".into(), "bregunice".into()])
            .unwrap();

        let doc: serde_json::Value = serde_json::from_str(&stored_document(&db)).unwrap();
        assert_eq!(doc["mappings"]["bad name"]["a"][0], "A");
        assert_eq!(doc["theme"], "dark");
        assert_eq!(doc["main_tables"][1], "bregunice");
    }
}

mod promote_tests {
    use super::*;

    #[test]
    fn promote_sanitizes_headers_and_imports() {
        let db = setup_db();
        let csv = parse_csv(
            "Lokalitet,Kvalitet Brojanja,Broj jedinki,Temperatura\nSava,dobar,120,21.5\nDrina,los,80,19\n",
        )
        .unwrap();

        let outcome = db
            .promote_and_import(
                "kolonije.csv",
                "kolonije",
                &csv,
                &ImportOptions::default(),
                |_: &ColumnMatch| panic!("full match should not ask"),
            )
            .unwrap();

        assert_eq!(outcome.rows_inserted, 2);
        assert_eq!(outcome.quality(), 100);

        let columns = db.table_columns("kolonije").unwrap();
        let described: Vec<(&str, &str)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("lokalitet", ColumnType::Text.as_sql()),
                ("kvalitet_brojanja", "TEXT"),
                ("broj_jedinki", "INTEGER"),
                ("temperatura", "REAL"),
            ]
        );

        let mapping = db.table_mapping("kolonije").unwrap().unwrap();
        assert_eq!(
            mapping.aliases("kvalitet_brojanja").unwrap(),
            ["Kvalitet Brojanja", "kvalitet_brojanja"]
        );
        assert!(db.main_tables().unwrap().contains(&"kolonije".to_string()));
    }

    #[test]
    fn promote_rejects_existing_table() {
        let db = setup_db();
        let csv = parse_csv("Vrsta,Broj,Datum\nParus major,1,2024-05-01\n").unwrap();
        let err = db.create_table_from_csv("shumske", &csv).unwrap_err();
        assert!(matches!(err, Error::TableExists(_)));

        let err = db.create_table_from_csv("Shumske", &csv).unwrap_err();
        assert!(matches!(err, Error::TableExists(_)));
        assert_eq!(db.table_row_count("shumske").unwrap(), 0);
    }
}

mod schema_tests {
    use super::*;

    #[test]
    fn list_tables_classifies_kinds() {
        let db = setup_db();
        let tables = db.list_tables().unwrap();
        let kind_of = |name: &str| tables.iter().find(|t| t.name == name).map(|t| t.kind);

        assert_eq!(kind_of("shumske"), Some(TableKind::Data));
        assert_eq!(kind_of("app_import_history"), Some(TableKind::Control));
        assert_eq!(kind_of("app_config"), Some(TableKind::Control));
        assert!(tables.iter().all(|t| t.row_count >= 0));
    }

    #[test]
    fn drop_table_forgets_mapping_and_roles() {
        let db = setup_db();
        db.set_column_roles(
            "bregunice",
            ColumnRoles {
                lat: Some("latituda".into()),
                lon: Some("longituda".into()),
            },
        )
        .unwrap();

        db.drop_table("bregunice").unwrap();

        assert!(!db.table_exists("bregunice").unwrap());
        assert!(db.table_mapping("bregunice").unwrap().is_none());
        assert!(!db.main_tables().unwrap().contains(&"bregunice".to_string()));
        assert!(!db.settings().unwrap().column_roles.contains_key("bregunice"));
    }

    #[test]
    fn control_tables_cannot_be_dropped() {
        let db = setup_db();
        let err = db.drop_table("app_import_history").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(db.table_exists("app_import_history").unwrap());
    }

    #[test]
    fn drop_missing_table() {
        let db = setup_db();
        assert!(matches!(db.drop_table("nowhere").unwrap_err(), Error::TableNotFound(_)));
    }
}
