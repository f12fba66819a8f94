//! Output formatting for query results, history and table listings.

use crate::db::{QueryResult, TableSummary};
use crate::error::Result;
use crate::types::{ImportRecord, MappingSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    #[default]
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a query result in the requested format.
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "columns": result.columns,
            "rows": result.to_objects(),
            "row_count": result.row_count(),
            "rows_affected": result.rows_affected,
            "truncated": result.truncated,
        }))?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            if !result.columns.is_empty() {
                writer.write_record(&result.columns)?;
            }
            for row in &result.rows {
                writer.write_record(row.iter().map(cell_text))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        OutputFormat::Markdown => Ok(format_query_markdown(result)),
    }
}

fn format_query_markdown(result: &QueryResult) -> String {
    let mut md = String::new();

    if result.columns.is_empty() {
        md.push_str(&format!("*{} row(s) affected*\n", result.rows_affected));
        return md;
    }

    md.push_str("| ");
    md.push_str(&result.columns.join(" | "));
    md.push_str(" |\n| ");
    md.push_str(
        &result
            .columns
            .iter()
            .map(|_| "---")
            .collect::<Vec<_>>()
            .join(" | "),
    );
    md.push_str(" |\n");

    for row in &result.rows {
        let values: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::Null => String::from("*null*"),
                Value::String(s) => s.replace('|', "\\|"),
                _ => v.to_string(),
            })
            .collect();
        md.push_str("| ");
        md.push_str(&values.join(" | "));
        md.push_str(" |\n");
    }

    if result.truncated {
        md.push_str(&format!("\n*Results truncated at {} rows*\n", result.row_count()));
    }
    md
}

/// Format import history as markdown.
pub fn format_history_markdown(records: &[ImportRecord]) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Import history ({})\n\n", records.len()));

    for record in records {
        md.push_str(&format!(
            "- `{}` **{}** -> `{}`: {} row(s)",
            record.id, record.filename, record.target_table, record.row_count
        ));
        if let Some(ref date) = record.import_date {
            md.push_str(&format!(" at {}", date));
        }
        if !record.is_undoable() {
            md.push_str(" _(no backup, cannot undo)_");
        }
        md.push('\n');
    }
    md
}

/// Format a table listing as markdown.
pub fn format_tables_markdown(tables: &[TableSummary]) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Tables ({})\n\n", tables.len()));
    for table in tables {
        md.push_str(&format!(
            "- `{}` ({:?}): {} row(s)\n",
            table.name, table.kind, table.row_count
        ));
    }
    md
}

/// Format column mappings as markdown, one section per table.
pub fn format_mappings_markdown(mappings: &MappingSet) -> String {
    let mut md = String::new();
    for (table, mapping) in mappings {
        md.push_str(&format!("## {}\n", table));
        for (canonical, aliases) in mapping.iter() {
            md.push_str(&format!("- **{}**: {}\n", canonical, aliases.join(", ")));
        }
        md.push('\n');
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TableKind;

    fn result() -> QueryResult {
        QueryResult {
            columns: vec!["vrsta".into(), "broj".into()],
            rows: vec![
                vec![json!("Parus major"), json!(3)],
                vec![json!("a, \"b\""), Value::Null],
            ],
            rows_affected: 0,
            truncated: false,
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("md"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::from_str("csv"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn test_csv_quotes_fields() {
        let csv = format_query_result(&result(), OutputFormat::Csv).unwrap();
        assert_eq!(csv, "vrsta,broj\nParus major,3\n\"a, \"\"b\"\"\",\n");
    }

    #[test]
    fn test_markdown_table() {
        let md = format_query_result(&result(), OutputFormat::Markdown).unwrap();
        assert!(md.starts_with("| vrsta | broj |\n| --- | --- |\n"));
        assert!(md.contains("| Parus major | 3 |"));
        assert!(md.contains("*null*"));
    }

    #[test]
    fn test_json_rows_are_objects() {
        let out = format_query_result(&result(), OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["rows"][0]["vrsta"], json!("Parus major"));
        assert_eq!(value["row_count"], json!(2));
    }

    #[test]
    fn test_statement_without_columns() {
        let result = QueryResult {
            rows_affected: 4,
            ..QueryResult::default()
        };
        assert_eq!(format_query_markdown(&result), "*4 row(s) affected*\n");
    }

    #[test]
    fn test_history_marks_legacy_records() {
        let records = vec![ImportRecord {
            id: 1,
            filename: "old.csv".into(),
            target_table: "shumske".into(),
            import_date: None,
            row_count: 2,
            backup_table_name: None,
        }];
        let md = format_history_markdown(&records);
        assert!(md.contains("cannot undo"));
    }

    #[test]
    fn test_tables_listing() {
        let md = format_tables_markdown(&[TableSummary {
            name: "shumske".into(),
            kind: TableKind::Data,
            row_count: 12,
        }]);
        assert!(md.contains("`shumske` (Data): 12 row(s)"));
    }
}
