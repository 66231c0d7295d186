//! Seed input loading.
//!
//! The input is a CSV file with a header row. One column holds the seed URL;
//! any other columns can be carried through to every output record. The
//! whole file is read up front so row indices are stable for resumption.

use std::collections::BTreeMap;
use std::path::Path;

use listcrawl_crawl_models::{RowSet, SeedRow};

use crate::InputError;

/// Byte order mark some spreadsheet tools put at the start of CSV exports.
const BOM: char = '\u{feff}';

/// Loads every row of `path`.
///
/// `passthrough` selects which columns are copied into records; `None`
/// copies all columns (the seed column included) in header order.
///
/// # Errors
///
/// Returns [`InputError`] if the file cannot be read, `seed_column` or a
/// requested pass-through column is missing from the header, or the file
/// has no data rows.
pub fn load_rows(
    path: &Path,
    seed_column: &str,
    passthrough: Option<&[String]>,
) -> Result<RowSet, InputError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches(BOM) } else { h };
            h.trim().to_owned()
        })
        .collect();

    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| InputError::MissingColumn {
                column: column.to_owned(),
                path: path.to_path_buf(),
            })
    };

    let seed_position = position(seed_column.trim())?;
    let columns: Vec<String> = match passthrough {
        Some(selected) => selected.iter().map(|c| c.trim().to_owned()).collect(),
        None => headers.clone(),
    };
    let column_positions = columns
        .iter()
        .map(|c| position(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let seed = record.get(seed_position).unwrap_or_default();

        let passthrough: BTreeMap<String, String> = columns
            .iter()
            .zip(&column_positions)
            .map(|(name, &pos)| (name.clone(), record.get(pos).unwrap_or_default().to_owned()))
            .collect();

        rows.push(SeedRow {
            passthrough,
            ..SeedRow::new(index as u64, seed)
        });
    }

    if rows.is_empty() {
        return Err(InputError::Empty(path.to_path_buf()));
    }

    log::debug!(
        "Read {} rows ({} pass-through columns) from {}",
        rows.len(),
        columns.len(),
        path.display()
    );

    Ok(RowSet { columns, rows })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "listcrawl_input_{}_{name}.csv",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_rows_with_passthrough_in_header_order() {
        let path = write_temp(
            "basic",
            "\u{feff}province,city_name,url\nON,Ottawa, https://a.test/1 \nQC,Montreal,\n",
        );

        let rows = load_rows(&path, "url", None).unwrap();

        assert_eq!(rows.columns, ["province", "city_name", "url"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows[0].index, 0);
        assert_eq!(rows.rows[0].seed_url, "https://a.test/1");
        assert_eq!(rows.rows[0].passthrough["city_name"], "Ottawa");
        assert_eq!(rows.rows[1].index, 1);
        assert!(!rows.rows[1].has_seed());
        assert_eq!(rows.rows[1].passthrough["province"], "QC");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn selected_passthrough_columns_only() {
        let path = write_temp("selected", "a,b,url\n1,2,http://x.test\n");

        let rows = load_rows(&path, "url", Some(&["b".to_owned()])).unwrap();

        assert_eq!(rows.columns, ["b"]);
        assert_eq!(rows.rows[0].passthrough.len(), 1);
        assert_eq!(rows.rows[0].passthrough["b"], "2");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn short_rows_get_empty_values() {
        let path = write_temp("short", "url,city\nhttp://x.test\n");

        let rows = load_rows(&path, "url", None).unwrap();

        assert_eq!(rows.rows[0].passthrough["city"], "");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_seed_column_is_an_error() {
        let path = write_temp("missing", "listing_url\nhttp://x.test\n");

        let err = load_rows(&path, "url", None).unwrap_err();
        assert!(matches!(err, InputError::MissingColumn { ref column, .. } if column == "url"));

        let err = load_rows(&path, "listing_url", Some(&["nope".to_owned()])).unwrap_err();
        assert!(matches!(err, InputError::MissingColumn { ref column, .. } if column == "nope"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn header_only_input_is_empty() {
        let path = write_temp("empty", "url\n");

        assert!(matches!(
            load_rows(&path, "url", None),
            Err(InputError::Empty(_))
        ));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_rows(Path::new("/nonexistent/listcrawl.csv"), "url", None).is_err());
    }
}
