//! Splitting a seed CSV into parts.
//!
//! Large inputs are easier to crawl as several independent runs (each with
//! its own output and progress file). [`split_rows`] divides the data rows
//! as evenly as possible, repeating the header in every part.

use std::path::{Path, PathBuf};

use crate::InputError;

/// Splits `input` into `parts` files named `<stem>_part_<k><ext>` next to
/// it (or in `out_dir`), `k` counting from 1.
///
/// Every part gets `rows / parts` data rows; the first `rows % parts` parts
/// get one more. Parts beyond the number of rows contain only the header.
/// Returns the paths written, in part order.
///
/// # Errors
///
/// Returns [`InputError`] if `parts` is zero or the input cannot be read or
/// a part cannot be written.
pub fn split_rows(
    input: &Path,
    parts: usize,
    out_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, InputError> {
    if parts == 0 {
        return Err(InputError::InvalidParts(parts));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(input)?;
    let mut records = reader.records().collect::<Result<Vec<_>, _>>()?.into_iter();
    let header = records.next();
    let data: Vec<csv::StringRecord> = records.collect();

    let per_part = data.len() / parts;
    let remainder = data.len() % parts;
    if remainder > 0 {
        log::info!("First {remainder} part(s) get one extra row");
    }

    let mut written = Vec::with_capacity(parts);
    let mut rows = data.iter();
    for k in 0..parts {
        let size = per_part + usize::from(k < remainder);
        let path = part_path(input, out_dir, k + 1);

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)?;
        if let Some(header) = &header {
            writer.write_record(header)?;
        }
        for row in rows.by_ref().take(size) {
            writer.write_record(row)?;
        }
        writer.flush()?;

        log::debug!("Wrote {size} row(s) to {}", path.display());
        written.push(path);
    }

    Ok(written)
}

fn part_path(input: &Path, out_dir: Option<&Path>, k: usize) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "input".into(), |s| s.to_string_lossy());
    let name = input.extension().map_or_else(
        || format!("{stem}_part_{k}"),
        |ext| format!("{stem}_part_{k}.{}", ext.to_string_lossy()),
    );

    out_dir
        .or_else(|| input.parent())
        .map_or_else(|| PathBuf::from(&name), |dir| dir.join(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "listcrawl_split_{}_{name}",
            std::process::id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn remainder_goes_to_the_first_parts() {
        let dir = temp_dir("remainder");
        let input = dir.join("queries.csv");
        std::fs::write(&input, "url,city\n1,a\n2,b\n3,c\n4,d\n5,e\n6,f\n7,g\n").unwrap();

        let parts = split_rows(&input, 3, None).unwrap();

        assert_eq!(
            parts,
            [
                dir.join("queries_part_1.csv"),
                dir.join("queries_part_2.csv"),
                dir.join("queries_part_3.csv"),
            ]
        );
        let contents: Vec<String> = parts
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(contents[0], "url,city\n1,a\n2,b\n3,c\n");
        assert_eq!(contents[1], "url,city\n4,d\n5,e\n");
        assert_eq!(contents[2], "url,city\n6,f\n7,g\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn more_parts_than_rows_leaves_header_only_parts() {
        let dir = temp_dir("sparse");
        let input = dir.join("in.csv");
        std::fs::write(&input, "url\nx\n").unwrap();

        let out = dir.join("out");
        std::fs::create_dir_all(&out).unwrap();
        let parts = split_rows(&input, 3, Some(&out)).unwrap();

        assert_eq!(parts[0], out.join("in_part_1.csv"));
        assert_eq!(std::fs::read_to_string(&parts[0]).unwrap(), "url\nx\n");
        assert_eq!(std::fs::read_to_string(&parts[1]).unwrap(), "url\n");
        assert_eq!(std::fs::read_to_string(&parts[2]).unwrap(), "url\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zero_parts_is_rejected() {
        assert!(matches!(
            split_rows(Path::new("whatever.csv"), 0, None),
            Err(InputError::InvalidParts(0))
        ));
    }

    #[test]
    fn part_names_without_extension() {
        assert_eq!(
            part_path(Path::new("data/seeds"), None, 2),
            PathBuf::from("data/seeds_part_2")
        );
    }
}
