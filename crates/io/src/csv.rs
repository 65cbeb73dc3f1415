// Delimited text import/export

use std::io::Read;
use std::path::Path;

use crate::table::{CellValue, DataTable};

/// Load a comma-delimited file with a header line.
pub fn load_csv_file(path: &Path) -> Result<DataTable, String> {
    let content = read_file_as_utf8(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    load_delimited(&content, b',')
}

/// Load with a sniffed delimiter (tab, semicolon, comma or pipe).
pub fn load_sniffed(path: &Path) -> Result<DataTable, String> {
    let content = read_file_as_utf8(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let delimiter = sniff_delimiter(&content);
    load_delimited(&content, delimiter)
}

/// Parse delimited text. The first record is the header.
///
/// Data lines whose field count differs from the header are skipped and
/// logged. Errors only for input with no header or with duplicate column
/// names.
pub fn load_delimited(content: &str, delimiter: u8) -> Result<DataTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| e.to_string())?,
        None => return Err("no header line".to_string()),
    };
    let names: Vec<String> = header.iter().map(|f| f.trim().to_string()).collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in records {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("skipping unreadable record: {}", e);
                skipped += 1;
                continue;
            }
        };
        if record.len() != names.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            log::warn!(
                "skipping line {}: expected {} fields, found {}",
                line,
                names.len(),
                record.len()
            );
            skipped += 1;
            continue;
        }
        rows.push(record.iter().map(|f| CellValue::Text(f.to_string())).collect());
    }

    let table = DataTable::new(names, rows)?;
    log::debug!(
        "loaded {} rows x {} columns ({} skipped)",
        table.row_count(),
        table.column_count(),
        skipped
    );
    Ok(table)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // More columns breaks ties
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Write header plus rows. Null cells are written as empty fields.
pub fn write_csv(table: &DataTable, path: &Path) -> Result<(), String> {
    write_with_delimiter(table, path, b',')
}

pub fn write_with_delimiter(table: &DataTable, path: &Path, delimiter: u8) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    if table.column_count() > 0 {
        writer.write_record(table.column_names()).map_err(|e| e.to_string())?;
    }
    for row in table.rows() {
        let record: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{process, ColumnType};
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_basic() {
        let table = load_delimited("Name,Age\nA,1\nB,2\n", b',').unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["Name", "Age"]);
        assert_eq!(table.value(1, "Name"), Some(&CellValue::Text("B".into())));
        assert_eq!(table.columns()[1].ty, ColumnType::Integer);
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let table = load_delimited("a,b\n1,2\n3\n4,5,6\n7,8\n", b',').unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.value(1, "a"), Some(&CellValue::Text("7".into())));
    }

    #[test]
    fn test_load_quoted_fields() {
        let table = load_delimited("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n", b',').unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.value(0, "name"), Some(&CellValue::Text("Smith, J".into())));
        assert_eq!(table.value(0, "note"), Some(&CellValue::Text("said \"hi\"".into())));
    }

    #[test]
    fn test_load_duplicate_header_rejected() {
        let err = load_delimited("id,id\n1,2\n", b',').unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_load_empty_source_rejected() {
        assert!(load_delimited("", b',').is_err());
    }

    #[test]
    fn test_load_header_only() {
        let table = load_delimited("a,b\n", b',').unwrap();
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_csv_file(&dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn test_load_windows_1252_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "café" with é as 0xE9
        fs::write(&path, b"word\ncaf\xe9\n").unwrap();
        let table = load_csv_file(&path).unwrap();
        assert_eq!(table.value(0, "word"), Some(&CellValue::Text("café".into())));
    }

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Amount;Date\nAlice;100;2024-01-01\nBob;200;2024-01-02\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Amount,Date\nAlice,100,2024-01-01\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAmount\nAlice\t100\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Amount\n\"Smith, J\";1,5\n\"Doe, A\";2,5\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_write_then_reload_processed_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = process(&load_delimited("Name,Age\n Ann ,31\n,\nBob,\n", b',').unwrap());
        write_csv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Name,Age\nAnn,31\nBob,\n");
    }

    proptest! {
        #[test]
        fn prop_row_count_matches_well_formed_lines(
            good in proptest::collection::vec(("[a-z]{1,5}", "[0-9]{1,4}"), 0..20),
            bad_every in 2usize..5,
        ) {
            let mut text = String::from("k,v\n");
            let mut expected = 0;
            for (i, (k, v)) in good.iter().enumerate() {
                if i % bad_every == 0 {
                    text.push_str(&format!("{},{},extra\n", k, v));
                } else {
                    text.push_str(&format!("{},{}\n", k, v));
                    expected += 1;
                }
            }
            let table = load_delimited(&text, b',').unwrap();
            prop_assert_eq!(table.row_count(), expected);
            prop_assert_eq!(table.column_count(), 2);
        }
    }
}
