//! Tabular shape probe for extracted archive entries

use std::path::Path;

use anyhow::{Context, Result};

/// Row and column counts for a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    /// Data rows after the header.
    pub rows: usize,
    /// Columns in the header row.
    pub cols: usize,
}

/// Read a file as delimited text and count header columns and data rows.
///
/// Works on byte records so non-UTF-8 cells don't fail the probe, and
/// tolerates ragged rows. Structurally broken files (unbalanced quotes and
/// the like) return an error; the caller discards those candidates.
pub fn read_shape(path: &Path) -> Result<TableShape> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = reader.byte_records();
    let header = match records.next() {
        Some(record) => record.context("unreadable header row")?,
        None => return Ok(TableShape { rows: 0, cols: 0 }),
    };
    let cols = header.len();

    let mut rows = 0usize;
    for record in records {
        record.context("unreadable data row")?;
        rows += 1;
    }
    Ok(TableShape { rows, cols })
}

/// File size in KB, rounded to two decimals.
pub fn file_size_kb(path: &Path) -> Result<f64> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok((meta.len() as f64 / 1024.0 * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn counts_header_and_rows() {
        let (_dir, path) = write_file(b"a,b,c\n1,2,3\n4,5,6\n");
        let shape = read_shape(&path).unwrap();
        assert_eq!(shape, TableShape { rows: 2, cols: 3 });
    }

    #[test]
    fn empty_file_is_zero_by_zero() {
        let (_dir, path) = write_file(b"");
        let shape = read_shape(&path).unwrap();
        assert_eq!(shape, TableShape { rows: 0, cols: 0 });
    }

    #[test]
    fn header_only_has_zero_rows() {
        let (_dir, path) = write_file(b"a,b,c,d\n");
        let shape = read_shape(&path).unwrap();
        assert_eq!(shape, TableShape { rows: 0, cols: 4 });
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let (_dir, path) = write_file(b"a,b,c\n1,2\n1,2,3,4\n");
        let shape = read_shape(&path).unwrap();
        assert_eq!(shape.rows, 2);
        assert_eq!(shape.cols, 3);
    }

    #[test]
    fn non_utf8_cells_are_tolerated() {
        let (_dir, path) = write_file(b"a,b\n\xff\xfe,2\n");
        let shape = read_shape(&path).unwrap();
        assert_eq!(shape, TableShape { rows: 1, cols: 2 });
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_shape(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn size_kb_rounds_to_two_decimals() {
        let (_dir, path) = write_file(&vec![0u8; 1536]);
        assert_eq!(file_size_kb(&path).unwrap(), 1.5);
    }
}
