//! CSV reading and writing for feature frames.

use crate::error::Result;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Read a CSV file into a DataFrame.
///
/// Columns listed in `string_columns` are always read as strings so that
/// identifiers such as zero-padded FIPS codes keep their leading zeros.
/// ISO dates are parsed into `Date` columns.
pub fn read_csv(path: &Path, string_columns: &[&str]) -> Result<DataFrame> {
    let mut schema = Schema::default();
    for name in string_columns {
        schema.with_column((*name).into(), DataType::String);
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(Arc::new(schema)))
        .with_parse_options(CsvParseOptions::default().with_try_parse_dates(true))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    tracing::debug!(path = %path.display(), rows = df.height(), "read csv");
    Ok(df)
}

/// Write a DataFrame to a CSV file with a header row.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;

    tracing::debug!(path = %path.display(), rows = df.height(), "wrote csv");
    Ok(())
}
