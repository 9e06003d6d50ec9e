use crate::error::{LoadError, Result};
use polars::prelude::*;
use std::path::Path;

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Read a `.csv`, `.parquet` or `.json` file into a DataFrame.
pub fn read_dataset(path: &Path) -> Result<DataFrame> {
    let df = match extension(path).as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(10_000))
            .map_parse_options(|opts| opts.with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "parquet" => ParquetReader::new(std::fs::File::open(path)?).finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?).finish()?,
        ext => {
            return Err(LoadError::Config(format!(
                "Unsupported file extension '{ext}' for {}",
                path.display()
            )));
        }
    };

    tracing::info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Loaded dataset"
    );
    Ok(df)
}

/// Parse CSV with a header row, as produced by `COPY ... TO STDOUT WITH (FORMAT csv, HEADER true)`.
pub fn parse_csv(bytes: Vec<u8>) -> Result<DataFrame> {
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .map_parse_options(|opts| opts.with_try_parse_dates(true))
        .into_reader_with_file_handle(std::io::Cursor::new(bytes))
        .finish()?)
}

/// Write `df` as Parquet when the path ends in `.parquet`, CSV otherwise.
pub fn write_dataset(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    if extension(path) == "parquet" {
        ParquetWriter::new(file).finish(df)?;
    } else {
        CsvWriter::new(file).include_header(true).finish(df)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_csv_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        let mut df = df!(
            "id" => [1i64, 2, 3],
            "amount" => [1.5f64, 2.25, 3.0],
            "customer" => ["ann", "bob", "cy"],
        )
        .unwrap();

        write_dataset(&mut df, &path).unwrap();
        let loaded = read_dataset(&path).unwrap();
        assert_eq!(loaded.shape(), (3, 3));
        assert_eq!(loaded.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(loaded.column("amount").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_parquet_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.parquet");
        let mut df = df!("flag" => [true, false], "n" => [1i32, 2]).unwrap();

        write_dataset(&mut df, &path).unwrap();
        let loaded = read_dataset(&path).unwrap();
        assert!(loaded.equals(&df));
    }

    #[test]
    fn test_parse_copy_output() {
        let csv = b"id,name\n1,alpha\n2,\n".to_vec();
        let df = parse_csv(csv).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.column("name").unwrap().null_count(), 1);
    }

    #[test]
    fn test_unknown_extension() {
        let err = read_dataset(Path::new("data.xlsx")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
