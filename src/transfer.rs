//! Bulk Transfer Engine.
//!
//! Rows are serialized to CSV in memory and streamed into the table with
//! one `COPY ... FROM STDIN` per chunk. Each COPY is atomic on its own: if
//! chunk `n` fails, chunks `0..n` stay committed and the error reports how
//! many rows made it.

use crate::connection::Connection;
use crate::error::{LoadError, Result, ResultExt as _};
use crate::schema::{TableAddress, TableLayout};
use polars::prelude::*;

/// `(offset, len)` of every chunk of a `height`-row frame.
///
/// `None` means a single chunk. An empty frame has no chunks.
pub fn chunk_bounds(height: usize, chunk_size: Option<usize>) -> Vec<(usize, usize)> {
    let step = chunk_size.unwrap_or(height).max(1);
    (0..height)
        .step_by(step)
        .map(|offset| (offset, step.min(height - offset)))
        .collect()
}

/// Serialize `df` as headerless CSV with columns in layout order.
///
/// Nulls become empty unquoted fields, which `COPY ... (FORMAT csv, NULL '')`
/// reads back as NULL. Columns stored as text because their type has no
/// mapping are rendered with [`text_column`] first.
pub fn serialize_rows(df: &DataFrame, layout: &TableLayout) -> Result<Vec<u8>> {
    let mut ordered = df
        .select(layout.source_names())
        .phase(LoadError::Transfer, "Dataset does not match the column layout")?;

    for spec in layout.columns().iter().filter(|c| c.text_fallback) {
        let column = ordered
            .column(&spec.source)
            .phase(LoadError::Transfer, "Dataset does not match the column layout")?;
        let text = text_column(column).map_err(|err| {
            LoadError::Transfer(format!(
                "Failed to render column '{}' as text: {}",
                spec.source,
                err.detail()
            ))
        })?;
        ordered
            .with_column(text)
            .phase(LoadError::Transfer, "Failed to replace column with its text form")?;
    }

    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(false)
        .with_separator(b',')
        .with_null_value(String::new())
        .finish(&mut ordered)
        .phase(LoadError::Transfer, "Failed to serialize rows to CSV")?;
    Ok(buf)
}

/// Render any column as a string column, keeping nulls.
///
/// | dtype            | text                                   |
/// |------------------|----------------------------------------|
/// | binary           | `\x` + lowercase hex (bytea input form) |
/// | duration         | ISO 8601, e.g. `PT1.500S`              |
/// | list / struct    | JSON                                   |
/// | anything else    | polars' own cast to string             |
pub fn text_column(column: &Column) -> Result<Column> {
    let series = column.as_materialized_series();
    let text: StringChunked = match series.dtype() {
        DataType::Binary => series
            .binary()?
            .into_iter()
            .map(|value| value.map(bytea_hex))
            .collect(),
        DataType::Duration(unit) => {
            let unit = *unit;
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|value| value.map(|v| iso_duration(v, unit)))
                .collect()
        }
        dtype if dtype.is_nested() => json_values(series)?.into_iter().collect(),
        _ => series.cast(&DataType::String)?.str()?.clone(),
    };
    Ok(Column::from(text.with_name(series.name().clone()).into_series()))
}

fn bytea_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

/// `PT<seconds>.<fraction>S`, with the fraction at the unit's precision.
fn iso_duration(value: i64, unit: TimeUnit) -> String {
    let (per_second, width) = match unit {
        TimeUnit::Nanoseconds => (1_000_000_000u64, 9usize),
        TimeUnit::Microseconds => (1_000_000, 6),
        TimeUnit::Milliseconds => (1_000, 3),
    };
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!(
        "PT{sign}{}.{:0width$}S",
        abs / per_second,
        abs % per_second
    )
}

/// Each value of a nested column as compact JSON, via polars' JSON-lines writer.
fn json_values(series: &Series) -> Result<Vec<Option<String>>> {
    const FIELD: &str = "value";

    let mut frame = DataFrame::new(vec![Column::from(
        series.clone().with_name(PlSmallStr::from_static(FIELD)),
    )])?;
    let mut buf = Vec::new();
    JsonWriter::new(&mut buf)
        .with_json_format(JsonFormat::JsonLines)
        .finish(&mut frame)?;

    let values = buf
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut row: serde_json::Value = serde_json::from_slice(line)
                .phase(LoadError::DataProcessing, "Polars wrote invalid JSON")?;
            Ok(match row.get_mut(FIELD).map(serde_json::Value::take) {
                None | Some(serde_json::Value::Null) => None,
                Some(value) => Some(value.to_string()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if values.len() != series.len() {
        return Err(LoadError::DataProcessing(format!(
            "Expected {} JSON rows, got {}",
            series.len(),
            values.len()
        )));
    }
    Ok(values)
}

/// Copy every row of `df` into `address`; returns the number of rows written.
///
/// `columns` is the COPY column list ([`crate::reconcile::TableReady::copy_columns`]).
pub async fn transfer(
    conn: &mut Connection,
    address: &TableAddress,
    layout: &TableLayout,
    columns: Option<&[String]>,
    df: &DataFrame,
    chunk_size: Option<usize>,
) -> Result<u64> {
    let statement = conn.dialect().copy_in_sql(address, columns);
    tracing::debug!(sql = %statement, "Prepared COPY statement");

    let bounds = chunk_bounds(df.height(), chunk_size);
    let total_chunks = bounds.len();
    let mut written = 0u64;

    for (index, (offset, len)) in bounds.into_iter().enumerate() {
        let chunk = df.slice(offset as i64, len);
        let buf = serialize_rows(&chunk, layout)?;
        tracing::debug!(
            chunk = index + 1,
            total_chunks,
            rows = len,
            bytes = buf.len(),
            "Sending chunk"
        );

        let rows = conn
            .copy_in(&statement, buf)
            .await
            .map_err(|err| chunk_failure(address, index, total_chunks, written, &err))?;
        written += rows;
    }

    tracing::info!(table = %address, rows = written, chunks = total_chunks, "Transfer complete");
    Ok(written)
}

fn chunk_failure(
    address: &TableAddress,
    index: usize,
    total_chunks: usize,
    written: u64,
    err: &LoadError,
) -> LoadError {
    LoadError::Transfer(format!(
        "Chunk {}/{total_chunks} into {address} failed after {written} rows were committed: {}",
        index + 1,
        err.detail()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::DatasetSchema;

    #[test]
    fn test_chunk_bounds() {
        assert_eq!(chunk_bounds(10, None), vec![(0, 10)]);
        assert_eq!(chunk_bounds(10, Some(10)), vec![(0, 10)]);
        assert_eq!(chunk_bounds(10, Some(5)), vec![(0, 5), (5, 5)]);
        assert_eq!(chunk_bounds(10, Some(4)), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(chunk_bounds(3, Some(1)), vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(chunk_bounds(3, Some(100)), vec![(0, 3)]);
        assert!(chunk_bounds(0, None).is_empty());
        assert!(chunk_bounds(0, Some(5)).is_empty());
    }

    #[test]
    fn test_chunks_cover_every_row_once() {
        for size in [1, 3, 7, 50, 51] {
            let bounds = chunk_bounds(50, Some(size));
            let covered: usize = bounds.iter().map(|(_, len)| len).sum();
            assert_eq!(covered, 50, "chunk size {size}");
            for pair in bounds.windows(2) {
                assert_eq!(pair[0].0 + pair[0].1, pair[1].0);
            }
        }
    }

    fn layout_for(df: &DataFrame) -> TableLayout {
        let schema = DatasetSchema::from_frame(df).unwrap();
        TableLayout::build(&schema, Dialect::Postgres, true)
    }

    #[test]
    fn test_serialize_escapes_csv_specials() {
        let df = df!(
            "id" => [1i64, 2, 3],
            "note" => [Some("plain"), Some("has, comma \"and\" quotes"), None],
        )
        .unwrap();

        let csv = String::from_utf8(serialize_rows(&df, &layout_for(&df)).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "1,plain");
        assert_eq!(lines[1], "2,\"has, comma \"\"and\"\" quotes\"");
        assert_eq!(lines[2], "3,");
    }

    #[test]
    fn test_serialize_follows_layout_order() {
        let df = df!("b" => [1i32], "a" => ["x"]).unwrap();
        let layout = layout_for(&df);

        // Same data, columns shuffled: output must still follow the layout.
        let shuffled = df.select(["a", "b"]).unwrap();
        let csv = String::from_utf8(serialize_rows(&shuffled, &layout).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "1,x");
    }

    #[test]
    fn test_serialize_rejects_frame_missing_layout_columns() {
        let df = df!("a" => [1i32], "b" => [2i32]).unwrap();
        let layout = layout_for(&df);
        let narrower = df.select(["a"]).unwrap();
        let err = serialize_rows(&narrower, &layout).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transfer);
    }

    #[test]
    fn test_serialize_renders_unmapped_columns_as_text() {
        let blob: BinaryChunked = [Some(&b"\x01\xab"[..]), None].into_iter().collect();
        let wait = Series::new("wait".into(), [1500i64, -250])
            .cast(&DataType::Duration(TimeUnit::Milliseconds))
            .unwrap();
        let tags = Series::new(
            "tags".into(),
            [
                Series::new("".into(), [1i64, 2]),
                Series::new("".into(), [3i64]),
            ],
        );
        let df = DataFrame::new(vec![
            Column::from(Series::new("id".into(), [1i64, 2])),
            Column::from(blob.with_name("blob".into()).into_series()),
            Column::from(wait),
            Column::from(tags),
            Column::from(Series::new("big".into(), [u64::MAX, 7])),
        ])
        .unwrap();

        let layout = layout_for(&df);
        let fallback: Vec<&str> = layout
            .columns()
            .iter()
            .filter(|c| c.text_fallback)
            .map(|c| c.source.as_str())
            .collect();
        assert_eq!(fallback, vec!["blob", "wait", "tags", "big"]);

        let csv = String::from_utf8(serialize_rows(&df, &layout).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "1,\\x01ab,PT1.500S,\"[1,2]\",18446744073709551615");
        assert_eq!(lines[1], "2,,PT-0.250S,[3],7");
    }

    #[test]
    fn test_iso_duration_precision_follows_unit() {
        assert_eq!(iso_duration(0, TimeUnit::Milliseconds), "PT0.000S");
        assert_eq!(iso_duration(90_061_000_001, TimeUnit::Nanoseconds), "PT90.061000001S");
        assert_eq!(iso_duration(-1_500_000, TimeUnit::Microseconds), "PT-1.500000S");
    }

    #[test]
    fn test_chunk_failure_does_not_repeat_prefix() {
        let address = TableAddress::parse("public.sales", None).unwrap();
        let inner = LoadError::Transfer("COPY command failed: invalid input syntax".to_owned());
        let err = chunk_failure(&address, 2, 5, 4, &inner);

        assert_eq!(err.kind(), crate::error::ErrorKind::Transfer);
        let message = err.to_string();
        assert_eq!(message.matches("Transfer error").count(), 1, "{message}");
        assert!(message.contains("Chunk 3/5"), "{message}");
        assert!(message.contains("after 4 rows"), "{message}");
        assert!(message.ends_with("COPY command failed: invalid input syntax"));
    }
}
