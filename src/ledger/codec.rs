//! Delimited text codec
//!
//! Header-first CSV through `csv-async`. Fields are quoted only when they
//! hold a delimiter, quote or line break, so a quoted field may span
//! lines. Reported lines are 1-based and point at the start of a record.

use super::{LedgerError, LedgerRow};
use csv_async::{AsyncReaderBuilder, AsyncWriterBuilder, QuoteStyle};
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncRead;

/// Encode `rows`, preceded by the header row when `with_header` is set
pub async fn encode_rows<R: LedgerRow>(
    rows: &[R],
    with_header: bool,
) -> Result<Vec<u8>, LedgerError> {
    let mut buf = Vec::new();
    {
        let mut writer = AsyncWriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .create_writer(&mut buf);
        if with_header {
            writer.write_record(R::HEADER).await?;
        }
        for row in rows {
            writer.write_record(&row.to_fields()).await?;
        }
        writer.flush().await?;
    }
    Ok(buf)
}

/// Decode every row of `R` from `reader`
///
/// The first record must be `R::HEADER`; an empty input has no rows.
/// `file` only labels errors.
pub async fn decode_rows<R, T>(reader: T, file: &Path) -> Result<Vec<R>, LedgerError>
where
    R: LedgerRow,
    T: AsyncRead + Unpin + Send,
{
    let mut csv = AsyncReaderBuilder::new()
        .has_headers(true)
        .create_reader(reader);

    let header_matches = {
        let headers = csv.headers().await.map_err(|e| malformed(file, e))?;
        headers.is_empty() || headers.iter().eq(R::HEADER.iter().copied())
    };
    if !header_matches {
        return Err(LedgerError::Malformed {
            file: file.to_path_buf(),
            line: 1,
            reason: format!("expected header {:?}", R::HEADER.join(",")),
        });
    }

    let mut rows = Vec::new();
    let mut records = csv.records();
    while let Some(record) = records.next().await {
        let record = record.map_err(|e| malformed(file, e))?;
        let line = record.position().map_or(0, |p| p.line());
        let row = R::from_fields(&record).map_err(|reason| LedgerError::Malformed {
            file: file.to_path_buf(),
            line,
            reason,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Positioned parse errors become `Malformed`; the rest stay csv errors
fn malformed(file: &Path, err: csv_async::Error) -> LedgerError {
    match err.position().map(|p| p.line()) {
        Some(line) => LedgerError::Malformed {
            file: file.to_path_buf(),
            line,
            reason: err.to_string(),
        },
        None => LedgerError::Csv(err),
    }
}
