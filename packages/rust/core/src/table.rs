//! Reading the item table and writing the enriched table.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use pokespin_shared::{
    EnrichedRow, OUTPUT_COLUMNS, PokespinError, REQUIRED_COLUMNS, Result, Row, StagedFile,
};

/// Read and validate the item table at `path`.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let file = std::fs::File::open(path).map_err(|e| PokespinError::io(path, e))?;
    let rows = parse_rows(file).map_err(|e| match e {
        PokespinError::Schema { message } => {
            PokespinError::schema(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;
    debug!(path = %path.display(), rows = rows.len(), "read item table");
    Ok(rows)
}

/// Parse an item table from any reader.
///
/// The header must contain every column in [`REQUIRED_COLUMNS`]; other
/// columns (for example those of an already-enriched table) are ignored.
/// IDs must be positive integers and unique.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new().from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| PokespinError::schema(format!("unreadable header: {e}")))?
        .clone();

    let mut missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(PokespinError::schema(format!(
            "missing required columns: {missing:?}"
        )));
    }

    let index = |name: &str| headers.iter().position(|h| h == name).unwrap_or_default();
    let [id_col, name_col, sprite_col, category_col] = REQUIRED_COLUMNS.map(index);

    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.records() {
        let record =
            record.map_err(|e| PokespinError::schema(format!("malformed record: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |col: usize| record.get(col).unwrap_or_default();

        let raw_id = field(id_col).trim();
        let id = match raw_id.parse::<u32>() {
            Ok(id) if id > 0 => id,
            _ => {
                return Err(PokespinError::schema(format!(
                    "line {line}: invalid ID '{raw_id}'"
                )));
            }
        };
        if !seen.insert(id) {
            return Err(PokespinError::schema(format!(
                "line {line}: duplicate ID {id}"
            )));
        }

        rows.push(Row {
            id,
            name: field(name_col).to_string(),
            sprite_url: field(sprite_col).to_string(),
            category: field(category_col).to_string(),
        });
    }

    Ok(rows)
}

/// Streams table rows, enriched rows in [`OUTPUT_COLUMNS`] order by default.
pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TableWriter<W> {
    /// Start an enriched table on `sink`, writing the header immediately.
    pub fn new(sink: W) -> Result<Self> {
        Self::with_header(sink, &OUTPUT_COLUMNS)
    }

    /// Start a table with a custom header.
    pub fn with_header(sink: W, header: &[&str]) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().from_writer(sink);
        writer.write_record(header).map_err(csv_error)?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, row: &EnrichedRow) -> Result<()> {
        self.write_record(row.record())
    }

    /// Write one raw record; the caller keeps it aligned with the header.
    pub fn write_record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(record).map_err(csv_error)
    }

    /// Flush and hand back the underlying sink.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PokespinError::parse(format!("failed to flush table: {}", e.error())))
    }
}

/// Buffered sink on the staging path of `staged`.
pub fn open_staged(staged: &StagedFile) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(staged.create()?))
}

/// Flush a finished staged table to disk so a later rename publishes complete bytes.
pub fn sync_staged(sink: BufWriter<File>, staged: &StagedFile) -> Result<()> {
    let file = sink
        .into_inner()
        .map_err(|e| PokespinError::io(staged.staging_path(), e.into_error()))?;
    file.sync_all()
        .map_err(|e| PokespinError::io(staged.staging_path(), e))
}

fn csv_error(e: csv::Error) -> PokespinError {
    PokespinError::parse(format!("failed to write table: {e}"))
}
