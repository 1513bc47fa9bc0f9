use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};

use super::DataError;

/// Numeric columns read from a delimited text file
///
/// Column order follows the file: `[time, series...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    columns: Vec<Vec<f64>>,
}

impl Columns {
    /// Build from column vectors, which must all have the same length
    pub fn new(columns: Vec<Vec<f64>>) -> Result<Self, DataError> {
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(DataError::LengthMismatch {
                    description: format!(
                        "column of length {} next to column of length {}",
                        bad.len(),
                        first.len()
                    ),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow a column by index
    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    /// Split a `[time, aif]` or `[time, aif, curve]` file into its series
    pub fn into_curves(self) -> Result<(Vec<f64>, Vec<f64>, Option<Vec<f64>>), DataError> {
        let found = self.columns.len();
        let mut columns = self.columns.into_iter();
        match (columns.next(), columns.next(), columns.next(), columns.next()) {
            (Some(time), Some(aif), curve, None) => Ok((time, aif, curve)),
            _ => Err(DataError::ColumnCount {
                found,
                expected: "2 or 3",
            }),
        }
    }
}

/// Read a delimited numeric file into columns
///
/// Lines starting with `#` are comments (this is where [`write_columns`] puts
/// its header). Every record must hold the same number of numeric fields.
///
/// # Example
///
/// ```rust,no_run
/// use perfusion::data::read_columns;
///
/// let (time, aif, curve) = read_columns("lung.csv", b',')?.into_curves()?;
/// # Ok::<(), perfusion::data::DataError>(())
/// ```
pub fn read_columns(path: impl AsRef<Path>, delimiter: u8) -> Result<Columns, DataError> {
    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(false)
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_path(path.as_ref())
        .map_err(|e| DataError::Csv(e.to_string()))?;

    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| DataError::Csv(e.to_string()))?;
        if columns.is_empty() {
            columns = vec![Vec::new(); record.len()];
        }
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = field.parse::<f64>().map_err(|_| DataError::Parse {
                line: line + 1,
                value: field.to_string(),
            })?;
            column.push(value);
        }
    }

    Columns::new(columns)
}

/// Write columns as a delimited text file with a `#`-prefixed header line
pub fn write_columns(
    path: impl AsRef<Path>,
    header: &[&str],
    columns: &Columns,
    delimiter: u8,
) -> Result<(), DataError> {
    if !header.is_empty() && header.len() != columns.width() {
        return Err(DataError::ColumnCount {
            found: header.len(),
            expected: "one header entry per column",
        });
    }

    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path.as_ref())
        .map_err(|e| DataError::Csv(e.to_string()))?;

    if !header.is_empty() {
        let mut names = header.iter().map(|h| h.to_string());
        let first = names.next().map(|h| format!("# {}", h));
        writer
            .write_record(first.into_iter().chain(names))
            .map_err(|e| DataError::Csv(e.to_string()))?;
    }

    for row in 0..columns.len() {
        writer
            .write_record(columns.columns.iter().map(|c| c[row].to_string()))
            .map_err(|e| DataError::Csv(e.to_string()))?;
    }

    writer.flush().map_err(|e| DataError::Csv(e.to_string()))
}
