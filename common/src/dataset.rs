use arrow::array::{Array, ArrayRef, StringArray, new_null_array};
use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use crate::config::UnionMode;
use crate::schema::{SourceKind, text_schema};
use crate::{Error, Result};

/// A record produced by one of the source adapters.
pub trait TabularRecord {
    const SOURCE: SourceKind;

    /// Cell values in the order of `Self::SOURCE.columns()`.
    fn values(&self) -> Vec<Option<String>>;
}

/// An ordered set of rows sharing one column list. All cells are nullable text.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    batch: RecordBatch,
    source: Option<SourceKind>,
}

impl TabularDataset {
    /// Builds a dataset from row values, rejecting rows whose width differs
    /// from the column list.
    pub fn from_rows<S: AsRef<str>>(
        columns: &[S],
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self> {
        check_column_names(columns.iter().map(|c| c.as_ref()))?;

        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::SchemaMismatch(format!(
                "row {} has {} values but the dataset has {} columns",
                index,
                row.len(),
                columns.len()
            )));
        }

        let schema: SchemaRef = Arc::new(text_schema(columns));
        let arrays: Vec<ArrayRef> = (0..columns.len())
            .map(|col_idx| {
                let array: StringArray = rows.iter().map(|row| row[col_idx].as_deref()).collect();
                Arc::new(array) as ArrayRef
            })
            .collect();

        let batch = RecordBatch::try_new(schema, arrays)?;
        Ok(Self {
            batch,
            source: None,
        })
    }

    pub fn from_records<R: TabularRecord>(records: &[R]) -> Result<Self> {
        let rows = records.iter().map(|r| r.values()).collect();
        let dataset = Self::from_rows(R::SOURCE.columns(), rows)?;
        Ok(dataset.with_source(R::SOURCE))
    }

    /// Parses CSV text with a header row. Every column is read as text and
    /// empty cells become nulls.
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(Error::SchemaMismatch("CSV content has no header row".into()));
        }

        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(Cursor::new(bytes), Some(0))?;
        let names: Vec<String> = inferred.fields().iter().map(|f| f.name().clone()).collect();
        check_column_names(names.iter().map(String::as_str))?;

        let schema: SchemaRef = Arc::new(text_schema(names.as_slice()));
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(Cursor::new(bytes))?;
        let batches = reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?;
        let batch = concat_batches(&schema, &batches)?;

        Ok(Self {
            batch,
            source: None,
        })
    }

    /// Header row followed by data rows; no index column.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
            writer.write(&self.batch)?;
        }
        Ok(buffer)
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source(&self) -> Option<SourceKind> {
        self.source
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<Option<String>>> {
        let index = self.batch.schema().index_of(name)?;
        let array = self
            .batch
            .column(index)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::SchemaMismatch(format!("column '{}' is not text", name)))?;

        Ok((0..array.len())
            .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
            .collect())
    }

    /// Fails unless the dataset carries exactly `expected`, in order.
    pub fn validate_columns<S: AsRef<str>>(&self, expected: &[S]) -> Result<()> {
        let actual = self.column_names();
        let matches = actual.len() == expected.len()
            && actual.iter().zip(expected).all(|(a, e)| a == e.as_ref());
        if matches {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(format!(
                "expected columns {:?}, found {:?}",
                expected.iter().map(|e| e.as_ref()).collect::<Vec<_>>(),
                actual
            )))
        }
    }

    /// Fails unless the dataset has exactly the columns of `kind`, in order.
    pub fn validate_source(&self, kind: SourceKind) -> Result<()> {
        if self.batch.schema().as_ref() == kind.arrow_schema() {
            return Ok(());
        }
        Err(Error::SchemaMismatch(format!(
            "expected {} columns {:?}, found {:?}",
            kind,
            kind.columns(),
            self.column_names()
        )))
    }

    /// Tags the dataset as `kind`. Strict mode requires the exact column list
    /// already; reconcile mode projects onto it.
    pub fn conform_to(self, kind: SourceKind, mode: UnionMode) -> Result<Self> {
        let conformed = match mode {
            UnionMode::Strict => {
                self.validate_source(kind)?;
                self
            }
            UnionMode::Reconcile => self.project(kind.columns())?,
        };
        Ok(conformed.with_source(kind))
    }

    /// Reorders to `columns`, dropping the rest and null-filling any the
    /// dataset lacks. The source tag survives only when the result still has
    /// that source's column list.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Result<Self> {
        check_column_names(columns.iter().map(|c| c.as_ref()))?;

        let schema: SchemaRef = Arc::new(text_schema(columns));
        let current = self.batch.schema();
        let arrays: Vec<ArrayRef> = columns
            .iter()
            .map(|name| match current.index_of(name.as_ref()) {
                Ok(index) => self.batch.column(index).clone(),
                Err(_) => new_null_array(&DataType::Utf8, self.batch.num_rows()),
            })
            .collect();

        let source = self.source.filter(|kind| {
            let own = kind.columns();
            own.len() == columns.len() && own.iter().zip(columns).all(|(a, b)| *a == b.as_ref())
        });
        let batch = RecordBatch::try_new(schema, arrays)?;
        Ok(Self { batch, source })
    }

    /// Row-wise concatenation in input order. Zero inputs is an error, not an
    /// empty dataset. Datasets tagged with different sources are refused;
    /// project them onto a shared column list first.
    pub fn concat(datasets: Vec<TabularDataset>, mode: UnionMode) -> Result<Self> {
        let first = datasets
            .first()
            .ok_or_else(|| Error::InvalidInput("cannot concatenate zero datasets".into()))?;

        let mut tags = datasets.iter().filter_map(|d| d.source);
        if let Some(tag) = tags.next() {
            if let Some(other) = tags.find(|other| *other != tag) {
                return Err(Error::SchemaMismatch(format!(
                    "cannot union {} rows with {} rows without a projection",
                    tag, other
                )));
            }
        }

        let columns = match mode {
            UnionMode::Strict => {
                let expected = first.column_names();
                for (index, dataset) in datasets.iter().enumerate().skip(1) {
                    dataset.validate_columns(expected.as_slice()).map_err(|e| {
                        Error::SchemaMismatch(format!("dataset {} of {}: {}", index, datasets.len(), e))
                    })?;
                }
                expected
            }
            UnionMode::Reconcile => {
                let mut seen = HashSet::new();
                let mut columns = Vec::new();
                for dataset in &datasets {
                    for name in dataset.column_names() {
                        if seen.insert(name.clone()) {
                            columns.push(name);
                        }
                    }
                }
                columns
            }
        };

        let source = first.source;
        let same_source = datasets.iter().all(|d| d.source == source);

        let aligned = datasets
            .iter()
            .map(|d| d.project(columns.as_slice()))
            .collect::<Result<Vec<_>>>()?;
        let schema: SchemaRef = Arc::new(text_schema(columns.as_slice()));
        let batch = concat_batches(&schema, aligned.iter().map(|d| &d.batch))?;

        Ok(Self {
            batch,
            source: if same_source { source } else { None },
        })
    }
}

fn check_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut count = 0;
    for name in names {
        count += 1;
        if !seen.insert(name) {
            return Err(Error::SchemaMismatch(format!("duplicate column '{}'", name)));
        }
    }
    if count == 0 {
        return Err(Error::SchemaMismatch("dataset has no columns".into()));
    }
    Ok(())
}
