use crate::data::{is_na, Record, Schema, Table, NONE_LABEL};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let stem = path.file_stem().and_then(|s| s.to_str());

        let format = match (ext.as_deref(), stem) {
            (Some("gz"), Some(stem)) if stem.ends_with(".csv") => FileFormat::GzippedCsv,
            (Some("gz"), Some(stem)) if stem.ends_with(".tsv") || stem.ends_with(".txt") => {
                FileFormat::GzippedTsv
            }
            (Some("csv"), _) => FileFormat::Csv,
            (Some("tsv"), _) | (Some("txt"), _) => FileFormat::Tsv,
            _ => {
                return Err(PipelineError::UnsupportedFormat(path.display().to_string()).into())
            }
        };
        Ok(format)
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Positions of schema columns within a header row
#[derive(Debug)]
struct ColumnLayout {
    feature_names: Vec<String>,
    feature_idx: Vec<usize>,
    target_idx: Option<usize>,
    location_idx: Option<usize>,
}

/// Loads and validates tabular data against a [`Schema`]
pub struct DataLoader {
    schema: Schema,
    /// Whether the target column must be present (training, evaluation)
    require_target: bool,
}

impl DataLoader {
    /// Loader for training data: target column required
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            require_target: true,
        }
    }

    /// Loader for inference data: target column optional and discarded
    pub fn for_inference(schema: Schema) -> Self {
        Self {
            schema,
            require_target: false,
        }
    }

    /// Load records from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        let path = path.as_ref();
        info!("Loading data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let table = if format.is_gzipped() {
            self.parse_records(BufReader::new(GzDecoder::new(file)), format)
        } else {
            self.parse_records(BufReader::new(file), format)
        }
        .with_context(|| format!("Failed to read table from {:?}", path))?;

        info!(
            "Loaded {} records with {} feature columns",
            table.len(),
            table.feature_names.len()
        );
        Ok(table)
    }

    /// Parse records from any reader
    pub fn parse_records<R: Read>(&self, reader: R, format: FileFormat) -> Result<Table> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|s| s.to_string())
            .collect();
        debug!("Headers: {:?}", headers);

        let layout = self.resolve_columns(&headers)?;

        let mut records = Vec::new();
        for (row, result) in csv_reader.records().enumerate() {
            let line = row + 2;
            let record = result.with_context(|| format!("Failed to parse CSV record at line {}", line))?;
            records.push(self.parse_record(&record, &layout, line)?);
        }

        Ok(Table {
            feature_names: layout.feature_names,
            records,
        })
    }

    /// Check the header against the schema, listing every missing column
    fn resolve_columns(&self, headers: &[String]) -> Result<ColumnLayout> {
        let position = |name: &str| headers.iter().position(|h| h == name);
        let target = self.schema.target_column.as_str();
        let location = self.schema.location_column.as_deref();

        let feature_names: Vec<String> = if self.schema.infers_features() {
            headers
                .iter()
                .filter(|h| h.as_str() != target && Some(h.as_str()) != location)
                .cloned()
                .collect()
        } else {
            self.schema.feature_columns.clone()
        };

        let mut missing: Vec<String> = feature_names
            .iter()
            .filter(|name| position(name).is_none())
            .cloned()
            .collect();
        let target_idx = position(target);
        if self.require_target && target_idx.is_none() {
            missing.push(target.to_string());
        }
        if !missing.is_empty() {
            return Err(PipelineError::MissingColumns(missing).into());
        }
        if feature_names.is_empty() {
            return Err(PipelineError::EmptyDataset("no feature columns in header".into()).into());
        }

        let feature_idx = feature_names.iter().filter_map(|n| position(n)).collect();
        let target_idx = if self.require_target {
            target_idx
        } else {
            if target_idx.is_some() {
                debug!("Dropping target column '{}' for inference", target);
            }
            None
        };

        Ok(ColumnLayout {
            feature_names,
            feature_idx,
            target_idx,
            location_idx: location.and_then(position),
        })
    }

    /// Parse a single record against the resolved layout
    fn parse_record(
        &self,
        record: &csv::StringRecord,
        layout: &ColumnLayout,
        line: usize,
    ) -> Result<Record> {
        let mut features = Vec::with_capacity(layout.feature_idx.len());
        for (name, &idx) in layout.feature_names.iter().zip(&layout.feature_idx) {
            let raw = record.get(idx).unwrap_or("");
            if is_na(raw) {
                features.push(None);
                continue;
            }
            match raw.parse::<f32>() {
                Ok(v) if v.is_finite() => features.push(Some(v)),
                _ => {
                    return Err(PipelineError::InvalidValue {
                        line,
                        column: name.clone(),
                        value: raw.to_string(),
                    }
                    .into())
                }
            }
        }

        // The target is always a string class; empty cells become their own class.
        let label = layout.target_idx.map(|idx| match record.get(idx) {
            Some(raw) if !is_na(raw) => raw.to_string(),
            _ => NONE_LABEL.to_string(),
        });

        let location = layout
            .location_idx
            .and_then(|idx| record.get(idx))
            .filter(|raw| !is_na(raw))
            .map(|raw| raw.to_string());

        Ok(Record {
            line,
            features,
            label,
            location,
        })
    }
}
