use crate::predict::PredictionOutput;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// File format for written predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    /// Guess from a file extension, defaulting to JSON
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }
}

/// Writes prediction results, and nothing else, to one sink.
///
/// Diagnostics never go through this writer; they go to the tracing
/// subscriber on stderr.
pub struct ResultWriter<W: Write> {
    sink: W,
}

impl ResultWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { sink: io::stdout() }
    }
}

impl ResultWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
        Ok(Self {
            sink: BufWriter::new(file),
        })
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Single-line JSON document followed by a newline
    pub fn write_json(&mut self, output: &PredictionOutput) -> Result<()> {
        serde_json::to_writer(&mut self.sink, output).context("Failed to serialize predictions")?;
        self.sink.write_all(b"\n")?;
        self.sink.flush()?;
        Ok(())
    }

    /// Flat CSV with one line per (row, class) entry
    pub fn write_csv(&mut self, output: &PredictionOutput) -> Result<()> {
        {
            let mut writer = csv::Writer::from_writer(&mut self.sink);
            writer.write_record(["row", "disease", "probability", "location"])?;
            for (row, prediction) in output.entries() {
                writer.write_record([
                    row.map(|r| r.to_string()).unwrap_or_default(),
                    prediction.disease.clone(),
                    prediction.probability.to_string(),
                    prediction.location.clone().unwrap_or_default(),
                ])?;
            }
            writer.flush()?;
        }
        self.sink.flush()?;
        Ok(())
    }

    pub fn write(&mut self, output: &PredictionOutput, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => self.write_json(output),
            OutputFormat::Csv => self.write_csv(output),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
