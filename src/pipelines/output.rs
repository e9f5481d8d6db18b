// Copyright 2021 The Wikimedia Foundation research team.
// Copyright 2021 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::error::ArticleDescError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One generation event: the model's prediction, the ground-truth reference and
/// the target locale tag. Append-only; written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionRecord {
    pub prediction: String,
    pub reference: String,
    pub locale: String,
}

/// Append-only consumer of prediction records.
pub trait PredictionSink {
    fn write(&mut self, record: &PredictionRecord) -> Result<(), ArticleDescError>;

    fn flush(&mut self) -> Result<(), ArticleDescError> {
        Ok(())
    }
}

/// # Split file sink
///
/// Writes predictions, references and locale tags to three aligned
/// line-oriented files (`outputs.txt`, `mod_targets.txt`, `lang_list.txt`).
/// Records must be appended in strict entity-then-language order so that line
/// `i` of each file refers to the same generation event.
pub struct SplitFileSink {
    predictions: BufWriter<File>,
    references: BufWriter<File>,
    locales: BufWriter<File>,
}

impl SplitFileSink {
    pub const PREDICTIONS_FILE: &'static str = "outputs.txt";
    pub const REFERENCES_FILE: &'static str = "mod_targets.txt";
    pub const LOCALES_FILE: &'static str = "lang_list.txt";

    /// Creates the output directory if needed and opens the three streams.
    pub fn create<P: AsRef<Path>>(output_dir: P) -> Result<SplitFileSink, ArticleDescError> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;
        Ok(SplitFileSink {
            predictions: BufWriter::new(File::create(output_dir.join(Self::PREDICTIONS_FILE))?),
            references: BufWriter::new(File::create(output_dir.join(Self::REFERENCES_FILE))?),
            locales: BufWriter::new(File::create(output_dir.join(Self::LOCALES_FILE))?),
        })
    }
}

impl PredictionSink for SplitFileSink {
    fn write(&mut self, record: &PredictionRecord) -> Result<(), ArticleDescError> {
        writeln!(self.predictions, "{}", record.prediction)?;
        writeln!(self.references, "{}", record.reference)?;
        writeln!(self.locales, "{}", record.locale)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ArticleDescError> {
        self.predictions.flush()?;
        self.references.flush()?;
        self.locales.flush()?;
        Ok(())
    }
}

/// In-memory sink, a test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<PredictionRecord>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }
}

impl PredictionSink for MemorySink {
    fn write(&mut self, record: &PredictionRecord) -> Result<(), ArticleDescError> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sink_keeps_streams_aligned() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = SplitFileSink::create(dir.path())?;
        sink.write(&PredictionRecord {
            prediction: "Hamlet in Alberta, Canada".to_string(),
            reference: "Hamlet in Alberta, Canada".to_string(),
            locale: "en_XX".to_string(),
        })?;
        sink.write(&PredictionRecord {
            prediction: "capitale de la France".to_string(),
            reference: "ville de France".to_string(),
            locale: "fr_XX".to_string(),
        })?;
        sink.flush()?;

        let predictions = fs::read_to_string(dir.path().join(SplitFileSink::PREDICTIONS_FILE))?;
        let references = fs::read_to_string(dir.path().join(SplitFileSink::REFERENCES_FILE))?;
        let locales = fs::read_to_string(dir.path().join(SplitFileSink::LOCALES_FILE))?;

        let prediction_lines: Vec<&str> = predictions.lines().collect();
        let reference_lines: Vec<&str> = references.lines().collect();
        let locale_lines: Vec<&str> = locales.lines().collect();
        assert_eq!(prediction_lines.len(), 2);
        assert_eq!(reference_lines.len(), 2);
        assert_eq!(locale_lines.len(), 2);
        assert_eq!(prediction_lines[1], "capitale de la France");
        assert_eq!(reference_lines[1], "ville de France");
        assert_eq!(locale_lines[1], "fr_XX");
        Ok(())
    }

    #[test]
    fn memory_sink_records_in_order() -> anyhow::Result<()> {
        let mut sink = MemorySink::new();
        for locale in ["en_XX", "fr_XX", "de_DE"] {
            sink.write(&PredictionRecord {
                prediction: "p".to_string(),
                reference: "r".to_string(),
                locale: locale.to_string(),
            })?;
        }
        let locales: Vec<&str> = sink.records().iter().map(|r| r.locale.as_str()).collect();
        assert_eq!(locales, vec!["en_XX", "fr_XX", "de_DE"]);
        Ok(())
    }
}
