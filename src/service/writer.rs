//! Sorts finished outcomes into per-category files under the output directory.

use email_vetter_core::{Category, Result, ValidationOutcome};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const OTHER_FILE: &str = "other.txt";

/// Filesystem-safe stem for a per-domain file. Brackets around domain
/// literals are dropped.
pub fn sanitize_domain_filename(domain: &str) -> String {
    let replaced: String = domain
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == '-' || c == '_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct WriteSummary {
    pub valid: usize,
    pub risk: usize,
    pub invalid: usize,
    pub unknown: usize,
    pub generated_at: String,
    pub output_dir: PathBuf,
}

impl WriteSummary {
    pub fn total(&self) -> usize {
        self.valid + self.risk + self.invalid + self.unknown
    }
}

/// Buffers outcomes as they stream in and writes every file on
/// [`ResultWriter::finish`].
pub struct ResultWriter {
    output_dir: PathBuf,
    well_known: HashSet<String>,
    json_lines: Option<BufWriter<fs::File>>,
    valid_by_file: BTreeMap<String, Vec<String>>,
    risk: Vec<String>,
    invalid: Vec<String>,
    unknown: Vec<String>,
}

impl ResultWriter {
    /// Creates the output directory. With `json_lines`, every outcome is also
    /// appended to `results.jsonl` as it arrives.
    pub fn new(output_dir: &Path, well_known: HashSet<String>, json_lines: bool) -> Result<Self> {
        fs::create_dir_all(output_dir.join("valid"))?;
        let json_lines = if json_lines {
            let file = fs::File::create(output_dir.join("results.jsonl"))?;
            Some(BufWriter::new(file))
        } else {
            None
        };
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            well_known,
            json_lines,
            valid_by_file: BTreeMap::new(),
            risk: Vec::new(),
            invalid: Vec::new(),
            unknown: Vec::new(),
        })
    }

    pub fn record(&mut self, outcome: &ValidationOutcome) -> Result<()> {
        if let Some(out) = self.json_lines.as_mut() {
            serde_json::to_writer(&mut *out, outcome)?;
            out.write_all(b"\n")?;
        }

        let line = format!("{} | {} | {}", outcome.email, outcome.reason, outcome.stage);
        match outcome.category {
            Category::Valid => {
                let file = match outcome.domain() {
                    Some(domain) if self.well_known.contains(&domain) => {
                        format!("{}.txt", sanitize_domain_filename(&domain))
                    }
                    _ => OTHER_FILE.to_string(),
                };
                self.valid_by_file
                    .entry(file)
                    .or_default()
                    .push(outcome.email.clone());
            }
            Category::Risk => self.risk.push(line),
            Category::Invalid => self.invalid.push(line),
            Category::Unknown => self.unknown.push(line),
        }
        Ok(())
    }

    /// Writes the category files (sorted) and `summary.json`.
    pub fn finish(mut self) -> Result<WriteSummary> {
        if let Some(mut out) = self.json_lines.take() {
            out.flush()?;
        }

        let valid_dir = self.output_dir.join("valid");
        let mut valid = 0;
        for (file, emails) in &mut self.valid_by_file {
            valid += emails.len();
            write_sorted(&valid_dir.join(file), emails)?;
        }
        write_sorted(&self.output_dir.join("risk.txt"), &mut self.risk)?;
        write_sorted(&self.output_dir.join("invalid.txt"), &mut self.invalid)?;
        write_sorted(&self.output_dir.join("unknown.txt"), &mut self.unknown)?;

        let summary = WriteSummary {
            valid,
            risk: self.risk.len(),
            invalid: self.invalid.len(),
            unknown: self.unknown.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            output_dir: self.output_dir.clone(),
        };
        fs::write(
            self.output_dir.join("summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;
        tracing::info!(
            "Wrote {} results to {} ({} valid, {} risk, {} invalid, {} unknown)",
            summary.total(),
            self.output_dir.display(),
            summary.valid,
            summary.risk,
            summary.invalid,
            summary.unknown
        );
        Ok(summary)
    }
}

fn write_sorted(path: &Path, lines: &mut [String]) -> Result<()> {
    lines.sort();
    let mut out = BufWriter::new(fs::File::create(path)?);
    for line in lines.iter() {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
