//! The batch driver: one sheet from each workbook in a folder to PDF.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::bridge::BridgeError;
use crate::discovery::{find_workbooks, pdf_path_for, shared_pdf_paths};
use crate::error::Result;
use crate::workbook::{Automation, Workbook};

/// Sheet exported when none is configured.
pub const DEFAULT_SHEET_NAME: &str = "single page";

/// What happened to one workbook.
#[derive(Debug)]
pub enum FileOutcome {
    /// The sheet was exported and the PDF is on disk.
    Exported { pdf: PathBuf },
    /// The workbook has no sheet with the requested name.
    SheetMissing,
    /// The sheet exists but has no content.
    SheetEmpty,
    /// Excel reported success but no new PDF appeared.
    PdfNotWritten { pdf: PathBuf },
    /// Excel failed to open, inspect or export the workbook.
    Failed(BridgeError),
}

impl FileOutcome {
    pub fn is_exported(&self) -> bool {
        matches!(self, FileOutcome::Exported { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FileOutcome::SheetMissing | FileOutcome::SheetEmpty)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FileOutcome::PdfNotWritten { .. } | FileOutcome::Failed(_)
        )
    }
}

/// Outcomes of one batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<(PathBuf, FileOutcome)>,
    /// Set when the bridge connection broke and the batch stopped early.
    pub aborted: Option<BridgeError>,
    /// Files without an outcome because of `aborted`: the one in progress
    /// when the connection broke plus those never started.
    pub unfinished: usize,
}

impl BatchReport {
    pub fn exported(&self) -> usize {
        self.count(FileOutcome::is_exported)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failure)
    }

    pub fn outcome(&self, file: &Path) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|(path, _)| path == file)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| pred(o)).count()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exported, {} skipped, {} failed",
            self.exported(),
            self.skipped(),
            self.failed()
        )?;
        if self.aborted.is_some() {
            write!(f, ", {} unfinished", self.unfinished)?;
        }
        Ok(())
    }
}

/// Exports one named sheet from each workbook it is given.
pub struct Converter<'a, A: Automation + ?Sized> {
    automation: &'a A,
    sheet: String,
}

impl<'a, A: Automation + ?Sized> Converter<'a, A> {
    pub fn new(automation: &'a A, sheet: impl Into<String>) -> Self {
        Self {
            automation,
            sheet: sheet.into(),
        }
    }

    /// Convert every workbook in `folder`.
    pub fn convert_folder(&self, folder: &Path) -> Result<BatchReport> {
        let files = find_workbooks(folder)?;
        Ok(self.convert_files(&files))
    }

    /// Convert the given workbooks in order.
    ///
    /// Per-file problems are logged and recorded; only a broken bridge
    /// connection stops the batch early.
    pub fn convert_files(&self, files: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();

        for pdf in shared_pdf_paths(files) {
            tracing::warn!(
                "Several workbooks export to {}; only the last one will be kept",
                display_name(&pdf)
            );
        }

        for (index, file) in files.iter().enumerate() {
            let name = display_name(file);
            tracing::info!(file = %name, "Processing {}/{}", index + 1, files.len());

            match self.convert_file(file) {
                Ok(outcome) => {
                    log_outcome(&name, &self.sheet, &outcome);
                    report.files.push((file.clone(), outcome));
                }
                Err(e) => {
                    tracing::error!(
                        file = %name,
                        "Lost connection to Excel, stopping batch: {e}"
                    );
                    report.aborted = Some(e);
                    report.unfinished = files.len() - index;
                    break;
                }
            }
        }

        report
    }

    /// Convert one workbook. Only transport errors are returned as `Err`;
    /// everything else is folded into the outcome.
    pub fn convert_file(&self, file: &Path) -> std::result::Result<FileOutcome, BridgeError> {
        let workbook = match Workbook::open(self.automation, file) {
            Ok(wb) => wb,
            Err(e) => return recoverable(Err(e)),
        };

        let outcome = recoverable(self.export_sheet(&workbook));

        match workbook.close() {
            Ok(()) => outcome,
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                tracing::warn!(file = %display_name(file), "Failed to close workbook: {e}");
                outcome
            }
        }
    }

    fn export_sheet(
        &self,
        workbook: &Workbook<'_, A>,
    ) -> std::result::Result<FileOutcome, BridgeError> {
        if !workbook.has_sheet(&self.sheet)? {
            return Ok(FileOutcome::SheetMissing);
        }

        if workbook.sheet_usage(&self.sheet)?.is_empty() {
            return Ok(FileOutcome::SheetEmpty);
        }

        let pdf = pdf_path_for(workbook.path());
        tracing::info!("Exporting '{}' to '{}'", self.sheet, display_name(&pdf));

        let before = modified(&pdf);
        workbook.export_pdf(&self.sheet, &pdf)?;
        let after = modified(&pdf);

        // A PDF left over from an earlier run must not count as success.
        if after.is_some() && after != before {
            Ok(FileOutcome::Exported { pdf })
        } else {
            Ok(FileOutcome::PdfNotWritten { pdf })
        }
    }
}

/// Fold per-file errors into the outcome; pass transport errors through.
fn recoverable(
    result: std::result::Result<FileOutcome, BridgeError>,
) -> std::result::Result<FileOutcome, BridgeError> {
    match result {
        Err(e) if !e.is_transport() => Ok(FileOutcome::Failed(e)),
        other => other,
    }
}

fn log_outcome(name: &str, sheet: &str, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Exported { pdf } => {
            tracing::info!(file = %name, "Saved {}", display_name(pdf))
        }
        FileOutcome::SheetMissing => {
            tracing::warn!(file = %name, "Sheet '{sheet}' not found, skipping")
        }
        FileOutcome::SheetEmpty => {
            tracing::warn!(file = %name, "Sheet '{sheet}' is empty, skipping")
        }
        FileOutcome::PdfNotWritten { pdf } => {
            tracing::error!(
                file = %name,
                "Export reported success but {} was not written",
                display_name(pdf)
            )
        }
        FileOutcome::Failed(e) => tracing::error!(file = %name, "Error processing workbook: {e}"),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
