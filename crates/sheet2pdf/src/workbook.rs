//! Workbook handle and the automation seam it runs on.

use std::path::{Path, PathBuf};

use sheet2pdf_protocol::SheetUsage;

use crate::bridge::BridgeError;

/// The operations the converter needs from a spreadsheet application.
///
/// [`ExcelBridge`](crate::ExcelBridge) is the real implementation. Workbooks
/// are identified by handles the implementation hands out from `open`; a
/// handle is dead after `close` and is never handed out again.
pub trait Automation {
    /// Open a workbook and return its handle.
    fn open(&self, path: &Path) -> Result<u64, BridgeError>;

    /// Sheet names in tab order.
    fn sheet_names(&self, workbook: u64) -> Result<Vec<String>, BridgeError>;

    fn sheet_usage(&self, workbook: u64, sheet: &str) -> Result<SheetUsage, BridgeError>;

    /// Export one sheet to `pdf`, overwriting any existing file.
    fn export_pdf(&self, workbook: u64, sheet: &str, pdf: &Path) -> Result<(), BridgeError>;

    /// Close without saving.
    fn close(&self, workbook: u64) -> Result<(), BridgeError>;
}

/// An open workbook.
///
/// The workbook is closed (without saving) exactly once: explicitly through
/// [`close`](Self::close), or when the handle is dropped on any other path.
pub struct Workbook<'a, A: Automation + ?Sized> {
    automation: &'a A,
    handle: u64,
    path: PathBuf,
    open: bool,
}

impl<'a, A: Automation + ?Sized> Workbook<'a, A> {
    pub fn open(automation: &'a A, path: &Path) -> Result<Self, BridgeError> {
        let handle = automation.open(path)?;
        Ok(Self {
            automation,
            handle,
            path: path.to_path_buf(),
            open: true,
        })
    }

    /// Get the internal handle ID.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, BridgeError> {
        self.automation.sheet_names(self.handle)
    }

    /// Whether a sheet with exactly this name exists.
    pub fn has_sheet(&self, name: &str) -> Result<bool, BridgeError> {
        Ok(self.sheet_names()?.iter().any(|s| s == name))
    }

    pub fn sheet_usage(&self, sheet: &str) -> Result<SheetUsage, BridgeError> {
        self.automation.sheet_usage(self.handle, sheet)
    }

    pub fn export_pdf(&self, sheet: &str, pdf: &Path) -> Result<(), BridgeError> {
        self.automation.export_pdf(self.handle, sheet, pdf)
    }

    /// Close the workbook without saving.
    pub fn close(mut self) -> Result<(), BridgeError> {
        self.open = false;
        self.automation.close(self.handle)
    }
}

impl<A: Automation + ?Sized> Drop for Workbook<'_, A> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.automation.close(self.handle) {
            tracing::warn!(
                workbook = %self.path.display(),
                "Failed to close workbook: {e}"
            );
        }
    }
}
