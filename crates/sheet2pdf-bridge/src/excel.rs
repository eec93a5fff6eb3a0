//! The Excel side of the bridge: one `Excel.Application` plus the workbooks
//! this process opened in it.

#![cfg(windows)]

use std::collections::HashMap;

use windows::Win32::System::Variant::VARIANT;

use sheet2pdf_protocol::{CellError, CellValue, SheetUsage};

use crate::dispatch::{
    variant_bool, variant_get_bool, variant_get_f64, variant_get_scode, variant_get_string,
    variant_i32, variant_is_empty, variant_str, variant_vt, DispatchObject,
};
use crate::startup::setup_or_quit;

/// `XlFixedFormatType.xlTypePDF`
const XL_TYPE_PDF: i32 = 0;

/// `Workbooks.Open(UpdateLinks:=3)`: refresh both external and remote links.
const XL_UPDATE_LINKS_ALWAYS: i32 = 3;

/// `Workbooks.Open(UpdateLinks:=0)`
const XL_UPDATE_LINKS_NEVER: i32 = 0;

pub struct ExcelSession {
    app: DispatchObject,
    workbooks_collection: DispatchObject,
    /// True when Excel was already running and we only attached to it.
    attached: bool,
    /// `DisplayAlerts` as we found it, restored on shutdown.
    display_alerts: bool,
    workbooks: HashMap<u64, DispatchObject>,
    next_handle: u64,
}

impl ExcelSession {
    /// Attach to the running Excel if there is one, otherwise start a new one.
    pub fn start(visible: bool) -> Result<Self, String> {
        let (app, attached) = match DispatchObject::active("Excel.Application")? {
            Some(app) => {
                tracing::info!("Attached to running Excel instance");
                (app, true)
            }
            None => {
                let app = DispatchObject::create("Excel.Application")?;
                tracing::info!("Started new Excel instance");
                (app, false)
            }
        };

        let (display_alerts, workbooks_collection) = setup_or_quit(
            &app,
            attached,
            |app| configure(app, attached, visible),
            |app| app.call("Quit", &[]).map(drop),
        )?;

        Ok(Self {
            app,
            workbooks_collection,
            attached,
            display_alerts,
            workbooks: HashMap::new(),
            next_handle: 1,
        })
    }

    pub fn attached(&self) -> bool {
        self.attached
    }

    pub fn open_workbook(&mut self, path: &str, update_links: bool) -> Result<u64, String> {
        let links = if update_links {
            XL_UPDATE_LINKS_ALWAYS
        } else {
            XL_UPDATE_LINKS_NEVER
        };
        let wb = self
            .workbooks_collection
            .call_object("Open", &[variant_str(path), variant_i32(links)])?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.workbooks.insert(handle, wb);
        tracing::debug!(handle, path, "Opened workbook");
        Ok(handle)
    }

    pub fn sheet_names(&self, handle: u64) -> Result<Vec<String>, String> {
        let sheets = self.workbook(handle)?.get_object("Sheets")?;
        let count = sheets.get_u32("Count")?;
        // Sheets is 1-based.
        (1..=count as i32)
            .map(|i| sheets.get_object_with("Item", &[variant_i32(i)])?.get_string("Name"))
            .collect()
    }

    pub fn sheet_usage(&self, handle: u64, sheet: &str) -> Result<SheetUsage, String> {
        let ws = self.sheet(handle, sheet)?;
        let used = ws.get_object("UsedRange")?;
        let rows = used.get_object("Rows")?.get_u32("Count")?;
        let columns = used.get_object("Columns")?.get_u32("Count")?;
        let first = ws.get_object_with("Cells", &[variant_i32(1), variant_i32(1)])?;
        let first_cell = variant_to_cell_value(&first.get("Value")?);
        Ok(SheetUsage {
            rows,
            columns,
            first_cell,
        })
    }

    pub fn export_pdf(&self, handle: u64, sheet: &str, path: &str) -> Result<(), String> {
        let ws = self.sheet(handle, sheet)?;
        ws.call(
            "ExportAsFixedFormat",
            &[variant_i32(XL_TYPE_PDF), variant_str(path)],
        )?;
        tracing::debug!(handle, sheet, path, "Exported sheet");
        Ok(())
    }

    /// Close without saving. The handle is forgotten even if Excel complains.
    pub fn close_workbook(&mut self, handle: u64) -> Result<(), String> {
        let wb = self
            .workbooks
            .remove(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))?;
        wb.call("Close", &[variant_bool(false)])?;
        tracing::debug!(handle, "Closed workbook");
        Ok(())
    }

    /// Close our workbooks, restore `DisplayAlerts`, and quit Excel only if
    /// this session started it. Returns whether Excel was quit.
    pub fn shutdown(mut self) -> Result<bool, String> {
        let handles: Vec<u64> = self.workbooks.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.close_workbook(handle) {
                tracing::warn!(handle, "Failed to close workbook during shutdown: {e}");
            }
        }

        self.app
            .put("DisplayAlerts", variant_bool(self.display_alerts))?;

        if self.attached {
            tracing::info!("Leaving attached Excel instance running");
            return Ok(false);
        }
        self.app.call("Quit", &[])?;
        tracing::info!("Quit Excel instance");
        Ok(true)
    }

    fn workbook(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.workbooks
            .get(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))
    }

    fn sheet(&self, handle: u64, name: &str) -> Result<DispatchObject, String> {
        self.workbook(handle)?
            .get_object("Sheets")?
            .get_object_with("Item", &[variant_str(name)])
    }
}

/// Turn off alerts, set visibility and fetch the `Workbooks` collection.
/// Returns the `DisplayAlerts` value found so shutdown can restore it.
fn configure(
    app: &DispatchObject,
    attached: bool,
    visible: bool,
) -> Result<(bool, DispatchObject), String> {
    let display_alerts = variant_get_bool(&app.get("DisplayAlerts")?).unwrap_or(true);
    app.put("DisplayAlerts", variant_bool(false))?;

    // Never hide a user's own Excel window.
    if visible || !attached {
        app.put("Visible", variant_bool(visible))?;
    }

    let workbooks_collection = app.get_object("Workbooks")?;
    Ok((display_alerts, workbooks_collection))
}

fn variant_to_cell_value(variant: &VARIANT) -> CellValue {
    if variant_is_empty(variant) {
        CellValue::Null
    } else if let Some(b) = variant_get_bool(variant) {
        CellValue::Bool(b)
    } else if let Some(n) = variant_get_f64(variant) {
        CellValue::Number(n)
    } else if let Some(s) = variant_get_string(variant) {
        CellValue::String(s)
    } else if let Some(scode) = variant_get_scode(variant) {
        CellValue::Error(CellError {
            code: excel_error_code(scode).to_string(),
        })
    } else {
        CellValue::Error(CellError {
            code: format!("#VT{}", variant_vt(variant)),
        })
    }
}

/// Map a CVErr SCODE (0x800A07xx) to the text Excel shows in the cell.
fn excel_error_code(scode: i32) -> &'static str {
    match scode & 0xFFFF {
        2000 => "#NULL!",
        2007 => "#DIV/0!",
        2015 => "#VALUE!",
        2023 => "#REF!",
        2029 => "#NAME?",
        2036 => "#NUM!",
        2042 => "#N/A",
        _ => "#ERR",
    }
}
