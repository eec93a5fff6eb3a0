//! Export one named sheet from every workbook in a folder to PDF.
//!
//! PDF rendering is Excel's own "Export as PDF" feature. This crate drives
//! Excel through a small Windows bridge process that talks COM to
//! `Excel.Application` and JSON-over-stdio to us. On Linux the bridge runs
//! under WINE; on Windows it runs directly.
//!
//! # Architecture
//!
//! ```text
//! Your Rust code
//!     └── Converter (this crate)
//!           └── ExcelBridge: spawns [wine] sheet2pdf-bridge.exe
//!                 └── COM: Excel.Application
//! ```
//!
//! An already running Excel is reused and left running afterwards; an Excel
//! started by the bridge is quit when the bridge shuts down. Every workbook
//! opened is closed again without saving, whatever happens while it is open.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sheet2pdf::{BridgeConfig, Converter, ExcelBridge};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ExcelBridge::start(BridgeConfig::default())?;
//!     let report = Converter::new(&bridge, "single page").convert_folder(Path::new("reports"))?;
//!     println!("{report}");
//!     bridge.shutdown()?;
//!     Ok(())
//! }
//! ```

mod batch;
mod bridge;
pub mod discovery;
mod error;
mod workbook;

pub use batch::{BatchReport, Converter, FileOutcome, DEFAULT_SHEET_NAME};
pub use bridge::{linux_to_wine_path, BridgeConfig, BridgeError, ExcelBridge, BRIDGE_EXE_NAME};
pub use error::{Error, Result};
pub use sheet2pdf_protocol::{CellValue, SheetUsage};
pub use workbook::{Automation, Workbook};
