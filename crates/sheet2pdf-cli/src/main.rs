//! sheet2pdf CLI - export one sheet of every workbook in a folder to PDF

mod prompt;

use anyhow::{Context, Result};
use clap::Parser;
use sheet2pdf::{discovery, BridgeConfig, Converter, ExcelBridge, DEFAULT_SHEET_NAME};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::prompt::FolderPrompt;

#[derive(Parser)]
#[command(name = "sheet2pdf")]
#[command(
    author,
    version,
    about = "Export a named sheet from every Excel workbook in a folder to PDF"
)]
struct Cli {
    /// Folder to convert before prompting for more
    folder: Option<PathBuf>,

    /// Name of the sheet to export (exact match)
    #[arg(short, long, default_value = DEFAULT_SHEET_NAME)]
    sheet: String,

    /// Path to sheet2pdf-bridge.exe (default: next to this binary)
    #[arg(long, env = "SHEET2PDF_BRIDGE")]
    bridge_exe: Option<PathBuf>,

    /// Program that runs the bridge (default: wine on Linux, none on Windows)
    #[arg(long, env = "SHEET2PDF_LAUNCHER")]
    launcher: Option<PathBuf>,

    /// Run the bridge executable directly, without a launcher
    #[arg(long, conflicts_with = "launcher")]
    no_launcher: bool,

    /// WINE prefix that has Excel installed
    #[arg(long, env = "WINEPREFIX")]
    wine_prefix: Option<PathBuf>,

    /// Keep the Excel window hidden while converting
    #[arg(long)]
    hidden: bool,

    /// Do not refresh external links when opening workbooks
    #[arg(long)]
    no_update_links: bool,
}

impl Cli {
    fn bridge_config(&self) -> BridgeConfig {
        let defaults = BridgeConfig::default();
        let launcher = if self.no_launcher {
            None
        } else {
            self.launcher.clone().or(defaults.launcher)
        };
        BridgeConfig {
            bridge_exe_path: self.bridge_exe.clone(),
            launcher,
            wine_prefix: self.wine_prefix.clone(),
            visible: !self.hidden,
            update_links: !self.no_update_links,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    println!("sheet2pdf {}", env!("CARGO_PKG_VERSION"));
    println!("Exporting sheet '{}' to PDF", cli.sheet);

    let stdin = io::stdin();
    let mut prompt = FolderPrompt::new(stdin.lock(), io::stdout());

    if let Some(folder) = &cli.folder {
        convert_folder(&cli, folder)?;
        prompt.skip_first();
    }

    while let Some(folder) = prompt.next_folder().context("Failed to read folder location")? {
        convert_folder(&cli, &folder)?;
    }

    println!("Exiting...");
    Ok(())
}

/// Convert one folder. Only a failure to start or attach to Excel is
/// returned as an error; everything else is reported and the prompt goes on.
fn convert_folder(cli: &Cli, folder: &Path) -> Result<()> {
    let files = match discovery::find_workbooks(folder) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(());
        }
    };

    if files.is_empty() {
        eprintln!("Warning: No Excel files found in '{}'", folder.display());
        return Ok(());
    }

    let bridge = ExcelBridge::start(cli.bridge_config())
        .context("Failed to start or attach to Excel")?;

    let report = Converter::new(&bridge, cli.sheet.as_str()).convert_files(&files);

    if let Err(e) = bridge.shutdown() {
        tracing::warn!("Excel bridge did not shut down cleanly: {e}");
    }

    println!("{}: {report}", folder.display());
    if let Some(e) = &report.aborted {
        eprintln!("Error: stopped early: {e}");
    }

    Ok(())
}
