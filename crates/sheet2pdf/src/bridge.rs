//! Subprocess management and JSON IPC for the Excel bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sheet2pdf_protocol::{
    Command as BridgeCommand, Request, Response, ResponseData, ResponseResult, SheetUsage,
};

use crate::workbook::Automation;

/// File name of the Windows bridge executable.
pub const BRIDGE_EXE_NAME: &str = "sheet2pdf-bridge.exe";

/// Errors from the Excel bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("Excel error: {0}")]
    Remote(String),

    #[error("Unexpected response data for {0}")]
    UnexpectedResponse(&'static str),

    #[error("Launcher '{0}' not found. Install WINE and ensure it is in PATH.")]
    LauncherNotFound(String),

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

impl BridgeError {
    /// True when the channel to the bridge is broken, so every further
    /// command would fail the same way.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::SpawnFailed(_)
                | BridgeError::NotRunning
                | BridgeError::SendFailed(_)
                | BridgeError::ReadFailed(_)
                | BridgeError::JsonError(_)
                | BridgeError::IdMismatch { .. }
        )
    }
}

/// Configuration for starting the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to `sheet2pdf-bridge.exe`. When `None`, common locations relative
    /// to the current binary and the build directory are searched.
    pub bridge_exe_path: Option<PathBuf>,

    /// Program used to run the bridge, normally `wine`. `None` runs the
    /// executable directly (native Windows). When a launcher is set, paths
    /// sent to the bridge are translated to WINE drive paths.
    pub launcher: Option<PathBuf>,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,

    /// Show the Excel window while converting.
    pub visible: bool,

    /// Refresh external links when opening workbooks.
    pub update_links: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            launcher: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
            visible: true,
            update_links: true,
        }
    }
}

struct Channel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A running bridge process with an initialized Excel session.
///
/// Dropping the bridge without calling [`shutdown`](Self::shutdown) still
/// asks it to shut down, so Excel is never left with our workbooks open.
pub struct ExcelBridge {
    child: Mutex<Child>,
    /// `None` once stdin has been closed at shutdown.
    channel: Mutex<Option<Channel>>,
    next_id: AtomicU64,
    attached: bool,
    wine_paths: bool,
    update_links: bool,
    shut_down: bool,
}

impl ExcelBridge {
    /// Start the bridge process and attach to (or launch) Excel.
    pub fn start(config: BridgeConfig) -> Result<Self, BridgeError> {
        let exe_path = config.bridge_exe_path.unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = match &config.launcher {
            Some(launcher) => {
                let mut cmd = std::process::Command::new(launcher);
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };

        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge logs go to our stderr

        tracing::info!("Starting bridge: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                match &config.launcher {
                    Some(launcher) => BridgeError::LauncherNotFound(launcher.display().to_string()),
                    None => BridgeError::BridgeExeNotFound(exe_path.display().to_string()),
                }
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };

        let mut bridge = Self {
            child: Mutex::new(child),
            channel: Mutex::new(Some(Channel {
                stdin,
                stdout: BufReader::new(stdout),
            })),
            next_id: AtomicU64::new(1),
            attached: false,
            wine_paths: config.launcher.is_some(),
            update_links: config.update_links,
            shut_down: false,
        };

        let data = bridge.send_command(BridgeCommand::Init {
            visible: config.visible,
        })?;
        bridge.attached = match data {
            Some(ResponseData::Session { attached }) => attached,
            _ => return Err(BridgeError::UnexpectedResponse("Init")),
        };

        if bridge.attached {
            tracing::info!("Attached to running Excel instance");
        } else {
            tracing::info!("Started new Excel instance");
        }

        Ok(bridge)
    }

    /// Whether Excel was already running when the bridge started. An
    /// attached Excel is left running at shutdown.
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// Path as the bridge process sees it.
    pub fn bridge_path(&self, path: &Path) -> String {
        to_bridge_path(path, self.wine_paths)
    }

    /// Shut down the bridge: close open workbooks, quit Excel if we started
    /// it, and wait for the process to exit.
    pub fn shutdown(mut self) -> Result<(), BridgeError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), BridgeError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let result = self.send_command(BridgeCommand::Shutdown);

        // Closing stdin lets the bridge exit even if Shutdown failed.
        lock(&self.channel).take();
        let mut child = lock(&self.child);
        let _ = child.wait();

        match result? {
            Some(ResponseData::Closed { quit: true }) => tracing::info!("Closed Excel instance"),
            Some(ResponseData::Closed { quit: false }) => {
                tracing::info!("Left Excel running")
            }
            _ => {}
        }
        Ok(())
    }

    /// Send a command to the bridge and wait for the response.
    fn send_command(&self, command: BridgeCommand) -> Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;
        tracing::trace!("-> {json}");

        let mut guard = lock(&self.channel);
        let channel = guard.as_mut().ok_or(BridgeError::NotRunning)?;

        writeln!(channel.stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        channel
            .stdin
            .flush()
            .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        let mut line = String::new();
        channel
            .stdout
            .read_line(&mut line)
            .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;

        if line.is_empty() {
            return Err(BridgeError::NotRunning);
        }
        tracing::trace!("<- {}", line.trim_end());

        let response: Response = serde_json::from_str(&line)?;

        match response.result {
            // id 0 marks a request the bridge could not parse.
            ResponseResult::Error { message } if response.id == id || response.id == 0 => {
                Err(BridgeError::Remote(message))
            }
            ResponseResult::Ok { data } if response.id == id => Ok(data),
            _ => Err(BridgeError::IdMismatch {
                expected: id,
                got: response.id,
            }),
        }
    }
}

impl Automation for ExcelBridge {
    fn open(&self, path: &Path) -> Result<u64, BridgeError> {
        let data = self.send_command(BridgeCommand::OpenWorkbook {
            path: self.bridge_path(path),
            update_links: self.update_links,
        })?;
        match data {
            Some(ResponseData::WorkbookHandle { workbook }) => Ok(workbook),
            _ => Err(BridgeError::UnexpectedResponse("OpenWorkbook")),
        }
    }

    fn sheet_names(&self, workbook: u64) -> Result<Vec<String>, BridgeError> {
        match self.send_command(BridgeCommand::ListSheets { workbook })? {
            Some(ResponseData::Sheets { sheets }) => Ok(sheets),
            _ => Err(BridgeError::UnexpectedResponse("ListSheets")),
        }
    }

    fn sheet_usage(&self, workbook: u64, sheet: &str) -> Result<SheetUsage, BridgeError> {
        let data = self.send_command(BridgeCommand::SheetUsage {
            workbook,
            sheet: sheet.to_string(),
        })?;
        match data {
            Some(ResponseData::Usage { usage }) => Ok(usage),
            _ => Err(BridgeError::UnexpectedResponse("SheetUsage")),
        }
    }

    fn export_pdf(&self, workbook: u64, sheet: &str, pdf: &Path) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::ExportPdf {
            workbook,
            sheet: sheet.to_string(),
            path: self.bridge_path(pdf),
        })?;
        Ok(())
    }

    fn close(&self, workbook: u64) -> Result<(), BridgeError> {
        self.send_command(BridgeCommand::CloseWorkbook { workbook })?;
        Ok(())
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            tracing::warn!("Bridge shutdown on drop failed: {e}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
/// Relative paths are resolved against the current directory first.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    format!("Z:{}", absolute(linux_path).display()).replace('/', "\\")
}

/// Excel resolves relative paths against its own working directory, so
/// everything sent to the bridge is made absolute against ours.
fn to_bridge_path(path: &Path, wine_paths: bool) -> String {
    if wine_paths {
        linux_to_wine_path(path)
    } else {
        absolute(path).display().to_string()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

/// Locate the bridge exe next to the current executable or in the build tree.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join(BRIDGE_EXE_NAME);
        if candidate.exists() {
            return candidate;
        }
    }

    let build_dirs = [
        "target/x86_64-pc-windows-gnu/release",
        "target/x86_64-pc-windows-gnu/debug",
        "target/release",
        "target/debug",
    ];
    for dir in build_dirs {
        let candidate = Path::new(dir).join(BRIDGE_EXE_NAME);
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from(BRIDGE_EXE_NAME)
}
