//! Integration tests against a real Excel through the bridge process.
//!
//! These need Excel installed (natively or in a WINE prefix) and a built
//! bridge executable:
//!
//!   cargo build --target x86_64-pc-windows-gnu --release \
//!       --manifest-path crates/sheet2pdf-bridge/Cargo.toml
//!   export SHEET2PDF_BRIDGE=crates/sheet2pdf-bridge/target/x86_64-pc-windows-gnu/release/sheet2pdf-bridge.exe
//!
//! Without `SHEET2PDF_BRIDGE` pointing at an existing file, all tests are skipped.

use std::path::PathBuf;

use sheet2pdf::{Automation, BridgeConfig, BridgeError, Converter, ExcelBridge, FileOutcome};

fn bridge_exe() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os("SHEET2PDF_BRIDGE")?);
    path.exists().then_some(path)
}

macro_rules! skip_if_no_bridge {
    () => {
        match bridge_exe() {
            Some(exe) => exe,
            None => {
                eprintln!(
                    "SKIP: set SHEET2PDF_BRIDGE to a built sheet2pdf-bridge.exe to run Excel tests"
                );
                return;
            }
        }
    };
}

fn start(exe: PathBuf) -> ExcelBridge {
    ExcelBridge::start(BridgeConfig {
        bridge_exe_path: Some(exe),
        visible: false,
        ..Default::default()
    })
    .expect("start bridge")
}

#[test]
fn test_start_and_shutdown() {
    let exe = skip_if_no_bridge!();
    let bridge = start(exe);
    eprintln!("attached to running Excel: {}", bridge.attached());
    bridge.shutdown().expect("shutdown");
}

#[test]
fn test_open_missing_workbook_is_remote_error() {
    let exe = skip_if_no_bridge!();
    let dir = tempfile::tempdir().unwrap();
    let bridge = start(exe);

    match bridge.open(&dir.path().join("missing.xlsx")) {
        Err(BridgeError::Remote(message)) => eprintln!("Excel said: {message}"),
        Err(e) => panic!("expected a remote error, got {e}"),
        Ok(handle) => panic!("opened a missing workbook as handle {handle}"),
    }

    // The bridge still answers after a failed command.
    match bridge.sheet_names(u64::MAX) {
        Err(BridgeError::Remote(message)) => assert!(message.contains("Unknown workbook handle")),
        Err(e) => panic!("expected a remote error, got {e}"),
        Ok(sheets) => panic!("listed sheets {sheets:?} for a handle never issued"),
    }

    bridge.shutdown().expect("shutdown");
}

#[test]
fn test_unreadable_file_fails_without_aborting() {
    let exe = skip_if_no_bridge!();
    let dir = tempfile::tempdir().unwrap();
    let junk = dir.path().join("junk.xlsx");
    std::fs::write(&junk, b"this is not a workbook").unwrap();

    let bridge = start(exe);
    let report = Converter::new(&bridge, "single page").convert_files(&[junk.clone()]);

    assert!(report.aborted.is_none());
    assert!(matches!(report.outcome(&junk), Some(FileOutcome::Failed(_))));
    bridge.shutdown().expect("shutdown");
}
