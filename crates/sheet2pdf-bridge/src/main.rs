//! sheet2pdf bridge: a Windows process that drives Excel over COM, controlled
//! by JSON commands over stdin/stdout.
//!
//! Runs natively on Windows or under WINE on Linux.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes exactly one `Response` per request to stdout
//! - Logs go to stderr (never stdout)

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;
#[cfg_attr(not(windows), allow(dead_code))]
mod startup;

#[cfg(not(windows))]
fn main() {
    eprintln!("sheet2pdf-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run natively or under WINE.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead};

    use sheet2pdf_protocol::{Command, Request, Response, ResponseResult};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    tracing::info!("Bridge starting");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut session: Option<excel::ExcelSession> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, is_shutdown) = match serde_json::from_str::<Request>(line) {
            Ok(request) => (
                handle_command(&mut session, &request),
                matches!(request.command, Command::Shutdown),
            ),
            Err(e) => {
                tracing::error!(line, "JSON parse error: {e}");
                // id 0: the request could not be read far enough to know its id.
                (Response::error(0, format!("JSON parse error: {e}")), false)
            }
        };

        if let Err(e) = write_response(&mut out, &response) {
            tracing::error!("stdout write error: {e}");
            break;
        }

        if is_shutdown && matches!(response.result, ResponseResult::Ok { .. }) {
            tracing::info!("Shutdown complete");
            break;
        }
    }

    if let Some(session) = session.take() {
        tracing::warn!("stdin closed without Shutdown, releasing Excel");
        if let Err(e) = session.shutdown() {
            tracing::error!("Shutdown failed: {e}");
        }
        uninit_com();
    }

    tracing::info!("Bridge exiting");
}

#[cfg(windows)]
fn write_response(
    out: &mut impl std::io::Write,
    response: &sheet2pdf_protocol::Response,
) -> std::io::Result<()> {
    use std::io::Write;

    let json = serde_json::to_string(response)?;
    writeln!(out, "{json}")?;
    out.flush()
}

#[cfg(windows)]
fn handle_command(
    session: &mut Option<excel::ExcelSession>,
    request: &sheet2pdf_protocol::Request,
) -> sheet2pdf_protocol::Response {
    use sheet2pdf_protocol::*;

    let id = request.id;

    let result = match &request.command {
        Command::Init { visible } => init_com_and_excel(session, *visible),
        Command::OpenWorkbook { path, update_links } => with_session(session, |s| {
            let handle = s.open_workbook(path, *update_links)?;
            Ok(Some(ResponseData::WorkbookHandle { workbook: handle }))
        }),
        Command::ListSheets { workbook } => with_session(session, |s| {
            let sheets = s.sheet_names(*workbook)?;
            Ok(Some(ResponseData::Sheets { sheets }))
        }),
        Command::SheetUsage { workbook, sheet } => with_session(session, |s| {
            let usage = s.sheet_usage(*workbook, sheet)?;
            Ok(Some(ResponseData::Usage { usage }))
        }),
        Command::ExportPdf {
            workbook,
            sheet,
            path,
        } => with_session(session, |s| {
            s.export_pdf(*workbook, sheet, path)?;
            Ok(None)
        }),
        Command::CloseWorkbook { workbook } => with_session(session, |s| {
            s.close_workbook(*workbook)?;
            Ok(None)
        }),
        Command::Shutdown => match session.take() {
            Some(s) => match s.shutdown() {
                Ok(quit) => {
                    uninit_com();
                    ResponseResult::Ok {
                        data: Some(ResponseData::Closed { quit }),
                    }
                }
                Err(e) => ResponseResult::Error {
                    message: format!("Shutdown failed: {e}"),
                },
            },
            None => ResponseResult::Ok {
                data: Some(ResponseData::Closed { quit: false }),
            },
        },
    };

    if let ResponseResult::Error { message } = &result {
        tracing::warn!(id, "Command failed: {message}");
    }

    Response { id, result }
}

#[cfg(windows)]
fn init_com_and_excel(
    session: &mut Option<excel::ExcelSession>,
    visible: bool,
) -> sheet2pdf_protocol::ResponseResult {
    use sheet2pdf_protocol::{ResponseData, ResponseResult};
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if let Some(existing) = session.as_ref() {
        return ResponseResult::Ok {
            data: Some(ResponseData::Session {
                attached: existing.attached(),
            }),
        };
    }

    // Excel requires a single-threaded apartment.
    unsafe {
        if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
            return ResponseResult::Error {
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }
    tracing::debug!("COM initialized (STA)");

    match excel::ExcelSession::start(visible) {
        Ok(s) => {
            let attached = s.attached();
            *session = Some(s);
            ResponseResult::Ok {
                data: Some(ResponseData::Session { attached }),
            }
        }
        Err(e) => {
            uninit_com();
            ResponseResult::Error {
                message: format!("Failed to start or attach to Excel.Application: {e}"),
            }
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    tracing::debug!("COM uninitialized");
}

#[cfg(windows)]
fn with_session(
    session: &mut Option<excel::ExcelSession>,
    f: impl FnOnce(
        &mut excel::ExcelSession,
    ) -> Result<Option<sheet2pdf_protocol::ResponseData>, String>,
) -> sheet2pdf_protocol::ResponseResult {
    use sheet2pdf_protocol::ResponseResult;

    match session.as_mut() {
        Some(s) => match f(s) {
            Ok(data) => ResponseResult::Ok { data },
            Err(message) => ResponseResult::Error { message },
        },
        None => ResponseResult::Error {
            message: "Excel not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
