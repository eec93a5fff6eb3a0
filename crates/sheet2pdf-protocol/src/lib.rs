//! Shared protocol types for communication between the sheet2pdf client and
//! the Windows bridge process that drives Excel over COM.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! The client writes [`Request`]s to the bridge's stdin and reads exactly one
//! [`Response`] line back for each of them.

use serde::{Deserialize, Serialize};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM, then attach to a running Excel.Application or start one.
    Init { visible: bool },

    /// Open an existing workbook from a file path (as seen by the bridge).
    /// Returns a workbook handle.
    OpenWorkbook { path: String, update_links: bool },

    /// List the sheet names of an open workbook in tab order.
    ListSheets { workbook: u64 },

    /// Describe the used range of a sheet and the value of its first cell.
    SheetUsage { workbook: u64, sheet: String },

    /// Export a single sheet to a PDF file (path as seen by the bridge).
    ExportPdf {
        workbook: u64,
        sheet: String,
        path: String,
    },

    /// Close a workbook without saving.
    CloseWorkbook { workbook: u64 },

    /// Close the workbooks this bridge opened, restore Excel settings and quit
    /// Excel if the bridge started it.
    Shutdown,
}

/// A cell value read back from Excel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Error(CellError),
}

/// Excel error values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    pub code: String,
}

/// Extent of a sheet's used range plus the content of its top-left cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetUsage {
    pub rows: u32,
    pub columns: u32,
    pub first_cell: CellValue,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
///
/// Variants are untagged and told apart by their field names, so no two
/// variants may share the same set of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Result of `Init`: whether an already running Excel was reused.
    Session { attached: bool },
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
    /// Sheet names in tab order.
    Sheets { sheets: Vec<String> },
    /// Used range description of a sheet.
    Usage { usage: SheetUsage },
    /// Result of `Shutdown`: whether Excel itself was quit.
    Closed { quit: bool },
}

impl Response {
    pub fn ok(id: u64, data: Option<ResponseData>) -> Self {
        Self {
            id,
            result: ResponseResult::Ok { data },
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: ResponseResult::Error {
                message: message.into(),
            },
        }
    }
}

impl CellValue {
    /// A cell is blank when it holds nothing, `0`, `FALSE` or the empty
    /// string. Whitespace-only text counts as content.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Bool(b) => !b,
            CellValue::Number(n) => *n == 0.0,
            CellValue::String(s) => s.is_empty(),
            CellValue::Error(_) => false,
        }
    }
}

impl SheetUsage {
    /// True when the used range is the single cell A1 and that cell is blank.
    ///
    /// Excel reports a 1x1 used range for a sheet that was never written to,
    /// so this is how an untouched sheet looks from the outside.
    pub fn is_empty(&self) -> bool {
        self.rows <= 1 && self.columns <= 1 && self.first_cell.is_blank()
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = Request {
            id: 7,
            command: Command::ExportPdf {
                workbook: 3,
                sheet: "single page".to_string(),
                path: r"Z:\data\q1.pdf".to_string(),
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "cmd": "ExportPdf",
                "params": { "workbook": 3, "sheet": "single page", "path": "Z:\\data\\q1.pdf" }
            })
        );
    }

    #[test]
    fn test_unit_command_has_no_params() {
        let req = Request {
            id: 1,
            command: Command::Shutdown,
        };
        let line = serde_json::to_string(&req).unwrap();
        assert_eq!(line, r#"{"id":1,"cmd":"Shutdown"}"#);
        let back: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_ok_response_without_data_omits_field() {
        let line = serde_json::to_string(&Response::ok(4, None)).unwrap();
        assert_eq!(line, r#"{"id":4,"status":"ok"}"#);
    }

    #[test]
    fn test_error_response_parses() {
        let resp: Response =
            serde_json::from_str(r#"{"id":9,"status":"error","message":"boom"}"#).unwrap();
        assert_eq!(resp, Response::error(9, "boom"));
    }

    #[test]
    fn test_response_data_variants_are_distinguishable() {
        let cases = [
            ResponseData::Session { attached: true },
            ResponseData::WorkbookHandle { workbook: 2 },
            ResponseData::Sheets {
                sheets: vec!["Summary".to_string(), "single page".to_string()],
            },
            ResponseData::Usage {
                usage: SheetUsage {
                    rows: 12,
                    columns: 4,
                    first_cell: CellValue::String("Invoice".to_string()),
                },
            },
            ResponseData::Closed { quit: false },
        ];
        for data in cases {
            let line = serde_json::to_string(&Response::ok(1, Some(data.clone()))).unwrap();
            let back: Response = serde_json::from_str(&line).unwrap();
            assert_eq!(back.result, ResponseResult::Ok { data: Some(data) });
        }
    }

    #[test]
    fn test_blank_cells() {
        assert!(CellValue::Null.is_blank());
        assert!(CellValue::from("").is_blank());
        assert!(CellValue::from(0.0).is_blank());
        assert!(CellValue::from(false).is_blank());

        assert!(!CellValue::from("   ").is_blank());
        assert!(!CellValue::from("x").is_blank());
        assert!(!CellValue::from(-1.5).is_blank());
        assert!(!CellValue::from(true).is_blank());
        assert!(!CellValue::Error(CellError {
            code: "#N/A".to_string()
        })
        .is_blank());
    }

    #[test]
    fn test_sheet_usage_emptiness() {
        let untouched = SheetUsage {
            rows: 1,
            columns: 1,
            first_cell: CellValue::Null,
        };
        assert!(untouched.is_empty());

        let single_value = SheetUsage {
            rows: 1,
            columns: 1,
            first_cell: CellValue::Number(42.0),
        };
        assert!(!single_value.is_empty());

        let zero = SheetUsage {
            rows: 1,
            columns: 1,
            first_cell: CellValue::Number(0.0),
        };
        assert!(zero.is_empty());

        let spaces = SheetUsage {
            rows: 1,
            columns: 1,
            first_cell: CellValue::from("  "),
        };
        assert!(!spaces.is_empty());

        // A blank A1 does not make a larger range empty.
        let wide = SheetUsage {
            rows: 1,
            columns: 5,
            first_cell: CellValue::Null,
        };
        assert!(!wide.is_empty());
    }
}
