//! Minimal streaming XLSX encoder
//!
//! Rows are serialized as SpreadsheetML straight into a deflated ZIP entry
//! spooled to a temp file; the finished archive is copied to the caller's
//! destination in one pass.

pub mod workbook;
pub mod xml_writer;

pub use workbook::XlsxWorkbook;
pub use xml_writer::XmlWriter;

/// Maximum rows a worksheet can hold, header included
pub const EXCEL_MAX_ROWS: usize = 1_048_576;
/// Maximum sheet name length
pub const SHEET_NAME_MAX_LEN: usize = 31;
/// Characters not allowed in sheet names
pub const SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];
