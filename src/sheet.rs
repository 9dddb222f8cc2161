//! Sheet writer: header rows, queue draining and sheet rollover

use crate::column::ColumnLayout;
use crate::error::Result;
use crate::queue::RecordQueue;
use crate::record::{PropertyAccessor, Record};
use crate::types::CellValue;
use crate::xlsx::{EXCEL_MAX_ROWS, SHEET_NAME_ILLEGAL, SHEET_NAME_MAX_LEN};
use tracing::{debug, info};

/// Records taken from the queue per lock acquisition
const DRAIN_BATCH: usize = 100;
const PROGRESS_EVERY: usize = 100;

/// Destination for sheets and rows
pub trait RowSink {
    /// Start a new sheet; later rows go to it
    fn start_sheet(&mut self, name: &str) -> Result<()>;

    /// Append one row to the active sheet
    fn write_row(&mut self, cells: &[CellValue]) -> Result<()>;
}

/// Name and data-row count of a produced sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub name: String,
    pub data_rows: usize,
}

/// Turns queued records into rows, opening a new sheet whenever the active
/// one holds `max_rows` data rows and more records are waiting
pub struct SheetWriter {
    base_name: String,
    max_rows: usize,
    accessor: PropertyAccessor,
    header: Vec<CellValue>,
    row: Vec<CellValue>,
    sheets: Vec<SheetSummary>,
    total_rows: usize,
}

impl SheetWriter {
    /// `max_rows_per_sheet` counts data rows; it is capped so that header
    /// plus data never exceed the format's row limit
    pub fn new(layout: &ColumnLayout, base_name: &str, max_rows_per_sheet: usize) -> Self {
        SheetWriter {
            base_name: sanitize_sheet_name(base_name),
            max_rows: max_rows_per_sheet.clamp(1, EXCEL_MAX_ROWS - 1),
            accessor: PropertyAccessor::new(layout),
            header: layout.headers().map(CellValue::from).collect(),
            row: Vec::with_capacity(layout.len()),
            sheets: Vec::new(),
            total_rows: 0,
        }
    }

    /// Name of the sheet at `index`: the base name first, then `base_1`, `base_2`, ...
    pub fn sheet_name(&self, index: usize) -> String {
        if index == 0 {
            return self.base_name.clone();
        }
        let suffix = format!("_{}", index);
        let keep = SHEET_NAME_MAX_LEN.saturating_sub(suffix.len());
        let base: String = self.base_name.chars().take(keep).collect();
        format!("{}{}", base, suffix)
    }

    /// Start the next sheet and write its header row
    pub fn open_sheet<S: RowSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        let name = self.sheet_name(self.sheets.len());
        if !self.sheets.is_empty() {
            info!("Sheet row limit {} reached, continuing on '{}'", self.max_rows, name);
        }
        sink.start_sheet(&name)?;
        self.sheets.push(SheetSummary {
            name,
            data_rows: 0,
        });
        self.write_header(sink)
    }

    /// One row of header texts in column order
    pub fn write_header<S: RowSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        sink.write_row(&self.header)
    }

    /// Write every record currently queued, rolling over to new sheets as needed
    ///
    /// Never blocks on the queue. Returns the number of data rows written.
    pub fn drain<S, T>(&mut self, sink: &mut S, queue: &RecordQueue<T>) -> Result<usize>
    where
        S: RowSink + ?Sized,
        T: Record,
    {
        if self.sheets.is_empty() {
            self.open_sheet(sink)?;
        }

        let mut written = 0;
        loop {
            let room = self.max_rows - self.active_rows();
            if room == 0 {
                if queue.is_empty() {
                    break;
                }
                self.open_sheet(sink)?;
                continue;
            }

            let batch = queue.pop_batch(room.min(DRAIN_BATCH));
            if batch.is_empty() {
                break;
            }
            for record in &batch {
                self.write_record(sink, record)?;
                written += 1;
                if self.total_rows % PROGRESS_EVERY == 0 {
                    debug!(
                        "Writing data records {}, remaining in queue {}",
                        self.total_rows,
                        queue.len()
                    );
                }
            }
        }
        Ok(written)
    }

    fn write_record<S, T>(&mut self, sink: &mut S, record: &T) -> Result<()>
    where
        S: RowSink + ?Sized,
        T: Record,
    {
        self.accessor.read_row(record, &mut self.row)?;
        sink.write_row(&self.row)?;
        if let Some(active) = self.sheets.last_mut() {
            active.data_rows += 1;
        }
        self.total_rows += 1;
        Ok(())
    }

    /// Data rows on the active sheet
    pub fn active_rows(&self) -> usize {
        self.sheets.last().map_or(0, |s| s.data_rows)
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub(crate) fn set_max_rows(&mut self, max_rows_per_sheet: usize) {
        self.max_rows = max_rows_per_sheet.clamp(1, EXCEL_MAX_ROWS - 1);
    }

    pub fn sheets(&self) -> &[SheetSummary] {
        &self.sheets
    }
}

/// Replace characters Excel rejects in sheet names and cap the length
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'');
    if trimmed.is_empty() {
        return "Sheet".to_string();
    }
    trimmed.chars().take(SHEET_NAME_MAX_LEN).collect()
}
