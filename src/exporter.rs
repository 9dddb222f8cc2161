//! Export coordinator: session lifecycle, the writer loop and the combined
//! fetch-and-export entry point

use crate::column::ColumnLayout;
use crate::config::ExportConfig;
use crate::error::{BoxError, ExportError, Result};
use crate::pipeline::{is_rejected_by_writer, FetchPipeline, Page, PageRequest};
use crate::queue::{RecordProducer, RecordQueue, SessionState};
use crate::record::Record;
use crate::sheet::{SheetSummary, SheetWriter};
use crate::xlsx::XlsxWorkbook;
use std::any::Any;
use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Streams records into a multi-sheet workbook written to `W`
///
/// Records are queued by a producer (usually the fetch task started by
/// [`generate_report_from_data_provider`](Self::generate_report_from_data_provider))
/// while [`export`](Self::export) drains them into rows on the calling thread.
/// The destination only receives bytes once, at the end of a successful export.
///
/// # Examples
///
/// ```no_run
/// use pagestream::{impl_record, ColumnLayout, ExcelExporter, Page, PageRequest};
/// use std::convert::Infallible;
///
/// #[derive(Clone)]
/// struct User {
///     id: i64,
///     name: String,
/// }
/// impl_record!(User { id, name });
///
/// # fn main() -> pagestream::Result<()> {
/// let users: Vec<User> = (0..10_000)
///     .map(|id| User { id, name: format!("user {}", id) })
///     .collect();
///
/// let layout = ColumnLayout::builder()
///     .column("Id", "id")
///     .column("Name", "name")
///     .build()?;
/// let file = std::fs::File::create("users.xlsx")?;
///
/// let mut exporter = ExcelExporter::with_sheet_name(file, layout, "Users");
/// exporter.open()?;
/// let count = exporter.generate_report_from_data_provider(|request: PageRequest| {
///     Ok::<_, Infallible>(Page::paginate(&users, &request))
/// })?;
/// exporter.close();
/// assert_eq!(count, 10_000);
/// # Ok(())
/// # }
/// ```
pub struct ExcelExporter<T, W: Write> {
    destination: W,
    layout: ColumnLayout,
    config: ExportConfig,
    queue: Arc<RecordQueue<T>>,
    workbook: Option<XlsxWorkbook>,
    writer: Option<SheetWriter>,
}

impl<T, W: Write> ExcelExporter<T, W> {
    /// Exporter with default limits and the sheet name "Report"
    pub fn new(destination: W, layout: ColumnLayout) -> Self {
        Self::build(destination, layout, ExportConfig::default())
    }

    pub fn with_sheet_name(destination: W, layout: ColumnLayout, sheet_name: &str) -> Self {
        Self::build(
            destination,
            layout,
            ExportConfig::default().with_sheet_name(sheet_name),
        )
    }

    /// Exporter with explicit limits; the configuration is validated
    pub fn with_config(destination: W, layout: ColumnLayout, config: ExportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(destination, layout, config))
    }

    fn build(destination: W, layout: ColumnLayout, config: ExportConfig) -> Self {
        ExcelExporter {
            destination,
            layout,
            queue: Arc::new(RecordQueue::new(config.max_queue_size)),
            config,
            workbook: None,
            writer: None,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn state(&self) -> SessionState {
        self.queue.state()
    }

    /// Records waiting to be written
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_end_of_data(&self) -> bool {
        self.queue.is_end_of_data()
    }

    pub fn is_writing_completed(&self) -> bool {
        self.queue.is_writing_completed()
    }

    /// Sheets produced by the current (or last) session
    pub fn sheets(&self) -> &[SheetSummary] {
        self.writer.as_ref().map_or(&[], |w| w.sheets())
    }

    pub fn destination(&self) -> &W {
        &self.destination
    }

    pub fn into_inner(self) -> W {
        self.destination
    }

    fn ensure_configurable(&self, what: &str) -> Result<()> {
        match self.queue.state() {
            SessionState::Closed | SessionState::Open => Ok(()),
            state => Err(ExportError::conflict(format!(
                "cannot change {} once export has started (state {:?})",
                what, state
            ))),
        }
    }

    pub fn set_max_rows_per_sheet(&mut self, rows: usize) -> Result<()> {
        self.ensure_configurable("max_rows_per_sheet")?;
        let config = self.config.clone().with_max_rows_per_sheet(rows);
        config.validate()?;
        self.config = config;
        if let Some(writer) = self.writer.as_mut() {
            writer.set_max_rows(rows);
        }
        Ok(())
    }

    pub fn set_max_queue_size(&mut self, size: usize) -> Result<()> {
        self.ensure_configurable("max_queue_size")?;
        let config = self.config.clone().with_max_queue_size(size);
        config.validate()?;
        self.config = config;
        self.queue.set_max_size(size);
        Ok(())
    }

    pub fn set_data_fetch_size(&mut self, size: usize) -> Result<()> {
        self.ensure_configurable("data_fetch_size")?;
        let config = self.config.clone().with_data_fetch_size(size);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_data_wait_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_configurable("data_wait_timeout")?;
        self.config = self.config.clone().with_data_wait_timeout(timeout);
        Ok(())
    }

    /// Handle for queuing records from another thread
    pub fn producer(&self) -> RecordProducer<T> {
        RecordProducer::new(Arc::clone(&self.queue))
    }

    /// Queue records; more will follow
    pub fn add_records(&self, records: Vec<T>) -> Result<()> {
        self.queue.add_records(records, false)
    }

    /// Queue records, signalling end-of-data when `is_end_of_data` is set
    pub fn add_records_final(&self, records: Vec<T>, is_end_of_data: bool) -> Result<()> {
        self.queue.add_records(records, is_end_of_data)
    }

    /// No more records will be added
    pub fn close_data(&self) {
        self.queue.close_data()
    }

    /// Create the workbook and the first sheet with its header
    ///
    /// Does nothing if the session is already open.
    pub fn open(&mut self) -> Result<()> {
        if self.queue.state() != SessionState::Closed {
            debug!("Exporter already open");
            return Ok(());
        }

        let mut workbook = XlsxWorkbook::new()
            .map_err(|e| ExportError::conflict_with("Failed to create workbook", e))?;
        let mut writer = SheetWriter::new(
            &self.layout,
            &self.config.sheet_name,
            self.config.max_rows_per_sheet,
        );
        writer
            .open_sheet(&mut workbook)
            .map_err(|e| ExportError::conflict_with("Failed to create sheet", e))?;

        self.queue.set_max_size(self.config.max_queue_size);
        self.workbook = Some(workbook);
        self.writer = Some(writer);
        self.queue.open();
        Ok(())
    }

    /// Drain queued records into the workbook until end-of-data, then write
    /// the finished workbook to the destination
    ///
    /// Waits up to `data_wait_timeout` for the first record or end-of-data
    /// and fails with [`ExportError::Timeout`] otherwise. I/O failures are
    /// reported as [`ExportError::Conflict`]. Writing is marked completed
    /// whatever the outcome.
    pub fn export(&mut self) -> Result<()>
    where
        T: Record,
    {
        self.queue.begin_export()?;
        let _unwinding = WritingFailedGuard(Arc::clone(&self.queue));
        let result = self.run_export();
        if let Err(e) = &result {
            error!("Export failed: {}", e);
        }
        self.queue.finish_writing(result.is_ok());
        result
    }

    fn run_export(&mut self) -> Result<()>
    where
        T: Record,
    {
        let ExcelExporter {
            destination,
            config,
            queue,
            workbook,
            writer,
            ..
        } = self;
        let (Some(workbook), Some(writer)) = (workbook.as_mut(), writer.as_mut()) else {
            return Err(ExportError::NotOpen(
                "call open() before attempting to export".to_string(),
            ));
        };

        let timeout = config.data_wait_timeout();
        info!(
            "Waiting for initial records to write ... {} sec remaining.",
            timeout.as_secs()
        );
        if !queue.wait_for_data(timeout) {
            return Err(ExportError::Timeout {
                waited_ms: config.data_wait_timeout_ms,
            });
        }

        loop {
            writer.drain(workbook, queue).map_err(wrap_io)?;
            if !queue.wait_for_records() {
                break;
            }
        }

        if queue.is_producer_failed() {
            return Err(ExportError::conflict(
                "Data feed failed; report discarded",
            ));
        }

        info!(
            "Writing workbook to stream: {} rows on {} sheet(s)",
            writer.total_rows(),
            writer.sheets().len()
        );
        let bytes = workbook
            .write_to(destination)
            .map_err(|e| ExportError::conflict_with("Failure during export", e))?;
        debug!("Wrote {} bytes", bytes);
        Ok(())
    }

    /// Wait for the data feed and the writer to finish, then release the workbook
    ///
    /// A session that is not open is left untouched. Release errors are
    /// logged, not returned.
    pub fn close(&mut self) {
        if self.queue.state() == SessionState::Closed {
            warn!("Exporter already closed! nothing to do.");
            return;
        }

        info!("Closing exporter after all pending records are written.");
        self.queue.wait_until_finished();

        if let Some(workbook) = self.workbook.take() {
            if let Err(e) = workbook.dispose() {
                error!("Unexpected error releasing workbook: {}", e);
            }
        }
        self.queue.reset_closed();
    }
}

impl<T: Record + Send, W: Write> ExcelExporter<T, W> {
    /// Fetch every page from `provider` on a background task while exporting
    /// on the calling thread
    ///
    /// Returns the number of records fetched. A fetch failure is returned in
    /// preference to an export failure.
    pub fn generate_report_from_data_provider<P, E>(&mut self, provider: P) -> Result<usize>
    where
        P: FnMut(PageRequest) -> std::result::Result<Page<T>, E> + Send,
        E: Into<BoxError>,
    {
        self.run_with_fetch(provider, Ok::<T, Infallible>)
    }

    /// Like [`generate_report_from_data_provider`](Self::generate_report_from_data_provider),
    /// converting each provider element with `mapper`
    pub fn generate_report_from_data_provider_with_mapper<D, P, E, M>(
        &mut self,
        provider: P,
        mut mapper: M,
    ) -> Result<usize>
    where
        P: FnMut(PageRequest) -> std::result::Result<Page<D>, E> + Send,
        E: Into<BoxError>,
        M: FnMut(D) -> T + Send,
    {
        self.run_with_fetch(provider, move |item| Ok::<T, Infallible>(mapper(item)))
    }

    /// Like [`generate_report_from_data_provider_with_mapper`](Self::generate_report_from_data_provider_with_mapper)
    /// for mappers that can fail; a mapping error aborts the report
    pub fn generate_report_from_data_provider_with_try_mapper<D, P, E, M, ME>(
        &mut self,
        provider: P,
        mapper: M,
    ) -> Result<usize>
    where
        P: FnMut(PageRequest) -> std::result::Result<Page<D>, E> + Send,
        E: Into<BoxError>,
        M: FnMut(D) -> std::result::Result<T, ME> + Send,
        ME: Into<BoxError>,
    {
        self.run_with_fetch(provider, mapper)
    }

    fn run_with_fetch<D, P, E, M, ME>(&mut self, provider: P, mapper: M) -> Result<usize>
    where
        P: FnMut(PageRequest) -> std::result::Result<Page<D>, E> + Send,
        E: Into<BoxError>,
        M: FnMut(D) -> std::result::Result<T, ME> + Send,
        ME: Into<BoxError>,
    {
        let queue = Arc::clone(&self.queue);
        let fetch_size = self.config.data_fetch_size;
        let sort = self.config.sort.clone();

        thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("pagestream-fetch".to_string())
                .spawn_scoped(scope, move || {
                    FetchPipeline::new(&queue, fetch_size, sort).run(provider, mapper)
                });
            let fetch = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    self.queue.abort();
                    return Err(ExportError::conflict_with(
                        "Failed to start data fetch task",
                        e,
                    ));
                }
            };

            let exported = self.export();
            let fetched = fetch.join().unwrap_or_else(|panic| {
                Err(ExportError::conflict(format!(
                    "Data fetch task panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

            match (exported, fetched) {
                (Ok(()), Ok(count)) => {
                    info!("Report generated for {} records", count);
                    Ok(count)
                }
                (Err(export_err), Err(fetch_err)) if is_rejected_by_writer(&fetch_err) => {
                    Err(export_err)
                }
                (_, Err(fetch_err)) => {
                    error!("Report generation failed: {}", fetch_err);
                    Err(fetch_err)
                }
                (Err(export_err), Ok(_)) => Err(export_err),
            }
        })
    }
}

/// Marks writing failed if `export()` unwinds, releasing blocked producers
struct WritingFailedGuard<T>(Arc<RecordQueue<T>>);

impl<T> Drop for WritingFailedGuard<T> {
    fn drop(&mut self) {
        // no effect once writing has already finished
        self.0.finish_writing(false);
    }
}

fn wrap_io(err: ExportError) -> ExportError {
    match err {
        ExportError::Io(io) => ExportError::conflict_with("Failure during export", io),
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
