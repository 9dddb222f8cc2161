//! # pagestream
//!
//! Bounded-memory export of paginated datasets into multi-sheet Excel workbooks.
//!
//! ## Features
//!
//! - **Paged Fetching**: Pull pages from any data provider on a background task
//! - **Back-pressure**: A bounded queue holds the fetcher back, memory stays flat
//! - **Sheet Rollover**: New sheets (`Report`, `Report_1`, ...) once a row limit is hit
//! - **Column Layouts**: Ordered headers bound to record properties by name
//! - **All-or-nothing Output**: The destination is written only when the export succeeds
//! - **Typed Cells**: Numbers, booleans and text keep their type in the workbook
//!
//! ## Quick Start
//!
//! ### Exporting From a Paged Source
//!
//! ```rust,no_run
//! use pagestream::{impl_record, ColumnLayout, ExcelExporter, Page, PageRequest};
//! use std::convert::Infallible;
//!
//! #[derive(Clone)]
//! struct Order {
//!     id: i64,
//!     customer: String,
//!     total: f64,
//! }
//! impl_record!(Order { id, customer, total });
//!
//! # fn fetch_orders(offset: usize, limit: usize) -> Vec<Order> { Vec::new() }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ColumnLayout::builder()
//!     .column("Order", "id")
//!     .column("Customer", "customer")
//!     .column("Total", "total")
//!     .build()?;
//!
//! let file = std::fs::File::create("orders.xlsx")?;
//! let mut exporter = ExcelExporter::with_sheet_name(file, layout, "Orders");
//! exporter.set_max_rows_per_sheet(500_000)?;
//! exporter.open()?;
//!
//! let count = exporter.generate_report_from_data_provider(|request: PageRequest| {
//!     let orders = fetch_orders(request.offset(), request.size);
//!     let has_next = orders.len() == request.size;
//!     Ok::<_, Infallible>(Page::new(orders, has_next))
//! })?;
//! exporter.close();
//! println!("exported {} orders", count);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feeding Records Yourself
//!
//! ```rust,no_run
//! use pagestream::{CellValue, ColumnLayout, ExcelExporter};
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ColumnLayout::builder().column("Name", "name").build()?;
//! let mut exporter = ExcelExporter::new(Vec::new(), layout);
//! exporter.open()?;
//!
//! let producer = exporter.producer();
//! let feeder = std::thread::spawn(move || {
//!     for chunk in 0..10 {
//!         let rows = (0..100)
//!             .map(|i| HashMap::from([("name".to_string(), CellValue::from(format!("{}-{}", chunk, i)))]))
//!             .collect();
//!         producer.add_records(rows)?;
//!     }
//!     producer.close_data();
//!     Ok::<_, pagestream::ExportError>(())
//! });
//!
//! exporter.export()?;
//! feeder.join().unwrap()?;
//! exporter.close();
//! let bytes = exporter.into_inner();
//! # Ok(())
//! # }
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod exporter;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod sheet;
pub mod types;
pub mod xlsx;

pub use column::{ColumnDescriptor, ColumnLayout, ColumnLayoutBuilder};
pub use config::{Direction, ExportConfig, Sort};
pub use error::{BoxError, ExportError, Result};
pub use exporter::ExcelExporter;
pub use pipeline::{FetchPipeline, Page, PageRequest};
pub use queue::{RecordProducer, RecordQueue, SessionState};
pub use record::{PropertyAccessor, Record};
pub use sheet::{RowSink, SheetSummary, SheetWriter};
pub use types::CellValue;
pub use xlsx::XlsxWorkbook;
