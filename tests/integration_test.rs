//! Integration tests for pagestream

mod common;

use common::{init_tracing, read_entry, read_sheets};
use pagestream::{
    impl_record, ColumnLayout, ExcelExporter, ExportConfig, ExportError, Page, PageRequest,
    SessionState, Sort,
};
use std::convert::Infallible;
use std::error::Error as _;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct User {
    id: i64,
    name: String,
    active: bool,
}

impl_record!(User { id, name, active });

fn users(count: i64) -> Vec<User> {
    (0..count)
        .map(|id| User {
            id,
            name: format!("user {}", id),
            active: id % 2 == 0,
        })
        .collect()
}

fn layout() -> ColumnLayout {
    ColumnLayout::builder()
        .column("Id", "id")
        .column("Name", "name")
        .column("Active", "active")
        .build()
        .unwrap()
}

fn exporter(config: ExportConfig) -> ExcelExporter<User, Vec<u8>> {
    ExcelExporter::with_config(Vec::new(), layout(), config).unwrap()
}

#[test]
fn test_single_sheet_export() {
    init_tracing();
    let mut exporter = exporter(ExportConfig::new().with_max_rows_per_sheet(1000));
    exporter.open().unwrap();
    exporter.add_records_final(users(10), true).unwrap();
    exporter.export().unwrap();
    assert_eq!(exporter.state(), SessionState::Completed);
    exporter.close();

    let bytes = exporter.into_inner();
    let sheets = read_sheets(&bytes);
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "Report");
    assert_eq!(sheets[0].row_count(), 11);
    assert!(sheets[0].xml.contains("<t>Id</t>"));
    assert!(sheets[0].xml.contains("<t>user 9</t>"));
}

#[test]
fn test_rollover_across_sheets() {
    init_tracing();
    let mut exporter = exporter(ExportConfig::new().with_max_rows_per_sheet(5));
    exporter.open().unwrap();
    exporter.add_records_final(users(12), true).unwrap();
    exporter.export().unwrap();

    let summary: Vec<_> = exporter
        .sheets()
        .iter()
        .map(|s| (s.name.clone(), s.data_rows))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Report".to_string(), 5),
            ("Report_1".to_string(), 5),
            ("Report_2".to_string(), 2)
        ]
    );
    exporter.close();

    let sheets = read_sheets(&exporter.into_inner());
    let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Report", "Report_1", "Report_2"]);
    let counts: Vec<_> = sheets.iter().map(|s| s.data_rows()).collect();
    assert_eq!(counts, vec![5, 5, 2]);
    for sheet in &sheets {
        assert!(sheet.xml.contains("<row r=\"1\"><c r=\"A1\" t=\"inlineStr\"><is><t>Id</t>"));
    }
    assert!(sheets[2].xml.contains("<c r=\"A2\"><v>10</v></c>"));
}

#[test]
fn test_timeout_without_records() {
    init_tracing();
    let mut exporter =
        exporter(ExportConfig::new().with_data_wait_timeout(Duration::from_millis(100)));
    exporter.open().unwrap();

    let start = Instant::now();
    let err = exporter.export().unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(200), "waited {elapsed:?}");
    assert_eq!(exporter.state(), SessionState::Failed);

    exporter.close_data();
    exporter.close();
    assert_eq!(exporter.state(), SessionState::Closed);
    assert!(exporter.destination().is_empty());
}

#[test]
fn test_add_after_close_data_rejected() {
    let mut exporter = exporter(ExportConfig::new());
    exporter.open().unwrap();
    exporter.add_records(users(2)).unwrap();
    exporter.close_data();
    exporter.close_data();

    let err = exporter.add_records(users(3)).unwrap_err();
    assert!(matches!(err, ExportError::ClosedForWrites));
    assert_eq!(exporter.queued(), 2);

    exporter.export().unwrap();
    exporter.close();
}

#[test]
fn test_add_before_open_rejected() {
    let exporter = exporter(ExportConfig::new());
    let err = exporter.add_records(users(1)).unwrap_err();
    assert!(matches!(err, ExportError::NotOpen(_)));
}

#[test]
fn test_empty_first_page_is_conflict() {
    init_tracing();
    let mut exporter = exporter(ExportConfig::new());
    exporter.open().unwrap();

    let err = exporter
        .generate_report_from_data_provider(|_| Ok::<_, Infallible>(Page::<User>::empty()))
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.to_string(), "No data found to generate report.");
    assert_eq!(exporter.sheets().len(), 1);
    assert_eq!(exporter.sheets()[0].data_rows, 0);
    exporter.close();
    assert!(exporter.into_inner().is_empty());
}

#[test]
fn test_generate_report_from_pages() {
    init_tracing();
    let data = users(2_345);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    let config = ExportConfig::new()
        .with_max_rows_per_sheet(1_000)
        .with_max_queue_size(150)
        .with_data_fetch_size(100)
        .with_sheet_name("Users")
        .with_sort(Sort::by(["id"]));
    let mut exporter = exporter(config);
    exporter.open().unwrap();

    let count = exporter
        .generate_report_from_data_provider(move |request: PageRequest| {
            seen.lock().unwrap().push(request.clone());
            Ok::<_, Infallible>(Page::paginate(&data, &request))
        })
        .unwrap();
    assert_eq!(count, 2_345);
    exporter.close();

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 24);
    assert!(requests.iter().all(|r| r.size == 100 && r.sort == Sort::by(["id"])));

    let sheets = read_sheets(&exporter.into_inner());
    let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Users", "Users_1", "Users_2"]);
    let counts: Vec<_> = sheets.iter().map(|s| s.data_rows()).collect();
    assert_eq!(counts, vec![1_000, 1_000, 345]);
    assert!(sheets[1].xml.contains("<c r=\"A2\"><v>1000</v></c>"));
    assert!(sheets[2].xml.contains("<c r=\"A346\"><v>2344</v></c>"));
}

#[test]
fn test_generate_report_with_mapper() {
    let rows: Vec<(i64, &str)> = vec![(1, "ada"), (2, "grace"), (3, "linus")];
    let mut exporter = exporter(ExportConfig::new().with_data_fetch_size(2));
    exporter.open().unwrap();

    let count = exporter
        .generate_report_from_data_provider_with_mapper(
            |request: PageRequest| Ok::<_, Infallible>(Page::paginate(&rows, &request)),
            |(id, name): (i64, &str)| User {
                id,
                name: name.to_uppercase(),
                active: true,
            },
        )
        .unwrap();
    assert_eq!(count, 3);
    exporter.close();

    let sheets = read_sheets(&exporter.into_inner());
    assert_eq!(sheets[0].data_rows(), 3);
    assert!(sheets[0].xml.contains("<t>GRACE</t>"));
    assert!(sheets[0].xml.contains("<c r=\"C2\" t=\"b\"><v>1</v></c>"));
}

#[test]
fn test_try_mapper_failure_is_conflict() {
    let mut exporter = exporter(ExportConfig::new());
    exporter.open().unwrap();

    let err = exporter
        .generate_report_from_data_provider_with_try_mapper(
            |_| Ok::<_, Infallible>(Page::last(vec!["1", "two"])),
            |raw: &str| {
                raw.parse::<i64>().map(|id| User {
                    id,
                    name: raw.to_string(),
                    active: false,
                })
            },
        )
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.to_string(), "Failed to map data");
    exporter.close();
    assert!(exporter.into_inner().is_empty());
}

#[test]
fn test_provider_error_wins_and_nothing_written() {
    init_tracing();
    let data = users(50);
    let mut exporter = exporter(ExportConfig::new().with_data_fetch_size(10));
    exporter.open().unwrap();

    let err = exporter
        .generate_report_from_data_provider(|request: PageRequest| {
            if request.page == 3 {
                Err("database connection lost")
            } else {
                Ok(Page::paginate(&data, &request))
            }
        })
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.to_string(), "Failed to provide data");
    assert_eq!(err.source().unwrap().to_string(), "database connection lost");
    assert_eq!(exporter.state(), SessionState::Failed);
    exporter.close();
    assert!(exporter.into_inner().is_empty());
}

#[test]
fn test_missing_property_fails_export() {
    let layout = ColumnLayout::builder()
        .column("Id", "id")
        .column("Email", "email")
        .build()
        .unwrap();
    let mut exporter: ExcelExporter<User, Vec<u8>> = ExcelExporter::new(Vec::new(), layout);
    exporter.open().unwrap();
    let data = users(500);

    let err = exporter
        .generate_report_from_data_provider(|request: PageRequest| {
            Ok::<_, Infallible>(Page::paginate(&data, &request))
        })
        .unwrap_err();

    match err {
        ExportError::PropertyAccess { field, .. } => assert_eq!(field, "email"),
        other => panic!("unexpected error: {other}"),
    }
    exporter.close();
    assert!(exporter.into_inner().is_empty());
}

#[test]
fn test_producer_thread_with_backpressure_keeps_order() {
    init_tracing();
    let mut exporter = exporter(
        ExportConfig::new()
            .with_max_queue_size(3)
            .with_max_rows_per_sheet(40),
    );
    exporter.open().unwrap();

    let producer = exporter.producer();
    let feeder = thread::spawn(move || {
        for chunk in users(100).chunks(7) {
            producer.add_records(chunk.to_vec())?;
        }
        producer.close_data();
        Ok::<_, ExportError>(())
    });

    exporter.export().unwrap();
    feeder.join().unwrap().unwrap();
    exporter.close();

    let sheets = read_sheets(&exporter.into_inner());
    let counts: Vec<_> = sheets.iter().map(|s| s.data_rows()).collect();
    assert_eq!(counts, vec![40, 40, 20]);
    for (i, sheet) in sheets.iter().enumerate() {
        let first = i * 40;
        let expected = format!("<c r=\"A2\"><v>{}</v></c>", first);
        assert!(sheet.xml.contains(&expected), "sheet {} starts at {}", i, first);
    }
}

#[test]
fn test_close_is_noop_when_not_open() {
    let mut exporter = exporter(ExportConfig::new());
    exporter.close();
    exporter.close();
    assert_eq!(exporter.state(), SessionState::Closed);
}

#[test]
fn test_double_close_after_export() {
    let mut exporter = exporter(ExportConfig::new());
    exporter.open().unwrap();
    exporter.add_records_final(users(1), true).unwrap();
    exporter.export().unwrap();
    exporter.close();
    exporter.close();
    assert_eq!(exporter.state(), SessionState::Closed);
    assert!(!exporter.into_inner().is_empty());
}

#[test]
fn test_export_requires_open() {
    let mut exporter = exporter(ExportConfig::new());
    let err = exporter.export().unwrap_err();
    assert!(matches!(err, ExportError::NotOpen(_)));
}

#[test]
fn test_settings_locked_once_export_started() {
    let mut exporter = exporter(ExportConfig::new());
    exporter.set_max_rows_per_sheet(10).unwrap();
    exporter.open().unwrap();
    exporter.set_max_queue_size(5).unwrap();
    exporter.add_records_final(users(2), true).unwrap();
    exporter.export().unwrap();

    assert!(exporter.set_max_rows_per_sheet(20).unwrap_err().is_conflict());
    assert!(exporter.set_data_fetch_size(20).unwrap_err().is_conflict());
    assert_eq!(exporter.config().max_rows_per_sheet, 10);
    assert!(exporter.set_max_rows_per_sheet(0).is_err());
    exporter.close();
    exporter.set_data_fetch_size(50).unwrap();
}

#[test]
fn test_workbook_metadata_lists_every_sheet() {
    let mut exporter = exporter(ExportConfig::new().with_max_rows_per_sheet(2));
    exporter.open().unwrap();
    exporter.add_records_final(users(5), true).unwrap();
    exporter.export().unwrap();
    exporter.close();

    let bytes = exporter.into_inner();
    let content_types = read_entry(&bytes, "[Content_Types].xml");
    for n in 1..=3 {
        assert!(content_types.contains(&format!("/xl/worksheets/sheet{}.xml", n)));
    }
    let rels = read_entry(&bytes, "xl/_rels/workbook.xml.rels");
    assert!(rels.contains("worksheets/sheet3.xml"));
}

#[test]
fn test_export_to_file() {
    let temp = tempfile::NamedTempFile::new().unwrap();
    let file = temp.reopen().unwrap();
    let data = users(30);

    let mut exporter = ExcelExporter::with_sheet_name(file, layout(), "People");
    exporter.set_data_fetch_size(7).unwrap();
    exporter.open().unwrap();
    let count = exporter
        .generate_report_from_data_provider(|request: PageRequest| {
            Ok::<_, Infallible>(Page::paginate(&data, &request))
        })
        .unwrap();
    exporter.close();
    drop(exporter);

    assert_eq!(count, 30);
    let bytes = std::fs::read(temp.path()).unwrap();
    let sheets = read_sheets(&bytes);
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "People");
    assert_eq!(sheets[0].data_rows(), 30);
}

struct Exploding {
    id: i64,
}

impl pagestream::Record for Exploding {
    fn property(&self, name: &str) -> Option<pagestream::CellValue> {
        if self.id == 5 {
            panic!("cannot render record {}", self.id);
        }
        (name == "id").then(|| self.id.into())
    }
}

#[test]
fn test_writer_panic_releases_fetch_task() {
    let layout = ColumnLayout::builder().column("Id", "id").build().unwrap();
    let config = ExportConfig::new()
        .with_max_queue_size(3)
        .with_data_fetch_size(3);
    let mut exporter: ExcelExporter<Exploding, Vec<u8>> =
        ExcelExporter::with_config(Vec::new(), layout, config).unwrap();
    exporter.open().unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        exporter.generate_report_from_data_provider(|request: PageRequest| {
            let content = (request.offset()..request.offset() + request.size)
                .map(|id| Exploding { id: id as i64 })
                .collect();
            Ok::<_, Infallible>(Page::new(content, request.page < 500))
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(exporter.state(), SessionState::Failed);
    assert!(exporter.is_end_of_data());
    exporter.close();
    assert_eq!(exporter.state(), SessionState::Closed);
    assert!(exporter.into_inner().is_empty());
}
