//! Export a paged "user repository" into a multi-sheet workbook
//!
//! Run with: cargo run --example paged_export -- users.xlsx

use pagestream::{impl_record, ColumnLayout, ExcelExporter, ExportConfig, Page, PageRequest, Sort};
use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

/// Row as stored by the repository
struct UserEntity {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    age: u8,
    verified: bool,
}

/// Row as exported
struct UserRow {
    id: i64,
    full_name: String,
    email: String,
    age: u8,
    verified: bool,
}

impl_record!(UserRow {
    id,
    full_name,
    email,
    age,
    verified,
});

struct UserRepository {
    total: usize,
}

impl UserRepository {
    fn find_all(&self, request: &PageRequest) -> Result<Page<UserEntity>, std::io::Error> {
        let start = request.offset().min(self.total);
        let end = (start + request.size).min(self.total);
        let content = (start..end)
            .map(|i| UserEntity {
                id: i as i64 + 1,
                first_name: format!("First{}", i),
                last_name: format!("Last{}", i),
                email: format!("user{}@example.com", i),
                age: (20 + i % 50) as u8,
                verified: i % 3 == 0,
            })
            .collect();
        Ok(Page::new(content, end < self.total))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "paged_export.xlsx".to_string());
    let repository = UserRepository { total: 250_000 };

    println!("Exporting {} users to {}", repository.total, path);
    let start = Instant::now();

    let layout = ColumnLayout::builder()
        .column("ID", "id")
        .column("Full Name", "full_name")
        .column("Email", "email")
        .column("Age", "age")
        .column("Verified", "verified")
        .blank("Notes")
        .build()?;

    let config = ExportConfig::from_env()?
        .with_sheet_name("Users")
        .with_max_rows_per_sheet(100_000)
        .with_data_fetch_size(5_000)
        .with_sort(Sort::by(["id"]));

    let file = BufWriter::new(File::create(&path)?);
    let mut exporter = ExcelExporter::with_config(file, layout, config)?;
    exporter.open()?;

    let count = exporter.generate_report_from_data_provider_with_mapper(
        |request: PageRequest| repository.find_all(&request),
        |user: UserEntity| UserRow {
            id: user.id,
            full_name: format!("{} {}", user.first_name, user.last_name),
            email: user.email,
            age: user.age,
            verified: user.verified,
        },
    )?;

    for sheet in exporter.sheets() {
        println!("  {} -> {} rows", sheet.name, sheet.data_rows);
    }
    exporter.close();

    println!(
        "Exported {} users in {:.2}s",
        count,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
