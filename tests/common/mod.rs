//! Helpers for inspecting exported workbooks

use std::io::{Cursor, Read};

pub struct SheetContents {
    pub name: String,
    pub xml: String,
}

impl SheetContents {
    /// Number of `<row>` elements, header included
    pub fn row_count(&self) -> usize {
        self.xml.matches("<row ").count()
    }

    pub fn data_rows(&self) -> usize {
        self.row_count().saturating_sub(1)
    }
}

pub fn read_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut xml = String::new();
    entry.read_to_string(&mut xml).unwrap();
    xml
}

/// Sheets in workbook order with their raw worksheet XML
pub fn read_sheets(bytes: &[u8]) -> Vec<SheetContents> {
    let workbook = read_entry(bytes, "xl/workbook.xml");
    workbook
        .split("<sheet ")
        .skip(1)
        .enumerate()
        .map(|(i, tag)| {
            let start = tag.find("name=\"").unwrap() + "name=\"".len();
            let end = start + tag[start..].find('"').unwrap();
            SheetContents {
                name: tag[start..end].to_string(),
                xml: read_entry(bytes, &format!("xl/worksheets/sheet{}.xml", i + 1)),
            }
        })
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
