//! Streaming workbook spooled to an anonymous temp file

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::xml_writer::XmlWriter;
use crate::error::{ExportError, Result};
use crate::sheet::RowSink;
use crate::types::CellValue;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

type Spool = BufWriter<File>;

/// Workbook whose rows go straight into a compressed worksheet entry
///
/// Nothing is kept in memory per row: strings are written inline and the ZIP
/// archive lives in a temp file that is removed when the workbook is dropped.
/// Only [`write_to`](Self::write_to) touches the destination.
pub struct XlsxWorkbook {
    xml: XmlWriter<ZipWriter<Spool>>,
    options: FileOptions,
    sheets: Vec<String>,
    in_sheet: bool,
    current_row: u32,
    column_refs: Vec<String>,
    finished: bool,
}

impl XlsxWorkbook {
    /// Create an empty workbook backed by a fresh temp file
    pub fn new() -> Result<Self> {
        let spool = BufWriter::with_capacity(64 * 1024, tempfile::tempfile()?);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6));

        Ok(XlsxWorkbook {
            xml: XmlWriter::new(ZipWriter::new(spool)),
            options,
            sheets: Vec::new(),
            in_sheet: false,
            current_row: 0,
            column_refs: Vec::new(),
            finished: false,
        })
    }

    /// Names of the sheets created so far, in order
    pub fn sheet_names(&self) -> &[String] {
        &self.sheets
    }

    /// Rows written to the active sheet
    pub fn current_row(&self) -> u32 {
        self.current_row
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.finished {
            return Err(ExportError::Io(io::Error::new(
                io::ErrorKind::Other,
                "workbook already written",
            )));
        }
        Ok(())
    }

    fn start_entry(&mut self, name: &str) -> Result<()> {
        self.xml.flush()?;
        self.xml.get_mut().start_file(name, self.options)?;
        Ok(())
    }

    /// Start a new worksheet, closing the previous one
    pub fn add_worksheet(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.finish_current_worksheet()?;

        self.sheets.push(name.to_string());
        let entry = format!("xl/worksheets/sheet{}.xml", self.sheets.len());
        self.start_entry(&entry)?;

        self.xml.write_str(XML_DECL)?;
        self.xml.start_element("worksheet")?;
        self.xml.attribute("xmlns", NS_MAIN)?;
        self.xml.attribute("xmlns:r", NS_REL)?;
        self.xml.close_start_tag()?;
        self.xml.start_element("sheetData")?;
        self.xml.close_start_tag()?;

        self.in_sheet = true;
        self.current_row = 0;
        Ok(())
    }

    /// Append one row of typed cells to the active worksheet
    pub fn write_row(&mut self, cells: &[CellValue]) -> Result<()> {
        self.ensure_writable()?;
        if !self.in_sheet {
            return Err(ExportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no active worksheet",
            )));
        }

        while self.column_refs.len() < cells.len() {
            let next = self.column_refs.len() as u32 + 1;
            self.column_refs.push(col_to_letter(next));
        }

        self.current_row += 1;
        let row = self.current_row;

        self.xml.start_element("row")?;
        self.xml.attribute_int("r", row)?;
        self.xml.close_start_tag()?;

        for (idx, cell) in cells.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            self.xml.start_element("c")?;
            self.xml.write_raw(b" r=\"")?;
            self.xml.write_str(&self.column_refs[idx])?;
            self.xml.write_int(row)?;
            self.xml.write_raw(b"\"")?;

            match cell {
                CellValue::Int(n) => {
                    self.xml.write_raw(b"><v>")?;
                    self.xml.write_int(*n)?;
                    self.xml.write_raw(b"</v></c>")?;
                }
                CellValue::Float(f) if f.is_finite() => {
                    self.xml.write_raw(b"><v>")?;
                    self.xml.write_str(&f.to_string())?;
                    self.xml.write_raw(b"</v></c>")?;
                }
                CellValue::Bool(b) => {
                    self.xml.write_raw(b" t=\"b\"><v>")?;
                    self.xml.write_raw(if *b { b"1" } else { b"0" })?;
                    self.xml.write_raw(b"</v></c>")?;
                }
                CellValue::String(s) => self.write_inline_string(s)?,
                other => self.write_inline_string(&other.as_string())?,
            }
        }

        self.xml.end_element("row")
    }

    fn write_inline_string(&mut self, text: &str) -> Result<()> {
        self.xml.write_raw(b" t=\"inlineStr\"><is><t")?;
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            self.xml.write_raw(b" xml:space=\"preserve\"")?;
        }
        self.xml.close_start_tag()?;
        self.xml.write_escaped(text)?;
        self.xml.write_raw(b"</t></is></c>")
    }

    fn finish_current_worksheet(&mut self) -> Result<()> {
        if !self.in_sheet {
            return Ok(());
        }
        self.xml.end_element("sheetData")?;
        self.xml.end_element("worksheet")?;
        self.in_sheet = false;
        Ok(())
    }

    /// Finish the archive and copy it, in one pass, into `dest`
    ///
    /// Returns the number of bytes written. The workbook cannot be written to
    /// afterwards.
    pub fn write_to<W: Write + ?Sized>(&mut self, dest: &mut W) -> Result<u64> {
        self.ensure_writable()?;
        if self.sheets.is_empty() {
            self.add_worksheet("Sheet1")?;
        }
        self.finish_current_worksheet()?;

        self.start_entry("[Content_Types].xml")?;
        self.write_content_types()?;
        self.start_entry("_rels/.rels")?;
        self.write_root_rels()?;
        self.start_entry("docProps/core.xml")?;
        self.write_core_props()?;
        self.start_entry("docProps/app.xml")?;
        self.write_app_props()?;
        self.start_entry("xl/workbook.xml")?;
        self.write_workbook_xml()?;
        self.start_entry("xl/_rels/workbook.xml.rels")?;
        self.write_workbook_rels()?;
        self.start_entry("xl/styles.xml")?;
        self.xml.write_str(STYLES_XML)?;
        self.xml.flush()?;

        self.finished = true;
        let spool = self.xml.get_mut().finish()?;
        let mut file = spool.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;

        let written = io::copy(&mut file, dest)?;
        dest.flush()?;
        Ok(written)
    }

    /// Release the temp file; closes the archive first if it was never written
    pub fn dispose(mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            self.xml.flush()?;
            self.xml.get_mut().finish()?;
        }
        Ok(())
    }

    fn write_content_types(&mut self) -> Result<()> {
        self.xml.write_str(XML_DECL)?;
        self.xml.write_str(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>",
        )?;
        for sheet_id in 1..=self.sheets.len() {
            self.xml.start_element("Override")?;
            self.xml.write_raw(b" PartName=\"/xl/worksheets/sheet")?;
            self.xml.write_int(sheet_id)?;
            self.xml.write_raw(b".xml\"")?;
            self.xml.attribute(
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            )?;
            self.xml.close_empty()?;
        }
        self.xml.end_element("Types")
    }

    fn write_root_rels(&mut self) -> Result<()> {
        self.xml.write_str(XML_DECL)?;
        self.xml.write_str(
            "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
<Relationship Id=\"rId3\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties\" Target=\"docProps/app.xml\"/>\
</Relationships>",
        )
    }

    fn write_core_props(&mut self) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        self.xml.write_str(XML_DECL)?;
        self.xml.write_str(
            "<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:creator>pagestream</dc:creator><cp:lastModifiedBy>pagestream</cp:lastModifiedBy>",
        )?;
        for tag in ["dcterms:created", "dcterms:modified"] {
            self.xml.start_element(tag)?;
            self.xml.attribute("xsi:type", "dcterms:W3CDTF")?;
            self.xml.close_start_tag()?;
            self.xml.write_str(&now)?;
            self.xml.end_element(tag)?;
        }
        self.xml.end_element("cp:coreProperties")
    }

    fn write_app_props(&mut self) -> Result<()> {
        self.xml.write_str(XML_DECL)?;
        self.xml.write_str(
            "<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">\
<Application>pagestream</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop>\
<LinksUpToDate>false</LinksUpToDate><SharedDoc>false</SharedDoc><HyperlinksChanged>false</HyperlinksChanged>\
</Properties>",
        )
    }

    fn write_workbook_xml(&mut self) -> Result<()> {
        self.xml.write_str(XML_DECL)?;
        self.xml.start_element("workbook")?;
        self.xml.attribute("xmlns", NS_MAIN)?;
        self.xml.attribute("xmlns:r", NS_REL)?;
        self.xml.close_start_tag()?;
        self.xml.start_element("sheets")?;
        self.xml.close_start_tag()?;

        for (i, name) in self.sheets.iter().enumerate() {
            let sheet_id = i + 1;
            self.xml.start_element("sheet")?;
            self.xml.attribute("name", name)?;
            self.xml.attribute_int("sheetId", sheet_id)?;
            self.xml.attribute("r:id", &format!("rId{}", sheet_id))?;
            self.xml.close_empty()?;
        }

        self.xml.end_element("sheets")?;
        self.xml.end_element("workbook")
    }

    fn write_workbook_rels(&mut self) -> Result<()> {
        self.xml.write_str(XML_DECL)?;
        self.xml.start_element("Relationships")?;
        self.xml.attribute("xmlns", NS_PKG_REL)?;
        self.xml.close_start_tag()?;

        let sheet_count = self.sheets.len();
        for rid in 1..=sheet_count {
            self.xml.start_element("Relationship")?;
            self.xml.attribute("Id", &format!("rId{}", rid))?;
            self.xml.attribute(
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            )?;
            self.xml
                .attribute("Target", &format!("worksheets/sheet{}.xml", rid))?;
            self.xml.close_empty()?;
        }

        self.xml.start_element("Relationship")?;
        self.xml
            .attribute("Id", &format!("rId{}", sheet_count + 1))?;
        self.xml.attribute(
            "Type",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
        )?;
        self.xml.attribute("Target", "styles.xml")?;
        self.xml.close_empty()?;

        self.xml.end_element("Relationships")
    }
}

impl RowSink for XlsxWorkbook {
    fn start_sheet(&mut self, name: &str) -> Result<()> {
        self.add_worksheet(name)
    }

    fn write_row(&mut self, cells: &[CellValue]) -> Result<()> {
        XlsxWorkbook::write_row(self, cells)
    }
}

const STYLES_XML: &str = "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
<fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
<cellXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/></cellXfs>\
</styleSheet>";

/// Convert a 1-based column number to its letters (1 -> A, 27 -> AA)
pub(crate) fn col_to_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut xml = String::new();
        entry.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_col_to_letter() {
        assert_eq!(col_to_letter(1), "A");
        assert_eq!(col_to_letter(26), "Z");
        assert_eq!(col_to_letter(27), "AA");
        assert_eq!(col_to_letter(703), "AAA");
    }

    #[test]
    fn test_typed_row_xml() {
        let mut workbook = XlsxWorkbook::new().unwrap();
        workbook.add_worksheet("Data").unwrap();
        workbook
            .write_row(&[
                CellValue::Int(42),
                CellValue::Empty,
                CellValue::Bool(true),
                CellValue::from(" a&b "),
                CellValue::Float(1.5),
            ])
            .unwrap();

        let mut out = Vec::new();
        let written = workbook.write_to(&mut out).unwrap();
        assert_eq!(written as usize, out.len());

        let sheet = read_entry(&out, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<row r=\"1\"><c r=\"A1\"><v>42</v></c><c r=\"C1\" t=\"b\"><v>1</v></c>"));
        assert!(sheet.contains("<t xml:space=\"preserve\"> a&amp;b </t>"));
        assert!(sheet.contains("<c r=\"E1\"><v>1.5</v></c>"));
    }

    #[test]
    fn test_multiple_sheets_registered() {
        let mut workbook = XlsxWorkbook::new().unwrap();
        workbook.add_worksheet("Report").unwrap();
        workbook.write_row(&[CellValue::from("h")]).unwrap();
        workbook.add_worksheet("Report_1").unwrap();
        assert_eq!(workbook.current_row(), 0);
        workbook.write_row(&[CellValue::from("h")]).unwrap();

        let mut out = Vec::new();
        workbook.write_to(&mut out).unwrap();

        let book = read_entry(&out, "xl/workbook.xml");
        assert!(book.contains("name=\"Report\" sheetId=\"1\""));
        assert!(book.contains("name=\"Report_1\" sheetId=\"2\""));
        let types = read_entry(&out, "[Content_Types].xml");
        assert!(types.contains("/xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn test_write_after_finish_fails() {
        let mut workbook = XlsxWorkbook::new().unwrap();
        workbook.add_worksheet("S").unwrap();
        workbook.write_to(&mut Vec::new()).unwrap();
        assert!(workbook.write_row(&[CellValue::Int(1)]).is_err());
        assert!(workbook.write_to(&mut Vec::new()).is_err());
        assert!(workbook.dispose().is_ok());
    }

    #[test]
    fn test_row_without_sheet_fails() {
        let mut workbook = XlsxWorkbook::new().unwrap();
        assert!(workbook.write_row(&[CellValue::Int(1)]).is_err());
        assert!(workbook.dispose().is_ok());
    }
}
