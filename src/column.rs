//! Column definitions for exported sheets

use crate::error::{ExportError, Result};
use std::collections::HashSet;

/// A single output column
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnDescriptor {
    /// Ordering key, unique within a layout
    pub position: u32,
    /// Header text written on the first row of every sheet
    pub header: String,
    /// Record field feeding this column; `None` writes a blank cell
    pub field: Option<String>,
    /// Display format hint, carried as metadata only
    pub format: Option<String>,
}

impl ColumnDescriptor {
    /// Create a column bound to a record field
    pub fn new(position: u32, header: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        ColumnDescriptor {
            position,
            header: header.into(),
            field: (!field.trim().is_empty()).then_some(field),
            format: None,
        }
    }

    /// Create a column that is always written blank
    pub fn blank(position: u32, header: impl Into<String>) -> Self {
        ColumnDescriptor {
            position,
            header: header.into(),
            field: None,
            format: None,
        }
    }

    /// Attach a format hint
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Ordered, immutable set of columns
///
/// Columns are sorted ascending by position at construction and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnLayout {
    /// Build a layout from descriptors in any order
    ///
    /// Fails when the list is empty or two columns share a position.
    pub fn new(mut columns: Vec<ColumnDescriptor>) -> Result<Self> {
        if columns.is_empty() {
            return Err(ExportError::InvalidLayout(
                "at least one column is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.position) {
                return Err(ExportError::InvalidLayout(format!(
                    "duplicate column position {} ('{}')",
                    column.position, column.header
                )));
            }
        }

        columns.sort_by_key(|c| c.position);
        Ok(ColumnLayout { columns })
    }

    /// Start a list builder that assigns positions in call order
    pub fn builder() -> ColumnLayoutBuilder {
        ColumnLayoutBuilder::default()
    }

    /// Columns in position order
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Header texts in position order
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Fluent builder mirroring the usual "header, field" column lists
#[derive(Debug, Default)]
pub struct ColumnLayoutBuilder {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnLayoutBuilder {
    /// Append a column; its position is the number of columns added so far
    pub fn column(mut self, header: impl Into<String>, field: impl Into<String>) -> Self {
        let position = self.columns.len() as u32;
        self.columns
            .push(ColumnDescriptor::new(position, header, field));
        self
    }

    /// Append a column at an explicit position
    pub fn column_at(
        mut self,
        header: impl Into<String>,
        field: impl Into<String>,
        position: u32,
    ) -> Self {
        self.columns
            .push(ColumnDescriptor::new(position, header, field));
        self
    }

    /// Append a column with no backing field
    pub fn blank(mut self, header: impl Into<String>) -> Self {
        let position = self.columns.len() as u32;
        self.columns.push(ColumnDescriptor::blank(position, header));
        self
    }

    /// Append a fully specified descriptor
    pub fn descriptor(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<ColumnLayout> {
        ColumnLayout::new(self.columns)
    }
}
