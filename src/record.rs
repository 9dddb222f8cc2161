//! Named-field access on exported records
//!
//! The exporter only needs to read a field by the name given in a
//! [`ColumnDescriptor`](crate::column::ColumnDescriptor). Records expose their
//! fields through the [`Record`] trait, usually generated with [`impl_record!`].
//!
//! ```
//! use pagestream::{impl_record, CellValue, Record};
//!
//! struct User {
//!     id: i64,
//!     first_name: String,
//!     email: Option<String>,
//! }
//!
//! impl_record!(User { id, first_name, email });
//!
//! let user = User { id: 7, first_name: "Ada".into(), email: None };
//! assert_eq!(user.property("id"), Some(CellValue::Int(7)));
//! assert_eq!(user.property("email"), Some(CellValue::Empty));
//! assert_eq!(user.property("missing"), None);
//! ```

use crate::column::ColumnLayout;
use crate::error::{ExportError, Result};
use crate::types::CellValue;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Read access to a record's fields by name
pub trait Record {
    /// Current value of the named field, or `None` if the record has no such field
    fn property(&self, name: &str) -> Option<CellValue>;
}

/// Implement [`Record`] for a struct by listing the fields to expose
///
/// Each listed field must be `Clone` and convert into [`CellValue`]. A field
/// written as `field as text` only needs `Display` and is exported as its
/// string form.
#[macro_export]
macro_rules! impl_record {
    (@cell $value:expr, text) => {
        $crate::CellValue::text(&$value)
    };
    (@cell $value:expr) => {
        $crate::CellValue::from($value.clone())
    };
    ($ty:ty { $($field:ident $(as $conv:ident)?),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn property(&self, name: &str) -> Option<$crate::CellValue> {
                match name {
                    $(stringify!($field) => Some($crate::impl_record!(@cell self.$field $(, $conv)?)),)*
                    _ => None,
                }
            }
        }
    };
}

impl<R: Record + ?Sized> Record for &R {
    fn property(&self, name: &str) -> Option<CellValue> {
        (**self).property(name)
    }
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn property(&self, name: &str) -> Option<CellValue> {
        (**self).property(name)
    }
}

impl<R: Record + ?Sized> Record for Arc<R> {
    fn property(&self, name: &str) -> Option<CellValue> {
        (**self).property(name)
    }
}

impl<S: std::hash::BuildHasher> Record for HashMap<String, CellValue, S> {
    fn property(&self, name: &str) -> Option<CellValue> {
        self.get(name).cloned()
    }
}

impl Record for BTreeMap<String, CellValue> {
    fn property(&self, name: &str) -> Option<CellValue> {
        self.get(name).cloned()
    }
}

impl<S: std::hash::BuildHasher> Record for IndexMap<String, CellValue, S> {
    fn property(&self, name: &str) -> Option<CellValue> {
        self.get(name).cloned()
    }
}

#[cfg(feature = "serde")]
impl Record for serde_json::Value {
    fn property(&self, name: &str) -> Option<CellValue> {
        use serde_json::Value;

        let value = self.as_object()?.get(name)?;
        Some(match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => n
                    .as_f64()
                    .map(CellValue::Float)
                    .unwrap_or_else(|| CellValue::text(n)),
            },
            Value::String(s) => CellValue::String(s.clone()),
            other => CellValue::text(other),
        })
    }
}

/// Field lookups resolved against a column layout
///
/// The list of field names is captured once per session so every row is
/// produced without walking the layout's descriptors again.
#[derive(Debug, Clone)]
pub struct PropertyAccessor {
    fields: Vec<Option<String>>,
}

impl PropertyAccessor {
    pub fn new(layout: &ColumnLayout) -> Self {
        PropertyAccessor {
            fields: layout.columns().iter().map(|c| c.field.clone()).collect(),
        }
    }

    /// Read one named field, failing if the record does not expose it
    pub fn get<R: Record + ?Sized>(record: &R, field: &str) -> Result<CellValue> {
        record
            .property(field)
            .ok_or_else(|| ExportError::PropertyAccess {
                field: field.to_string(),
                reason: "no such property on record".to_string(),
            })
    }

    /// Fill `row` with one cell per column; columns without a field are blank
    pub fn read_row<R: Record + ?Sized>(&self, record: &R, row: &mut Vec<CellValue>) -> Result<()> {
        row.clear();
        for field in &self.fields {
            match field {
                Some(name) => row.push(Self::get(record, name)?),
                None => row.push(CellValue::Empty),
            }
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }
}
