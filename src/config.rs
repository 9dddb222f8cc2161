//! Export session configuration

use crate::error::{ExportError, Result};
use std::time::Duration;

/// Excel has a limit of 1,048,576 rows per sheet
pub const DEFAULT_MAX_ROWS_PER_SHEET: usize = 1_048_576;
/// Records buffered between the fetch task and the writer
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
/// Page size requested from the data provider
pub const DEFAULT_DATA_FETCH_SIZE: usize = 2_000;
/// Wait 5 minutes for the first records before giving up
pub const DEFAULT_DATA_WAIT_TIMEOUT_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_SHEET_NAME: &str = "Report";

/// Sort direction forwarded to the data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort order the provider should apply to every page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sort {
    pub properties: Vec<String>,
    pub direction: Direction,
}

impl Sort {
    /// Ascending sort on the given properties
    pub fn by<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Sort {
            properties: properties.into_iter().map(Into::into).collect(),
            direction: Direction::Asc,
        }
    }

    pub fn descending(mut self) -> Self {
        self.direction = Direction::Desc;
        self
    }

    pub fn is_unsorted(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Limits and naming for one export session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExportConfig {
    /// Data rows per sheet before a new sheet is started
    pub max_rows_per_sheet: usize,
    /// Records kept in the queue before producers are held back
    pub max_queue_size: usize,
    /// Page size used when calling the data provider
    pub data_fetch_size: usize,
    /// How long `export()` waits for the first records, in milliseconds
    pub data_wait_timeout_ms: u64,
    /// Base sheet name; later sheets get `_1`, `_2`, ... appended
    pub sheet_name: String,
    /// Sort order sent with every page request
    pub sort: Sort,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            max_rows_per_sheet: DEFAULT_MAX_ROWS_PER_SHEET,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            data_fetch_size: DEFAULT_DATA_FETCH_SIZE,
            data_wait_timeout_ms: DEFAULT_DATA_WAIT_TIMEOUT_MS,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            sort: Sort::default(),
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `PAGESTREAM_*` environment variables
    ///
    /// Recognised variables: `PAGESTREAM_MAX_ROWS_PER_SHEET`,
    /// `PAGESTREAM_MAX_QUEUE_SIZE`, `PAGESTREAM_DATA_FETCH_SIZE`,
    /// `PAGESTREAM_DATA_WAIT_TIMEOUT_MS` and `PAGESTREAM_SHEET_NAME`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| ExportError::InvalidConfig(format!("{key}={raw:?} is not a number")))
        }

        if let Some(raw) = lookup("PAGESTREAM_MAX_ROWS_PER_SHEET") {
            self.max_rows_per_sheet = parse("PAGESTREAM_MAX_ROWS_PER_SHEET", &raw)?;
        }
        if let Some(raw) = lookup("PAGESTREAM_MAX_QUEUE_SIZE") {
            self.max_queue_size = parse("PAGESTREAM_MAX_QUEUE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("PAGESTREAM_DATA_FETCH_SIZE") {
            self.data_fetch_size = parse("PAGESTREAM_DATA_FETCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("PAGESTREAM_DATA_WAIT_TIMEOUT_MS") {
            self.data_wait_timeout_ms = parse("PAGESTREAM_DATA_WAIT_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("PAGESTREAM_SHEET_NAME") {
            self.sheet_name = raw;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_rows_per_sheet(mut self, rows: usize) -> Self {
        self.max_rows_per_sheet = rows;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_data_fetch_size(mut self, size: usize) -> Self {
        self.data_fetch_size = size;
        self
    }

    pub fn with_data_wait_timeout(mut self, timeout: Duration) -> Self {
        self.data_wait_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn data_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.data_wait_timeout_ms)
    }

    /// Reject limits that would stall or break a session
    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_sheet == 0 {
            return Err(ExportError::InvalidConfig(
                "max_rows_per_sheet must be at least 1".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ExportError::InvalidConfig(
                "max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.data_fetch_size == 0 {
            return Err(ExportError::InvalidConfig(
                "data_fetch_size must be at least 1".to_string(),
            ));
        }
        if self.sheet_name.trim().is_empty() {
            return Err(ExportError::InvalidConfig(
                "sheet_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
