//! Paged data fetching feeding the record queue

use crate::config::Sort;
use crate::error::{BoxError, ExportError, Result};
use crate::queue::RecordQueue;
use std::error::Error as _;
use tracing::{debug, info};

/// Page coordinates handed to a data provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index
    pub page: usize,
    /// Records per page
    pub size: usize,
    pub sort: Sort,
}

impl PageRequest {
    pub fn of(page: usize, size: usize) -> Self {
        PageRequest {
            page,
            size,
            sort: Sort::default(),
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Index of the first record on this page
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Same size and sort, following page
    pub fn next(&self) -> Self {
        PageRequest {
            page: self.page + 1,
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

/// One page of provider records plus a continuation flag
#[derive(Debug, Clone, PartialEq)]
pub struct Page<D> {
    pub content: Vec<D>,
    pub has_next: bool,
}

impl<D> Page<D> {
    pub fn new(content: Vec<D>, has_next: bool) -> Self {
        Page { content, has_next }
    }

    /// Final page
    pub fn last(content: Vec<D>) -> Self {
        Page {
            content,
            has_next: false,
        }
    }

    pub fn empty() -> Self {
        Page::last(Vec::new())
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

impl<D: Clone> Page<D> {
    /// Cut the requested page out of an in-memory slice
    pub fn paginate(items: &[D], request: &PageRequest) -> Self {
        let start = request.offset().min(items.len());
        let end = start.saturating_add(request.size).min(items.len());
        Page {
            content: items[start..end].to_vec(),
            has_next: end < items.len(),
        }
    }
}

/// Marks end-of-data on every exit path of the fetch task
///
/// A run that did not complete, including one unwinding from a panic,
/// reports a failed feed so the writer discards the report.
struct EndOfDataGuard<'a, T> {
    queue: &'a RecordQueue<T>,
    completed: bool,
}

impl<T> Drop for EndOfDataGuard<'_, T> {
    fn drop(&mut self) {
        if self.completed {
            self.queue.close_data();
        } else {
            self.queue.fail_data();
        }
    }
}

/// Drives a paged data provider and pushes every page into the queue
pub struct FetchPipeline<'a, T> {
    queue: &'a RecordQueue<T>,
    fetch_size: usize,
    sort: Sort,
}

impl<'a, T> FetchPipeline<'a, T> {
    pub fn new(queue: &'a RecordQueue<T>, fetch_size: usize, sort: Sort) -> Self {
        FetchPipeline {
            queue,
            fetch_size: fetch_size.max(1),
            sort,
        }
    }

    /// Fetch pages from 0 until the provider reports no next page
    ///
    /// Each page's elements go through `mapper` before being queued. An empty
    /// first page fails with "no data found". Provider, mapper and queue
    /// errors are wrapped as [`ExportError::Conflict`]. End-of-data is
    /// signalled exactly once whatever the outcome. Returns the number of
    /// records fetched.
    pub fn run<D, P, E, M, ME>(&self, mut provider: P, mut mapper: M) -> Result<usize>
    where
        P: FnMut(PageRequest) -> std::result::Result<Page<D>, E>,
        E: Into<BoxError>,
        M: FnMut(D) -> std::result::Result<T, ME>,
        ME: Into<BoxError>,
    {
        let mut guard = EndOfDataGuard {
            queue: self.queue,
            completed: false,
        };

        let mut request = PageRequest::of(0, self.fetch_size).with_sort(self.sort.clone());
        let mut total = 0usize;
        loop {
            debug!("Retrieving page {} of {} records", request.page, request.size);
            let page = provider(request.clone())
                .map_err(|e| ExportError::conflict_with("Failed to provide data", e))?;

            let count = page.number_of_elements();
            total += count;
            info!(
                "Retrieved {} records, sending to exporter, total {}",
                count, total
            );

            let has_next = page.has_next;
            if page.has_content() {
                let records = page
                    .content
                    .into_iter()
                    .map(&mut mapper)
                    .collect::<std::result::Result<Vec<T>, ME>>()
                    .map_err(|e| ExportError::conflict_with("Failed to map data", e))?;
                self.queue
                    .add_records(records, false)
                    .map_err(|e| ExportError::conflict_with("Failed to add data to report", e))?;
            } else if request.page == 0 {
                return Err(ExportError::conflict("No data found to generate report."));
            }

            if !has_next {
                break;
            }
            request = request.next();
        }

        guard.completed = true;
        Ok(total)
    }
}

/// Whether a fetch failure only reflects the writer having stopped first
pub(crate) fn is_rejected_by_writer(err: &ExportError) -> bool {
    err.source()
        .and_then(|source| source.downcast_ref::<ExportError>())
        .is_some_and(|cause| {
            matches!(cause, ExportError::ClosedForWrites | ExportError::NotOpen(_))
        })
}
