//! Pagination Reader
//!
//! Stateless page windows over a list's `[0, total)` index range.

use serde::Serialize;

use crate::config::Config;
use crate::error::{Result, VaultError};
use crate::records::StoredRecord;

/// A requested page; `None` fields fall back to defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Resolve defaults and bounds into a concrete window
    pub fn resolve(&self, config: &Config) -> Result<PageWindow> {
        let page = self.page.unwrap_or(1);
        let page_size = self
            .page_size
            .unwrap_or(config.default_page_size as u64);

        if page == 0 {
            return Err(VaultError::Invalid("page must be at least 1".into()));
        }
        if page_size == 0 || page_size > config.max_page_size as u64 {
            return Err(VaultError::Invalid(format!(
                "pageSize must be in 1..={}",
                config.max_page_size
            )));
        }

        Ok(PageWindow { page, page_size })
    }
}

/// A validated page position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub page_size: u64,
}

impl PageWindow {
    /// `[start, end)` clipped to `total`; empty once past the end
    pub fn bounds(&self, total: u64) -> (u64, u64) {
        let start = (self.page - 1).saturating_mul(self.page_size);
        if start >= total {
            return (total, total);
        }
        (start, start.saturating_add(self.page_size).min(total))
    }

    pub fn pagination(&self, total: u64) -> Pagination {
        let (_, end) = self.bounds(total);
        Pagination {
            page: self.page,
            page_size: self.page_size,
            has_more: end < total,
        }
    }
}

/// Position info returned with every page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub has_more: bool,
}

/// One page of a list
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<StoredRecord>,
    pub total: u64,
    pub pagination: Pagination,
}
