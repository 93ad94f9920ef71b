//! `open()` configuration (spec §4.3).

use crate::common::config::{is_valid_page_size, DEFAULT_CACHE_PAGES, DEFAULT_PAGE_SIZE};
use crate::common::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Memory,
    Wal,
    Delete,
}

#[derive(Debug, Clone)]
pub struct OpenConfig {
    pub name: String,
    pub page_size: usize,
    pub cache_size: usize,
    pub journal_mode: JournalMode,
    pub encryption_key: Option<Vec<u8>>,
    pub auto_vacuum: bool,
}

impl OpenConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_PAGES,
            journal_mode: JournalMode::Delete,
            encryption_key: None,
            auto_vacuum: false,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn encryption_key(mut self, key: Vec<u8>) -> Self {
        self.encryption_key = Some(key);
        self
    }

    pub fn auto_vacuum(mut self, auto_vacuum: bool) -> Self {
        self.auto_vacuum = auto_vacuum;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("database name must not be empty".to_string()));
        }
        if !is_valid_page_size(self.page_size) {
            return Err(Error::InvalidConfig(format!(
                "page_size {} is not a power of two in [512, 65536]",
                self.page_size
            )));
        }
        if self.cache_size == 0 {
            return Err(Error::InvalidConfig("cache_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        OpenConfig::new("t1.db").validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let err = OpenConfig::new("t1.db").page_size(3000).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_cache_size() {
        let err = OpenConfig::new("t1.db").cache_size(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = OpenConfig::new("   ").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
