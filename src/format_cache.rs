use crate::parser::{self, LogFormat, LogsParser};
use ahash::RandomState;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Remembers the detected format of recently seen lines so repeated detail
/// renders of the same row skip re-sniffing. Bounded; capacity 1 keeps only
/// the last line.
pub struct FormatCache {
    inner: Mutex<LruCache<String, LogFormat, RandomState>>,
}

impl Default for FormatCache {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FormatCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::with_hasher(cap, RandomState::new())) }
    }

    pub fn format_of(&self, line: &str) -> LogFormat {
        // try_lock: a contended cache is skipped, detection is idempotent
        if let Ok(mut cache) = self.inner.try_lock() {
            if let Some(format) = cache.get(line) {
                return *format;
            }
        }
        let format = parser::detect_format(line);
        if let Ok(mut cache) = self.inner.try_lock() {
            cache.put(line.to_string(), format);
        }
        format
    }

    pub fn parser_for_line(&self, line: &str) -> Option<&'static dyn LogsParser> {
        parser::parser_for(self.format_of(line))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().map(|c| c.cap().get()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_keeps_only_last_line() {
        let cache = FormatCache::default();
        assert_eq!(cache.format_of(r#"{"a":1}"#), LogFormat::Json);
        assert_eq!(cache.format_of("level=info msg=ok"), LogFormat::Logfmt);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let cache = FormatCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.format_of("plain words only"), LogFormat::Plaintext);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_lookups_return_same_format() {
        let cache = FormatCache::new(4);
        for _ in 0..3 {
            assert_eq!(cache.format_of("a=1 b=2"), LogFormat::Logfmt);
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.parser_for_line("a=1 b=2").is_some());
        assert!(cache.parser_for_line("nothing to see").is_none());
    }
}
