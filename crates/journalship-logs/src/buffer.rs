use std::time::{Duration, Instant};

use journalship_types::RoutingMetadata;

/// Flush a buffer once it holds more than this many bytes
pub const MAX_BUFFER_BYTES: usize = 100 * 1024;

/// Flush a buffer once its oldest message is older than this
pub const MAX_BUFFER_AGE: Duration = Duration::from_secs(15);

/// Limits that trigger a buffer flush
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_bytes: usize,
    pub max_age: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_BUFFER_BYTES,
            max_age: MAX_BUFFER_AGE,
        }
    }
}

/// Messages accumulated for one source, awaiting upload
#[derive(Clone, Debug)]
pub struct LogBuffer {
    messages: Vec<String>,

    /// Sum of the byte lengths of `messages`
    total_bytes: usize,

    /// When the first message since the last clear arrived
    age: Option<Instant>,

    metadata: RoutingMetadata,

    policy: FlushPolicy,
}

impl LogBuffer {
    pub fn new(metadata: RoutingMetadata) -> Self {
        Self::with_policy(metadata, FlushPolicy::default())
    }

    pub fn with_policy(metadata: RoutingMetadata, policy: FlushPolicy) -> Self {
        Self {
            messages: Vec::new(),
            total_bytes: 0,
            age: None,
            metadata,
            policy,
        }
    }

    pub fn append(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if self.messages.is_empty() {
            self.age = Some(Instant::now());
        }
        self.total_bytes += msg.len();
        self.messages.push(msg);
    }

    /// Empty the buffer, keeping its metadata for future appends
    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_bytes = 0;
        self.age = None;
    }

    pub fn needs_flush(&self) -> bool {
        self.needs_flush_at(Instant::now())
    }

    /// `needs_flush` evaluated as if the current time were `now`
    pub fn needs_flush_at(&self, now: Instant) -> bool {
        let Some(age) = self.age else {
            return false;
        };
        !self.messages.is_empty()
            && (self.total_bytes > self.policy.max_bytes
                || now.saturating_duration_since(age) > self.policy.max_age)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn age(&self) -> Option<Instant> {
        self.age
    }

    pub fn metadata(&self) -> &RoutingMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> RoutingMetadata {
        RoutingMetadata::new("src".into(), "cat".into(), "host".into(), true)
    }

    #[test]
    fn test_append() {
        let mut buf = LogBuffer::new(metadata());
        buf.append("my dog has fleas");
        assert_eq!(buf.total_bytes(), 16);
        assert_eq!(buf.len(), 1);
        assert!(buf.age().is_some());
        assert!(!buf.needs_flush());
    }

    #[test]
    fn test_flush_on_size() {
        let mut buf = LogBuffer::new(metadata());
        buf.append("x".repeat(MAX_BUFFER_BYTES));
        assert!(!buf.needs_flush());
        buf.append("y");
        assert_eq!(buf.total_bytes(), MAX_BUFFER_BYTES + 1);
        assert!(buf.needs_flush());
    }

    #[test]
    fn test_flush_on_age() {
        let mut buf = LogBuffer::new(metadata());
        buf.append("hello");
        let start = buf.age().unwrap();
        assert!(!buf.needs_flush_at(start + MAX_BUFFER_AGE));
        assert!(buf.needs_flush_at(start + MAX_BUFFER_AGE + Duration::from_millis(1)));
    }

    #[test]
    fn test_age_set_only_on_first_append() {
        let mut buf = LogBuffer::new(metadata());
        buf.append("a");
        let first = buf.age();
        buf.append("b");
        assert_eq!(buf.age(), first);
    }

    #[test]
    fn test_empty_buffer_never_flushes() {
        let buf = LogBuffer::new(metadata());
        assert!(!buf.needs_flush_at(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_clear_resets_state_keeps_metadata() {
        let mut buf = LogBuffer::new(metadata());
        buf.append("x".repeat(MAX_BUFFER_BYTES + 10));
        assert!(buf.needs_flush());

        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.total_bytes(), 0);
        assert!(buf.age().is_none());
        assert!(!buf.needs_flush_at(Instant::now() + Duration::from_secs(3600)));
        assert_eq!(buf.metadata(), &metadata());
    }

    #[test]
    fn test_custom_policy() {
        let policy = FlushPolicy {
            max_bytes: 4,
            max_age: Duration::from_secs(60),
        };
        let mut buf = LogBuffer::with_policy(metadata(), policy);
        buf.append("abcd");
        assert!(!buf.needs_flush());
        buf.append("e");
        assert!(buf.needs_flush());
    }
}
