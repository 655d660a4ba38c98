//! Shared types for journalship
//!
//! This crate contains data structures used across multiple journalship crates.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

// ============================================================================
// Journal Types
// ============================================================================

/// Well-known journal field names.
///
/// See systemd.journal-fields(7) for the full vocabulary.
pub mod fields {
    pub const MESSAGE: &str = "MESSAGE";
    pub const TRANSPORT: &str = "_TRANSPORT";
    pub const SYSTEMD_SLICE: &str = "_SYSTEMD_SLICE";
    pub const SYSTEMD_UNIT: &str = "_SYSTEMD_UNIT";
    pub const SYSLOG_IDENTIFIER: &str = "SYSLOG_IDENTIFIER";
    pub const CONTAINER_ID: &str = "CONTAINER_ID";
    pub const CONTAINER_ID_FULL: &str = "CONTAINER_ID_FULL";
    pub const HOSTNAME: &str = "_HOSTNAME";
}

/// Transports the journal can report in `_TRANSPORT`
pub const VALID_TRANSPORTS: [&str; 6] = ["audit", "driver", "syslog", "journal", "stdout", "kernel"];

/// A single journal entry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    /// Raw journal fields
    pub fields: HashMap<String, String>,

    /// Opaque journal cursor for this entry
    pub cursor: String,

    /// Receipt time in microseconds since the Unix epoch
    pub realtime_timestamp: u64,
}

impl Event {
    pub fn new(cursor: impl Into<String>, realtime_timestamp: u64) -> Self {
        Self {
            fields: HashMap::new(),
            cursor: cursor.into(),
            realtime_timestamp,
        }
    }

    /// Builder-style field setter, mostly useful for fixtures
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Look up a field, treating a missing field as empty
    pub fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn message(&self) -> &str {
        self.field(fields::MESSAGE)
    }

    pub fn transport(&self) -> &str {
        self.field(fields::TRANSPORT)
    }

    pub fn systemd_slice(&self) -> &str {
        self.field(fields::SYSTEMD_SLICE)
    }

    pub fn systemd_unit(&self) -> &str {
        self.field(fields::SYSTEMD_UNIT)
    }

    pub fn syslog_identifier(&self) -> &str {
        self.field(fields::SYSLOG_IDENTIFIER)
    }

    pub fn container_id(&self) -> &str {
        self.field(fields::CONTAINER_ID)
    }

    pub fn container_id_full(&self) -> &str {
        self.field(fields::CONTAINER_ID_FULL)
    }

    pub fn hostname(&self) -> &str {
        self.field(fields::HOSTNAME)
    }

    /// Whether the entry came from a process managed by systemd
    pub fn is_service_managed(&self) -> bool {
        !self.systemd_slice().is_empty()
    }

    /// Receipt time as a UTC timestamp
    pub fn realtime(&self) -> Option<DateTime<Utc>> {
        let micros = i64::try_from(self.realtime_timestamp).ok()?;
        DateTime::from_timestamp_micros(micros)
    }

    /// Render as "<timestamp>: <host>: <message>"
    pub fn formatted(&self) -> String {
        let ts = self
            .realtime()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        format!("{}: {}: {}", ts, self.hostname(), self.message())
    }
}

// ============================================================================
// Routing Types
// ============================================================================

/// Routing metadata attached to every uploaded batch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingMetadata {
    pub source: String,
    pub category: String,
    pub host: String,

    /// Whether the collector should parse timestamps out of the log text
    pub trusted_timestamp: bool,
}

impl RoutingMetadata {
    pub fn new(source: String, category: String, host: String, trusted_timestamp: bool) -> Self {
        Self {
            source,
            category,
            host,
            trusted_timestamp,
        }
    }

    /// Metadata for a plain process: `<category>/<kind>/<name>`, trusted
    pub fn for_process(defaults: &RoutingMetadata, kind: &str, name: &str) -> Self {
        Self {
            source: name.to_string(),
            category: format!("{}/{}/{}", defaults.category, kind, name),
            host: defaults.host.clone(),
            trusted_timestamp: true,
        }
    }
}

// ============================================================================
// Provenance Types
// ============================================================================

/// Container details reported by the container runtime
#[derive(Clone, Debug, Default)]
pub struct ContainerInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            labels: HashMap::new(),
        }
    }

    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }
}

/// Pod details reported by the orchestrator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,

    /// Name of the first owner reference (deployment, daemonset, ...)
    pub owner: Option<String>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            owner: None,
        }
    }
}

// ============================================================================
// List Helpers
// ============================================================================

/// Returns true iff haystack contains needle
pub fn list_contains<S: AsRef<str>>(haystack: &[S], needle: &str) -> bool {
    haystack.iter().any(|straw| straw.as_ref() == needle)
}

/// Elements of `a` that are also in `b`, in `a`'s order
pub fn list_intersect<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> Vec<String> {
    a.iter()
        .map(AsRef::as_ref)
        .filter(|s| list_contains(b, s))
        .map(str::to_string)
        .collect()
}

/// Elements of `a` that are not in `b`, in `a`'s order
pub fn list_subtract<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> Vec<String> {
    a.iter()
        .map(AsRef::as_ref)
        .filter(|s| !list_contains(b, s))
        .map(str::to_string)
        .collect()
}

/// Split on `sep`, returning an empty list for an empty input
pub fn split(s: &str, sep: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(sep).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_contains() {
        let a = ["foo", "bar"];
        assert!(list_contains(&a, "foo"));
        assert!(!list_contains(&a, "baz"));
    }

    #[test]
    fn test_list_intersect() {
        let a = ["foo", "baz"];
        let b = ["a", "foo", "b", "bim"];
        let empty: [&str; 0] = [];
        assert_eq!(list_intersect(&a, &b), vec!["foo".to_string()]);
        assert!(list_intersect(&a, &empty).is_empty());
    }

    #[test]
    fn test_list_intersect_keeps_duplicates_from_first() {
        let a = ["x", "y", "x"];
        let b = ["x"];
        assert_eq!(list_intersect(&a, &b), vec!["x", "x"]);
    }

    #[test]
    fn test_list_subtract() {
        let a = ["foo", "bar", "baz"];
        let b = ["bar"];
        assert_eq!(list_subtract(&a, &b), vec!["foo", "baz"]);
        assert!(list_subtract(&b, &a).is_empty());
    }

    #[test]
    fn test_split_empty() {
        assert!(split("", ",").is_empty());
        assert_eq!(split("a,b", ","), vec!["a", "b"]);
        assert_eq!(split("a", ","), vec!["a"]);
    }

    #[test]
    fn test_event_missing_field_is_empty() {
        let event = Event::new("c1", 0);
        assert_eq!(event.transport(), "");
        assert!(!event.is_service_managed());
    }

    #[test]
    fn test_formatted_line() {
        let event = Event::new("c1", 1_527_115_596_680_939)
            .with_field(fields::HOSTNAME, "localhost")
            .with_field(fields::MESSAGE, "hello");
        assert_eq!(event.formatted(), "2018-05-23T22:46:36Z: localhost: hello");
    }

    #[test]
    fn test_metadata_for_process() {
        let defaults = RoutingMetadata::new("src".into(), "prod".into(), "host1".into(), false);
        let md = RoutingMetadata::for_process(&defaults, "systemd", "sshd");
        assert_eq!(md.category, "prod/systemd/sshd");
        assert_eq!(md.source, "sshd");
        assert_eq!(md.host, "host1");
        assert!(md.trusted_timestamp);
    }
}
