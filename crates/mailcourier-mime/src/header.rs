//! Ordered, case-insensitive header collection.
//!
//! Lookups ignore case; iteration preserves insertion order, which the
//! renderer relies on for deterministic wire output.

/// Collection of message headers.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing an existing value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for entry in &mut self.entries {
            if entry.0.eq_ignore_ascii_case(&name) {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((name, value));
    }

    /// Appends a header without touching existing values.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for a header, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value exists for a header.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of stored headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical wire capitalization for a header name.
///
/// Dash-separated parts are title-cased (`reply-to` → `Reply-To`), with
/// the conventional exceptions `Message-ID` and `MIME-Version`.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "message-id" => return "Message-ID".to_string(),
        "mime-version" => return "MIME-Version".to_string(),
        "cc" => return "Cc".to_string(),
        "bcc" => return "Bcc".to_string(),
        _ => {}
    }
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("From", "a@b.com");
        assert_eq!(headers.get("from"), Some("a@b.com"));
        assert_eq!(headers.get("FROM"), Some("a@b.com"));
    }

    #[test]
    fn set_replaces() {
        let mut headers = Headers::new();
        headers.set("subject", "one");
        headers.set("Subject", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("subject"), Some("two"));
    }

    #[test]
    fn iteration_preserves_order() {
        let mut headers = Headers::new();
        headers.set("from", "a@b");
        headers.set("x-first", "1");
        headers.set("x-second", "2");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["from", "x-first", "x-second"]);
    }

    #[test]
    fn remove_all() {
        let mut headers = Headers::new();
        headers.append("x-tag", "1");
        headers.append("X-Tag", "2");
        headers.remove("x-tag");
        assert!(headers.is_empty());
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name("from"), "From");
        assert_eq!(canonical_name("reply-to"), "Reply-To");
        assert_eq!(canonical_name("message-id"), "Message-ID");
        assert_eq!(canonical_name("mime-version"), "MIME-Version");
        assert_eq!(canonical_name("cc"), "Cc");
        assert_eq!(canonical_name("X-CUSTOM-HEADER"), "X-Custom-Header");
    }
}
