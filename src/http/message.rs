use std::fmt;

/// Canonicalizes a header key to title-case-with-hyphen: the first letter
/// and every letter following a `-` is uppercased, everything else
/// lowercased (`content-type` → `Content-Type`). Matches `to_pascal_case`
/// in the teacher's response writer, generalized to request headers too.
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut cap_next = true;
    for c in key.chars() {
        if c == '-' {
            out.push('-');
            cap_next = true;
        } else if cap_next {
            out.extend(c.to_uppercase());
            cap_next = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn lookup_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// An HTTP header map: insertion-ordered for deterministic wire output,
/// case-insensitive for lookup, title-cased on the wire. A second
/// occurrence of a key already present is joined onto the first with
/// `", "` (RFC 7230 §3.2.2) rather than stored as a separate entry, so a
/// header map never holds two entries that compare equal under key
/// canonicalization.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn find(&self, key: &str) -> Option<usize> {
        let want = lookup_key(key);
        self.entries.iter().position(|(k, _)| lookup_key(k) == want)
    }

    /// Sets `key` to `value`, replacing any existing entry instead of
    /// joining (used for headers this core synthesizes itself, where a
    /// duplicate would be a bug rather than a client sending the same
    /// header twice).
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.find(key) {
            Some(i) => self.entries[i] = (canonical_key(key), value),
            None => self.entries.push((canonical_key(key), value)),
        }
    }

    /// Appends `value` onto `key`, joining with `", "` if `key` is
    /// already present. Used while parsing, where RFC 7230 requires
    /// repeated header lines to combine.
    pub fn append(&mut self, key: &str, value: &str) {
        match self.find(key) {
            Some(i) => {
                self.entries[i].1.push_str(", ");
                self.entries[i].1.push_str(value);
            }
            None => self.entries.push((canonical_key(key), value.to_string())),
        }
    }

    /// Joins `extra` onto `key`'s value with a single space rather than
    /// `", "` — used for obs-fold continuation lines, which RFC 7230
    /// §3.2.4 says collapse to one space, not a new list element.
    pub fn append_fold(&mut self, key: &str, extra: &str) {
        if let Some(i) = self.find(key) {
            if !extra.is_empty() {
                self.entries[i].1.push(' ');
                self.entries[i].1.push_str(extra);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.find(key).map(|i| self.entries[i].1.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.find(key).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (k, v) in &self.entries {
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_mixed_case_keys() {
        assert_eq!(canonical_key("content-type"), "Content-Type");
        assert_eq!(canonical_key("X-FORWARDED-FOR"), "X-Forwarded-For");
        assert_eq!(canonical_key("host"), "Host");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.set("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn repeated_header_joins_with_comma_space() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("set-cookie", "b=2");
        assert_eq!(h.get("Set-Cookie"), Some("a=1, b=2"));
        assert_eq!(h.len(), 1);
    }
}
