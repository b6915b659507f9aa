//! Source locations and the upstream location-string format.

use serde_json::Value;

/// Source location of an ICFG node.
///
/// An empty location (no file, line 0) means the upstream analysis had no
/// debug information for the node; such nodes never match a target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Parse the upstream location string.
    ///
    /// The format is a JSON object with keys `ln`, `cl` and `fl` (or
    /// `file`), optionally nested under a `location` key, and sometimes
    /// polluted with a `"basic block"` member that must be dropped before
    /// parsing. Anything unparseable yields the empty location.
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_basic_block(raw);
        let Ok(value) = serde_json::from_str::<Value>(&cleaned) else {
            return Self::default();
        };
        let obj = match value.get("location") {
            Some(inner) => inner,
            None => &value,
        };

        let mut loc = Self::default();
        if let Some(line) = obj.get("ln").and_then(Value::as_u64) {
            loc.line = line as u32;
        }
        if let Some(column) = obj.get("cl").and_then(Value::as_u64) {
            loc.column = column as u32;
        }
        if let Some(file) = obj.get("fl").and_then(Value::as_str) {
            loc.file = file.to_string();
        }
        if let Some(file) = obj.get("file").and_then(Value::as_str) {
            loc.file = file.to_string();
        }
        loc
    }

    /// True when the upstream analysis attached no usable location.
    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }

    /// Path components of the file.
    pub fn path_chunks(&self) -> Vec<&str> {
        if self.file.is_empty() {
            Vec::new()
        } else {
            self.file.split('/').collect()
        }
    }
}

/// Remove a `"basic block"` member so the remainder parses as JSON.
fn strip_basic_block(raw: &str) -> String {
    let Some(pos) = raw.find("\"basic block\"") else {
        return raw.to_string();
    };
    match raw[pos..].find(',') {
        Some(offset) => format!("{}{}", &raw[..pos], &raw[pos + offset + 1..]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let loc = Location::parse(r#"{ "ln": 193, "cl": 5, "fl": "src/util/log.c" }"#);
        assert_eq!(loc.line, 193);
        assert_eq!(loc.column, 5);
        assert_eq!(loc.file, "src/util/log.c");
        assert!(!loc.is_empty());
    }

    #[test]
    fn test_parse_nested_location() {
        let loc = Location::parse(r#"{ "location": { "ln": 7, "file": "a.c" } }"#);
        assert_eq!(loc.line, 7);
        assert_eq!(loc.file, "a.c");
    }

    #[test]
    fn test_parse_basic_block_member_dropped() {
        let loc =
            Location::parse(r#"{ "basic block": "entry", "ln": 12, "fl": "m.c" }"#);
        assert_eq!(loc.line, 12);
        assert_eq!(loc.file, "m.c");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(Location::parse("").is_empty());
        assert!(Location::parse("not json").is_empty());
        assert!(Location::parse("[1,2]").is_empty());
    }

    #[test]
    fn test_path_chunks() {
        let loc = Location::new("a/b/c.c", 1, 0);
        assert_eq!(loc.path_chunks(), vec!["a", "b", "c.c"]);
        assert!(Location::default().path_chunks().is_empty());
    }
}
