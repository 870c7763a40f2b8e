//! Archive event lines and the per-batch repository set.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Deserialize)]
struct Event {
    repo: Option<EventRepo>,
}

#[derive(Deserialize)]
struct EventRepo {
    name: Option<String>,
    url: Option<String>,
}

/// Extract `(name, url)` of the repository an archive event refers to.
///
/// ```
/// use gharvest_extract::parse_event_line;
/// let line = r#"{"type":"PushEvent","repo":{"id":1,"name":"rust-lang/rust","url":"https://api.github.com/repos/rust-lang/rust"}}"#;
/// let (name, url) = parse_event_line(line).unwrap();
/// assert_eq!(name, "rust-lang/rust");
/// assert_eq!(url, "https://api.github.com/repos/rust-lang/rust");
/// ```
pub fn parse_event_line(line: &str) -> Result<(String, String)> {
    let event: Event = serde_json::from_str(line).or_raise(|| ErrorKind::MalformedRecord)?;
    let repo = event.repo.ok_or_raise(|| ErrorKind::MissingField("repo"))?;
    let name = repo.name.filter(|name| !name.is_empty()).ok_or_raise(|| ErrorKind::MissingField("repo.name"))?;
    let url = repo.url.ok_or_raise(|| ErrorKind::MissingField("repo.url"))?;
    Ok((name, url))
}

/// What happened to the lines of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Non-blank lines seen.
    pub lines: usize,
    pub malformed: usize,
    /// Valid lines naming a repository already in the set.
    pub duplicates: usize,
}

/// Repository name to URL, in first-seen order; the first URL seen for a
/// name wins.
///
/// Serializes as a single JSON object, which is the consolidated-file format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSet {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl RepoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set for one batch file. Blank lines are ignored; malformed
    /// ones are logged and counted but never abort the batch.
    pub fn from_batch(text: &str) -> (Self, BatchReport) {
        let mut set = Self::new();
        let mut report = BatchReport::default();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            report.lines += 1;
            match parse_event_line(line) {
                Ok((name, url)) => {
                    if !set.insert(name, url) {
                        report.duplicates += 1;
                    }
                },
                Err(err) => {
                    report.malformed += 1;
                    tracing::warn!(line = number + 1, error = %err, "Skipping malformed event");
                },
            }
        }
        (set, report)
    }

    /// Returns `false` (and keeps the existing URL) if `name` is already present.
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) -> bool {
        let name = name.into();
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, url.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&position| self.entries[position].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, url)| (name.as_str(), url.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Pretty-printed JSON object, four-space indented.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer).or_raise(|| ErrorKind::Serialize)?;
        Ok(buffer)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::MalformedRecord)
    }
}

impl Serialize for RepoSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, url) in &self.entries {
            map.serialize_entry(name, url)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RepoSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RepoSetVisitor;

        impl<'de> Visitor<'de> for RepoSetVisitor {
            type Value = RepoSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping repository names to URLs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<RepoSet, A::Error> {
                let mut set = RepoSet::new();
                while let Some((name, url)) = access.next_entry::<String, String>()? {
                    set.insert(name, url);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(RepoSetVisitor)
    }
}

impl<N: Into<String>, U: Into<String>> FromIterator<(N, U)> for RepoSet {
    fn from_iter<I: IntoIterator<Item = (N, U)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, url) in iter {
            set.insert(name, url);
        }
        set
    }
}
