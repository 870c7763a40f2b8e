//! Persisted position in the hourly archive sequence.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

// Days are only ever counted to 28, so every month is walked the same way.
const LAST_DAY: u8 = 28;
const LAST_HOUR: u8 = 23;
const LAST_MONTH: u8 = 12;

/// The next archive hour to fetch.
///
/// Ordering is chronological, and [`advance`](Self::advance) always moves
/// strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeCursor {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

impl TimeCursor {
    pub fn new(year: i32, month: u8, day: u8, hour: u8) -> Result<Self> {
        let cursor = Self { year, month, day, hour };
        cursor.validate()?;
        Ok(cursor)
    }

    fn validate(&self) -> Result<()> {
        let valid = (0..=9999).contains(&self.year)
            && (1..=LAST_MONTH).contains(&self.month)
            && (1..=LAST_DAY).contains(&self.day)
            && self.hour <= LAST_HOUR;
        if !valid {
            exn::bail!(ErrorKind::InvalidCursor(format!("{self:?}")));
        }
        Ok(())
    }

    /// Step forward one hour. Hour 23 rolls into the next day, and hour 23 of
    /// day 28 rolls into the first of the next month.
    pub fn advance(&mut self) {
        if self.hour < LAST_HOUR {
            self.hour += 1;
            return;
        }
        self.hour = 0;
        if self.day < LAST_DAY {
            self.day += 1;
            return;
        }
        self.day = 1;
        if self.month < LAST_MONTH {
            self.month += 1;
            return;
        }
        self.month = 1;
        self.year += 1;
    }

    pub fn next(mut self) -> Self {
        self.advance();
        self
    }

    /// Canonical archive name: zero-padded month and day, unpadded hour
    /// (`2015-01-01-15`).
    pub fn archive_name(&self) -> String {
        format!("{}-{:02}-{:02}-{}", self.year, self.month, self.day, self.hour)
    }

    /// Read the cursor file. `Ok(None)` if it does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io),
        };
        let cursor: Self =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidCursor(path.display().to_string()))?;
        cursor.validate()?;
        Ok(Some(cursor))
    }

    /// Replace the cursor file atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io)?;
        }
        let json = serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::InvalidCursor(self.archive_name()))?;
        let partial = partial_path(path);
        fs::write(&partial, json).await.or_raise(|| ErrorKind::Io)?;
        fs::rename(&partial, path).await.or_raise(|| ErrorKind::Io)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

impl fmt::Display for TimeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.archive_name())
    }
}

impl FromStr for TimeCursor {
    type Err = crate::error::Error;

    /// Parse the `YYYY-MM-DD-H` archive name format.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ErrorKind::InvalidCursor(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        let [year, month, day, hour] = parts.as_slice() else {
            exn::bail!(invalid());
        };
        Self::new(
            year.parse::<i32>().or_raise(invalid)?,
            month.parse::<u8>().or_raise(invalid)?,
            day.parse::<u8>().or_raise(invalid)?,
            hour.parse::<u8>().or_raise(invalid)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cursor(year: i32, month: u8, day: u8, hour: u8) -> TimeCursor {
        TimeCursor { year, month, day, hour }
    }

    #[rstest]
    #[case::hour(cursor(2015, 1, 1, 0), cursor(2015, 1, 1, 1))]
    #[case::day(cursor(2015, 1, 1, 23), cursor(2015, 1, 2, 0))]
    #[case::day_27(cursor(2015, 1, 27, 23), cursor(2015, 1, 28, 0))]
    #[case::month(cursor(2015, 1, 28, 23), cursor(2015, 2, 1, 0))]
    #[case::year(cursor(2015, 12, 28, 23), cursor(2016, 1, 1, 0))]
    fn test_advance(#[case] start: TimeCursor, #[case] expected: TimeCursor) {
        assert_eq!(start.next(), expected);
    }

    #[test]
    fn test_advance_never_regresses() {
        let mut current = cursor(2015, 11, 1, 0);
        for _ in 0..(24 * 28 * 3) {
            let next = current.next();
            assert!(next > current, "{next} <= {current}");
            current = next;
        }
        assert_eq!(current, cursor(2016, 2, 1, 0));
    }

    #[rstest]
    #[case(cursor(2015, 1, 1, 15), "2015-01-01-15")]
    #[case(cursor(2015, 1, 1, 5), "2015-01-01-5")]
    #[case(cursor(2023, 11, 28, 0), "2023-11-28-0")]
    fn test_archive_name(#[case] cursor: TimeCursor, #[case] expected: &str) {
        assert_eq!(cursor.archive_name(), expected);
        assert_eq!(expected.parse::<TimeCursor>().unwrap(), cursor);
    }

    #[rstest]
    #[case("2015-01-01")]
    #[case("2015-13-01-0")]
    #[case("2015-00-01-0")]
    #[case("2015-01-29-0")]
    #[case("2015-01-01-24")]
    #[case("yesterday")]
    #[case("2015-01-01-1-1")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<TimeCursor>().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TimeCursor::load(dir.path().join("cursor.json")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cursor.json");
        let saved = cursor(2020, 6, 14, 9);
        saved.save(&path).await.unwrap();
        assert_eq!(TimeCursor::load(&path).await.unwrap(), Some(saved));
        // No partial file is left behind.
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec!["cursor.json"]);
    }

    #[tokio::test]
    async fn test_load_accepts_legacy_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currentTime.json");
        std::fs::write(&path, "{\n    \"year\": 2016,\n    \"month\": 3,\n    \"day\": 4,\n    \"hour\": 5\n}").unwrap();
        assert_eq!(TimeCursor::load(&path).await.unwrap(), Some(cursor(2016, 3, 4, 5)));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, r#"{"year": 2016, "month": 14, "day": 1, "hour": 0}"#).unwrap();
        assert!(TimeCursor::load(&path).await.is_err());
        std::fs::write(&path, "not json").unwrap();
        assert!(TimeCursor::load(&path).await.is_err());
    }
}
