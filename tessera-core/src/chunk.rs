use crate::error::{Result, TesseraError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of one upload session. All objects of a session live under a
/// store directory named after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Version {
    type Err = TesseraError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TesseraError::InvalidVersion(
                "version cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('/') {
            return Err(TesseraError::InvalidVersion(format!(
                "version '{}' must not contain '/'",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical position of a chunk inside the dataset: a unique id plus the
/// inclusive key bounds it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub id: String,
    pub low: i64,
    pub high: i64,
}

impl KeyRange {
    pub fn new(id: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            id: id.into(),
            low,
            high,
        }
    }

    pub fn is_within(&self, low: i64, high: i64) -> bool {
        self.low >= low && self.high <= high
    }

    /// Single-line text form stored as the chunk's partial index record.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_record(record: &str) -> serde_json::Result<Self> {
        serde_json::from_str(record.trim())
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}]", self.id, self.low, self.high)
    }
}

#[derive(Debug, Clone)]
pub struct DataChunk {
    pub range: KeyRange,
    pub payload: Bytes,
}

impl DataChunk {
    pub fn new(range: KeyRange, payload: impl Into<Bytes>) -> Self {
        Self {
            range,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.range.id
    }
}
