//! Event Record wire format: one tab-separated line of 40 fields.
//!
//! `AD` (click flag / join code), `COUNTF1..COUNTF13` integer counters and
//! `CATF1..CATF26` 32-bit hashed categorical tokens rendered as 8 hex chars.
//! Empty counter and categorical fields are missing values in the source data.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const COUNT_FEATURES: usize = 13;
pub const CATEGORICAL_FEATURES: usize = 26;
pub const FIELD_COUNT: usize = 1 + COUNT_FEATURES + CATEGORICAL_FEATURES;
pub const TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("expected 40 fields, found {0}")]
    FieldCount(usize),
    #[error("missing AD field")]
    MissingAd,
    #[error("field {field}: not an integer: {value:?}")]
    NotInteger { field: String, value: String },
    #[error("field {field}: not an 8-char hex token: {value:?}")]
    BadToken { field: String, value: String },
}

/// Hashed categorical value, e.g. `68fd1e64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatToken(u32);

impl CatToken {
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != TOKEN_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(s, 16).ok().map(CatToken)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CatToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ad: i64,
    pub counts: [Option<i64>; COUNT_FEATURES],
    pub categories: [Option<CatToken>; CATEGORICAL_FEATURES],
}

impl EventRecord {
    /// Parse one line (without or with its `\n` / `\r\n` terminator).
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(RecordError::FieldCount(fields.len()));
        }

        let ad_raw = fields[0].trim();
        if ad_raw.is_empty() {
            return Err(RecordError::MissingAd);
        }
        let ad = ad_raw.parse::<i64>().map_err(|_| RecordError::NotInteger {
            field: "AD".to_string(),
            value: ad_raw.to_string(),
        })?;

        let mut counts = [None; COUNT_FEATURES];
        for (i, raw) in fields[1..=COUNT_FEATURES].iter().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            counts[i] = Some(raw.parse::<i64>().map_err(|_| RecordError::NotInteger {
                field: format!("COUNTF{}", i + 1),
                value: raw.to_string(),
            })?);
        }

        let mut categories = [None; CATEGORICAL_FEATURES];
        for (i, raw) in fields[1 + COUNT_FEATURES..].iter().enumerate() {
            if raw.is_empty() {
                continue;
            }
            categories[i] = Some(CatToken::parse(raw).ok_or_else(|| RecordError::BadToken {
                field: format!("CATF{}", i + 1),
                value: raw.to_string(),
            })?);
        }

        Ok(Self {
            ad,
            counts,
            categories,
        })
    }

    /// Render back to the wire format (no terminator).
    pub fn to_line(&self) -> String {
        let mut out = self.ad.to_string();
        for c in &self.counts {
            out.push('\t');
            if let Some(v) = c {
                out.push_str(&v.to_string());
            }
        }
        for t in &self.categories {
            out.push('\t');
            if let Some(t) = t {
                out.push_str(&t.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_with_ad(ad: &str) -> String {
        let mut fields = vec![ad.to_string()];
        fields.extend((1..=COUNT_FEATURES).map(|i| i.to_string()));
        fields.extend((0..CATEGORICAL_FEATURES).map(|i| format!("{:08x}", 0x68fd_1e00 + i)));
        fields.join("\t")
    }

    #[test]
    fn parses_full_record() {
        let r = EventRecord::parse(&line_with_ad("1")).unwrap();
        assert_eq!(r.ad, 1);
        assert_eq!(r.counts[0], Some(1));
        assert_eq!(r.counts[12], Some(13));
        assert_eq!(r.categories[0].unwrap().to_string(), "68fd1e00");
    }

    #[test]
    fn tolerates_crlf_and_missing_values() {
        let mut fields: Vec<String> = vec!["0".into()];
        fields.extend(std::iter::repeat(String::new()).take(COUNT_FEATURES));
        fields.extend(std::iter::repeat(String::new()).take(CATEGORICAL_FEATURES));
        let line = format!("{}\r\n", fields.join("\t"));
        let r = EventRecord::parse(&line).unwrap();
        assert_eq!(r.ad, 0);
        assert!(r.counts.iter().all(Option::is_none));
        assert!(r.categories.iter().all(Option::is_none));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            EventRecord::parse("1\t2\t3"),
            Err(RecordError::FieldCount(3))
        );
    }

    #[test]
    fn rejects_non_numeric_counter() {
        let line = line_with_ad("1").replacen("\t5\t", "\tfive\t", 1);
        assert!(matches!(
            EventRecord::parse(&line),
            Err(RecordError::NotInteger { ref field, .. }) if field == "COUNTF5"
        ));
    }

    #[test]
    fn rejects_missing_or_bad_ad() {
        assert_eq!(EventRecord::parse(&line_with_ad("")), Err(RecordError::MissingAd));
        assert!(matches!(
            EventRecord::parse(&line_with_ad("x")),
            Err(RecordError::NotInteger { .. })
        ));
    }

    #[test]
    fn rejects_bad_token() {
        let line = line_with_ad("1").replace("68fd1e00", "zzzz1e00");
        assert!(matches!(
            EventRecord::parse(&line),
            Err(RecordError::BadToken { ref field, .. }) if field == "CATF1"
        ));
    }

    #[test]
    fn to_line_reproduces_wire_format() {
        let line = line_with_ad("7");
        assert_eq!(EventRecord::parse(&line).unwrap().to_line(), line);
    }
}
