//! Human-readable byte sizes for configuration values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows 64 bits: {0}")]
    Overflow(String),
}

/// Byte count that deserializes from `"2MB"`-style strings or integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"2MB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("byte size must not be negative: {v}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if let Ok(num) = s.parse::<u64>() {
            return Ok(ByteSize(num));
        }

        let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) else {
            return Err(ParseError::InvalidFormat(s));
        };
        let (num_str, unit) = s.split_at(pos);
        if num_str.is_empty() {
            return Err(ParseError::InvalidFormat(s.clone()));
        }
        let num: u64 = num_str.parse()?;

        let multiplier: u64 = match unit.trim() {
            "B" => 1,
            "K" | "KB" | "KIB" => 1024,
            "M" | "MB" | "MIB" => 1024 * 1024,
            "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or(ParseError::Overflow(s))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[(&str, u64)] = &[("GB", 1024 * 1024 * 1024), ("MB", 1024 * 1024), ("KB", 1024)];

        for &(unit, divisor) in UNITS {
            if self.0 >= divisor && self.0 % divisor == 0 {
                return write!(f, "{}{}", self.0 / divisor, unit);
            }
        }
        write!(f, "{}B", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("1024".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("512KiB".parse::<ByteSize>().unwrap().as_u64(), 512 * 1024);
        assert_eq!("2MB".parse::<ByteSize>().unwrap().as_u64(), 2 * 1024 * 1024);
        assert_eq!(" 2 m".parse::<ByteSize>().unwrap().as_u64(), 2 * 1024 * 1024);
        assert_eq!("1G".parse::<ByteSize>().unwrap().as_u64(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("MB".parse::<ByteSize>(), Err(ParseError::InvalidFormat(_))));
        assert!(matches!("5XB".parse::<ByteSize>(), Err(ParseError::InvalidUnit(_))));
        assert!(matches!(
            "99999999999999999GB".parse::<ByteSize>(),
            Err(ParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ByteSize(2 * 1024 * 1024).to_string(), "2MB");
        assert_eq!(ByteSize(1536).to_string(), "1536B");
        assert_eq!(ByteSize(3 * 1024).to_string(), "3KB");
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Sizes {
            a: ByteSize,
            b: ByteSize,
        }
        let parsed: Sizes = serde_json::from_str(r#"{"a": "4MB", "b": 4096}"#).unwrap();
        assert_eq!(parsed.a.as_u64(), 4 * 1024 * 1024);
        assert_eq!(parsed.b.as_u64(), 4096);
    }
}
