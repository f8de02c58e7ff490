//! Common Procurement Vocabulary (CPV) code hierarchy.
//!
//! CPV codes are eight digits, optionally followed by `-<check digit>`.
//! The number of trailing zeros tells how specific a code is.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpvLevel {
    Division,
    Group,
    Class,
    Category,
    Subclass,
}

impl CpvLevel {
    /// Classify a code by its trailing zeros
    pub fn of(code: &str) -> Self {
        let digits = strip_check_digit(code);
        if digits.ends_with("000000") {
            CpvLevel::Division
        } else if digits.ends_with("00000") {
            CpvLevel::Group
        } else if digits.ends_with("0000") {
            CpvLevel::Class
        } else if digits.ends_with("000") {
            CpvLevel::Category
        } else {
            CpvLevel::Subclass
        }
    }
}

/// A parsed CPV code with accessors for each hierarchy prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpvCode {
    digits: String,
}

impl CpvCode {
    pub fn parse(code: &str) -> Self {
        Self {
            digits: strip_check_digit(code.trim()).to_string(),
        }
    }

    /// Read a code from a JSON cell holding either a string or a number
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::parse(s)),
            Value::Number(n) => Some(Self::parse(&n.to_string())),
            _ => None,
        }
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn level(&self) -> CpvLevel {
        CpvLevel::of(&self.digits)
    }

    pub fn division(&self) -> &str {
        self.prefix(2)
    }

    pub fn group(&self) -> &str {
        self.prefix(3)
    }

    pub fn class(&self) -> &str {
        self.prefix(4)
    }

    pub fn category(&self) -> &str {
        self.prefix(5)
    }

    fn prefix(&self, len: usize) -> &str {
        match self.digits.char_indices().nth(len) {
            Some((end, _)) => &self.digits[..end],
            None => &self.digits,
        }
    }
}

fn strip_check_digit(code: &str) -> &str {
    code.split('-').next().unwrap_or(code)
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "DE")]
    description: String,
}

/// One described CPV code
#[derive(Debug, Clone, PartialEq)]
pub struct CpvEntry {
    pub code: CpvCode,
    pub description: String,
}

/// CPV code catalog with descriptions, read from a `CODE`,`DE` CSV export
#[derive(Debug, Clone, Default)]
pub struct CpvCatalog {
    entries: Vec<CpvEntry>,
}

impl CpvCatalog {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let catalog = Self::from_reader(file)?;
        debug!(path = %path.display(), entries = catalog.len(), "Loaded CPV catalog");
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let mut entries = Vec::new();
        for row in csv.deserialize::<CatalogRow>() {
            let row = row?;
            entries.push(CpvEntry {
                code: CpvCode::parse(&row.code),
                description: row.description,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries at one hierarchy level
    pub fn at_level(&self, level: CpvLevel) -> impl Iterator<Item = &CpvEntry> {
        self.entries.iter().filter(move |e| e.code.level() == level)
    }

    /// Division descriptions for a list of codes, sorted and unique
    pub fn division_labels<'a, I>(&self, codes: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a CpvCode>,
    {
        let mut labels = BTreeSet::new();
        for code in codes {
            for entry in self.at_level(CpvLevel::Division) {
                if entry.code.division() == code.division() {
                    labels.insert(entry.description.clone());
                }
            }
        }
        labels.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG: &str = "CODE,DE\n\
        45000000-7,Bauarbeiten\n\
        45200000-9,Komplett- oder Teilbauleistungen\n\
        45210000-2,Bauleistungen im Hochbau\n\
        45213000-3,Bauarbeiten fuer gewerbliche Gebaeude\n\
        45213100-4,Bauarbeiten fuer Geschaeftsgebaeude\n\
        72000000-5,IT-Dienste\n";

    #[test]
    fn test_levels_follow_trailing_zeros() {
        assert_eq!(CpvLevel::of("45000000-7"), CpvLevel::Division);
        assert_eq!(CpvLevel::of("45200000-9"), CpvLevel::Group);
        assert_eq!(CpvLevel::of("45210000-2"), CpvLevel::Class);
        assert_eq!(CpvLevel::of("45213000-3"), CpvLevel::Category);
        assert_eq!(CpvLevel::of("45213100-4"), CpvLevel::Subclass);
    }

    #[test]
    fn test_prefixes() {
        let code = CpvCode::parse("45213100-4");
        assert_eq!(code.digits(), "45213100");
        assert_eq!(code.division(), "45");
        assert_eq!(code.group(), "452");
        assert_eq!(code.class(), "4521");
        assert_eq!(code.category(), "45213");
        assert_eq!(CpvCode::parse("4").category(), "4");
    }

    #[test]
    fn test_from_value() {
        assert_eq!(CpvCode::from_value(&json!(72000000)).unwrap().division(), "72");
        assert!(CpvCode::from_value(&Value::Null).is_none());
        assert!(CpvCode::from_value(&json!("  ")).is_none());
    }

    #[test]
    fn test_division_labels_are_sorted_and_unique() {
        let catalog = CpvCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 6);

        let codes = [
            CpvCode::parse("72500000"),
            CpvCode::parse("45213100"),
            CpvCode::parse("45000000"),
        ];
        assert_eq!(
            catalog.division_labels(codes.iter()),
            vec!["Bauarbeiten".to_string(), "IT-Dienste".to_string()]
        );
    }
}
