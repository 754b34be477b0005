use std::fmt;
use std::collections::BTreeMap;
use serde::Serialize;
use crate::error::{Result, ShipError};

const EXTRA_LABEL_PREFIX: &str = "__extra_";

/// Checks a label name against `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Routing labels attached to every entry of a stream.
///
/// Backed by an ordered map, so two sets holding the same pairs compare and
/// hash equal no matter the order they were built in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {

    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Copies every pair of `other` into this set, `other` wins on collision.
    pub fn merge(&mut self, other: &LabelSet) {
        for (name, value) in other.iter() {
            self.0.insert(name.to_string(), value.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Static labels added to, and label names dropped from, every resolved set.
#[derive(Debug, Clone, Default)]
pub struct LabelPolicy {
    extra: LabelSet,
    drop: Vec<String>,
}

impl LabelPolicy {

    /// `extra` is the raw `name1,value1,name2,value2` list.
    pub fn new(extra: &str, omit_prefix: bool, drop: &str) -> Result<Self> {

        // empty values are kept so names and values never shift
        let items: Vec<&str> = if extra.trim().is_empty() {
            Vec::new()
        } else {
            extra.split(',').map(|x| x.trim()).collect()
        };
        if items.len() % 2 != 0 {
            return Err(ShipError::Config(
                format!("extra labels must be name/value pairs, got {} items", items.len())));
        }

        let mut labels = LabelSet::new();
        for pair in items.chunks(2) {
            if pair[0].is_empty() {
                return Err(ShipError::Config(format!("empty extra label name in {:?}", extra)));
            }
            let name = if omit_prefix {
                pair[0].to_string()
            } else {
                format!("{}{}", EXTRA_LABEL_PREFIX, pair[0])
            };
            if !is_valid_label_name(&name) {
                return Err(ShipError::Config(format!("invalid extra label name {:?}", name)));
            }
            labels.insert(name, pair[1]);
        }

        let drop = drop.split(',')
                        .map(|x| x.trim())
                        .filter(|x| !x.is_empty())
                        .map(|x| x.to_string())
                        .collect();

        Ok(Self {
            extra: labels,
            drop: drop,
        })
    }

    pub fn apply(&self, mut labels: LabelSet) -> LabelSet {
        labels.merge(&self.extra);
        for name in &self.drop {
            labels.remove(name);
        }
        labels
    }
}
