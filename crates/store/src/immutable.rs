use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Collections that reject every write.
///
/// Entries are `database/collection` pairs. Configuration may list them or
/// give the compact `db/coll;db2/coll2` string accepted by [`parse`].
///
/// [`parse`]: ImmutableCollections::parse
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImmutableSource", into = "Vec<String>")]
pub struct ImmutableCollections {
    entries: BTreeSet<(String, String)>,
}

/// Accepted configuration shapes.
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ImmutableSource {
    List(Vec<String>),
    Compact(String),
}

impl ImmutableCollections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `db/coll;db2/coll2`. Blank segments are ignored.
    pub fn parse(spec: &str) -> Result<Self, StoreError> {
        let mut set = Self::new();
        for segment in spec.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            set.insert_entry(segment)?;
        }
        Ok(set)
    }

    pub fn with(mut self, database: impl Into<String>, collection: impl Into<String>) -> Self {
        self.entries.insert((database.into(), collection.into()));
        self
    }

    pub fn contains(&self, database: &str, collection: &str) -> bool {
        self.entries
            .iter()
            .any(|(db, coll)| db == database && coll == collection)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail with [`StoreError::ImmutableCollection`] when the pair is listed.
    pub fn check(&self, database: &str, collection: &str) -> Result<(), StoreError> {
        if self.contains(database, collection) {
            return Err(StoreError::ImmutableCollection {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }
        Ok(())
    }

    fn insert_entry(&mut self, entry: &str) -> Result<(), StoreError> {
        match entry.split_once('/') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() && !coll.contains('/') => {
                self.entries.insert((db.to_string(), coll.to_string()));
                Ok(())
            }
            _ => Err(StoreError::InvalidName(format!(
                "immutable collection entry '{entry}' must be 'database/collection'"
            ))),
        }
    }
}

impl TryFrom<ImmutableSource> for ImmutableCollections {
    type Error = StoreError;

    fn try_from(value: ImmutableSource) -> Result<Self, Self::Error> {
        match value {
            ImmutableSource::Compact(spec) => Self::parse(&spec),
            ImmutableSource::List(entries) => {
                let mut set = Self::new();
                for entry in &entries {
                    set.insert_entry(entry.trim())?;
                }
                Ok(set)
            }
        }
    }
}

impl From<ImmutableCollections> for Vec<String> {
    fn from(value: ImmutableCollections) -> Self {
        value
            .entries
            .into_iter()
            .map(|(db, coll)| format!("{db}/{coll}"))
            .collect()
    }
}

impl fmt::Display for ImmutableCollections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (db, coll) in &self.entries {
            if !first {
                f.write_str(";")?;
            }
            write!(f, "{db}/{coll}")?;
            first = false;
        }
        Ok(())
    }
}
