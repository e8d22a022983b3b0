use chrono::{DateTime, Utc};

pub type Version = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    pub version: Version,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    pub fn new(version: Version, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Revisions in insertion order.
///
/// Versions are whatever callers supplied: they may arrive out of order and may
/// repeat. "Latest" always means most recently pushed, and lookups by version
/// return the earliest matching entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History(Vec<Revision>);

impl History {
    pub fn push(&mut self, revision: Revision) {
        self.0.push(revision);
    }

    pub fn latest(&self) -> Option<&Revision> {
        self.0.last()
    }

    pub fn latest_version(&self) -> Version {
        self.latest().map(|revision| revision.version).unwrap_or_default()
    }

    pub fn get(&self, version: Version) -> Option<&Revision> {
        self.0.iter().find(|revision| revision.version == version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Revision> for History {
    fn from_iter<I: IntoIterator<Item = Revision>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
