use crate::types::{RoleId, SubjectId};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An active role grant, keyed by subject in the store.
///
/// On disk this is `{ "roleId": "...", "expireDate": "<ISO-8601>" }`; unknown
/// fields are ignored when reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Granted role.
    pub role_id: RoleId,
    /// Instant after which the grant is no longer valid.
    #[serde(rename = "expireDate", with = "iso8601")]
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    /// Creates a grant record.
    pub fn new(role_id: RoleId, expires_at: DateTime<Utc>) -> Self {
        Self {
            role_id,
            expires_at,
        }
    }

    /// Returns whether the grant has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left until expiry, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.expires_at - now).max(TimeDelta::zero())
    }
}

mod iso8601 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Insertion-ordered mapping of subject to grant.
///
/// Serializes as a JSON object whose key order is the iteration order, so
/// pagination stays stable across restarts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GrantMap {
    entries: Vec<(SubjectId, Grant)>,
}

impl GrantMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no grants are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, subject: &SubjectId) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == subject)
    }

    /// Looks up the grant for a subject.
    pub fn get(&self, subject: &SubjectId) -> Option<&Grant> {
        self.position(subject).map(|idx| &self.entries[idx].1)
    }

    /// Returns whether the subject holds a grant.
    pub fn contains(&self, subject: &SubjectId) -> bool {
        self.position(subject).is_some()
    }

    /// Inserts or replaces a grant. A replaced entry keeps its position.
    pub fn insert(&mut self, subject: SubjectId, grant: Grant) -> Option<Grant> {
        match self.position(&subject) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, grant)),
            None => {
                self.entries.push((subject, grant));
                None
            }
        }
    }

    /// Removes a grant, preserving the order of the remaining entries.
    pub fn remove(&mut self, subject: &SubjectId) -> Option<Grant> {
        self.position(subject)
            .map(|idx| self.entries.remove(idx).1)
    }

    /// Iterates grants in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&SubjectId, &Grant)> {
        self.entries.iter().map(|(subject, grant)| (subject, grant))
    }

    /// Returns owned entries in insertion order.
    pub fn to_vec(&self) -> Vec<(SubjectId, Grant)> {
        self.entries.clone()
    }
}

impl FromIterator<(SubjectId, Grant)> for GrantMap {
    fn from_iter<I: IntoIterator<Item = (SubjectId, Grant)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (subject, grant) in iter {
            map.insert(subject, grant);
        }
        map
    }
}

impl Serialize for GrantMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (subject, grant) in &self.entries {
            map.serialize_entry(subject, grant)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GrantMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GrantMapVisitor;

        impl<'de> Visitor<'de> for GrantMapVisitor {
            type Value = GrantMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping subject ids to grants")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<GrantMap, A::Error> {
                let mut map = GrantMap::new();
                while let Some((subject, grant)) = access.next_entry::<SubjectId, Grant>()? {
                    map.insert(subject, grant);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(GrantMapVisitor)
    }
}
