//! String-valued tags propagated through an operation's context and used as metric
//! dimensions.

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::Context;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Maximum length of a tag key or value, in bytes.
pub const MAX_TAG_LEN: usize = 255;

/// Name of a tag dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagKey(&'static str);

impl TagKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Operation kind of a per-operation measurement.
pub const OPERATION: TagKey = TagKey::new("operation");
/// Table of a per-operation measurement.
pub const TABLE: TagKey = TagKey::new("table");
/// Logical database name of a pool measurement.
pub const DATABASE: TagKey = TagKey::new("database");
/// Reserved: start timestamp of the in-flight operation. Never set by callers.
pub const QUERY_START: TagKey = TagKey::new("sql.query_start");

/// Rejected tag mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("invalid tag key `{0}`: empty, too long or has control characters")]
    InvalidKey(&'static str),
    #[error("invalid value for tag `{key}`: too long or has control characters")]
    InvalidValue { key: &'static str },
}

/// A change to a [`TagMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutator {
    /// Insert or replace.
    Upsert(TagKey, String),
    /// Insert only if absent.
    Insert(TagKey, String),
    /// Replace only if present.
    Update(TagKey, String),
    /// Remove.
    Delete(TagKey),
}

impl Mutator {
    pub fn upsert(key: TagKey, value: impl Into<String>) -> Self {
        Self::Upsert(key, value.into())
    }
}

/// An immutable-by-convention set of tags. Mutations produce a new map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    tags: BTreeMap<TagKey, String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutators` in order to a copy of this map.
    ///
    /// Validation happens up front: on error the result is discarded and `self` is
    /// untouched.
    pub fn apply<'a, I>(&self, mutators: I) -> Result<TagMap, TagError>
    where
        I: IntoIterator<Item = &'a Mutator>,
    {
        let mut tags = self.tags.clone();
        for m in mutators {
            match m {
                Mutator::Upsert(k, v) => {
                    validate(*k, v)?;
                    tags.insert(*k, v.clone());
                }
                Mutator::Insert(k, v) => {
                    validate(*k, v)?;
                    tags.entry(*k).or_insert_with(|| v.clone());
                }
                Mutator::Update(k, v) => {
                    validate(*k, v)?;
                    if let Some(slot) = tags.get_mut(k) {
                        *slot = v.clone();
                    }
                }
                Mutator::Delete(k) => {
                    tags.remove(k);
                }
            }
        }
        Ok(TagMap { tags })
    }

    pub fn value(&self, key: TagKey) -> Option<&str> {
        self.tags.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: TagKey) -> bool {
        self.tags.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagKey, &str)> {
        self.tags.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: TagKey) -> Option<String> {
        self.tags.remove(&key)
    }
}

impl<const N: usize> TryFrom<[(TagKey, &str); N]> for TagMap {
    type Error = TagError;

    fn try_from(pairs: [(TagKey, &str); N]) -> Result<Self, Self::Error> {
        let mutators: Vec<_> = pairs
            .into_iter()
            .map(|(k, v)| Mutator::upsert(k, v))
            .collect();
        TagMap::new().apply(&mutators)
    }
}

fn printable(s: &str) -> bool {
    !s.chars().any(char::is_control)
}

fn validate(key: TagKey, value: &str) -> Result<(), TagError> {
    let name = key.name();
    if name.is_empty() || name.len() > MAX_TAG_LEN || !printable(name) {
        return Err(TagError::InvalidKey(name));
    }
    if value.len() > MAX_TAG_LEN || !printable(value) {
        return Err(TagError::InvalidValue { key: name });
    }
    Ok(())
}

/// Tag access on a propagated [`Context`].
pub trait TagContextExt {
    /// The tag map carried by this context, if any.
    fn tag_map(&self) -> Option<&TagMap>;

    /// A copy of this context carrying `tags` instead of its current map.
    fn with_tag_map(&self, tags: TagMap) -> Context;

    /// A copy of this context with `mutators` applied to its tag map.
    fn with_tags(&self, mutators: &[Mutator]) -> Result<Context, TagError>;
}

impl TagContextExt for Context {
    fn tag_map(&self) -> Option<&TagMap> {
        self.get::<TagMap>()
    }

    fn with_tag_map(&self, tags: TagMap) -> Context {
        self.with_value(tags)
    }

    fn with_tags(&self, mutators: &[Mutator]) -> Result<Context, TagError> {
        let tags = match self.tag_map() {
            Some(current) => current.apply(mutators)?,
            None => TagMap::new().apply(mutators)?,
        };
        Ok(self.with_value(tags))
    }
}

/// Encode an instant as a fixed-precision UTC timestamp tag value.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&Utc))
}

/// Milliseconds from `start` to `now`, never negative.
pub fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let nanos = (now - start).num_nanoseconds().unwrap_or(i64::MAX);
    nanos.max(0) as f64 / 1e6
}
