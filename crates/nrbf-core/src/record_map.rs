//! Identity map of decoded records.

use crate::error::{Error, Result};
use crate::record::{LibraryRecord, RecordId, RecordValue, SerializationRecord};
use std::collections::HashMap;

/// Every identity-bearing record of a payload, in decode order.
///
/// Records are stored once in an arena and looked up by id through an index;
/// references between records are plain [`RecordId`]s, so shared and cyclic
/// graphs need no owning pointers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMap {
    records: Vec<SerializationRecord>,
    index: HashMap<RecordId, usize>,
}

impl RecordMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a record; identities are write-once
    pub(crate) fn insert(&mut self, record: SerializationRecord, offset: u64) -> Result<usize> {
        let id = record.id();
        if self.index.contains_key(&id) {
            return Err(Error::format_violation(offset, format!("record id {id} is defined twice")));
        }
        let position = self.records.len();
        self.records.push(record);
        self.index.insert(id, position);
        Ok(position)
    }

    pub(crate) fn index_of(&self, id: RecordId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn at(&self, position: usize) -> &SerializationRecord {
        &self.records[position]
    }

    pub(crate) fn at_mut(&mut self, position: usize) -> &mut SerializationRecord {
        &mut self.records[position]
    }

    /// Look up a record by identity
    pub fn get(&self, id: RecordId) -> Option<&SerializationRecord> {
        self.records.get(self.index_of(id)?)
    }

    /// Returns true if a record with this identity was decoded
    pub fn contains(&self, id: RecordId) -> bool {
        self.index.contains_key(&id)
    }

    /// Library declared under `id`
    pub fn library(&self, id: RecordId) -> Option<&LibraryRecord> {
        self.get(id)?.as_library()
    }

    /// Record a slot value points at, if it is a reference
    pub fn resolve(&self, value: &RecordValue) -> Option<&SerializationRecord> {
        self.get(value.record_id()?)
    }

    /// Number of records, libraries included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no record was decoded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in decode order
    pub fn iter(&self) -> impl Iterator<Item = &SerializationRecord> + '_ {
        self.records.iter()
    }

    /// Records that are not library declarations
    pub fn objects(&self) -> impl Iterator<Item = &SerializationRecord> + '_ {
        self.records
            .iter()
            .filter(|record| !matches!(record, SerializationRecord::Library(_)))
    }
}

impl<'a> IntoIterator for &'a RecordMap {
    type Item = &'a SerializationRecord;
    type IntoIter = std::slice::Iter<'a, SerializationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StringRecord;
    use pretty_assertions::assert_eq;

    fn string(id: i32, value: &str) -> SerializationRecord {
        SerializationRecord::String(StringRecord {
            id: RecordId(id),
            value: value.to_string(),
        })
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut records = RecordMap::new();
        records.insert(string(1, "a"), 0).unwrap();
        records
            .insert(
                SerializationRecord::Library(LibraryRecord {
                    id: RecordId(-4),
                    name: "Lib".to_string(),
                }),
                10,
            )
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.contains(RecordId(-4)));
        assert_eq!(records.get(RecordId(1)).and_then(|r| r.as_str()), Some("a"));
        assert_eq!(records.library(RecordId(-4)).map(|l| l.name.as_str()), Some("Lib"));
        assert!(records.library(RecordId(1)).is_none());
        assert_eq!(records.objects().count(), 1);
        assert_eq!(
            records.resolve(&RecordValue::Record(RecordId(1))).map(|r| r.id()),
            Some(RecordId(1))
        );
        assert!(records.resolve(&RecordValue::Null).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut records = RecordMap::new();
        records.insert(string(5, "a"), 0).unwrap();
        let err = records.insert(string(5, "b"), 42).unwrap_err();
        assert!(matches!(err, Error::FormatViolation { offset: 42, .. }));
        assert_eq!(records.get(RecordId(5)).and_then(|r| r.as_str()), Some("a"));
    }
}
