// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Payload serialization boundary
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The journal only stores byte payloads. An `EntrySerdes` turns typed
// entries into payloads and back. `None` is the absent (tombstone)
// payload.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{JournalError, JournalResult};

/// Converts typed journal entries to and from byte payloads.
pub trait EntrySerdes: Send + Sync + 'static {
    /// The typed entry.
    type Entry;

    /// Encode an entry. `None` stores a tombstone frame.
    fn encode(&self, entry: &Self::Entry) -> JournalResult<Option<Vec<u8>>>;

    /// Decode a payload. `None` is a tombstone frame.
    fn decode(&self, payload: Option<&[u8]>) -> JournalResult<Self::Entry>;
}

fn tombstone_error() -> JournalError {
    JournalError::Serialization("unexpected tombstone payload".to_string())
}

/// Raw byte entries, stored as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerdes;

impl EntrySerdes for BytesSerdes {
    type Entry = Vec<u8>;

    fn encode(&self, entry: &Vec<u8>) -> JournalResult<Option<Vec<u8>>> {
        Ok(Some(entry.clone()))
    }

    fn decode(&self, payload: Option<&[u8]>) -> JournalResult<Vec<u8>> {
        payload.map(<[u8]>::to_vec).ok_or_else(tombstone_error)
    }
}

/// Entries serialized as JSON with serde_json.
pub struct JsonSerdes<T> {
    _entry: PhantomData<fn() -> T>,
}

impl<T> JsonSerdes<T> {
    /// Create a JSON serdes for `T`.
    pub fn new() -> Self {
        Self {
            _entry: PhantomData,
        }
    }
}

impl<T> Default for JsonSerdes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerdes<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerdes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonSerdes")
    }
}

impl<T> EntrySerdes for JsonSerdes<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type Entry = T;

    fn encode(&self, entry: &T) -> JournalResult<Option<Vec<u8>>> {
        Ok(Some(serde_json::to_vec(entry)?))
    }

    fn decode(&self, payload: Option<&[u8]>) -> JournalResult<T> {
        let bytes = payload.ok_or_else(tombstone_error)?;
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Wraps another serdes so that `None` entries are stored as tombstones.
#[derive(Debug, Clone, Default)]
pub struct Tombstoned<S>(pub S);

impl<S: EntrySerdes> EntrySerdes for Tombstoned<S> {
    type Entry = Option<S::Entry>;

    fn encode(&self, entry: &Option<S::Entry>) -> JournalResult<Option<Vec<u8>>> {
        match entry {
            Some(inner) => self.0.encode(inner),
            None => Ok(None),
        }
    }

    fn decode(&self, payload: Option<&[u8]>) -> JournalResult<Option<S::Entry>> {
        payload.map(|bytes| self.0.decode(Some(bytes))).transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Vote {
        term: u64,
        candidate: String,
    }

    #[test]
    fn test_bytes_serdes() {
        let serdes = BytesSerdes;
        let encoded = serdes.encode(&vec![1, 2, 3]).unwrap();
        assert_eq!(encoded.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(serdes.decode(Some(&[4, 5])).unwrap(), vec![4, 5]);
        assert!(serdes.decode(None).is_err());
    }

    #[test]
    fn test_json_serdes() {
        let serdes = JsonSerdes::<Vote>::new();
        let vote = Vote {
            term: 7,
            candidate: "node-2".to_string(),
        };
        let encoded = serdes.encode(&vote).unwrap();
        assert_eq!(serdes.decode(encoded.as_deref()).unwrap(), vote);

        let err = serdes.decode(Some(b"{")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Serialization);
    }

    #[test]
    fn test_tombstoned_serdes() {
        let serdes = Tombstoned(BytesSerdes);
        assert_eq!(serdes.encode(&None).unwrap(), None);
        assert_eq!(serdes.decode(None).unwrap(), None);
        assert_eq!(serdes.decode(Some(b"x")).unwrap(), Some(b"x".to_vec()));
    }
}
