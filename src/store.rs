// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Match record storage.
//!
//! The escrow engine reaches records only through [`MatchStore`], so a durable
//! backend can replace [`InMemoryMatchStore`] without touching reconciliation
//! or settlement.
//!
//! # Thread Safety
//!
//! Every record sits behind its own [`Mutex`]. [`MatchStore::update`] holds that
//! lock for the whole read-modify-write (gateway calls included), which makes
//! all operations on one match mutually exclusive while different matches
//! proceed in parallel.

use crate::base::MatchId;
use crate::error::EscrowError;
use crate::record::MatchRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;

pub trait MatchStore: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::DuplicateMatch`] if the id is already taken.
    fn insert(&self, record: MatchRecord) -> Result<(), EscrowError>;

    /// Snapshot of a record.
    fn get(&self, id: &MatchId) -> Option<MatchRecord>;

    /// Runs `f` with exclusive access to the record.
    ///
    /// Returns `None` if no record has this id.
    fn update<R>(&self, id: &MatchId, f: impl FnOnce(&mut MatchRecord) -> R) -> Option<R>;

    fn ids(&self) -> Vec<MatchId>;
}

#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    records: DashMap<MatchId, Arc<Mutex<MatchRecord>>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clones the record handle so the map shard is released before locking.
    fn handle(&self, id: &MatchId) -> Option<Arc<Mutex<MatchRecord>>> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert(&self, record: MatchRecord) -> Result<(), EscrowError> {
        // Entry API keeps check-and-insert atomic.
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(EscrowError::DuplicateMatch(record.id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(record)));
                Ok(())
            }
        }
    }

    fn get(&self, id: &MatchId) -> Option<MatchRecord> {
        self.handle(id).map(|record| record.lock().clone())
    }

    fn update<R>(&self, id: &MatchId, f: impl FnOnce(&mut MatchRecord) -> R) -> Option<R> {
        let handle = self.handle(id)?;
        let mut record = handle.lock();
        Some(f(&mut record))
    }

    fn ids(&self) -> Vec<MatchId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Address;
    use crate::record::MatchStatus;
    use rust_decimal_macros::dec;
    use std::thread;

    fn record() -> MatchRecord {
        MatchRecord::new(
            MatchId::new(),
            dec!(1),
            [Address::new("w"), Address::new("b")],
            [Address::new("we"), Address::new("be")],
        )
    }

    #[test]
    fn insert_and_get() {
        let store = InMemoryMatchStore::new();
        let record = record();
        let id = record.id;
        store.insert(record.clone()).unwrap();

        assert_eq!(store.get(&id), Some(record));
        assert_eq!(store.ids(), vec![id]);
        assert_eq!(store.get(&MatchId::new()), None);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = InMemoryMatchStore::new();
        let record = record();
        store.insert(record.clone()).unwrap();
        assert_eq!(
            store.insert(record.clone()),
            Err(EscrowError::DuplicateMatch(record.id))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_unknown_returns_none() {
        let store = InMemoryMatchStore::new();
        assert_eq!(store.update(&MatchId::new(), |r| r.status), None);
    }

    #[test]
    fn updates_are_serialized() {
        let store = Arc::new(InMemoryMatchStore::new());
        let record = record();
        let id = record.id;
        store.insert(record).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update(&id, |r| r.white.deposit_observed += dec!(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = store.get(&id).unwrap();
        assert_eq!(record.white.deposit_observed, dec!(8000));
        assert_eq!(record.status, MatchStatus::WaitingForDeposits);
    }
}
