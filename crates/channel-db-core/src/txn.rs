use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use crate::model::Table;
use crate::store::DataStore;

/// All-or-nothing scope over a [`DataStore`].
///
/// `begin` clones every collection and index before anything is touched.
/// Unless [`Transaction::commit`] is called, dropping the transaction puts
/// the clone back, so an early return or panic inside a processor can never
/// leave a half-applied cascade behind.
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a mut DataStore,
    snapshot: Option<DataStore>,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a mut DataStore) -> Self {
        let snapshot = Some(store.clone());
        Self { store, snapshot }
    }

    /// Records added, changed or removed since `begin`.
    #[must_use]
    pub fn touched_keys(&self) -> BTreeSet<(Table, String)> {
        self.snapshot
            .as_ref()
            .map(|snapshot| self.store.touched_keys(snapshot))
            .unwrap_or_default()
    }

    /// Keep every change made since `begin`.
    pub fn commit(mut self) {
        self.snapshot = None;
    }

    /// Restore the store to its state at `begin`.
    pub fn rollback(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.store = snapshot;
        }
    }
}

impl Deref for Transaction<'_> {
    type Target = DataStore;

    fn deref(&self) -> &Self::Target {
        self.store
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.store
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::store::Collection;

    fn store() -> DataStore {
        DataStore {
            categories: Collection::load(vec![Category {
                id: "news".to_string(),
                name: "News".to_string(),
                line: 2,
            }]),
            ..DataStore::default()
        }
    }

    fn add_category(store: &mut DataStore) {
        store.categories.add(Category { id: "kids".to_string(), name: "Kids".to_string(), line: 0 });
    }

    #[test]
    fn commit_keeps_changes() {
        let mut store = store();
        let mut txn = Transaction::begin(&mut store);
        add_category(&mut txn);
        txn.commit();

        assert!(store.categories.contains_key("kids"));
    }

    #[test]
    fn rollback_restores_records_and_indexes() {
        let mut store = store();
        let before = store.clone();

        let mut txn = Transaction::begin(&mut store);
        add_category(&mut txn);
        txn.categories.remove_where(|category| category.id == "news");
        txn.rollback();

        assert_eq!(store, before);
        assert!(store.categories.contains_key("news"));
        assert!(!store.categories.contains_key("kids"));
    }

    #[test]
    fn dropping_without_commit_rolls_back() {
        let mut store = store();
        {
            let mut txn = Transaction::begin(&mut store);
            add_category(&mut txn);
        }

        assert_eq!(store.categories.len(), 1);
    }
}
