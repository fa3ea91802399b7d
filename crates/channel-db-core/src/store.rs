use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::model::{
    BlocklistRecord, Category, Channel, City, Country, Feed, Language, Logo, Record, Region, Row,
    Subdivision, Table, Timezone,
};
use crate::LoadError;

/// Ordered records of one table plus the lookup indexes derived from them.
///
/// `by_key` maps each natural key to the position of its first occurrence and
/// `by_owner` groups channel-scoped records by channel id. Both are patched on
/// `add` and rebuilt by every other structural mutation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Collection<T: Record> {
    items: Vec<T>,
    by_key: BTreeMap<String, usize>,
    by_owner: BTreeMap<String, Vec<usize>>,
}

impl<T: Record> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new(), by_key: BTreeMap::new(), by_owner: BTreeMap::new() }
    }
}

impl<T: Record> Collection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn load(items: Vec<T>) -> Self {
        let mut collection = Self { items, ..Self::default() };
        collection.reindex();
        collection
    }

    /// # Errors
    /// Returns the first [`LoadError`] raised while decoding a row.
    pub fn from_rows(rows: &[Row]) -> Result<Self, LoadError> {
        let items = rows.iter().map(T::from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::load(items))
    }

    #[must_use]
    pub fn all(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.by_key.get(key).and_then(|index| self.items.get(*index))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn owned_by<'a>(&'a self, owner: &str) -> impl Iterator<Item = &'a T> + 'a {
        self.by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(move |index| self.items.get(*index))
    }

    pub fn first_where(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(item))
    }

    pub fn add(&mut self, item: T) {
        let index = self.items.len();
        self.by_key.entry(item.key()).or_insert(index);
        if let Some(owner) = item.owner() {
            self.by_owner.entry(owner.to_string()).or_default().push(index);
        }
        self.items.push(item);
    }

    /// Remove every matching record and return them in their former order.
    pub fn remove_where(&mut self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let (removed, kept): (Vec<T>, Vec<T>) =
            std::mem::take(&mut self.items).into_iter().partition(|item| predicate(item));
        self.items = kept;
        if !removed.is_empty() {
            self.reindex();
        }
        removed
    }

    /// Mutate every matching record in place and return how many were touched.
    pub fn update_where(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        mut update: impl FnMut(&mut T),
    ) -> usize {
        let mut touched = 0;
        for item in self.items.iter_mut().filter(|item| predicate(item)) {
            update(item);
            touched += 1;
        }
        if touched > 0 {
            self.reindex();
        }
        touched
    }

    /// Mutate the first matching record. Returns `false` when nothing matched.
    pub fn update_first(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        update: impl FnOnce(&mut T),
    ) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| predicate(item)) else {
            return false;
        };
        update(item);
        self.reindex();
        true
    }

    /// Recompute both indexes from the records.
    pub fn reindex(&mut self) {
        self.by_key.clear();
        self.by_owner.clear();
        for (index, item) in self.items.iter().enumerate() {
            self.by_key.entry(item.key()).or_insert(index);
            if let Some(owner) = item.owner() {
                self.by_owner.entry(owner.to_string()).or_default().push(index);
            }
        }
    }

    /// Records ordered the way they are written to disk.
    #[must_use]
    pub fn sorted(&self) -> Vec<&T> {
        let mut items: Vec<(String, &T)> =
            self.items.iter().map(|item| (item.sort_key(), item)).collect();
        items.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
        items.into_iter().map(|(_, item)| item).collect()
    }

    #[cfg(test)]
    pub(crate) fn index_is_fresh(&self) -> bool {
        let mut rebuilt = self.clone();
        rebuilt.reindex();
        rebuilt.by_key == self.by_key && rebuilt.by_owner == self.by_owner
    }
}

/// Every table of the dataset, owned for the duration of a run.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DataStore {
    pub channels: Collection<Channel>,
    pub feeds: Collection<Feed>,
    pub logos: Collection<Logo>,
    pub blocklist: Collection<BlocklistRecord>,
    pub cities: Collection<City>,
    pub categories: Collection<Category>,
    pub countries: Collection<Country>,
    pub subdivisions: Collection<Subdivision>,
    pub regions: Collection<Region>,
    pub timezones: Collection<Timezone>,
    pub languages: Collection<Language>,
}

impl DataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one table with decoded rows.
    ///
    /// # Errors
    /// Returns the first [`LoadError`] raised while decoding a row.
    pub fn load_rows(&mut self, table: Table, rows: &[Row]) -> Result<(), LoadError> {
        match table {
            Table::Channels => self.channels = Collection::from_rows(rows)?,
            Table::Feeds => self.feeds = Collection::from_rows(rows)?,
            Table::Logos => self.logos = Collection::from_rows(rows)?,
            Table::Blocklist => self.blocklist = Collection::from_rows(rows)?,
            Table::Cities => self.cities = Collection::from_rows(rows)?,
            Table::Categories => self.categories = Collection::from_rows(rows)?,
            Table::Countries => self.countries = Collection::from_rows(rows)?,
            Table::Subdivisions => self.subdivisions = Collection::from_rows(rows)?,
            Table::Regions => self.regions = Collection::from_rows(rows)?,
            Table::Timezones => self.timezones = Collection::from_rows(rows)?,
            Table::Languages => self.languages = Collection::from_rows(rows)?,
        }
        Ok(())
    }

    /// Rebuild every index of every table.
    pub fn reindex(&mut self) {
        self.channels.reindex();
        self.feeds.reindex();
        self.logos.reindex();
        self.blocklist.reindex();
        self.cities.reindex();
        self.categories.reindex();
        self.countries.reindex();
        self.subdivisions.reindex();
        self.regions.reindex();
        self.timezones.reindex();
        self.languages.reindex();
    }

    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Channels => self.channels.len(),
            Table::Feeds => self.feeds.len(),
            Table::Logos => self.logos.len(),
            Table::Blocklist => self.blocklist.len(),
            Table::Cities => self.cities.len(),
            Table::Categories => self.categories.len(),
            Table::Countries => self.countries.len(),
            Table::Subdivisions => self.subdivisions.len(),
            Table::Regions => self.regions.len(),
            Table::Timezones => self.timezones.len(),
            Table::Languages => self.languages.len(),
        }
    }

    /// Cell rows of one table in on-disk order.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Vec<String>> {
        match table {
            Table::Channels => sorted_rows(&self.channels),
            Table::Feeds => sorted_rows(&self.feeds),
            Table::Logos => sorted_rows(&self.logos),
            Table::Blocklist => sorted_rows(&self.blocklist),
            Table::Cities => sorted_rows(&self.cities),
            Table::Categories => sorted_rows(&self.categories),
            Table::Countries => sorted_rows(&self.countries),
            Table::Subdivisions => sorted_rows(&self.subdivisions),
            Table::Regions => sorted_rows(&self.regions),
            Table::Timezones => sorted_rows(&self.timezones),
            Table::Languages => sorted_rows(&self.languages),
        }
    }

    /// Typed JSON array of one table, in on-disk order.
    ///
    /// # Errors
    /// Returns an error when a record cannot be serialized.
    pub fn to_json(&self, table: Table) -> serde_json::Result<Value> {
        match table {
            Table::Channels => sorted_json(&self.channels),
            Table::Feeds => sorted_json(&self.feeds),
            Table::Logos => sorted_json(&self.logos),
            Table::Blocklist => sorted_json(&self.blocklist),
            Table::Cities => sorted_json(&self.cities),
            Table::Categories => sorted_json(&self.categories),
            Table::Countries => sorted_json(&self.countries),
            Table::Subdivisions => sorted_json(&self.subdivisions),
            Table::Regions => sorted_json(&self.regions),
            Table::Timezones => sorted_json(&self.timezones),
            Table::Languages => sorted_json(&self.languages),
        }
    }

    /// Serialized form of every mutable table, used to compare states.
    #[must_use]
    pub fn fingerprint(&self) -> Vec<(Table, Vec<Vec<String>>)> {
        Table::ALL
            .into_iter()
            .filter(|table| table.is_mutable())
            .map(|table| (table, self.rows(table)))
            .collect()
    }

    /// Mutable tables whose rows differ from `before`.
    #[must_use]
    pub fn changed_tables(&self, before: &DataStore) -> Vec<Table> {
        Table::ALL
            .into_iter()
            .filter(|table| table.is_mutable() && self.rows(*table) != before.rows(*table))
            .collect()
    }

    /// Keys of mutable-table records added, changed or removed since `before`,
    /// cascaded changes included.
    #[must_use]
    pub fn touched_keys(&self, before: &DataStore) -> BTreeSet<(Table, String)> {
        let mut touched = BTreeSet::new();
        touched_in(&self.channels, &before.channels, &mut touched);
        touched_in(&self.feeds, &before.feeds, &mut touched);
        touched_in(&self.logos, &before.logos, &mut touched);
        touched_in(&self.blocklist, &before.blocklist, &mut touched);
        touched_in(&self.cities, &before.cities, &mut touched);
        touched
    }
}

fn touched_in<T: Record>(
    after: &Collection<T>,
    before: &Collection<T>,
    touched: &mut BTreeSet<(Table, String)>,
) {
    let after_rows = rows_by_key(after);
    let before_rows = rows_by_key(before);
    for key in after_rows.keys().chain(before_rows.keys()) {
        if after_rows.get(key) != before_rows.get(key) {
            touched.insert((T::TABLE, key.clone()));
        }
    }
}

fn rows_by_key<T: Record>(collection: &Collection<T>) -> BTreeMap<String, Vec<Vec<String>>> {
    let mut rows: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    for item in collection.all() {
        rows.entry(item.key()).or_default().push(item.to_row());
    }
    for group in rows.values_mut() {
        group.sort();
    }
    rows
}

fn sorted_rows<T: Record>(collection: &Collection<T>) -> Vec<Vec<String>> {
    collection.sorted().into_iter().map(Record::to_row).collect()
}

fn sorted_json<T: Record>(collection: &Collection<T>) -> serde_json::Result<Value> {
    serde_json::to_value(collection.sorted())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(channel: &str, id: &str, is_main: bool) -> Feed {
        Feed {
            channel: channel.to_string(),
            id: id.to_string(),
            name: id.to_string(),
            alt_names: vec![],
            is_main,
            broadcast_area: vec!["c/US".to_string()],
            timezones: vec![],
            languages: vec![],
            format: None,
            line: 0,
        }
    }

    fn feeds() -> Collection<Feed> {
        Collection::load(vec![
            feed("B.us", "SD", true),
            feed("A.us", "HD", false),
            feed("A.us", "SD", true),
        ])
    }

    #[test]
    fn indexes_resolve_keys_and_owners() {
        let feeds = feeds();

        assert_eq!(feeds.get("A.us@SD").map(|feed| feed.is_main), Some(true));
        assert!(feeds.contains_key("B.us@SD"));
        assert!(!feeds.contains_key("B.us@HD"));
        assert_eq!(feeds.owned_by("A.us").count(), 2);
        assert_eq!(feeds.owned_by("C.us").count(), 0);
    }

    #[test]
    fn structural_mutations_keep_indexes_fresh() {
        let mut feeds = feeds();

        feeds.add(feed("C.us", "SD", true));
        assert!(feeds.index_is_fresh());
        assert!(feeds.contains_key("C.us@SD"));

        let removed = feeds.remove_where(|feed| feed.channel == "A.us");
        assert_eq!(removed.len(), 2);
        assert!(feeds.index_is_fresh());
        assert!(!feeds.contains_key("A.us@SD"));
        assert_eq!(feeds.get("C.us@SD").map(|feed| feed.channel.as_str()), Some("C.us"));

        let renamed = feeds.update_where(
            |feed| feed.channel == "B.us",
            |feed| feed.channel = "D.us".to_string(),
        );
        assert_eq!(renamed, 1);
        assert!(feeds.index_is_fresh());
        assert!(feeds.contains_key("D.us@SD"));
        assert_eq!(feeds.owned_by("B.us").count(), 0);
    }

    #[test]
    fn sorted_orders_by_lowercase_key() {
        let feeds = feeds();
        let order: Vec<String> = feeds.sorted().into_iter().map(Feed::stream_id).collect();
        assert_eq!(order, vec!["A.us@HD", "A.us@SD", "B.us@SD"]);
    }

    #[test]
    fn clone_is_a_full_snapshot() {
        let mut store = DataStore { feeds: feeds(), ..DataStore::default() };
        let snapshot = store.clone();

        store.feeds.remove_where(|_| true);
        assert_ne!(store, snapshot);
        assert_eq!(snapshot.feeds.len(), 3);
        assert!(snapshot.feeds.contains_key("A.us@HD"));
    }

    #[test]
    fn touched_keys_cover_added_changed_and_removed_records() {
        let before = DataStore { feeds: feeds(), ..DataStore::default() };
        let mut after = before.clone();
        assert!(after.touched_keys(&before).is_empty());

        after.feeds.update_where(|_| true, |feed| feed.line += 1);
        after.feeds.update_first(|feed| feed.channel == "B.us", |feed| feed.is_main = false);
        after.feeds.remove_where(|feed| feed.id == "HD");
        after.feeds.add(feed("C.us", "SD", true));

        let touched: Vec<(Table, String)> = after.touched_keys(&before).into_iter().collect();
        assert_eq!(
            touched,
            vec![
                (Table::Feeds, "A.us@HD".to_string()),
                (Table::Feeds, "B.us@SD".to_string()),
                (Table::Feeds, "C.us@SD".to_string()),
            ]
        );
    }

    #[test]
    fn changed_tables_ignores_record_order() {
        let before = DataStore { feeds: feeds(), ..DataStore::default() };
        let mut after = before.clone();

        after.feeds.update_where(|_| true, |feed| feed.line += 10);
        assert!(after.changed_tables(&before).is_empty());

        after.feeds.update_first(|feed| feed.channel == "B.us", |feed| feed.is_main = false);
        assert_eq!(after.changed_tables(&before), vec![Table::Feeds]);
    }
}
