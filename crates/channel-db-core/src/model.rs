use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::LoadError;

/// One persisted table. Order of [`Table::ALL`] is the order tables are validated and reported in.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Channels,
    Feeds,
    Logos,
    Regions,
    Blocklist,
    Categories,
    Cities,
    Countries,
    Subdivisions,
    Languages,
    Timezones,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Self::Channels,
        Self::Feeds,
        Self::Logos,
        Self::Regions,
        Self::Blocklist,
        Self::Categories,
        Self::Cities,
        Self::Countries,
        Self::Subdivisions,
        Self::Languages,
        Self::Timezones,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channels => "channels",
            Self::Feeds => "feeds",
            Self::Logos => "logos",
            Self::Regions => "regions",
            Self::Blocklist => "blocklist",
            Self::Categories => "categories",
            Self::Cities => "cities",
            Self::Countries => "countries",
            Self::Subdivisions => "subdivisions",
            Self::Languages => "languages",
            Self::Timezones => "timezones",
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.csv", self.as_str())
    }

    /// Column names in on-disk order.
    #[must_use]
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Channels => &[
                "id",
                "name",
                "alt_names",
                "network",
                "owners",
                "country",
                "categories",
                "is_nsfw",
                "launched",
                "closed",
                "replaced_by",
                "website",
            ],
            Self::Feeds => &[
                "channel",
                "id",
                "name",
                "alt_names",
                "is_main",
                "broadcast_area",
                "timezones",
                "languages",
                "format",
            ],
            Self::Logos => &["channel", "feed", "tags", "width", "height", "format", "url"],
            Self::Regions => &["code", "name", "countries"],
            Self::Blocklist => &["channel", "reason", "ref"],
            Self::Categories => &["id", "name"],
            Self::Cities => &["country", "subdivision", "name", "code", "wikidata_id"],
            Self::Countries => &["name", "code", "languages", "flag"],
            Self::Subdivisions => &["country", "name", "code", "parent"],
            Self::Languages => &["code", "name"],
            Self::Timezones => &["id", "utc_offset", "countries"],
        }
    }

    /// Tables rewritten by the update engine. Reference tables are maintained by hand.
    #[must_use]
    pub fn is_mutable(self) -> bool {
        matches!(
            self,
            Self::Channels | Self::Feeds | Self::Logos | Self::Blocklist | Self::Cities
        )
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded line of a table file: trimmed cell text keyed by header name.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Row {
    pub table: Table,
    pub line: usize,
    values: BTreeMap<String, String>,
}

impl Row {
    pub fn new<I, K, V>(table: Table, line: usize, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let values = values
            .into_iter()
            .map(|(column, value)| (column.into(), value.as_ref().trim().to_string()))
            .collect();
        Self { table, line, values }
    }

    fn raw(&self, column: &str) -> &str {
        self.values.get(column).map_or("", String::as_str)
    }

    #[must_use]
    pub fn text(&self, column: &str) -> String {
        self.raw(column).to_string()
    }

    #[must_use]
    pub fn optional(&self, column: &str) -> Option<String> {
        let value = self.raw(column);
        (!value.is_empty()).then(|| value.to_string())
    }

    #[must_use]
    pub fn list(&self, column: &str) -> Vec<String> {
        split_list(self.raw(column))
    }

    /// # Errors
    /// Returns [`LoadError::InvalidValue`] unless the cell is `TRUE` or `FALSE`.
    pub fn boolean(&self, column: &str) -> Result<bool, LoadError> {
        match self.raw(column) {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            other => Err(self.invalid(column, other)),
        }
    }

    /// Empty cells decode as `0`; fractional values are rounded.
    ///
    /// # Errors
    /// Returns [`LoadError::InvalidValue`] when the cell is not a non-negative number.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn number(&self, column: &str) -> Result<u32, LoadError> {
        let value = self.raw(column);
        if value.is_empty() {
            return Ok(0);
        }
        if let Ok(parsed) = value.parse::<u32>() {
            return Ok(parsed);
        }
        match value.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() && parsed >= 0.0 && parsed <= f64::from(u32::MAX) => {
                Ok(parsed.round() as u32)
            }
            _ => Err(self.invalid(column, value)),
        }
    }

    fn invalid(&self, column: &str, value: &str) -> LoadError {
        LoadError::InvalidValue {
            file: self.table.file_name(),
            line: self.line,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// `;`-separated list cell, empty items dropped.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value.split(';').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

#[must_use]
pub fn join_list(values: &[String]) -> String {
    values.join(";")
}

#[must_use]
pub fn format_bool(value: bool) -> String {
    let literal = if value { "TRUE" } else { "FALSE" };
    literal.to_string()
}

fn optional_cell(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

/// Behaviour shared by every entity so the store, codec and validator can stay generic.
pub trait Record: Clone + Serialize {
    const TABLE: Table;

    /// # Errors
    /// Returns [`LoadError::InvalidValue`] when a typed column cannot be decoded.
    fn from_row(row: &Row) -> Result<Self, LoadError>;

    /// Cell values in [`Table::columns`] order.
    fn to_row(&self) -> Vec<String>;

    /// Natural key used by the store's primary index.
    fn key(&self) -> String;

    /// Owning channel id for channel-scoped records.
    fn owner(&self) -> Option<&str> {
        None
    }

    /// Source line in the table file, `0` for records created during the run.
    fn line(&self) -> usize;

    /// Key the table is ordered by when written back to disk.
    fn sort_key(&self) -> String {
        self.key().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub alt_names: Vec<String>,
    pub network: Option<String>,
    pub owners: Vec<String>,
    pub country: String,
    pub categories: Vec<String>,
    pub is_nsfw: bool,
    pub launched: Option<String>,
    pub closed: Option<String>,
    pub replaced_by: Option<String>,
    pub website: Option<String>,
    #[serde(skip)]
    pub line: usize,
}

impl Channel {
    /// Channel id portion of `replaced_by`, without any `@feed` suffix.
    #[must_use]
    pub fn replaced_by_channel(&self) -> Option<&str> {
        self.replaced_by.as_deref().map(|value| value.split('@').next().unwrap_or(value))
    }
}

impl Record for Channel {
    const TABLE: Table = Table::Channels;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            id: row.text("id"),
            name: row.text("name"),
            alt_names: row.list("alt_names"),
            network: row.optional("network"),
            owners: row.list("owners"),
            country: row.text("country"),
            categories: row.list("categories"),
            is_nsfw: row.boolean("is_nsfw")?,
            launched: row.optional("launched"),
            closed: row.optional("closed"),
            replaced_by: row.optional("replaced_by"),
            website: row.optional("website"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            join_list(&self.alt_names),
            optional_cell(self.network.as_ref()),
            join_list(&self.owners),
            self.country.clone(),
            join_list(&self.categories),
            format_bool(self.is_nsfw),
            optional_cell(self.launched.as_ref()),
            optional_cell(self.closed.as_ref()),
            optional_cell(self.replaced_by.as_ref()),
            optional_cell(self.website.as_ref()),
        ]
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Feed {
    pub channel: String,
    pub id: String,
    pub name: String,
    pub alt_names: Vec<String>,
    pub is_main: bool,
    pub broadcast_area: Vec<String>,
    pub timezones: Vec<String>,
    pub languages: Vec<String>,
    pub format: Option<String>,
    #[serde(skip)]
    pub line: usize,
}

impl Feed {
    /// `<channel>@<feed>`, unique across channels.
    #[must_use]
    pub fn stream_id(&self) -> String {
        stream_id(&self.channel, &self.id)
    }
}

#[must_use]
pub fn stream_id(channel: &str, feed: &str) -> String {
    format!("{channel}@{feed}")
}

impl Record for Feed {
    const TABLE: Table = Table::Feeds;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            channel: row.text("channel"),
            id: row.text("id"),
            name: row.text("name"),
            alt_names: row.list("alt_names"),
            is_main: row.boolean("is_main")?,
            broadcast_area: row.list("broadcast_area"),
            timezones: row.list("timezones"),
            languages: row.list("languages"),
            format: row.optional("format"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.channel.clone(),
            self.id.clone(),
            self.name.clone(),
            join_list(&self.alt_names),
            format_bool(self.is_main),
            join_list(&self.broadcast_area),
            join_list(&self.timezones),
            join_list(&self.languages),
            optional_cell(self.format.as_ref()),
        ]
    }

    fn key(&self) -> String {
        self.stream_id()
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.channel)
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Logo {
    pub channel: String,
    pub feed: Option<String>,
    pub tags: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub url: String,
    #[serde(skip)]
    pub line: usize,
}

impl Logo {
    #[must_use]
    pub fn stream_id(&self) -> Option<String> {
        self.feed.as_deref().map(|feed| stream_id(&self.channel, feed))
    }
}

impl Record for Logo {
    const TABLE: Table = Table::Logos;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            channel: row.text("channel"),
            feed: row.optional("feed"),
            tags: row.list("tags"),
            width: row.number("width")?,
            height: row.number("height")?,
            format: row.optional("format"),
            url: row.text("url"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.channel.clone(),
            optional_cell(self.feed.as_ref()),
            join_list(&self.tags),
            self.width.to_string(),
            self.height.to_string(),
            optional_cell(self.format.as_ref()),
            self.url.clone(),
        ]
    }

    fn key(&self) -> String {
        format!("{}@{}|{}", self.channel, self.feed.as_deref().unwrap_or_default(), self.url)
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.channel)
    }

    fn line(&self) -> usize {
        self.line
    }

    fn sort_key(&self) -> String {
        format!("{}{}{}", self.channel, self.feed.as_deref().unwrap_or_default(), self.url)
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct BlocklistRecord {
    pub channel: String,
    pub reason: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(skip)]
    pub line: usize,
}

impl Record for BlocklistRecord {
    const TABLE: Table = Table::Blocklist;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            channel: row.text("channel"),
            reason: row.text("reason"),
            reference: row.text("ref"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.channel.clone(), self.reason.clone(), self.reference.clone()]
    }

    fn key(&self) -> String {
        format!("{}|{}", self.channel, self.reference)
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.channel)
    }

    fn line(&self) -> usize {
        self.line
    }

    fn sort_key(&self) -> String {
        self.channel.to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct City {
    pub country: String,
    pub subdivision: Option<String>,
    pub name: String,
    pub code: String,
    pub wikidata_id: String,
    #[serde(skip)]
    pub line: usize,
}

impl Record for City {
    const TABLE: Table = Table::Cities;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            country: row.text("country"),
            subdivision: row.optional("subdivision"),
            name: row.text("name"),
            code: row.text("code"),
            wikidata_id: row.text("wikidata_id"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.country.clone(),
            optional_cell(self.subdivision.as_ref()),
            self.name.clone(),
            self.code.clone(),
            self.wikidata_id.clone(),
        ]
    }

    fn key(&self) -> String {
        self.code.clone()
    }

    fn line(&self) -> usize {
        self.line
    }

    fn sort_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.country,
            self.subdivision.as_deref().unwrap_or_default(),
            self.code
        )
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Category {
    const TABLE: Table = Table::Categories;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self { id: row.text("id"), name: row.text("name"), line: row.line })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.id.clone(), self.name.clone()]
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Country {
    pub name: String,
    pub code: String,
    pub languages: Vec<String>,
    pub flag: String,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Country {
    const TABLE: Table = Table::Countries;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            name: row.text("name"),
            code: row.text("code"),
            languages: row.list("languages"),
            flag: row.text("flag"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.name.clone(), self.code.clone(), join_list(&self.languages), self.flag.clone()]
    }

    fn key(&self) -> String {
        self.code.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Subdivision {
    pub country: String,
    pub name: String,
    pub code: String,
    pub parent: Option<String>,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Subdivision {
    const TABLE: Table = Table::Subdivisions;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            country: row.text("country"),
            name: row.text("name"),
            code: row.text("code"),
            parent: row.optional("parent"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.country.clone(),
            self.name.clone(),
            self.code.clone(),
            optional_cell(self.parent.as_ref()),
        ]
    }

    fn key(&self) -> String {
        self.code.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Region {
    pub code: String,
    pub name: String,
    pub countries: Vec<String>,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Region {
    const TABLE: Table = Table::Regions;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            code: row.text("code"),
            name: row.text("name"),
            countries: row.list("countries"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.code.clone(), self.name.clone(), join_list(&self.countries)]
    }

    fn key(&self) -> String {
        self.code.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Timezone {
    pub id: String,
    pub utc_offset: String,
    pub countries: Vec<String>,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Timezone {
    const TABLE: Table = Table::Timezones;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self {
            id: row.text("id"),
            utc_offset: row.text("utc_offset"),
            countries: row.list("countries"),
            line: row.line,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.id.clone(), self.utc_offset.clone(), join_list(&self.countries)]
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(skip)]
    pub line: usize,
}

impl Record for Language {
    const TABLE: Table = Table::Languages;

    fn from_row(row: &Row) -> Result<Self, LoadError> {
        Ok(Self { code: row.text("code"), name: row.text("name"), line: row.line })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.code.clone(), self.name.clone()]
    }

    fn key(&self) -> String {
        self.code.clone()
    }

    fn line(&self) -> usize {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_row(is_main: &str) -> Row {
        Row::new(
            Table::Feeds,
            2,
            [
                ("channel", "TestTV.us"),
                ("id", "SD"),
                ("name", " SD "),
                ("alt_names", ""),
                ("is_main", is_main),
                ("broadcast_area", "c/US;;s/US-NY"),
                ("timezones", "America/New_York"),
                ("languages", "eng"),
                ("format", ""),
            ],
        )
    }

    #[test]
    fn row_decodes_lists_booleans_and_empty_optionals() -> Result<(), LoadError> {
        let feed = Feed::from_row(&feed_row("TRUE"))?;

        assert_eq!(feed.name, "SD");
        assert!(feed.is_main);
        assert_eq!(feed.broadcast_area, vec!["c/US".to_string(), "s/US-NY".to_string()]);
        assert!(feed.alt_names.is_empty());
        assert_eq!(feed.format, None);
        assert_eq!(feed.stream_id(), "TestTV.us@SD");
        assert_eq!(feed.line, 2);
        Ok(())
    }

    #[test]
    fn row_rejects_non_literal_booleans() {
        let err = match Feed::from_row(&feed_row("yes")) {
            Ok(feed) => panic!("expected invalid boolean, decoded {feed:?}"),
            Err(err) => err,
        };

        assert_eq!(
            err,
            LoadError::InvalidValue {
                file: "feeds.csv".to_string(),
                line: 2,
                column: "is_main".to_string(),
                value: "yes".to_string(),
            }
        );
    }

    #[test]
    fn missing_columns_decode_as_empty() -> Result<(), LoadError> {
        let row = Row::new(Table::Logos, 3, [("channel", "TestTV.us"), ("url", "https://x/a.png")]);
        let logo = Logo::from_row(&row)?;

        assert_eq!(logo.feed, None);
        assert_eq!((logo.width, logo.height), (0, 0));
        assert_eq!(
            logo.to_row(),
            vec!["TestTV.us", "", "", "0", "0", "", "https://x/a.png"]
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn fractional_dimensions_are_rounded() -> Result<(), LoadError> {
        let row = Row::new(Table::Logos, 2, [("width", "511.6"), ("height", "abc")]);
        assert_eq!(row.number("width")?, 512);
        assert!(row.number("height").is_err());
        Ok(())
    }

    #[test]
    fn sort_keys_follow_table_conventions() {
        let logo = Logo {
            channel: "B.us".to_string(),
            feed: None,
            tags: vec![],
            width: 0,
            height: 0,
            format: None,
            url: "https://A".to_string(),
            line: 0,
        };
        let city = City {
            country: "US".to_string(),
            subdivision: Some("US-NY".to_string()),
            name: "New York".to_string(),
            code: "USNYC".to_string(),
            wikidata_id: "Q60".to_string(),
            line: 0,
        };

        assert_eq!(logo.sort_key(), "b.ushttps://a");
        assert_eq!(city.sort_key(), "us_us-ny_usnyc");
        assert!(Table::Cities.is_mutable());
        assert!(!Table::Countries.is_mutable());
    }
}
