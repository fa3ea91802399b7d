use std::collections::{BTreeMap, BTreeSet};

use regex_lite::Regex;
use serde::Serialize;
use time::macros::format_description;
use time::Date;
use url::Url;

use crate::ids::{derive_channel_id, derive_feed_id};
use crate::model::{stream_id, Record, Table};
use crate::patterns::{
    BROADCAST_AREA, CATEGORY_ID, CATEGORY_NAME, CHANNEL_ID, CHANNEL_NAME, CITY_CODE, COUNTRY_CODE,
    COUNTRY_NAME, FEED_ID, FLAG, LANGUAGE_CODE, LOGO_TAG, NO_QUOTE_OR_COMMA, REGION_CODE,
    REGION_NAME, REPLACED_BY, SPACED_DASH, SUBDIVISION_CODE, TIMEZONE_ID, UTC_OFFSET,
    VIDEO_FORMAT, WIKIDATA_ID,
};
use crate::store::DataStore;

pub const BLOCK_REASONS: [&str; 2] = ["dmca", "nsfw"];
pub const LOGO_FORMATS: [&str; 7] = ["SVG", "PNG", "JPEG", "GIF", "WebP", "AVIF", "APNG"];

/// One rule broken by one record.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Ord, PartialOrd)]
pub struct Violation {
    pub table: Table,
    pub line: usize,
    /// Natural key of the offending record.
    pub key: String,
    pub message: String,
}

/// Every violation found in a store, grouped by table in [`Table::ALL`] order.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn for_table(&self, table: Table) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |violation| violation.table == table)
    }

    /// Violations a change is answerable for.
    ///
    /// Every violation of a record in `touched` counts, whether or not the
    /// record had it before. Other records only count for violations absent
    /// from `baseline`, matched on table, key and message (line numbers shift
    /// as records are added or removed) and counting repeats.
    #[must_use]
    pub fn introduced_by(
        &self,
        baseline: &ValidationReport,
        touched: &BTreeSet<(Table, String)>,
    ) -> Vec<Violation> {
        let mut remaining: BTreeMap<(Table, &str, &str), usize> = BTreeMap::new();
        for violation in &baseline.violations {
            *remaining
                .entry((violation.table, violation.key.as_str(), violation.message.as_str()))
                .or_default() += 1;
        }

        let mut introduced = Vec::new();
        for violation in &self.violations {
            if touched.contains(&(violation.table, violation.key.clone())) {
                introduced.push(violation.clone());
                continue;
            }
            let id = (violation.table, violation.key.as_str(), violation.message.as_str());
            match remaining.get_mut(&id) {
                Some(count) if *count > 0 => *count -= 1,
                _ => introduced.push(violation.clone()),
            }
        }
        introduced
    }
}

/// Run every schema, reference and structural rule over the store.
#[must_use]
pub fn validate(store: &DataStore) -> ValidationReport {
    let validator = Validator::new(store);
    let mut report = ValidationReport::default();
    for table in Table::ALL {
        validator.validate_table(table, &mut report.violations);
    }
    report
}

struct Validator<'a> {
    store: &'a DataStore,
}

impl<'a> Validator<'a> {
    fn new(store: &'a DataStore) -> Self {
        Self { store }
    }

    fn validate_table(&self, table: Table, out: &mut Vec<Violation>) {
        let mut sink = Sink { out };
        match table {
            Table::Channels => self.channels(&mut sink),
            Table::Feeds => self.feeds(&mut sink),
            Table::Logos => self.logos(&mut sink),
            Table::Regions => self.regions(&mut sink),
            Table::Blocklist => self.blocklist(&mut sink),
            Table::Categories => self.categories(&mut sink),
            Table::Cities => self.cities(&mut sink),
            Table::Countries => self.countries(&mut sink),
            Table::Subdivisions => self.subdivisions(&mut sink),
            Table::Languages => self.languages(&mut sink),
            Table::Timezones => self.timezones(&mut sink),
        }
    }

    fn channels(&self, sink: &mut Sink<'_>) {
        let channels = self.store.channels.all();
        for channel in duplicates_by(channels, |channel| channel.id.clone()) {
            sink.push(channel, format!("channel with id \"{}\" already exists", channel.id));
        }

        for channel in channels {
            let mut schema = Schema::new(&channel.id);
            schema.required_pattern("id", &channel.id, &CHANNEL_ID);
            check_display_name(&mut schema, "name", &channel.name);
            for (index, alt_name) in channel.alt_names.iter().enumerate() {
                let field = format!("alt_names[{index}]");
                schema.required_pattern(&field, alt_name, &NO_QUOTE_OR_COMMA);
                if alt_name == &channel.name {
                    schema.fail(format!("\"{field}\" contains an invalid value"));
                }
            }
            schema.optional_pattern("network", channel.network.as_deref(), &NO_QUOTE_OR_COMMA);
            schema.each_pattern("owners", &channel.owners, &NO_QUOTE_OR_COMMA);
            schema.required_pattern("country", &channel.country, &COUNTRY_CODE);
            schema.each_pattern("categories", &channel.categories, &CATEGORY_ID);
            let launched = schema.date("launched", channel.launched.as_deref());
            let closed = schema.date("closed", channel.closed.as_deref());
            if let (Some(launched), Some(closed)) = (launched, closed) {
                if closed <= launched {
                    schema.fail("\"closed\" must be greater than \"ref:launched\"".to_string());
                }
            }
            schema.optional_pattern("replaced_by", channel.replaced_by.as_deref(), &REPLACED_BY);
            schema.uri("website", channel.website.as_deref(), &["http", "https"]);
            sink.extend(channel, schema);

            if derive_channel_id(&channel.name, &channel.country) != channel.id {
                sink.push(
                    channel,
                    format!(
                        "\"{}\" must be derived from the channel name \"{}\" and the country code \"{}\"",
                        channel.id, channel.name, channel.country
                    ),
                );
            }

            let main_feeds =
                self.store.feeds.owned_by(&channel.id).filter(|feed| feed.is_main).count();
            if main_feeds == 0 {
                sink.push(channel, format!("\"{}\" does not have a main feed", channel.id));
            }
            if main_feeds > 1 {
                sink.push(channel, format!("\"{}\" has more than one main feed", channel.id));
            }

            if let Some(replaced_by) = channel.replaced_by.as_deref() {
                if !self.replacement_exists(replaced_by) {
                    sink.push(
                        channel,
                        format!("\"{}\" has an invalid replaced_by \"{replaced_by}\"", channel.id),
                    );
                }
            }

            if !self.store.countries.contains_key(&channel.country) {
                sink.push(
                    channel,
                    format!("\"{}\" has an invalid country \"{}\"", channel.id, channel.country),
                );
            }

            if channel.categories.iter().any(|id| !self.store.categories.contains_key(id)) {
                sink.push(
                    channel,
                    format!(
                        "\"{}\" has an invalid categories \"{}\"",
                        channel.id,
                        channel.categories.join(";")
                    ),
                );
            }
        }
    }

    fn replacement_exists(&self, replaced_by: &str) -> bool {
        let (channel_id, feed_id) = match replaced_by.split_once('@') {
            Some((channel_id, feed_id)) => (channel_id, Some(feed_id)),
            None => (replaced_by, None),
        };
        if !self.store.channels.contains_key(channel_id) {
            return false;
        }
        match feed_id {
            Some(feed_id) => self.store.feeds.contains_key(&stream_id(channel_id, feed_id)),
            None => true,
        }
    }

    fn feeds(&self, sink: &mut Sink<'_>) {
        let feeds = self.store.feeds.all();
        for feed in duplicates_by(feeds, |feed| format!("{},{}", feed.channel, feed.id)) {
            sink.push(
                feed,
                format!(
                    "feed with channel \"{}\" and id \"{}\" already exists",
                    feed.channel, feed.id
                ),
            );
        }

        for feed in feeds {
            let stream = feed.stream_id();
            let mut schema = Schema::new(&stream);
            schema.required_pattern("channel", &feed.channel, &CHANNEL_ID);
            schema.required_pattern("id", &feed.id, &FEED_ID);
            check_display_name(&mut schema, "name", &feed.name);
            schema.each_pattern("alt_names", &feed.alt_names, &NO_QUOTE_OR_COMMA);
            schema.each_pattern("broadcast_area", &feed.broadcast_area, &BROADCAST_AREA);
            schema.each_pattern("timezones", &feed.timezones, &TIMEZONE_ID);
            schema.each_pattern("languages", &feed.languages, &LANGUAGE_CODE);
            schema.optional_pattern("format", feed.format.as_deref(), &VIDEO_FORMAT);
            sink.extend(feed, schema);

            if derive_feed_id(&feed.name) != feed.id {
                sink.push(
                    feed,
                    format!(
                        "\"{stream}\" id \"{}\" must be derived from the name \"{}\"",
                        feed.id, feed.name
                    ),
                );
            }

            if !self.store.channels.contains_key(&feed.channel) {
                sink.push(feed, format!("\"{stream}\" has the wrong channel \"{}\"", feed.channel));
            }

            if feed.broadcast_area.iter().any(|area| !self.area_exists(area)) {
                sink.push(
                    feed,
                    format!(
                        "\"{stream}\" has the wrong broadcast_area \"{}\"",
                        feed.broadcast_area.join(";")
                    ),
                );
            }

            if feed.timezones.iter().any(|id| !self.store.timezones.contains_key(id)) {
                sink.push(
                    feed,
                    format!("\"{stream}\" has the wrong timezones \"{}\"", feed.timezones.join(";")),
                );
            }

            if feed.languages.iter().any(|code| !self.store.languages.contains_key(code)) {
                sink.push(
                    feed,
                    format!("\"{stream}\" has the wrong languages \"{}\"", feed.languages.join(";")),
                );
            }
        }
    }

    fn area_exists(&self, area: &str) -> bool {
        match area.split_once('/') {
            Some(("c", code)) => self.store.countries.contains_key(code),
            Some(("s", code)) => self.store.subdivisions.contains_key(code),
            Some(("r", code)) => self.store.regions.contains_key(code),
            Some(("ct", code)) => self.store.cities.contains_key(code),
            _ => false,
        }
    }

    fn logos(&self, sink: &mut Sink<'_>) {
        let logos = self.store.logos.all();
        let duplicates = duplicates_by(logos, |logo| {
            format!("{},{},{}", logo.channel, logo.feed.as_deref().unwrap_or_default(), logo.url)
        });
        for logo in duplicates {
            sink.push(
                logo,
                format!(
                    "logo with channel \"{}\", feed \"{}\" and url \"{}\" already exists",
                    logo.channel,
                    logo.feed.as_deref().unwrap_or_default(),
                    logo.url
                ),
            );
        }

        for logo in logos {
            let mut schema = Schema::new(&logo.url);
            schema.required_pattern("channel", &logo.channel, &CHANNEL_ID);
            schema.optional_pattern("feed", logo.feed.as_deref(), &FEED_ID);
            schema.each_pattern("tags", &logo.tags, &LOGO_TAG);
            if let Some(format) = logo.format.as_deref() {
                schema.one_of("format", format, &LOGO_FORMATS);
            }
            schema.required("url", &logo.url);
            schema.uri("url", Some(logo.url.as_str()).filter(|url| !url.is_empty()), &["https"]);
            sink.extend(logo, schema);

            if !self.store.channels.contains_key(&logo.channel) {
                sink.push(logo, format!("\"{}\" is missing from the channels.csv", logo.channel));
            }

            if let Some(stream) = logo.stream_id() {
                if !self.store.feeds.contains_key(&stream) {
                    sink.push(
                        logo,
                        format!(
                            "\"{}\" is missing from the feeds.csv",
                            logo.feed.as_deref().unwrap_or_default()
                        ),
                    );
                }
            }
        }
    }

    fn regions(&self, sink: &mut Sink<'_>) {
        let regions = self.store.regions.all();
        for region in duplicates_by(regions, |region| region.code.clone()) {
            sink.push(region, format!("region with code \"{}\" already exists", region.code));
        }

        for region in regions {
            let mut schema = Schema::new(&region.code);
            schema.required_pattern("name", &region.name, &REGION_NAME);
            schema.required_pattern("code", &region.code, &REGION_CODE);
            schema.each_pattern("countries", &region.countries, &COUNTRY_CODE);
            sink.extend(region, schema);

            if region.countries.iter().any(|code| !self.store.countries.contains_key(code)) {
                sink.push(
                    region,
                    format!(
                        "\"{}\" has the wrong countries \"{}\"",
                        region.code,
                        region.countries.join(";")
                    ),
                );
            }
        }
    }

    fn blocklist(&self, sink: &mut Sink<'_>) {
        let records = self.store.blocklist.all();
        let duplicates =
            duplicates_by(records, |record| format!("{},{}", record.channel, record.reference));
        for record in duplicates {
            sink.push(
                record,
                format!(
                    "blocklist record with channel \"{}\" and ref \"{}\" already exists",
                    record.channel, record.reference
                ),
            );
        }

        for record in records {
            let mut schema = Schema::new(&record.channel);
            schema.required_pattern("channel", &record.channel, &CHANNEL_ID);
            schema.one_of("reason", &record.reason, &BLOCK_REASONS);
            schema.required("ref", &record.reference);
            if !record.reference.is_empty() && Url::parse(&record.reference).is_err() {
                schema.fail("\"ref\" must be a valid uri".to_string());
            }
            sink.extend(record, schema);

            if !self.store.channels.contains_key(&record.channel) {
                sink.push(
                    record,
                    format!("\"{}\" is missing from the channels.csv", record.channel),
                );
            }
        }
    }

    fn categories(&self, sink: &mut Sink<'_>) {
        let categories = self.store.categories.all();
        for category in duplicates_by(categories, |category| category.id.clone()) {
            sink.push(category, format!("category with id \"{}\" already exists", category.id));
        }

        for category in categories {
            let mut schema = Schema::new(&category.id);
            schema.required_pattern("id", &category.id, &CATEGORY_ID);
            schema.required_pattern("name", &category.name, &CATEGORY_NAME);
            sink.extend(category, schema);
        }
    }

    fn cities(&self, sink: &mut Sink<'_>) {
        let cities = self.store.cities.all();
        for city in duplicates_by(cities, |city| city.code.clone()) {
            sink.push(city, format!("city with code \"{}\" already exists", city.code));
        }
        for city in duplicates_by(cities, |city| city.wikidata_id.clone()) {
            sink.push(
                city,
                format!("city with wikidata_id \"{}\" already exists", city.wikidata_id),
            );
        }

        for city in cities {
            let mut schema = Schema::new(&city.code);
            schema.required_pattern("country", &city.country, &COUNTRY_CODE);
            schema.optional_pattern("subdivision", city.subdivision.as_deref(), &SUBDIVISION_CODE);
            schema.required("name", &city.name);
            schema.required_pattern("code", &city.code, &CITY_CODE);
            if !city.code.is_empty() && !city.code.starts_with(&city.country) {
                schema.fail(format!(
                    "\"code\" with value \"{}\" must start with the country code \"{}\"",
                    city.code, city.country
                ));
            }
            schema.required_pattern("wikidata_id", &city.wikidata_id, &WIKIDATA_ID);
            sink.extend(city, schema);

            if !self.store.countries.contains_key(&city.country) {
                sink.push(
                    city,
                    format!("\"{}\" has an invalid country \"{}\"", city.code, city.country),
                );
            }

            if let Some(subdivision) = city.subdivision.as_deref() {
                if !self.store.subdivisions.contains_key(subdivision) {
                    sink.push(
                        city,
                        format!("\"{}\" has an invalid subdivision \"{subdivision}\"", city.code),
                    );
                }
            }
        }
    }

    fn countries(&self, sink: &mut Sink<'_>) {
        let countries = self.store.countries.all();
        for country in duplicates_by(countries, |country| country.code.clone()) {
            sink.push(country, format!("country with code \"{}\" already exists", country.code));
        }

        for country in countries {
            let mut schema = Schema::new(&country.code);
            schema.required_pattern("name", &country.name, &COUNTRY_NAME);
            schema.required_pattern("code", &country.code, &COUNTRY_CODE);
            schema.each_pattern("languages", &country.languages, &LANGUAGE_CODE);
            schema.required_pattern("flag", &country.flag, &FLAG);
            sink.extend(country, schema);

            if country.languages.iter().any(|code| !self.store.languages.contains_key(code)) {
                sink.push(
                    country,
                    format!(
                        "\"{}\" has an invalid languages \"{}\"",
                        country.code,
                        country.languages.join(";")
                    ),
                );
            }
        }
    }

    fn subdivisions(&self, sink: &mut Sink<'_>) {
        let subdivisions = self.store.subdivisions.all();
        for subdivision in duplicates_by(subdivisions, |subdivision| subdivision.code.clone()) {
            sink.push(
                subdivision,
                format!("subdivision with code \"{}\" already exists", subdivision.code),
            );
        }

        for subdivision in subdivisions {
            let mut schema = Schema::new(&subdivision.code);
            schema.required_pattern("country", &subdivision.country, &COUNTRY_CODE);
            schema.required("name", &subdivision.name);
            schema.required_pattern("code", &subdivision.code, &SUBDIVISION_CODE);
            schema.optional_pattern("parent", subdivision.parent.as_deref(), &SUBDIVISION_CODE);
            sink.extend(subdivision, schema);

            if !self.store.countries.contains_key(&subdivision.country) {
                sink.push(
                    subdivision,
                    format!(
                        "\"{}\" has an invalid country \"{}\"",
                        subdivision.code, subdivision.country
                    ),
                );
            }

            if let Some(parent) = subdivision.parent.as_deref() {
                if !self.store.subdivisions.contains_key(parent) {
                    sink.push(
                        subdivision,
                        format!("\"{}\" has an invalid parent \"{parent}\"", subdivision.code),
                    );
                }
            }
        }
    }

    fn languages(&self, sink: &mut Sink<'_>) {
        let languages = self.store.languages.all();
        for language in duplicates_by(languages, |language| language.code.clone()) {
            sink.push(language, format!("language with code \"{}\" already exists", language.code));
        }

        for language in languages {
            let mut schema = Schema::new(&language.code);
            schema.required_pattern("code", &language.code, &LANGUAGE_CODE);
            schema.required("name", &language.name);
            sink.extend(language, schema);
        }
    }

    fn timezones(&self, sink: &mut Sink<'_>) {
        let timezones = self.store.timezones.all();
        for timezone in duplicates_by(timezones, |timezone| timezone.id.clone()) {
            sink.push(timezone, format!("timezone with id \"{}\" already exists", timezone.id));
        }

        for timezone in timezones {
            let mut schema = Schema::new(&timezone.id);
            schema.required_pattern("id", &timezone.id, &TIMEZONE_ID);
            schema.required_pattern("utc_offset", &timezone.utc_offset, &UTC_OFFSET);
            schema.each_pattern("countries", &timezone.countries, &COUNTRY_CODE);
            sink.extend(timezone, schema);

            if timezone.countries.iter().any(|code| !self.store.countries.contains_key(code)) {
                sink.push(
                    timezone,
                    format!(
                        "\"{}\" has the wrong countries \"{}\"",
                        timezone.id,
                        timezone.countries.join(";")
                    ),
                );
            }
        }
    }
}

fn check_display_name(schema: &mut Schema<'_>, field: &str, name: &str) {
    schema.required_pattern(field, name, &CHANNEL_NAME);
    if SPACED_DASH.is_match(name) {
        schema.fail(format!(
            "\"{field}\" with value \"{name}\" matches the inverted pattern: /{}/",
            SPACED_DASH.as_str()
        ));
    }
}

/// Records whose lower-cased key was already seen earlier in the table.
fn duplicates_by<T>(items: &[T], key: impl Fn(&T) -> String) -> Vec<&T> {
    let mut seen = BTreeSet::new();
    items.iter().filter(|item| !seen.insert(key(*item).to_lowercase())).collect()
}

struct Sink<'a> {
    out: &'a mut Vec<Violation>,
}

impl Sink<'_> {
    fn push<T: Record>(&mut self, record: &T, message: String) {
        self.out.push(Violation {
            table: T::TABLE,
            line: record.line(),
            key: record.key(),
            message,
        });
    }

    fn extend<T: Record>(&mut self, record: &T, schema: Schema<'_>) {
        for message in schema.messages {
            let message = format!("{}: {message}", schema.label);
            self.push(record, message);
        }
    }
}

/// Field-level checks for one record. Messages read like the schema
/// library the dataset's contributors already know.
struct Schema<'a> {
    label: &'a str,
    messages: Vec<String>,
}

impl<'a> Schema<'a> {
    fn new(label: &'a str) -> Self {
        Self { label, messages: Vec::new() }
    }

    fn fail(&mut self, message: String) {
        self.messages.push(message);
    }

    fn required(&mut self, field: &str, value: &str) -> bool {
        if value.is_empty() {
            self.fail(format!("\"{field}\" is not allowed to be empty"));
            return false;
        }
        true
    }

    fn pattern(&mut self, field: &str, value: &str, pattern: &Regex) {
        if !pattern.is_match(value) {
            self.fail(format!(
                "\"{field}\" with value \"{value}\" fails to match the required pattern: /{}/",
                pattern.as_str()
            ));
        }
    }

    fn required_pattern(&mut self, field: &str, value: &str, pattern: &Regex) {
        if self.required(field, value) {
            self.pattern(field, value, pattern);
        }
    }

    fn optional_pattern(&mut self, field: &str, value: Option<&str>, pattern: &Regex) {
        if let Some(value) = value {
            self.pattern(field, value, pattern);
        }
    }

    fn each_pattern(&mut self, field: &str, values: &[String], pattern: &Regex) {
        for (index, value) in values.iter().enumerate() {
            self.pattern(&format!("{field}[{index}]"), value, pattern);
        }
    }

    fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.fail(format!("\"{field}\" must be one of [{}]", allowed.join(", ")));
        }
    }

    fn date(&mut self, field: &str, value: Option<&str>) -> Option<Date> {
        let value = value?;
        match Date::parse(value, format_description!("[year]-[month]-[day]")) {
            Ok(date) => Some(date),
            Err(_) => {
                self.fail(format!("\"{field}\" must be in YYYY-MM-DD format"));
                None
            }
        }
    }

    fn uri(&mut self, field: &str, value: Option<&str>, schemes: &[&str]) {
        let Some(value) = value else {
            return;
        };
        if value.contains(',') {
            self.fail(format!("\"{field}\" with value \"{value}\" matches the inverted pattern: /,/"));
        }
        let valid = Url::parse(value).is_ok_and(|url| schemes.contains(&url.scheme()));
        if !valid {
            self.fail(format!(
                "\"{field}\" must be a valid uri with a scheme matching the {} pattern",
                schemes.join("|")
            ));
        }
    }
}
