//! Run coordinator: applies a batch of change requests one at a time, each inside
//! its own [`Transaction`], and keeps the record the CLI reports from.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::mutation;
use crate::probe::ImageProbe;
use crate::request::ChangeRequest;
use crate::store::DataStore;
use crate::txn::Transaction;
use crate::validate::{validate, Violation};

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One line of the per-request run log.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub request: u64,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} {}", self.level.as_str(), self.request, self.message)
    }
}

/// Outcome of a batch. `processed` and `skipped` hold request numbers in the
/// order the requests were handled.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct RunReport {
    pub processed: Vec<u64>,
    pub skipped: Vec<u64>,
    pub log: Vec<LogEntry>,
}

impl RunReport {
    /// `OUTPUT=closes #1, closes #2` for the issue-closing step.
    #[must_use]
    pub fn output_line(&self) -> String {
        let closes: Vec<String> =
            self.processed.iter().map(|number| format!("closes #{number}")).collect();
        format!("OUTPUT={}", closes.join(", "))
    }

    fn record(&mut self, level: LogLevel, request: u64, message: String) {
        self.log.push(LogEntry { level, request, message });
    }

    fn skip(&mut self, level: LogLevel, request: u64, message: String) {
        self.skipped.push(request);
        self.record(level, request, message);
    }
}

/// Apply `requests` in ascending request number.
///
/// A request is skipped when it is not approved, carries no or several action
/// labels, fails its preconditions, or leaves the store with validation
/// violations it did not have before. Skipped requests leave the store exactly
/// as they found it.
pub fn apply_requests(
    store: &mut DataStore,
    mut requests: Vec<ChangeRequest>,
    probe: &dyn ImageProbe,
) -> RunReport {
    requests.sort_by_key(|request| request.number);
    let mut report = RunReport::default();
    let mut baseline = validate(store);
    if !baseline.is_clean() {
        warn!(violations = baseline.len(), "store has violations before the run");
    }

    for request in &requests {
        let number = request.number;
        let action = match request.action() {
            Ok(action) => action,
            Err(err) => {
                warn!(request = number, error = %err, "request skipped");
                report.skip(LogLevel::Warning, number, err.to_string());
                continue;
            }
        };

        let mut txn = Transaction::begin(store);
        let summary = match mutation::apply(&mut txn, action, &request.fields, probe) {
            Ok(summary) => summary,
            Err(err) => {
                txn.rollback();
                warn!(request = number, action = action.label(), error = %err, "request rejected");
                report.skip(LogLevel::Error, number, format!("{}: {err}", action.label()));
                continue;
            }
        };

        let after = validate(&txn);
        let introduced = after.introduced_by(&baseline, &txn.touched_keys());
        if !introduced.is_empty() {
            txn.rollback();
            warn!(
                request = number,
                action = action.label(),
                violations = introduced.len(),
                "request rolled back"
            );
            report.skip(LogLevel::Error, number, describe_violations(action.label(), &introduced));
            continue;
        }

        txn.commit();
        baseline = after;
        info!(request = number, action = action.label(), %summary, "request applied");
        report.processed.push(number);
        report.record(LogLevel::Info, number, format!("{}: {summary}", action.label()));
    }

    report
}

fn describe_violations(label: &str, violations: &[Violation]) -> String {
    let details: Vec<String> = violations
        .iter()
        .map(|violation| {
            format!("{}:{} {}", violation.table.file_name(), violation.line, violation.message)
        })
        .collect();
    format!("{label}: rolled back, {}", details.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::fixtures::{self, fields, FixedProbe};
    use crate::request::RequestFields;

    fn request(number: u64, labels: &[&str], pairs: &[(&str, &str)]) -> ChangeRequest {
        ChangeRequest::new(number, labels, fields(pairs))
    }

    #[test]
    fn add_channel_request_creates_channel_feed_and_logo() {
        let mut store = fixtures::store();
        store.channels.remove_where(|channel| channel.id == "TestTV.us");
        store.feeds.remove_where(|feed| feed.channel == "TestTV.us");
        store.logos.remove_where(|logo| logo.channel == "TestTV.us");
        store.channels.update_where(|_| true, |channel| channel.replaced_by = None);

        let report = apply_requests(
            &mut store,
            vec![request(
                7,
                &["channels:add", "approved"],
                &[
                    ("channel_name", "Test TV"),
                    ("country", "US"),
                    ("is_nsfw", "FALSE"),
                    ("logo_url", "https://example.com/logo.png"),
                    ("feed_name", "SD"),
                    ("broadcast_area", "c/US"),
                    ("timezones", "America/New_York"),
                    ("languages", "eng"),
                    ("format", "576i"),
                ],
            )],
            &FixedProbe,
        );

        assert_eq!(report.processed, vec![7]);
        assert_eq!(report.output_line(), "OUTPUT=closes #7");
        assert!(store.channels.contains_key("TestTV.us"));
        assert_eq!(store.feeds.get("TestTV.us@SD").map(|feed| feed.is_main), Some(true));
        assert_eq!(store.logos.owned_by("TestTV.us").count(), 1);
    }

    #[test]
    fn remove_channel_request_cascades() {
        let mut store = fixtures::store();
        let report = apply_requests(
            &mut store,
            vec![request(3, &["channels:remove", "approved"], &[("channel_id", "TestTV.us")])],
            &FixedProbe,
        );

        assert_eq!(report.output_line(), "OUTPUT=closes #3");
        assert!(store.feeds.owned_by("TestTV.us").next().is_none());
        assert!(store.logos.is_empty());
        assert_eq!(store.channels.get("OldTV.us").and_then(|c| c.replaced_by.clone()), None);
    }

    #[test]
    fn invalid_edit_is_rolled_back_completely() {
        let mut store = fixtures::store();
        let before = store.fingerprint();

        let report = apply_requests(
            &mut store,
            vec![request(
                4,
                &["channels:edit", "approved"],
                &[("channel_id", "TestTV.us"), ("channel_name", "Renamed TV"), ("website", "not a url")],
            )],
            &FixedProbe,
        );

        assert!(report.processed.is_empty());
        assert_eq!(report.skipped, vec![4]);
        assert_eq!(store.fingerprint(), before);
        let entry = &report.log[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert!(entry.message.contains("\"website\""), "{}", entry.message);
    }

    #[test]
    fn edit_repeating_an_existing_violation_is_still_rolled_back() {
        let mut store = fixtures::store();
        store.channels.update_where(
            |channel| channel.id == "TestTV.us",
            |channel| channel.website = Some("ftp://old.example".to_string()),
        );
        let before = store.fingerprint();

        let report = apply_requests(
            &mut store,
            vec![request(
                4,
                &["channels:edit", "approved"],
                &[("channel_id", "TestTV.us"), ("website", "not a url")],
            )],
            &FixedProbe,
        );

        assert!(report.processed.is_empty());
        assert_eq!(report.skipped, vec![4]);
        assert_eq!(store.fingerprint(), before);
        assert_eq!(
            store.channels.get("TestTV.us").and_then(|channel| channel.website.clone()),
            Some("ftp://old.example".to_string())
        );
    }

    #[test]
    fn cascaded_records_are_checked_too() {
        let mut store = fixtures::store();
        store.channels.update_where(
            |channel| channel.id == "OldTV.us",
            |channel| channel.website = Some("ftp://old.example".to_string()),
        );
        let before = store.fingerprint();

        let report = apply_requests(
            &mut store,
            vec![request(
                8,
                &["feeds:edit", "approved"],
                &[("channel_id", "TestTV.us"), ("feed_id", "HD"), ("feed_name", "Full HD")],
            )],
            &FixedProbe,
        );

        assert_eq!(report.skipped, vec![8]);
        assert_eq!(store.fingerprint(), before);
        assert!(report.log[0].message.contains("channels.csv"), "{}", report.log[0].message);
    }

    #[test]
    fn requests_run_in_number_order_and_unapproved_ones_are_skipped() {
        let mut store = fixtures::store();
        let requests = vec![
            request(9, &["channels:remove", "approved"], &[("channel_id", "BestTV.us")]),
            request(2, &["channels:edit", "approved"], &[("channel_id", "TestTV.us"), ("channel_name", "Best TV")]),
            request(5, &["channels:remove"], &[("channel_id", "OldTV.us")]),
            ChangeRequest::new(6, &["approved"], RequestFields::new()),
        ];

        let report = apply_requests(&mut store, requests, &FixedProbe);

        assert_eq!(report.processed, vec![2, 9]);
        assert_eq!(report.skipped, vec![5, 6]);
        assert_eq!(report.output_line(), "OUTPUT=closes #2, closes #9");
        assert!(store.channels.contains_key("OldTV.us"));
        assert_eq!(store.channels.len(), 1);
        assert_eq!(
            report.log.iter().map(ToString::to_string).collect::<Vec<_>>()[1],
            "warning #5 request is not approved"
        );
    }

    #[test]
    fn main_feed_stays_unique_across_a_batch() {
        let mut store = fixtures::store();
        let feed = |number: u64, name: &'static str| {
            request(
                number,
                &["feeds:add", "approved"],
                &[
                    ("channel_id", "TestTV.us"),
                    ("feed_name", name),
                    ("is_main", "TRUE"),
                    ("broadcast_area", "c/US"),
                    ("timezones", "America/New_York"),
                    ("languages", "eng"),
                    ("format", "1080p"),
                ],
            )
        };

        let report = apply_requests(&mut store, vec![feed(1, "East"), feed(2, "West")], &FixedProbe);

        assert_eq!(report.processed, vec![1, 2]);
        let mains: Vec<&str> = store
            .feeds
            .owned_by("TestTV.us")
            .filter(|feed| feed.is_main)
            .map(|feed| feed.id.as_str())
            .collect();
        assert_eq!(mains, vec!["West"]);
    }

    #[test]
    fn preexisting_violations_do_not_block_unrelated_requests() {
        let mut store = fixtures::store();
        store.feeds.update_where(|feed| feed.channel == "OldTV.us", |feed| feed.is_main = false);

        let report = apply_requests(
            &mut store,
            vec![request(
                1,
                &["blocklist:add", "approved"],
                &[("channel_id", "TestTV.us"), ("reason", "nsfw"), ("ref", "https://example.com/r")],
            )],
            &FixedProbe,
        );

        assert_eq!(report.processed, vec![1]);
    }
}
