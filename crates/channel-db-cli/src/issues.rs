//! Change-request sources: a JSON batch file or the GitHub issues API.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use channel_db_core::{ChangeRequest, RequestFields};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

/// Issue-form section labels and the request fields they fill.
const FIELD_LABELS: [(&str, &str); 33] = [
    ("Channel ID", "channel_id"),
    ("Channel Name", "channel_name"),
    ("Feed Name", "feed_name"),
    ("Feed ID", "feed_id"),
    ("Main Feed", "is_main"),
    ("Alternative Names", "alt_names"),
    ("Network", "network"),
    ("Owners", "owners"),
    ("Country", "country"),
    ("Subdivision", "subdivision"),
    ("Broadcast Area", "broadcast_area"),
    ("Timezones", "timezones"),
    ("Format", "format"),
    ("Languages", "languages"),
    ("Categories", "categories"),
    ("NSFW", "is_nsfw"),
    ("Launched", "launched"),
    ("Closed", "closed"),
    ("Replaced By", "replaced_by"),
    ("Website", "website"),
    ("Reason", "reason"),
    ("Notes", "notes"),
    ("Reference", "ref"),
    ("Logo URL", "logo_url"),
    ("Tags", "tags"),
    ("Width", "width"),
    ("Height", "height"),
    ("New Channel ID", "new_channel_id"),
    ("New Feed ID", "new_feed_id"),
    ("New Logo URL", "new_logo_url"),
    ("City Name", "city_name"),
    ("City Code", "city_code"),
    ("Wikidata ID", "wikidata_id"),
];

/// One issue as found in a batch file or returned by the GitHub API.
#[derive(Debug, Deserialize)]
struct IssueRecord {
    number: u64,
    #[serde(default)]
    labels: Vec<LabelRef>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    fields: Option<RequestFields>,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelRef {
    Name(String),
    Object { name: String },
}

impl LabelRef {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Object { name } => name,
        }
    }
}

impl IssueRecord {
    fn into_request(self) -> ChangeRequest {
        let mut fields = self.body.as_deref().map(parse_issue_body).unwrap_or_default();
        if let Some(explicit) = self.fields {
            for (name, value) in explicit.iter() {
                fields.insert(name, value);
            }
        }
        ChangeRequest {
            number: self.number,
            labels: self.labels.into_iter().map(LabelRef::into_name).collect(),
            fields,
        }
    }
}

/// Turn an issue-form body into request fields.
///
/// The body is a sequence of `### <Label>` sections. `(optional)`/`(required)`
/// suffixes are ignored, multi-line values are joined with CRLF, and
/// `_No response_`/`None` leave the field unset. Unknown labels are dropped.
#[must_use]
pub fn parse_issue_body(body: &str) -> RequestFields {
    let mut fields = RequestFields::new();
    for section in body.split("###") {
        let mut lines = section.lines().map(str::trim_end).filter(|line| !line.is_empty());
        let Some(label) = lines.next() else {
            continue;
        };
        let label = label.replace(" (optional)", "").replace(" (required)", "");
        let value = lines.collect::<Vec<_>>().join("\r\n");
        let value = value.trim();
        if value.is_empty()
            || value.eq_ignore_ascii_case("_no response_")
            || value.eq_ignore_ascii_case("none")
        {
            continue;
        }

        let label = label.trim();
        match FIELD_LABELS.iter().find(|(known, _)| *known == label) {
            Some((_, name)) => fields.insert(*name, value),
            None => debug!(label, "ignoring unknown issue section"),
        }
    }
    fields
}

/// Read a JSON array of `{number, labels, body}` or `{number, labels, fields}` objects.
///
/// # Errors
/// Returns an error when the file cannot be read or is not such an array.
pub fn load_batch_file(path: &Path) -> Result<Vec<ChangeRequest>> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read request batch {}", path.display()))?;
    let records: Vec<IssueRecord> = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse request batch {}", path.display()))?;
    Ok(records.into_iter().map(IssueRecord::into_request).collect())
}

/// Open issues of `repo` (`owner/name`) labelled `approved`, oldest first.
///
/// # Errors
/// Returns an error when a page cannot be fetched or decoded.
pub fn load_github_issues(repo: &str, token: Option<&str>) -> Result<Vec<ChangeRequest>> {
    if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
        return Err(anyhow!("invalid GitHub repository {repo:?}, expected owner/name"));
    }

    let agent = ureq::AgentBuilder::new().timeout(Duration::from_secs(30)).build();
    let url = format!("{GITHUB_API}/repos/{repo}/issues");
    let mut requests = Vec::new();
    for page in 1.. {
        let page_param = page.to_string();
        let per_page = PAGE_SIZE.to_string();
        let mut call = agent
            .get(&url)
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "chdb")
            .set("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .query("state", "open")
            .query("labels", "approved")
            .query("sort", "created")
            .query("direction", "asc")
            .query("per_page", &per_page)
            .query("page", &page_param);
        if let Some(token) = token {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }

        let records: Vec<IssueRecord> = call
            .call()
            .with_context(|| format!("failed to fetch issues page {page} of {repo}"))?
            .into_json()
            .with_context(|| format!("failed to decode issues page {page} of {repo}"))?;
        let fetched = records.len();
        debug!(page, fetched, "fetched issues page");
        requests.extend(
            records
                .into_iter()
                .filter(|record| record.pull_request.is_none())
                .map(IssueRecord::into_request),
        );
        if fetched < PAGE_SIZE {
            break;
        }
    }

    info!(repo, issues = requests.len(), "loaded approved issues");
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_db_core::Field;

    const BODY: &str = "### Channel Name\r\n\r\nTest TV\r\n\r\n### Alternative Names (optional)\r\n\r\nTest\r\nTeste\r\n\r\n### Network (optional)\r\n\r\n_No response_\r\n\r\n### Country\r\n\r\nUS\r\n\r\n### Favourite Colour\r\n\r\nblue\r\n\r\n### NSFW\r\n\r\nFALSE";

    #[test]
    fn issue_body_sections_map_to_fields() {
        let fields = parse_issue_body(BODY);

        assert_eq!(fields.string("channel_name"), Field::Value("Test TV".to_string()));
        assert_eq!(
            fields.list("alt_names"),
            Field::Value(vec!["Test".to_string(), "Teste".to_string()])
        );
        assert!(fields.missing("network"));
        assert_eq!(fields.string("country"), Field::Value("US".to_string()));
        assert_eq!(fields.boolean("is_nsfw"), Ok(Field::Value(false)));
        assert_eq!(fields.iter().count(), 4);
    }

    #[test]
    fn batch_accepts_bodies_and_explicit_fields() -> Result<()> {
        let json = serde_json::json!([
            { "number": 12, "labels": [{ "name": "channels:add" }, { "name": "approved" }], "body": BODY },
            { "number": 3, "labels": ["channels:remove", "approved"], "fields": { "channel_id": "OldTV.us" } },
            { "number": 4 }
        ]);
        let records: Vec<IssueRecord> = serde_json::from_value(json)?;
        let requests: Vec<ChangeRequest> =
            records.into_iter().map(IssueRecord::into_request).collect();

        assert_eq!(requests[0].labels, vec!["channels:add".to_string(), "approved".to_string()]);
        assert_eq!(requests[0].fields.string("country"), Field::Value("US".to_string()));
        assert!(requests[1].is_approved());
        assert_eq!(requests[1].fields.string("channel_id"), Field::Value("OldTV.us".to_string()));
        assert!(requests[2].labels.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_repository_is_rejected_before_any_request() {
        let Err(err) = load_github_issues("not-a-repo", None) else {
            panic!("expected an invalid repository error");
        };
        assert!(err.to_string().contains("expected owner/name"));
    }
}
