use crate::model::{stream_id, Logo};
use crate::mutation::{ensure_channel, require_all};
use crate::probe::{format_from_url, ImageInfo, ImageProbe};
use crate::request::{Field, RequestFields};
use crate::store::DataStore;
use crate::RequestError;

fn logo_key(channel: &str, feed: Option<&str>, url: &str) -> String {
    format!("{channel}@{}|{url}", feed.unwrap_or_default())
}

fn describe(channel: &str, feed: Option<&str>, url: &str) -> String {
    match feed {
        Some(feed) => format!("logo \"{url}\" of \"{}\"", stream_id(channel, feed)),
        None => format!("logo \"{url}\" of \"{channel}\""),
    }
}

fn ensure_stream(store: &DataStore, channel: &str, feed: Option<&str>) -> Result<(), RequestError> {
    ensure_channel(store, channel)?;
    match feed {
        Some(feed) if !store.feeds.contains_key(&stream_id(channel, feed)) => Err(
            RequestError::NotFound(format!("feed \"{}\"", stream_id(channel, feed))),
        ),
        _ => Ok(()),
    }
}

/// `logos:add`. Width and height come from the request when given, otherwise
/// from the probe; a probe failure records `0x0`.
pub fn add(
    store: &mut DataStore,
    fields: &RequestFields,
    probe: &dyn ImageProbe,
) -> Result<String, RequestError> {
    require_all(fields, &["channel_id", "logo_url"])?;
    let channel = fields.require("channel_id")?;
    let feed = fields.string("feed_id").value();
    let url = fields.require("logo_url")?;
    ensure_stream(store, &channel, feed.as_deref())?;
    if store.logos.contains_key(&logo_key(&channel, feed.as_deref(), &url)) {
        return Err(RequestError::Duplicate(describe(&channel, feed.as_deref(), &url)));
    }
    let width = fields.number("width")?.value();
    let height = fields.number("height")?.value();
    let format = fields.string("format").value();

    let info = match (width, height) {
        (Some(width), Some(height)) => ImageInfo {
            width,
            height,
            format: format.clone().or_else(|| format_from_url(&url)),
        },
        _ => probe.probe(&url),
    };

    let summary = format!("added {}", describe(&channel, feed.as_deref(), &url));
    store.logos.add(Logo {
        channel,
        feed,
        tags: fields.list("tags").value().unwrap_or_default(),
        width: info.width,
        height: info.height,
        format: format.or(info.format),
        url,
        line: 0,
    });
    Ok(summary)
}

/// `logos:edit`. The logo is identified by channel, feed and URL; a new URL is
/// probed again.
pub fn edit(
    store: &mut DataStore,
    fields: &RequestFields,
    probe: &dyn ImageProbe,
) -> Result<String, RequestError> {
    let channel = fields.require("channel_id")?;
    let feed = fields.string("feed_id").value();
    let url = fields.require("logo_url")?;
    let found = store
        .logos
        .get(&logo_key(&channel, feed.as_deref(), &url))
        .cloned()
        .ok_or_else(|| RequestError::NotFound(describe(&channel, feed.as_deref(), &url)))?;

    let mut updated = found.clone();
    fields.string("new_channel_id").apply(&mut updated.channel);
    fields.string("new_feed_id").apply_optional(&mut updated.feed);
    fields.list("tags").apply(&mut updated.tags);
    if let Field::Value(new_url) = fields.string("new_logo_url") {
        let info = probe.probe(&new_url);
        updated.width = info.width;
        updated.height = info.height;
        updated.format = info.format;
        updated.url = new_url;
    }

    ensure_stream(store, &updated.channel, updated.feed.as_deref())?;
    let new_key = logo_key(&updated.channel, updated.feed.as_deref(), &updated.url);
    let old_key = logo_key(&found.channel, found.feed.as_deref(), &found.url);
    if new_key != old_key && store.logos.contains_key(&new_key) {
        return Err(RequestError::Duplicate(describe(
            &updated.channel,
            updated.feed.as_deref(),
            &updated.url,
        )));
    }

    let summary = format!("updated {}", describe(&channel, feed.as_deref(), &url));
    store.logos.update_first(
        |logo| logo_key(&logo.channel, logo.feed.as_deref(), &logo.url) == old_key,
        |logo| *logo = Logo { line: logo.line, ..updated },
    );
    Ok(summary)
}

/// `logos:remove`. Removes the one logo matching channel, feed and URL exactly.
pub fn remove(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let channel = fields.require("channel_id")?;
    let feed = fields.string("feed_id").value();
    let url = fields.require("logo_url")?;
    let key = logo_key(&channel, feed.as_deref(), &url);

    let removed =
        store.logos.remove_where(|logo| logo_key(&logo.channel, logo.feed.as_deref(), &logo.url) == key);
    if removed.is_empty() {
        return Err(RequestError::NotFound(describe(&channel, feed.as_deref(), &url)));
    }
    Ok(format!("removed {}", describe(&channel, feed.as_deref(), &url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::fixtures::{self, fields, FixedProbe};
    use crate::validate::validate;

    #[test]
    fn add_probes_dimensions_unless_supplied() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        add(
            &mut store,
            &fields(&[("channel_id", "OldTV.us"), ("logo_url", "https://example.com/old.png")]),
            &FixedProbe,
        )?;
        add(
            &mut store,
            &fields(&[
                ("channel_id", "OldTV.us"),
                ("feed_id", "SD"),
                ("logo_url", "https://example.com/old.svg"),
                ("width", "1000"),
                ("height", "250"),
                ("tags", "horizontal;white"),
            ]),
            &FixedProbe,
        )?;

        let probed = store.logos.get("OldTV.us@|https://example.com/old.png").cloned();
        assert_eq!(probed.map(|logo| (logo.width, logo.height)), Some((512, 512)));
        let given = store.logos.get("OldTV.us@SD|https://example.com/old.svg").cloned();
        assert_eq!(
            given.map(|logo| (logo.width, logo.height, logo.format, logo.tags.len())),
            Some((1000, 250, Some("SVG".to_string()), 2))
        );
        assert!(validate(&store).is_clean(), "{:?}", validate(&store).violations);
        Ok(())
    }

    #[test]
    fn add_rejects_unknown_feed_and_duplicates() {
        let mut store = fixtures::store();

        assert_eq!(
            add(
                &mut store,
                &fields(&[("channel_id", "TestTV.us"), ("feed_id", "4K"), ("logo_url", "https://a.b/c.png")]),
                &FixedProbe,
            ),
            Err(RequestError::NotFound("feed \"TestTV.us@4K\"".to_string()))
        );
        assert_eq!(
            add(
                &mut store,
                &fields(&[("channel_id", "TestTV.us"), ("logo_url", "https://example.com/test.png")]),
                &FixedProbe,
            ),
            Err(RequestError::Duplicate(
                "logo \"https://example.com/test.png\" of \"TestTV.us\"".to_string()
            ))
        );
    }

    #[test]
    fn edit_moves_the_logo_and_reprobes_a_new_url() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        let request = fields(&[
            ("channel_id", "TestTV.us"),
            ("feed_id", "HD"),
            ("logo_url", "https://example.com/test-hd.png"),
            ("new_feed_id", "~"),
            ("new_logo_url", "https://example.com/test-wide.png"),
        ]);

        edit(&mut store, &request, &FixedProbe)?;

        assert!(store.logos.contains_key("TestTV.us@|https://example.com/test-wide.png"));
        assert!(!store.logos.contains_key("TestTV.us@HD|https://example.com/test-hd.png"));
        assert_eq!(store.logos.len(), 2);
        Ok(())
    }

    #[test]
    fn remove_needs_an_exact_match() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        let loose = fields(&[("channel_id", "TestTV.us"), ("logo_url", "https://example.com/test-hd.png")]);
        assert!(matches!(remove(&mut store, &loose), Err(RequestError::NotFound(_))));

        remove(&mut store, &loose.with("feed_id", "HD"))?;
        assert_eq!(store.logos.len(), 1);
        Ok(())
    }
}
