//! Secondary mutations that keep key references consistent after a rename or delete.

use tracing::debug;

use crate::model::stream_id;
use crate::store::DataStore;

/// Point every reference to `old_id` at `new_id`.
///
/// `replaced_by` keeps its `@feed` suffix; feeds, logos and blocklist records
/// move to the new owner.
pub fn channel_id_changed(store: &mut DataStore, old_id: &str, new_id: &str) {
    let replacements = store.channels.update_where(
        |channel| channel.replaced_by_channel() == Some(old_id),
        |channel| {
            channel.replaced_by = channel.replaced_by.as_deref().map(|value| {
                match value.split_once('@') {
                    Some((_, feed)) => stream_id(new_id, feed),
                    None => new_id.to_string(),
                }
            });
        },
    );
    let feeds = store
        .feeds
        .update_where(|feed| feed.channel == old_id, |feed| feed.channel = new_id.to_string());
    let logos = store
        .logos
        .update_where(|logo| logo.channel == old_id, |logo| logo.channel = new_id.to_string());
    let blocked = store.blocklist.update_where(
        |record| record.channel == old_id,
        |record| record.channel = new_id.to_string(),
    );
    debug!(old_id, new_id, replacements, feeds, logos, blocked, "channel id cascade");
}

/// Drop everything owned by a removed channel and clear replacements pointing at it.
pub fn channel_removed(store: &mut DataStore, id: &str) {
    let feeds = store.feeds.remove_where(|feed| feed.channel == id).len();
    let logos = store.logos.remove_where(|logo| logo.channel == id).len();
    let blocked = store.blocklist.remove_where(|record| record.channel == id).len();
    let replacements = store.channels.update_where(
        |channel| channel.replaced_by_channel() == Some(id),
        |channel| channel.replaced_by = None,
    );
    debug!(id, feeds, logos, blocked, replacements, "channel removal cascade");
}

pub fn feed_id_changed(store: &mut DataStore, channel_id: &str, old_id: &str, new_id: &str) {
    let old_stream = stream_id(channel_id, old_id);
    let new_stream = stream_id(channel_id, new_id);
    let replacements = store.channels.update_where(
        |channel| channel.replaced_by.as_deref() == Some(old_stream.as_str()),
        |channel| channel.replaced_by = Some(new_stream.clone()),
    );
    let logos = store.logos.update_where(
        |logo| logo.channel == channel_id && logo.feed.as_deref() == Some(old_id),
        |logo| logo.feed = Some(new_id.to_string()),
    );
    debug!(%old_stream, %new_stream, replacements, logos, "feed id cascade");
}

/// Demote every other main feed of the channel.
pub fn feed_became_main(store: &mut DataStore, channel_id: &str, feed_id: &str) {
    let demoted = store.feeds.update_where(
        |feed| feed.channel == channel_id && feed.id != feed_id && feed.is_main,
        |feed| feed.is_main = false,
    );
    debug!(channel_id, feed_id, demoted, "main feed cascade");
}

pub fn feed_removed(store: &mut DataStore, channel_id: &str, feed_id: &str) {
    let stream = stream_id(channel_id, feed_id);
    let replacements = store.channels.update_where(
        |channel| channel.replaced_by.as_deref() == Some(stream.as_str()),
        |channel| channel.replaced_by = None,
    );
    let logos = store
        .logos
        .remove_where(|logo| logo.channel == channel_id && logo.feed.as_deref() == Some(feed_id))
        .len();
    debug!(%stream, replacements, logos, "feed removal cascade");
}

/// Strip `ct/<code>` from every broadcast area. Feeds left without an area are
/// reported by validation, not here.
pub fn city_removed(store: &mut DataStore, code: &str) {
    let area = format!("ct/{code}");
    let feeds = store.feeds.update_where(
        |feed| feed.broadcast_area.contains(&area),
        |feed| feed.broadcast_area.retain(|entry| entry != &area),
    );
    debug!(code, feeds, "city removal cascade");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::fixtures::{self, feed};

    #[test]
    fn channel_rename_rewrites_every_reference() {
        let mut store = fixtures::store();
        store.blocklist.add(crate::model::BlocklistRecord {
            channel: "TestTV.us".to_string(),
            reason: "dmca".to_string(),
            reference: "https://example.com/notice".to_string(),
            line: 0,
        });

        store.channels.update_where(|c| c.id == "TestTV.us", |c| c.id = "NewTV.us".to_string());
        channel_id_changed(&mut store, "TestTV.us", "NewTV.us");

        assert_eq!(
            store.channels.get("OldTV.us").and_then(|c| c.replaced_by.as_deref()),
            Some("NewTV.us@HD")
        );
        assert_eq!(store.feeds.owned_by("NewTV.us").count(), 2);
        assert_eq!(store.logos.owned_by("NewTV.us").count(), 2);
        assert_eq!(store.blocklist.owned_by("NewTV.us").count(), 1);
        assert_eq!(store.feeds.owned_by("TestTV.us").count(), 0);
        assert!(store.feeds.contains_key("NewTV.us@HD"));
    }

    #[test]
    fn channel_removal_drops_owned_records() {
        let mut store = fixtures::store();
        store.channels.remove_where(|c| c.id == "TestTV.us");
        channel_removed(&mut store, "TestTV.us");

        assert_eq!(store.feeds.len(), 1);
        assert!(store.logos.is_empty());
        assert_eq!(store.channels.get("OldTV.us").and_then(|c| c.replaced_by.clone()), None);
    }

    #[test]
    fn feed_rename_moves_replacements_and_logos() {
        let mut store = fixtures::store();
        store.feeds.update_where(|f| f.stream_id() == "TestTV.us@HD", |f| f.id = "FHD".to_string());
        feed_id_changed(&mut store, "TestTV.us", "HD", "FHD");

        assert_eq!(
            store.channels.get("OldTV.us").and_then(|c| c.replaced_by.as_deref()),
            Some("TestTV.us@FHD")
        );
        assert!(store.logos.first_where(|l| l.feed.as_deref() == Some("FHD")).is_some());
        assert!(store.logos.first_where(|l| l.feed.as_deref() == Some("HD")).is_none());
    }

    #[test]
    fn new_main_feed_demotes_the_others() {
        let mut store = fixtures::store();
        store.feeds.update_where(|f| f.stream_id() == "TestTV.us@HD", |f| f.is_main = true);
        feed_became_main(&mut store, "TestTV.us", "HD");

        let mains: Vec<String> =
            store.feeds.owned_by("TestTV.us").filter(|f| f.is_main).map(|f| f.id.clone()).collect();
        assert_eq!(mains, vec!["HD".to_string()]);
    }

    #[test]
    fn feed_removal_clears_replacements_and_scoped_logos() {
        let mut store = fixtures::store();
        store.feeds.remove_where(|f| f.stream_id() == "TestTV.us@HD");
        feed_removed(&mut store, "TestTV.us", "HD");

        assert_eq!(store.channels.get("OldTV.us").and_then(|c| c.replaced_by.clone()), None);
        assert_eq!(store.logos.len(), 1);
    }

    #[test]
    fn city_removal_prunes_broadcast_areas() {
        let mut store = fixtures::store();
        store.feeds.add(crate::model::Feed {
            broadcast_area: vec!["ct/USNYC".to_string(), "s/US-NY".to_string()],
            ..feed("OldTV.us", "NYC", false)
        });
        city_removed(&mut store, "USNYC");

        assert_eq!(
            store.feeds.get("OldTV.us@NYC").map(|f| f.broadcast_area.clone()),
            Some(vec!["s/US-NY".to_string()])
        );
    }
}
