use crate::ids::derive_feed_id;
use crate::model::{stream_id, Feed};
use crate::mutation::{cascade, ensure_channel, require_all};
use crate::request::{Field, RequestFields};
use crate::store::DataStore;
use crate::RequestError;

fn feed_not_found(stream: &str) -> RequestError {
    RequestError::NotFound(format!("feed \"{stream}\""))
}

/// `feeds:add`. A new main feed demotes the channel's current one.
pub fn add(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    require_all(
        fields,
        &["channel_id", "feed_name", "is_main", "broadcast_area", "timezones", "languages", "format"],
    )?;

    let channel_id = fields.require("channel_id")?;
    ensure_channel(store, &channel_id)?;
    let name = fields.require("feed_name")?;
    let id = derive_feed_id(&name);
    let stream = stream_id(&channel_id, &id);
    if store.feeds.contains_key(&stream) {
        return Err(RequestError::Duplicate(format!("feed \"{stream}\"")));
    }
    let is_main = fields.boolean("is_main")?.value().unwrap_or(false);

    if is_main {
        cascade::feed_became_main(store, &channel_id, &id);
    }
    store.feeds.add(Feed {
        channel: channel_id,
        id,
        name,
        alt_names: fields.list("alt_names").value().unwrap_or_default(),
        is_main,
        broadcast_area: fields.list("broadcast_area").value().unwrap_or_default(),
        timezones: fields.list("timezones").value().unwrap_or_default(),
        languages: fields.list("languages").value().unwrap_or_default(),
        format: fields.string("format").value(),
        line: 0,
    });

    Ok(format!("added feed \"{stream}\""))
}

/// `feeds:edit`. Renaming re-derives the feed id and moves references to the new stream.
pub fn edit(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let channel_id = fields.require("channel_id")?;
    let old_id = fields.require("feed_id")?;
    let old_stream = stream_id(&channel_id, &old_id);
    if !store.feeds.contains_key(&old_stream) {
        return Err(feed_not_found(&old_stream));
    }

    let new_id = fields
        .string("feed_name")
        .value()
        .map_or_else(|| old_id.clone(), |name| derive_feed_id(&name));
    let new_stream = stream_id(&channel_id, &new_id);
    if new_id != old_id && store.feeds.contains_key(&new_stream) {
        return Err(RequestError::Duplicate(format!("feed \"{new_stream}\"")));
    }
    let is_main = fields.boolean("is_main")?;
    let promoted = matches!(is_main, Field::Value(true));

    store.feeds.update_first(
        |feed| feed.channel == channel_id && feed.id == old_id,
        |feed| {
            fields.string("feed_name").apply(&mut feed.name);
            fields.list("alt_names").apply(&mut feed.alt_names);
            is_main.apply(&mut feed.is_main);
            fields.list("broadcast_area").apply(&mut feed.broadcast_area);
            fields.list("timezones").apply(&mut feed.timezones);
            fields.list("languages").apply(&mut feed.languages);
            fields.string("format").apply_optional(&mut feed.format);
            feed.id.clone_from(&new_id);
        },
    );

    if new_id != old_id {
        cascade::feed_id_changed(store, &channel_id, &old_id, &new_id);
    }
    if promoted {
        cascade::feed_became_main(store, &channel_id, &new_id);
    }

    Ok(if new_id == old_id {
        format!("updated feed \"{old_stream}\"")
    } else {
        format!("renamed feed \"{old_stream}\" to \"{new_stream}\"")
    })
}

/// `feeds:remove`. Logos scoped to the feed go with it.
pub fn remove(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let channel_id = fields.require("channel_id")?;
    let feed_id = fields.require("feed_id")?;
    let stream = stream_id(&channel_id, &feed_id);
    if !store.feeds.contains_key(&stream) {
        return Err(feed_not_found(&stream));
    }

    store.feeds.remove_where(|feed| feed.channel == channel_id && feed.id == feed_id);
    cascade::feed_removed(store, &channel_id, &feed_id);
    Ok(format!("removed feed \"{stream}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::fixtures::{self, fields};
    use crate::validate::validate;

    fn main_ids(store: &DataStore, channel: &str) -> Vec<String> {
        store.feeds.owned_by(channel).filter(|feed| feed.is_main).map(|feed| feed.id.clone()).collect()
    }

    #[test]
    fn adding_a_main_feed_keeps_exactly_one_main() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        let request = fields(&[
            ("channel_id", "TestTV.us"),
            ("feed_name", "East Coast"),
            ("is_main", "TRUE"),
            ("broadcast_area", "s/US-NY"),
            ("timezones", "America/New_York"),
            ("languages", "eng"),
            ("format", "720p"),
        ]);

        assert_eq!(add(&mut store, &request)?, "added feed \"TestTV.us@EastCoast\"");
        assert_eq!(main_ids(&store, "TestTV.us"), vec!["EastCoast".to_string()]);
        assert!(validate(&store).is_clean(), "{:?}", validate(&store).violations);
        Ok(())
    }

    #[test]
    fn add_requires_an_existing_channel() {
        let mut store = fixtures::store();
        let request = fields(&[
            ("channel_id", "Ghost.us"),
            ("feed_name", "SD"),
            ("is_main", "TRUE"),
            ("broadcast_area", "c/US"),
            ("timezones", "America/New_York"),
            ("languages", "eng"),
            ("format", "480i"),
        ]);

        assert_eq!(
            add(&mut store, &request),
            Err(RequestError::NotFound("channel \"Ghost.us\"".to_string()))
        );
    }

    #[test]
    fn promoting_a_feed_demotes_the_previous_main() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        edit(&mut store, &fields(&[("channel_id", "TestTV.us"), ("feed_id", "HD"), ("is_main", "true")]))?;

        assert_eq!(main_ids(&store, "TestTV.us"), vec!["HD".to_string()]);
        Ok(())
    }

    #[test]
    fn demoting_a_feed_leaves_other_feeds_alone() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        edit(&mut store, &fields(&[("channel_id", "TestTV.us"), ("feed_id", "SD"), ("is_main", "false")]))?;

        assert!(main_ids(&store, "TestTV.us").is_empty());
        assert_eq!(main_ids(&store, "OldTV.us"), vec!["SD".to_string()]);
        Ok(())
    }

    #[test]
    fn renaming_a_feed_moves_logos_and_replacements() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        let request =
            fields(&[("channel_id", "TestTV.us"), ("feed_id", "HD"), ("feed_name", "Full HD")]);

        let summary = edit(&mut store, &request)?;

        assert_eq!(summary, "renamed feed \"TestTV.us@HD\" to \"TestTV.us@FullHD\"");
        assert_eq!(
            store.channels.get("OldTV.us").and_then(|c| c.replaced_by.as_deref()),
            Some("TestTV.us@FullHD")
        );
        assert!(store.logos.first_where(|logo| logo.feed.as_deref() == Some("FullHD")).is_some());
        assert!(validate(&store).is_clean(), "{:?}", validate(&store).violations);
        Ok(())
    }

    #[test]
    fn removing_a_feed_clears_dependents() -> Result<(), RequestError> {
        let mut store = fixtures::store();
        remove(&mut store, &fields(&[("channel_id", "TestTV.us"), ("feed_id", "HD")]))?;

        assert!(!store.feeds.contains_key("TestTV.us@HD"));
        assert_eq!(store.logos.len(), 1);
        assert_eq!(store.channels.get("OldTV.us").and_then(|c| c.replaced_by.clone()), None);
        Ok(())
    }

    #[test]
    fn unknown_feed_is_not_found() {
        let mut store = fixtures::store();
        assert_eq!(
            remove(&mut store, &fields(&[("channel_id", "TestTV.us"), ("feed_id", "4K")])),
            Err(RequestError::NotFound("feed \"TestTV.us@4K\"".to_string()))
        );
    }
}
