use crate::ids::{derive_channel_id, derive_feed_id};
use crate::model::{Channel, Feed, Logo};
use crate::mutation::{cascade, channel_not_found, require_all};
use crate::probe::ImageProbe;
use crate::request::RequestFields;
use crate::store::DataStore;
use crate::RequestError;

pub const DEFAULT_FEED_NAME: &str = "SD";

/// `channels:add`: create the channel, its main feed and, when a logo URL is
/// supplied, its channel-wide logo.
pub fn add(
    store: &mut DataStore,
    fields: &RequestFields,
    probe: &dyn ImageProbe,
) -> Result<String, RequestError> {
    require_all(
        fields,
        &["channel_name", "country", "is_nsfw", "broadcast_area", "timezones", "languages", "format"],
    )?;

    let name = fields.require("channel_name")?;
    let country = fields.require("country")?;
    let id = derive_channel_id(&name, &country);
    if store.channels.contains_key(&id) {
        return Err(RequestError::Duplicate(format!("channel \"{id}\"")));
    }
    let is_nsfw = fields.boolean("is_nsfw")?.value().unwrap_or(false);

    let feed_name =
        fields.string("feed_name").value().unwrap_or_else(|| DEFAULT_FEED_NAME.to_string());
    let feed = Feed {
        channel: id.clone(),
        id: derive_feed_id(&feed_name),
        name: feed_name,
        alt_names: Vec::new(),
        is_main: true,
        broadcast_area: fields.list("broadcast_area").value().unwrap_or_default(),
        timezones: fields.list("timezones").value().unwrap_or_default(),
        languages: fields.list("languages").value().unwrap_or_default(),
        format: fields.string("format").value(),
        line: 0,
    };

    let logo = fields.string("logo_url").value().map(|url| {
        let info = probe.probe(&url);
        Logo {
            channel: id.clone(),
            feed: None,
            tags: Vec::new(),
            width: info.width,
            height: info.height,
            format: info.format,
            url,
            line: 0,
        }
    });

    store.channels.add(Channel {
        id: id.clone(),
        name,
        alt_names: fields.list("alt_names").value().unwrap_or_default(),
        network: fields.string("network").value(),
        owners: fields.list("owners").value().unwrap_or_default(),
        country,
        categories: fields.list("categories").value().unwrap_or_default(),
        is_nsfw,
        launched: fields.string("launched").value(),
        closed: fields.string("closed").value(),
        replaced_by: fields.string("replaced_by").value(),
        website: fields.string("website").value(),
        line: 0,
    });
    let feed_id = feed.id.clone();
    store.feeds.add(feed);
    let with_logo = logo.is_some();
    if let Some(logo) = logo {
        store.logos.add(logo);
    }

    Ok(if with_logo {
        format!("added channel \"{id}\" with main feed \"{feed_id}\" and a logo")
    } else {
        format!("added channel \"{id}\" with main feed \"{feed_id}\"")
    })
}

/// `channels:edit`: update supplied fields; a new name or country re-derives the id
/// and renames every reference to it.
pub fn edit(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let old_id = fields.require("channel_id")?;
    let found = store.channels.get(&old_id).cloned().ok_or_else(|| channel_not_found(&old_id))?;

    let new_id = if fields.has("channel_name") || fields.has("country") {
        let name = fields.string("channel_name").value().unwrap_or_else(|| found.name.clone());
        let country = fields.string("country").value().unwrap_or_else(|| found.country.clone());
        derive_channel_id(&name, &country)
    } else {
        found.id.clone()
    };
    if new_id != old_id && store.channels.contains_key(&new_id) {
        return Err(RequestError::Duplicate(format!("channel \"{new_id}\"")));
    }
    let is_nsfw = fields.boolean("is_nsfw")?;

    store.channels.update_first(
        |channel| channel.id == old_id,
        |channel| {
            fields.string("channel_name").apply(&mut channel.name);
            fields.list("alt_names").apply(&mut channel.alt_names);
            fields.string("network").apply_optional(&mut channel.network);
            fields.list("owners").apply(&mut channel.owners);
            fields.string("country").apply(&mut channel.country);
            fields.list("categories").apply(&mut channel.categories);
            is_nsfw.apply(&mut channel.is_nsfw);
            fields.string("launched").apply_optional(&mut channel.launched);
            fields.string("closed").apply_optional(&mut channel.closed);
            fields.string("replaced_by").apply_optional(&mut channel.replaced_by);
            fields.string("website").apply_optional(&mut channel.website);
            channel.id.clone_from(&new_id);
        },
    );

    if new_id == old_id {
        return Ok(format!("updated channel \"{old_id}\""));
    }
    cascade::channel_id_changed(store, &old_id, &new_id);
    Ok(format!("renamed channel \"{old_id}\" to \"{new_id}\""))
}

/// `channels:remove`: delete the channel and everything that belongs to it.
pub fn remove(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let id = fields.require("channel_id")?;
    if !store.channels.contains_key(&id) {
        return Err(channel_not_found(&id));
    }

    store.channels.remove_where(|channel| channel.id == id);
    cascade::channel_removed(store, &id);
    Ok(format!("removed channel \"{id}\""))
}
