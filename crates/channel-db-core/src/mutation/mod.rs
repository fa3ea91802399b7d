//! One processor per action. Every processor checks its preconditions before
//! touching the store, then mutates and runs the cascades its change implies.
//! Validation and rollback are the caller's job (see [`crate::run`]).

use crate::probe::ImageProbe;
use crate::request::{Action, RequestFields};
use crate::store::DataStore;
use crate::RequestError;

pub mod blocklist;
pub mod cascade;
pub mod channels;
pub mod cities;
pub mod feeds;
pub mod logos;

/// Apply one action to the store and describe what changed.
///
/// # Errors
/// Returns a [`RequestError`] naming the missing field, unknown target or
/// duplicate that prevented the change. The store is left untouched in that case.
pub fn apply(
    store: &mut DataStore,
    action: Action,
    fields: &RequestFields,
    probe: &dyn ImageProbe,
) -> Result<String, RequestError> {
    match action {
        Action::AddChannel => channels::add(store, fields, probe),
        Action::EditChannel => channels::edit(store, fields),
        Action::RemoveChannel => channels::remove(store, fields),
        Action::AddFeed => feeds::add(store, fields),
        Action::EditFeed => feeds::edit(store, fields),
        Action::RemoveFeed => feeds::remove(store, fields),
        Action::AddLogo => logos::add(store, fields, probe),
        Action::EditLogo => logos::edit(store, fields, probe),
        Action::RemoveLogo => logos::remove(store, fields),
        Action::BlockChannel => blocklist::block(store, fields),
        Action::UnblockChannel => blocklist::unblock(store, fields),
        Action::AddCity => cities::add(store, fields),
        Action::EditCity => cities::edit(store, fields),
        Action::RemoveCity => cities::remove(store, fields),
    }
}

/// Fail with the first listed field that was not supplied.
fn require_all(fields: &RequestFields, names: &[&'static str]) -> Result<(), RequestError> {
    names.iter().try_for_each(|name| fields.require_present(*name))
}

fn channel_not_found(id: &str) -> RequestError {
    RequestError::NotFound(format!("channel \"{id}\""))
}

fn ensure_channel(store: &DataStore, id: &str) -> Result<(), RequestError> {
    if store.channels.contains_key(id) {
        Ok(())
    } else {
        Err(channel_not_found(id))
    }
}
