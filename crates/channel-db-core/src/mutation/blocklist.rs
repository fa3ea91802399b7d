use crate::model::BlocklistRecord;
use crate::mutation::{ensure_channel, require_all};
use crate::request::RequestFields;
use crate::store::DataStore;
use crate::RequestError;

/// `blocklist:add`. One record per (channel, ref); the reason is stored lowercased.
pub fn block(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    require_all(fields, &["channel_id", "reason", "ref"])?;
    let channel = fields.require("channel_id")?;
    let reference = fields.require("ref")?;
    ensure_channel(store, &channel)?;
    if store.blocklist.contains_key(&format!("{channel}|{reference}")) {
        return Err(RequestError::Duplicate(format!(
            "blocklist record for \"{channel}\" with ref \"{reference}\""
        )));
    }
    let reason = fields.require("reason")?.to_lowercase();

    let summary = format!("blocked \"{channel}\" ({reason})");
    store.blocklist.add(BlocklistRecord { channel, reason, reference, line: 0 });
    Ok(summary)
}

/// `blocklist:remove`. Without a `ref` every record of the channel is removed.
pub fn unblock(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let channel = fields.require("channel_id")?;
    let reference = fields.string("ref").value();

    let removed = store.blocklist.remove_where(|record| {
        record.channel == channel
            && (reference.is_none() || reference.as_deref() == Some(record.reference.as_str()))
    });
    if removed.is_empty() {
        return Err(RequestError::NotFound(format!("blocklist record for \"{channel}\"")));
    }
    Ok(format!("unblocked \"{channel}\" ({} record(s))", removed.len()))
}
