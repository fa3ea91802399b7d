use crate::model::City;
use crate::mutation::{cascade, require_all};
use crate::request::RequestFields;
use crate::store::DataStore;
use crate::RequestError;

fn city_not_found(code: &str) -> RequestError {
    RequestError::NotFound(format!("city \"{code}\""))
}

/// `cities:add`.
pub fn add(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    require_all(fields, &["city_name", "city_code", "country", "wikidata_id"])?;
    let code = fields.require("city_code")?;
    if store.cities.contains_key(&code) {
        return Err(RequestError::Duplicate(format!("city \"{code}\"")));
    }

    let summary = format!("added city \"{code}\"");
    store.cities.add(City {
        country: fields.require("country")?,
        subdivision: fields.string("subdivision").value(),
        name: fields.require("city_name")?,
        code,
        wikidata_id: fields.require("wikidata_id")?,
        line: 0,
    });
    Ok(summary)
}

/// `cities:edit`. The code identifies the city and cannot be changed.
pub fn edit(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let code = fields.require("city_code")?;
    if !store.cities.contains_key(&code) {
        return Err(city_not_found(&code));
    }

    store.cities.update_first(
        |city| city.code == code,
        |city| {
            fields.string("city_name").apply(&mut city.name);
            fields.string("country").apply(&mut city.country);
            fields.string("subdivision").apply_optional(&mut city.subdivision);
            fields.string("wikidata_id").apply(&mut city.wikidata_id);
        },
    );
    Ok(format!("updated city \"{code}\""))
}

/// `cities:remove`. Broadcast areas naming the city lose that entry.
pub fn remove(store: &mut DataStore, fields: &RequestFields) -> Result<String, RequestError> {
    let code = fields.require("city_code")?;
    if store.cities.remove_where(|city| city.code == code).is_empty() {
        return Err(city_not_found(&code));
    }

    cascade::city_removed(store, &code);
    Ok(format!("removed city \"{code}\""))
}
