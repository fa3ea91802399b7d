use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::RequestError;

/// Field value that clears the target column instead of leaving it untouched.
pub const CLEAR_SENTINEL: &str = "~";

pub const APPROVED_LABEL: &str = "approved";

/// One field of a change request: not supplied, explicitly cleared, or set.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Field<T> {
    Absent,
    Clear,
    Value(T),
}

impl<T> Field<T> {
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// The supplied value; `Clear` and `Absent` both yield `None`.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Clear => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Absent => Field::Absent,
            Self::Clear => Field::Clear,
            Self::Value(value) => Field::Value(f(value)),
        }
    }

    /// Write into a required column. `Clear` resets it to the type's empty value.
    pub fn apply(self, target: &mut T)
    where
        T: Default,
    {
        match self {
            Self::Absent => {}
            Self::Clear => *target = T::default(),
            Self::Value(value) => *target = value,
        }
    }

    /// Write into an optional column. `Clear` resets it to `None`.
    pub fn apply_optional(self, target: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Clear => *target = None,
            Self::Value(value) => *target = Some(value),
        }
    }
}

/// Named text fields of a change request.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFields(BTreeMap<String, String>);

impl RequestFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    /// Supplied, either with a value or with the clear sentinel.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.raw(name).is_some()
    }

    #[must_use]
    pub fn missing(&self, name: &str) -> bool {
        !self.has(name)
    }

    #[must_use]
    pub fn string(&self, name: &str) -> Field<String> {
        match self.raw(name) {
            None => Field::Absent,
            Some(CLEAR_SENTINEL) => Field::Clear,
            Some(value) => Field::Value(value.to_string()),
        }
    }

    /// List fields accept newline or `;` separators.
    #[must_use]
    pub fn list(&self, name: &str) -> Field<Vec<String>> {
        self.string(name).map(|value| {
            value
                .split(['\r', '\n', ';'])
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// # Errors
    /// Returns [`RequestError::InvalidField`] for anything other than `TRUE`/`FALSE`
    /// (case-insensitive).
    pub fn boolean(&self, name: &'static str) -> Result<Field<bool>, RequestError> {
        match self.string(name) {
            Field::Absent => Ok(Field::Absent),
            Field::Clear => Ok(Field::Clear),
            Field::Value(value) if value.eq_ignore_ascii_case("true") => Ok(Field::Value(true)),
            Field::Value(value) if value.eq_ignore_ascii_case("false") => Ok(Field::Value(false)),
            Field::Value(value) => Err(RequestError::InvalidField { field: name, value }),
        }
    }

    /// # Errors
    /// Returns [`RequestError::InvalidField`] when the value is not a non-negative integer.
    pub fn number(&self, name: &'static str) -> Result<Field<u32>, RequestError> {
        match self.string(name) {
            Field::Absent => Ok(Field::Absent),
            Field::Clear => Ok(Field::Clear),
            Field::Value(value) => value
                .parse::<u32>()
                .map(Field::Value)
                .map_err(|_| RequestError::InvalidField { field: name, value }),
        }
    }

    /// # Errors
    /// Returns [`RequestError::MissingField`] unless the field carries a value.
    pub fn require(&self, name: &'static str) -> Result<String, RequestError> {
        self.string(name).value().ok_or(RequestError::MissingField(name))
    }

    /// # Errors
    /// Returns [`RequestError::MissingField`] unless the field is supplied at all.
    pub fn require_present(&self, name: &'static str) -> Result<(), RequestError> {
        if self.missing(name) {
            return Err(RequestError::MissingField(name));
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect())
    }
}

/// Every supported `<entity>:<verb>` label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Action {
    AddChannel,
    EditChannel,
    RemoveChannel,
    AddFeed,
    EditFeed,
    RemoveFeed,
    AddLogo,
    EditLogo,
    RemoveLogo,
    BlockChannel,
    UnblockChannel,
    AddCity,
    EditCity,
    RemoveCity,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Self::AddChannel,
        Self::EditChannel,
        Self::RemoveChannel,
        Self::AddFeed,
        Self::EditFeed,
        Self::RemoveFeed,
        Self::AddLogo,
        Self::EditLogo,
        Self::RemoveLogo,
        Self::BlockChannel,
        Self::UnblockChannel,
        Self::AddCity,
        Self::EditCity,
        Self::RemoveCity,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AddChannel => "channels:add",
            Self::EditChannel => "channels:edit",
            Self::RemoveChannel => "channels:remove",
            Self::AddFeed => "feeds:add",
            Self::EditFeed => "feeds:edit",
            Self::RemoveFeed => "feeds:remove",
            Self::AddLogo => "logos:add",
            Self::EditLogo => "logos:edit",
            Self::RemoveLogo => "logos:remove",
            Self::BlockChannel => "blocklist:add",
            Self::UnblockChannel => "blocklist:remove",
            Self::AddCity => "cities:add",
            Self::EditCity => "cities:edit",
            Self::RemoveCity => "cities:remove",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == label)
    }
}

/// A normalized change request ("issue").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub number: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub fields: RequestFields,
}

impl ChangeRequest {
    #[must_use]
    pub fn new(number: u64, labels: &[&str], fields: RequestFields) -> Self {
        Self { number, labels: labels.iter().map(|label| (*label).to_string()).collect(), fields }
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.labels.iter().any(|label| label == APPROVED_LABEL)
    }

    /// Resolve the single action this request asks for.
    ///
    /// # Errors
    /// Returns [`RequestError::NotApproved`] without the `approved` label,
    /// [`RequestError::NoAction`] when no action label is present and
    /// [`RequestError::AmbiguousAction`] when several are.
    pub fn action(&self) -> Result<Action, RequestError> {
        if !self.is_approved() {
            return Err(RequestError::NotApproved);
        }

        let mut actions: Vec<Action> =
            self.labels.iter().filter_map(|label| Action::from_label(label)).collect();
        actions.sort();
        actions.dedup();

        match actions.as_slice() {
            [] => Err(RequestError::NoAction),
            [action] => Ok(*action),
            many => Err(RequestError::AmbiguousAction(
                many.iter().map(|action| action.label()).collect::<Vec<_>>().join(", "),
            )),
        }
    }
}
