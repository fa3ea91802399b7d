use once_cell::sync::Lazy;
use regex_lite::Regex;

// Patterns are literals; a compile failure is a programming error caught by the tests below.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid pattern {pattern}: {err}"))
}

pub(crate) static CHANNEL_ID: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z0-9]+\.[a-z]{2}$"));
pub(crate) static CHANNEL_NAME: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^[a-z0-9\-!:&.+'/»#%°$@?|¡–\s_—]+$"));
pub(crate) static SPACED_DASH: Lazy<Regex> = Lazy::new(|| compile(r"\s-\s"));
pub(crate) static NO_QUOTE_OR_COMMA: Lazy<Regex> = Lazy::new(|| compile(r#"^[^",]+$"#));
pub(crate) static COUNTRY_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]{2}$"));
pub(crate) static CATEGORY_ID: Lazy<Regex> = Lazy::new(|| compile(r"^[a-z]+$"));
pub(crate) static REPLACED_BY: Lazy<Regex> =
    Lazy::new(|| compile(r"^[A-Za-z0-9]+\.[a-z]{2}($|@[A-Za-z0-9]+$)"));
pub(crate) static FEED_ID: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z0-9]+$"));
pub(crate) static BROADCAST_AREA: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(s/[A-Z]{2}-[A-Z0-9]{1,3}|c/[A-Z]{2}|r/[A-Z0-9]{2,7}|ct/[A-Z0-9]{5})$")
});
pub(crate) static TIMEZONE_ID: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^[a-z\-_/]+$"));
pub(crate) static LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[a-z]{3}$"));
pub(crate) static VIDEO_FORMAT: Lazy<Regex> = Lazy::new(|| compile(r"^\d+(i|p)$"));
pub(crate) static LOGO_TAG: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^[a-z0-9\-]+$"));
pub(crate) static SUBDIVISION_CODE: Lazy<Regex> =
    Lazy::new(|| compile(r"^[A-Z]{2}-[A-Z0-9]{1,3}$"));
pub(crate) static CITY_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]{2}[A-Z0-9]{3}$"));
pub(crate) static WIKIDATA_ID: Lazy<Regex> = Lazy::new(|| compile(r"^Q\d+$"));
pub(crate) static COUNTRY_NAME: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^[\sA-ZÀ-ÿ().\-]+$"));
pub(crate) static REGION_NAME: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^[\sA-ZÀ-ÿ().,\-]+$"));
pub(crate) static REGION_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]{2,7}$"));
pub(crate) static FLAG: Lazy<Regex> = Lazy::new(|| compile(r"^[🇦-🇿]{2}$"));
pub(crate) static UTC_OFFSET: Lazy<Regex> = Lazy::new(|| compile(r"^(\+|-)\d{2}:\d{2}$"));
pub(crate) static CATEGORY_NAME: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^[A-Z]+$"));

pub(crate) static LEADING_AT: Lazy<Regex> = Lazy::new(|| compile(r"^@"));
pub(crate) static LEADING_AMPERSAND: Lazy<Regex> = Lazy::new(|| compile(r"^&"));
pub(crate) static PLUS: Lazy<Regex> = Lazy::new(|| compile(r"\+"));
pub(crate) static SPACED_MINUS_DIGIT: Lazy<Regex> = Lazy::new(|| compile(r"\s-(\d)"));
pub(crate) static LEADING_MINUS_DIGIT: Lazy<Regex> = Lazy::new(|| compile(r"^-(\d)"));
pub(crate) static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| compile(r"[^a-zA-Z0-9]"));
