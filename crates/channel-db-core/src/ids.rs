use crate::patterns::{
    LEADING_AMPERSAND, LEADING_AT, LEADING_MINUS_DIGIT, NON_ALPHANUMERIC, PLUS, SPACED_MINUS_DIGIT,
};

/// Reduce a display name to the alphanumeric stem used in identifiers.
///
/// Rewrites are applied in order: leading `@` becomes `At`, leading `&` becomes `And`,
/// every `+` becomes `Plus`, a `-` directly before a digit becomes `Minus`, and then every
/// character outside `[A-Za-z0-9]` is dropped.
#[must_use]
pub fn slug(name: &str) -> String {
    let value = LEADING_AT.replace(name, "At");
    let value = LEADING_AMPERSAND.replace(&value, "And");
    let value = PLUS.replace_all(&value, "Plus");
    let value = SPACED_MINUS_DIGIT.replace_all(&value, " Minus$1");
    let value = LEADING_MINUS_DIGIT.replace(&value, "Minus$1");
    NON_ALPHANUMERIC.replace_all(&value, "").into_owned()
}

/// `slug(name) + "." + lower(country)`.
#[must_use]
pub fn derive_channel_id(name: &str, country: &str) -> String {
    format!("{}.{}", slug(name), country.to_lowercase())
}

#[must_use]
pub fn derive_feed_id(name: &str) -> String {
    slug(name)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn channel_ids_follow_naming_rules() {
        let cases = [
            ("Test TV", "US", "TestTV.us"),
            ("@Home TV", "GB", "AtHomeTV.gb"),
            ("&TV", "IN", "AndTV.in"),
            ("Canal+ Sport", "FR", "CanalPlusSport.fr"),
            ("Temperature -2", "RU", "TemperatureMinus2.ru"),
            ("-1 Channel", "RU", "Minus1Channel.ru"),
            ("A - B", "US", "AB.us"),
            ("Ñandú TV", "AR", "andTV.ar"),
            ("M6 (HD)", "FR", "M6HD.fr"),
        ];

        for (name, country, expected) in cases {
            assert_eq!(derive_channel_id(name, country), expected, "name={name:?}");
        }
    }

    #[test]
    fn feed_ids_are_bare_slugs() {
        assert_eq!(derive_feed_id("SD"), "SD");
        assert_eq!(derive_feed_id("East (HD)"), "EastHD");
        assert_eq!(derive_feed_id("+1"), "Plus1");
    }

    #[test]
    fn inner_at_and_ampersand_are_dropped() {
        assert_eq!(slug("Rock & Roll @ Night"), "RockRollNight");
    }

    // Test IDs: TID-001
    proptest! {
        #[test]
        fn property_channel_id_is_deterministic_and_alphanumeric(
            name in "[ -~]{1,40}",
            country in "[A-Z]{2}",
        ) {
            let first = derive_channel_id(&name, &country);
            let second = derive_channel_id(&name, &country);
            prop_assert_eq!(&first, &second);

            let (stem, suffix) = match first.rsplit_once('.') {
                Some(parts) => parts,
                None => panic!("channel id without country suffix: {first}"),
            };
            prop_assert!(stem.chars().all(|c| c.is_ascii_alphanumeric()));
            prop_assert_eq!(suffix, country.to_lowercase());
        }

        #[test]
        fn property_slug_is_idempotent(name in "[ -~]{0,40}") {
            let once = slug(&name);
            prop_assert_eq!(slug(&once), once);
        }
    }
}
