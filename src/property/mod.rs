// SPDX-License-Identifier: GPL-3.0-only

//! Status properties and their wire encoding.
//!
//! The input method engine describes each status item as a single string of
//! colon-separated fields:
//!
//! ```text
//! key:label:icon:tip[:hint...]
//! ```
//!
//! The first four fields are mandatory (they may be empty, except `key`).
//! Anything after the fourth colon is kept verbatim as the `hint`, including
//! further colons. Hints commonly carry comma-separated `name=value` pairs,
//! e.g. `label=中,menu`.
//!
//! Malformed entries never produce an error: they decode to `None` and the
//! caller drops them.
//!
//! # Example
//!
//! ```rust
//! use caretpanel::property::{decode_one, encode};
//!
//! let prop = decode_one("/Fcitx/im:Pinyin:fcitx-pinyin:Pinyin:label=拼").unwrap();
//! assert_eq!(prop.label, "Pinyin");
//! assert_eq!(prop.hint_value("label"), Some("拼"));
//! assert_eq!(encode(&prop), "/Fcitx/im:Pinyin:fcitx-pinyin:Pinyin:label=拼");
//! ```

pub mod registry;

pub use registry::{PropertyRegistry, RegistryChange};

/// Field separator of the property encoding.
const FIELD_SEPARATOR: char = ':';

/// Separator between `name=value` pairs inside a hint.
const HINT_SEPARATOR: char = ',';

/// One controllable status item announced by the input method engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    /// Unique identifier, never empty for a registered property.
    pub key: String,
    /// Short display label.
    pub label: String,
    /// Icon name or path.
    pub icon: String,
    /// Tooltip text.
    pub tip: String,
    /// Free-form tail of the encoding.
    pub hint: String,
}

impl Property {
    /// Creates a property with an empty hint.
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        icon: impl Into<String>,
        tip: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            icon: icon.into(),
            tip: tip.into(),
            hint: String::new(),
        }
    }

    /// Sets the hint tail.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    /// A property is valid when it has a key.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
    }

    /// Looks up `name=value` inside the comma-separated hint.
    ///
    /// Entries are trimmed and empty entries skipped; the first match wins.
    #[must_use]
    pub fn hint_value(&self, name: &str) -> Option<&str> {
        if self.hint.is_empty() || name.is_empty() {
            return None;
        }
        self.hint
            .split(HINT_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .find_map(|part| {
                part.strip_prefix(name)
                    .and_then(|rest| rest.strip_prefix('='))
            })
    }

    /// Text to show for this property in a menu: label, else tip, else key.
    #[must_use]
    pub fn display_text(&self) -> &str {
        [&self.label, &self.tip, &self.key]
            .into_iter()
            .find(|text| !text.is_empty())
            .map_or("", String::as_str)
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.key,
            self.label,
            self.icon,
            self.tip,
            sep = FIELD_SEPARATOR
        )?;
        if !self.hint.is_empty() {
            write!(f, "{}{}", FIELD_SEPARATOR, self.hint)?;
        }
        Ok(())
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Decodes a single property string.
///
/// Returns `None` when the string has fewer than four fields or an empty key.
#[must_use]
pub fn decode_one(raw: &str) -> Option<Property> {
    let mut fields = raw.splitn(5, FIELD_SEPARATOR);
    let key = fields.next()?;
    let label = fields.next()?;
    let icon = fields.next()?;
    let tip = fields.next()?;
    let hint = fields.next().unwrap_or_default();

    if key.is_empty() {
        return None;
    }

    Some(Property {
        key: key.to_string(),
        label: label.to_string(),
        icon: icon.to_string(),
        tip: tip.to_string(),
        hint: hint.to_string(),
    })
}

/// Decodes a list of property strings, dropping invalid entries.
pub fn decode_many<I, S>(raws: I) -> Vec<Property>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raws.into_iter()
        .filter_map(|raw| {
            let decoded = decode_one(raw.as_ref());
            if decoded.is_none() {
                tracing::debug!("Dropping malformed property entry: {:?}", raw.as_ref());
            }
            decoded
        })
        .collect()
}

/// Encodes a property back into its wire form.
#[must_use]
pub fn encode(prop: &Property) -> String {
    prop.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: Four fields decode into a property with an empty hint.
    #[test]
    fn test_decode_minimal_property() {
        let prop = decode_one("im:IM:icon1:ToolTip").expect("Should decode");

        assert_eq!(prop, Property::new("im", "IM", "icon1", "ToolTip"));
        assert!(prop.hint.is_empty(), "Hint should be empty");
    }

    /// Test: Fields after the fourth are rejoined with colons into the hint.
    #[test]
    fn test_decode_hint_keeps_colons() {
        let prop = decode_one("/Fcitx/im:拼音:fcitx-pinyin:拼音:label=拼,menu:extra::x")
            .expect("Should decode");

        assert_eq!(prop.key, "/Fcitx/im");
        assert_eq!(prop.label, "拼音");
        assert_eq!(prop.hint, "label=拼,menu:extra::x");
    }

    /// Test: Empty fields are kept, only the key must be non-empty.
    #[test]
    fn test_decode_keeps_empty_fields() {
        let prop = decode_one("key:::").expect("Should decode with empty fields");

        assert_eq!(prop, Property::new("key", "", "", ""));
    }

    /// Test: Fewer than four fields is rejected.
    #[test]
    fn test_decode_too_few_fields() {
        assert_eq!(decode_one(""), None);
        assert_eq!(decode_one("key"), None);
        assert_eq!(decode_one("key:label:icon"), None);
    }

    /// Test: An empty key is rejected regardless of the other fields.
    #[test]
    fn test_decode_empty_key() {
        assert_eq!(decode_one(":label:icon:tip"), None);
        assert_eq!(decode_one(":::"), None);
        assert_eq!(decode_one(":label:icon:tip:hint=1"), None);
    }

    /// Test: decode_many preserves order and drops invalid entries.
    #[test]
    fn test_decode_many_filters_invalid() {
        let props = decode_many(["a:A::", "broken", ":B::", "c:C:icon:tip"]);

        let keys: Vec<&str> = props.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"], "Only valid entries in original order");
    }

    /// Test: Encoding then decoding yields the same property.
    #[test]
    fn test_encode_decode_roundtrip() {
        let samples = [
            Property::new("im", "IM", "icon1", "ToolTip"),
            Property::new("/Fcitx/punc", "", "", "").with_hint("label=，"),
            Property::new("k", "l", "i", "t").with_hint("a=1:b=2"),
        ];

        for prop in samples {
            let encoded = encode(&prop);
            assert_eq!(decode_one(&encoded), Some(prop.clone()), "Roundtrip of {encoded}");
        }
    }

    /// Test: hint_value finds trimmed name=value pairs.
    #[test]
    fn test_hint_value_lookup() {
        let prop = Property::new("k", "", "", "").with_hint(" menu , label=中 ,,label=other");

        assert_eq!(prop.hint_value("label"), Some("中"), "First match wins");
        assert_eq!(prop.hint_value("menu"), None, "Bare flags carry no value");
        assert_eq!(prop.hint_value("lab"), None, "Prefixes must match whole names");
        assert_eq!(prop.hint_value(""), None);
    }

    /// Test: display_text falls back from label to tip to key.
    #[test]
    fn test_display_text_fallbacks() {
        assert_eq!(Property::new("k", "L", "", "T").display_text(), "L");
        assert_eq!(Property::new("k", "", "", "T").display_text(), "T");
        assert_eq!(Property::new("k", "", "", "").display_text(), "k");
    }
}
