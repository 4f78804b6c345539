//! The data-type guesser (spec §4.1): classifies a string as
//! string/int/float/bool/base64/base32/base36/JSON/XML.

use sukyan_types::ValueType;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// `base64`/`base32`/`base36` are checked first: the value must both match
/// the encoding's alphabet and successfully decode. Plain digit strings are
/// kept out of base36 by requiring at least one letter, so `"1234"` guesses
/// as `Integer` rather than a base36 number (SPEC_FULL §2 open-question
/// resolution: the encoded-token checks are for alphanumeric tokens, not
/// bare numerals).
pub fn guess_value_type(value: &str) -> ValueType {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValueType::String;
    }

    if looks_like_base64(trimmed) {
        return ValueType::Base64;
    }
    if looks_like_base32(trimmed) {
        return ValueType::Base32;
    }
    if looks_like_base36(trimmed) {
        return ValueType::Base36;
    }
    if looks_like_json(trimmed) {
        return ValueType::Json;
    }
    if looks_like_xml(trimmed) {
        return ValueType::Xml;
    }
    if trimmed.parse::<i64>().is_ok() {
        return ValueType::Integer;
    }
    if trimmed.parse::<f64>().is_ok() {
        return ValueType::Float;
    }
    if trimmed == "true" || trimmed == "false" {
        return ValueType::Bool;
    }
    ValueType::String
}

fn looks_like_base64(value: &str) -> bool {
    if value.len() < 8 || value.len() % 4 != 0 {
        return false;
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return false;
    }
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(value).is_ok()
}

fn looks_like_base32(value: &str) -> bool {
    if value.len() < 8 {
        return false;
    }
    let upper = value.to_ascii_uppercase();
    if !upper
        .chars()
        .all(|c| BASE32_ALPHABET.contains(&(c as u8)) || c == '=')
    {
        return false;
    }
    decode_base32(&upper).is_some()
}

fn looks_like_base36(value: &str) -> bool {
    if value.len() < 4 {
        return false;
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    // Require a mix of letters and digits: a bare numeral decodes as
    // itself under any radix (classified as Integer instead), and a bare
    // word is usually just a word, not an encoded token.
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_alpha = value.chars().any(|c| c.is_ascii_alphabetic());
    if !(has_digit && has_alpha) {
        return false;
    }
    u128::from_str_radix(value, 36).is_ok()
}

fn looks_like_json(value: &str) -> bool {
    (value.starts_with('{') || value.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(value).is_ok()
}

fn looks_like_xml(value: &str) -> bool {
    value.starts_with('<') && value.ends_with('>') && value.contains('>') && value.len() > 2
}

/// Minimal RFC 4648 base32 decoder; returns `None` on any invalid symbol or
/// padding, enough to gate the guesser's classification.
fn decode_base32(upper: &str) -> Option<Vec<u8>> {
    let data = upper.trim_end_matches('=');
    if data.is_empty() {
        return None;
    }
    let mut bits: u64 = 0;
    let mut bit_count = 0u32;
    let mut out = Vec::new();
    for c in data.chars() {
        let val = BASE32_ALPHABET.iter().position(|&b| b as char == c)? as u64;
        bits = (bits << 5) | val;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            out.push(((bits >> bit_count) & 0xFF) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integer_is_not_base36() {
        assert_eq!(guess_value_type("1234"), ValueType::Integer);
    }

    #[test]
    fn float_is_detected() {
        assert_eq!(guess_value_type("3.14"), ValueType::Float);
    }

    #[test]
    fn bool_literals_are_detected() {
        assert_eq!(guess_value_type("true"), ValueType::Bool);
        assert_eq!(guess_value_type("false"), ValueType::Bool);
    }

    #[test]
    fn json_object_is_detected() {
        assert_eq!(guess_value_type(r#"{"a":1}"#), ValueType::Json);
    }

    #[test]
    fn json_array_is_detected() {
        assert_eq!(guess_value_type("[1,2,3]"), ValueType::Json);
    }

    #[test]
    fn xml_fragment_is_detected() {
        assert_eq!(guess_value_type("<user><id>1</id></user>"), ValueType::Xml);
    }

    #[test]
    fn base64_token_is_detected() {
        // "aGVsbG8gd29ybGQ=" == base64("hello world")
        assert_eq!(guess_value_type("aGVsbG8gd29ybGQ="), ValueType::Base64);
    }

    #[test]
    fn base32_token_is_detected() {
        // "NBSWY3DPEB3W64TMMQ======" == base32("hello world")
        assert_eq!(
            guess_value_type("NBSWY3DPEB3W64TMMQ======"),
            ValueType::Base32
        );
    }

    #[test]
    fn base36_token_is_detected() {
        assert_eq!(guess_value_type("a1b2c3z9"), ValueType::Base36);
    }

    #[test]
    fn plain_word_is_string() {
        assert_eq!(guess_value_type("hello"), ValueType::String);
    }

    #[test]
    fn empty_value_is_string() {
        assert_eq!(guess_value_type(""), ValueType::String);
    }
}
