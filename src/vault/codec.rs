//! Text encoding of typed values.
//!
//! The backing store only holds strings and no type tag is persisted, so
//! every `TypedValue` is reduced to a single canonical string before it is
//! encrypted. Reading back either uses a caller-supplied [`ValueKind`]
//! ([`decode`]) or guesses the kind from the shape of the text
//! ([`infer_and_decode`]).
//!
//! Inference is lossy by construction: the string `"42"` and the integer
//! `42` encode identically and always infer as the integer. Callers that
//! need exact kinds for ambiguous values must decode with an explicit kind.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::value::{TypedValue, ValueKind};
use crate::errors::{Result, VaultError};

/// Joins the members of a string set. A member that contains this string
/// does not survive a round trip.
pub const STRING_SET_SEPARATOR: &str =
    "1eRHtJaybutdAsFp2DkfrT1FqMJlLfT7DdgCpQtTaoQWheoeFBZRqt5pgFDH7Cf";

static FLOAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").expect("valid float pattern"));
static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid integer pattern"));
static BOOLEAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(true|false)$").expect("valid boolean pattern"));

/// Reduce a value to its canonical text form.
pub fn encode(value: &TypedValue) -> String {
    match value {
        TypedValue::String(s) => s.clone(),
        TypedValue::Int(v) => v.to_string(),
        TypedValue::Long(v) => v.to_string(),
        TypedValue::Float(v) => encode_float(*v),
        TypedValue::Bool(v) => v.to_string(),
        TypedValue::StringSet(set) => {
            let members: Vec<&str> = set.iter().map(String::as_str).collect();
            members.join(STRING_SET_SEPARATOR)
        }
    }
}

/// Floats always carry a fractional part so they re-infer as floats:
/// `1.0`, never `1`. `Display` for `f32` never uses exponent notation.
fn encode_float(value: f32) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Parse `raw` as the given kind.
pub fn decode(raw: &str, kind: ValueKind) -> Result<TypedValue> {
    let invalid = || VaultError::InvalidValue(kind.as_str());

    match kind {
        ValueKind::String => Ok(TypedValue::String(raw.to_string())),
        ValueKind::Int => raw.parse().map(TypedValue::Int).map_err(|_| invalid()),
        ValueKind::Long => raw.parse().map(TypedValue::Long).map_err(|_| invalid()),
        ValueKind::Float => raw.parse().map(TypedValue::Float).map_err(|_| invalid()),
        ValueKind::Bool => match raw {
            "true" => Ok(TypedValue::Bool(true)),
            "false" => Ok(TypedValue::Bool(false)),
            _ => Err(invalid()),
        },
        ValueKind::StringSet => Ok(TypedValue::StringSet(split_string_set(raw))),
    }
}

/// Guess the kind of an untagged value from its shape.
///
/// Order: float, integer (32-bit if it fits, else 64-bit), boolean,
/// string set (contains the separator), string. Integers too large for
/// 64 bits fall through to string.
pub fn infer_and_decode(raw: &str) -> TypedValue {
    if FLOAT_PATTERN.is_match(raw) {
        if let Ok(v) = raw.parse::<f32>() {
            return TypedValue::Float(v);
        }
    } else if INTEGER_PATTERN.is_match(raw) {
        if let Ok(v) = raw.parse::<i64>() {
            return match i32::try_from(v) {
                Ok(small) => TypedValue::Int(small),
                Err(_) => TypedValue::Long(v),
            };
        }
    } else if BOOLEAN_PATTERN.is_match(raw) {
        return TypedValue::Bool(raw == "true");
    } else if raw.contains(STRING_SET_SEPARATOR) {
        return TypedValue::StringSet(split_string_set(raw));
    }

    TypedValue::String(raw.to_string())
}

fn split_string_set(raw: &str) -> BTreeSet<String> {
    if raw.is_empty() {
        return BTreeSet::new();
    }
    raw.split(STRING_SET_SEPARATOR).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(members: &[&str]) -> BTreeSet<String> {
        members.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn floats_keep_a_fraction() {
        assert_eq!(encode(&TypedValue::Float(1.0)), "1.0");
        assert_eq!(encode(&TypedValue::Float(-2.5)), "-2.5");
        assert_eq!(encode(&TypedValue::Float(1e10)), "10000000000.0");
        assert_eq!(encode(&TypedValue::Float(f32::NAN)), "NaN");
    }

    #[test]
    fn sets_join_in_sorted_order() {
        let encoded = encode(&TypedValue::StringSet(set(&["b", "a"])));
        assert_eq!(encoded, format!("a{STRING_SET_SEPARATOR}b"));
    }

    #[test]
    fn integer_width_is_inferred() {
        assert_eq!(infer_and_decode("42"), TypedValue::Int(42));
        assert_eq!(infer_and_decode("-2147483648"), TypedValue::Int(i32::MIN));
        assert_eq!(infer_and_decode("2147483648"), TypedValue::Long(2_147_483_648));
        assert_eq!(
            infer_and_decode("99999999999999999999"),
            TypedValue::String("99999999999999999999".into())
        );
    }

    #[test]
    fn inference_order() {
        assert_eq!(infer_and_decode("3.25"), TypedValue::Float(3.25));
        assert_eq!(infer_and_decode("true"), TypedValue::Bool(true));
        assert_eq!(infer_and_decode("True"), TypedValue::String("True".into()));
        assert_eq!(infer_and_decode("1."), TypedValue::String("1.".into()));
        assert_eq!(infer_and_decode("abc123"), TypedValue::String("abc123".into()));
        assert_eq!(infer_and_decode(""), TypedValue::String(String::new()));
        assert_eq!(
            infer_and_decode(&format!("x{STRING_SET_SEPARATOR}y")),
            TypedValue::StringSet(set(&["x", "y"]))
        );
    }

    #[test]
    fn explicit_kind_resolves_ambiguity() {
        assert_eq!(decode("42", ValueKind::String).unwrap(), TypedValue::String("42".into()));
        assert_eq!(decode("42", ValueKind::Long).unwrap(), TypedValue::Long(42));
        assert_eq!(decode("a", ValueKind::StringSet).unwrap(), TypedValue::StringSet(set(&["a"])));
    }

    #[test]
    fn bad_text_for_kind_is_rejected() {
        assert!(decode("abc", ValueKind::Int).is_err());
        assert!(decode("2147483648", ValueKind::Int).is_err());
        assert!(decode("yes", ValueKind::Bool).is_err());
        assert!(decode("TRUE", ValueKind::Bool).is_err());
        assert!(decode("1.2.3", ValueKind::Float).is_err());
    }

    #[test]
    fn empty_text_is_the_empty_set() {
        assert_eq!(decode("", ValueKind::StringSet).unwrap(), TypedValue::StringSet(BTreeSet::new()));
        assert_eq!(encode(&TypedValue::StringSet(BTreeSet::new())), "");
    }

    #[test]
    fn separator_inside_a_member_is_lossy() {
        let member = format!("a{STRING_SET_SEPARATOR}b");
        let original = set(&[member.as_str()]);
        let decoded = decode(&encode(&TypedValue::StringSet(original.clone())), ValueKind::StringSet)
            .unwrap();
        assert_ne!(decoded, TypedValue::StringSet(original));
    }
}
