//! Custom-attribute mangling.
//!
//! The monitoring core stores attributes line-oriented and uppercases their
//! names, so tag, label and label-source names and values are base16-encoded
//! behind `_TAG_`, `_LABEL_` and `_LABELSOURCE_` prefixes. This module
//! decodes those entries back into plain dictionaries.

/// Which slice of the raw custom variables a dict column projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    CustomVariables,
    Tags,
    Labels,
    LabelSources,
}

impl AttributeKind {
    fn prefix(&self) -> &'static str {
        match self {
            AttributeKind::CustomVariables => "",
            AttributeKind::Tags => "_TAG_",
            AttributeKind::Labels => "_LABEL_",
            AttributeKind::LabelSources => "_LABELSOURCE_",
        }
    }
}

const MANGLED_PREFIXES: [&str; 3] = ["_TAG_", "_LABEL_", "_LABELSOURCE_"];

pub fn b16encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

pub fn b16decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i + 1 < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16);
        let lo = (bytes[i + 1] as char).to_digit(16);
        match (hi, lo) {
            (Some(h), Some(l)) => out.push((h * 16 + l) as u8),
            _ => return input.to_string(),
        }
        i += 2;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Project one attribute kind out of the raw variable list, decoding
/// mangled entries on the fly.
pub fn attributes(raw: &[(String, String)], kind: AttributeKind) -> Vec<(String, String)> {
    match kind {
        AttributeKind::CustomVariables => raw
            .iter()
            .filter(|(k, _)| !MANGLED_PREFIXES.iter().any(|p| k.starts_with(p)))
            .cloned()
            .collect(),
        _ => {
            let prefix = kind.prefix();
            raw.iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(prefix).and_then(|rest| {
                        // `_LABEL_` must not swallow `_LABELSOURCE_` entries
                        if kind == AttributeKind::Labels && k.starts_with("_LABELSOURCE_") {
                            return None;
                        }
                        Some((b16decode(rest), b16decode(v)))
                    })
                })
                .collect()
        }
    }
}

/// Names of one attribute kind, for the `*_names` list columns.
pub fn attribute_names(raw: &[(String, String)], kind: AttributeKind) -> Vec<String> {
    attributes(raw, kind).into_iter().map(|(k, _)| k).collect()
}

/// Values of one attribute kind, for the `*_values` list columns.
pub fn attribute_values(raw: &[(String, String)], kind: AttributeKind) -> Vec<String> {
    attributes(raw, kind).into_iter().map(|(_, v)| v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Vec<(String, String)> {
        vec![
            ("ERNIE".into(), "Bert".into()),
            (format!("_TAG_{}", b16encode("site")), b16encode("alpha")),
            (format!("_LABEL_{}", b16encode("env")), b16encode("prod")),
            (format!("_LABELSOURCE_{}", b16encode("env")), b16encode("ruleset")),
        ]
    }

    #[test]
    fn b16_roundtrip_identity() {
        for s in ["", "Rock'n Roll", "Góðan dag!", "a"] {
            assert_eq!(b16decode(&b16encode(s)), s);
        }
    }

    #[test]
    fn b16_reproducibility() {
        let x = b16encode("Góðan dag!");
        assert_eq!(b16encode(&b16decode(&x)), x);
    }

    #[test]
    fn kinds_are_disjoint() {
        assert_eq!(
            attributes(&raw(), AttributeKind::CustomVariables),
            vec![("ERNIE".to_string(), "Bert".to_string())]
        );
        assert_eq!(
            attributes(&raw(), AttributeKind::Tags),
            vec![("site".to_string(), "alpha".to_string())]
        );
        assert_eq!(
            attributes(&raw(), AttributeKind::Labels),
            vec![("env".to_string(), "prod".to_string())]
        );
        assert_eq!(
            attributes(&raw(), AttributeKind::LabelSources),
            vec![("env".to_string(), "ruleset".to_string())]
        );
    }

    #[test]
    fn malformed_hex_is_passed_through() {
        assert_eq!(b16decode("ZZ"), "ZZ");
    }
}
