use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ZIP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{5}").expect("zip pattern is valid"));

/// Location pieces pulled out of a free-text street address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub city: String,
    pub state: String,
    pub zip_code: String,
    /// Set when the address had fewer than two comma-separated segments, in
    /// which case `state` holds the whole input and `city` is empty.
    pub unparsed: bool,
}

impl ParsedAddress {
    pub fn has_zip_code(&self) -> bool {
        !self.zip_code.is_empty()
    }
}

/// Best-effort split of `"street, city, STATE ZIP"`.
///
/// Stage one splits on commas: the second-to-last segment is the city and the
/// last is a combined state/zip. Stage two takes the first run of five digits
/// out of that last segment as the zip and keeps the remainder as the state.
/// This is not a postal validator; unusual formats produce odd but stable
/// results.
pub fn parse_address(raw: &str) -> ParsedAddress {
    let segments: Vec<&str> = raw.split(',').collect();
    let unparsed = segments.len() < 2;

    let city = if unparsed {
        String::new()
    } else {
        segments[segments.len() - 2].trim().to_string()
    };

    let state_zip = segments.last().map(|s| s.trim()).unwrap_or_default();

    let (zip_code, state) = match ZIP_CODE.find(state_zip) {
        Some(m) => {
            let mut remainder = String::with_capacity(state_zip.len());
            remainder.push_str(&state_zip[..m.start()]);
            remainder.push_str(&state_zip[m.end()..]);
            (m.as_str().to_string(), remainder.trim().to_string())
        }
        None => (String::new(), state_zip.to_string()),
    };

    ParsedAddress {
        city,
        state,
        zip_code,
        unparsed,
    }
}
