//! Protocol header names and list parsing.

use std::collections::BTreeSet;

use http::HeaderValue;

/// Header names used by the page protocol.
pub mod header_names {
    /// Marks a client-side navigation request, and confirms a page-object response.
    pub const X_INERTIA: &str = "X-Inertia";
    /// Asset version held by the client, echoed back with the current version.
    pub const X_INERTIA_VERSION: &str = "X-Inertia-Version";
    /// Component the partial reload targets.
    pub const X_INERTIA_PARTIAL_COMPONENT: &str = "X-Inertia-Partial-Component";
    /// Comma list of props to include.
    pub const X_INERTIA_PARTIAL_DATA: &str = "X-Inertia-Partial-Data";
    /// Comma list of props to exclude.
    pub const X_INERTIA_PARTIAL_EXCEPT: &str = "X-Inertia-Partial-Except";
    /// Comma list of merge props the client will reset.
    pub const X_INERTIA_RESET: &str = "X-Inertia-Reset";
    /// Validation error bag to read.
    pub const X_INERTIA_ERROR_BAG: &str = "X-Inertia-Error-Bag";
    /// URL the client must load with a full browser navigation.
    pub const X_INERTIA_LOCATION: &str = "X-Inertia-Location";
    /// Scheme the client used, as reported by a fronting proxy.
    pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";
}

/// Request signals that change the response, for the `Vary` header.
pub const VARY_SIGNALS: &str = "X-Inertia, Accept";

/// Parse a comma separated key list.
///
/// Blank entries are skipped. A value that is not visible ASCII, or an entry
/// containing whitespace, quotes or separators, makes the whole list invalid
/// and it reads as empty.
pub fn parse_key_list(value: Option<&HeaderValue>, header: &str) -> BTreeSet<String> {
    let Some(value) = value else {
        return BTreeSet::new();
    };
    let Ok(raw) = value.to_str() else {
        tracing::warn!(header, "partial header is not valid ASCII, ignoring it");
        return BTreeSet::new();
    };
    match parse_keys(raw) {
        Some(keys) => keys,
        None => {
            tracing::warn!(header, value = raw, "malformed partial header, ignoring it");
            BTreeSet::new()
        }
    }
}

fn parse_keys(raw: &str) -> Option<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if !token.chars().all(is_key_char) {
            return None;
        }
        keys.insert(token.to_string());
    }
    Some(keys)
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '"' | '\'' | ';' | '\\')
}

/// Read a header as a trimmed, non-empty string.
pub(crate) fn header_str(value: Option<&HeaderValue>) -> Option<String> {
    let value = value?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}
