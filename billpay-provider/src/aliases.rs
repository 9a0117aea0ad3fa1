//! Service-specific request fields.
//!
//! Some services want the same field under several spellings. Each entry maps
//! the spellings a caller may use to the set emitted upstream.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Fields set by the client itself; extras cannot override them.
const RESERVED: [&str; 6] = [
    "serviceID",
    "amount",
    "phone",
    "email",
    "request_id",
    "variation_code",
];

struct AliasGroup {
    applies_to: fn(&str) -> bool,
    /// All spellings, in precedence order (later wins)
    aliases: &'static [&'static str],
}

const BILLERS_CODE: &[&str] = &["billers_code", "billerscode", "billersCode"];

fn is_exam(service_id: &str) -> bool {
    matches!(service_id, "jamb" | "waec" | "waec-registration")
}

fn is_electricity(service_id: &str) -> bool {
    service_id.ends_with("-electric")
}

const GROUPS: &[AliasGroup] = &[
    AliasGroup {
        applies_to: is_exam,
        aliases: BILLERS_CODE,
    },
    AliasGroup {
        applies_to: is_electricity,
        aliases: BILLERS_CODE,
    },
];

/// Turns caller extras into upstream body fields.
///
/// Empty values are dropped. For an aliased field the last non-empty spelling
/// wins and is emitted under every spelling.
pub fn expand_extra_params(service_id: &str, extras: &BTreeMap<String, String>) -> Map<String, Value> {
    let service_id = service_id.to_ascii_lowercase();
    let mut out = Map::new();
    let mut claimed: Vec<&str> = Vec::new();

    for group in GROUPS.iter().filter(|g| (g.applies_to)(&service_id)) {
        let chosen = group
            .aliases
            .iter()
            .rev()
            .filter_map(|alias| extras.get(*alias))
            .map(|v| v.trim())
            .find(|v| !v.is_empty());

        claimed.extend(group.aliases.iter().copied());
        if let Some(value) = chosen {
            for alias in group.aliases {
                out.insert((*alias).to_string(), Value::String(value.to_string()));
            }
        }
    }

    for (key, value) in extras {
        if claimed.contains(&key.as_str()) || value.trim().is_empty() {
            continue;
        }
        if RESERVED.contains(&key.as_str()) {
            tracing::warn!(field = %key, "ignoring extra parameter that shadows a core field");
            continue;
        }
        out.insert(key.clone(), Value::String(value.clone()));
    }

    out
}
