//! Sender address resolution
//!
//! Destinations and configured dialing prefixes are both reduced to their
//! national significant number before matching, so `0831`, `27831` and
//! `+27831` all describe the same prefix when the country code is `27`.
//! Numbers from other countries keep a leading `+` and only match prefixes
//! written in the same international form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Destinations this short (without a leading `+`) are short codes and are matched verbatim
pub const SHORT_CODE_MAX_LEN: usize = 5;

/// Static routing configuration consulted per submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    /// Home country calling code, e.g. `27`
    pub country_code: String,
    /// Dialing prefix → operator id
    pub operator_prefix: BTreeMap<String, String>,
    /// Operator id → source address used towards that operator
    pub operator_number: BTreeMap<String, String>,
}

impl RoutingTable {
    /// Operator owning the longest prefix that matches `msisdn`.
    ///
    /// Ties between prefixes that reduce to the same digits go to the
    /// lexicographically smallest configured key.
    pub fn operator_for(&self, msisdn: &str) -> Option<&str> {
        let country_code = self.country_digits();
        let number = significant_number(msisdn, &country_code, true);

        let mut best: Option<(usize, &str)> = None;
        for (prefix, operator) in &self.operator_prefix {
            let prefix = significant_number(prefix, &country_code, false);
            if prefix.is_empty() || !number.starts_with(&prefix) {
                continue;
            }
            if best.map_or(true, |(len, _)| prefix.len() > len) {
                best = Some((prefix.len(), operator.as_str()));
            }
        }

        best.map(|(_, operator)| operator)
    }

    /// Configured source address for the operator serving `msisdn`
    pub fn operator_number(&self, msisdn: &str) -> Option<&str> {
        self.operator_for(msisdn)
            .and_then(|operator| self.operator_number.get(operator))
            .map(String::as_str)
            .filter(|number| !number.is_empty())
    }

    /// Source address for a submission: the operator number, else the
    /// message's own `from_msisdn`, else empty.
    pub fn resolve_source_addr(&self, to_msisdn: &str, from_msisdn: Option<&str>) -> String {
        self.operator_number(to_msisdn)
            .or(from_msisdn)
            .unwrap_or_default()
            .to_string()
    }

    /// Operators reachable by prefix that have no source address configured
    pub fn unrouted_operators(&self) -> Vec<&str> {
        let mut operators: Vec<&str> = self
            .operator_prefix
            .values()
            .filter(|operator| !self.operator_number.contains_key(operator.as_str()))
            .map(String::as_str)
            .collect();
        operators.sort_unstable();
        operators.dedup();
        operators
    }

    fn country_digits(&self) -> String {
        self.country_code.chars().filter(char::is_ascii_digit).collect()
    }
}

/// Reduce an address to national significant digits, or `+<digits>` for
/// numbers outside the home country.
fn significant_number(raw: &str, country_code: &str, keep_short_codes: bool) -> String {
    let trimmed = raw.trim();
    let plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if keep_short_codes && !plus && digits.len() <= SHORT_CODE_MAX_LEN {
        return digits;
    }

    let international = if plus {
        Some(digits.as_str())
    } else {
        digits.strip_prefix("00")
    };

    match international {
        Some(number) => match number.strip_prefix(country_code) {
            Some(national) if !country_code.is_empty() => national.to_string(),
            _ => format!("+{}", number),
        },
        None => {
            if let Some(national) = digits.strip_prefix('0') {
                national.to_string()
            } else if !country_code.is_empty() && digits.starts_with(country_code) {
                digits[country_code.len()..].to_string()
            } else {
                digits
            }
        }
    }
}
