//! US state lookup for location questions.

use regex::Regex;
use std::sync::OnceLock;

/// A US state and its postal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsState {
    pub name: &'static str,
    pub code: &'static str,
}

/// Lowercase state names in lookup order.
const US_STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // "customer(s)", an optional copula or residence verb, then "in"/"from".
        Regex::new(
            r"(?i)\bcustomers?(?:\s+(?:who|that))?(?:\s+(?:are|is|live|lives))?(?:\s+there)?(?:\s+(?:living|residing|located|based))?\s+(?:in|from)\s",
        )
        .expect("location pattern is valid")
    })
}

/// Whether the text asks about customers in some place.
pub fn mentions_customer_location(text: &str) -> bool {
    // Trailing space lets a place-less question ("customers in") still match.
    location_pattern().is_match(&format!("{text} "))
}

/// First state, in table order, whose name occurs in the text.
///
/// Matching is plain substring containment, so "west virginia" resolves to
/// Virginia.
pub fn find_state(text: &str) -> Option<UsState> {
    let lower = text.to_lowercase();
    US_STATES
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|&(name, code)| UsState { name, code })
}
