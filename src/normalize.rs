//! Canonical city/state identity shared by every source table.

use crate::constants::STATES;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// One of the 50 recognized two-letter state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateCode(&'static str);

impl StateCode {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn full_name(&self) -> &'static str {
        STATES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
            .unwrap_or(self.0)
    }

    pub fn all() -> impl Iterator<Item = StateCode> {
        STATES.iter().map(|(code, _)| StateCode(code))
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// Lookup keyed by lowercase code and lowercase full name
static STATE_LOOKUP: Lazy<HashMap<String, StateCode>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(STATES.len() * 2);
    for (code, name) in STATES.iter() {
        map.insert(code.to_ascii_lowercase(), StateCode(code));
        map.insert(name.to_ascii_lowercase(), StateCode(code));
    }
    map
});

static SALARY_CITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:greater\s+)?(?P<city>[^,]+?)\s*,\s*(?P<state>[A-Za-z][A-Za-z\s.]*?)(?:\s+(?:metro(?:politan)?\s+)?area)?\s*$")
        .expect("salary city pattern is valid")
});

static AREA_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:greater\s+)?(?P<city>.+?)(?:\s+(?:metro(?:politan)?\s+)?area)?\s*$")
        .expect("area suffix pattern is valid")
});

/// Trims and collapses internal runs of whitespace.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves a state abbreviation or full name (any case, optional trailing period)
/// to its canonical code. Returns `None` for anything outside the 50 states.
pub fn resolve_state(raw: &str) -> Option<StateCode> {
    let cleaned = collapse_whitespace(raw.trim().trim_end_matches('.'));
    if cleaned.is_empty() {
        return None;
    }
    STATE_LOOKUP.get(&cleaned.to_ascii_lowercase()).copied()
}

/// Canonical (city, state) identity used to join across sources.
///
/// Equality and hashing use the case-folded city name; `display` keeps the
/// first spelling seen for output.
#[derive(Debug, Clone, Serialize)]
pub struct CityKey {
    city: String,
    display: String,
    state: StateCode,
}

impl CityKey {
    /// Builds a key from a raw city name and a resolved state.
    /// Returns `None` when the city name is blank.
    pub fn new(raw_city: &str, state: StateCode) -> Option<Self> {
        let display = collapse_whitespace(raw_city);
        if display.is_empty() {
            return None;
        }
        Some(Self {
            city: display.to_lowercase(),
            display,
            state,
        })
    }

    /// Builds a key from raw city and state strings; unmatched states yield `None`.
    pub fn from_raw(raw_city: &str, raw_state: &str) -> Option<Self> {
        let state = resolve_state(raw_state)?;
        Self::new(raw_city, state)
    }

    pub fn city(&self) -> &str {
        &self.display
    }

    pub fn folded_city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> StateCode {
        self.state
    }
}

impl PartialEq for CityKey {
    fn eq(&self, other: &Self) -> bool {
        self.city == other.city && self.state == other.state
    }
}

impl Eq for CityKey {}

impl std::hash::Hash for CityKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.city.hash(state);
        self.state.hash(state);
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.display, self.state)
    }
}

/// Result of splitting a salary-table city cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SalaryLocation {
    /// City and state both present and resolvable.
    Keyed(CityKey),
    /// City only; the state is inferred later against the rent table.
    CityOnly(String),
    /// A state suffix was present but is not one of the 50 states.
    Unmatched,
}

/// Splits a salary city cell such as `"Pittsburgh, PA"`, `"Austin, TX Area"`
/// or `"Greater Boston Area"`. An explicit state column takes precedence over
/// any suffix embedded in the city text.
pub fn split_salary_city(raw_city: &str, explicit_state: Option<&str>) -> SalaryLocation {
    let explicit = explicit_state.map(str::trim).filter(|s| !s.is_empty());

    let (city, embedded_state) = match SALARY_CITY_RE.captures(raw_city) {
        Some(caps) => (caps["city"].to_string(), Some(caps["state"].to_string())),
        None => {
            let city = AREA_SUFFIX_RE
                .captures(raw_city)
                .map(|caps| caps["city"].to_string())
                .unwrap_or_else(|| raw_city.to_string());
            (city, None)
        }
    };

    let city = collapse_whitespace(&city);
    if city.is_empty() {
        return SalaryLocation::Unmatched;
    }

    match explicit.map(str::to_string).or(embedded_state) {
        Some(state) => match CityKey::from_raw(&city, &state) {
            Some(key) => SalaryLocation::Keyed(key),
            None => SalaryLocation::Unmatched,
        },
        None => SalaryLocation::CityOnly(city),
    }
}
