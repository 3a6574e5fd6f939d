//! Kilometer marker extraction.
//!
//! Every point in the input (at any nesting depth) becomes one [`Marker`]. Its label text
//! is parsed for a kilometer value and a highway code, and the marker is classified by
//! how authoritative the label format is.
//!
//! ## Kilometer cascade
//!
//! Tried in order, first match wins:
//! 1. `SINFRA - <code>/<km>` (authoritative export format, `<km>+<meters>` allowed)
//! 2. `<km>+<meters>` (e.g. `100+200` is km 100.2)
//! 3. `KM <n>` or `K <n>`
//! 4. an isolated number bounded by whitespace
//!
//! Matchers 2-4 run on the label with highway codes (`BR 163`, `mt-130`, `MT 2405`)
//! removed, so a code is never read as a kilometer.

use crate::input::{GeoInput, GeometryVisitor};
use crate::GpsPoint;
use log::{debug, info};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::LazyLock;

static SINFRA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)SINFRA\s*-\s*(?:[A-Z]{2}\s*-?\s*)?(\d+)\s*/\s*(\d+(?:[.,]\d+)?)(?:\s*\+\s*(\d+(?:[.,]\d+)?))?",
    )
    .expect("valid regex")
});

static NAMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*([A-Z]{2})\s*-?\s*(\d+)\s*\)").expect("valid regex"));

static HIGHWAY_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([A-Z]{2})[ \t]*-?[ \t]*(\d{2,4})\b").expect("valid regex"));

static KM_PLUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*\+\s*(\d+(?:[.,]\d+)?)").expect("valid regex"));

static KM_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bKM?\s*[:=.]?\s*(\d+(?:[.,]\d+)?)").expect("valid regex")
});

static ISOLATED_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d+(?:[.,]\d+)?)(?:\s|$)").expect("valid regex"));

/// How authoritative a marker's label is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerCategory {
    /// `SINFRA - <code>/<km>` labels
    Sinfra,
    /// Labels with a `(<STATE> <code>)` suffix
    Named,
    Generic,
}

impl MarkerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerCategory::Sinfra => "sinfra",
            MarkerCategory::Named => "named",
            MarkerCategory::Generic => "generic",
        }
    }
}

/// A point feature with its parsed kilometer and highway code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub coordinate: GpsPoint,
    pub raw_name: String,
    pub parsed_km: Option<f64>,
    /// Normalized highway code (see [`normalize_highway_code`])
    pub highway_code: Option<String>,
    pub category: MarkerCategory,
}

impl Marker {
    /// Build a marker from its label text.
    pub fn from_label(coordinate: GpsPoint, name: Option<&str>, description: Option<&str>) -> Self {
        let raw_name = name.or(description).unwrap_or_default().to_string();
        let parsed_km = name.and_then(parse_km).or_else(|| description.and_then(parse_km));

        let (mut category, mut highway_code) = classify_label(name.unwrap_or_default());
        if category == MarkerCategory::Generic && highway_code.is_none() {
            if let Some(desc) = description {
                (category, highway_code) = classify_label(desc);
            }
        }

        Self {
            coordinate,
            raw_name,
            parsed_km,
            highway_code,
            category,
        }
    }

    /// True when this marker's code equals the (normalized) target code.
    pub fn matches_highway(&self, code: &str) -> bool {
        match (&self.highway_code, normalize_highway_code(code)) {
            (Some(own), Some(target)) => *own == target,
            _ => false,
        }
    }
}

// =============================================================================
// Label Parsing
// =============================================================================

/// Normalize a highway code to its numeric part without leading zeros.
///
/// `"MT-010"`, `"mt 10"` and `"10"` all normalize to `"10"`. Codes without digits are
/// upper-cased alphanumerics. Matching is done on these normalized values by equality,
/// so `"46"` never matches `"146"`.
pub fn normalize_highway_code(code: &str) -> Option<String> {
    let digits: String = code
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if !digits.is_empty() {
        let trimmed = digits.trim_start_matches('0');
        return Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
    }
    let alnum: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (!alnum.is_empty()).then_some(alnum)
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Remove `<STATE> <digits>` highway codes, leaving `KM <digits>` untouched.
fn strip_highway_codes(text: &str) -> Cow<'_, str> {
    HIGHWAY_CODE_RE.replace_all(text, |caps: &Captures| {
        if caps[1].eq_ignore_ascii_case("KM") {
            caps[0].to_string()
        } else {
            " ".to_string()
        }
    })
}

/// Label text as seen by the kilometer matchers.
struct LabelText<'a> {
    raw: &'a str,
    stripped: Cow<'a, str>,
}

type KmMatcher = fn(&LabelText) -> Option<f64>;

/// `km` plus an optional meters part, as in `126+720`.
fn km_with_meters(km: &str, meters: Option<&str>) -> Option<f64> {
    let km = parse_number(km)?;
    match meters {
        Some(meters) => Some(km + parse_number(meters)? / 1000.0),
        None => Some(km),
    }
}

fn sinfra_km(label: &LabelText) -> Option<f64> {
    let caps = SINFRA_RE.captures(label.raw)?;
    km_with_meters(&caps[2], caps.get(3).map(|m| m.as_str()))
}

fn plus_km(label: &LabelText) -> Option<f64> {
    let caps = KM_PLUS_RE.captures(&label.stripped)?;
    km_with_meters(&caps[1], Some(&caps[2]))
}

fn token_km(label: &LabelText) -> Option<f64> {
    KM_TOKEN_RE
        .captures(&label.stripped)
        .and_then(|caps| parse_number(&caps[1]))
}

fn isolated_km(label: &LabelText) -> Option<f64> {
    ISOLATED_NUMBER_RE
        .captures(&label.stripped)
        .and_then(|caps| parse_number(&caps[1]))
}

const KM_MATCHERS: &[(&str, KmMatcher)] = &[
    ("sinfra", sinfra_km),
    ("km+m", plus_km),
    ("km-token", token_km),
    ("isolated", isolated_km),
];

/// Parse a kilometer value from free-text label.
///
/// # Example
/// ```
/// use highway_trace::parse_km;
///
/// assert_eq!(parse_km("SINFRA - 163/126,72"), Some(126.72));
/// assert_eq!(parse_km("100+200"), Some(100.2));
/// assert_eq!(parse_km("BR 163 KM 45"), Some(45.0));
/// assert_eq!(parse_km("Trevo BR-163"), None);
/// ```
pub fn parse_km(text: &str) -> Option<f64> {
    let label = LabelText {
        raw: text,
        stripped: strip_highway_codes(text),
    };
    KM_MATCHERS.iter().find_map(|(name, matcher)| {
        let km = matcher(&label)?;
        debug!("[Markers] '{}' -> km {} via {}", text, km, name);
        Some(km)
    })
}

/// Classify a label and extract its normalized highway code.
pub fn classify_label(text: &str) -> (MarkerCategory, Option<String>) {
    if let Some(caps) = SINFRA_RE.captures(text) {
        return (MarkerCategory::Sinfra, normalize_highway_code(&caps[1]));
    }
    if let Some(caps) = NAMED_RE.captures(text) {
        return (MarkerCategory::Named, normalize_highway_code(&caps[2]));
    }
    let code = HIGHWAY_CODE_RE
        .captures_iter(text)
        .find(|caps| !caps[1].eq_ignore_ascii_case("KM"))
        .and_then(|caps| normalize_highway_code(&caps[2]));
    (MarkerCategory::Generic, code)
}

// =============================================================================
// Extraction
// =============================================================================

struct MarkerCollector<'a> {
    name: Option<&'a str>,
    description: Option<&'a str>,
    markers: Vec<Marker>,
}

impl GeometryVisitor for MarkerCollector<'_> {
    fn visit_point(&mut self, point: &GpsPoint) {
        self.markers
            .push(Marker::from_label(*point, self.name, self.description));
    }
}

/// Extract one marker per point, at any nesting depth.
pub fn extract_markers(input: &GeoInput) -> Vec<Marker> {
    let mut markers = Vec::new();
    for feature in &input.features {
        let mut collector = MarkerCollector {
            name: feature.name.as_deref(),
            description: feature.description.as_deref(),
            markers: Vec::new(),
        };
        feature.geometry.walk(&mut collector);
        markers.append(&mut collector.markers);
    }

    let count = |category| markers.iter().filter(|m| m.category == category).count();
    info!(
        "[Markers] Extracted {} markers ({} sinfra, {} named, {} without km)",
        markers.len(),
        count(MarkerCategory::Sinfra),
        count(MarkerCategory::Named),
        markers.iter().filter(|m| m.parsed_km.is_none()).count()
    );
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{FeatureNode, GeometryNode};

    fn approx_eq(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_sinfra_label() {
        assert!(approx_eq(parse_km("SINFRA - 163/126,72"), 126.72));
        assert_eq!(
            classify_label("SINFRA - 163/126,72"),
            (MarkerCategory::Sinfra, Some("163".to_string()))
        );
        assert_eq!(
            classify_label("sinfra - MT-010/4.5"),
            (MarkerCategory::Sinfra, Some("10".to_string()))
        );
    }

    #[test]
    fn test_sinfra_plus_notation() {
        assert!(approx_eq(parse_km("SINFRA - 163/126+720"), 126.72));
        assert!(approx_eq(parse_km("SINFRA - MT-010/4 + 500"), 4.5));
        assert_eq!(
            classify_label("SINFRA - 163/126+720"),
            (MarkerCategory::Sinfra, Some("163".to_string()))
        );
    }

    #[test]
    fn test_plus_notation() {
        assert!(approx_eq(parse_km("100+200"), 100.2));
        assert!(approx_eq(parse_km("Km 12 + 500"), 12.5));
    }

    #[test]
    fn test_km_token() {
        assert!(approx_eq(parse_km("KM 12,5"), 12.5));
        assert!(approx_eq(parse_km("km: 7"), 7.0));
        assert!(approx_eq(parse_km("K 30"), 30.0));
        assert!(approx_eq(parse_km("KM163"), 163.0));
    }

    #[test]
    fn test_highway_code_not_read_as_km() {
        assert_eq!(parse_km("BR 163"), None);
        assert_eq!(parse_km("Trevo MT-130"), None);
        assert!(approx_eq(parse_km("BR 163 KM 45"), 45.0));
        assert!(approx_eq(parse_km("MT 130 100+200"), 100.2));
    }

    #[test]
    fn test_lowercase_and_long_codes_are_stripped() {
        assert_eq!(parse_km("br 163"), None);
        assert_eq!(parse_km("Trevo mt-130"), None);
        assert_eq!(parse_km("MT 2405"), None);
        assert!(approx_eq(parse_km("br 163 km 45"), 45.0));
        assert!(approx_eq(parse_km("km 12"), 12.0));
        assert_eq!(
            classify_label("Acesso MT 2405"),
            (MarkerCategory::Generic, Some("2405".to_string()))
        );
    }

    #[test]
    fn test_isolated_number_last_resort() {
        assert!(approx_eq(parse_km("Posto 17"), 17.0));
        assert!(approx_eq(parse_km("42"), 42.0));
        assert_eq!(parse_km("Posto17"), None);
        assert_eq!(parse_km("Ponte sobre o rio"), None);
    }

    #[test]
    fn test_named_and_generic_classification() {
        assert_eq!(
            classify_label("Trevo 45 (MT 130)"),
            (MarkerCategory::Named, Some("130".to_string()))
        );
        assert_eq!(
            classify_label("BR 163 KM 45"),
            (MarkerCategory::Generic, Some("163".to_string()))
        );
        assert_eq!(classify_label("KM 45"), (MarkerCategory::Generic, None));
    }

    #[test]
    fn test_normalize_highway_code() {
        assert_eq!(normalize_highway_code("MT-010").as_deref(), Some("10"));
        assert_eq!(normalize_highway_code("163").as_deref(), Some("163"));
        assert_eq!(normalize_highway_code("000").as_deref(), Some("0"));
        assert_eq!(normalize_highway_code("anel").as_deref(), Some("ANEL"));
        assert_eq!(normalize_highway_code(" - "), None);
    }

    #[test]
    fn test_substring_codes_do_not_match() {
        let marker = Marker::from_label(GpsPoint::new(0.0, 0.0), Some("SINFRA - 146/10"), None);
        assert!(marker.matches_highway("146"));
        assert!(!marker.matches_highway("46"));
        assert!(!marker.matches_highway("MT-46"));
    }

    #[test]
    fn test_description_fallback() {
        let marker =
            Marker::from_label(GpsPoint::new(0.0, 0.0), Some("Ponte"), Some("BR 163 KM 12"));
        assert_eq!(marker.raw_name, "Ponte");
        assert!(approx_eq(marker.parsed_km, 12.0));
        assert_eq!(marker.highway_code.as_deref(), Some("163"));
    }

    #[test]
    fn test_extract_markers_from_nested_points() {
        let input = GeoInput::new(vec![
            FeatureNode::named(
                "SINFRA - 163/10",
                GeometryNode::Collection(vec![GeometryNode::MultiPoint(vec![
                    GpsPoint::new(-15.0, -56.0),
                    GpsPoint::new(-15.1, -56.0),
                ])]),
            ),
            FeatureNode::new(GeometryNode::LineString(vec![
                GpsPoint::new(-15.0, -56.0),
                GpsPoint::new(-15.1, -56.0),
            ])),
        ]);
        let markers = extract_markers(&input);
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| m.category == MarkerCategory::Sinfra));
    }
}
