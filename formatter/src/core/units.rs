//! Length values in rule configuration.
//!
//! Rules express lengths either as a bare number (points) or as a string
//! with a unit suffix: `12pt`, `1.5cm`, `0.3in`, `5mm`.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const POINTS_PER_INCH: f64 = 72.0;
pub const POINTS_PER_CM: f64 = 28.35;
pub const POINTS_PER_MM: f64 = 2.835;
pub const TWIPS_PER_POINT: f64 = 20.0;

/// A length in typographic points.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "LengthRepr", into = "f64")]
pub struct Length(f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum LengthRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<LengthRepr> for Length {
    type Error = String;

    fn try_from(value: LengthRepr) -> Result<Self, Self::Error> {
        match value {
            LengthRepr::Number(points) => Ok(Length(points)),
            LengthRepr::Text(text) => Length::parse(&text),
        }
    }
}

impl From<Length> for f64 {
    fn from(value: Length) -> Self {
        value.0
    }
}

impl Length {
    pub const ZERO: Length = Length(0.0);

    pub fn from_points(points: f64) -> Self {
        Self(points)
    }

    pub fn from_inches(inches: f64) -> Self {
        Self(inches * POINTS_PER_INCH)
    }

    pub fn from_cm(cm: f64) -> Self {
        Self(cm * POINTS_PER_CM)
    }

    pub fn from_twips(twips: i64) -> Self {
        Self(twips as f64 / TWIPS_PER_POINT)
    }

    pub fn points(self) -> f64 {
        self.0
    }

    pub fn inches(self) -> f64 {
        self.0 / POINTS_PER_INCH
    }

    /// Twentieths of a point, the unit OOXML uses for indents and margins.
    pub fn twips(self) -> i64 {
        (self.0 * TWIPS_PER_POINT).round() as i64
    }

    /// True when both lengths are within `tolerance` points of each other.
    pub fn approx_eq(self, other: Length, tolerance: f64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }

    /// Parse `"<number>[unit]"` where unit is one of `pt`, `cm`, `in`, `mm`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let text = raw.trim().to_ascii_lowercase();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid length '{raw}'"))?;
        let points = match unit.trim() {
            "" | "pt" => value,
            "cm" => value * POINTS_PER_CM,
            "in" => value * POINTS_PER_INCH,
            "mm" => value * POINTS_PER_MM,
            other => return Err(format!("unknown length unit '{other}' in '{raw}'")),
        };
        Ok(Self(points))
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}pt", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(Length::parse("12").expect("pt"), Length::from_points(12.0));
        assert_eq!(Length::parse("12pt").expect("pt"), Length::from_points(12.0));
        assert_eq!(Length::parse("1in").expect("in"), Length::from_points(72.0));
        assert!(Length::parse("2cm").expect("cm").approx_eq(Length::from_points(56.7), 1e-9));
        assert!(Length::parse("10 mm").expect("mm").approx_eq(Length::from_points(28.35), 1e-9));
    }

    #[test]
    fn rejects_unknown_unit() {
        let err = Length::parse("3furlongs").expect_err("unknown unit");
        assert!(err.contains("furlongs"));
    }

    #[test]
    fn deserializes_number_or_string() {
        let from_number: Length = serde_json::from_str("18").expect("number");
        let from_text: Length = serde_json::from_str("\"0.5in\"").expect("text");
        assert_eq!(from_number.points(), 18.0);
        assert_eq!(from_text.points(), 36.0);
    }

    #[test]
    fn converts_to_twips() {
        assert_eq!(Length::from_inches(0.3).twips(), 432);
        assert_eq!(Length::from_twips(720).points(), 36.0);
    }
}
