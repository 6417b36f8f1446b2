//! Version normalization and constraint parsing

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::constraint::{
    Constraint, MatchAllConstraint, MultiConstraint, Operator, VersionConstraint,
};

/// Release maturity of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stability {
    Stable,
    RC,
    Beta,
    Alpha,
    Dev,
}

impl Stability {
    /// Lower is more stable. Stability filters accept everything at or below
    /// the configured value.
    pub fn priority(&self) -> u8 {
        match self {
            Stability::Stable => 0,
            Stability::RC => 5,
            Stability::Beta => 10,
            Stability::Alpha => 15,
            Stability::Dev => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::RC => "RC",
            Stability::Beta => "beta",
            Stability::Alpha => "alpha",
            Stability::Dev => "dev",
        }
    }
}

impl Default for Stability {
    fn default() -> Self {
        Stability::Stable
    }
}

impl FromStr for Stability {
    type Err = VersionParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Ok(Stability::Stable),
            "rc" => Ok(Stability::RC),
            "beta" | "b" => Ok(Stability::Beta),
            "alpha" | "a" => Ok(Stability::Alpha),
            "dev" => Ok(Stability::Dev),
            _ => Err(VersionParserError::InvalidStability(s.to_string())),
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParserError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),
    #[error("Invalid stability \"{0}\"")]
    InvalidStability(String),
    #[error("Could not parse version constraint {constraint}: {reason}")]
    InvalidConstraint { constraint: String, reason: String },
}

const MODIFIER: &str = r"[._-]?(?:(stable|beta|b|RC|rc|alpha|a|patch|pl|p)((?:[.-]?\d+)*)?)?([.-]?dev)?";

lazy_static! {
    static ref CLASSICAL_RE: Regex =
        Regex::new(&format!(r"(?i)^v?(\d{{1,5}})(\.\d+)?(\.\d+)?(\.\d+)?{}$", MODIFIER)).unwrap();
    static ref DATE_RE: Regex = Regex::new(&format!(
        r"(?i)^v?(\d{{4}}(?:[.:-]?\d{{2}}){{1,6}}(?:[.:-]?\d{{1,3}}){{0,2}}){}$",
        MODIFIER
    ))
    .unwrap();
    static ref STABILITY_SUFFIX_RE: Regex =
        Regex::new(&format!(r"(?i){}(?:\+.*)?$", MODIFIER)).unwrap();
    static ref HAS_MODIFIER_RE: Regex = Regex::new(&format!(r"(?i)-{}$", MODIFIER)).unwrap();
    static ref BRANCH_RE: Regex =
        Regex::new(r"(?i)^v?(\d+)(\.(?:\d+|[xX*]))?(\.(?:\d+|[xX*]))?(\.(?:\d+|[xX*]))?$").unwrap();
    static ref DEV_SUFFIX_RE: Regex = Regex::new(r"(?i)^(.*?)[.-]?dev$").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"^([^,\s]+) +as +([^,\s]+)$").unwrap();
    static ref FLAG_RE: Regex = Regex::new(r"(?i)@(?:stable|RC|beta|alpha|dev)$").unwrap();
    static ref BUILD_RE: Regex = Regex::new(r"^([^,\s+]+)\+[^\s]+$").unwrap();
    static ref CONSTRAINT_FLAG_RE: Regex =
        Regex::new(r"(?i)^([^,\s]*?)@(stable|RC|beta|alpha|dev)$").unwrap();
    static ref REFERENCE_RE: Regex =
        Regex::new(r"(?i)^(dev-[^,\s@]+?|[^,\s@]+?\.x-dev)#.+$").unwrap();
    static ref WILDCARD_RE: Regex = Regex::new(r"(?i)^v?[xX*](\.[xX*])*$").unwrap();
    static ref X_RANGE_RE: Regex =
        Regex::new(r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.[xX*])+$").unwrap();
    static ref OR_SPLIT_RE: Regex = Regex::new(r"\s*\|\|?\s*").unwrap();
    static ref COMPARATOR_RE: Regex = Regex::new(r"^(<>|!=|>=?|<=?|==?)?\s*(.*)$").unwrap();
}

const VERSION: &str = r"v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?[._-]?(?:(stable|beta|b|RC|rc|alpha|a|patch|pl|p)((?:[.-]?\d+)*)?)?([.-]?dev)?(?:\+[^\s]+)?";

lazy_static! {
    static ref TILDE_RE: Regex = Regex::new(&format!(r"(?i)^~>?{}$", VERSION)).unwrap();
    static ref CARET_RE: Regex = Regex::new(&format!(r"(?i)^\^{}$", VERSION)).unwrap();
    static ref HYPHEN_RE: Regex =
        Regex::new(&format!(r"(?i)^({}) +- +({})$", VERSION, VERSION)).unwrap();
}

/// Numeric parts captured at `start..start + 4`, `None` where absent.
fn numeric_parts(caps: &Captures<'_>, start: usize) -> [Option<u64>; 4] {
    let mut parts = [None; 4];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = caps.get(start + i).and_then(|m| m.as_str().parse().ok());
    }
    parts
}

fn has_group(caps: &Captures<'_>, index: usize) -> bool {
    caps.get(index).map_or(false, |m| !m.as_str().is_empty())
}

/// Zeroes every part after `position` (1-based) and adds `increment` at it.
fn bump(parts: [Option<u64>; 4], position: usize, increment: u64) -> String {
    let mut out = [0u64; 4];
    for i in 0..4 {
        if i + 1 < position {
            out[i] = parts[i].unwrap_or(0);
        } else if i + 1 == position {
            out[i] = parts[i].unwrap_or(0) + increment;
        }
    }
    format!("{}.{}.{}.{}", out[0], out[1], out[2], out[3])
}

fn expand_stability(word: &str) -> String {
    match word.to_ascii_lowercase().as_str() {
        "a" => "alpha".to_string(),
        "b" => "beta".to_string(),
        "p" | "pl" => "patch".to_string(),
        "rc" => "RC".to_string(),
        other => other.to_string(),
    }
}

/// Parses and normalizes version strings and constraint expressions
#[derive(Debug, Clone, Default)]
pub struct VersionParser;

impl VersionParser {
    pub fn new() -> Self {
        VersionParser
    }

    /// Stability of a (raw or normalized) version string.
    pub fn parse_stability(version: &str) -> Stability {
        let version = version.split('#').next().unwrap_or(version);

        if version.starts_with("dev-") || version.ends_with("-dev") {
            return Stability::Dev;
        }

        let lower = version.to_ascii_lowercase();
        let Some(caps) = STABILITY_SUFFIX_RE.captures(&lower) else {
            return Stability::Stable;
        };

        if has_group(&caps, 3) {
            return Stability::Dev;
        }

        match caps.get(1).map(|m| m.as_str()) {
            Some("beta") | Some("b") => Stability::Beta,
            Some("alpha") | Some("a") => Stability::Alpha,
            Some("rc") => Stability::RC,
            _ => Stability::Stable,
        }
    }

    /// Normalizes a version: `v1.2` → `1.2.0.0`, `1.0-b2` → `1.0.0.0-beta2`,
    /// `2.x-dev` → `2.9999999.9999999.9999999-dev`, `master` → `dev-master`.
    pub fn normalize(&self, version: &str) -> Result<String, VersionParserError> {
        let original = version.trim();
        let mut version = original;

        if let Some(caps) = ALIAS_RE.captures(version) {
            version = caps.get(1).map_or(version, |m| m.as_str());
        }

        if let Some(m) = FLAG_RE.find(version) {
            version = &version[..m.start()];
        }

        if matches!(version, "master" | "trunk" | "default") {
            return Ok(format!("dev-{}", version));
        }

        if let Some(prefix) = version.get(..4) {
            if prefix.eq_ignore_ascii_case("dev-") {
                return Ok(format!("dev-{}", &version[4..]));
            }
        }

        if let Some(caps) = BUILD_RE.captures(version) {
            version = caps.get(1).map_or(version, |m| m.as_str());
        }

        if let Some(caps) = CLASSICAL_RE.captures(version) {
            let mut normalized = caps[1].to_string();
            for index in 2..=4 {
                match caps.get(index) {
                    Some(part) => normalized.push_str(part.as_str()),
                    None => normalized.push_str(".0"),
                }
            }
            return Ok(Self::add_modifiers(normalized, &caps, 5));
        }

        if let Some(caps) = DATE_RE.captures(version) {
            let normalized: String = caps[1]
                .chars()
                .map(|c| if c.is_ascii_digit() { c } else { '.' })
                .collect();
            return Ok(Self::add_modifiers(normalized, &caps, 2));
        }

        if let Some(caps) = DEV_SUFFIX_RE.captures(version) {
            let normalized = self.normalize_branch(&caps[1]);
            if !normalized.starts_with("dev-") {
                return Ok(normalized);
            }
        }

        Err(VersionParserError::InvalidVersion(original.to_string()))
    }

    fn add_modifiers(mut version: String, caps: &Captures<'_>, index: usize) -> String {
        if let Some(word) = caps.get(index).map(|m| m.as_str()) {
            if word.eq_ignore_ascii_case("stable") {
                return version;
            }
            version.push('-');
            version.push_str(&expand_stability(word));
            if let Some(number) = caps.get(index + 1) {
                version.push_str(number.as_str().trim_start_matches(&['.', '-'][..]));
            }
        }
        if has_group(caps, index + 2) {
            version.push_str("-dev");
        }
        version
    }

    /// Normalizes a branch name: numeric branches become `x.y.9999999.9999999-dev`,
    /// anything else `dev-<name>`.
    pub fn normalize_branch(&self, name: &str) -> String {
        let name = name.trim();

        if let Some(caps) = BRANCH_RE.captures(name) {
            let mut version = String::new();
            for index in 1..=4 {
                match caps.get(index) {
                    Some(part) => version.push_str(&part.as_str().replace(&['*', 'X'][..], "x")),
                    None => version.push_str(".x"),
                }
            }
            return format!("{}-dev", version.replace('x', "9999999"));
        }

        format!("dev-{}", name)
    }

    /// Parses a constraint expression such as `^1.2 || 2.0.* >=2.0.3`.
    pub fn parse_constraints(
        &self,
        constraints: &str,
    ) -> Result<Box<dyn VersionConstraint>, VersionParserError> {
        let pretty = constraints.trim();
        if pretty.is_empty() {
            return Err(VersionParserError::InvalidConstraint {
                constraint: constraints.to_string(),
                reason: "empty constraint".to_string(),
            });
        }

        let mut or_groups = Vec::new();
        for or_part in OR_SPLIT_RE.split(pretty) {
            let mut and_parts = Vec::new();
            for term in split_and_terms(or_part) {
                and_parts.extend(self.parse_term(&term)?);
            }
            or_groups.push(MultiConstraint::create(and_parts, true));
        }

        let mut constraint = MultiConstraint::create(or_groups, false);
        constraint.set_pretty_string(Some(pretty.to_string()));
        Ok(constraint)
    }

    fn invalid(constraint: &str, reason: impl Into<String>) -> VersionParserError {
        VersionParserError::InvalidConstraint {
            constraint: constraint.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_term(&self, term: &str) -> Result<Vec<Box<dyn VersionConstraint>>, VersionParserError> {
        let mut term = term.to_string();

        if let Some(caps) = ALIAS_RE.captures(&term) {
            term = caps[1].to_string();
        }

        let mut stability_modifier = None;
        if let Some(caps) = CONSTRAINT_FLAG_RE.captures(&term) {
            let flag = caps[2].to_string();
            term = if caps[1].is_empty() { "*".to_string() } else { caps[1].to_string() };
            if !flag.eq_ignore_ascii_case("stable") {
                stability_modifier = Some(flag);
            }
        }

        if let Some(caps) = REFERENCE_RE.captures(&term) {
            term = caps[1].to_string();
        }

        if WILDCARD_RE.is_match(&term) {
            return Ok(vec![Box::new(MatchAllConstraint::new())]);
        }

        if let Some(caps) = TILDE_RE.captures(&term) {
            if term.starts_with("~>") {
                return Err(Self::invalid(
                    &term,
                    "Invalid operator \"~>\", you probably meant to use the \"~\" operator",
                ));
            }
            let parts = numeric_parts(&caps, 1);
            let position = (1..=4).rev().find(|&i| parts[i - 1].is_some()).unwrap_or(1);
            let suffix = if has_group(&caps, 5) || has_group(&caps, 7) { "" } else { "-dev" };
            let low = self.normalize(&format!("{}{}", &term[1..], suffix))?;
            let high = bump(parts, position.saturating_sub(1).max(1), 1);
            return Ok(vec![
                Box::new(Constraint::new(Operator::GreaterThanOrEqual, low)),
                Box::new(Constraint::new(Operator::LessThan, format!("{}-dev", high))),
            ]);
        }

        if let Some(caps) = CARET_RE.captures(&term) {
            let parts = numeric_parts(&caps, 1);
            let position = if parts[0] != Some(0) || parts[1].is_none() {
                1
            } else if parts[1] != Some(0) || parts[2].is_none() {
                2
            } else {
                3
            };
            let suffix = if has_group(&caps, 5) || has_group(&caps, 7) { "" } else { "-dev" };
            let low = self.normalize(&format!("{}{}", &term[1..], suffix))?;
            let high = bump(parts, position, 1);
            return Ok(vec![
                Box::new(Constraint::new(Operator::GreaterThanOrEqual, low)),
                Box::new(Constraint::new(Operator::LessThan, format!("{}-dev", high))),
            ]);
        }

        if let Some(caps) = X_RANGE_RE.captures(&term) {
            let parts = numeric_parts(&caps, 1);
            let position = (1..=3).rev().find(|&i| parts[i - 1].is_some()).unwrap_or(1);
            let low = format!("{}-dev", bump(parts, position, 0));
            let high = Constraint::new(
                Operator::LessThan,
                format!("{}-dev", bump(parts, position, 1)),
            );
            if low == "0.0.0.0-dev" {
                return Ok(vec![Box::new(high)]);
            }
            return Ok(vec![
                Box::new(Constraint::new(Operator::GreaterThanOrEqual, low)),
                Box::new(high),
            ]);
        }

        if let Some(caps) = HYPHEN_RE.captures(&term) {
            // groups: 1 = from (2..=5 numbers, 6 word, 7 number, 8 dev),
            // 9 = to (10..=13 numbers, 14 word, 15 number, 16 dev)
            let low_suffix = if has_group(&caps, 6) || has_group(&caps, 8) { "" } else { "-dev" };
            let low = self.normalize(&caps[1])?;
            let lower = Constraint::new(Operator::GreaterThanOrEqual, format!("{}{}", low, low_suffix));

            let to = numeric_parts(&caps, 10);
            let upper = if (to[1].is_some() && to[2].is_some()) || has_group(&caps, 14) || has_group(&caps, 16) {
                Constraint::new(Operator::LessThanOrEqual, self.normalize(&caps[9])?)
            } else {
                self.normalize(&caps[9])?;
                let position = if to[1].is_none() { 1 } else { 2 };
                Constraint::new(Operator::LessThan, format!("{}-dev", bump(to, position, 1)))
            };
            return Ok(vec![Box::new(lower), Box::new(upper)]);
        }

        if let Some(caps) = COMPARATOR_RE.captures(&term) {
            let op_str = caps.get(1).map_or("", |m| m.as_str());
            let raw = caps.get(2).map_or("", |m| m.as_str());
            let operator: Operator = op_str
                .parse()
                .map_err(|e: crate::constraint::InvalidOperatorError| Self::invalid(&term, e.to_string()))?;

            if let Ok(mut version) = self.normalize(raw) {
                if let Some(modifier) = &stability_modifier {
                    if Self::parse_stability(&version) == Stability::Stable {
                        version = format!("{}-{}", version, modifier.to_ascii_lowercase());
                    }
                } else if matches!(op_str, "<" | ">=")
                    && !HAS_MODIFIER_RE.is_match(&raw.to_ascii_lowercase())
                    && !raw.starts_with("dev-")
                {
                    version.push_str("-dev");
                }
                return Ok(vec![Box::new(Constraint::new(operator, version))]);
            }
        }

        Err(Self::invalid(&term, "unrecognized constraint"))
    }
}

/// Splits one OR-branch into AND terms. Separators are commas and spaces;
/// an operator standing alone binds to the next token and `a - b` stays one
/// hyphen range.
fn split_and_terms(input: &str) -> Vec<String> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let mut terms: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let is_bare_operator = matches!(token, "<" | "<=" | ">" | ">=" | "=" | "==" | "!=" | "<>" | "~" | "^");

        if is_bare_operator && i + 1 < tokens.len() {
            terms.push(format!("{}{}", token, tokens[i + 1]));
            i += 2;
        } else if i + 2 < tokens.len() && tokens[i + 1] == "-" {
            terms.push(format!("{} - {}", token, tokens[i + 2]));
            i += 3;
        } else if i + 2 < tokens.len() && tokens[i + 1] == "as" {
            terms.push(format!("{} as {}", token, tokens[i + 2]));
            i += 3;
        } else {
            terms.push(token.to_string());
            i += 1;
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> VersionParser {
        VersionParser::new()
    }

    fn accepts(constraint: &str, version: &str) -> bool {
        let parser = parser();
        let parsed = parser.parse_constraints(constraint).unwrap();
        let normalized = parser.normalize(version).unwrap();
        parsed.matches(&Constraint::exact(normalized))
    }

    #[test]
    fn test_normalize() {
        let p = parser();
        assert_eq!(p.normalize("1.0").unwrap(), "1.0.0.0");
        assert_eq!(p.normalize("v1.2.3").unwrap(), "1.2.3.0");
        assert_eq!(p.normalize("1.0.0-beta2").unwrap(), "1.0.0.0-beta2");
        assert_eq!(p.normalize("1.0-b.2").unwrap(), "1.0.0.0-beta2");
        assert_eq!(p.normalize("1.0.0RC1").unwrap(), "1.0.0.0-RC1");
        assert_eq!(p.normalize("1.0.0-stable").unwrap(), "1.0.0.0");
        assert_eq!(p.normalize("1.0.0-dev").unwrap(), "1.0.0.0-dev");
        assert_eq!(p.normalize("1.0.0+build.5").unwrap(), "1.0.0.0");
        assert_eq!(p.normalize("2.x-dev").unwrap(), "2.9999999.9999999.9999999-dev");
        assert_eq!(p.normalize("dev-feature/x").unwrap(), "dev-feature/x");
        assert_eq!(p.normalize("master").unwrap(), "dev-master");
        assert_eq!(p.normalize("1.0 as 2.0").unwrap(), "1.0.0.0");
        assert_eq!(p.normalize("2010-01-02").unwrap(), "2010.01.02");
    }

    #[test]
    fn test_normalize_fails() {
        assert!(parser().normalize("foo").is_err());
        assert!(parser().normalize("1.0.0-meh").is_err());
    }

    #[test]
    fn test_parse_stability() {
        assert_eq!(VersionParser::parse_stability("1.0.0.0"), Stability::Stable);
        assert_eq!(VersionParser::parse_stability("1.0.0.0-beta2"), Stability::Beta);
        assert_eq!(VersionParser::parse_stability("1.0.0.0-RC1"), Stability::RC);
        assert_eq!(VersionParser::parse_stability("1.0.0-alpha"), Stability::Alpha);
        assert_eq!(VersionParser::parse_stability("dev-main"), Stability::Dev);
        assert_eq!(VersionParser::parse_stability("1.0.x-dev"), Stability::Dev);
        assert_eq!(VersionParser::parse_stability("1.0.0-patch1"), Stability::Stable);
    }

    #[test]
    fn test_simple_constraints() {
        assert!(accepts("1.0", "1.0.0"));
        assert!(!accepts("1.0", "1.0.1"));
        assert!(accepts(">=1.0", "1.2"));
        assert!(accepts("<1.2", "1.0"));
        assert!(!accepts("<1.2", "1.2"));
        assert!(!accepts("<1.2", "1.2.0-beta1"));
        assert!(accepts("!=1.0", "1.1"));
        assert!(accepts("*", "3.4.5"));
    }

    #[test]
    fn test_ranges() {
        assert!(accepts("^1.2", "1.9.9"));
        assert!(!accepts("^1.2", "2.0.0"));
        assert!(accepts("^0.3", "0.3.5"));
        assert!(!accepts("^0.3", "0.4.0"));
        assert!(accepts("~1.2", "1.9"));
        assert!(!accepts("~1.2.3", "1.3.0"));
        assert!(accepts("~1.2.3", "1.2.9"));
        assert!(accepts("1.2.*", "1.2.7"));
        assert!(!accepts("1.2.*", "1.3.0"));
        assert!(accepts("1.0 - 2.0", "2.0.5"));
        assert!(!accepts("1.0 - 2.0", "2.1.0"));
        assert!(accepts("1.0.0 - 2.1.0", "2.1.0"));
        assert!(!accepts("1.0.0 - 2.1.0", "2.1.1"));
    }

    #[test]
    fn test_and_or_combinations() {
        assert!(accepts(">=1.0 <2.0", "1.5"));
        assert!(accepts(">=1.0,<2.0", "1.5"));
        assert!(accepts(">= 1.0 < 2.0", "1.5"));
        assert!(!accepts(">=1.0 <2.0", "2.0"));
        assert!(accepts("^1.0 || ^3.0", "3.1"));
        assert!(!accepts("^1.0 || ^3.0", "2.1"));
        assert!(accepts("1.0|2.0", "2.0"));
    }

    #[test]
    fn test_flags_and_branches() {
        assert!(accepts("dev-main", "dev-main"));
        assert!(accepts("1.0.*@dev", "1.0.3"));
        assert!(accepts("@dev", "4.0"));
        assert!(accepts("dev-main#abc123", "dev-main"));
    }

    #[test]
    fn test_pretty_string_kept() {
        let parsed = parser().parse_constraints(" ^1.0 || ^2.0 ").unwrap();
        assert_eq!(parsed.pretty_string(), "^1.0 || ^2.0");
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(parser().parse_constraints("").is_err());
        assert!(parser().parse_constraints("~>1.0").is_err());
        assert!(parser().parse_constraints(">=foo").is_err());
    }
}
