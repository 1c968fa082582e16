//! Version constraints as written in a Kilnfile.
//!
//! The dialect differs from Cargo's: a bare version such as `1.1.21` means
//! exactly that version rather than `^1.1.21`. Terms are joined with commas
//! (or whitespace) for AND and with `||` for OR. Release versions published
//! by BOSH teams are frequently not full semver (`276`, `1.2`), so both
//! sides are parsed leniently.

use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};

use crate::SchemaError;

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alternative {
    req: VersionReq,
    excluded: Vec<Version>,
}

impl VersionConstraint {
    /// A constraint matching every version.
    pub fn any() -> Self {
        Self {
            raw: String::new(),
            alternatives: vec![Alternative {
                req: VersionReq::STAR,
                excluded: Vec::new(),
            }],
        }
    }

    /// Whether `version` satisfies the constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|alt| alt.req.matches(version) && !alt.excluded.contains(version))
    }

    /// Whether a lenient version string satisfies the constraint.
    ///
    /// Unparseable versions never match.
    pub fn matches_str(&self, version: &str) -> bool {
        parse_lenient(version).is_ok_and(|v| self.matches(&v))
    }

    /// Pick the highest of `candidates` satisfying the constraint.
    pub fn highest<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|raw| parse_lenient(raw).ok().map(|v| (v, raw)))
            .filter(|(v, _)| self.matches(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, raw)| raw)
    }
}

impl FromStr for VersionConstraint {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                raw: trimmed.to_string(),
                ..Self::any()
            });
        }

        let invalid = |reason: String| SchemaError::Constraint {
            constraint: s.to_string(),
            reason,
        };

        let mut alternatives = Vec::new();
        for alternative in trimmed.split("||") {
            let mut comparators = Vec::new();
            let mut excluded = Vec::new();
            for term in split_terms(alternative) {
                if let Some(version) = term.strip_prefix("!=") {
                    let version = parse_lenient(version.trim())
                        .map_err(|_| invalid(format!("bad version in {term:?}")))?;
                    excluded.push(version);
                } else {
                    comparators.push(translate_term(&term));
                }
            }
            let req = if comparators.is_empty() {
                VersionReq::STAR
            } else {
                VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(e.to_string()))?
            };
            alternatives.push(Alternative { req, excluded });
        }

        Ok(Self {
            raw: trimmed.to_string(),
            alternatives,
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&self.raw)
        }
    }
}

/// Split one OR-branch into AND terms, gluing operators to their operand
/// so `>= 1.2` and `>=1.2` read the same.
fn split_terms(alternative: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| "<>=!~^".contains(c)) {
            pending_op.push_str(token);
            continue;
        }
        terms.push(format!("{}{token}", std::mem::take(&mut pending_op)));
    }
    terms
}

fn translate_term(term: &str) -> String {
    let op_len = term
        .find(|c: char| !"<>=~^".contains(c))
        .unwrap_or(term.len());
    let (op, version) = term.split_at(op_len);
    let version = version.trim_start_matches('v');
    let wildcard = version.contains(['x', 'X', '*']);
    match op {
        "" if wildcard => version.to_string(),
        "" => format!("={version}"),
        "~>" => format!("~{version}"),
        _ => format!("{op}{version}"),
    }
}

/// Parse a version leniently, padding missing minor and patch components.
///
/// `276` becomes `276.0.0` and `v1.2-rc.1` becomes `1.2.0-rc.1`.
///
/// # Errors
///
/// Returns [`SchemaError::Version`] if the numeric core has more than three
/// components or any of them is not a number.
pub fn parse_lenient(raw: &str) -> Result<Version, SchemaError> {
    let trimmed = raw.trim().trim_start_matches('v');
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(SchemaError::Version(raw.to_string()));
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).map_err(|_| SchemaError::Version(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(s: &str) -> VersionConstraint {
        s.parse().unwrap()
    }

    #[test]
    fn test_bare_version_is_exact() {
        let c = constraint("1.1.21");
        assert!(c.matches_str("1.1.21"));
        assert!(!c.matches_str("1.1.22"));
        assert!(!c.matches_str("1.2.0"));
    }

    #[test]
    fn test_partial_bare_version_matches_series() {
        let c = constraint("1.2");
        assert!(c.matches_str("1.2.9"));
        assert!(!c.matches_str("1.3.0"));
    }

    #[test]
    fn test_operators_and_lists() {
        let c = constraint(">= 1.0, < 2");
        assert!(c.matches_str("1.9.9"));
        assert!(!c.matches_str("2.0.0"));

        let c = constraint("~1.4 || ^3");
        assert!(c.matches_str("1.4.7"));
        assert!(c.matches_str("3.8.0"));
        assert!(!c.matches_str("2.0.0"));

        let c = constraint(">=1, != 1.5.0");
        assert!(c.matches_str("1.6.0"));
        assert!(!c.matches_str("1.5.0"));
    }

    #[test]
    fn test_any_and_wildcards() {
        assert!(constraint("").matches_str("0.0.1"));
        assert!(constraint("*").matches_str("42"));
        assert!(constraint("1.x").matches_str("1.77.0"));
        assert!(!constraint("1.x").matches_str("2.0.0"));
    }

    #[test]
    fn test_highest() {
        let c = constraint("~1.1");
        let versions = ["1.0.9", "1.1.2", "1.1.10", "1.2.0", "garbage"];
        assert_eq!(c.highest(versions), Some("1.1.10"));
        assert_eq!(constraint("9").highest(versions), None);
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_lenient("276").unwrap(), Version::new(276, 0, 0));
        assert_eq!(parse_lenient("v1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_lenient("1.2-rc.1").unwrap().pre.as_str(), "rc.1");
        assert!(parse_lenient("1.2.3.4").is_err());
        assert!(parse_lenient("latest").is_err());
    }

    #[test]
    fn test_invalid_constraint() {
        assert!("> banana".parse::<VersionConstraint>().is_err());
    }
}
