//! Object key templates for bucket-backed sources.
//!
//! Only the handful of actions release buckets actually use are supported:
//! `{{.Name}}`, `{{.Version}}`, `{{.StemcellOS}}`, `{{.StemcellVersion}}`
//! and `{{trimSuffix .Name "-release"}}`.

use std::str::FromStr;

use regex::Regex;
use tessera_schema::Spec;

use crate::error::{ReleaseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Version,
    StemcellOs,
    StemcellVersion,
}

impl Field {
    fn parse(token: &str) -> Option<Self> {
        match token {
            ".Name" => Some(Self::Name),
            ".Version" => Some(Self::Version),
            ".StemcellOS" => Some(Self::StemcellOs),
            ".StemcellVersion" => Some(Self::StemcellVersion),
            _ => None,
        }
    }

    fn value(self, spec: &Spec) -> &str {
        match self {
            Self::Name => &spec.name,
            Self::Version => &spec.version,
            Self::StemcellOs => &spec.stemcell_os,
            Self::StemcellVersion => &spec.stemcell_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
    TrimSuffix(Field, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether rendered keys depend on the stemcell (a compiled cache).
    pub fn uses_stemcell(&self) -> bool {
        self.segments.iter().any(|s| {
            matches!(
                s,
                Segment::Field(Field::StemcellOs | Field::StemcellVersion)
                    | Segment::TrimSuffix(Field::StemcellOs | Field::StemcellVersion, _)
            )
        })
    }

    pub fn render(&self, spec: &Spec) -> String {
        self.render_segments(&self.segments, spec)
    }

    /// The rendered text before the first version-dependent segment; used
    /// as a listing prefix when searching for versions.
    pub fn prefix(&self, spec: &Spec) -> String {
        let end = self
            .segments
            .iter()
            .position(|s| {
                matches!(
                    s,
                    Segment::Field(Field::Version) | Segment::TrimSuffix(Field::Version, _)
                )
            })
            .unwrap_or(self.segments.len());
        self.render_segments(&self.segments[..end], spec)
    }

    /// Recover the version from a key rendered for `spec` (whose version is
    /// ignored). Returns `None` for keys that belong to something else.
    pub fn extract_version(&self, spec: &Spec, key: &str) -> Option<String> {
        let mut pattern = String::from("^");
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Field(Field::Version) | Segment::TrimSuffix(Field::Version, _) => {
                    pattern.push_str("(?P<version>[^/]+?)");
                }
                Segment::Field(field) => pattern.push_str(&regex::escape(field.value(spec))),
                Segment::TrimSuffix(field, suffix) => {
                    let value = field.value(spec);
                    pattern.push_str(&regex::escape(value.strip_suffix(suffix.as_str()).unwrap_or(value)));
                }
            }
        }
        pattern.push('$');

        let re = Regex::new(&pattern).ok()?;
        let version = re.captures(key)?.name("version")?.as_str().to_string();

        // A template may mention the version twice; the render must agree.
        let candidate = Spec {
            version: version.clone(),
            ..spec.clone()
        };
        (self.render(&candidate) == key).then_some(version)
    }

    fn render_segments(&self, segments: &[Segment], spec: &Spec) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(field.value(spec)),
                Segment::TrimSuffix(field, suffix) => {
                    let value = field.value(spec);
                    out.push_str(value.strip_suffix(suffix.as_str()).unwrap_or(value));
                }
            }
        }
        out
    }
}

impl FromStr for PathTemplate {
    type Err = ReleaseError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            ReleaseError::Config(format!("path template {raw:?}: {reason}"))
        };
        if raw.trim().is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| invalid("unclosed action"))?;
            segments.push(parse_action(after[..end].trim()).ok_or_else(|| {
                invalid(&format!("unsupported action {:?}", after[..end].trim()))
            })?);
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn parse_action(action: &str) -> Option<Segment> {
    if let Some(field) = Field::parse(action) {
        return Some(Segment::Field(field));
    }
    let args = action.strip_prefix("trimSuffix")?.trim();
    let (field, suffix) = args.split_once(char::is_whitespace)?;
    let suffix = suffix.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some(Segment::TrimSuffix(Field::parse(field)?, suffix.to_string()))
}
