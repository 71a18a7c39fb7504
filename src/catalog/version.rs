//! AR-010: API versions and version ranges.
//!
//! Resource API versions are dates (`2023-01-01`) with an optional pre-release
//! suffix (`2023-01-01-preview`). A pre-release sorts before the GA release of
//! the same date.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Preview,
    Ga,
}

/// A parsed resource API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub stage: Stage,
}

impl ApiVersion {
    /// Days since 1970-01-01 (proleptic Gregorian).
    pub fn day_number(&self) -> i64 {
        let (y, m, d) = (
            i64::from(self.year),
            i64::from(self.month),
            i64::from(self.day),
        );
        let y = if m <= 2 { y - 1 } else { y };
        let era = y.div_euclid(400);
        let yoe = y - era * 400;
        let mp = (m + 9) % 12;
        let doy = (153 * mp + 2) / 5 + d - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146_097 + doe - 719_468
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid API version '{}' (expected YYYY-MM-DD[-preview])", s);
        let mut parts = s.splitn(4, '-');
        let year: u16 = parts
            .next()
            .filter(|p| p.len() == 4)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let month: u8 = parts
            .next()
            .filter(|p| p.len() == 2)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let day: u8 = parts
            .next()
            .filter(|p| p.len() == 2)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(invalid());
        }
        let stage = match parts.next() {
            None => Stage::Ga,
            Some(suffix) if !suffix.is_empty() => Stage::Preview,
            Some(_) => return Err(invalid()),
        };
        Ok(Self {
            year,
            month,
            day,
            stage,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if self.stage == Stage::Preview {
            write!(f, "-preview")?;
        }
        Ok(())
    }
}

/// Set of API versions a mapping applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    Any,
    Exact(Vec<ApiVersion>),
    Bounded {
        min: Option<ApiVersion>,
        max: Option<ApiVersion>,
    },
}

impl VersionRange {
    /// Parse `*`, an exact version, or `>=A`, `<=B`, `>=A <=B`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if spec.is_empty() || spec == "*" {
            return Ok(Self::Any);
        }
        let mut min = None;
        let mut max = None;
        let mut exact = Vec::new();
        for part in spec.split_whitespace() {
            if let Some(v) = part.strip_prefix(">=") {
                min = Some(v.parse::<ApiVersion>()?);
            } else if let Some(v) = part.strip_prefix("<=") {
                max = Some(v.parse::<ApiVersion>()?);
            } else if part.starts_with('<') || part.starts_with('>') {
                return Err(format!("unsupported range operator in '{}' (use >= or <=)", part));
            } else {
                exact.push(part.parse::<ApiVersion>()?);
            }
        }
        match (exact.is_empty(), min.is_some() || max.is_some()) {
            (false, true) => Err(format!("'{}' mixes exact versions with bounds", spec)),
            (false, false) => Ok(Self::Exact(exact)),
            _ => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(format!("empty range '{}'", spec));
                    }
                }
                Ok(Self::Bounded { min, max })
            }
        }
    }

    /// Parse a list of exact versions or a single spec.
    pub fn parse_list(specs: &[String]) -> Result<Self, String> {
        match specs {
            [] => Ok(Self::Any),
            [one] => Self::parse(one),
            many => {
                let versions = many
                    .iter()
                    .map(|s| s.trim().parse::<ApiVersion>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Exact(versions))
            }
        }
    }

    pub fn contains(&self, version: &ApiVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(list) => list.contains(version),
            Self::Bounded { min, max } => {
                min.is_none_or(|lo| *version >= lo) && max.is_none_or(|hi| *version <= hi)
            }
        }
    }

    /// Sort key for precedence: lower is more specific.
    ///
    /// Exact sets rank first (smaller sets first), then ranges bounded on
    /// both ends (narrower first), then half-open ranges, then `*`.
    pub fn specificity(&self) -> (u8, i64) {
        match self {
            Self::Exact(list) => (0, list.len() as i64),
            Self::Bounded {
                min: Some(lo),
                max: Some(hi),
            } => (1, hi.day_number() - lo.day_number()),
            Self::Bounded { .. } => (2, 0),
            Self::Any => (3, 0),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(list) => {
                let parts: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            Self::Bounded { min, max } => {
                let mut parts = Vec::new();
                if let Some(lo) = min {
                    parts.push(format!(">={}", lo));
                }
                if let Some(hi) = max {
                    parts.push(format!("<={}", hi));
                }
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}
