//! Dependency Declaration and Dependency Specification grammar (spec §3),
//! and reserved type tags (spec §4.6, supplemented per SPEC_FULL.md §F.5).

use std::fmt;

/// Reserved dependency type tags forwarded to a specific manager rather than
/// resolved against the Provider/Client Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedTag {
    Pool,
    Xstream,
    Group,
}

impl ReservedTag {
    #[must_use]
    pub fn parse(type_tag: &str) -> Option<Self> {
        match type_tag {
            "pool" => Some(Self::Pool),
            "xstream" => Some(Self::Xstream),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Xstream => "xstream",
            Self::Group => "group",
        }
    }
}

/// A record `{ name, type, is_array, is_required, is_updatable }` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DependencyDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_updatable: bool,
}

/// A parsed locator from a dependency specification's `@locator` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `local` — the current engine's self address.
    Local,
    /// Pure decimal digits — an MPI-style rank to resolve via the
    /// membership table.
    Rank(u32),
    /// A `ssg://<name>/[#]<integer>` group URL.
    Group { group: String, id: u64, by_member_id: bool },
    /// Anything else — a raw engine address.
    RawAddress(String),
}

/// A parsed dependency specification, per the grammar in spec §3:
/// `spec := ident [ ':' providerId ] [ '@' locator ]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub ident: String,
    pub provider_id: Option<u16>,
    pub locator: Option<Locator>,
}

#[derive(Debug, thiserror::Error)]
pub enum DependencySpecParseError {
    #[error("empty dependency specification")]
    Empty,
    #[error("invalid identifier in dependency specification: {0:?}")]
    InvalidIdent(String),
    #[error("invalid provider id in dependency specification: {0:?}")]
    InvalidProviderId(String),
    #[error("invalid locator in dependency specification: {0:?}")]
    InvalidLocator(String),
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident)?;
        if let Some(id) = self.provider_id {
            write!(f, ":{id}")?;
        }
        match &self.locator {
            None => {}
            Some(Locator::Local) => write!(f, "@local")?,
            Some(Locator::Rank(r)) => write!(f, "@{r}")?,
            Some(Locator::Group { group, id, by_member_id }) => {
                write!(f, "@ssg://{group}/{}{id}", if *by_member_id { "#" } else { "" })?;
            }
            Some(Locator::RawAddress(addr)) => write!(f, "@{addr}")?,
        }
        Ok(())
    }
}

impl DependencySpec {
    /// Parse a specification string per the grammar in spec §3.
    ///
    /// # Errors
    /// Returns `DependencySpecParseError` when the string does not match
    /// the grammar (empty input, malformed identifier, non-numeric
    /// `providerId`, or a malformed group URL under `@`).
    pub fn parse(raw: &str) -> Result<Self, DependencySpecParseError> {
        if raw.is_empty() {
            return Err(DependencySpecParseError::Empty);
        }

        let (before_at, locator_raw) = match raw.split_once('@') {
            Some((a, b)) => (a, Some(b)),
            None => (raw, None),
        };

        let (ident, provider_id) = match before_at.split_once(':') {
            Some((id, pid)) => {
                let pid: u16 = pid
                    .parse()
                    .map_err(|_| DependencySpecParseError::InvalidProviderId(pid.to_owned()))?;
                (id, Some(pid))
            }
            None => (before_at, None),
        };

        if !is_valid_ident(ident) {
            return Err(DependencySpecParseError::InvalidIdent(ident.to_owned()));
        }

        let locator = locator_raw.map(parse_locator).transpose()?;

        Ok(Self {
            ident: ident.to_owned(),
            provider_id,
            locator,
        })
    }
}

fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_locator(raw: &str) -> Result<Locator, DependencySpecParseError> {
    if raw == "local" {
        return Ok(Locator::Local);
    }
    if let Ok(rank) = raw.parse::<u32>() {
        return Ok(Locator::Rank(rank));
    }
    if let Some(rest) = raw.strip_prefix("ssg://") {
        let (group, suffix) = rest
            .split_once('/')
            .ok_or_else(|| DependencySpecParseError::InvalidLocator(raw.to_owned()))?;
        if group.is_empty() {
            return Err(DependencySpecParseError::InvalidLocator(raw.to_owned()));
        }
        let (by_member_id, digits) = match suffix.strip_prefix('#') {
            Some(d) => (true, d),
            None => (false, suffix),
        };
        let id: u64 = digits
            .parse()
            .map_err(|_| DependencySpecParseError::InvalidLocator(raw.to_owned()))?;
        return Ok(Locator::Group {
            group: group.to_owned(),
            id,
            by_member_id,
        });
    }
    Ok(Locator::RawAddress(raw.to_owned()))
}
