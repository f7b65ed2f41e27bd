//! Image reference normalization for cache import/export
//!
//! Accepts the familiar short forms (`alpine`, `user/app:1.2`) and expands
//! them to their canonical, fully qualified form with an explicit tag:
//!
//! | Input | Canonical |
//! |-------|-----------|
//! | `alpine` | `docker.io/library/alpine:latest` |
//! | `user/app:1.2` | `docker.io/user/app:1.2` |
//! | `localhost:5000/cache` | `localhost:5000/cache:latest` |
//! | `ghcr.io/org/app@sha256:…` | unchanged (digest pins the reference) |

use crate::error::{ControlError, ControlResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Registry assumed when a reference carries no domain
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Tag added to references that carry neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*(?::[0-9]+)?$",
    )
    .expect("domain pattern is valid")
});

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*$")
        .expect("path pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").expect("tag pattern is valid"));

static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
        .expect("digest pattern is valid")
});

static IMAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{64}$").expect("image id pattern is valid"));

/// A parsed, normalized image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parse a possibly-short reference, expanding the domain and official
    /// repository prefix. Does not add a default tag.
    pub fn parse_normalized(input: &str) -> ControlResult<Self> {
        if input.is_empty() {
            return Err(ControlError::parse(input, "repository name must have at least one component"));
        }
        if IMAGE_ID_RE.is_match(input) {
            return Err(ControlError::parse(
                input,
                "cannot specify 64-byte hexadecimal strings",
            ));
        }

        let (domain, remainder) = split_domain(input);

        // Name and tag are separated by the last ':' after the last '/'
        let (name_part, digest) = match remainder.split_once('@') {
            Some((name, digest)) => (name, Some(digest)),
            None => (remainder.as_str(), None),
        };
        let (path, tag) = match name_part.rfind(':') {
            Some(idx) => (&name_part[..idx], Some(&name_part[idx + 1..])),
            None => (name_part, None),
        };

        if path.to_lowercase() != path {
            return Err(ControlError::parse(input, "repository name must be lowercase"));
        }
        if !DOMAIN_RE.is_match(&domain) {
            return Err(ControlError::parse(input, format!("invalid domain {:?}", domain)));
        }
        if !PATH_RE.is_match(path) {
            return Err(ControlError::parse(input, "invalid repository path"));
        }
        if domain.len() + 1 + path.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(ControlError::parse(
                input,
                format!("repository name must not be more than {} characters", NAME_TOTAL_LENGTH_MAX),
            ));
        }
        if let Some(tag) = tag {
            if !TAG_RE.is_match(tag) {
                return Err(ControlError::parse(input, format!("invalid tag {:?}", tag)));
            }
        }
        if let Some(digest) = digest {
            if !DIGEST_RE.is_match(digest) {
                return Err(ControlError::parse(input, format!("invalid digest {:?}", digest)));
            }
        }

        Ok(Self {
            domain,
            path: path.to_string(),
            tag: tag.map(str::to_string),
            digest: digest.map(str::to_string),
        })
    }

    /// Add the default tag if the reference has neither tag nor digest
    pub fn with_default_tag(mut self) -> Self {
        if self.tag.is_none() && self.digest.is_none() {
            self.tag = Some(DEFAULT_TAG.to_string());
        }
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// `domain/path` without tag or digest
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_normalized(s)
    }
}

/// Canonical string form of a reference, with the default tag applied
pub fn normalize(input: &str) -> ControlResult<String> {
    Ok(Reference::parse_normalized(input)?
        .with_default_tag()
        .to_string())
}

/// Normalize an optional cache reference; empty means "not requested"
pub fn normalize_optional(input: &str) -> ControlResult<Option<String>> {
    if input.is_empty() {
        return Ok(None);
    }
    normalize(input).map(Some)
}

/// Split off the registry domain, defaulting to Docker Hub
fn split_domain(name: &str) -> (String, String) {
    let (mut domain, mut remainder) = match name.split_once('/') {
        Some((first, rest))
            if first.contains(['.', ':'])
                || first == "localhost"
                || first.to_lowercase() != first =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{}{}", OFFICIAL_REPO_PREFIX, remainder);
    }
    (domain, remainder)
}
