//! Record addresses and version addressing
//!
//! An address is a storage key of the form
//! `<prefix>/<type>/<name>[/instances/<id>][@<version>]`.
//!
//! - No version suffix: the working ("latest") version
//! - `@published`: the canonical public version
//! - Any other suffix: a caller-defined tag
//!
//! Latest and published are *propagating* versions: saving a record under one
//! of them rewrites every reference reachable from it to the same version.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::json::{for_each_ref_mut, REF_FIELD};

/// Separator between an address and its version tag
pub const VERSION_SEPARATOR: char = '@';

/// The canonical public version tag
pub const PUBLISHED: &str = "published";

/// Marker version used for pending schedule entries
pub const SCHEDULED: &str = "scheduled";

/// Path segment introducing an instance id
pub const INSTANCES_SEGMENT: &str = "instances";

// =============================================================================
// Version suffix functions
// =============================================================================

/// Remove any `@version` suffix
pub fn strip_version(address: &str) -> &str {
    match address.split_once(VERSION_SEPARATOR) {
        Some((base, _)) => base,
        None => address,
    }
}

/// The version tag of `address`, if any
///
/// An empty tag (`a/b@`) is treated as no tag.
pub fn version_of(address: &str) -> Option<&str> {
    address
        .split_once(VERSION_SEPARATOR)
        .map(|(_, version)| version)
        .filter(|version| !version.is_empty())
}

/// Replace (or add) the version suffix of `address`
///
/// `None` or an empty version strips the suffix.
pub fn with_version(address: &str, version: Option<&str>) -> String {
    let base = strip_version(address);
    match version.filter(|v| !v.is_empty()) {
        Some(version) => format!("{}{}{}", base, VERSION_SEPARATOR, version),
        None => base.to_string(),
    }
}

/// True iff the version suffix is absent or `published`
///
/// Named tags never propagate.
pub fn is_propagating(address: &str) -> bool {
    matches!(version_of(address), None | Some(PUBLISHED))
}

/// True if the address carries the `published` tag
pub fn is_published(address: &str) -> bool {
    version_of(address) == Some(PUBLISHED)
}

/// True if the address points at a component/layout instance
pub fn is_instance(address: &str) -> bool {
    Address::parse(address).map_or(false, |parsed| parsed.instance.is_some())
}

/// Rewrite every `_ref` address reachable in `document` to carry `version`
///
/// Only objects carrying the reference marker are touched. `None` strips the
/// suffix, which is how the latest version is expressed.
pub fn propagate_version(version: Option<&str>, document: &mut Value) {
    for_each_ref_mut(document, &mut |node| {
        if let Some(Value::String(address)) = node.get_mut(REF_FIELD) {
            *address = with_version(address, version);
        }
    });
}

// =============================================================================
// Typed addresses
// =============================================================================

/// The record type an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `<prefix>/components/<name>`
    Component,
    /// `<prefix>/layouts/<name>`
    Layout,
    /// `<prefix>/pages/<id>`
    Page,
    /// `<prefix>/uris/<encoded url>`
    Uri,
    /// `<prefix>/schedule/<id>`
    Schedule,
}

impl RecordKind {
    /// All kinds
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Component,
        RecordKind::Layout,
        RecordKind::Page,
        RecordKind::Uri,
        RecordKind::Schedule,
    ];

    /// The path segment naming this kind
    pub fn segment(&self) -> &'static str {
        match self {
            RecordKind::Component => "components",
            RecordKind::Layout => "layouts",
            RecordKind::Page => "pages",
            RecordKind::Uri => "uris",
            RecordKind::Schedule => "schedule",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.segment() == segment)
    }

    /// Components and layouts are composed through reference fields
    pub fn is_composable(&self) -> bool {
        matches!(self, RecordKind::Component | RecordKind::Layout)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// A parsed address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Site prefix, e.g. `example.com/blog`
    pub prefix: String,
    /// Record type
    pub kind: RecordKind,
    /// Component/layout name, page id, encoded url or schedule id
    pub name: String,
    /// Instance id for component/layout instances
    pub instance: Option<String>,
    /// Version tag
    pub version: Option<String>,
}

impl Address {
    /// Parse an address
    ///
    /// The record type is read from the right: `<type>/<name>` ends the
    /// address, or `<type>/<name>/instances/<id>` for an instance. Everything
    /// before the type segment is the site prefix, so prefixes may contain
    /// type words.
    ///
    /// # Errors
    ///
    /// Returns a client error if no record type segment is present or the
    /// name is missing.
    pub fn parse(address: &str) -> Result<Self> {
        let base = strip_version(address);
        let segments: Vec<&str> = base.split('/').collect();
        let not_a_record = || Error::client(format!("'{}' is not a record address", address));

        let (position, instance) = match segments.as_slice() {
            [.., kind, _, INSTANCES_SEGMENT, id]
                if !id.is_empty()
                    && RecordKind::from_segment(kind).map_or(false, |k| k.is_composable()) =>
            {
                (segments.len() - 4, Some(id.to_string()))
            }
            [.., kind, _] if RecordKind::from_segment(kind).is_some() => (segments.len() - 2, None),
            _ => return Err(not_a_record()),
        };
        let kind = RecordKind::from_segment(segments[position]).ok_or_else(not_a_record)?;
        let name = segments[position + 1];
        if name.is_empty() {
            return Err(Error::client(format!("'{}' has no record name", address)));
        }

        Ok(Address {
            prefix: segments[..position].join("/"),
            kind,
            name: name.to_string(),
            instance,
            version: version_of(address).map(str::to_string),
        })
    }

    /// Build a component address
    pub fn component(prefix: &str, name: &str) -> Self {
        Self::new(prefix, RecordKind::Component, name)
    }

    /// Build a layout address
    pub fn layout(prefix: &str, name: &str) -> Self {
        Self::new(prefix, RecordKind::Layout, name)
    }

    /// Build a page address
    pub fn page(prefix: &str, id: &str) -> Self {
        Self::new(prefix, RecordKind::Page, id)
    }

    fn new(prefix: &str, kind: RecordKind, name: &str) -> Self {
        Address {
            prefix: prefix.to_string(),
            kind,
            name: name.to_string(),
            instance: None,
            version: None,
        }
    }

    /// This address with an instance id
    pub fn with_instance(mut self, id: impl Into<String>) -> Self {
        self.instance = Some(id.into());
        self
    }

    /// This address with a version tag
    pub fn at_version(mut self, version: Option<&str>) -> Self {
        self.version = version.filter(|v| !v.is_empty()).map(str::to_string);
        self
    }

    /// The address without instance id or version, e.g. the component's default data
    pub fn base(&self) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}", self.kind, self.name)
        } else {
            format!("{}/{}/{}", self.prefix, self.kind, self.name)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base())?;
        if let Some(instance) = &self.instance {
            write!(f, "/{}/{}", INSTANCES_SEGMENT, instance)?;
        }
        if let Some(version) = &self.version {
            write!(f, "{}{}", VERSION_SEPARATOR, version)?;
        }
        Ok(())
    }
}

/// The record kind of `address`, if it is a record address
pub fn kind_of(address: &str) -> Option<RecordKind> {
    Address::parse(address).ok().map(|parsed| parsed.kind)
}

/// True if `address` names a component or layout
pub fn is_composable(address: &str) -> bool {
    kind_of(address).map_or(false, |kind| kind.is_composable())
}

/// The component name of a component address
pub fn component_name(address: &str) -> Option<String> {
    Address::parse(address)
        .ok()
        .filter(|parsed| parsed.kind == RecordKind::Component)
        .map(|parsed| parsed.name)
}

// =============================================================================
// Public URLs
// =============================================================================

fn strip_protocol(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// True if `url` has an http(s) protocol and a host
pub fn is_url(url: &str) -> bool {
    let stripped = strip_protocol(url);
    stripped.len() < url.len() && !stripped.is_empty() && !stripped.starts_with('/')
}

/// The uri address that points from a public URL to its page
///
/// The protocol is dropped so http and https share one pointer. The url-safe
/// base64 alphabet keeps the encoded url a single path segment.
pub fn url_to_uri(prefix: &str, url: &str) -> String {
    format!(
        "{}/{}/{}",
        prefix,
        RecordKind::Uri.segment(),
        URL_SAFE.encode(strip_protocol(url))
    )
}

/// Decode a uri address back to its public URL (without protocol)
///
/// # Errors
///
/// Returns a client error if `uri` is not a uri address or is not valid base64.
pub fn uri_to_url(uri: &str) -> Result<String> {
    let parsed = Address::parse(uri)?;
    if parsed.kind != RecordKind::Uri {
        return Err(Error::client(format!("'{}' is not a uri address", uri)));
    }
    let bytes = URL_SAFE
        .decode(parsed.name.as_bytes())
        .map_err(|e| Error::client(format!("'{}' has an invalid encoding: {}", uri, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::client(format!("'{}' does not decode to text: {}", uri, e)))
}
