//! Directory records (agencies, members, posts, events, news, certificates)
//!
//! Every entity is a plain struct whose optional fields default when the API
//! omits them; display helpers substitute placeholders instead of failing.

pub mod types;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub use types::{Agency, Blog, Certificate, Event, Member, News};

/// Approval state of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Approved,
    #[default]
    Pending,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Pending => "PENDING",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API collections this client knows how to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Agencies,
    Members,
    Blogs,
    Events,
    News,
    Certificates,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Self::Agencies,
        Self::Members,
        Self::Blogs,
        Self::Events,
        Self::News,
        Self::Certificates,
    ];

    /// Path segment under the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            Self::Agencies => "agencies",
            Self::Members => "members",
            Self::Blogs => "blogs",
            Self::Events => "events",
            Self::News => "news",
            Self::Certificates => "certificates",
        }
    }

    /// Status every record of the public listing must carry, if any.
    pub fn listing_status(&self) -> Option<Status> {
        match self {
            Self::Agencies | Self::Members | Self::Blogs | Self::Events => Some(Status::Approved),
            Self::News | Self::Certificates => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agencies" | "agency" => Ok(Self::Agencies),
            "members" | "member" => Ok(Self::Members),
            "blogs" | "blog" | "posts" => Ok(Self::Blogs),
            "events" | "event" => Ok(Self::Events),
            "news" => Ok(Self::News),
            "certificates" | "certificate" | "certs" => Ok(Self::Certificates),
            other => {
                let known: Vec<&str> = Resource::ALL.iter().map(Resource::path).collect();
                Err(format!(
                    "unknown resource '{}' (expected one of: {})",
                    other,
                    known.join(", ")
                ))
            }
        }
    }
}

/// Common surface the listing core needs from an entity.
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    const RESOURCE: Resource;

    fn id(&self) -> &str;

    fn status(&self) -> Status;

    /// Name used for sorting and as the list title
    fn display_name(&self) -> &str;

    /// Secondary column shown next to the name
    fn detail(&self) -> String;

    /// Fields matched by client-side text filtering
    fn search_fields(&self) -> Vec<&str> {
        vec![self.display_name()]
    }

    /// Image shown with the record, placeholder included
    fn image(&self) -> Option<&str> {
        None
    }

    /// Longer plain-text blurb for detailed listings
    fn summary(&self) -> Option<String> {
        None
    }
}

/// Deserialize an id that the API may send as a number or a string.
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Num(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_unknown_values() {
        let s: Status = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(s, Status::Approved);
        let s: Status = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(s, Status::Unknown);
    }

    #[test]
    fn test_resource_from_str() {
        assert_eq!("Agencies".parse::<Resource>(), Ok(Resource::Agencies));
        assert_eq!("blog".parse::<Resource>(), Ok(Resource::Blogs));
        let err = "widgets".parse::<Resource>().unwrap_err();
        assert!(err.contains("agencies, members, blogs, events, news, certificates"));
        for resource in Resource::ALL {
            assert_eq!(resource.path().parse::<Resource>(), Ok(resource));
        }
    }

    #[test]
    fn test_listing_status() {
        assert_eq!(Resource::Agencies.listing_status(), Some(Status::Approved));
        assert_eq!(Resource::News.listing_status(), None);
    }
}
