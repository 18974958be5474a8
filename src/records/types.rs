use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Record, Resource, Status, de_id};
use crate::constants::{DEFAULT_IMAGE, EXCERPT_LENGTH, NOT_AVAILABLE, UNKNOWN};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agency {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl Agency {
    pub fn logo_or_default(&self) -> &str {
        non_empty(&self.logo).unwrap_or(DEFAULT_IMAGE)
    }

    pub fn location_or_na(&self) -> &str {
        non_empty(&self.location).unwrap_or(NOT_AVAILABLE)
    }
}

impl Record for Agency {
    const RESOURCE: Resource = Resource::Agencies;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.name).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        self.location_or_na().to_string()
    }

    fn search_fields(&self) -> Vec<&str> {
        [&self.name, &self.description, &self.category, &self.location]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect()
    }

    fn image(&self) -> Option<&str> {
        Some(self.logo_or_default())
    }

    fn summary(&self) -> Option<String> {
        non_empty(&self.description).map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl Member {
    pub fn avatar_or_default(&self) -> &str {
        non_empty(&self.avatar).unwrap_or(DEFAULT_IMAGE)
    }
}

impl Record for Member {
    const RESOURCE: Resource = Resource::Members;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.full_name).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        non_empty(&self.university)
            .or(non_empty(&self.country))
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    }

    fn search_fields(&self) -> Vec<&str> {
        [&self.full_name, &self.university, &self.country]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect()
    }

    fn image(&self) -> Option<&str> {
        Some(self.avatar_or_default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blog {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    /// HTML body
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Status,
}

impl Blog {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|a| non_empty(&a.name))
            .unwrap_or(UNKNOWN)
    }

    pub fn cover_or_default(&self) -> &str {
        non_empty(&self.cover_image).unwrap_or(DEFAULT_IMAGE)
    }

    /// Explicit excerpt, or the first words of the rendered body
    pub fn excerpt_text(&self) -> String {
        match non_empty(&self.excerpt) {
            Some(e) => e.to_string(),
            None => self
                .content
                .as_deref()
                .map(excerpt_from_html)
                .unwrap_or_default(),
        }
    }
}

impl Record for Blog {
    const RESOURCE: Resource = Resource::Blogs;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.title).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        format!("{} · {}", self.author_name(), format_date(self.published_at))
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = [&self.title, &self.excerpt]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect();
        fields.extend(self.tags.iter().map(String::as_str));
        fields
    }

    fn image(&self) -> Option<&str> {
        Some(self.cover_or_default())
    }

    fn summary(&self) -> Option<String> {
        Some(self.excerpt_text()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl Event {
    pub fn image_or_default(&self) -> &str {
        non_empty(&self.image).unwrap_or(DEFAULT_IMAGE)
    }
}

impl Record for Event {
    const RESOURCE: Resource = Resource::Events;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.title).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        format!(
            "{} · {}",
            format_date(self.starts_at),
            non_empty(&self.location).unwrap_or(NOT_AVAILABLE)
        )
    }

    fn search_fields(&self) -> Vec<&str> {
        [&self.title, &self.description, &self.location]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect()
    }

    fn image(&self) -> Option<&str> {
        Some(self.image_or_default())
    }

    fn summary(&self) -> Option<String> {
        let mut when = format_date(self.starts_at);
        if self.ends_at.is_some() {
            when = format!("{} - {}", when, format_date(self.ends_at));
        }
        Some(match non_empty(&self.description) {
            Some(description) => format!("{}. {}", when, description),
            None => when,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct News {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// HTML body
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Status,
}

impl News {
    pub fn summary_text(&self) -> String {
        match non_empty(&self.summary) {
            Some(s) => s.to_string(),
            None => self
                .content
                .as_deref()
                .map(excerpt_from_html)
                .unwrap_or_default(),
        }
    }
}

impl Record for News {
    const RESOURCE: Resource = Resource::News;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.title).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        format_date(self.published_at)
    }

    fn image(&self) -> Option<&str> {
        Some(non_empty(&self.image).unwrap_or(DEFAULT_IMAGE))
    }

    fn summary(&self) -> Option<String> {
        Some(self.summary_text()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Public verification code printed on the certificate
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub holder_name: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub status: Status,
}

impl Certificate {
    pub fn code_or_id(&self) -> &str {
        non_empty(&self.code).unwrap_or(&self.id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl Record for Certificate {
    const RESOURCE: Resource = Resource::Certificates;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn display_name(&self) -> &str {
        non_empty(&self.holder_name).unwrap_or(UNKNOWN)
    }

    fn detail(&self) -> String {
        non_empty(&self.program).unwrap_or(NOT_AVAILABLE).to_string()
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Format an optional timestamp as a short date, "N/A" when absent
pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Render HTML to plain text and cut it down to an excerpt
fn excerpt_from_html(html: &str) -> String {
    let text = html2text::config::plain()
        .string_from_read(html.as_bytes(), 1000)
        .unwrap_or_else(|_| html.to_string());
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= EXCERPT_LENGTH {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(EXCERPT_LENGTH).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids() {
        let a: Agency = serde_json::from_str(r#"{"id": 42, "name": "Tokyo Study"}"#).unwrap();
        assert_eq!(a.id, "42");
        let a: Agency = serde_json::from_str(r#"{"id": "ag-7"}"#).unwrap();
        assert_eq!(a.id, "ag-7");
    }

    #[test]
    fn test_agency_fallbacks() {
        let a: Agency = serde_json::from_str(r#"{"id": 1, "name": "  ", "logo": null}"#).unwrap();
        assert_eq!(a.display_name(), "Unknown");
        assert_eq!(a.logo_or_default(), DEFAULT_IMAGE);
        assert_eq!(a.location_or_na(), "N/A");
        assert_eq!(a.status(), Status::Pending);
    }

    #[test]
    fn test_blog_author_fallback() {
        let b: Blog = serde_json::from_str(r#"{"id": 3, "title": "Visa tips"}"#).unwrap();
        assert_eq!(b.author_name(), "Unknown");
        assert!(b.detail().starts_with("Unknown · N/A"));

        let b: Blog =
            serde_json::from_str(r#"{"id": 3, "author": {"name": "Aiko"}, "status": "APPROVED"}"#)
                .unwrap();
        assert_eq!(b.author_name(), "Aiko");
        assert_eq!(b.status(), Status::Approved);
    }

    #[test]
    fn test_blog_excerpt_from_html() {
        let b = Blog {
            id: "1".to_string(),
            content: Some("<p>Hello <b>world</b></p>".to_string()),
            ..Default::default()
        };
        assert_eq!(b.excerpt_text(), "Hello world");
    }

    #[test]
    fn test_agency_search_fields_skip_missing() {
        let a = Agency {
            id: "1".to_string(),
            name: Some("Sakura".to_string()),
            location: Some("Osaka".to_string()),
            ..Default::default()
        };
        assert_eq!(a.search_fields(), vec!["Sakura", "Osaka"]);
    }

    #[test]
    fn test_certificate_expiry() {
        let now = Utc::now();
        let c = Certificate {
            id: "9".to_string(),
            expires_at: Some(now - chrono::Duration::days(1)),
            ..Default::default()
        };
        assert!(c.is_expired(now));
        assert_eq!(c.code_or_id(), "9");
    }

    #[test]
    fn test_event_summary() {
        let e: Event = serde_json::from_str(
            r#"{"id": 5, "starts_at": "2025-04-01T09:00:00Z", "ends_at": "2025-04-02T17:00:00Z",
                "description": "Spring fair"}"#,
        )
        .unwrap();
        assert_eq!(
            e.summary().as_deref(),
            Some("Apr 01, 2025 - Apr 02, 2025. Spring fair")
        );
        assert_eq!(e.image(), Some(DEFAULT_IMAGE));
    }

    #[test]
    fn test_blog_tags_are_searchable() {
        let b: Blog =
            serde_json::from_str(r#"{"id": 1, "title": "Visas", "tags": ["japan", "work"]}"#)
                .unwrap();
        assert_eq!(b.search_fields(), vec!["Visas", "japan", "work"]);
        assert!(b.summary().is_none());
    }
}
