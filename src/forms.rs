//! Dashboard submissions and moderation
//!
//! Drafts start from the signed-in user (author and contact pre-filled), take
//! `key=value` fields and are validated before anything is sent. Every
//! successful mutation invalidates the cached pages of its resource.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{FetchError, RecordWriter};
use crate::auth::{AuthContext, Permissions};
use crate::query::CacheInvalidator;
use crate::records::Resource;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("not signed in (run `roster login` first)")]
    NotSignedIn,

    #[error("your account may not {0}")]
    Forbidden(&'static str),

    #[error("invalid field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("expected key=value, got '{0}'")]
    MalformedField(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

fn invalid(field: &str, reason: &str) -> DashboardError {
    DashboardError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Split `key=value` arguments. Values may contain `=`.
pub fn parse_fields(args: &[String]) -> Result<Vec<(String, String)>, DashboardError> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_lowercase(), value.trim().to_string()))
            }
            _ => Err(DashboardError::MalformedField(arg.clone())),
        })
        .collect()
}

/// A form that can be submitted through the dashboard.
pub trait Draft: Serialize + Sized {
    const RESOURCE: Resource;

    /// Empty draft with user-derived fields filled in
    fn from_context(auth: &AuthContext) -> Self;

    fn set(&mut self, key: &str, value: String) -> Result<(), DashboardError>;

    fn validate(&self) -> Result<(), DashboardError>;

    /// Build from context plus fields, then validate.
    fn build(auth: &AuthContext, fields: Vec<(String, String)>) -> Result<Self, DashboardError> {
        let mut draft = Self::from_context(auth);
        for (key, value) in fields {
            draft.set(&key, value)?;
        }
        draft.validate()?;
        Ok(draft)
    }
}

fn require(field: &str, value: &str) -> Result<(), DashboardError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "required"));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, DashboardError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid(field, "expected YYYY-MM-DD or an RFC 3339 timestamp"))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgencyApplication {
    pub name: String,
    pub description: String,
    pub category: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
}

impl Draft for AgencyApplication {
    const RESOURCE: Resource = Resource::Agencies;

    fn from_context(auth: &AuthContext) -> Self {
        Self {
            contact_name: auth.user_name().unwrap_or_default().to_string(),
            contact_email: auth.user_email().unwrap_or_default().to_string(),
            ..Default::default()
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), DashboardError> {
        match key {
            "name" => self.name = value,
            "description" => self.description = value,
            "category" => self.category = value,
            "location" => self.location = value,
            "website" => self.website = Some(value).filter(|v| !v.is_empty()),
            "contact_name" | "contact" => self.contact_name = value,
            "contact_email" | "email" => self.contact_email = value,
            other => return Err(DashboardError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DashboardError> {
        require("name", &self.name)?;
        require("description", &self.description)?;
        require("location", &self.location)?;
        require("contact_name", &self.contact_name)?;
        if !looks_like_email(&self.contact_email) {
            return Err(invalid("contact_email", "not an email address"));
        }
        if let Some(site) = &self.website
            && !(site.starts_with("http://") || site.starts_with("https://"))
        {
            return Err(invalid("website", "must start with http:// or https://"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BlogDraft {
    pub title: String,
    pub excerpt: String,
    /// HTML body
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: String,
}

impl Draft for BlogDraft {
    const RESOURCE: Resource = Resource::Blogs;

    fn from_context(auth: &AuthContext) -> Self {
        Self {
            author_id: auth.user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), DashboardError> {
        match key {
            "title" => self.title = value,
            "excerpt" => self.excerpt = value,
            "content" | "body" => self.content = value,
            "tags" => {
                self.tags = value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            other => return Err(DashboardError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DashboardError> {
        require("title", &self.title)?;
        require("content", &self.content)?;
        require("author_id", &self.author_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub organizer_id: String,
}

impl Draft for EventDraft {
    const RESOURCE: Resource = Resource::Events;

    fn from_context(auth: &AuthContext) -> Self {
        Self {
            organizer_id: auth.user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), DashboardError> {
        match key {
            "title" => self.title = value,
            "description" => self.description = value,
            "location" => self.location = value,
            "starts_at" | "start" => self.starts_at = Some(parse_datetime(key, &value)?),
            "ends_at" | "end" => self.ends_at = Some(parse_datetime(key, &value)?),
            other => return Err(DashboardError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DashboardError> {
        require("title", &self.title)?;
        require("location", &self.location)?;
        let starts_at = self.starts_at.ok_or_else(|| invalid("starts_at", "required"))?;
        if let Some(ends_at) = self.ends_at
            && ends_at < starts_at
        {
            return Err(invalid("ends_at", "before starts_at"));
        }
        Ok(())
    }
}

/// Which form `roster submit` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftKind {
    Agency,
    Blog,
    Event,
}

impl FromStr for DraftKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agency" | "agencies" => Ok(Self::Agency),
            "blog" | "blogs" | "post" => Ok(Self::Blog),
            "event" | "events" => Ok(Self::Event),
            other => Err(format!(
                "unknown form '{}' (expected agency, blog or event)",
                other
            )),
        }
    }
}

pub struct Dashboard<W> {
    writer: W,
    auth: AuthContext,
    caches: Vec<Arc<dyn CacheInvalidator>>,
}

impl<W: RecordWriter> Dashboard<W> {
    pub fn new(writer: W, auth: AuthContext) -> Self {
        Self {
            writer,
            auth,
            caches: Vec::new(),
        }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Register a cache to invalidate after mutations.
    #[cfg(test)]
    pub fn watch(&mut self, cache: Arc<dyn CacheInvalidator>) {
        self.caches.push(cache);
    }

    fn check(&self, required: Permissions, action: &'static str) -> Result<(), DashboardError> {
        if !self.auth.is_signed_in() {
            return Err(DashboardError::NotSignedIn);
        }
        if !self.auth.can(required) {
            return Err(DashboardError::Forbidden(action));
        }
        Ok(())
    }

    fn invalidate(&self, resource: Resource) {
        tracing::debug!("Invalidating cached {} pages", resource);
        for cache in &self.caches {
            cache.invalidate_resource(resource);
        }
    }

    /// Validate and create `draft`. Returns the stored record.
    pub async fn submit<D: Draft>(&self, draft: &D) -> Result<serde_json::Value, DashboardError> {
        self.check(Permissions::SUBMIT, "submit")?;
        draft.validate()?;

        let body = serde_json::to_value(draft).map_err(FetchError::from)?;
        let created = self.writer.create(D::RESOURCE, &body).await?;
        tracing::info!("Submitted new {} record", D::RESOURCE);
        self.invalidate(D::RESOURCE);
        Ok(created)
    }

    pub async fn approve(&self, resource: Resource, id: &str) -> Result<(), DashboardError> {
        self.check(Permissions::APPROVE, "approve records")?;
        self.writer.approve(resource, id).await?;
        tracing::info!("Approved {} {}", resource, id);
        self.invalidate(resource);
        Ok(())
    }

    pub async fn delete(&self, resource: Resource, id: &str) -> Result<(), DashboardError> {
        self.check(Permissions::DELETE, "delete records")?;
        self.writer.remove(resource, id).await?;
        tracing::info!("Deleted {} {}", resource, id);
        self.invalidate(resource);
        Ok(())
    }
}
