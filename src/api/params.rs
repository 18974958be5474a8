//! Query parameters and the cache keys derived from them.

use std::fmt;

use crate::records::{Resource, Status};

/// A primitive query parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ParamValue {
    /// Tagged form used in cache keys so `"1"` and `1` never collide
    fn key_form(&self) -> String {
        match self {
            Self::Str(s) => format!("s:{}", s),
            Self::Int(n) => format!("i:{}", n),
            Self::Bool(b) => format!("b:{}", b),
        }
    }

    pub fn is_empty_str(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Ordered list of `name=value` pairs sent with a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, ParamValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard list parameters for one page of a filter session.
    pub fn for_page(search: &str, page: u32, limit: u32, status: Option<Status>) -> Self {
        let mut params = Self::new()
            .with("search", search)
            .with("page", page.max(1))
            .with("limit", limit);
        if let Some(status) = status {
            params = params.with("status", status.as_str());
        }
        params
    }

    /// Set a parameter, replacing any earlier value with the same name
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| n == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name.to_string(), value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn page(&self) -> Option<u32> {
        match self.get("page") {
            Some(ParamValue::Int(n)) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Pairs as sent over HTTP. Empty strings are omitted.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter(|(_, v)| !v.is_empty_str())
            .map(|(n, v)| (n.clone(), v.to_string()))
            .collect()
    }

    /// Order-independent cache key for this parameter set on `resource`.
    pub fn cache_key(&self, resource: Resource) -> CacheKey {
        let mut pairs: Vec<(String, String)> = self
            .pairs
            .iter()
            .map(|(n, v)| (n.clone(), v.key_form()))
            .collect();
        pairs.sort();
        CacheKey { resource, pairs }
    }
}

/// Stable identity of a request: the resource plus its sorted parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource: Resource,
    pairs: Vec<(String, String)>,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?", self.resource)?;
        for (i, (n, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", n, v)?;
        }
        Ok(())
    }
}
