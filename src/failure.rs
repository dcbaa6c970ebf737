use serde::{Deserialize, Serialize};
use std::fmt;

use crate::publish::PublishError;

/// Closed taxonomy for publish-step failures.
///
/// Advisory metadata stored alongside the failed record; the pipeline is
/// what makes a classified failure terminal, not this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    DurationExceeded,
    SizeExceeded,
    Forbidden,
    UnsupportedFormat,
    RateLimited,
    ClientError,
    ServerError,
    Unknown,
}

impl ReasonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCategory::DurationExceeded => "duration_exceeded",
            ReasonCategory::SizeExceeded => "size_exceeded",
            ReasonCategory::Forbidden => "forbidden",
            ReasonCategory::UnsupportedFormat => "unsupported_format",
            ReasonCategory::RateLimited => "rate_limited",
            ReasonCategory::ClientError => "client_error",
            ReasonCategory::ServerError => "server_error",
            ReasonCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a publish error onto the taxonomy.
///
/// The publish collaborator exposes no structured error codes, so the rules
/// below are substring matches over its message plus whatever status code
/// came with the response. Categories are checked in priority order; the
/// first hit wins.
pub fn classify(error: &PublishError) -> ReasonCategory {
    let message = error.message.to_lowercase();
    let status = error.status;

    if message.contains("video longer than")
        || message.contains("duration limit")
        || message.contains("video too long")
    {
        return ReasonCategory::DurationExceeded;
    }

    if status == Some(413)
        || message.contains("file too large")
        || message.contains("media too big")
        || message.contains("size limit")
    {
        return ReasonCategory::SizeExceeded;
    }

    if status == Some(401)
        || status == Some(403)
        || message.contains("forbidden")
        || message.contains("unauthorized")
        || message.contains("permission denied")
    {
        return ReasonCategory::Forbidden;
    }

    if status == Some(415)
        || message.contains("unsupported")
        || message.contains("invalid media format")
        || message.contains("cannot process media")
    {
        return ReasonCategory::UnsupportedFormat;
    }

    if status == Some(429) || message.contains("rate limit") || message.contains("too many requests")
    {
        return ReasonCategory::RateLimited;
    }

    match status {
        Some(code) if (400..500).contains(&code) => ReasonCategory::ClientError,
        Some(code) if (500..600).contains(&code) => ReasonCategory::ServerError,
        _ => ReasonCategory::Unknown,
    }
}
