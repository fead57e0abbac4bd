//! Reporting endpoint variants
//!
//! Both variants speak the same job/page protocol and differ only in host:
//!
//! - **WEB**: web isolation usage data
//! - **URL**: URL isolation usage data

use std::fmt;
use std::str::FromStr;

/// Reporting endpoint selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Web isolation reporting
    Web,
    /// URL isolation reporting
    Url,
}

impl EndpointKind {
    /// All supported endpoint kinds
    pub const ALL: [EndpointKind; 2] = [EndpointKind::Web, EndpointKind::Url];

    /// Usage-data URL for this endpoint
    pub fn base_url(&self) -> &'static str {
        match self {
            EndpointKind::Web => "https://proofpointisolation.com/api/v2/reporting/usage-data",
            EndpointKind::Url => "https://urlisolation.com/api/v2/reporting/usage-data",
        }
    }

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Web => "WEB",
            EndpointKind::Url => "URL",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WEB" => Ok(EndpointKind::Web),
            "URL" => Ok(EndpointKind::Url),
            _ => Err(format!("Invalid endpoint: {s}. Valid options: WEB, URL")),
        }
    }
}
