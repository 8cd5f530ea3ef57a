//! Instance placement (availability zone and region) for EFS.

use std::time::Duration;

use netvol_common::{NetvolError, NetvolResult};
use serde::Deserialize;

const IDENTITY_DOCUMENT: &str = "/latest/dynamic/instance-identity/document";

/// Default instance metadata endpoint.
pub const METADATA_ENDPOINT: &str = "http://169.254.169.254";

/// Where the instance runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Placement {
    /// Availability zone, e.g. `us-east-1a`.
    #[serde(rename = "availabilityZone")]
    pub availability_zone: String,
    /// Region, e.g. `us-east-1`.
    pub region: String,
}

/// Supplies the instance placement.
pub trait PlacementSource {
    /// Fetch the placement.
    fn placement(&self) -> NetvolResult<Placement>;
}

/// Fixed placement, for hosts without a metadata service.
#[derive(Debug, Clone)]
pub struct StaticPlacement(pub Placement);

impl PlacementSource for StaticPlacement {
    fn placement(&self) -> NetvolResult<Placement> {
        Ok(self.0.clone())
    }
}

/// Reads the EC2 instance identity document.
#[derive(Debug, Clone)]
pub struct Ec2Metadata {
    endpoint: String,
    timeout: Duration,
}

impl Default for Ec2Metadata {
    fn default() -> Self {
        Self {
            endpoint: METADATA_ENDPOINT.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Ec2Metadata {
    /// Use a different metadata endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl PlacementSource for Ec2Metadata {
    fn placement(&self) -> NetvolResult<Placement> {
        let metadata_err = |e: reqwest::Error| NetvolError::Metadata {
            message: e.to_string(),
        };
        let url = format!("{}{IDENTITY_DOCUMENT}", self.endpoint.trim_end_matches('/'));
        tracing::debug!(%url, "Fetching instance identity document");

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(metadata_err)?;
        let placement: Placement = client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(metadata_err)?
            .json()
            .map_err(metadata_err)?;

        tracing::info!(
            availability_zone = %placement.availability_zone,
            region = %placement.region,
            "Resolved instance placement"
        );
        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_document_shape() {
        let doc = r#"{"accountId":"123456789012","availabilityZone":"eu-west-1b",
                      "instanceId":"i-0abc","region":"eu-west-1"}"#;
        let placement: Placement = serde_json::from_str(doc).unwrap();
        assert_eq!(placement.availability_zone, "eu-west-1b");
        assert_eq!(placement.region, "eu-west-1");
    }

    #[test]
    fn unreachable_endpoint_is_metadata_error() {
        let source = Ec2Metadata::default()
            .with_endpoint("http://127.0.0.1:9")
            .with_timeout(Duration::from_millis(200));
        let err = source.placement().unwrap_err();
        assert!(err.is_fatal());
    }
}
