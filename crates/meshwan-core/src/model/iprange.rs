// ── IP range domain type ──
//
// Allocation logic lives in `crate::ipalloc`; this module is the
// persisted shape.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::common::Metadata;
use crate::error::{CoreError, Result};
use crate::ipalloc::Bitmap;

/// A window of last-octet suffixes inside a /24 base subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRange {
    pub metadata: Metadata,
    pub spec: IpRangeSpec,
    #[serde(default)]
    pub status: IpRangeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeSpec {
    /// IPv4 address whose first three octets form the base.
    pub subnet: String,
    pub min_ip: u8,
    pub max_ip: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeStatus {
    #[serde(default)]
    pub masks: Bitmap,
    /// Allocated suffix -> owning entity.
    #[serde(default)]
    pub data: BTreeMap<u8, String>,
}

impl IpRangeSpec {
    pub fn validate(&self) -> Result<()> {
        self.base()?;
        if self.min_ip == 0 {
            return Err(CoreError::validation("minIp must be between 1 and 255"));
        }
        if self.min_ip > self.max_ip {
            return Err(CoreError::validation(format!(
                "minIp {} is greater than maxIp {}",
                self.min_ip, self.max_ip
            )));
        }
        Ok(())
    }

    /// The three leading octets shared by every address in the range.
    pub fn base(&self) -> Result<[u8; 3]> {
        let addr: Ipv4Addr = self
            .subnet
            .split('/')
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| CoreError::validation(format!("invalid subnet '{}'", self.subnet)))?;
        let [a, b, c, _] = addr.octets();
        Ok([a, b, c])
    }
}

impl IpRange {
    pub fn new(name: impl Into<String>, subnet: impl Into<String>, min_ip: u8, max_ip: u8) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec: IpRangeSpec {
                subnet: subnet.into(),
                min_ip,
                max_ip,
            },
            status: IpRangeStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
