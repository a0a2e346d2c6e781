// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Processor identification
//!
//! Decode engines need to know the exact processor a trace was collected on,
//! since packet interpretation differs between microarchitectures. The
//! session layer fetches a [`CpuInfo`] once per session and passes it to
//! every decode call; postmortem bundles carry it verbatim.

use core::fmt;

/// Identifier of a logical cpu
pub type Id = u32;

/// Identification of the processor a trace was collected on
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuInfo {
    pub vendor: Vendor,
    pub family: u16,
    pub model: u8,
    pub stepping: u8,
}

/// Cpu vendor as reported by CPUID
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Vendor {
    #[serde(rename = "GenuineIntel")]
    Intel,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Any vendor string other than the well-known ones maps to [`Unknown`][Vendor::Unknown]
impl<'de> serde::Deserialize<'de> for Vendor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = <String as serde::Deserialize>::deserialize(deserializer)?;
        if name == "GenuineIntel" {
            Ok(Self::Intel)
        } else {
            Ok(Self::Unknown)
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intel => write!(f, "GenuineIntel"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
