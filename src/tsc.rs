// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Timestamp counter conversion
//!
//! Trace packets carry raw TSC values. A [`Conversion`] holds the parameters
//! published by the kernel's perf subsystem for converting those counters to
//! nanoseconds since an epoch, and back. Whether a conversion is available
//! depends on the tracing host; sessions treat it as optional throughout.

use core::num::NonZeroU32;

use serde::{Deserialize, Deserializer};

#[cfg(test)]
mod tests;

/// Parameters for converting between TSC values and wall clock nanoseconds
///
/// These are the `time_mult`, `time_shift` and `time_zero` values exposed by
/// the Linux perf subsystem. The conversion formulas mirror the kernel's
/// fixed point arithmetic exactly, including its wrapping behaviour, so that
/// timestamps agree with those computed by other tooling on the same data.
/// The formulas cannot shift by the full TSC width, so deserialization
/// rejects shift widths of `64` and above.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub time_mult: NonZeroU32,
    #[serde(deserialize_with = "deserialize_shift")]
    pub time_shift: u16,
    pub time_zero: u64,
}

impl Conversion {
    /// Convert a raw TSC value to nanoseconds since the epoch
    pub fn to_nanos(&self, tsc: u64) -> u64 {
        let mult = u64::from(self.time_mult.get());
        let quot = tsc >> self.time_shift;
        let rem = tsc & ((1u64 << self.time_shift) - 1);
        self.time_zero
            .wrapping_add(quot.wrapping_mul(mult))
            .wrapping_add(rem.wrapping_mul(mult) >> self.time_shift)
    }

    /// Convert nanoseconds since the epoch back to a raw TSC value
    ///
    /// Times before the zero point are clamped to it.
    pub fn to_tsc(&self, nanos: u64) -> u64 {
        let mult = u64::from(self.time_mult.get());
        let time = nanos.saturating_sub(self.time_zero);
        let quot = time / mult;
        let rem = time % mult;
        (quot << self.time_shift).wrapping_add((rem << self.time_shift) / mult)
    }
}

/// Deserialize a shift width the conversion formulas can shift by
fn deserialize_shift<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let shift = u16::deserialize(deserializer)?;
    if u32::from(shift) >= u64::BITS {
        return Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Unsigned(shift.into()),
            &"a shift width below 64",
        ));
    }
    Ok(shift)
}
