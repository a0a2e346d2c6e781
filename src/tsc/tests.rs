// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

#[test]
fn aligned_round_trip() {
    let conversion = conversion(1000, 10, 1_000_000);

    let nanos = conversion.to_nanos(2048);
    assert_eq!(nanos, 1_002_000);
    assert_eq!(conversion.to_tsc(nanos), 2048);
}

#[test]
fn unaligned_round_trip() {
    let conversion = conversion(1000, 10, 1_000_000);

    // 2560 = 2 * 2^10 + 512, exercising the remainder path
    let nanos = conversion.to_nanos(2560);
    assert_eq!(nanos, 1_002_500);
    assert_eq!(conversion.to_tsc(nanos), 2560);
}

#[test]
fn monotonic() {
    let conversion = conversion(38654705, 24, 18433473881008);

    let mut last = conversion.to_nanos(0);
    for tsc in [1, 100, 4096, 1 << 20, 1 << 32, 1 << 40] {
        let nanos = conversion.to_nanos(tsc);
        assert!(nanos > last, "to_nanos({tsc}) = {nanos} not above {last}");
        last = nanos;
    }
}

#[test]
fn before_zero_point_clamps() {
    let conversion = conversion(1000, 10, 1_000_000);

    assert_eq!(conversion.to_tsc(999_995), 0);
    assert_eq!(conversion.to_tsc(0), 0);
}

#[test]
fn oversized_shifts_do_not_parse() {
    let parsed: Conversion = serde_json::from_value(serde_json::json!({
        "timeMult": 1000,
        "timeShift": 63,
        "timeZero": 0,
    }))
    .expect("Could not parse conversion");
    assert_eq!(parsed, conversion(1000, 63, 0));

    let res: Result<Conversion, _> = serde_json::from_value(serde_json::json!({
        "timeMult": 1000,
        "timeShift": 64,
        "timeZero": 0,
    }));
    assert!(res.is_err());
}

fn conversion(time_mult: u32, time_shift: u16, time_zero: u64) -> Conversion {
    Conversion {
        time_mult: NonZeroU32::new(time_mult).expect("zero multiplier"),
        time_shift,
        time_zero,
    }
}
