// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::NaiveDate;
use proptest::prelude::*;
use yare::parameterized;

fn at(y: i32, mo: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
}

fn ctx() -> TemplateContext {
    TemplateContext {
        device_name: "Shelby Substation".to_string(),
        device_acronym: "SHELBY".to_string(),
        device_folder_name: "shelby".to_string(),
        device_folder_path: "/var/lib/ff/shelby".to_string(),
        profile_name: "nightly".to_string(),
        device_id: 7,
        task_id: 42,
    }
}

#[parameterized(
    year_month = { "<YYYY><MM>", "202506" },
    short_year = { "<YY>-<MM>-<DD>", "25-06-02" },
    month_literal = { "<Month MM>", "Month 06" },
    day_literal = { "<Day DD>", "Day 02" },
    no_tokens = { "plain/path", "plain/path" },
)]
fn date_tokens(expr: &str, expected: &str) {
    assert_eq!(expand(expr, at(2025, 6, 2), &ctx()), expected);
}

#[test]
fn device_and_profile_tokens() {
    let out = expand(
        "<DeviceFolderPath>/<ProfileName>/<DeviceAcronym>-<DeviceID>-<TaskID>",
        at(2025, 6, 2),
        &ctx(),
    );
    assert_eq!(out, "/var/lib/ff/shelby/nightly/SHELBY-7-42");
}

#[test]
fn default_directory_expression() {
    let out = expand("<YYYY><MM>\\<DeviceFolderName>", at(2025, 6, 2), &ctx());
    assert_eq!(out, "202506\\shelby");
}

#[test]
fn yesterday_token_shifts_every_date_token() {
    // June 1 minus one day lands in May, so the month must shift too.
    let out = expand("<YYYY>/<MM>/<Day DD-1>", at(2025, 6, 1), &ctx());
    assert_eq!(out, "2025/05/Day 31");
}

#[test]
fn yesterday_shift_crosses_year_boundary() {
    let out = expand("<YYYY><MM><DD> <Day DD-1>", at(2025, 1, 1), &ctx());
    assert_eq!(out, "20241231 Day 31");
}

#[test]
fn without_yesterday_token_dates_are_current() {
    let out = expand("<YYYY>/<MM>/<DD>", at(2025, 6, 1), &ctx());
    assert_eq!(out, "2025/06/01");
}

#[test]
fn expansion_is_deterministic() {
    let now = at(2025, 6, 2);
    let expr = "<YYYY><MM>\\<DeviceFolderName>\\<Day DD-1>";
    assert_eq!(expand(expr, now, &ctx()), expand(expr, now, &ctx()));
}

proptest! {
    #[test]
    fn literal_text_passes_through(
        prefix in "[a-zA-Z0-9/_.-]{0,20}",
        suffix in "[a-zA-Z0-9/_.-]{0,20}",
    ) {
        let expr = format!("{prefix}<MM>{suffix}");
        let out = expand(&expr, at(2025, 6, 2), &ctx());
        prop_assert_eq!(out, format!("{prefix}06{suffix}"));
    }

    #[test]
    fn output_never_contains_date_tokens(day in 1u32..=28, month in 1u32..=12) {
        let out = expand(
            "<YYYY><YY><MM><DD><Month MM><Day DD><Day DD-1>",
            at(2025, month, day),
            &ctx(),
        );
        prop_assert!(!out.contains('<'));
    }
}
