// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path templating for remote paths, directory naming, and external
//! commands
//!
//! A flat literal-substitution pass over `<Token>` placeholders. The
//! `<Day DD-1>` token is detected before substitution: its presence
//! shifts every date token in the same expression back by one day, so a
//! "yesterday" path stays internally consistent across a month boundary.

use chrono::{Datelike, NaiveDateTime};

/// Non-date substitution values for one expansion
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub device_name: String,
    pub device_acronym: String,
    pub device_folder_name: String,
    pub device_folder_path: String,
    pub profile_name: String,
    pub device_id: i32,
    pub task_id: i32,
}

/// Expand every `<Token>` in `expr` against `now` and `ctx`.
///
/// Pure: the output depends only on the arguments, so two expansions
/// within the same minute are identical.
pub fn expand(expr: &str, now: NaiveDateTime, ctx: &TemplateContext) -> String {
    // The shift must be decided before any substitution happens.
    let date = if expr.contains("<Day DD-1>") {
        now.date() - chrono::Duration::days(1)
    } else {
        now.date()
    };

    let yesterday_day = (now.date() - chrono::Duration::days(1)).day();

    expr.replace("<YYYY>", &format!("{:04}", date.year()))
        .replace("<YY>", &format!("{:02}", date.year() % 100))
        .replace("<Month MM>", &format!("Month {:02}", date.month()))
        .replace("<MM>", &format!("{:02}", date.month()))
        .replace("<Day DD-1>", &format!("Day {:02}", yesterday_day))
        .replace("<Day DD>", &format!("Day {:02}", date.day()))
        .replace("<DD>", &format!("{:02}", date.day()))
        .replace("<DeviceName>", &ctx.device_name)
        .replace("<DeviceAcronym>", &ctx.device_acronym)
        .replace("<DeviceFolderName>", &ctx.device_folder_name)
        .replace("<DeviceFolderPath>", &ctx.device_folder_path)
        .replace("<ProfileName>", &ctx.profile_name)
        .replace("<DeviceID>", &ctx.device_id.to_string())
        .replace("<TaskID>", &ctx.task_id.to_string())
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
