// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod controller;
pub mod economics;
pub mod rules;
pub mod sizing;
pub mod submitter;
