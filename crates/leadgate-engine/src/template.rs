// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Placeholder substitution for message templates.

use leadgate_storage::ContactRecord;

/// Fills `{name}`, `{phone}`, and `{stage}` placeholders from the contact.
/// Unknown placeholders are left as written.
pub fn render_template(body: &str, contact: &ContactRecord) -> String {
    body.replace("{name}", contact.name.as_deref().unwrap_or("there"))
        .replace("{phone}", &contact.phone)
        .replace("{stage}", &contact.stage)
}
