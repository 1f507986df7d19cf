// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Email bodies.
//!
//! Templates use `{{Field}}` placeholders. Field values are HTML-escaped before
//! substitution, and a placeholder with no matching field is a [`RenderError`].

use crate::error::RenderError;
use std::collections::BTreeMap;

const VERIFICATION: &str = r#"<!DOCTYPE html>
<html lang="en"><body style="font-family:'Segoe UI',Arial,sans-serif;background:#faf8f5;">
  <h1 style="color:#b8844f;">Email Verification</h1>
  <p>Hi <strong>{{Username}}</strong>! Use the code below to verify your email address.</p>
  <p>This code expires in <strong>5 minutes</strong>.</p>
  <p style="font-size:42px;font-weight:800;letter-spacing:10px;font-family:monospace;">{{Code}}</p>
  <p style="color:#aaa;font-size:12px;">If you didn't request this, you can safely ignore this email.</p>
</body></html>"#;

const WELCOME: &str = r#"<!DOCTYPE html>
<html lang="en"><body style="font-family:'Segoe UI',Arial,sans-serif;background:#faf8f5;">
  <h1 style="color:#b8844f;">Pawtner Hope Foundation</h1>
  <p>Welcome aboard, <strong>{{Username}}</strong>!</p>
  <p>Your account for {{Email}} was created on {{Date}}. You can now log in, browse pets
  waiting for a home, and book our care services.</p>
</body></html>"#;

const RECEIPT: &str = r#"<!DOCTYPE html>
<html lang="en"><body style="font-family:'Segoe UI',Arial,sans-serif;background:#faf8f5;">
  <h1 style="color:#b8844f;">Donation Receipt</h1>
  <p>Dear {{DonorName}}, thank you for your donation of <strong>&#8377;{{Amount}}</strong>.</p>
  <table>
    <tr><td>Receipt</td><td>{{ReceiptID}}</td></tr>
    <tr><td>Donation</td><td>{{DonationID}}</td></tr>
    <tr><td>Transaction</td><td>{{TransactionID}}</td></tr>
    <tr><td>Date</td><td>{{Date}}</td></tr>
  </table>
  <p>A copy has been sent to {{DonorEmail}}.</p>
</body></html>"#;

const INQUIRY_RECEIVED: &str = r#"<!DOCTYPE html>
<html lang="en"><body style="font-family:'Segoe UI',Arial,sans-serif;background:#faf8f5;">
  <h1 style="color:#b8844f;">Adoption Inquiry Received</h1>
  <p>Hi {{AdopterName}}, thank you for your interest in pet {{PetID}}.</p>
  <p>Our team will review inquiry <strong>{{InquiryID}}</strong> and get back to you shortly.</p>
</body></html>"#;

const CONTACT_RECEIVED: &str = r#"<!DOCTYPE html>
<html lang="en"><body style="font-family:'Segoe UI',Arial,sans-serif;background:#faf8f5;">
  <h1 style="color:#b8844f;">We Got Your Message</h1>
  <p>Hi {{Name}}, thanks for reaching out about "{{Purpose}}". We will reply to this address soon.</p>
</body></html>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Verification,
    Welcome,
    Receipt,
    InquiryReceived,
    ContactReceived,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::Verification => "verification",
            Template::Welcome => "welcome",
            Template::Receipt => "receipt",
            Template::InquiryReceived => "inquiry-received",
            Template::ContactReceived => "contact-received",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Template::Verification => "Your Pawtner Hope Verification Code",
            Template::Welcome => "Welcome to Pawtner Hope Foundation",
            Template::Receipt => "Donation Receipt - Pawtner Hope Foundation",
            Template::InquiryReceived => "We Received Your Adoption Inquiry",
            Template::ContactReceived => "Thanks for Contacting Pawtner Hope",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Template::Verification => VERIFICATION,
            Template::Welcome => WELCOME,
            Template::Receipt => RECEIPT,
            Template::InquiryReceived => INQUIRY_RECEIVED,
            Template::ContactReceived => CONTACT_RECEIVED,
        }
    }
}

fn escape_html(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

/// Renders `template` with `fields`. Pure: no I/O, no shared state.
///
/// # Errors
///
/// - [`RenderError::UnknownField`] if a placeholder has no value in `fields`.
/// - [`RenderError::Unterminated`] if a `{{` is never closed.
pub fn render(template: Template, fields: &BTreeMap<&str, String>) -> Result<String, RenderError> {
    let source = template.source();
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or(RenderError::Unterminated(template.name()))?;
        let field = after[..end].trim();
        let value = fields.get(field).ok_or_else(|| RenderError::UnknownField {
            template: template.name(),
            field: field.to_string(),
        })?;
        escape_html(value, &mut out);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
