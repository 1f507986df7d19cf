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

//! Donations and their settlement records.
//!
//! A donation is recorded as [`DonationStatus::Pending`] and settled exactly once:
//!
//! ```text
//!  Pending ──confirmation(success)──► Completed
//!     │
//!     └────confirmation(failure)────► Failed
//! ```

use crate::CoreError;
use crate::base::DonationId;
use crate::clock::unix_nanos;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: DonationId,
    pub donor_name: String,
    pub donor_email: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub transaction_id: String,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    /// Paid through an automated channel (mobile payment deeplink); only these
    /// donations get a receipt emailed without being asked.
    #[serde(default)]
    pub payment_via_deeplink: bool,
}

/// Donation as submitted by a donor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub donor_name: String,
    pub donor_email: String,
    pub amount: Decimal,
    pub payment_method: String,
    #[serde(default)]
    pub payment_via_deeplink: bool,
}

impl DonationRequest {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] when the amount is not positive or a donor
    /// field or the payment method is empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.amount <= Decimal::ZERO {
            return Err(CoreError::invalid("invalid payment details: amount must be positive"));
        }
        if self.donor_name.trim().is_empty() || self.donor_email.trim().is_empty() {
            return Err(CoreError::invalid("donor name and email are required"));
        }
        if self.payment_method.trim().is_empty() {
            return Err(CoreError::invalid("payment method is required"));
        }
        Ok(())
    }
}

/// Acknowledgement handed to the donor as soon as the donation is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub receipt_id: String,
    pub donation_id: DonationId,
    pub donor_name: String,
    pub amount: Decimal,
    pub issued_at: DateTime<Utc>,
    pub message: String,
}

impl Receipt {
    /// Receipt IDs carry the donation ID, so donations issued at the same
    /// instant still get distinct receipts.
    pub fn for_donation(donation: &Donation, now: DateTime<Utc>) -> Self {
        Self {
            receipt_id: format!("rcpt-{}-{}", unix_nanos(now), donation.id),
            donation_id: donation.id.clone(),
            donor_name: donation.donor_name.clone(),
            amount: donation.amount,
            issued_at: now,
            message: format!(
                "Thank you {} for your generous donation of ₹{:.2} to Pawtner Hope Foundation!",
                donation.donor_name, donation.amount
            ),
        }
    }
}

/// Result of settling a donation, produced by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub donation_id: DonationId,
    pub success: bool,
    pub transaction_id: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> DonationRequest {
        DonationRequest {
            donor_name: "Jane Doe".into(),
            donor_email: "jane@example.com".into(),
            amount,
            payment_method: "UPI".into(),
            payment_via_deeplink: false,
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(request(dec!(0)).validate().is_err());
        assert!(request(dec!(-100)).validate().is_err());
        assert!(request(dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn requires_donor_and_method() {
        let mut missing_email = request(dec!(10));
        missing_email.donor_email.clear();
        assert_eq!(
            missing_email.validate(),
            Err(CoreError::InvalidInput("donor name and email are required".into()))
        );

        let mut missing_method = request(dec!(10));
        missing_method.payment_method = "  ".into();
        assert_eq!(
            missing_method.validate(),
            Err(CoreError::InvalidInput("payment method is required".into()))
        );
    }

    #[test]
    fn receipt_formats_amount_to_two_places() {
        let now = Utc::now();
        let donation = Donation {
            id: DonationId::from_seq(1),
            donor_name: "Jane Doe".into(),
            donor_email: "jane@example.com".into(),
            amount: dec!(500),
            payment_method: "UPI".into(),
            transaction_id: "txn-1".into(),
            status: DonationStatus::Pending,
            created_at: now,
            payment_via_deeplink: false,
        };
        let receipt = Receipt::for_donation(&donation, now);
        assert!(receipt.receipt_id.starts_with("rcpt-"));
        assert!(receipt.receipt_id.ends_with("-don-001"));
        assert_eq!(receipt.amount, dec!(500.00));
        assert!(receipt.message.contains("₹500.00"));
    }
}
