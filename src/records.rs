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

//! Append-only shelter records: service bookings, adoption inquiries and
//! contact messages, plus the service catalog they refer to.

use crate::CoreError;
use crate::base::{BookingId, InquiryId, PetId, ServiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOffering {
    pub id: ServiceId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: Decimal,
    /// Minutes.
    pub duration: u32,
    pub available: bool,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBooking {
    pub id: BookingId,
    pub service_id: ServiceId,
    pub pet_name: String,
    pub owner_name: String,
    pub email: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub notes: String,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingRequest {
    pub service_id: String,
    pub pet_name: String,
    pub owner_name: String,
    pub email: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub notes: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.service_id.is_empty() || self.owner_name.is_empty() || self.email.is_empty() {
            return Err(CoreError::invalid(
                "service ID, owner name, and email are required",
            ));
        }
        Ok(())
    }

    pub(crate) fn into_booking(self, id: BookingId, now: DateTime<Utc>) -> ServiceBooking {
        ServiceBooking {
            id,
            service_id: ServiceId(self.service_id),
            pet_name: self.pet_name,
            owner_name: self.owner_name,
            email: self.email,
            phone: self.phone,
            date: self.date,
            time: self.time,
            notes: self.notes,
            status: BookingStatus::Pending,
            booked_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InquiryStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionInquiry {
    pub id: InquiryId,
    pub pet_id: PetId,
    pub adopter_name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub status: InquiryStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InquiryRequest {
    pub pet_id: String,
    pub adopter_name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

impl InquiryRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pet_id.is_empty() || self.adopter_name.is_empty() || self.email.is_empty() {
            return Err(CoreError::invalid(
                "pet ID, adopter name and email are required",
            ));
        }
        Ok(())
    }

    pub(crate) fn into_inquiry(self, id: InquiryId, now: DateTime<Utc>) -> AdoptionInquiry {
        AdoptionInquiry {
            id,
            pet_id: PetId(self.pet_id),
            adopter_name: self.adopter_name,
            email: self.email,
            phone: self.phone,
            message: self.message,
            status: InquiryStatus::Pending,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub purpose: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub purpose: String,
    pub message: String,
}

impl ContactRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() || self.email.is_empty() || self.message.is_empty() {
            return Err(CoreError::invalid("name, email, and message are required"));
        }
        Ok(())
    }

    pub(crate) fn into_message(self, now: DateTime<Utc>) -> ContactMessage {
        ContactMessage {
            name: self.name,
            email: self.email,
            purpose: self.purpose,
            message: self.message,
            sent_at: now,
        }
    }
}
