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

//! Pet records.
//!
//! A pet's status moves freely between the three buckets:
//!
//! ```text
//!  Available ◄──► Under Care
//!      ▲              ▲
//!      └──► Adopted ◄─┘
//! ```
//!
//! Every record sits in exactly one bucket of the repository's status-count index.

use crate::CoreError;
use crate::base::PetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Oldest age accepted for a new pet.
pub const MAX_PET_AGE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PetStatus {
    Available,
    Adopted,
    #[serde(rename = "Under Care")]
    UnderCare,
}

impl PetStatus {
    pub const ALL: [PetStatus; 3] = [PetStatus::Available, PetStatus::Adopted, PetStatus::UnderCare];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetStatus::Available => "Available",
            PetStatus::Adopted => "Adopted",
            PetStatus::UnderCare => "Under Care",
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: `"available"` is rejected.
impl FromStr for PetStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(PetStatus::Available),
            "Adopted" => Ok(PetStatus::Adopted),
            "Under Care" | "UnderCare" => Ok(PetStatus::UnderCare),
            other => Err(CoreError::invalid(format!("invalid status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetRecord {
    pub id: PetId,
    pub name: String,
    pub species: String,
    pub breed: String,
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub description: String,
    pub status: PetStatus,
    pub is_vaccinated: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Fields of a pet before the repository assigns its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPet {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub breed: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub description: String,
    pub status: PetStatus,
    #[serde(default)]
    pub is_vaccinated: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NewPet {
    pub fn new(name: &str, species: &str, breed: &str, age: u32, status: PetStatus) -> Self {
        Self {
            name: name.to_string(),
            species: species.to_string(),
            breed: breed.to_string(),
            age,
            gender: String::new(),
            description: String::new(),
            status,
            is_vaccinated: false,
            tags: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns every validation problem, not just the first.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("pet name is required");
        }
        if self.species.trim().is_empty() {
            problems.push("species is required");
        }
        if self.age > MAX_PET_AGE {
            problems.push("age must be between 0 and 30");
        }
        problems
    }

    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] listing all problems, separated by `"; "`.
    pub fn validate(&self) -> Result<(), CoreError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid(problems.join("; ")))
        }
    }

    pub(crate) fn into_record(self, id: PetId, created_at: DateTime<Utc>) -> PetRecord {
        PetRecord {
            id,
            name: self.name,
            species: self.species,
            breed: self.breed,
            age: self.age,
            gender: self.gender,
            description: self.description,
            status: self.status,
            is_vaccinated: self.is_vaccinated,
            created_at,
            tags: self.tags,
            attributes: self.attributes,
        }
    }
}

/// Partial update for a pet.
///
/// Empty strings and a zero age mean "leave unchanged", so a field can never be
/// cleared through an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PetUpdate {
    pub name: String,
    pub species: String,
    pub breed: String,
    pub age: u32,
    pub status: Option<PetStatus>,
    pub description: String,
}

impl PetUpdate {
    pub fn status(status: PetStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Applies the non-empty fields and returns the previous status if it was written.
    pub(crate) fn apply_to(&self, pet: &mut PetRecord) -> Option<PetStatus> {
        if !self.name.is_empty() {
            pet.name.clone_from(&self.name);
        }
        if !self.species.is_empty() {
            pet.species.clone_from(&self.species);
        }
        if !self.breed.is_empty() {
            pet.breed.clone_from(&self.breed);
        }
        if self.age > 0 {
            pet.age = self.age;
        }
        if !self.description.is_empty() {
            pet.description.clone_from(&self.description);
        }
        self.status
            .map(|status| std::mem::replace(&mut pet.status, status))
    }
}
