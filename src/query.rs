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

//! Pet search over repository snapshots.
//!
//! Filters narrow a sequence one after another; each keeps the relative order
//! of the records it is given.

use crate::pet::{PetRecord, PetStatus};
use crate::repository::Repository;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PetFilter {
    /// Case-insensitive species equality.
    Species(String),
    /// Exact status equality.
    Status(PetStatus),
    /// Inclusive bounds; a zero bound leaves that side open.
    AgeRange { min: u32, max: u32 },
}

impl PetFilter {
    pub fn name(&self) -> &'static str {
        match self {
            PetFilter::Species(_) => "SpeciesFilter",
            PetFilter::Status(_) => "StatusFilter",
            PetFilter::AgeRange { .. } => "AgeRangeFilter",
        }
    }

    pub fn matches(&self, pet: &PetRecord) -> bool {
        match self {
            PetFilter::Species(species) => pet.species.eq_ignore_ascii_case(species),
            PetFilter::Status(status) => pet.status == *status,
            PetFilter::AgeRange { min, max } => {
                (*min == 0 || pet.age >= *min) && (*max == 0 || pet.age <= *max)
            }
        }
    }

    pub fn apply(&self, pets: Vec<PetRecord>) -> Vec<PetRecord> {
        pets.into_iter().filter(|pet| self.matches(pet)).collect()
    }
}

/// Narrows `pets` by each filter in turn.
pub fn apply_filters(pets: Vec<PetRecord>, filters: &[PetFilter]) -> Vec<PetRecord> {
    filters
        .iter()
        .fold(pets, |narrowed, filter| filter.apply(narrowed))
}

fn matches_text(pet: &PetRecord, needle: &str) -> bool {
    [&pet.name, &pet.species, &pet.breed]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Listing criteria; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetQuery {
    pub q: Option<String>,
    pub species: Option<String>,
    pub status: Option<PetStatus>,
}

impl PetQuery {
    fn filters(&self) -> Vec<PetFilter> {
        let mut filters = Vec::new();
        if let Some(species) = self.species.as_deref().filter(|s| !s.is_empty()) {
            filters.push(PetFilter::Species(species.to_string()));
        }
        if let Some(status) = self.status {
            filters.push(PetFilter::Status(status));
        }
        filters
    }
}

/// Stateless search front end; every call works on a fresh snapshot.
#[derive(Clone)]
pub struct QueryEngine {
    repo: Arc<Repository>,
}

impl QueryEngine {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Free-text search narrowed by `filters`.
    ///
    /// The text matches a case-insensitive substring of name, species or
    /// breed; an empty query matches everything.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if both the query and the filter list are empty.
    pub fn search(&self, query: &str, filters: &[PetFilter]) -> Result<Vec<PetRecord>, CoreError> {
        if query.is_empty() && filters.is_empty() {
            return Err(CoreError::invalid("search query or filters required"));
        }
        let mut pets = self.repo.snapshot_pets();
        if !query.is_empty() {
            let needle = query.to_lowercase();
            pets.retain(|pet| matches_text(pet, &needle));
        }
        Ok(apply_filters(pets, filters))
    }

    /// Lists pets for a [`PetQuery`]; no criteria lists every pet.
    pub fn list(&self, query: &PetQuery) -> Vec<PetRecord> {
        let filters = query.filters();
        let text = query.q.as_deref().unwrap_or_default();
        if text.is_empty() && filters.is_empty() {
            return self.repo.snapshot_pets();
        }
        if text.is_empty() {
            return apply_filters(self.repo.snapshot_pets(), &filters);
        }
        self.search(text, &filters).unwrap_or_default()
    }

    /// Pets matched by at least one filter, each once, in order of first match.
    pub fn any_of(&self, filters: &[PetFilter]) -> Vec<PetRecord> {
        let pets = self.repo.snapshot_pets();
        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for filter in filters {
            for pet in pets.iter().filter(|pet| filter.matches(pet)) {
                if seen.insert(pet.id.clone()) {
                    matched.push(pet.clone());
                }
            }
        }
        matched
    }
}
