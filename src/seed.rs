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

//! Built-in sample data loaded when no persisted data is available.

use crate::base::ServiceId;
use crate::pet::{NewPet, PetStatus};
use crate::records::ServiceOffering;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

fn attributes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Sample pets paired with their creation timestamps.
pub(crate) fn sample_pets(now: DateTime<Utc>) -> Vec<(NewPet, DateTime<Utc>)> {
    vec![
        (
            NewPet {
                gender: "Male".into(),
                description: "Friendly and energetic dog looking for a loving home".into(),
                is_vaccinated: true,
                tags: tags(&["Friendly", "Energetic", "House-trained"]),
                attributes: attributes(&[("Color", "Golden"), ("Size", "Large"), ("Weight", "30kg")]),
                ..NewPet::new("Max", "Dog", "Golden Retriever", 3, PetStatus::Available)
            },
            now - TimeDelta::days(60),
        ),
        (
            NewPet {
                gender: "Female".into(),
                description: "Calm and affectionate cat, perfect for apartments".into(),
                is_vaccinated: true,
                tags: tags(&["Calm", "Indoor", "Affectionate"]),
                attributes: attributes(&[("Color", "White"), ("Size", "Medium"), ("Weight", "4kg")]),
                ..NewPet::new("Luna", "Cat", "Persian", 2, PetStatus::Available)
            },
            now - TimeDelta::days(45),
        ),
        (
            NewPet {
                gender: "Male".into(),
                description: "Playful puppy with lots of energy".into(),
                is_vaccinated: false,
                tags: tags(&["Playful", "Young", "Needs Training"]),
                attributes: attributes(&[
                    ("Color", "Brown and White"),
                    ("Size", "Medium"),
                    ("Weight", "12kg"),
                ]),
                ..NewPet::new("Charlie", "Dog", "Beagle", 1, PetStatus::UnderCare)
            },
            now - TimeDelta::days(10),
        ),
    ]
}

fn offering(
    seq: u64,
    name: &str,
    category: &str,
    description: &str,
    price: Decimal,
    duration: u32,
    features: &[&str],
) -> ServiceOffering {
    ServiceOffering {
        id: ServiceId::from_seq(seq),
        name: name.into(),
        category: category.into(),
        description: description.into(),
        price,
        duration,
        available: true,
        features: tags(features),
    }
}

pub(crate) fn service_catalog() -> Vec<ServiceOffering> {
    vec![
        offering(
            1,
            "Pet Grooming",
            "Care",
            "Complete grooming service including bath, haircut, and nail trimming",
            dec!(1500.00),
            90,
            &["Bath", "Haircut", "Nail Trimming", "Ear Cleaning"],
        ),
        offering(
            2,
            "Veterinary Checkup",
            "Medical",
            "Comprehensive health checkup by certified veterinarians",
            dec!(2000.00),
            60,
            &["Physical Exam", "Vaccination", "Health Certificate"],
        ),
        offering(
            3,
            "Dog Training",
            "Training",
            "Basic obedience training for dogs",
            dec!(3000.00),
            120,
            &["Basic Commands", "Socialization", "Behavioral Correction"],
        ),
        offering(
            4,
            "Pet Boarding",
            "Care",
            "Safe and comfortable boarding facilities",
            dec!(800.00),
            1440,
            &["24/7 Care", "Play Area", "Regular Meals"],
        ),
    ]
}
