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

use clap::{Args, Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use pawtner_core::{
    NewPet, PetFilter, PetRecord, PetStatus, QueryEngine, Repository, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pawtner shelter tools - search and summarize pet records
///
/// Loads pets from a CSV file (or the built-in sample pets when no file is
/// given) and prints search results as CSV or statistics as JSON.
#[derive(Parser, Debug)]
#[command(name = "pawtner-core")]
#[command(about = "Search and summarize shelter pet records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the pets matching a query as CSV
    Search(SearchArgs),
    /// Print shelter statistics as JSON
    Stats(Source),
}

#[derive(Args, Debug)]
struct Source {
    /// Path to CSV file with pets
    ///
    /// Expected format: name,species,breed,age,status,gender,vaccinated
    #[arg(long, value_name = "FILE", env = "PAWTNER_PETS")]
    pets: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    source: Source,

    /// Case-insensitive text matched against name, species and breed
    #[arg(long, short)]
    query: Option<String>,

    #[arg(long)]
    species: Option<String>,

    /// Exact status: Available, Adopted or "Under Care"
    #[arg(long)]
    status: Option<PetStatus>,

    /// Inclusive lower age bound; 0 means unbounded
    #[arg(long, default_value_t = 0)]
    min_age: u32,

    /// Inclusive upper age bound; 0 means unbounded
    #[arg(long, default_value_t = 0)]
    max_age: u32,
}

impl SearchArgs {
    fn filters(&self) -> Vec<PetFilter> {
        let mut filters = Vec::new();
        if let Some(species) = &self.species {
            filters.push(PetFilter::Species(species.clone()));
        }
        if let Some(status) = self.status {
            filters.push(PetFilter::Status(status));
        }
        if self.min_age > 0 || self.max_age > 0 {
            filters.push(PetFilter::AgeRange {
                min: self.min_age,
                max: self.max_age,
            });
        }
        filters
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawtner_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let source = match &cli.command {
        Command::Search(args) => &args.source,
        Command::Stats(source) => source,
    };

    let repo = match load_repository(source) {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            eprintln!("Error loading pets: {}", e);
            process::exit(1);
        }
    };

    let result = match &cli.command {
        Command::Search(args) => run_search(&repo, args, std::io::stdout()),
        Command::Stats(_) => write_statistics(&repo, std::io::stdout()),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_repository(source: &Source) -> Result<Repository, Box<dyn std::error::Error>> {
    match &source.pets {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("cannot open '{}': {}", path.display(), e))?;
            Ok(load_pets(BufReader::new(file))?)
        }
        None => Ok(Repository::seeded(Arc::new(SystemClock))),
    }
}

/// Raw CSV record matching the input format.
#[derive(Debug, Deserialize)]
struct CsvPet {
    name: String,
    species: String,
    #[serde(default)]
    breed: String,
    age: u32,
    status: String,
    #[serde(default)]
    gender: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    vaccinated: Option<bool>,
}

impl CsvPet {
    /// Returns `None` for an unknown status or a pet that fails validation.
    fn into_new_pet(self) -> Option<NewPet> {
        let status = self.status.parse::<PetStatus>().ok()?;
        let pet = NewPet {
            gender: self.gender,
            is_vaccinated: self.vaccinated.unwrap_or(false),
            ..NewPet::new(&self.name, &self.species, &self.breed, self.age, status)
        };
        pet.validate().ok()?;
        Some(pet)
    }
}

/// Loads pets from CSV into an empty repository.
///
/// Malformed rows and invalid pets are skipped.
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn load_pets<R: Read>(reader: R) -> Result<Repository, csv::Error> {
    let repo = Repository::new(Arc::new(SystemClock));

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvPet>().enumerate() {
        match result {
            Ok(record) => match record.into_new_pet() {
                Some(pet) => {
                    repo.insert_pet(pet);
                }
                None => tracing::debug!(row, "skipping invalid pet"),
            },
            Err(e) => tracing::debug!(row, "skipping malformed row: {e}"),
        }
    }

    Ok(repo)
}

/// One output row per pet.
#[derive(Debug, Serialize)]
struct PetRow<'a> {
    id: &'a str,
    name: &'a str,
    species: &'a str,
    breed: &'a str,
    age: u32,
    status: &'static str,
    vaccinated: bool,
}

impl<'a> From<&'a PetRecord> for PetRow<'a> {
    fn from(pet: &'a PetRecord) -> Self {
        Self {
            id: pet.id.as_str(),
            name: &pet.name,
            species: &pet.species,
            breed: &pet.breed,
            age: pet.age,
            status: pet.status.as_str(),
            vaccinated: pet.is_vaccinated,
        }
    }
}

fn run_search<W: Write>(
    repo: &Arc<Repository>,
    args: &SearchArgs,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = QueryEngine::new(Arc::clone(repo));
    let filters = args.filters();
    let query = args.query.as_deref().unwrap_or_default();
    let pets = if query.is_empty() && filters.is_empty() {
        repo.snapshot_pets()
    } else {
        engine.search(query, &filters)?
    };
    write_pets(&pets, writer)?;
    Ok(())
}

/// Writes pets as CSV.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_pets<W: Write>(pets: &[PetRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for pet in pets {
        wtr.serialize(PetRow::from(pet))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_statistics<W: Write>(repo: &Repository, mut writer: W) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer_pretty(&mut writer, &repo.statistics())?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PETS: &str = "name,species,breed,age,status,gender,vaccinated\n\
                        Max,Dog,Golden Retriever,3,Available,Male,true\n\
                        Luna,Cat,Persian,2,Available,Female,true\n\
                        Charlie,Dog,Beagle,1,Under Care,Male,false\n";

    fn search_args(query: Option<&str>, species: Option<&str>) -> SearchArgs {
        SearchArgs {
            source: Source { pets: None },
            query: query.map(str::to_string),
            species: species.map(str::to_string),
            status: None,
            min_age: 0,
            max_age: 0,
        }
    }

    #[test]
    fn load_simple_pets() {
        let repo = load_pets(Cursor::new(PETS)).unwrap();
        assert_eq!(repo.pet_count(), 3);
        assert_eq!(repo.status_counts()[&PetStatus::UnderCare], 1);
    }

    #[test]
    fn load_with_whitespace() {
        let csv = "name,species,breed,age,status,gender,vaccinated\n Rex , Dog , Boxer , 4 , Adopted , Male , true \n";
        let repo = load_pets(Cursor::new(csv)).unwrap();
        let pets = repo.snapshot_pets();
        assert_eq!(pets[0].name, "Rex");
        assert_eq!(pets[0].status, PetStatus::Adopted);
    }

    #[test]
    fn skip_malformed_and_invalid_rows() {
        let csv = "name,species,breed,age,status,gender,vaccinated\n\
                   Max,Dog,Lab,3,Available,Male,true\n\
                   Old,Dog,Lab,31,Available,Male,true\n\
                   Odd,Dog,Lab,2,available,Male,true\n\
                   Bad,Dog,Lab,not-a-number,Available,Male,true\n\
                   Luna,Cat,,2,Adopted,,\n";
        let repo = load_pets(Cursor::new(csv)).unwrap();
        let names: Vec<_> = repo.snapshot_pets().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Max", "Luna"]);
    }

    #[test]
    fn search_writes_matching_rows() {
        let repo = Arc::new(load_pets(Cursor::new(PETS)).unwrap());
        let mut output = Vec::new();
        run_search(&repo, &search_args(None, Some("dog")), &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("id,name,species,breed,age,status,vaccinated\n"));
        assert!(output.contains("pet-001,Max,Dog"));
        assert!(output.contains("pet-003,Charlie,Dog,Beagle,1,Under Care,false"));
        assert!(!output.contains("Luna"));
    }

    #[test]
    fn search_without_criteria_lists_everything() {
        let repo = Arc::new(load_pets(Cursor::new(PETS)).unwrap());
        let mut output = Vec::new();
        run_search(&repo, &search_args(None, None), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 4);
    }

    #[test]
    fn stats_are_json() {
        let repo = load_pets(Cursor::new(PETS)).unwrap();
        let mut output = Vec::new();
        write_statistics(&repo, &mut output).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["totalPets"], 3);
        assert_eq!(json["petsBySpecies"]["Dog"], 2);
    }
}
