use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use itertools::Itertools;
use jiff::civil::Date;
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::db::scb::px_text::{decode_latin1, PxTextResponse};
use crate::interval::month::Month;

/// One row of the dataset.  The field order is the serialized key order.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub region: String,
    pub month: String,
    pub population: i64,
}

impl Observation {
    /// The identity used for de-duplication.
    pub fn key(&self) -> (String, String) {
        (self.region.clone(), self.month.clone())
    }

    /// Sort key: decoded month first, region name second.  Tokens that
    /// fail to decode sort before everything else.
    fn sort_key(&self) -> (Option<Month>, String) {
        (self.month.parse::<Month>().ok(), self.region.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub code: String,
    pub name: String,
}

/// The dataset as loaded at the start of a run: rows truncated to the
/// latest complete month, the de-duplication index over them, and the
/// latest complete month itself.  `latest` is `None` when there is no
/// usable baseline.
pub struct ExistingData {
    pub rows: Vec<Observation>,
    pub seen: HashSet<(String, String)>,
    pub latest: Option<Month>,
}

/// Monthly municipal population counts from the SCB table API, archived
/// as a single JSON document.  The struct carries the full fixed
/// configuration so tests can run against fixtures.
pub struct ScbPopulationArchive {
    /// Path of the JSON dataset file
    pub data_path: String,
    /// SCB table data endpoint
    pub api_url: String,
    /// Tracked municipalities, in request order
    pub regions: Vec<Region>,
    /// Fixed selector parameters sent with every request
    pub common_params: Vec<(String, String)>,
}

impl ScbPopulationArchive {
    /// Read the persisted dataset.  A missing or empty file is "no data":
    /// empty rows and no latest complete month.  Rows after the latest
    /// complete month are partial and are dropped before merging.
    pub fn read_existing(&self) -> Result<ExistingData, Box<dyn Error>> {
        let path = Path::new(&self.data_path);
        if !path.exists() || fs::metadata(path)?.len() == 0 {
            return Ok(ExistingData {
                rows: Vec::new(),
                seen: HashSet::new(),
                latest: None,
            });
        }
        let contents = fs::read_to_string(path)?;
        let mut rows: Vec<Observation> = serde_json::from_str(&contents)?;

        let latest = self.latest_complete_month(&rows);
        if let Some(latest) = latest {
            // Months that don't parse are unsortable, keep them
            rows.retain(|r| match r.month.parse::<Month>() {
                Ok(m) => m <= latest,
                Err(_) => true,
            });
        }

        let seen = rows.iter().map(|r| r.key()).collect();
        Ok(ExistingData { rows, seen, latest })
    }

    /// The greatest month for which every tracked region has an
    /// observation.  Months with a partial region set don't count, and
    /// neither do tokens that fail to parse.
    fn latest_complete_month(&self, rows: &[Observation]) -> Option<Month> {
        let tracked: HashSet<&str> = self.regions.iter().map(|r| r.name.as_str()).collect();
        let mut regions_by_month: HashMap<&str, HashSet<&str>> = HashMap::new();
        for row in rows {
            regions_by_month
                .entry(row.month.as_str())
                .or_default()
                .insert(row.region.as_str());
        }
        regions_by_month
            .iter()
            .filter(|(_, regions)| **regions == tracked)
            .filter_map(|(token, _)| token.parse::<Month>().ok())
            .max()
    }

    /// Request the given months in one batch and decode the response.
    /// A 4xx status means the months are not published yet and yields an
    /// empty list; any other failure is fatal.
    pub fn fetch(&self, months: &[Month]) -> Result<Vec<Observation>, Box<dyn Error>> {
        if months.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = months.iter().join(",");
        let codes: Vec<String> = self.regions.iter().map(|r| r.code.clone()).collect();

        let client = Client::builder().timeout(Duration::from_secs(45)).build()?;
        let response = client
            .get(&self.api_url)
            .query(&self.common_params)
            .query(&[
                ("valueCodes[Region]", codes.join(",").as_str()),
                ("valueCodes[Tid]", tokens.as_str()),
            ])
            .send()?;

        let status = response.status();
        if status.is_client_error() {
            info!(
                "Got {} from SCB for months {}.  Assuming the data is not published yet",
                status, tokens
            );
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Box::from(format!("SCB request failed with status {}", status)));
        }

        let body = response.bytes()?;
        let text = decode_latin1(&body);
        let px = PxTextResponse::parse(&text, &codes)?;
        Ok(px.observations(months, &self.regions))
    }

    /// Bring the dataset up to the last fully elapsed month relative to
    /// `today` and return the number of rows added.  The file is
    /// rewritten in full when rows were added and left untouched
    /// otherwise.
    pub fn update(&self, today: Date) -> Result<usize, Box<dyn Error>> {
        let existing = self.read_existing()?;

        let latest = match existing.latest {
            Some(latest) => latest,
            None => {
                // Starting a history file from nothing would produce a
                // short dataset that looks authoritative
                info!(
                    "No existing data in {}.  Skipping the update",
                    self.data_path
                );
                return Ok(0);
            }
        };

        let end = Month::last_elapsed(today);
        if latest >= end {
            info!("No new months to fetch, the dataset ends at {}", latest);
            return Ok(0);
        }

        let months = latest.next().up_to(end);
        info!("Fetching months: {}", months.iter().join(", "));

        let fetched = self.fetch(&months)?;
        self.merge_and_write(existing, fetched)
    }

    /// Append fetched rows that are not already in the dataset and
    /// persist the re-sorted collection.  Nothing new means the file is
    /// not touched.  Returns the number of rows added.
    pub fn merge_and_write(
        &self,
        existing: ExistingData,
        fetched: Vec<Observation>,
    ) -> Result<usize, Box<dyn Error>> {
        let ExistingData {
            mut rows, mut seen, ..
        } = existing;

        let mut added = 0;
        for row in fetched {
            let key = row.key();
            if seen.contains(&key) {
                continue;
            }
            seen.insert(key);
            rows.push(row);
            added += 1;
        }

        if added == 0 {
            info!("No new rows added");
            return Ok(0);
        }

        rows.sort_by_key(|r| r.sort_key());
        self.write(&rows)?;
        info!("Wrote {} new rows to {}", added, self.data_path);
        Ok(added)
    }

    /// Overwrite the dataset file with the full collection, pretty
    /// printed with a trailing newline so successive runs diff cleanly.
    fn write(&self, rows: &[Observation]) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string_pretty(rows)?;
        let mut out = File::create(&self.data_path)?;
        out.write_all(json.as_bytes())?;
        out.write_all(b"\n")?;
        Ok(())
    }
}
