use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::db::scb::population_archive::{Observation, Region};
use crate::interval::month::Month;

lazy_static! {
    static ref CODES: Regex = Regex::new(r#"CODES\("region"\)="(.+?)";"#).unwrap();
    static ref DATA: Regex = Regex::new(r"DATA=\s*([^;]+);").unwrap();
    static ref INTEGER: Regex = Regex::new(r"-?\d+").unwrap();
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PxTextError {
    #[error("response is missing the DATA block")]
    MissingData,
    #[error("response region codes {response:?} don't match the requested codes {requested:?}")]
    RegionMismatch {
        requested: Vec<String>,
        response: Vec<String>,
    },
}

/// Decode a latin-1 body.  Every byte maps to the code point of the same
/// value, so a few stray bytes can never reject the whole response.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// The two pieces of a pseudo-PX table response this job cares about:
/// the region code order and the flat value list.  Everything else in
/// the response is metadata and is ignored.
#[derive(Debug, PartialEq, Eq)]
pub struct PxTextResponse {
    pub region_codes: Vec<String>,
    pub values: Vec<i64>,
}

impl PxTextResponse {
    /// Scan the decoded text for the `CODES("region")=...;` and
    /// `DATA=...;` markers.  The response is not guaranteed to echo the
    /// CODES marker; `requested_codes` is the request order and serves
    /// as the fallback.  A marker naming a different region set than the
    /// request would misalign the value layout, so it is rejected.
    pub fn parse(text: &str, requested_codes: &[String]) -> Result<PxTextResponse, PxTextError> {
        let region_codes: Vec<String> = match CODES.captures(text) {
            Some(caps) => caps[1].split("\",\"").map(|c| c.to_string()).collect(),
            None => requested_codes.to_vec(),
        };

        let mut requested = requested_codes.to_vec();
        let mut response = region_codes.clone();
        requested.sort();
        response.sort();
        if requested != response {
            return Err(PxTextError::RegionMismatch {
                requested: requested_codes.to_vec(),
                response: region_codes,
            });
        }

        let data = DATA.captures(text).ok_or(PxTextError::MissingData)?;
        // The exact separators inside DATA are not fixed; scan for
        // integer tokens instead of splitting.  Negative values are SCB
        // sentinels for missing/suppressed cells.
        let values = INTEGER
            .find_iter(&data[1])
            .map(|m| m.as_str().parse::<i64>().unwrap())
            .collect();

        Ok(PxTextResponse {
            region_codes,
            values,
        })
    }

    /// Lay the flat value list out as an outer loop over region codes and
    /// an inner loop over the requested months, i.e. value `i` belongs to
    /// `(region i / months.len(), month i % months.len())`.  A short
    /// value list yields fewer rows, never an error.  Region codes not in
    /// `regions` keep the raw code as their display name.
    pub fn observations(&self, months: &[Month], regions: &[Region]) -> Vec<Observation> {
        let mut rows = Vec::new();
        let mut values = self.values.iter();
        for code in &self.region_codes {
            let name = regions
                .iter()
                .find(|r| &r.code == code)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| code.clone());
            for month in months {
                match values.next() {
                    Some(&population) => rows.push(Observation {
                        region: name.clone(),
                        month: month.to_string(),
                        population,
                    }),
                    None => return rows,
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use crate::db::scb::population_archive::Region;
    use crate::db::scb::px_text::*;
    use crate::interval::month::month;

    fn regions() -> Vec<Region> {
        vec![
            Region {
                code: "0581".to_string(),
                name: "Norrköping".to_string(),
            },
            Region {
                code: "0680".to_string(),
                name: "Jönköping".to_string(),
            },
        ]
    }

    fn codes() -> Vec<String> {
        vec!["0581".to_string(), "0680".to_string()]
    }

    #[test]
    fn parse_codes_and_data() {
        let text = r#"CHARSET="ANSI";CODES("region")="0581","0680";DATA=100 200 110 210;"#;
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        assert_eq!(px.region_codes, codes());
        assert_eq!(px.values, vec![100, 200, 110, 210]);
    }

    #[test]
    fn outer_region_inner_month_layout() {
        let text = r#"CODES("region")="0581","0680";DATA=100,200,110,210;"#;
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        let months = [month(2025, 1), month(2025, 2)];
        let rows = px.observations(&months, &regions());
        assert_eq!(rows.len(), 4);
        assert_eq!(
            (rows[0].region.as_str(), rows[0].month.as_str(), rows[0].population),
            ("Norrköping", "2025M01", 100)
        );
        assert_eq!(
            (rows[1].region.as_str(), rows[1].month.as_str(), rows[1].population),
            ("Norrköping", "2025M02", 200)
        );
        assert_eq!(
            (rows[2].region.as_str(), rows[2].month.as_str(), rows[2].population),
            ("Jönköping", "2025M01", 110)
        );
        assert_eq!(
            (rows[3].region.as_str(), rows[3].month.as_str(), rows[3].population),
            ("Jönköping", "2025M02", 210)
        );
    }

    #[test]
    fn missing_codes_marker_falls_back_to_request_order() {
        let text = "DATA=100 200 110 210;";
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        assert_eq!(px.region_codes, codes());
    }

    #[test]
    fn missing_data_marker_is_fatal() {
        let text = r#"CODES("region")="0581","0680";"#;
        assert_eq!(
            PxTextResponse::parse(text, &codes()),
            Err(PxTextError::MissingData)
        );
    }

    #[test]
    fn unexpected_region_set_is_rejected() {
        let text = r#"CODES("region")="0581","0680","0180";DATA=1 2 3;"#;
        match PxTextResponse::parse(text, &codes()) {
            Err(PxTextError::RegionMismatch { requested, response }) => {
                assert_eq!(requested, codes());
                assert_eq!(response.len(), 3);
            }
            other => panic!("expected RegionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn reordered_region_codes_are_accepted() {
        let text = r#"CODES("region")="0680","0581";DATA=110,210,100,200;"#;
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        let months = [month(2025, 1), month(2025, 2)];
        let rows = px.observations(&months, &regions());
        // the response order wins, values stay aligned
        assert_eq!(rows[0].region, "Jönköping");
        assert_eq!(rows[0].population, 110);
        assert_eq!(rows[2].region, "Norrköping");
        assert_eq!(rows[2].population, 100);
    }

    #[test]
    fn short_data_block_truncates_rows() {
        let text = r#"CODES("region")="0581","0680";DATA=100 200 110;"#;
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        let months = [month(2025, 1), month(2025, 2)];
        let rows = px.observations(&months, &regions());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].region, "Jönköping");
        assert_eq!(rows[2].month, "2025M01");
    }

    #[test]
    fn negative_sentinels_are_kept() {
        let text = "DATA=100 -1 110 210;";
        let px = PxTextResponse::parse(text, &codes()).unwrap();
        assert_eq!(px.values, vec![100, -1, 110, 210]);
    }

    #[test]
    fn unknown_region_code_keeps_raw_code() {
        let px = PxTextResponse {
            region_codes: vec!["9999".to_string()],
            values: vec![42],
        };
        let rows = px.observations(&[month(2025, 1)], &regions());
        assert_eq!(rows[0].region, "9999");
    }

    #[test]
    fn latin1_bytes_always_decode() {
        // "Norrköping" with latin-1 0xF6 for ö, plus a stray control byte
        let bytes = [0x4e, 0x6f, 0x72, 0x72, 0x6b, 0xf6, 0x70, 0x69, 0x6e, 0x67, 0x9c];
        let text = decode_latin1(&bytes);
        assert!(text.starts_with("Norrköping"));
        assert_eq!(text.chars().count(), 11);
    }
}
