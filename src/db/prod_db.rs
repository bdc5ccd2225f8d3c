use std::env;

use crate::db::scb::population_archive::{Region, ScbPopulationArchive};

pub struct ProdDb {}

impl ProdDb {
    /// Monthly population counts for Norrköping and Jönköping from the
    /// SCB table TAB6471.
    pub fn scb_population() -> ScbPopulationArchive {
        ScbPopulationArchive {
            data_path: env::var("BEFOLKNING_DATA_FILE")
                .unwrap_or_else(|_| "norrkoping_jonkoping_manad.json".to_string()),
            api_url: "https://api.scb.se/ov0104/v2beta/api/v2/tables/TAB6471/data".to_string(),
            regions: vec![
                Region {
                    code: "0581".to_string(),
                    name: "Norrköping".to_string(),
                },
                Region {
                    code: "0680".to_string(),
                    name: "Jönköping".to_string(),
                },
            ],
            common_params: vec![
                ("lang".to_string(), "sv".to_string()),
                ("valueCodes[ContentsCode]".to_string(), "000007SF".to_string()),
                ("valueCodes[Alder]".to_string(), "TotSA".to_string()),
                ("valueCodes[Kon]".to_string(), "TotSa".to_string()),
                ("codelist[Region]".to_string(), "vs_CKM03Kommun".to_string()),
                ("codelist[Alder]".to_string(), "vs_CKM01AlderTot".to_string()),
            ],
        }
    }
}
