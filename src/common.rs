use std::path::PathBuf;

/// Connect2Concepts occupancy widgets for the Cornell fitness centers.
pub const DEFAULT_URL: &str = "https://www.connect2concepts.com/connect2/?type=bar&key=355de24d-d0e4-4262-ae97-bc0c78b92839&loc_status=false";

// the source rejects reqwest's default user agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    LOCAL,
    PROD,
}

impl Stage {
    pub fn default_db_path(self) -> PathBuf {
        match self {
            Stage::PROD => PathBuf::from("gymcrowd.sqlite3"),
            Stage::LOCAL => PathBuf::from("gymcrowd-dev.sqlite3"),
        }
    }
}

impl From<String> for Stage {
    fn from(value: String) -> Self {
        match value.as_str() {
            "prod" => Stage::PROD,
            "local" => Stage::LOCAL,
            _ => Stage::LOCAL,
        }
    }
}
