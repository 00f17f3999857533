use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Caption languages to try, most preferred first.
    pub languages: Vec<String>,
    pub innertube_client_name: String,
    pub innertube_client_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout: 30,
            languages: vec!["en".to_string()],
            innertube_client_name: "ANDROID".to_string(),
            innertube_client_version: "20.10.38".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}
