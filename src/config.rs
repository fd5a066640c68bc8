use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_query_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_search_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_reflection_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_answer_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_initial_search_query_count() -> usize {
    3
}

fn default_max_research_loops() -> u32 {
    2
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub research: ResearchConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default = "default_search_model")]
    pub search_model: String,
    #[serde(default = "default_reflection_model")]
    pub reflection_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResearchConfig {
    #[serde(default = "default_initial_search_query_count")]
    pub initial_search_query_count: usize,
    #[serde(default = "default_max_research_loops")]
    pub max_research_loops: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { host: default_host(), port: default_port() }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            base_url: default_base_url(),
            api_key: String::new(),
            query_model: default_query_model(),
            search_model: default_search_model(),
            reflection_model: default_reflection_model(),
            answer_model: default_answer_model(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        ResearchConfig {
            initial_search_query_count: default_initial_search_query_count(),
            max_research_loops: default_max_research_loops(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults if it is missing or
    /// unreadable. The environment is only consulted here, at the wiring
    /// layer; the research core receives everything as explicit values.
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        let mut config = if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e);
                        Config::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Error reading {}: {}. Using defaults.", config_path.display(), e);
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        if config.gemini.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                config.gemini.api_key = key;
            }
        }

        config
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/bite-scout/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }
}
