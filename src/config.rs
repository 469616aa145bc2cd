use crate::db::models::BINDS_PER_ROW;
use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// When absent the load stage is skipped.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            file_pattern: default_file_pattern(),
            extensions: default_extensions(),
            output_file: default_output_file(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_file_pattern() -> String {
    "*_raw_*".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string(), "txt".to_string()]
}

fn default_output_file() -> PathBuf {
    PathBuf::from("data/staged/air_quality_transformed.csv")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_number")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections", deserialize_with = "deserialize_number")]
    pub max_connections: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Largest batch that fits PostgreSQL's limit of 65535 bind parameters
/// per statement.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / BINDS_PER_ROW;

/// Batch loader settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    /// Target table. The bundled migration only creates `air_quality_data`;
    /// any other table must already exist with the same columns.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Rows per write, at most `MAX_BATCH_SIZE`.
    #[serde(default = "default_batch_size", deserialize_with = "deserialize_number")]
    pub batch_size: usize,
    /// Attempts after the first failure.
    #[serde(default = "default_max_retries", deserialize_with = "deserialize_number")]
    pub max_retries: u32,
    /// Linear multiplier per attempt.
    #[serde(default = "default_backoff_seconds", deserialize_with = "deserialize_number")]
    pub backoff_seconds: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

fn default_table_name() -> String {
    "air_quality_data".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_seconds() -> f64 {
    2.0
}

/// Custom deserializer that handles numbers written either bare or quoted
///
/// Accepts:
/// - `port: 5432` (number)
/// - `port: "5432"` (string that parses to number)
/// - `port: ${DB_PORT}` (env var substituted to either)
fn deserialize_number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberValue<T> {
        Number(T),
        String(String),
    }

    match NumberValue::<T>::deserialize(deserializer)? {
        NumberValue::Number(n) => Ok(n),
        NumberValue::String(s) => s.trim().parse::<T>().map_err(|e| {
            serde::de::Error::custom(format!("Invalid number: '{}' ({})", s, e))
        }),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration text after environment expansion.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.file_pattern.trim().is_empty() {
            return Err(AppError::Config(
                "Pipeline file_pattern cannot be empty".to_string(),
            ));
        }

        if let Err(e) = glob::Pattern::new(&self.pipeline.file_pattern) {
            return Err(AppError::Config(format!(
                "Invalid pipeline file_pattern '{}': {}",
                self.pipeline.file_pattern, e
            )));
        }

        if self.pipeline.output_file.as_os_str().is_empty() {
            return Err(AppError::Config(
                "Pipeline output_file cannot be empty".to_string(),
            ));
        }

        if let Some(database) = &self.database {
            database.validate()?;
        }

        self.loader.validate()
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("host", &self.host),
            ("name", &self.name),
            ("user", &self.user),
            ("password", &self.password),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "Database {} contains an unexpanded environment variable",
                    field_name
                )));
            }
        }

        for (field_name, value) in &fields_to_check[..3] {
            if value.is_empty() {
                return Err(AppError::Config(format!(
                    "Database {} cannot be empty",
                    field_name
                )));
            }
        }

        if self.port == 0 {
            return Err(AppError::Config("Database port cannot be 0".to_string()));
        }

        if self.max_connections == 0 {
            return Err(AppError::Config(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        if self.max_connections > 100 {
            return Err(AppError::Config(format!(
                "Database max_connections {} seems too high, maximum recommended is 100",
                self.max_connections
            )));
        }

        Ok(())
    }
}

impl LoaderConfig {
    fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table_name) {
            return Err(AppError::Config(format!(
                "Loader table_name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.table_name
            )));
        }

        if self.batch_size == 0 {
            return Err(AppError::Config(
                "Loader batch_size must be at least 1".to_string(),
            ));
        }

        if self.batch_size > MAX_BATCH_SIZE {
            return Err(AppError::Config(format!(
                "Loader batch_size {} exceeds {} ({} bound values per row)",
                self.batch_size, MAX_BATCH_SIZE, BINDS_PER_ROW
            )));
        }

        if !self.backoff_seconds.is_finite() || self.backoff_seconds < 0.0 {
            return Err(AppError::Config(format!(
                "Loader backoff_seconds must be a non-negative number, got {}",
                self.backoff_seconds
            )));
        }

        if self.max_retries > 10 {
            tracing::warn!(
                "Loader max_retries of {} is high; failed batches will take a long time to give up",
                self.max_retries
            );
        }

        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute `${VAR}` and `${VAR:-default}` references. Whole-line `#`
/// comments are copied through untouched.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();
    let mut expanded = String::with_capacity(content.len());

    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
        } else {
            let replaced = re.replace_all(line, |cap: &regex_lite::Captures| {
                let var_name = &cap[1];
                match std::env::var(var_name) {
                    Ok(value) => value,
                    Err(_) => match cap.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => {
                            missing_vars.push(var_name.to_string());
                            cap[0].to_string()
                        }
                    },
                }
            });
            expanded.push_str(&replaced);
        }
        expanded.push('\n');
    }

    if !missing_vars.is_empty() {
        missing_vars.sort();
        missing_vars.dedup();
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or give it a default in the config: ${{{}:-value}}",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars[0]
        )));
    }

    Ok(expanded)
}
