//! Command-line argument parsing for segment-guard.

use crate::config::{Config, ConnectionConfig};
use crate::error::{Result, SegmentError};
use crate::llm::LlmProvider;
use crate::query::{QueryRequest, TenantId};
use clap::Parser;
use std::path::PathBuf;

/// Turns a plain-language patient segment into safe, tenant-scoped SQL.
#[derive(Parser, Debug)]
#[command(name = "segment-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Natural-language description of the segment
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Execute the query instead of only previewing the SQL
    #[arg(short = 'x', long)]
    pub execute: bool,

    /// Run this SQL (usually from an earlier preview) instead of generating new SQL
    #[arg(long, value_name = "SQL", requires = "execute")]
    pub sql: Option<String>,

    /// Tenant the query is scoped to
    #[arg(short = 't', long, value_name = "TENANT", env = "SEGMENT_TENANT_ID")]
    pub tenant: Option<String>,

    /// PostgreSQL connection string for the read-only channel (overrides config)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// LLM provider to use (overrides config)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// LLM model to use (overrides config)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Use the in-memory sample channel instead of a database
    #[arg(long, conflicts_with = "database_url")]
    pub mock_db: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Pretty-print the JSON response
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Builds the request the arguments describe.
    pub fn to_request(&self) -> QueryRequest {
        QueryRequest {
            query: self.query.clone(),
            execute: self.execute,
            sql: self.sql.clone(),
        }
    }

    /// Returns the tenant to scope to, if one was given.
    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant.as_deref().map(TenantId::new)
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the provider from --llm, falling back to the config file.
    pub fn llm_provider(&self, config: &Config) -> Result<LlmProvider> {
        let name = self.llm.as_deref().unwrap_or(&config.llm.provider);
        name.parse().map_err(SegmentError::config)
    }

    /// Returns the model from --model, falling back to the config file.
    pub fn llm_model<'a>(&'a self, config: &'a Config) -> &'a str {
        self.model.as_deref().unwrap_or(&config.llm.model)
    }

    /// Returns the database for the read-only channel.
    ///
    /// A connection string on the command line takes precedence over the
    /// `[database]` table of the config file.
    pub fn database_config(&self, config: &Config) -> Option<ConnectionConfig> {
        match &self.database_url {
            Some(url) => Some(ConnectionConfig::from_url(url.clone())),
            None => config.database.clone(),
        }
    }
}
