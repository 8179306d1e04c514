use config::Config;
use getopts::{Matches, Options};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use whoop_client::{
    sport_name, CollectionQuery, DataHandler, Table, UserData, WhoopClient, WhoopError,
    WhoopOAuthManager,
};

mod export_config;

pub use crate::export_config::{
    AppConfig, DataConfig, EnabledStats, FileConfig, TokenConfig, WhoopConfig,
};

const RESOURCES: [&str; 6] = [
    "profile",
    "body_measurements",
    "cycle",
    "sleep",
    "recovery",
    "workout",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Whoop(#[from] WhoopError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to read authorization code: {0}")]
    Prompt(#[source] io::Error),

    #[error("no authorization code entered")]
    MissingCode,

    #[error("not logged in, call login() first")]
    NotLoggedIn,

    #[error("invalid value for option '{name}': {value}")]
    InvalidOption { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Command line options understood by [`ExportManager::new`].
pub fn cli_options() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "config", "config file (json)", "FILE");
    opts.optopt("", "log-config", "log4rs config file", "FILE");
    opts.optopt("s", "start", "only export records after this date", "YYYY-MM-DD");
    opts.optopt("e", "end", "only export records before this date", "YYYY-MM-DD");
    opts.optopt("l", "limit", "records per page (1-25)", "N");
    opts.optopt("t", "token-file", "where the oauth token is kept", "FILE");
    opts.optopt("o", "output", "directory the exports are written to", "DIR");
    opts.optopt(
        "r",
        "resources",
        "comma separated resources to export (profile,body_measurements,cycle,sleep,recovery,workout)",
        "LIST",
    );
    opts.optflag("h", "help", "print this help");
    opts
}

/// Adds a `sport_name` column next to `sport_id` on a workout table.
pub fn annotate_sports(table: &mut Table) {
    for row in table.rows_mut() {
        let name = row
            .get("sport_id")
            .and_then(Value::as_i64)
            .and_then(sport_name)
            .map_or(Value::Null, Value::from);
        row.insert(String::from("sport_name"), name);
    }
}

/// Whether a failed reload means the stored token itself is bad. Network
/// and server errors leave the file alone.
fn token_unusable(e: &WhoopError) -> bool {
    matches!(
        e,
        WhoopError::Authorization(_)
            | WhoopError::ScopeNotGranted(_)
            | WhoopError::Validation(_)
            | WhoopError::Json(_)
            | WhoopError::Io { .. }
    )
}

/// Exports Whoop data to json files.
///
/// Owns the OAuth flow around the token file: a stored token is reloaded
/// and refreshed, anything unusable is deleted and replaced by a fresh
/// authorization. Which resources get exported, for which dates and where
/// the files go is driven by a [`WhoopConfig`] with optional command line
/// overrides (see [`cli_options`]).
pub struct ExportManager {
    export_config: WhoopConfig,
    oauth_manager: WhoopOAuthManager,
    whoop_client: Option<WhoopClient>,
}

impl ExportManager {
    pub fn new(config: Config, options: Option<Matches>) -> Result<ExportManager> {
        let mut export_config: WhoopConfig = config.try_deserialize()?;

        if let Some(options) = options {
            ExportManager::apply_options(&mut export_config, &options)?;
        }

        let oauth_manager = WhoopOAuthManager::new(
            &export_config.whoop.client_id,
            &export_config.whoop.client_secret,
        )
        .with_base_url(&export_config.whoop.api_base);

        Ok(ExportManager {
            export_config,
            oauth_manager,
            whoop_client: None,
        })
    }

    fn apply_options(export_config: &mut WhoopConfig, options: &Matches) -> Result<()> {
        if let Some(date) = options.opt_str("s") {
            export_config.data.start_date = date;
        }
        if let Some(date) = options.opt_str("e") {
            export_config.data.end_date = date;
        }
        if let Some(limit) = options.opt_str("l") {
            export_config.data.page_limit = limit
                .parse()
                .map_err(|_| ExportError::InvalidOption { name: "limit", value: limit })?;
        }
        if let Some(path) = options.opt_str("t") {
            export_config.token.token_file = path;
        }
        if let Some(path) = options.opt_str("o") {
            export_config.file.file_base_path = path;
        }
        if let Some(list) = options.opt_str("r") {
            let stats = &mut export_config.enabled_stats;
            *stats = EnabledStats::default();
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match name {
                    "profile" => stats.profile = true,
                    "body_measurements" => stats.body_measurements = true,
                    "cycle" => stats.cycle = true,
                    "sleep" => stats.sleep = true,
                    "recovery" => stats.recovery = true,
                    "workout" => stats.workout = true,
                    other => {
                        return Err(ExportError::InvalidOption {
                            name: "resources",
                            value: format!("{other} (expected one of {})", RESOURCES.join(", ")),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &WhoopConfig {
        &self.export_config
    }

    pub fn client(&self) -> Result<&WhoopClient> {
        self.whoop_client.as_ref().ok_or(ExportError::NotLoggedIn)
    }

    /// Reuses the stored token when it still refreshes, otherwise runs the
    /// authorization code flow. `prompt` receives the authorization url and
    /// returns the code the user copied from the redirect.
    pub fn login<F>(&mut self, prompt: F) -> Result<&WhoopClient>
    where
        F: FnOnce(&str) -> io::Result<String>,
    {
        let token_file = PathBuf::from(&self.export_config.token.token_file);

        let mut client = None;
        if token_file.exists() {
            match self.oauth_manager.from_token(&token_file) {
                Ok(c) => {
                    info!("Reusing whoop token from {}", token_file.display());
                    client = Some(c);
                }
                Err(e) if !token_unusable(&e) => return Err(e.into()),
                Err(e) => {
                    warn!("Failed to load token: {}", e);
                    warn!("Deleting {} and restarting authorization", token_file.display());
                    fs::remove_file(&token_file).map_err(|source| ExportError::Io {
                        path: token_file.clone(),
                        source,
                    })?;
                }
            }
        }

        let client = match client {
            Some(c) => c,
            None => self.authorize_interactively(prompt)?,
        };
        client.store_token(&token_file)?;
        Ok(&*self.whoop_client.insert(client))
    }

    fn authorize_interactively<F>(&self, prompt: F) -> Result<WhoopClient>
    where
        F: FnOnce(&str) -> io::Result<String>,
    {
        let redirect_uri = &self.export_config.whoop.redirect_uri;
        let (url, _state) = self.oauth_manager.auth_url(redirect_uri, None, None)?;

        let code = prompt(&url).map_err(ExportError::Prompt)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ExportError::MissingCode);
        }
        Ok(self.oauth_manager.authorize(code, redirect_uri, None)?)
    }

    fn query(&self) -> CollectionQuery {
        let data = &self.export_config.data;
        let mut query = CollectionQuery::new()
            .limit(data.page_limit)
            .all_pages(data.all_pages);
        if !data.start_date.is_empty() {
            query = query.start(&data.start_date);
        }
        if !data.end_date.is_empty() {
            query = query.end(&data.end_date);
        }
        query
    }

    fn fetch_table<T: UserData>(&self, handler: DataHandler<'_, T>) -> Result<Table> {
        let handler = if self.export_config.data.localize_timestamps {
            handler.localized()
        } else {
            handler
        };
        let (table, _) = handler.collection_table(&self.query())?;
        Ok(table)
    }

    /// Exports every resource enabled in the config. Returns the files written.
    pub fn export_all(&self) -> Result<Vec<PathBuf>> {
        let client = self.client()?;
        let stats = &self.export_config.enabled_stats;
        let mut written = Vec::new();

        if stats.profile {
            let profile = client.user().profile()?;
            info!("Exporting profile of user {}", profile.user_id);
            written.extend(self.export("profile", &profile)?);
        }
        if stats.body_measurements {
            let measurements = client.user().body_measurements()?;
            written.extend(self.export("body_measurements", &measurements)?);
        }
        if stats.cycle {
            let table = self.fetch_table(client.cycle())?;
            written.extend(self.export("cycle", &table)?);
        }
        if stats.sleep {
            let table = self.fetch_table(client.sleep())?;
            written.extend(self.export("sleep", &table)?);
        }
        if stats.recovery {
            let table = self.fetch_table(client.recovery())?;
            written.extend(self.export("recovery", &table)?);
        }
        if stats.workout {
            let mut table = self.fetch_table(client.workout())?;
            annotate_sports(&mut table);
            written.extend(self.export("workout", &table)?);
        }
        Ok(written)
    }

    fn export<T: Serialize>(&self, name: &str, data: &T) -> Result<Option<PathBuf>> {
        match self.build_file_name(name)? {
            Some(path) => {
                self.save_as_json(data, &path)?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    fn build_file_name(&self, name: &str) -> Result<Option<PathBuf>> {
        let base_path = Path::new(&self.export_config.file.file_base_path);
        let path = base_path.join(format!("{name}.json"));

        if path.exists() {
            if !self.export_config.file.overwrite {
                info!("File: {} exists, but overwrite is disabled, ignoring", path.display());
                return Ok(None);
            }
            info!("File: {} exists, overwriting", path.display());
        } else {
            fs::create_dir_all(base_path).map_err(|source| ExportError::Io {
                path: base_path.to_path_buf(),
                source,
            })?;
            info!("Saving {} to file: {}", name, path.display());
        }
        Ok(Some(path))
    }

    fn save_as_json<T: Serialize>(&self, data: &T, path: &Path) -> Result<()> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, data)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}
