use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::path::Path;

mod auth;
mod error;
mod handlers;
mod models;
mod sports;
mod table;

pub use crate::auth::{
    Credentials, Token, TokenResponse, WhoopOAuthManager, API_BASE, DEFAULT_REDIRECT_URI, SCOPES,
};
pub use crate::error::{Result, WhoopError};
pub use crate::handlers::{
    check_datetime, CollectionQuery, CycleHandler, DataHandler, RecoveryHandler, SleepHandler,
    UserHandler, WorkoutHandler, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use crate::models::{
    parse_timestamp, parse_utc_offset, Cycle, CycleScore, RecordMeta, Recovery, RecoveryScore,
    ScoreState, Sleep, SleepNeed, SleepScore, SleepStages, UserData, UserMeasurements,
    UserProfile, Workout, WorkoutScore, ZoneDuration, WHOOP_DATE_FORMAT,
};
pub use crate::sports::{sport_map, sport_name, SPORTS};
pub use crate::table::{Row, Table};

pub const API_VERSION: &str = "1";

/// Client for the Whoop developer API.
///
/// Owns the bearer token and an HTTP session whose default headers always
/// carry the current access token. Obtain one through
/// [`WhoopClient::authorize`] after sending the user to
/// [`WhoopClient::auth_url`], or reload a stored token with
/// [`WhoopClient::from_token`]. Data is read through the resource handlers
/// ([`user`](Self::user), [`cycle`](Self::cycle), [`sleep`](Self::sleep),
/// [`recovery`](Self::recovery), [`workout`](Self::workout)).
///
/// Requests are blocking and nothing is shared between threads; use one
/// client per thread if you need more.
pub struct WhoopClient {
    client: Client,
    base_url: String,
    token: Token,
    oauth_manager: Option<WhoopOAuthManager>,
    user_agent: String,
}

impl fmt::Debug for WhoopClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // token values stay out of logs
        f.debug_struct("WhoopClient")
            .field("base_url", &self.base_url)
            .field("scopes", &self.token.scopes)
            .field("can_refresh", &self.oauth_manager.is_some())
            .finish_non_exhaustive()
    }
}

impl WhoopClient {
    /// Wraps an existing token. Without credentials the client cannot refresh.
    pub fn new(token: Token, credentials: Option<Credentials>) -> Result<WhoopClient> {
        let oauth_manager = credentials
            .map(|c| WhoopOAuthManager::new(&c.client_id, &c.client_secret));
        WhoopClient::from_parts(token, oauth_manager)
    }

    pub(crate) fn from_parts(
        token: Token,
        oauth_manager: Option<WhoopOAuthManager>,
    ) -> Result<WhoopClient> {
        let base_url = oauth_manager
            .as_ref()
            .map_or(API_BASE, |m| m.base_url())
            .to_string();
        let user_agent = format!("whoop_client/{}", env!("CARGO_PKG_VERSION"));
        let client = WhoopClient::build_session(&token, &user_agent)?;
        Ok(WhoopClient {
            client,
            base_url,
            token,
            oauth_manager,
            user_agent,
        })
    }

    /// Sends all requests, token refreshes included, to another host.
    pub fn with_base_url(mut self, base_url: &str) -> WhoopClient {
        self.base_url = String::from(base_url.trim_end_matches('/'));
        self.oauth_manager = self
            .oauth_manager
            .take()
            .map(|m| m.with_base_url(base_url));
        self
    }

    fn build_session(token: &Token, user_agent: &str) -> Result<Client> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.access_token))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        Ok(Client::builder().default_headers(headers).build()?)
    }

    fn update_session(&mut self) -> Result<()> {
        self.client = WhoopClient::build_session(&self.token, &self.user_agent)?;
        Ok(())
    }

    /// Authorization page url and the state it carries. Pure string work,
    /// nothing is sent. A missing state is generated, a supplied one must be
    /// at least 8 characters.
    pub fn auth_url(
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        state: Option<&str>,
        scopes: Option<&[&str]>,
    ) -> Result<(String, String)> {
        WhoopOAuthManager::new(client_id, client_secret).auth_url(redirect_uri, state, scopes)
    }

    /// Exchanges the code Whoop appended to the redirect for a token.
    pub fn authorize(
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        scopes: Option<&[&str]>,
    ) -> Result<WhoopClient> {
        WhoopOAuthManager::new(client_id, client_secret).authorize(code, redirect_uri, scopes)
    }

    /// Loads a token written by [`store_token`](Self::store_token) and
    /// refreshes it.
    pub fn from_token(
        path: impl AsRef<Path>,
        client_id: &str,
        client_secret: &str,
    ) -> Result<WhoopClient> {
        WhoopOAuthManager::new(client_id, client_secret).from_token(path.as_ref())
    }

    /// Swaps the refresh token for a new access token.
    pub fn refresh(&mut self) -> Result<()> {
        let manager = self
            .oauth_manager
            .as_ref()
            .ok_or_else(|| WhoopError::validation("no client id or secret provided"))?;
        manager.refresh(&mut self.token)?;
        self.update_session()
    }

    pub fn store_token(&self, path: impl AsRef<Path>) -> Result<()> {
        self.token.store(path.as_ref())
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    fn build_api_url(&self, endpoint: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/developer/v{}/{}",
            self.base_url, API_VERSION, endpoint
        ))?)
    }

    /// GETs an API path below the versioned prefix and returns the JSON body.
    pub(crate) fn api_request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.build_api_url(endpoint)?;
        debug!("Whoop API requesting from: {}", url);

        let response = self.client.get(url).query(params).send()?;
        if response.status() != StatusCode::OK {
            return Err(WhoopError::Api {
                status: response.status(),
                url: response.url().to_string(),
            });
        }
        Ok(response.json()?)
    }

    pub fn user(&self) -> UserHandler<'_> {
        UserHandler::new(self)
    }

    pub fn cycle(&self) -> CycleHandler<'_> {
        DataHandler::new(self, "cycle")
    }

    pub fn sleep(&self) -> SleepHandler<'_> {
        DataHandler::new(self, "activity/sleep")
    }

    /// Recovery is listed under `recovery` but looked up per cycle.
    pub fn recovery(&self) -> RecoveryHandler<'_> {
        DataHandler::new(self, "recovery").with_single_path("cycle/@/recovery")
    }

    pub fn workout(&self) -> WorkoutHandler<'_> {
        DataHandler::new(self, "activity/workout")
    }
}
