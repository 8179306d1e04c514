use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, WhoopError};
use crate::WhoopClient;

pub const API_BASE: &str = "https://api.prod.whoop.com";
pub const DEFAULT_REDIRECT_URI: &str = "https://jwt.ms/";
const OAUTH_ROUTE: &str = "oauth/oauth2";
const MIN_STATE_LEN: usize = 8;

/// Scopes requested when the caller does not name any.
pub const SCOPES: [&str; 7] = [
    "offline",
    "read:recovery",
    "read:cycles",
    "read:sleep",
    "read:workout",
    "read:profile",
    "read:body_measurement",
];

/// Application credentials issued in the Whoop developer dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str) -> Credentials {
        Credentials {
            client_id: String::from(client_id),
            client_secret: String::from(client_secret),
        }
    }
}

/// Bearer token plus the bits needed to refresh it. Serialises to the flat
/// token file format: `access_token`, `expires_in`, `refresh_token`, `scopes`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Token {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    #[serde(skip, default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl Token {
    pub fn new(
        access_token: &str,
        expires_in: u64,
        scopes: Vec<String>,
        refresh_token: Option<String>,
    ) -> Token {
        Token {
            access_token: String::from(access_token),
            expires_in,
            refresh_token,
            scopes,
            issued_at: Utc::now(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime = u32::try_from(self.expires_in).unwrap_or(u32::MAX);
        self.issued_at + Duration::seconds(i64::from(lifetime))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at() < Utc::now()
    }

    /// Applies a refresh response in place. A response without a refresh
    /// token keeps the one we already hold.
    fn update(&mut self, response: TokenResponse) {
        self.access_token = response.access_token;
        self.expires_in = response.expires_in;
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        self.issued_at = Utc::now();
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WhoopError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| WhoopError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Stored whoop token in {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Token> {
        let contents = fs::read_to_string(path).map_err(|source| WhoopError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    pub fn granted_scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }
}

/// Knows the Whoop OAuth2.0 endpoints and turns authorization codes and
/// refresh tokens into access tokens.
#[derive(Debug, Clone)]
pub struct WhoopOAuthManager {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl WhoopOAuthManager {
    pub fn new(client_id: &str, client_secret: &str) -> WhoopOAuthManager {
        WhoopOAuthManager {
            client: Client::new(),
            base_url: String::from(API_BASE),
            credentials: Credentials::new(client_id, client_secret),
        }
    }

    /// Points both the OAuth and the API endpoints at another host, e.g. a
    /// local test server.
    pub fn with_base_url(mut self, base_url: &str) -> WhoopOAuthManager {
        self.base_url = String::from(base_url.trim_end_matches('/'));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn build_oauth_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, OAUTH_ROUTE, endpoint)
    }

    /// Builds the page the user has to visit to grant access. Returns the
    /// url together with the state it carries.
    pub fn auth_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
        scopes: Option<&[&str]>,
    ) -> Result<(String, String)> {
        let state = match state.filter(|s| !s.is_empty()) {
            Some(s) => String::from(s),
            None => random_state(),
        };
        if state.chars().count() < MIN_STATE_LEN {
            return Err(WhoopError::validation(format!(
                "state must be at least {MIN_STATE_LEN} characters long"
            )));
        }

        let scope = scopes.unwrap_or(&SCOPES).join(" ");
        let url = Url::parse_with_params(
            &self.build_oauth_url("auth"),
            &[
                ("scope", scope.as_str()),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("state", state.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
            ],
        )?;
        Ok((url.to_string(), state))
    }

    /// Posts a grant to the token endpoint. When `required` is given, every
    /// listed scope must be present in the grant.
    fn request_token(
        &self,
        form: &[(&str, &str)],
        required: Option<&[String]>,
    ) -> Result<(TokenResponse, Vec<String>)> {
        let url = self.build_oauth_url("token");
        debug!("Requesting token from: {}", url);

        let response = self.client.post(&url).form(form).send()?;
        if response.status() != StatusCode::OK {
            return Err(WhoopError::Authorization(response.status()));
        }

        let token: TokenResponse = response.json()?;
        let granted = token.granted_scopes();
        if let Some(required) = required {
            if let Some(missing) = required.iter().find(|s| !granted.contains(s)) {
                return Err(WhoopError::ScopeNotGranted(missing.clone()));
            }
        }
        info!("Token issued, expires in {} secs", token.expires_in);
        Ok((token, granted))
    }

    /// Exchanges an authorization code for a token and returns a ready client.
    pub fn authorize(
        &self,
        code: &str,
        redirect_uri: &str,
        scopes: Option<&[&str]>,
    ) -> Result<WhoopClient> {
        let requested: Option<Vec<String>> =
            scopes.map(|s| s.iter().map(|scope| String::from(*scope)).collect());
        let (response, granted) = self.request_token(
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
            requested.as_deref(),
        )?;

        let token = Token::new(
            &response.access_token,
            response.expires_in,
            granted,
            response.refresh_token,
        );
        WhoopClient::from_parts(token, Some(self.clone()))
    }

    /// Exchanges the refresh token held in `token` and updates it in place.
    pub fn refresh(&self, token: &mut Token) -> Result<()> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| WhoopError::validation("no refresh token provided"))?;

        let (response, _) = self.request_token(
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
            Some(&token.scopes),
        )?;
        token.update(response);
        Ok(())
    }

    /// Loads a stored token and refreshes it straight away, so a stale or
    /// revoked file fails here rather than on the first data request.
    pub fn from_token(&self, path: &Path) -> Result<WhoopClient> {
        let token = Token::load(path)?;
        info!("Loaded whoop token from {}", path.display());
        let mut client = WhoopClient::from_parts(token, Some(self.clone()))?;
        client.refresh()?;
        Ok(client)
    }
}

fn random_state() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::tempdir;

    const TOKEN_BODY: &str = r#"{
        "access_token": "access-1",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "scope": "offline read:recovery read:cycles read:sleep read:workout read:profile read:body_measurement",
        "token_type": "bearer"
    }"#;

    #[test]
    fn auth_url_test() {
        let manager = WhoopOAuthManager::new("1234", "5678");
        let (url, state) = manager
            .auth_url("http://localhost:5000", Some("abcdefgh"), None)
            .unwrap();
        assert_eq!(state, "abcdefgh");
        assert_eq!(
            url,
            "https://api.prod.whoop.com/oauth/oauth2/auth?\
             scope=offline+read%3Arecovery+read%3Acycles+read%3Asleep+read%3Aworkout\
             +read%3Aprofile+read%3Abody_measurement&\
             client_id=1234&\
             client_secret=5678&\
             state=abcdefgh&\
             redirect_uri=http%3A%2F%2Flocalhost%3A5000&\
             response_type=code"
        );
    }

    #[test]
    fn auth_url_deterministic_test() {
        let manager = WhoopOAuthManager::new("1234", "5678");
        let first = manager
            .auth_url("http://localhost:5000", Some("state-123"), Some(&["read:sleep"]))
            .unwrap();
        let second = manager
            .auth_url("http://localhost:5000", Some("state-123"), Some(&["read:sleep"]))
            .unwrap();
        assert_eq!(first, second);
        assert!(first.0.contains("scope=read%3Asleep&"));
    }

    #[test]
    fn auth_url_generates_state_test() {
        let manager = WhoopOAuthManager::new("1234", "5678");
        let (url, state) = manager.auth_url("http://localhost:5000", None, None).unwrap();
        assert!(state.len() >= 8);
        assert!(url.contains(&format!("state={state}")));
    }

    #[test]
    fn auth_url_short_state_test() {
        let manager = WhoopOAuthManager::new("1234", "5678");
        let err = manager
            .auth_url("http://localhost:5000", Some("short"), None)
            .unwrap_err();
        assert!(err.is_validation());

        // four characters, eight bytes
        let err = manager
            .auth_url("http://localhost:5000", Some("éééé"), None)
            .unwrap_err();
        assert!(err.is_validation());

        let (_, state) = manager
            .auth_url("http://localhost:5000", Some("éééééééé"), None)
            .unwrap();
        assert_eq!(state, "éééééééé");
    }

    #[test]
    fn auth_url_empty_state_test() {
        let manager = WhoopOAuthManager::new("1234", "5678");
        let (url, state) = manager.auth_url("http://localhost:5000", Some(""), None).unwrap();
        assert!(state.len() >= 8);
        assert!(url.contains(&format!("state={state}")));
    }

    #[test]
    fn authorize_test() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/oauth/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("grant_type=authorization_code".into()),
                Matcher::Regex("code=the-code".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKEN_BODY)
            .create();

        let manager = WhoopOAuthManager::new("1234", "5678").with_base_url(&server.url());
        let client = manager
            .authorize("the-code", "http://localhost:5000", Some(&["read:sleep"]))
            .unwrap();

        mock.assert();
        assert_eq!(client.token().access_token, "access-1");
        assert_eq!(client.token().refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(client.token().scopes.len(), 7);
    }

    #[test]
    fn authorize_rejected_test() {
        let mut server = Server::new();
        server
            .mock("POST", "/oauth/oauth2/token")
            .with_status(400)
            .create();

        let manager = WhoopOAuthManager::new("1234", "5678").with_base_url(&server.url());
        let err = manager
            .authorize("bad-code", "http://localhost:5000", None)
            .unwrap_err();
        assert!(matches!(err, WhoopError::Authorization(StatusCode::BAD_REQUEST)));
    }

    #[test]
    fn authorize_missing_scope_test() {
        let mut server = Server::new();
        server
            .mock("POST", "/oauth/oauth2/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "a", "expires_in": 10, "scope": "read:sleep"}"#)
            .create();

        let manager = WhoopOAuthManager::new("1234", "5678").with_base_url(&server.url());
        let err = manager
            .authorize("code", "http://localhost:5000", Some(&["read:sleep", "read:workout"]))
            .unwrap_err();
        assert!(matches!(err, WhoopError::ScopeNotGranted(ref s) if s == "read:workout"));
        assert!(err.is_authorization());
    }

    #[test]
    fn token_update_keeps_refresh_token_test() {
        let mut token = Token::new("old", 10, vec![], Some(String::from("keep-me")));
        token.update(TokenResponse {
            access_token: String::from("new"),
            expires_in: 20,
            refresh_token: None,
            scope: String::new(),
        });
        assert_eq!(token.access_token, "new");
        assert_eq!(token.expires_in, 20);
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
    }

    #[test]
    fn token_expiry_test() {
        let mut token = Token::new("a", 3600, vec![], None);
        assert!(!token.is_expired());
        token.issued_at = Utc::now() - Duration::seconds(7200);
        assert!(token.is_expired());
    }

    #[test]
    fn token_file_format_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let token = Token::new("a", 3600, vec![String::from("offline")], None);
        token.store(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let obj = raw.as_object().unwrap();
        assert_eq!(obj["access_token"], "a");
        assert_eq!(obj["expires_in"], 3600);
        assert_eq!(obj["scopes"][0], "offline");
        assert!(!obj.contains_key("refresh_token"));
        assert!(!obj.contains_key("issued_at"));
    }

    #[test]
    fn token_load_missing_file_test() {
        let dir = tempdir().unwrap();
        let err = Token::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, WhoopError::Io { .. }));
    }
}
