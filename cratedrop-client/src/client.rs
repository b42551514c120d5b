use crate::{Error, Result};
use cratedrop_models::{Context, Crate, CrateList, Track, TrackList};
use reqwest::{
    Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    sync::{Arc, RwLock},
};
use tracing::{debug, info, warn};
use url::Url;

/// Largest page the track listing endpoint hands out.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    client: reqwest::Client,
    access_token: Arc<RwLock<Option<String>>>,
}

/// Build a client for `server_url` and log in with the given account.
pub async fn new(server_url: &str, email: &str, password: &str) -> Result<Client> {
    let client = Client::with_server(server_url)?;
    client.login(email, password).await?;

    Ok(client)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackQuery {
    pub context: Context,
    pub limit: u32,
    pub offset: u32,
    pub search: Option<String>,
}

impl TrackQuery {
    pub fn new(context: Context, limit: u32) -> Self {
        Self {
            context,
            limit,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenPair {
    access_token: String,
}

#[derive(Deserialize)]
struct TrackEnvelope {
    track: Track,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<ApiError>,
}

enum Endpoint<'a> {
    Login,
    Refresh,
    Tracks,
    Track { id: &'a str },
    Stream { id: &'a str },
    Crates,
}

impl Display for Endpoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Login => f.write_str("api/auth/login"),
            Endpoint::Refresh => f.write_str("api/auth/refresh"),
            Endpoint::Tracks => f.write_str("api/tracks"),
            Endpoint::Track { id } => write!(f, "api/tracks/{id}"),
            Endpoint::Stream { id } => write!(f, "api/tracks/{id}/stream"),
            Endpoint::Crates => f.write_str("api/playlists"),
        }
    }
}

macro_rules! get {
    ($self:ident, $endpoint:expr, $params:expr) => {
        match $self.make_get_call($endpoint, $params).await {
            Ok(response) => match serde_json::from_str(response.as_str()) {
                Ok(item) => Ok(item),
                Err(error) => Err(Error::DeserializeJSON {
                    message: error.to_string(),
                }),
            },
            Err(error) => Err(error),
        }
    };
}

impl Client {
    /// A client that has not logged in yet.
    pub fn with_server(server_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url,
            client,
            access_token: Default::default(),
        })
    }

    fn endpoint(&self, endpoint: Endpoint<'_>) -> Result<Url> {
        Ok(self.base_url.join(&endpoint.to_string())?)
    }

    fn access_token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|token| token.clone())
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.access_token.write() {
            *current = token;
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let endpoint = self.endpoint(Endpoint::Login)?;
        info!("logging in as {email} with password **HIDDEN**");

        let response = self
            .client
            .post(endpoint)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("login rejected: {}", response.status());
            return Err(Error::Login);
        }

        let tokens: TokenPair = response.json().await.map_err(|_| Error::Login)?;
        self.set_access_token(Some(tokens.access_token));
        info!("Successfully logged in");

        Ok(())
    }

    /// Trade the refresh cookie for a new access token.
    pub async fn refresh(&self) -> Result<()> {
        let endpoint = self.endpoint(Endpoint::Refresh)?;
        debug!("refreshing access token");

        let response = self.client.post(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Refresh {
                message: status.to_string(),
            });
        }

        let tokens: TokenPair = response.json().await.map_err(|error| Error::Refresh {
            message: error.to_string(),
        })?;
        self.set_access_token(Some(tokens.access_token));

        Ok(())
    }

    pub async fn tracks(&self, query: &TrackQuery) -> Result<TrackList> {
        let endpoint = self.endpoint(Endpoint::Tracks)?;
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let offset = query.offset.to_string();

        let mut params = vec![("limit", limit.as_str()), ("offset", offset.as_str())];
        if let Some(playlist_id) = query.context.playlist_id() {
            params.push(("playlist_id", playlist_id));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("q", search));
        }

        get!(self, endpoint, Some(&params))
    }

    pub async fn track(&self, id: &str) -> Result<Track> {
        let endpoint = self.endpoint(Endpoint::Track { id })?;
        let envelope: TrackEnvelope = get!(self, endpoint, None)?;

        Ok(envelope.track)
    }

    pub async fn crates(&self) -> Result<Vec<Crate>> {
        let endpoint = self.endpoint(Endpoint::Crates)?;
        let params = [("limit", "100"), ("offset", "0")];
        let response: ApiResponse<CrateList> = get!(self, endpoint, Some(&params))?;

        if !response.success {
            return Err(Error::Api {
                message: response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }

        Ok(response.data.unwrap_or_default().crates)
    }

    pub fn stream_url(&self, id: &str) -> Result<String> {
        Ok(self.endpoint(Endpoint::Stream { id })?.to_string())
    }

    /// Fetch the audio bytes behind a stream url. An expired credential is
    /// reported as [`Error::Unauthorized`] and is not retried here.
    pub async fn stream(&self, stream_url: &str) -> Result<Vec<u8>> {
        debug!("streaming {stream_url}");
        let response = self
            .authorize(self.client.request(Method::GET, stream_url))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            return Err(Error::Api {
                message: status.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn send_get(&self, endpoint: &Url, params: Option<&[(&str, &str)]>) -> Result<Response> {
        debug!("calling {} endpoint, with params {params:?}", endpoint);
        let mut request = self.authorize(self.client.get(endpoint.clone()));
        if let Some(p) = params {
            request = request.query(p);
        }

        Ok(request.send().await?)
    }

    async fn make_get_call(&self, endpoint: Url, params: Option<&[(&str, &str)]>) -> Result<String> {
        let response = self.send_get(&endpoint, params).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("access token rejected, refreshing once");
            self.refresh().await?;
            let response = self.send_get(&endpoint, params).await?;
            return self.handle_response(response).await;
        }

        self.handle_response(response).await
    }

    async fn handle_response(&self, response: Response) -> Result<String> {
        let status = response.status();

        if status.is_success() {
            Ok(response.text().await?)
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Error::Unauthorized)
        } else {
            Err(Error::Api {
                message: status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    async fn logged_in(server: &MockServer, token: &str) -> Client {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": token, "refresh_token": "r" })),
            )
            .mount(server)
            .await;

        new(&server.uri(), "dj@example.com", "secret").await.unwrap()
    }

    fn track_list(ids: &[&str]) -> serde_json::Value {
        let tracks: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "original_filename": format!("{id}.mp3") }))
            .collect();

        json!({ "tracks": tracks, "total": ids.len(), "limit": 100, "offset": 0, "has_next": false })
    }

    #[tokio::test]
    async fn login_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = new(&server.uri(), "dj@example.com", "wrong").await;
        assert!(matches!(result, Err(Error::Login)));
    }

    #[tokio::test]
    async fn tracks_in_a_crate_use_bearer_and_playlist_filter() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "token-1").await;

        Mock::given(method("GET"))
            .and(path("/api/tracks"))
            .and(header("authorization", "Bearer token-1"))
            .and(query_param("playlist_id", "crate-7"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(track_list(&["a", "b"])))
            .expect(1)
            .mount(&server)
            .await;

        let query = TrackQuery::new(Context::Crate("crate-7".to_string()), 500);
        let list = client.tracks(&query).await.unwrap();

        assert_eq!(list.tracks.len(), 2);
        assert_eq!(list.tracks[1].id, "b");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_retried_once() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "stale").await;

        Mock::given(method("GET"))
            .and(path("/api/tracks"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tracks"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(track_list(&["a"])))
            .expect(1)
            .mount(&server)
            .await;

        let list = client
            .tracks(&TrackQuery::new(Context::All, 100))
            .await
            .unwrap();
        assert_eq!(list.tracks.len(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_refresh_error() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "stale").await;

        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(matches!(client.refresh().await, Err(Error::Refresh { .. })));
    }

    #[tokio::test]
    async fn stream_reports_unauthorized_without_retry() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "stale").await;

        Mock::given(method("GET"))
            .and(path("/api/tracks/a/stream"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let url = client.stream_url("a").unwrap();
        assert!(matches!(client.stream(&url).await, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn stream_returns_bytes() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "token").await;

        Mock::given(method("GET"))
            .and(path("/api/tracks/a/stream"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let url = client.stream_url("a").unwrap();
        assert_eq!(client.stream(&url).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn crates_are_unwrapped_from_api_response() {
        let server = MockServer::start().await;
        let client = logged_in(&server, "token").await;

        Mock::given(method("GET"))
            .and(path("/api/playlists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "playlists": [{ "id": "c1", "name": "Digging", "is_default": false }] }
            })))
            .mount(&server)
            .await;

        let crates = client.crates().await.unwrap();
        assert_eq!(crates.len(), 1);
        assert_eq!(crates[0].id, "c1");
    }

    #[test]
    fn stream_url_keeps_server_path_prefix() {
        let client = Client::with_server("http://localhost:8080/cratedrop").unwrap();
        assert_eq!(
            client.stream_url("abc").unwrap(),
            "http://localhost:8080/cratedrop/api/tracks/abc/stream"
        );
    }
}
