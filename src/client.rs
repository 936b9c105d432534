//! Authenticated access to the appliances' REST APIs.
//!
//! [ApiClient] holds the base URL and the current [Auth] and turns non-2xx responses and
//! undecodable bodies into [CheckError]s. The network itself sits behind the [Transport] trait;
//! [HttpTransport] is the blocking reqwest implementation used by the checks.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::credentials::Credentials;
use crate::CheckError;

const SESSION_HEADER: &str = "X-RestSvcSessionId";
const MAX_ERROR_BODY: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Clone, PartialEq)]
pub enum Auth {
    None,
    Basic(Credentials),
    Bearer(String),
    /// A session id sent in a vendor header.
    Session { header: String, id: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic(credentials) => f.debug_tuple("Basic").field(credentials).finish(),
            Auth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Auth::Session { header, .. } => f
                .debug_struct("Session")
                .field("header", header)
                .field("id", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub auth: Auth,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Executes a single request. Implementations report connection level failures only; status
/// codes are judged by [ApiClient].
pub trait Transport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, CheckError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Appliances usually ship self-signed certificates, so verification is opt-in.
    pub fn new(verify_tls: bool) -> Result<Self, CheckError> {
        if !verify_tls {
            tracing::debug!("TLS certificate verification disabled");
        }

        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|source| CheckError::Request {
                context: "building HTTP client".to_owned(),
                source,
            })?;

        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, CheckError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        builder = match &request.auth {
            Auth::None => builder,
            Auth::Basic(credentials) => {
                builder.basic_auth(credentials.username(), Some(credentials.password()))
            }
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Session { header, id } => builder.header(header.as_str(), id.as_str()),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let context = format!("{} {}", request.method, request.url);
        let response = builder.send().map_err(|source| CheckError::Request {
            context: context.clone(),
            source,
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or_default().to_owned(),
                )
            })
            .collect();
        let body = response
            .text()
            .map_err(|source| CheckError::Request { context, source })?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct ApiClient<T> {
    transport: T,
    base_url: String,
    api_version: Option<String>,
    auth: Auth,
}

impl<T: Transport> ApiClient<T> {
    /// A base URL without scheme is taken as an https host.
    pub fn new(transport: T, base_url: &str) -> Self {
        let base_url = base_url.trim().trim_end_matches('/');
        let base_url = if base_url.contains("://") {
            base_url.to_owned()
        } else {
            format!("https://{}", base_url)
        };

        ApiClient {
            transport,
            base_url,
            api_version: None,
            auth: Auth::None,
        }
    }

    /// Sends `x-api-version` with every following request.
    pub fn set_api_version(&mut self, version: Option<&str>) {
        self.api_version = version.map(|v| v.to_owned());
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_auth(&mut self, auth: Auth) {
        self.auth = auth
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn request(&self, method: Method, path: &str) -> ApiRequest {
        let mut headers = vec![("Accept".to_owned(), "application/json".to_owned())];
        if let Some(version) = &self.api_version {
            headers.push(("x-api-version".to_owned(), version.clone()));
        }

        ApiRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            auth: self.auth.clone(),
            headers,
            form: None,
        }
    }

    fn send(&self, request: ApiRequest, path: &str) -> Result<ApiResponse, CheckError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(&request)?;
        tracing::debug!(status = response.status, bytes = response.body.len(), "received response");

        if !response.is_success() {
            return Err(CheckError::Status {
                context: format!("{} {}", request.method, path),
                status: response.status,
                body: response.body.trim().chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Ok(response)
    }

    pub fn get_text(&self, path: &str) -> Result<String, CheckError> {
        let request = self.request(Method::Get, path);
        Ok(self.send(request, path)?.body)
    }

    pub fn get_json<D: DeserializeOwned>(&self, path: &str) -> Result<D, CheckError> {
        let body = self.get_text(path)?;
        serde_json::from_str(&body).map_err(|e| CheckError::parse(path, e))
    }

    /// OAuth2 password grant against `/api/oauth2/token`. The bearer token is used for every
    /// following request; it is never refreshed.
    pub fn login_oauth2(&mut self, credentials: &Credentials) -> Result<(), CheckError> {
        let path = "/api/oauth2/token";
        let mut request = self.request(Method::Post, path);
        request.form = Some(
            [
                ("grant_type", "password"),
                ("username", credentials.username()),
                ("password", credentials.password()),
                ("refresh_token", ""),
                ("code", ""),
                ("use_short_term_refresh", ""),
                ("vbr_token", ""),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        );

        let response = self.send(request, path)?;
        let token: TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| CheckError::parse(path, e))?;

        tracing::info!("obtained OAuth2 access token");
        self.auth = Auth::Bearer(token.access_token);
        Ok(())
    }

    /// Opens an Enterprise Manager session: basic auth against the session manager, which
    /// answers with the session id header used from then on.
    pub fn login_session(&mut self, credentials: &Credentials) -> Result<(), CheckError> {
        let path = "/api/sessionMngr/?v=latest";
        let mut request = self.request(Method::Post, path);
        request.auth = Auth::Basic(credentials.clone());

        let response = self.send(request, path)?;
        let id = response.header(SESSION_HEADER).ok_or_else(|| {
            CheckError::Transport(format!(
                "POST {path} returned HTTP {} without a {SESSION_HEADER} header",
                response.status
            ))
        })?;

        tracing::info!("opened REST API session");
        self.auth = Auth::Session {
            header: SESSION_HEADER.to_owned(),
            id: id.to_owned(),
        };
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;

    use super::*;

    /// Serves canned responses by method and path suffix and records every request.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        routes: Vec<(Method, String, ApiResponse)>,
        pub(crate) requests: RefCell<Vec<ApiRequest>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(self, method: Method, path: &str, status: u16, body: &str) -> Self {
            self.on_with_headers(method, path, status, body, &[])
        }

        pub(crate) fn on_with_headers(
            mut self,
            method: Method,
            path: &str,
            status: u16,
            body: &str,
            headers: &[(&str, &str)],
        ) -> Self {
            self.routes.push((
                method,
                path.to_owned(),
                ApiResponse {
                    status,
                    headers: headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body: body.to_owned(),
                },
            ));
            self
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, CheckError> {
            self.requests.borrow_mut().push(request.clone());
            self.routes
                .iter()
                .find(|(method, path, _)| *method == request.method && request.url.ends_with(path))
                .map(|(_, _, response)| response.clone())
                .ok_or_else(|| CheckError::Transport(format!("connection refused: {}", request.url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Alarms {
        result_count: u32,
    }

    #[test]
    fn test_base_url_normalization() {
        let client = ApiClient::new(FakeTransport::new(), "nsx.example.com/");
        assert_eq!(client.base_url(), "https://nsx.example.com");

        let client = ApiClient::new(FakeTransport::new(), "https://veeam:9419");
        assert_eq!(client.base_url(), "https://veeam:9419");
    }

    #[test]
    fn test_get_json_with_basic_auth() -> anyhow::Result<()> {
        let transport =
            FakeTransport::new().on(Method::Get, "/api/v1/alarms", 200, r#"{"result_count": 3}"#);
        let mut client = ApiClient::new(transport, "https://nsx");
        client.set_auth(Auth::Basic(Credentials::new("admin", "secret")));

        let alarms: Alarms = client.get_json("/api/v1/alarms")?;
        assert_eq!(alarms.result_count, 3);

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].url, "https://nsx/api/v1/alarms");
        assert_eq!(
            requests[0].auth,
            Auth::Basic(Credentials::new("admin", "secret"))
        );
        Ok(())
    }

    #[test]
    fn test_non_success_status() {
        let transport = FakeTransport::new().on(Method::Get, "/api/v1/alarms", 403, "Forbidden");
        let client = ApiClient::new(transport, "https://nsx");

        let err = client.get_text("/api/v1/alarms").unwrap_err();
        assert!(matches!(err, CheckError::Status { status: 403, .. }));
        assert_eq!(err.to_string(), "GET /api/v1/alarms returned HTTP 403: Forbidden");
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let transport = FakeTransport::new().on(Method::Get, "/api/v1/alarms", 200, "<html>");
        let client = ApiClient::new(transport, "https://nsx");

        let err = client.get_json::<Alarms>("/api/v1/alarms").unwrap_err();
        assert!(matches!(err, CheckError::Parse { .. }));
    }

    #[test]
    fn test_connection_failure() {
        let client = ApiClient::new(FakeTransport::new(), "https://nsx");
        let err = client.get_text("/api/v1/alarms").unwrap_err();
        assert!(matches!(err, CheckError::Transport(_)));
    }

    #[test]
    fn test_login_oauth2() -> anyhow::Result<()> {
        let transport = FakeTransport::new()
            .on(
                Method::Post,
                "/api/oauth2/token",
                200,
                r#"{"access_token": "tok", "token_type": "bearer", "expires_in": 900}"#,
            )
            .on(Method::Get, "/api/v1/jobs/states", 200, "{}");
        let mut client = ApiClient::new(transport, "https://veeam:9419");
        client.set_api_version(Some("1.2-rev0"));

        client.login_oauth2(&Credentials::new("CORP\\svc", "pw"))?;
        assert_eq!(client.auth(), &Auth::Bearer("tok".to_owned()));
        client.get_text("/api/v1/jobs/states")?;

        let requests = client.transport().requests.borrow();
        let form = requests[0].form.as_ref().unwrap();
        assert!(form.contains(&("grant_type".to_owned(), "password".to_owned())));
        assert!(form.contains(&("username".to_owned(), "CORP\\svc".to_owned())));
        assert!(requests[0]
            .headers
            .contains(&("x-api-version".to_owned(), "1.2-rev0".to_owned())));
        assert_eq!(requests[1].auth, Auth::Bearer("tok".to_owned()));
        Ok(())
    }

    #[test]
    fn test_login_oauth2_rejected() {
        let transport =
            FakeTransport::new().on(Method::Post, "/api/oauth2/token", 401, "invalid_grant");
        let mut client = ApiClient::new(transport, "https://veeam:9419");

        let err = client
            .login_oauth2(&Credentials::new("admin", "wrong"))
            .unwrap_err();
        assert!(matches!(err, CheckError::Status { status: 401, .. }));
        assert_eq!(client.auth(), &Auth::None);
    }

    #[test]
    fn test_login_session() -> anyhow::Result<()> {
        let transport = FakeTransport::new().on_with_headers(
            Method::Post,
            "/api/sessionMngr/?v=latest",
            201,
            "",
            &[("x-restsvcsessionid", "abc123")],
        );
        let mut client = ApiClient::new(transport, "https://em:9398");

        client.login_session(&Credentials::new("CORP\\admin", "pw"))?;
        assert_eq!(
            client.auth(),
            &Auth::Session {
                header: "X-RestSvcSessionId".to_owned(),
                id: "abc123".to_owned()
            }
        );
        Ok(())
    }

    #[test]
    fn test_login_session_without_header() {
        let transport =
            FakeTransport::new().on(Method::Post, "/api/sessionMngr/?v=latest", 201, "");
        let mut client = ApiClient::new(transport, "https://em:9398");

        let err = client
            .login_session(&Credentials::new("admin", "pw"))
            .unwrap_err();
        assert!(matches!(err, CheckError::Transport(_)));
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let debug = format!("{:?}", Auth::Bearer("tok".to_owned()));
        assert!(!debug.contains("tok"));

        let debug = format!(
            "{:?}",
            Auth::Session {
                header: SESSION_HEADER.to_owned(),
                id: "abc".to_owned()
            }
        );
        assert!(!debug.contains("abc"));
    }
}
