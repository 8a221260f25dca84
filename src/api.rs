//! Client for the report data service.
//!
//! Calls are authenticated with a bearer token held in an explicit
//! [`SessionContext`]. Keeping the token fresh is delegated to a
//! [`TokenRefresher`], which the refresh loop polls on a fixed interval.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::output::RenderedReport;

/// Environment variable holding the service base URL.
pub const API_ENV_VAR: &str = "REPORT_FORM_API";

/// How often the refresh loop checks the session.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Errors raised while talking to the report service.
#[derive(Debug)]
pub enum ApiError {
    /// No base URL was configured.
    MissingBaseUrl,
    /// The base URL cannot carry path segments.
    InvalidBaseUrl(String),
    Http(reqwest::Error),
    /// The service answered with a non-success status.
    Status { status: u16, endpoint: String },
    /// The token refresher could not produce a new session.
    Refresh(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBaseUrl => write!(f, "{API_ENV_VAR} is not set"),
            Self::InvalidBaseUrl(url) => write!(f, "Invalid service URL '{url}'"),
            Self::Http(_) => write!(f, "Request to the report service failed"),
            Self::Status { status, endpoint } => {
                write!(f, "Report service returned {status} for {endpoint}")
            }
            Self::Refresh(reason) => write!(f, "Unable to refresh the session: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Bearer token and its expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    token: String,
    expires_at: SystemTime,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Value of the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Whether the token expires within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: SystemTime) -> bool {
        match now.checked_add(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }
}

/// Exchanges an expiring session for a fresh one.
pub trait TokenRefresher {
    fn refresh(&self, current: &Session)
        -> impl Future<Output = Result<Session, ApiError>> + Send;
}

/// Shared handle on the current session.
#[derive(Clone, Debug)]
pub struct SessionContext {
    session: Arc<RwLock<Session>>,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
        }
    }

    pub async fn current(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn bearer(&self) -> String {
        self.session.read().await.bearer()
    }

    pub async fn replace(&self, session: Session) {
        *self.session.write().await = session;
    }

    /// Refreshes the session when it expires within `margin`.
    ///
    /// Returns whether a refresh happened.
    pub async fn refresh_if_expiring<R>(&self, refresher: &R, margin: Duration) -> Result<bool, ApiError>
    where
        R: TokenRefresher + Sync,
    {
        let current = self.current().await;
        if !current.expires_within(margin, SystemTime::now()) {
            return Ok(false);
        }
        let fresh = refresher.refresh(&current).await?;
        self.replace(fresh).await;
        debug!("Session refreshed");
        Ok(true)
    }

    /// Polls the session every `interval`, refreshing it before it can lapse
    /// between two polls. Abort the returned handle to stop the loop.
    pub fn spawn_refresh_loop<R>(&self, refresher: R, interval: Duration) -> JoinHandle<()>
    where
        R: TokenRefresher + Send + Sync + 'static,
    {
        let context = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = context.refresh_if_expiring(&refresher, interval).await {
                    warn!("{err}");
                }
            }
        })
    }
}

/// A student known to the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: u64,
    pub full_name: String,
}

/// A school year for which reports exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolYear {
    pub from: i32,
    pub to: i32,
}

impl SchoolYear {
    /// `"{from} - {to}"`, as listed to the user.
    pub fn label(&self) -> String {
        format!("{} - {}", self.from, self.to)
    }

    /// `{fullName}_{from}_{to}`; delivery adds the `.pdf` extension.
    pub fn bundle_filename(&self, full_name: &str) -> String {
        format!("{}_{}_{}", full_name, self.from, self.to)
    }
}

/// Students whose name contains `query`, ignoring case.
pub fn filter_students<'a>(students: &'a [Student], query: &str) -> Vec<&'a Student> {
    let query = query.to_lowercase();
    students
        .iter()
        .filter(|student| student.full_name.to_lowercase().contains(&query))
        .collect()
}

/// Bearer-authenticated client for the report service.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionContext) -> Result<Self, ApiError> {
        let parsed =
            Url::parse(base_url).map_err(|_| ApiError::InvalidBaseUrl(base_url.to_owned()))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_owned()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: parsed,
            session,
        })
    }

    /// Reads the base URL from `REPORT_FORM_API`.
    pub fn from_env(session: SessionContext) -> Result<Self, ApiError> {
        let base_url = std::env::var(API_ENV_VAR).map_err(|_| ApiError::MissingBaseUrl)?;
        Self::new(&base_url, session)
    }

    /// `GET /students`
    pub async fn students(&self) -> Result<Vec<Student>, ApiError> {
        let response = self.send(Method::GET, &["students"]).await?;
        Ok(response.json().await?)
    }

    /// `GET /reports/{fullName}`
    pub async fn years(&self, full_name: &str) -> Result<Vec<SchoolYear>, ApiError> {
        let response = self.send(Method::GET, &["reports", full_name]).await?;
        Ok(response.json().await?)
    }

    /// `GET /reports/{fullName}/{from}/{to}`: every report of the year as one PDF.
    pub async fn report_bundle(
        &self,
        full_name: &str,
        year: SchoolYear,
    ) -> Result<RenderedReport, ApiError> {
        let from = year.from.to_string();
        let to = year.to.to_string();
        let response = self
            .send(Method::GET, &["reports", full_name, &from, &to])
            .await?;
        let bytes = response.bytes().await?.to_vec();
        Ok(RenderedReport::new(bytes, year.bundle_filename(full_name)))
    }

    /// `DELETE /students/{fullName}`
    pub async fn delete_student(&self, full_name: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, &["students", full_name]).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, segments: &[&str]) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(segments)?;
        let endpoint = format!("{} {}", method, url.path());
        debug!("{endpoint}");

        let response = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, self.session.bearer().await)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                endpoint,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _current: &Session) -> Result<Session, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session::new(
                format!("token-{call}"),
                SystemTime::now() + Duration::from_secs(3600),
            ))
        }
    }

    fn student(id: u64, full_name: &str) -> Student {
        Student {
            id,
            full_name: full_name.to_owned(),
        }
    }

    #[test]
    fn session_expiry_uses_margin() {
        let now = SystemTime::now();
        let session = Session::new("abc", now + Duration::from_secs(300));
        assert!(session.expires_within(REFRESH_INTERVAL, now));
        assert!(!session.expires_within(Duration::from_secs(60), now));
        assert_eq!(session.bearer(), "Bearer abc");
    }

    #[tokio::test]
    async fn refresh_only_when_expiring() {
        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };
        let context = SessionContext::new(Session::new(
            "fresh",
            SystemTime::now() + Duration::from_secs(3600),
        ));
        let refreshed = context
            .refresh_if_expiring(&refresher, REFRESH_INTERVAL)
            .await
            .expect("no refresh needed");
        assert!(!refreshed);
        assert_eq!(context.current().await.token(), "fresh");

        context
            .replace(Session::new("stale", SystemTime::now()))
            .await;
        let refreshed = context
            .refresh_if_expiring(&refresher, REFRESH_INTERVAL)
            .await
            .expect("refresh succeeds");
        assert!(refreshed);
        assert_eq!(context.bearer().await, "Bearer token-1");
    }

    #[test]
    fn student_search_ignores_case() {
        let students = vec![student(1, "Léa Martin"), student(2, "Hugo Bernard")];
        let found = filter_students(&students, "MART");
        assert_eq!(found, vec![&students[0]]);
        assert_eq!(filter_students(&students, "").len(), 2);
    }

    #[test]
    fn years_are_labelled_and_named() {
        let years: Vec<SchoolYear> =
            serde_json::from_str(r#"[{"from":2023,"to":2024}]"#).expect("parse years");
        assert_eq!(years[0].label(), "2023 - 2024");
        assert_eq!(years[0].bundle_filename("Léa Martin"), "Léa Martin_2023_2024");
    }

    #[test]
    fn endpoints_encode_student_names() {
        let session = SessionContext::new(Session::new("abc", SystemTime::now()));
        let client = ApiClient::new("https://api.example.org/v1/", session).expect("valid url");
        let url = client
            .endpoint(&["reports", "Léa Martin", "2023", "2024"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://api.example.org/v1/reports/L%C3%A9a%20Martin/2023/2024"
        );
    }

    #[test]
    fn students_deserialize_from_camel_case() {
        let students: Vec<Student> =
            serde_json::from_str(r#"[{"id":7,"fullName":"Hugo Bernard"}]"#).expect("parse");
        assert_eq!(students, vec![student(7, "Hugo Bernard")]);
    }
}
