//! Template sources and template discovery.

use std::env;
use std::future::Future;
use std::path::PathBuf;

use log::{debug, warn};

use crate::error::{FieldBindingError, TemplateLoadError};
use crate::field_map::FORM_FIELD_MAP;
use crate::form::FormDocument;

/// Environment variable pointing at the template PDF.
pub const TEMPLATE_ENV_VAR: &str = "REPORT_FORM_TEMPLATE";

/// File name of the template asset.
pub const TEMPLATE_FILE_NAME: &str = "rendez-vous-de-parents.pdf";

/// Somewhere a blank form can be fetched from.
///
/// Each call returns a fresh copy of the bytes; the renderer parses them into
/// a new document per render.
pub trait TemplateSource {
    /// Fetches the template bytes. Dropping the future cancels the fetch.
    fn load(&self) -> impl Future<Output = Result<Vec<u8>, TemplateLoadError>> + Send;

    /// Human readable location, used in logs.
    fn describe(&self) -> String;
}

/// Template read from the local filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateFile {
    path: PathBuf,
}

impl TemplateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the first template found by [`locate_template`].
    pub fn locate() -> Result<Self, TemplateLoadError> {
        locate_template().map(Self::new)
    }
}

impl TemplateSource for TemplateFile {
    async fn load(&self) -> Result<Vec<u8>, TemplateLoadError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| TemplateLoadError::Io {
                location: self.path.display().to_string(),
                source,
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Template already held in memory, e.g. embedded in the binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateBytes {
    bytes: Vec<u8>,
}

impl TemplateBytes {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl TemplateSource for TemplateBytes {
    async fn load(&self) -> Result<Vec<u8>, TemplateLoadError> {
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory template ({} bytes)", self.bytes.len())
    }
}

/// Template served over HTTP, as the web front end fetches it.
///
/// Timeouts are configured on the supplied client.
#[cfg(feature = "remote")]
#[derive(Clone, Debug)]
pub struct TemplateUrl {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "remote")]
impl TemplateUrl {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[cfg(feature = "remote")]
impl TemplateSource for TemplateUrl {
    async fn load(&self) -> Result<Vec<u8>, TemplateLoadError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

fn template_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env::var_os(TEMPLATE_ENV_VAR) {
        if !path.is_empty() {
            candidates.push(PathBuf::from(path));
        }
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            let candidate = bin_dir.join("assets").join(TEMPLATE_FILE_NAME);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    let manifest_candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join(TEMPLATE_FILE_NAME);
    if !candidates.contains(&manifest_candidate) {
        candidates.push(manifest_candidate);
    }

    candidates
}

/// Finds the template on disk.
///
/// Checks `REPORT_FORM_TEMPLATE`, then `assets/rendez-vous-de-parents.pdf`
/// next to the executable, then under the crate manifest directory.
pub fn locate_template() -> Result<PathBuf, TemplateLoadError> {
    let mut attempts = Vec::new();

    for candidate in template_candidates() {
        if candidate.is_file() {
            debug!("Using report template at {}", candidate.display());
            return Ok(candidate);
        }
        let reason = if candidate.exists() {
            "not a file"
        } else {
            "missing"
        };
        attempts.push(format!("{} ({})", candidate.display(), reason));
    }

    if env::var_os(TEMPLATE_ENV_VAR).is_some() {
        warn!(
            "{} is set but does not point at a readable template",
            TEMPLATE_ENV_VAR
        );
    }

    Err(TemplateLoadError::NotFound { attempts })
}

/// Parses `bytes` and lists every mapped field the template cannot bind.
///
/// An empty list means any report can be rendered against this template.
pub fn check_template(bytes: &[u8]) -> Result<Vec<FieldBindingError>, TemplateLoadError> {
    let form = FormDocument::load(bytes)?;
    Ok(FORM_FIELD_MAP.check(&form))
}
