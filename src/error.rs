//! Errors raised while producing a report PDF.

use std::fmt;
use std::io;

use crate::field_map::FieldKind;

/// The template could not be fetched or is not a fillable PDF.
#[derive(Debug)]
pub enum TemplateLoadError {
    /// Reading the template from disk failed.
    Io {
        /// Location that was read.
        location: String,
        source: io::Error,
    },
    /// No template was found in any of the searched locations.
    NotFound {
        /// Every location tried, with the reason it was rejected.
        attempts: Vec<String>,
    },
    /// The bytes could not be parsed by `lopdf`.
    Parse(lopdf::Error),
    /// The trailer has no usable `/Root` catalog.
    MissingCatalog,
    /// The catalog carries no `/AcroForm`, so there is nothing to fill.
    MissingAcroForm,
    /// Fetching the template over HTTP failed.
    #[cfg(feature = "remote")]
    Http(reqwest::Error),
}

impl From<lopdf::Error> for TemplateLoadError {
    fn from(err: lopdf::Error) -> Self {
        Self::Parse(err)
    }
}

#[cfg(feature = "remote")]
impl From<reqwest::Error> for TemplateLoadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl fmt::Display for TemplateLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { location, .. } => write!(f, "Failed to read template at {location}"),
            Self::NotFound { attempts } => {
                let summary = if attempts.is_empty() {
                    "no search paths were available".to_owned()
                } else {
                    attempts.join(", ")
                };
                write!(
                    f,
                    "Unable to locate the report template. Checked: {summary}. Set REPORT_FORM_TEMPLATE or pass --template."
                )
            }
            Self::Parse(err) => write!(f, "Failed to parse template PDF: {err}"),
            Self::MissingCatalog => write!(f, "Template PDF catalog entry is missing"),
            Self::MissingAcroForm => write!(f, "Template PDF has no interactive form"),
            #[cfg(feature = "remote")]
            Self::Http(err) => write!(f, "Failed to fetch template: {err}"),
        }
    }
}

impl std::error::Error for TemplateLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            #[cfg(feature = "remote")]
            Self::Http(err) => Some(err),
            Self::NotFound { .. } | Self::MissingCatalog | Self::MissingAcroForm => None,
        }
    }
}

/// A mapped widget identifier does not match the loaded template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldBindingError {
    /// No field with this fully qualified name exists in the template.
    Missing { name: String },
    /// The field exists but is not of the expected kind.
    WrongKind { name: String, expected: FieldKind },
    /// The field exists but lacks an entry required to fill it.
    Malformed { name: String, reason: &'static str },
}

impl FieldBindingError {
    /// Returns the widget identifier the error refers to.
    pub fn field_name(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::WrongKind { name, .. }
            | Self::Malformed { name, .. } => name,
        }
    }
}

impl fmt::Display for FieldBindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "Template has no form field named '{name}'"),
            Self::WrongKind { name, expected } => {
                let expected = match expected {
                    FieldKind::Text => "a text field",
                    FieldKind::CheckBox => "a checkbox",
                };
                write!(f, "Form field '{name}' is not {expected}")
            }
            Self::Malformed { name, reason } => {
                write!(f, "Form field '{name}' cannot be filled: {reason}")
            }
        }
    }
}

impl std::error::Error for FieldBindingError {}

/// Flattening or encoding the filled form failed.
#[derive(Debug)]
pub enum SerializationError {
    /// The document structure could not be walked while flattening.
    Flatten(lopdf::Error),
    /// The flattened document could not be written out.
    Save(String),
}

impl From<lopdf::Error> for SerializationError {
    fn from(err: lopdf::Error) -> Self {
        Self::Flatten(err)
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flatten(err) => write!(f, "Failed to flatten form: {err}"),
            Self::Save(reason) => write!(f, "Failed to write PDF bytes: {reason}"),
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Flatten(err) => Some(err),
            Self::Save(_) => None,
        }
    }
}

/// Position of a render in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStage {
    Idle,
    Loading,
    Binding,
    Flattening,
    Serialized,
    Failed,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Binding => "binding",
            Self::Flattening => "flattening",
            Self::Serialized => "serialized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a render attempt. No partial output is produced.
#[derive(Debug)]
pub enum RenderError {
    TemplateLoad(TemplateLoadError),
    FieldBinding(FieldBindingError),
    Serialization(SerializationError),
}

impl RenderError {
    /// Stage the render was in when it failed.
    pub fn stage(&self) -> RenderStage {
        match self {
            Self::TemplateLoad(_) => RenderStage::Loading,
            Self::FieldBinding(_) => RenderStage::Binding,
            Self::Serialization(_) => RenderStage::Flattening,
        }
    }
}

impl From<TemplateLoadError> for RenderError {
    fn from(err: TemplateLoadError) -> Self {
        Self::TemplateLoad(err)
    }
}

impl From<FieldBindingError> for RenderError {
    fn from(err: FieldBindingError) -> Self {
        Self::FieldBinding(err)
    }
}

impl From<SerializationError> for RenderError {
    fn from(err: SerializationError) -> Self {
        Self::Serialization(err)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report rendering failed while {}", self.stage())
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TemplateLoad(err) => Some(err),
            Self::FieldBinding(err) => Some(err),
            Self::Serialization(err) => Some(err),
        }
    }
}
