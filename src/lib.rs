//! Core entry point for the report_form crate.
//!
//! Fills the "rendez-vous de parents" PDF template from a [`ReportRecord`]
//! and flattens it into a read-only document ready for download.

pub mod appearance;
pub mod error;
pub mod field_map;
pub mod flatten;
pub mod form;
pub mod model;
pub mod output;
pub mod renderer;
pub mod sample;
pub mod template;

#[cfg(feature = "remote")]
pub mod api;

pub use error::{FieldBindingError, RenderError, RenderStage, SerializationError, TemplateLoadError};
pub use field_map::{FieldKind, FormFieldMap, FORM_FIELD_MAP, FORM_FIELD_MAP_VERSION};
pub use form::FormDocument;
pub use model::{Attendee, Grade, MeetingRequester, Objective, ReportRecord, ValidationError};
pub use output::{DataUriDownload, DirectoryDownload, Download, RenderedReport};
pub use renderer::{OverflowPolicy, ReportRenderer};
pub use sample::SampleTemplate;
pub use template::{locate_template, TemplateBytes, TemplateFile, TemplateSource};
