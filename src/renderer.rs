//! Report rendering pipeline.
//!
//! A render walks `Idle -> Loading -> Binding -> Flattening -> Serialized`.
//! The template is parsed into a fresh [`FormDocument`] on every call, so
//! renders share no mutable state and a dropped future leaves nothing behind.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::{FieldBindingError, RenderError, RenderStage};
use crate::field_map::FORM_FIELD_MAP;
use crate::flatten::flatten;
use crate::form::{CheckBox, FormDocument, TextField};
use crate::model::{Attendee, ReportRecord};
use crate::output::{suggested_filename, RenderedReport};
use crate::template::TemplateSource;

/// How unrecognized attendees are written into the free-text field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Each unrecognized attendee overwrites the previous one.
    #[default]
    LastWins,
    /// Unrecognized attendees are joined with the separator.
    Join(String),
}

impl OverflowPolicy {
    fn resolve(&self, values: &[&str]) -> Option<String> {
        match self {
            Self::LastWins => values.last().map(|value| (*value).to_owned()),
            Self::Join(_) if values.is_empty() => None,
            Self::Join(separator) => Some(values.join(separator)),
        }
    }
}

/// Builder for [`ReportRenderer`].
#[derive(Clone, Debug)]
pub struct ReportRendererBuilder<S> {
    source: S,
    overflow: OverflowPolicy,
}

impl<S: TemplateSource> ReportRendererBuilder<S> {
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn build(self) -> ReportRenderer<S> {
        ReportRenderer {
            source: self.source,
            overflow: self.overflow,
        }
    }
}

/// Fills the meeting report template and flattens it into a read-only PDF.
#[derive(Clone, Debug)]
pub struct ReportRenderer<S> {
    source: S,
    overflow: OverflowPolicy,
}

impl<S: TemplateSource> ReportRenderer<S> {
    /// Renderer with the default overflow policy.
    pub fn new(source: S) -> Self {
        Self::builder(source).build()
    }

    pub fn builder(source: S) -> ReportRendererBuilder<S> {
        ReportRendererBuilder {
            source,
            overflow: OverflowPolicy::default(),
        }
    }

    /// Produces the flattened report and its suggested filename.
    pub async fn render(&self, report: &ReportRecord) -> Result<RenderedReport, RenderError> {
        let mut stages = StageLog::new(report.student_name());

        let mut form = self.fill_tracked(report, &mut stages).await?;

        stages.advance(RenderStage::Flattening);
        let bytes = flatten(&mut form)
            .and_then(|_| form.save())
            .map_err(|err| stages.fail(err.into()))?;

        stages.advance(RenderStage::Serialized);
        Ok(RenderedReport::new(bytes, suggested_filename(report)))
    }

    /// Loads the template and binds `report` without flattening.
    ///
    /// The returned form can still be inspected field by field.
    pub async fn fill(&self, report: &ReportRecord) -> Result<FormDocument, RenderError> {
        let mut stages = StageLog::new(report.student_name());
        self.fill_tracked(report, &mut stages).await
    }

    async fn fill_tracked(
        &self,
        report: &ReportRecord,
        stages: &mut StageLog<'_>,
    ) -> Result<FormDocument, RenderError> {
        stages.advance(RenderStage::Loading);
        debug!("Loading template from {}", self.source.describe());
        let mut form = match self.source.load().await {
            Ok(bytes) => FormDocument::load(&bytes),
            Err(err) => Err(err),
        }
        .map_err(|err| stages.fail(err.into()))?;

        stages.advance(RenderStage::Binding);
        bind(&mut form, report, &self.overflow).map_err(|err| stages.fail(err.into()))?;
        Ok(form)
    }
}

struct StageLog<'a> {
    student: &'a str,
    stage: RenderStage,
}

impl<'a> StageLog<'a> {
    fn new(student: &'a str) -> Self {
        Self {
            student,
            stage: RenderStage::Idle,
        }
    }

    fn advance(&mut self, next: RenderStage) {
        debug!("Report for {}: {} -> {}", self.student, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: RenderError) -> RenderError {
        debug!(
            "Report for {}: {} -> {} ({})",
            self.student,
            self.stage,
            RenderStage::Failed,
            err
        );
        self.stage = RenderStage::Failed;
        err
    }
}

struct Handles {
    texts: BTreeMap<&'static str, TextField>,
    checkboxes: BTreeMap<&'static str, CheckBox>,
}

impl Handles {
    fn resolve(form: &FormDocument) -> Result<Self, FieldBindingError> {
        let texts = FORM_FIELD_MAP
            .text_fields()
            .into_iter()
            .map(|name| form.text_field(name).map(|field| (name, field)))
            .collect::<Result<_, _>>()?;
        let checkboxes = FORM_FIELD_MAP
            .checkbox_fields()
            .into_iter()
            .map(|name| form.checkbox(name).map(|field| (name, field)))
            .collect::<Result<_, _>>()?;
        Ok(Self { texts, checkboxes })
    }

    fn text(&self, name: &str) -> Result<&TextField, FieldBindingError> {
        self.texts.get(name).ok_or_else(|| missing(name))
    }

    fn checkbox(&self, name: &str) -> Result<&CheckBox, FieldBindingError> {
        self.checkboxes.get(name).ok_or_else(|| missing(name))
    }
}

fn missing(name: &str) -> FieldBindingError {
    FieldBindingError::Missing {
        name: name.to_owned(),
    }
}

/// Writes `report` into `form`.
///
/// Every mapped field is resolved before the first write, so a template that
/// lacks one of them is rejected with the document untouched.
pub fn bind(
    form: &mut FormDocument,
    report: &ReportRecord,
    overflow: &OverflowPolicy,
) -> Result<(), FieldBindingError> {
    let map = &FORM_FIELD_MAP;
    let handles = Handles::resolve(form)?;

    // Absent infos still overwrite whatever the template carries.
    let scalars = [
        (map.date, report.date()),
        (map.grade, report.grade().as_str()),
        (map.student_name, report.student_name()),
        (map.teacher_name, report.teacher_name()),
        (map.details, report.details()),
        (map.important_infos, report.important_infos().unwrap_or_default()),
    ];
    for (name, value) in scalars {
        form.set_text(handles.text(name)?, value)?;
        debug!("Bound {name:?}");
    }

    for tag in report.meeting_by() {
        form.check(handles.checkbox(map.meeting_by_checkbox(tag))?)?;
    }

    let mut overflow_values = Vec::new();
    for tag in report.people_present() {
        form.check(handles.checkbox(map.people_present_checkbox(tag))?)?;
        if let Attendee::Other(text) = tag {
            overflow_values.push(text.as_str());
        }
    }
    if let Some(value) = overflow.resolve(&overflow_values) {
        form.set_text(handles.text(map.people_present.other_text)?, &value)?;
    }

    for tag in report.objectives() {
        match map.objective_checkbox(tag) {
            Some(name) => form.check(handles.checkbox(name)?)?,
            None => warn!("Ignoring unrecognized objective {:?}", String::from(tag.clone())),
        }
    }

    Ok(())
}
