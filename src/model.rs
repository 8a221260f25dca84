//! Data structures describing a parent-meeting report.
//!
//! The types mirror the JSON records stored by the report list and creation
//! pages (camelCase keys, tags as upper-case strings). Categorical tags are
//! parsed into enums with a catch-all variant so that free-text values typed by
//! teachers survive deserialization and reach the renderer untouched.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// School grade of the student.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// Cours préparatoire.
    #[serde(rename = "CP")]
    Cp,
    /// Cours élémentaire 1.
    #[serde(rename = "CE1")]
    Ce1,
    /// Cours élémentaire 2.
    #[serde(rename = "CE2")]
    Ce2,
    /// Cours moyen 1.
    #[serde(rename = "CM1")]
    Cm1,
    /// Cours moyen 2.
    #[serde(rename = "CM2")]
    Cm2,
}

impl Grade {
    /// Returns the label written into the form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cp => "CP",
            Self::Ce1 => "CE1",
            Self::Ce2 => "CE2",
            Self::Cm1 => "CM1",
            Self::Cm2 => "CM2",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for the meeting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MeetingRequester {
    Parents,
    Teacher,
    /// Free text entered in place of a known tag.
    Other(String),
}

impl From<String> for MeetingRequester {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "PARENTS" => Self::Parents,
            "TEACHER" => Self::Teacher,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for MeetingRequester {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_owned())
    }
}

impl From<MeetingRequester> for String {
    fn from(tag: MeetingRequester) -> Self {
        match tag {
            MeetingRequester::Parents => "PARENTS".to_owned(),
            MeetingRequester::Teacher => "TEACHER".to_owned(),
            MeetingRequester::Other(text) => text,
        }
    }
}

/// A person attending the meeting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Attendee {
    Mother,
    Father,
    Student,
    Principal,
    /// Free text entered in place of a known tag, e.g. a speech therapist.
    Other(String),
}

impl From<String> for Attendee {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "MOTHER" => Self::Mother,
            "FATHER" => Self::Father,
            "STUDENT" => Self::Student,
            "PRINCIPAL" => Self::Principal,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for Attendee {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_owned())
    }
}

impl From<Attendee> for String {
    fn from(tag: Attendee) -> Self {
        match tag {
            Attendee::Mother => "MOTHER".to_owned(),
            Attendee::Father => "FATHER".to_owned(),
            Attendee::Student => "STUDENT".to_owned(),
            Attendee::Principal => "PRINCIPAL".to_owned(),
            Attendee::Other(text) => text,
        }
    }
}

/// Topic discussed during the meeting.
///
/// Objectives come from a fixed checkbox group, so there is no free-text
/// branch on the form. Unrecognized values are kept as [`Objective::Unknown`]
/// and ignored when the form is filled.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Objective {
    Learning,
    Jobs,
    Relationships,
    Adaptations,
    Projects,
    Unknown(String),
}

impl From<String> for Objective {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "LEARNING" => Self::Learning,
            "JOBS" => Self::Jobs,
            "RELATIONSHIPS" => Self::Relationships,
            "ADAPTATIONS" => Self::Adaptations,
            "PROJECTS" => Self::Projects,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<&str> for Objective {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_owned())
    }
}

impl From<Objective> for String {
    fn from(tag: Objective) -> Self {
        match tag {
            Objective::Learning => "LEARNING".to_owned(),
            Objective::Jobs => "JOBS".to_owned(),
            Objective::Relationships => "RELATIONSHIPS".to_owned(),
            Objective::Adaptations => "ADAPTATIONS".to_owned(),
            Objective::Projects => "PROJECTS".to_owned(),
            Objective::Unknown(text) => text,
        }
    }
}

/// One parent/teacher meeting about a student.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    date: String,
    student_name: String,
    grade: Grade,
    teacher_name: String,
    details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    important_infos: Option<String>,
    meeting_by: Vec<MeetingRequester>,
    people_present: Vec<Attendee>,
    objectives: Vec<Objective>,
}

impl ReportRecord {
    /// Creates a report with empty details and no categorical tags.
    pub fn new(
        date: impl Into<String>,
        student_name: impl Into<String>,
        grade: Grade,
        teacher_name: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            student_name: student_name.into(),
            grade,
            teacher_name: teacher_name.into(),
            details: String::new(),
            important_infos: None,
            meeting_by: Vec::new(),
            people_present: Vec::new(),
            objectives: Vec::new(),
        }
    }

    /// Parses a report from its stored JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn student_name(&self) -> &str {
        &self.student_name
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn teacher_name(&self) -> &str {
        &self.teacher_name
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Returns the important information block, if any was entered.
    pub fn important_infos(&self) -> Option<&str> {
        self.important_infos.as_deref()
    }

    pub fn meeting_by(&self) -> &[MeetingRequester] {
        &self.meeting_by
    }

    pub fn people_present(&self) -> &[Attendee] {
        &self.people_present
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// Sets the meeting details and returns the updated report.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Sets the important information block and returns the updated report.
    pub fn with_important_infos(mut self, infos: impl Into<Option<String>>) -> Self {
        self.important_infos = infos.into();
        self
    }

    /// Replaces the meeting requesters, keeping their order.
    pub fn with_meeting_by<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<MeetingRequester>,
    {
        self.meeting_by = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the attendees, keeping their order.
    pub fn with_people_present<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Attendee>,
    {
        self.people_present = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the objectives, keeping their order.
    pub fn with_objectives<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Objective>,
    {
        self.objectives = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the constraints enforced by the report creation form.
    ///
    /// Every violation is collected so the caller can show them all at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if self.student_name.trim().is_empty() {
            violations.push(Violation::MissingStudentName);
        }
        if self.teacher_name.trim().is_empty() {
            violations.push(Violation::MissingTeacherName);
        }
        if self.date.trim().is_empty() {
            violations.push(Violation::MissingDate);
        }
        if self.details.trim().is_empty() {
            violations.push(Violation::MissingDetails);
        }
        if self.meeting_by.is_empty() {
            violations.push(Violation::NoMeetingRequester);
        }
        if self.people_present.is_empty() {
            violations.push(Violation::NobodyPresent);
        }
        if self.objectives.is_empty() {
            violations.push(Violation::NoObjective);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

/// A single failed constraint on a [`ReportRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    MissingStudentName,
    MissingTeacherName,
    MissingDate,
    MissingDetails,
    NoMeetingRequester,
    NobodyPresent,
    NoObjective,
}

impl Violation {
    /// Message shown to teachers, worded as on the creation form.
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingStudentName => "Veuillez renseigner le nom de l'élève",
            Self::MissingTeacherName => "Veuillez renseigner l'enseignant de l'élève",
            Self::MissingDate => "Veuillez renseigner la date du rendez-vous",
            Self::MissingDetails => "Veuillez renseigner les details du rendez-vous",
            Self::NoMeetingRequester => "Personne n'a demandé ce rendez-vous ?",
            Self::NobodyPresent => "Personne n'était présent ?",
            Self::NoObjective => "Veuillez selectionner au moins 1 objectif",
        }
    }
}

/// Errors returned by [`ReportRecord::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    /// Returns the violations in form order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self
            .violations
            .iter()
            .map(|violation| violation.message())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "Invalid report: {messages}")
    }
}

impl std::error::Error for ValidationError {}

/// Distinct teacher and student names seen across stored reports.
///
/// Used to pre-fill the autocomplete inputs when a new report is written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameSuggestions {
    teachers: BTreeSet<String>,
    students: BTreeSet<String>,
}

impl NameSuggestions {
    /// Collects non-empty names from the given reports.
    pub fn collect<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a ReportRecord>,
    {
        let mut suggestions = Self::default();
        for report in reports {
            if !report.teacher_name.is_empty() {
                suggestions.teachers.insert(report.teacher_name.clone());
            }
            if !report.student_name.is_empty() {
                suggestions.students.insert(report.student_name.clone());
            }
        }
        suggestions
    }

    pub fn teachers(&self) -> impl Iterator<Item = &str> {
        self.teachers.iter().map(String::as_str)
    }

    pub fn students(&self) -> impl Iterator<Item = &str> {
        self.students.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED_REPORT: &str = r#"{
        "date": "2022-03-14",
        "studentName": "Léa Martin",
        "grade": "CE2",
        "teacherName": "M. Durand",
        "details": "Point sur la lecture.",
        "meetingBy": ["TEACHER", "Orthophoniste"],
        "peoplePresent": ["MOTHER", "Mme Petit"],
        "objectives": ["LEARNING", "SPORT"]
    }"#;

    #[test]
    fn parses_stored_json_with_free_text_tags() {
        let report = ReportRecord::from_json(STORED_REPORT).expect("parse report");
        assert_eq!(report.grade(), Grade::Ce2);
        assert_eq!(report.important_infos(), None);
        assert_eq!(
            report.meeting_by(),
            &[
                MeetingRequester::Teacher,
                MeetingRequester::Other("Orthophoniste".into())
            ]
        );
        assert_eq!(
            report.people_present(),
            &[Attendee::Mother, Attendee::Other("Mme Petit".into())]
        );
        assert_eq!(
            report.objectives(),
            &[Objective::Learning, Objective::Unknown("SPORT".into())]
        );
    }

    #[test]
    fn rejects_unknown_grade() {
        let json = STORED_REPORT.replace("CE2", "6EME");
        assert!(ReportRecord::from_json(&json).is_err());
    }

    #[test]
    fn tags_serialize_back_to_their_stored_strings() {
        let report = ReportRecord::from_json(STORED_REPORT).expect("parse report");
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["meetingBy"][1], "Orthophoniste");
        assert_eq!(value["objectives"][0], "LEARNING");
        assert_eq!(value["grade"], "CE2");
    }

    #[test]
    fn validate_collects_every_violation() {
        let report = ReportRecord::new("", " ", Grade::Cp, "Mme Roux");
        let err = report.validate().unwrap_err();
        assert_eq!(
            err.violations(),
            &[
                Violation::MissingStudentName,
                Violation::MissingDate,
                Violation::MissingDetails,
                Violation::NoMeetingRequester,
                Violation::NobodyPresent,
                Violation::NoObjective,
            ]
        );
        assert!(err.to_string().contains("Personne n'était présent ?"));
    }

    #[test]
    fn complete_report_validates() {
        let report = ReportRecord::new("2022-03-14", "Léa", Grade::Cm1, "M. Durand")
            .with_details("RAS")
            .with_meeting_by(["PARENTS"])
            .with_people_present(["FATHER"])
            .with_objectives(["JOBS"]);
        assert!(report.validate().is_ok());
    }

    #[test]
    fn suggestions_are_distinct_and_sorted() {
        let a = ReportRecord::new("d", "Zoé", Grade::Cp, "Mme Roux");
        let b = ReportRecord::new("d", "Adam", Grade::Cp, "Mme Roux");
        let c = ReportRecord::new("d", "Zoé", Grade::Cp, "");
        let suggestions = NameSuggestions::collect([&a, &b, &c]);
        assert_eq!(suggestions.students().collect::<Vec<_>>(), ["Adam", "Zoé"]);
        assert_eq!(suggestions.teachers().collect::<Vec<_>>(), ["Mme Roux"]);
    }
}
