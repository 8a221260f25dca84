//! Widget identifiers of the parent-meeting report template.
//!
//! The names below must byte-match the fields embedded in the template asset,
//! misspellings included. [`FORM_FIELD_MAP`] is the only copy of the table.

use crate::error::FieldBindingError;
use crate::form::FormDocument;
use crate::model::{Attendee, MeetingRequester, Objective};

/// Version of the template layout the map was written against.
pub const FORM_FIELD_MAP_VERSION: &str = "rendez-vous-de-parents/1";

/// Checkboxes for who asked for the meeting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeetingByFields {
    pub parents: &'static str,
    pub teacher: &'static str,
    pub other: &'static str,
}

/// Checkboxes for attendees, plus the free-text overflow field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeoplePresentFields {
    pub father: &'static str,
    pub mother: &'static str,
    pub student: &'static str,
    pub principal: &'static str,
    pub other: &'static str,
    pub other_text: &'static str,
}

/// Checkboxes for meeting objectives. There is no "other" entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectiveFields {
    pub learning: &'static str,
    pub jobs: &'static str,
    pub relationships: &'static str,
    pub adaptations: &'static str,
    pub projects: &'static str,
}

/// Kind of widget a mapped identifier must resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    CheckBox,
}

/// Association between report fields and template widget names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormFieldMap {
    pub date: &'static str,
    pub grade: &'static str,
    pub student_name: &'static str,
    pub teacher_name: &'static str,
    pub details: &'static str,
    pub important_infos: &'static str,
    pub meeting_by: MeetingByFields,
    pub people_present: PeoplePresentFields,
    pub objectives: ObjectiveFields,
}

pub const FORM_FIELD_MAP: FormFieldMap = FormFieldMap {
    date: "DATE",
    grade: "classes",
    student_name: "ELEVE",
    teacher_name: "Champ texte0",
    details: "POINTS ABORDES",
    important_infos: "INFOS",
    meeting_by: MeetingByFields {
        parents: "parents",
        teacher: "enseignant",
        other: "autre",
    },
    people_present: PeoplePresentFields {
        father: "PAPA",
        mother: "MAMAN",
        student: "ELEVEB",
        principal: "DIRECTEUR",
        other: "AUTRES",
        other_text: "PARTENAIRE",
    },
    objectives: ObjectiveFields {
        learning: "aprentissage",
        jobs: "metier",
        relationships: "relations",
        adaptations: "adapattion",
        projects: "preojet",
    },
};

impl FormFieldMap {
    /// Returns the text widgets in binding order.
    pub fn text_fields(&self) -> [&'static str; 7] {
        [
            self.date,
            self.grade,
            self.student_name,
            self.teacher_name,
            self.details,
            self.important_infos,
            self.people_present.other_text,
        ]
    }

    /// Returns every checkbox widget.
    pub fn checkbox_fields(&self) -> [&'static str; 13] {
        [
            self.meeting_by.parents,
            self.meeting_by.teacher,
            self.meeting_by.other,
            self.people_present.father,
            self.people_present.mother,
            self.people_present.student,
            self.people_present.principal,
            self.people_present.other,
            self.objectives.learning,
            self.objectives.jobs,
            self.objectives.relationships,
            self.objectives.adaptations,
            self.objectives.projects,
        ]
    }

    /// Iterates over every mapped identifier together with its expected kind.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, FieldKind)> {
        self.text_fields()
            .into_iter()
            .map(|name| (name, FieldKind::Text))
            .chain(
                self.checkbox_fields()
                    .into_iter()
                    .map(|name| (name, FieldKind::CheckBox)),
            )
    }

    /// Lists every identifier `form` cannot bind, in map order.
    pub fn check(&self, form: &FormDocument) -> Vec<FieldBindingError> {
        self.entries()
            .filter_map(|(name, kind)| form.check_field(name, kind).err())
            .collect()
    }

    /// Checkbox ticked for a meeting requester. Free text falls back to "other".
    pub fn meeting_by_checkbox(&self, tag: &MeetingRequester) -> &'static str {
        match tag {
            MeetingRequester::Parents => self.meeting_by.parents,
            MeetingRequester::Teacher => self.meeting_by.teacher,
            MeetingRequester::Other(_) => self.meeting_by.other,
        }
    }

    /// Checkbox ticked for an attendee. Free text falls back to "other".
    pub fn people_present_checkbox(&self, tag: &Attendee) -> &'static str {
        match tag {
            Attendee::Father => self.people_present.father,
            Attendee::Mother => self.people_present.mother,
            Attendee::Student => self.people_present.student,
            Attendee::Principal => self.people_present.principal,
            Attendee::Other(_) => self.people_present.other,
        }
    }

    /// Checkbox ticked for an objective, or `None` for unrecognized tags.
    pub fn objective_checkbox(&self, tag: &Objective) -> Option<&'static str> {
        match tag {
            Objective::Learning => Some(self.objectives.learning),
            Objective::Jobs => Some(self.objectives.jobs),
            Objective::Relationships => Some(self.objectives.relationships),
            Objective::Adaptations => Some(self.objectives.adaptations),
            Objective::Projects => Some(self.objectives.projects),
            Objective::Unknown(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identifiers_are_unique() {
        let names: Vec<_> = FORM_FIELD_MAP.entries().map(|(name, _)| name).collect();
        let distinct: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), 20);
        assert_eq!(distinct.len(), names.len());
    }

    #[test]
    fn free_text_routes_to_other_boxes() {
        assert_eq!(
            FORM_FIELD_MAP.people_present_checkbox(&Attendee::Other("Tata".into())),
            "AUTRES"
        );
        assert_eq!(
            FORM_FIELD_MAP.meeting_by_checkbox(&MeetingRequester::Other("RASED".into())),
            "autre"
        );
        assert_eq!(
            FORM_FIELD_MAP.objective_checkbox(&Objective::Unknown("SPORT".into())),
            None
        );
    }
}
