//! Generator for a blank, fillable parent-meeting form.
//!
//! The school's own template is not redistributable, so this module lays out
//! an equivalent one-page A4 form carrying every widget named in
//! [`FORM_FIELD_MAP`]. Fields can be left out or created with the wrong kind
//! to reproduce templates that drifted from the map.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::appearance::{encode_win_ansi, escape_literal, format_number, FONT_RESOURCE_NAME};
use crate::error::SerializationError;
use crate::field_map::{FieldKind, FORM_FIELD_MAP};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LABEL_WIDTH: f32 = 120.0;
const LINE_HEIGHT: f32 = 18.0;
const BOX_SIZE: f32 = 12.0;
const ROW_GAP: f32 = 8.0;
const SECTION_GAP: f32 = 6.0;
const FLAG_PRINT: i64 = 1 << 2;
const FLAG_MULTILINE: i64 = 1 << 12;
const DEFAULT_APPEARANCE: &str = "/Helv 0 Tf 0 g";

struct Entry {
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    height: f32,
}

impl Entry {
    fn text(name: &'static str, label: &'static str) -> Self {
        Self::text_block(name, label, LINE_HEIGHT)
    }

    fn text_block(name: &'static str, label: &'static str, height: f32) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            height,
        }
    }

    fn checkbox(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::CheckBox,
            height: BOX_SIZE,
        }
    }
}

fn sections() -> Vec<(Option<&'static str>, Vec<Entry>)> {
    let map = FORM_FIELD_MAP;
    vec![
        (
            None,
            vec![
                Entry::text(map.date, "Date"),
                Entry::text(map.student_name, "Élève"),
                Entry::text(map.grade, "Classe"),
                Entry::text(map.teacher_name, "Enseignant"),
            ],
        ),
        (
            Some("Rendez-vous à la demande de :"),
            vec![
                Entry::checkbox(map.meeting_by.parents, "Parents"),
                Entry::checkbox(map.meeting_by.teacher, "L'enseignant"),
                Entry::checkbox(map.meeting_by.other, "Autre"),
            ],
        ),
        (
            Some("Personnes présentes :"),
            vec![
                Entry::checkbox(map.people_present.mother, "Maman"),
                Entry::checkbox(map.people_present.father, "Papa"),
                Entry::checkbox(map.people_present.student, "Élève"),
                Entry::checkbox(map.people_present.principal, "Directeur"),
                Entry::checkbox(map.people_present.other, "Autres"),
                Entry::text(map.people_present.other_text, "Partenaire"),
            ],
        ),
        (
            Some("Objectifs :"),
            vec![
                Entry::checkbox(map.objectives.learning, "Point sur les apprentissages"),
                Entry::checkbox(map.objectives.jobs, "Point sur le métier d'élève"),
                Entry::checkbox(
                    map.objectives.relationships,
                    "Point sur les relations avec les autres",
                ),
                Entry::checkbox(map.objectives.adaptations, "Adaptation de la scolarité"),
                Entry::checkbox(map.objectives.projects, "Projet d'orientation"),
            ],
        ),
        (
            None,
            vec![
                Entry::text_block(map.details, "Points abordés", 100.0),
                Entry::text_block(map.important_infos, "Informations", 70.0),
            ],
        ),
    ]
}

/// Builder for the sample template.
#[derive(Clone, Debug, Default)]
pub struct SampleTemplate {
    omitted: BTreeSet<String>,
    kinds: BTreeMap<String, FieldKind>,
}

impl SampleTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves the named widget out of the generated form.
    pub fn without_field(mut self, name: impl Into<String>) -> Self {
        self.omitted.insert(name.into());
        self
    }

    /// Creates the named widget with `kind` instead of its mapped kind.
    pub fn with_field_kind(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    /// Renders the form to PDF bytes.
    pub fn build(&self) -> Result<Vec<u8>, SerializationError> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let page_id = document.new_object_id();

        let helvetica = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let dingbats = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "ZapfDingbats",
        });
        let checked = document.add_object(checkbox_appearance(dingbats, true));
        let unchecked = document.add_object(checkbox_appearance(dingbats, false));

        let mut content = Vec::new();
        let mut widgets = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        draw_text(&mut content, MARGIN, y - 16.0, 16.0, "Rendez-vous de parents");
        y -= 40.0;

        for (heading, entries) in sections() {
            if let Some(heading) = heading {
                draw_text(&mut content, MARGIN, y - 12.0, 11.0, heading);
                y -= 20.0;
            }
            for entry in entries {
                if self.omitted.contains(entry.name) {
                    continue;
                }
                let kind = self.kinds.get(entry.name).copied().unwrap_or(entry.kind);
                let mut widget = dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "T" => Object::string_literal(entry.name),
                    "F" => Object::Integer(FLAG_PRINT),
                    "P" => Object::Reference(page_id),
                };
                match kind {
                    FieldKind::Text => {
                        let height = entry.height.max(LINE_HEIGHT);
                        draw_text(&mut content, MARGIN, y - 12.0, 10.0, entry.label);
                        widget.set("FT", "Tx");
                        widget.set("Rect", rect(MARGIN + LABEL_WIDTH, y - height, PAGE_WIDTH - MARGIN, y));
                        widget.set(
                            "DA",
                            Object::String(DEFAULT_APPEARANCE.into(), StringFormat::Literal),
                        );
                        if height > LINE_HEIGHT {
                            widget.set("Ff", Object::Integer(FLAG_MULTILINE));
                        }
                        y -= height + ROW_GAP;
                    }
                    FieldKind::CheckBox => {
                        let x = MARGIN + 10.0;
                        draw_text(&mut content, x + 20.0, y - 10.0, 10.0, entry.label);
                        widget.set("FT", "Btn");
                        widget.set("Rect", rect(x, y - BOX_SIZE, x + BOX_SIZE, y));
                        widget.set("V", "Off");
                        widget.set("AS", "Off");
                        widget.set(
                            "AP",
                            dictionary! {
                                "N" => dictionary! {
                                    "Yes" => Object::Reference(checked),
                                    "Off" => Object::Reference(unchecked),
                                },
                            },
                        );
                        y -= BOX_SIZE + ROW_GAP;
                    }
                }
                widgets.push(document.add_object(widget));
            }
            y -= SECTION_GAP;
        }

        let widget_refs: Vec<Object> = widgets.iter().copied().map(Object::Reference).collect();
        let content_id = document.add_object(Stream::new(Dictionary::new(), content));
        document.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => rect(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT),
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(helvetica) },
                },
                "Annots" => widget_refs.clone(),
            }),
        );
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );

        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
            "AcroForm" => dictionary! {
                "Fields" => widget_refs,
                "DA" => Object::String(DEFAULT_APPEARANCE.into(), StringFormat::Literal),
                "DR" => dictionary! {
                    "Font" => dictionary! {
                        FONT_RESOURCE_NAME => Object::Reference(helvetica),
                        "ZaDb" => Object::Reference(dingbats),
                    },
                },
            },
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        document
            .save_to(&mut buffer)
            .map_err(|err| SerializationError::Save(err.to_string()))?;
        Ok(buffer)
    }
}

fn checkbox_appearance(dingbats: ObjectId, checked: bool) -> Stream {
    let mut content = format!(
        "q\n0.5 w\n0 G\n0.5 0.5 {size} {size} re S\n",
        size = format_number(BOX_SIZE - 1.0)
    );
    if checked {
        content.push_str("0 g\nBT\n/ZaDb 10 Tf\n1.8 2.2 Td\n(4) Tj\nET\n");
    }
    content.push_str("Q\n");

    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect(0.0, 0.0, BOX_SIZE, BOX_SIZE),
            "Resources" => dictionary! {
                "Font" => dictionary! { "ZaDb" => Object::Reference(dingbats) },
            },
        },
        content.into_bytes(),
    )
}

fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Object {
    Object::Array(vec![
        Object::Real(x1),
        Object::Real(y1),
        Object::Real(x2),
        Object::Real(y2),
    ])
}

fn draw_text(content: &mut Vec<u8>, x: f32, y: f32, size: f32, text: &str) {
    content.extend_from_slice(
        format!(
            "BT\n/F1 {} Tf\n{} {} Td\n(",
            format_number(size),
            format_number(x),
            format_number(y)
        )
        .as_bytes(),
    );
    content.extend(escape_literal(&encode_win_ansi(text)));
    content.extend_from_slice(b") Tj\nET\n");
}
