//! Interactive form access built on top of `lopdf`.
//!
//! [`FormDocument`] parses a template once, indexes its AcroForm fields by
//! fully qualified name and exposes typed handles for text fields and
//! checkboxes. Handles are resolved before any mutation so a template that
//! does not match the field map is rejected without touching the document.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::appearance::{self, DefaultAppearance, Quadding, TextAppearance};
use crate::error::{FieldBindingError, SerializationError, TemplateLoadError};
use crate::field_map::FieldKind;

const FLAG_MULTILINE: i64 = 1 << 12;
const FLAG_RADIO: i64 = 1 << 15;
const FLAG_PUSHBUTTON: i64 = 1 << 16;
const OFF_STATE: &[u8] = b"Off";

/// Field type as declared by `/FT` and `/Ff`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    CheckBox,
    Radio,
    PushButton,
    Choice,
    Signature,
    Unknown,
}

impl FieldType {
    fn from_entries(field_type: Option<&[u8]>, flags: i64) -> Self {
        match field_type {
            Some(b"Tx") => Self::Text,
            Some(b"Btn") if flags & FLAG_PUSHBUTTON != 0 => Self::PushButton,
            Some(b"Btn") if flags & FLAG_RADIO != 0 => Self::Radio,
            Some(b"Btn") => Self::CheckBox,
            Some(b"Ch") => Self::Choice,
            Some(b"Sig") => Self::Signature,
            _ => Self::Unknown,
        }
    }

    fn matches(self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Text, FieldKind::Text) | (Self::CheckBox, FieldKind::CheckBox)
        )
    }
}

#[derive(Clone, Debug)]
struct FieldEntry {
    id: ObjectId,
    field_type: FieldType,
    flags: i64,
    widgets: Vec<ObjectId>,
}

/// Resolved handle to a text field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextField {
    name: String,
    id: ObjectId,
    multiline: bool,
    widgets: Vec<ObjectId>,
}

/// Resolved handle to a checkbox, with the name of its "on" appearance state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckBox {
    name: String,
    id: ObjectId,
    on_state: Vec<u8>,
    widgets: Vec<ObjectId>,
}

/// A parsed, editable fillable PDF.
#[derive(Debug)]
pub struct FormDocument {
    document: Document,
    fields: BTreeMap<String, FieldEntry>,
    default_appearance: Option<Vec<u8>>,
    default_quadding: i64,
    font_id: Option<ObjectId>,
}

impl FormDocument {
    /// Parses template bytes and indexes the AcroForm fields.
    pub fn load(bytes: &[u8]) -> Result<Self, TemplateLoadError> {
        let document = Document::load_mem(bytes)?;

        let catalog = catalog(&document).ok_or(TemplateLoadError::MissingCatalog)?;
        let acro_form = catalog
            .get(b"AcroForm")
            .ok()
            .and_then(|object| resolve(&document, object).ok())
            .and_then(|object| object.as_dict().ok())
            .ok_or(TemplateLoadError::MissingAcroForm)?;

        let default_appearance = acro_form
            .get(b"DA")
            .ok()
            .and_then(|object| object.as_str().ok())
            .map(<[u8]>::to_vec);
        let default_quadding = acro_form
            .get(b"Q")
            .ok()
            .and_then(|object| object.as_i64().ok())
            .unwrap_or(0);

        let roots: Vec<ObjectId> = acro_form
            .get(b"Fields")
            .ok()
            .and_then(|object| resolve(&document, object).ok())
            .and_then(|object| object.as_array().ok())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|item| item.as_reference().ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        let mut visited = BTreeSet::new();
        for root in roots {
            collect_field(
                &document,
                root,
                &FieldContext::default(),
                &mut visited,
                &mut fields,
            );
        }

        debug!("Indexed {} form fields from template", fields.len());

        Ok(Self {
            document,
            fields,
            default_appearance,
            default_quadding,
            font_id: None,
        })
    }

    /// Declared type of the named field, if it exists.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).map(|entry| entry.field_type)
    }

    /// Checks that `name` exists with the expected kind and can be filled.
    pub fn check_field(&self, name: &str, kind: FieldKind) -> Result<(), FieldBindingError> {
        match kind {
            FieldKind::Text => self.text_field(name).map(drop),
            FieldKind::CheckBox => self.checkbox(name).map(drop),
        }
    }

    /// Resolves a text field handle.
    pub fn text_field(&self, name: &str) -> Result<TextField, FieldBindingError> {
        let entry = self.entry(name, FieldKind::Text)?;
        Ok(TextField {
            name: name.to_owned(),
            id: entry.id,
            multiline: entry.flags & FLAG_MULTILINE != 0,
            widgets: entry.widgets.clone(),
        })
    }

    /// Resolves a checkbox handle together with its "on" state.
    pub fn checkbox(&self, name: &str) -> Result<CheckBox, FieldBindingError> {
        let entry = self.entry(name, FieldKind::CheckBox)?;
        let on_state = entry
            .widgets
            .iter()
            .find_map(|widget| self.on_state(*widget))
            .ok_or_else(|| FieldBindingError::Malformed {
                name: name.to_owned(),
                reason: "checkbox has no \"on\" appearance state",
            })?;
        Ok(CheckBox {
            name: name.to_owned(),
            id: entry.id,
            on_state,
            widgets: entry.widgets.clone(),
        })
    }

    /// Writes `value` into the field and regenerates its widget appearances.
    pub fn set_text(&mut self, field: &TextField, value: &str) -> Result<(), FieldBindingError> {
        let broken = |reason| FieldBindingError::Malformed {
            name: field.name.clone(),
            reason,
        };

        let (field_da, field_q) = {
            let dict = self.dict(field.id).ok_or_else(|| broken("field object missing"))?;
            (
                dict.get(b"DA")
                    .ok()
                    .and_then(|object| object.as_str().ok())
                    .map(<[u8]>::to_vec),
                dict.get(b"Q").ok().and_then(|object| object.as_i64().ok()),
            )
        };

        let font_id = self.helvetica();
        for widget in &field.widgets {
            let dict = self.dict(*widget).ok_or_else(|| broken("widget object missing"))?;
            let [x1, y1, x2, y2] = widget_rect(dict);
            let da = dict
                .get(b"DA")
                .ok()
                .and_then(|object| object.as_str().ok())
                .map(<[u8]>::to_vec)
                .or_else(|| field_da.clone())
                .or_else(|| self.default_appearance.clone())
                .unwrap_or_default();
            let quadding = dict
                .get(b"Q")
                .ok()
                .and_then(|object| object.as_i64().ok())
                .or(field_q)
                .unwrap_or(self.default_quadding);

            let layout = TextAppearance {
                width: x2 - x1,
                height: y2 - y1,
                multiline: field.multiline,
                quadding: Quadding::from_pdf(quadding),
                default_appearance: DefaultAppearance::parse(&da),
            };
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(layout.width),
                        Object::Real(layout.height),
                    ],
                    "Resources" => dictionary! {
                        "Font" => dictionary! {
                            appearance::FONT_RESOURCE_NAME => Object::Reference(font_id),
                        },
                    },
                },
                layout.content(value),
            );
            let stream_id = self.document.add_object(stream);

            let dict = self
                .dict_mut(*widget)
                .ok_or_else(|| broken("widget object missing"))?;
            dict.set("AP", dictionary! { "N" => Object::Reference(stream_id) });
        }

        let dict = self
            .dict_mut(field.id)
            .ok_or_else(|| broken("field object missing"))?;
        dict.set(
            "V",
            Object::String(
                appearance::encode_text_string(value),
                StringFormat::Hexadecimal,
            ),
        );

        debug!("Bound text field '{}' ({} chars)", field.name, value.chars().count());
        Ok(())
    }

    /// Marks the checkbox as checked.
    pub fn check(&mut self, field: &CheckBox) -> Result<(), FieldBindingError> {
        let broken = |reason| FieldBindingError::Malformed {
            name: field.name.clone(),
            reason,
        };

        for widget in &field.widgets {
            let has_on_state = self.on_state(*widget).as_deref() == Some(&field.on_state[..]);
            let state = if has_on_state {
                field.on_state.clone()
            } else {
                OFF_STATE.to_vec()
            };
            let dict = self
                .dict_mut(*widget)
                .ok_or_else(|| broken("widget object missing"))?;
            dict.set("AS", Object::Name(state));
        }

        let dict = self
            .dict_mut(field.id)
            .ok_or_else(|| broken("field object missing"))?;
        dict.set("V", Object::Name(field.on_state.clone()));

        debug!("Checked box '{}'", field.name);
        Ok(())
    }

    /// Current value of a text field, decoded from its PDF text string.
    pub fn text_value(&self, name: &str) -> Option<String> {
        let entry = self.fields.get(name)?;
        let value = self.dict(entry.id)?.get(b"V").ok()?.as_str().ok()?;
        Some(decode_text_string(value))
    }

    /// Whether a checkbox field currently holds an "on" value.
    pub fn is_checked(&self, name: &str) -> bool {
        let Some(entry) = self.fields.get(name) else {
            return false;
        };
        self.dict(entry.id)
            .and_then(|dict| dict.get(b"V").ok())
            .and_then(|value| value.as_name().ok())
            .map_or(false, |state| state != OFF_STATE)
    }

    /// Every widget annotation of every indexed field.
    pub(crate) fn widget_ids(&self) -> BTreeSet<ObjectId> {
        self.fields
            .values()
            .flat_map(|entry| entry.widgets.iter().copied())
            .collect()
    }

    /// Widgets of text fields that hold no value yet.
    pub(crate) fn blank_text_widgets(&self) -> BTreeSet<ObjectId> {
        self.fields
            .values()
            .filter(|entry| entry.field_type == FieldType::Text)
            .filter(|entry| {
                self.dict(entry.id)
                    .map_or(true, |dict| !dict.has(b"V"))
            })
            .flat_map(|entry| entry.widgets.iter().copied())
            .collect()
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Drops the field index once the form has been flattened.
    pub(crate) fn clear_fields(&mut self) {
        self.fields.clear();
    }

    /// Serializes the document as it currently stands.
    pub fn save(&mut self) -> Result<Vec<u8>, SerializationError> {
        let mut buffer = Vec::new();
        self.document
            .save_to(&mut buffer)
            .map_err(|err| SerializationError::Save(err.to_string()))?;
        Ok(buffer)
    }

    fn entry(&self, name: &str, kind: FieldKind) -> Result<&FieldEntry, FieldBindingError> {
        let entry = self
            .fields
            .get(name)
            .ok_or_else(|| FieldBindingError::Missing {
                name: name.to_owned(),
            })?;
        if !entry.field_type.matches(kind) {
            return Err(FieldBindingError::WrongKind {
                name: name.to_owned(),
                expected: kind,
            });
        }
        if entry.widgets.is_empty() {
            return Err(FieldBindingError::Malformed {
                name: name.to_owned(),
                reason: "field has no widget annotation",
            });
        }
        Ok(entry)
    }

    fn on_state(&self, widget: ObjectId) -> Option<Vec<u8>> {
        let normal = self
            .dict(widget)?
            .get(b"AP")
            .ok()
            .and_then(|object| resolve(&self.document, object).ok())
            .and_then(|object| object.as_dict().ok())?
            .get(b"N")
            .ok()
            .and_then(|object| resolve(&self.document, object).ok())
            .and_then(|object| object.as_dict().ok())?;
        normal
            .iter()
            .map(|(state, _)| state)
            .find(|state| state.as_slice() != OFF_STATE)
            .cloned()
    }

    fn helvetica(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.document.get_object(id).ok()?.as_dict().ok()
    }

    fn dict_mut(&mut self, id: ObjectId) -> Option<&mut Dictionary> {
        self.document.get_object_mut(id).ok()?.as_dict_mut().ok()
    }
}

#[derive(Clone, Debug, Default)]
struct FieldContext {
    name: Option<String>,
    field_type: Option<Vec<u8>>,
    flags: Option<i64>,
}

fn collect_field(
    document: &Document,
    id: ObjectId,
    parent: &FieldContext,
    visited: &mut BTreeSet<ObjectId>,
    fields: &mut BTreeMap<String, FieldEntry>,
) {
    if !visited.insert(id) {
        return;
    }
    let Some(dict) = document
        .get_object(id)
        .ok()
        .and_then(|object| object.as_dict().ok())
    else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|object| object.as_str().ok())
        .map(decode_text_string);
    let name = match (&parent.name, partial) {
        (Some(parent), Some(partial)) => Some(format!("{parent}.{partial}")),
        (None, Some(partial)) => Some(partial),
        (parent, None) => parent.clone(),
    };
    let context = FieldContext {
        name,
        field_type: dict
            .get(b"FT")
            .ok()
            .and_then(|object| object.as_name().ok())
            .map(<[u8]>::to_vec)
            .or_else(|| parent.field_type.clone()),
        flags: dict
            .get(b"Ff")
            .ok()
            .and_then(|object| object.as_i64().ok())
            .or(parent.flags),
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|object| resolve(document, object).ok())
        .and_then(|object| object.as_array().ok())
        .map(|array| {
            array
                .iter()
                .filter_map(|item| item.as_reference().ok())
                .collect()
        })
        .unwrap_or_default();

    let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) =
        kids.into_iter().partition(|kid| {
            document
                .get_object(*kid)
                .ok()
                .and_then(|object| object.as_dict().ok())
                .map_or(false, |kid| kid.has(b"T"))
        });

    for child in &child_fields {
        collect_field(document, *child, &context, visited, fields);
    }

    // Bare widgets listed directly under /Fields carry no name.
    if !dict.has(b"T") {
        return;
    }
    let widgets = if widgets.is_empty() && child_fields.is_empty() && dict.has(b"Rect") {
        vec![id]
    } else {
        widgets
    };
    if widgets.is_empty() && !child_fields.is_empty() {
        return;
    }

    let Some(name) = context.name else {
        return;
    };
    let flags = context.flags.unwrap_or(0);
    fields.insert(
        name,
        FieldEntry {
            id,
            field_type: FieldType::from_entries(context.field_type.as_deref(), flags),
            flags,
            widgets,
        },
    );
}

/// Follows a single indirect reference.
pub(crate) fn resolve<'a>(
    document: &'a Document,
    object: &'a Object,
) -> Result<&'a Object, lopdf::Error> {
    match object {
        Object::Reference(id) => document.get_object(*id),
        other => Ok(other),
    }
}

/// The document catalog referenced by the trailer.
pub(crate) fn catalog(document: &Document) -> Option<&Dictionary> {
    let id = document.trailer.get(b"Root").ok()?.as_reference().ok()?;
    document.get_object(id).ok()?.as_dict().ok()
}

/// Reads an integer or real operand as `f32`.
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Normalized `[x1 y1 x2 y2]` stored under `key`, if it is a 4-number array.
pub(crate) fn rect_entry(dict: &Dictionary, key: &[u8]) -> Option<[f32; 4]> {
    let values: Vec<f32> = dict
        .get(key)
        .ok()?
        .as_array()
        .ok()?
        .iter()
        .filter_map(number)
        .collect();
    match values.as_slice() {
        [a, b, c, d] => Some([a.min(*c), b.min(*d), a.max(*c), b.max(*d)]),
        _ => None,
    }
}

/// Normalized `/Rect` of an annotation, zero-sized if absent.
pub(crate) fn widget_rect(dict: &Dictionary) -> [f32; 4] {
    rect_entry(dict, b"Rect").unwrap_or([0.0; 4])
}

/// Decodes a PDF text string (UTF-16BE with BOM, or single-byte).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xfe, 0xff]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleTemplate;

    fn sample_form() -> FormDocument {
        let bytes = SampleTemplate::new().build().expect("build sample template");
        FormDocument::load(&bytes).expect("load sample template")
    }

    #[test]
    fn indexes_text_and_checkbox_fields() {
        let form = sample_form();
        assert_eq!(form.field_type("ELEVE"), Some(FieldType::Text));
        assert_eq!(form.field_type("PAPA"), Some(FieldType::CheckBox));
        assert_eq!(form.field_type("nope"), None);
    }

    #[test]
    fn resolving_a_checkbox_as_text_is_a_kind_mismatch() {
        let form = sample_form();
        assert_eq!(
            form.text_field("PAPA").unwrap_err(),
            FieldBindingError::WrongKind {
                name: "PAPA".into(),
                expected: FieldKind::Text,
            }
        );
    }

    #[test]
    fn set_text_round_trips_non_ascii_values() {
        let mut form = sample_form();
        let field = form.text_field("ELEVE").expect("resolve ELEVE");
        form.set_text(&field, "Zoé Lefèvre").expect("set text");
        assert_eq!(form.text_value("ELEVE").as_deref(), Some("Zoé Lefèvre"));
    }

    #[test]
    fn check_sets_value_to_on_state() {
        let mut form = sample_form();
        let field = form.checkbox("MAMAN").expect("resolve MAMAN");
        assert!(!form.is_checked("MAMAN"));
        form.check(&field).expect("check");
        assert!(form.is_checked("MAMAN"));
    }

    #[test]
    fn rejects_pdf_without_acroform() {
        let mut document = Document::with_version("1.5");
        let pages_id = document.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => Object::Integer(0),
        });
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));
        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("save bare pdf");

        assert!(matches!(
            FormDocument::load(&bytes),
            Err(TemplateLoadError::MissingAcroForm)
        ));
    }

    #[test]
    fn filled_text_fields_are_no_longer_blank() {
        let mut form = sample_form();
        assert_eq!(form.blank_text_widgets().len(), 7);

        let field = form.text_field("ELEVE").expect("resolve ELEVE");
        form.set_text(&field, "").expect("set text");
        let blank = form.blank_text_widgets();
        assert_eq!(blank.len(), 6);
        assert!(field.widgets.iter().all(|widget| !blank.contains(widget)));
    }

    #[test]
    fn decodes_utf16_text_strings() {
        assert_eq!(decode_text_string(&[0xfe, 0xff, 0x00, 0xe9]), "é");
        assert_eq!(decode_text_string(b"CE1"), "CE1");
    }
}
