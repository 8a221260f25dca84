//! Form flattening.
//!
//! Every field widget is replaced by its current appearance stream, drawn
//! into the page content as a form XObject. Widgets are then removed from the
//! page annotations and the `/AcroForm` entry is dropped from the catalog, so
//! the result can no longer be edited.

use std::collections::BTreeSet;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::appearance::format_number;
use crate::error::SerializationError;
use crate::form::{self, FormDocument};

const FLAG_HIDDEN: i64 = 1 << 1;
const FLAG_NO_VIEW: i64 = 1 << 5;

struct Placement {
    name: String,
    stream_id: ObjectId,
    matrix: [f32; 6],
}

/// Flattens all fields of `form` in place.
pub fn flatten(form: &mut FormDocument) -> Result<(), SerializationError> {
    let widgets = form.widget_ids();
    let blank = form.blank_text_widgets();
    let document = form.document_mut();
    let mut drawn = 0usize;

    for page_id in document.get_pages().into_values() {
        let Some((annots_id, annots)) = page_annotations(document, page_id)? else {
            continue;
        };
        let (on_page, kept): (Vec<Object>, Vec<Object>) = annots
            .into_iter()
            .partition(|annot| matches!(annot, Object::Reference(id) if widgets.contains(id)));
        if on_page.is_empty() {
            continue;
        }

        let mut placements = Vec::new();
        for widget in on_page.iter().filter_map(|annot| annot.as_reference().ok()) {
            if let Some(placement) = place_widget(document, widget, blank.contains(&widget))? {
                placements.push(placement);
            }
        }

        store_annotations(document, page_id, annots_id, kept)?;
        if !placements.is_empty() {
            register_xobjects(document, page_id, &placements)?;
            append_content(document, page_id, &placements)?;
        }
        drawn += placements.len();
    }

    remove_acro_form(document)?;
    let pruned = document.prune_objects();
    debug!(
        "Flattened {} widget appearances; pruned {} objects",
        drawn,
        pruned.len()
    );

    form.clear_fields();
    Ok(())
}

fn page_annotations(
    document: &Document,
    page_id: ObjectId,
) -> Result<Option<(Option<ObjectId>, Vec<Object>)>, SerializationError> {
    let page = document.get_object(page_id)?.as_dict()?;
    let annotations = match page.get(b"Annots") {
        Ok(Object::Reference(id)) => {
            let array = document.get_object(*id)?.as_array()?.clone();
            Some((Some(*id), array))
        }
        Ok(Object::Array(array)) => Some((None, array.clone())),
        _ => None,
    };
    Ok(annotations)
}

fn store_annotations(
    document: &mut Document,
    page_id: ObjectId,
    annots_id: Option<ObjectId>,
    kept: Vec<Object>,
) -> Result<(), SerializationError> {
    if let Some(id) = annots_id {
        *document.get_object_mut(id)? = Object::Array(kept);
        return Ok(());
    }
    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    if kept.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", Object::Array(kept));
    }
    Ok(())
}

fn place_widget(
    document: &mut Document,
    widget: ObjectId,
    blank_text: bool,
) -> Result<Option<Placement>, SerializationError> {
    let widget_dict = document.get_object(widget)?.as_dict()?;

    let flags = widget_dict
        .get(b"F")
        .ok()
        .and_then(|object| object.as_i64().ok())
        .unwrap_or(0);
    if flags & (FLAG_HIDDEN | FLAG_NO_VIEW) != 0 {
        return Ok(None);
    }

    let rect = form::widget_rect(widget_dict);
    let Some(appearance) = appearance_object(document, widget_dict) else {
        // Empty text fields commonly ship without an appearance.
        if blank_text {
            debug!("Blank text widget {} {} has nothing to draw", widget.0, widget.1);
        } else {
            warn!(
                "Widget {} {} has no appearance for its current state; dropping it",
                widget.0, widget.1
            );
        }
        return Ok(None);
    };

    let stream_id = match appearance {
        Object::Reference(id) => id,
        Object::Stream(stream) => document.add_object(stream),
        _ => return Ok(None),
    };

    let stream = document.get_object_mut(stream_id)?.as_stream_mut()?;
    stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
    stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
    let bbox = match form::rect_entry(&stream.dict, b"BBox") {
        Some(bbox) => bbox,
        None => {
            let width = rect[2] - rect[0];
            let height = rect[3] - rect[1];
            stream.dict.set(
                "BBox",
                vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ],
            );
            [0.0, 0.0, width, height]
        }
    };

    Ok(Some(Placement {
        name: format!("FlatWidget{}_{}", widget.0, widget.1),
        stream_id,
        matrix: placement_matrix(rect, bbox),
    }))
}

/// Picks the normal appearance matching the widget's `/AS` state.
fn appearance_object(document: &Document, widget: &Dictionary) -> Option<Object> {
    let normal = widget
        .get(b"AP")
        .ok()
        .and_then(|object| form::resolve(document, object).ok())
        .and_then(|object| object.as_dict().ok())?
        .get(b"N")
        .ok()?;

    let target = form::resolve(document, normal).ok()?;
    match target {
        Object::Stream(_) => match normal {
            Object::Reference(_) => Some(normal.clone()),
            _ => Some(target.clone()),
        },
        Object::Dictionary(states) => {
            let state = widget.get(b"AS").ok()?.as_name().ok()?;
            match states.get(state).ok()? {
                reference @ Object::Reference(_) => Some(reference.clone()),
                stream @ Object::Stream(_) => Some(stream.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Maps the appearance bounding box onto the widget rectangle.
fn placement_matrix(rect: [f32; 4], bbox: [f32; 4]) -> [f32; 6] {
    let scale = |target: f32, source: f32| if source > 0.0 { target / source } else { 1.0 };
    let sx = scale(rect[2] - rect[0], bbox[2] - bbox[0]);
    let sy = scale(rect[3] - rect[1], bbox[3] - bbox[1]);
    [sx, 0.0, 0.0, sy, rect[0] - bbox[0] * sx, rect[1] - bbox[1] * sy]
}

fn inherited_resources(document: &Document, page_id: ObjectId) -> Dictionary {
    let mut visited = BTreeSet::new();
    let mut current = Some(page_id);
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let Some(node) = document
            .get_object(id)
            .ok()
            .and_then(|object| object.as_dict().ok())
        else {
            break;
        };
        if let Some(resources) = node
            .get(b"Resources")
            .ok()
            .and_then(|object| form::resolve(document, object).ok())
            .and_then(|object| object.as_dict().ok())
        {
            return resources.clone();
        }
        current = node
            .get(b"Parent")
            .ok()
            .and_then(|object| object.as_reference().ok());
    }
    Dictionary::new()
}

fn register_xobjects(
    document: &mut Document,
    page_id: ObjectId,
    placements: &[Placement],
) -> Result<(), SerializationError> {
    // Shared or inherited resource dictionaries are copied onto the page.
    let mut resources = inherited_resources(document, page_id);
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|object| form::resolve(document, object).ok())
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    for placement in placements {
        xobjects.set(
            placement.name.as_bytes().to_vec(),
            Object::Reference(placement.stream_id),
        );
    }
    resources.set("XObject", Object::Dictionary(xobjects));

    document
        .get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn append_content(
    document: &mut Document,
    page_id: ObjectId,
    placements: &[Placement],
) -> Result<(), SerializationError> {
    let mut drawing = b"Q\n".to_vec();
    for placement in placements {
        let [a, b, c, d, e, f] = placement.matrix.map(format_number);
        drawing.extend_from_slice(
            format!("q\n{a} {b} {c} {d} {e} {f} cm\n/{} Do\nQ\n", placement.name).as_bytes(),
        );
    }

    let prefix_id = document.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let suffix_id = document.add_object(Stream::new(Dictionary::new(), drawing));

    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    let existing = match page.get(b"Contents") {
        Ok(Object::Array(array)) => array.clone(),
        Ok(reference @ Object::Reference(_)) => vec![reference.clone()],
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(suffix_id));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

fn remove_acro_form(document: &mut Document) -> Result<(), SerializationError> {
    let catalog_id = document.trailer.get(b"Root")?.as_reference()?;
    document
        .get_object_mut(catalog_id)?
        .as_dict_mut()?
        .remove(b"AcroForm");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_translates_unit_bbox() {
        let matrix = placement_matrix([100.0, 200.0, 120.0, 210.0], [0.0, 0.0, 20.0, 10.0]);
        assert_eq!(matrix, [1.0, 0.0, 0.0, 1.0, 100.0, 200.0]);
    }

    #[test]
    fn matrix_scales_mismatched_bbox() {
        let matrix = placement_matrix([0.0, 0.0, 40.0, 10.0], [0.0, 0.0, 20.0, 10.0]);
        assert_eq!(matrix[0], 2.0);
        assert_eq!(matrix[3], 1.0);
    }
}
