use lopdf::{Document, Object};
use report_form::{
    DirectoryDownload, FieldBindingError, FieldKind, FormDocument, Grade, OverflowPolicy,
    RenderError, RenderStage, ReportRecord, ReportRenderer, SampleTemplate, TemplateBytes,
    TemplateFile, TemplateLoadError,
};
use sha2::{Digest, Sha256};

fn sample_template() -> Vec<u8> {
    SampleTemplate::new().build().expect("build sample template")
}

fn renderer() -> ReportRenderer<TemplateBytes> {
    ReportRenderer::new(TemplateBytes::new(sample_template()))
}

fn sample_report() -> ReportRecord {
    ReportRecord::from_json(
        r#"{
            "date": "2024-03-12",
            "studentName": "Léa Martin",
            "grade": "CE2",
            "teacherName": "Mme Dupré",
            "details": "Lecture fluide, calcul mental à consolider.",
            "importantInfos": "Suivi orthophonique le mardi.",
            "meetingBy": ["PARENTS"],
            "peoplePresent": ["MOTHER", "STUDENT"],
            "objectives": ["LEARNING", "RELATIONSHIPS"]
        }"#,
    )
    .expect("parse sample report")
}

fn hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn widget_annotations(document: &Document) -> usize {
    document
        .get_pages()
        .into_values()
        .filter_map(|page_id| document.get_object(page_id).ok()?.as_dict().ok().cloned())
        .filter_map(|page| match page.get(b"Annots").ok()? {
            Object::Array(annots) => Some(annots.clone()),
            Object::Reference(id) => document.get_object(*id).ok()?.as_array().ok().cloned(),
            _ => None,
        })
        .flatten()
        .filter_map(|annot| {
            let id = annot.as_reference().ok()?;
            let dict = document.get_object(id).ok()?.as_dict().ok()?;
            let subtype = dict.get(b"Subtype").ok()?.as_name().ok()?;
            (subtype == b"Widget").then_some(())
        })
        .count()
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

/// Page content and the content of every XObject the single page draws.
fn drawn_page(bytes: &[u8]) -> (Vec<u8>, Vec<Vec<u8>>) {
    let document = Document::load_mem(bytes).expect("reload output");
    let pages = document.get_pages();
    assert_eq!(pages.len(), 1);
    let page_id = *pages.values().next().expect("one page");

    let content = document.get_page_content(page_id).expect("page content");
    let page = document
        .get_object(page_id)
        .and_then(Object::as_dict)
        .expect("page dictionary");
    let xobjects = page
        .get(b"Resources")
        .and_then(Object::as_dict)
        .and_then(|resources| resources.get(b"XObject"))
        .and_then(Object::as_dict)
        .expect("page XObjects");
    let streams = xobjects
        .iter()
        .map(|(_, object)| {
            let id = object.as_reference().expect("XObject reference");
            let stream = document
                .get_object(id)
                .and_then(Object::as_stream)
                .expect("XObject stream");
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone())
        })
        .collect();
    (content, streams)
}

#[tokio::test]
async fn renders_non_empty_output_named_after_the_report() {
    let report = sample_report();
    let rendered = renderer().render(&report).await.expect("render report");

    assert!(rendered.bytes().starts_with(b"%PDF-"));
    assert!(rendered.filename().contains(report.student_name()));
    assert!(rendered.filename().contains(report.date()));
    assert_eq!(rendered.filename(), "Rapport Léa Martin - 2024-03-12");
}

#[tokio::test]
async fn rendering_is_idempotent() {
    let renderer = renderer();
    let report = sample_report();

    let first = renderer.render(&report).await.expect("first render");
    let second = renderer.render(&report).await.expect("second render");

    assert_eq!(
        hash(first.bytes()),
        hash(second.bytes()),
        "rendering the same report twice should produce identical bytes"
    );
}

#[tokio::test]
async fn flattened_output_has_no_form_left() {
    let rendered = renderer()
        .render(&sample_report())
        .await
        .expect("render report");

    let document = Document::load_mem(rendered.bytes()).expect("reload output");
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("catalog reference");
    let catalog = document
        .get_object(catalog_id)
        .and_then(Object::as_dict)
        .expect("catalog");
    assert!(!catalog.has(b"AcroForm"));
    assert_eq!(widget_annotations(&document), 0);

    let err = FormDocument::load(rendered.bytes()).unwrap_err();
    assert!(matches!(err, TemplateLoadError::MissingAcroForm));
}

#[tokio::test]
async fn flattened_output_cannot_serve_as_template() {
    let rendered = renderer()
        .render(&sample_report())
        .await
        .expect("render report");

    let err = ReportRenderer::new(TemplateBytes::new(rendered.into_bytes()))
        .render(&sample_report())
        .await
        .unwrap_err();
    assert_eq!(err.stage(), RenderStage::Loading);
    assert!(matches!(
        err,
        RenderError::TemplateLoad(TemplateLoadError::MissingAcroForm)
    ));
}

#[tokio::test]
async fn garbage_template_is_a_load_error() {
    let err = ReportRenderer::new(TemplateBytes::new(b"not a pdf".to_vec()))
        .render(&sample_report())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::TemplateLoad(_)));
}

#[tokio::test]
async fn scalar_fields_are_filled() {
    let form = renderer()
        .fill(&sample_report())
        .await
        .expect("fill report");

    assert_eq!(form.text_value("DATE").as_deref(), Some("2024-03-12"));
    assert_eq!(form.text_value("classes").as_deref(), Some("CE2"));
    assert_eq!(form.text_value("ELEVE").as_deref(), Some("Léa Martin"));
    assert_eq!(form.text_value("Champ texte0").as_deref(), Some("Mme Dupré"));
    assert_eq!(
        form.text_value("INFOS").as_deref(),
        Some("Suivi orthophonique le mardi.")
    );
    assert_eq!(form.text_value("PARTENAIRE"), None);
}

#[tokio::test]
async fn teacher_request_checks_only_the_teacher_box() {
    let report = sample_report().with_meeting_by(["TEACHER"]);
    let form = renderer().fill(&report).await.expect("fill report");

    assert!(form.is_checked("enseignant"));
    assert!(!form.is_checked("parents"));
    assert!(!form.is_checked("autre"));
}

#[tokio::test]
async fn unknown_attendee_checks_other_and_fills_overflow() {
    let report = sample_report().with_people_present(["FATHER", "XYZ"]);
    let form = renderer().fill(&report).await.expect("fill report");

    assert!(form.is_checked("PAPA"));
    assert!(form.is_checked("AUTRES"));
    assert!(!form.is_checked("MAMAN"));
    assert_eq!(form.text_value("PARTENAIRE").as_deref(), Some("XYZ"));
}

#[tokio::test]
async fn last_unknown_attendee_wins_by_default() {
    let report = sample_report().with_people_present(["XYZ", "ABC"]);
    let form = renderer().fill(&report).await.expect("fill report");

    assert!(form.is_checked("AUTRES"));
    assert_eq!(form.text_value("PARTENAIRE").as_deref(), Some("ABC"));
}

#[tokio::test]
async fn join_policy_keeps_every_unknown_attendee() {
    let renderer = ReportRenderer::builder(TemplateBytes::new(sample_template()))
        .with_overflow_policy(OverflowPolicy::Join(", ".to_owned()))
        .build();
    let report = sample_report().with_people_present(["XYZ", "MOTHER", "ABC"]);
    let form = renderer.fill(&report).await.expect("fill report");

    assert!(form.is_checked("MAMAN"));
    assert_eq!(form.text_value("PARTENAIRE").as_deref(), Some("XYZ, ABC"));
}

#[tokio::test]
async fn unknown_meeting_requester_checks_other() {
    let report = sample_report().with_meeting_by(["RASED"]);
    let form = renderer().fill(&report).await.expect("fill report");

    assert!(form.is_checked("autre"));
    assert!(!form.is_checked("parents"));
    assert_eq!(form.text_value("PARTENAIRE"), None);
}

#[tokio::test]
async fn unknown_objectives_are_dropped() {
    let report = sample_report().with_objectives(["LEARNING", "UNKNOWN"]);
    let form = renderer().fill(&report).await.expect("fill report");

    assert!(form.is_checked("aprentissage"));
    for name in ["metier", "relations", "adapattion", "preojet"] {
        assert!(!form.is_checked(name), "'{name}' should stay unchecked");
    }
}

#[tokio::test]
async fn missing_field_is_a_binding_error() {
    let template = SampleTemplate::new()
        .without_field("PARTENAIRE")
        .build()
        .expect("build template");
    let err = ReportRenderer::new(TemplateBytes::new(template))
        .render(&sample_report())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), RenderStage::Binding);
    match err {
        RenderError::FieldBinding(FieldBindingError::Missing { name }) => {
            assert_eq!(name, "PARTENAIRE")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn field_of_the_wrong_kind_is_a_binding_error() {
    let template = SampleTemplate::new()
        .with_field_kind("PAPA", FieldKind::Text)
        .build()
        .expect("build template");
    let err = ReportRenderer::new(TemplateBytes::new(template))
        .render(&sample_report())
        .await
        .unwrap_err();

    match err {
        RenderError::FieldBinding(FieldBindingError::WrongKind { name, expected }) => {
            assert_eq!(name, "PAPA");
            assert_eq!(expected, FieldKind::CheckBox);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn data_uri_carries_pdf_prefix() {
    let rendered = renderer()
        .render(&sample_report())
        .await
        .expect("render report");
    assert!(rendered
        .to_data_uri()
        .starts_with("data:application/pdf;base64,JVBER"));
}

#[tokio::test]
async fn template_file_renders_into_directory() {
    let dir = tempfile::tempdir().expect("temp dir");
    let template_path = dir.path().join("template.pdf");
    std::fs::write(&template_path, sample_template()).expect("write template");

    let report = sample_report().with_people_present(["FATHER"]);
    let rendered = ReportRenderer::new(TemplateFile::new(&template_path))
        .render(&report)
        .await
        .expect("render from file");

    let out_dir = dir.path().join("out");
    let mut sink = DirectoryDownload::new(&out_dir);
    rendered.deliver(&mut sink).expect("write report");

    let expected = out_dir.join("Rapport Léa Martin - 2024-03-12.pdf");
    assert_eq!(sink.written(), [expected.clone()]);
    assert_eq!(std::fs::read(expected).expect("read report"), rendered.bytes());
}

#[tokio::test]
async fn flattened_page_draws_field_values() {
    let report = ReportRecord::new("2024-03-12", "Hugo Bernard", Grade::Cm1, "M. Durand")
        .with_details("Bon trimestre")
        .with_meeting_by(["TEACHER"])
        .with_people_present(["FATHER", "XYZ"])
        .with_objectives(["LEARNING"]);
    let rendered = renderer().render(&report).await.expect("render report");

    let (content, xobjects) = drawn_page(rendered.bytes());
    // Every mapped widget has an appearance once bound.
    assert_eq!(count(&content, b"/FlatWidget"), 20);
    assert_eq!(xobjects.len(), 20);

    let checked = xobjects
        .iter()
        .filter(|stream| count(stream, b"(4) Tj") > 0)
        .count();
    assert_eq!(checked, 4, "TEACHER, FATHER, other and LEARNING boxes");
    assert!(xobjects
        .iter()
        .any(|stream| count(stream, b"(Hugo Bernard) Tj") > 0));
    assert!(xobjects.iter().any(|stream| count(stream, b"(XYZ) Tj") > 0));
}

#[tokio::test]
async fn absent_important_infos_clear_a_prefilled_field() {
    let mut prefilled = renderer()
        .fill(&sample_report())
        .await
        .expect("fill report");
    let template = prefilled.save().expect("save filled form");

    let renderer = ReportRenderer::new(TemplateBytes::new(template));
    let report = sample_report().with_important_infos(None);

    let form = renderer.fill(&report).await.expect("refill report");
    assert_eq!(form.text_value("INFOS").as_deref(), Some(""));

    let rendered = renderer.render(&report).await.expect("render report");
    let (_, xobjects) = drawn_page(rendered.bytes());
    assert!(xobjects
        .iter()
        .all(|stream| count(stream, b"Suivi orthophonique") == 0));
}
