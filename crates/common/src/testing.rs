//! Shared fixtures for unit tests

use crate::records::{AuthorList, RecordInput};
use lopdf::dictionary;
use lopdf::{Document, Object, Stream};

/// Build a small but well-formed PDF with one page per label
pub(crate) fn sample_pdf(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for label in labels {
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", label);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => labels.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize sample pdf");
    bytes
}

pub(crate) fn sample_input(title: &str) -> RecordInput {
    RecordInput {
        title: title.to_string(),
        authors: AuthorList::List(vec!["X".to_string()]),
        date: "2024-03-15".to_string(),
        course: "Computer Science".to_string(),
        introduction: "Why this matters".to_string(),
        methodology: "How we did it".to_string(),
        results: "What we found".to_string(),
        abstract_text: None,
    }
}
