#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use axum::body::Body;
use axum::http::{header, Request};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const BOUNDARY: &str = "docx-spacer-test-boundary";

/// Marker for a paragraph holding only an inline picture.
pub const PICTURE: &str = "[picture]";

pub fn document_xml(paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|text| match *text {
            "" => "<w:p/>".to_string(),
            PICTURE => "<w:p><w:r><w:drawing><pic:pic/></w:drawing></w:r></w:p>".to_string(),
            text => format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text),
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        body
    )
}

pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("[Content_Types].xml", SimpleFileOptions::default())
        .expect("content types entry");
    writer.write_all(b"<Types/>").expect("write content types");
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .expect("document entry");
    writer
        .write_all(document_xml(paragraphs).as_bytes())
        .expect("write document");
    writer.finish().expect("finish package").into_inner()
}

pub fn document_part(package: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(package)).expect("valid zip");
    let mut entry = archive.by_name("word/document.xml").expect("document part");
    let mut xml = String::new();
    entry.read_to_string(&mut xml).expect("utf-8 document");
    xml
}

/// A multipart upload with a single field.
pub fn upload(uri: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("valid request")
}

/// Write an executable shell script standing in for the office suite. It is
/// called as `<script> --headless --convert-to pdf --outdir <dir> <input> ...`.
#[cfg(unix)]
pub fn converter_script(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-soffice");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make script executable");
    path
}
