use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::fmt::Write;

use crate::render::template::{escape, table};
use crate::session::UploadSession;

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
.notice{background:#fff6d6;border:1px solid #e6c84f;padding:.5rem 1rem;margin:.5rem 0}\
form{margin:1rem 0;padding:1rem;border:1px solid #ccc}\
section{margin:1.5rem 0}\
table{border-collapse:collapse}\
th,td{border:1px solid #bbb;padding:2px 6px;text-align:left}\
th{background:#eee}";

/// Link to one city's document, carrying the prefix it was generated with.
pub fn download_href(city: &str, prefix: &str) -> String {
    let mut href = format!("/download/{}", utf8_percent_encode(city, NON_ALPHANUMERIC));
    if !prefix.is_empty() {
        let _ = write!(href, "?prefix={}", utf8_percent_encode(prefix, NON_ALPHANUMERIC));
    }
    href
}

fn upload_form() -> &'static str {
    "<form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
<label>Spreadsheet (.xlsx) <input type=\"file\" name=\"excel\" accept=\".xlsx\" required></label>\n\
<label>File name prefix <input type=\"text\" name=\"prefix\"></label>\n\
<button type=\"submit\">Generate PDFs</button>\n</form>"
}

fn groups_section(upload: &UploadSession) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<p><a href=\"/download_zip\">Download all ({} PDFs) as ZIP</a></p>\n",
        upload.groups.len()
    );
    for group in &upload.groups {
        let heading = if group.city.is_empty() {
            "(blank)".to_string()
        } else {
            escape(&group.city)
        };
        let _ = write!(
            html,
            "<section>\n<h2>{heading} <small>({} rows)</small></h2>\n",
            group.rows.len()
        );
        // a blank city cannot be addressed by path; it is still in the ZIP
        if !group.city.is_empty() {
            let _ = write!(
                html,
                "<p><a href=\"{}\">Download PDF</a></p>\n",
                escape(&download_href(&group.city, &upload.prefix))
            );
        }
        html.push_str(&table(&upload.headers, group));
        html.push_str("\n</section>\n");
    }
    html
}

/// The single page behind `/` and `/display`.
pub fn page(notices: &[String], upload: Option<&UploadSession>) -> String {
    let mut body = String::new();
    for notice in notices {
        let _ = writeln!(body, "<div class=\"notice\">{}</div>", escape(notice));
    }
    body.push_str(upload_form());
    body.push('\n');
    match upload {
        Some(upload) if !upload.groups.is_empty() => body.push_str(&groups_section(upload)),
        _ => body.push_str("<p class=\"empty\">No data uploaded yet.</p>\n"),
    }

    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>City Reports</title>\
<style>{PAGE_STYLE}</style></head>\n<body>\n<h1>City Reports</h1>\n{body}</body></html>\n"
    )
}
