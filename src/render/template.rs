use std::fmt::Write;

use crate::group::CityGroup;

/// Escape text for interpolation into HTML element content or attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `<table>` with a header row and one row per record.
pub fn table(headers: &[String], group: &CityGroup) -> String {
    let mut html = String::from("<table>\n<thead><tr>");
    for h in headers {
        let _ = write!(html, "<th>{}</th>", escape(h));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &group.rows {
        html.push_str("<tr>");
        for (i, _) in headers.iter().enumerate() {
            let _ = write!(html, "<td>{}</td>", escape(&row.cell(i).to_string()));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

const DOCUMENT_STYLE: &str = "body{font-family:'DejaVu Sans',Arial,sans-serif;font-size:11px;margin:0}\
h1{font-size:18px;margin:0 0 4px 0}\
p.count{color:#555;margin:0 0 10px 0}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #999;padding:3px 5px;text-align:left;vertical-align:top}\
th{background:#e8e8e8}\
tr{page-break-inside:avoid}";

/// Markup for one city's document.
pub fn city_document(city: &str, headers: &[String], group: &CityGroup) -> String {
    let rows = group.rows.len();
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>{DOCUMENT_STYLE}</style></head>\n<body>\n<h1>{title}</h1>\n\
<p class=\"count\">{rows} {noun}</p>\n{table}\n</body></html>\n",
        title = escape(city),
        noun = if rows == 1 { "record" } else { "records" },
        table = table(headers, group),
    )
}
