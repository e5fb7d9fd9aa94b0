use std::fmt::Write as _;

use omis_core::RequestRecord;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const STYLE: &str = "body{font-family:sans-serif;margin:2rem}table{border-collapse:collapse}\
th,td{border:1px solid #ccc;padding:.3rem .6rem;text-align:left}\
.banner{padding:.5rem 1rem;margin-bottom:1rem}.success{background:#e3f6e3}.error{background:#fbe3e3}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Banner {
    Success(&'static str),
    Error(&'static str),
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
        ))
        .unwrap_or_else(|_| value.to_string())
}

fn page(title: &str, banner: Option<Banner>, content: &str) -> String {
    let banner = match banner {
        Some(Banner::Success(text)) => {
            format!("<div class=\"banner success\">{}</div>", escape_html(text))
        }
        Some(Banner::Error(text)) => {
            format!("<div class=\"banner error\">{}</div>", escape_html(text))
        }
        None => String::new(),
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title><style>{STYLE}</style></head>\n<body>\n<nav><a href=\"/requests\">Requests</a> | <a href=\"/new\">New request</a></nav>\n<h1>{title}</h1>\n{banner}\n{content}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

pub(crate) fn render_request_list(records: &[RequestRecord], banner: Option<Banner>) -> String {
    let mut rows = String::new();
    for record in records {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            record.id,
            escape_html(&record.request_number),
            escape_html(&record.position_number),
            escape_html(record.status.as_key()),
            escape_html(record.comment.as_deref().unwrap_or_default()),
            escape_html(record.comment_author.as_deref().unwrap_or_default()),
            format_timestamp(record.created_at),
            format_timestamp(record.status_updated_at),
        );
    }
    if records.is_empty() {
        rows.push_str("<tr><td colspan=\"8\">No requests yet.</td></tr>\n");
    }

    let content = format!(
        "<table>\n<thead><tr><th>ID</th><th>Request</th><th>Position</th><th>Status</th><th>Comment</th><th>Author</th><th>Created</th><th>Last status change</th></tr></thead>\n<tbody>\n{rows}</tbody>\n</table>"
    );
    page("Requests", banner, &content)
}

pub(crate) fn render_new_request(banner: Option<Banner>) -> String {
    let content = "<form method=\"post\" action=\"/add_request\">\n\
<label>Request number <input name=\"request_number\" required></label><br>\n\
<label>Position number <input name=\"position_number\" required></label><br>\n\
<label>Comment <textarea name=\"comment\"></textarea></label><br>\n\
<label>Author <input name=\"comment_author\"></label><br>\n\
<button type=\"submit\">Submit</button>\n\
</form>";
    page("New request", banner, content)
}

#[cfg(test)]
mod tests {
    use super::{escape_html, render_request_list, Banner};
    use omis_core::{RequestRecord, RequestStatus};
    use time::macros::datetime;

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn request_list_renders_escaped_rows_and_banner() {
        let record = RequestRecord {
            id: 7,
            request_number: "R-<1>".to_owned(),
            position_number: "P-1".to_owned(),
            comment: Some("<b>bold</b>".to_owned()),
            comment_author: None,
            status: RequestStatus::OnSite,
            created_at: datetime!(2025-09-27 08:00:00 UTC),
            status_updated_at: datetime!(2025-09-27 09:15:30 UTC),
        };

        let html = render_request_list(&[record], Some(Banner::Success("Request created.")));
        assert!(html.contains("R-&lt;1&gt;"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!html.contains("<b>bold</b>"));
        assert!(html.contains("on site"));
        assert!(html.contains("2025-09-27 09:15:30 UTC"));
        assert!(html.contains("banner success"));
    }

    #[test]
    fn empty_list_renders_placeholder_row() {
        let html = render_request_list(&[], None);
        assert!(html.contains("No requests yet."));
        assert!(!html.contains("class=\"banner"));
    }
}
