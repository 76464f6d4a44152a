//! Article markup for the blog page.

use crate::model::Email;

use super::sanitize::escape;

/// Shown in place of the list when nothing has been synced yet.
const EMPTY_LIST: &str = "        <p>No emails yet.</p>\n";

/// Articles for the list view, each title linking to its own page.
pub fn list(entries: &[(&Email, String)]) -> String {
    if entries.is_empty() {
        return EMPTY_LIST.to_string();
    }

    let mut out = String::new();
    for (email, body) in entries {
        let uid = escape(&email.uid);
        let title = format!(
            "<a href=\"/email/{uid}\">{}</a>",
            escape(&email.subject)
        );
        push_article(&mut out, email, &title, body, false);
    }
    out
}

/// A single article with a link back to the list.
pub fn single(email: &Email, body: &str) -> String {
    let mut out = String::new();
    push_article(&mut out, email, &escape(&email.subject), body, true);
    out
}

fn push_article(out: &mut String, email: &Email, title: &str, body: &str, back_link: bool) {
    out.push_str("        <article>\n");
    out.push_str(&format!("            <h2>{title}</h2>\n"));
    out.push_str("            <div class=\"meta\">\n");
    out.push_str(&format!(
        "                <p><strong>From:</strong> {}</p>\n",
        escape(&email.from)
    ));
    out.push_str(&format!(
        "                <p><strong>Date:</strong> {}</p>\n",
        escape(&email.date_raw)
    ));
    out.push_str("            </div>\n");
    out.push_str("            <div class=\"content\">\n");
    out.push_str(body);
    out.push_str("\n            </div>\n");
    if back_link {
        out.push_str("            <p><a href=\"/\">&larr; Back to all emails</a></p>\n");
    }
    out.push_str("        </article>\n");
}
