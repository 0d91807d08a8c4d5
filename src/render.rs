use pulldown_cmark::{html, Options, Parser};

use crate::model::{FreshEvent, NotificationJob};
use crate::window::{humanize_age, FreshnessWindow};

pub const TAG_NOTE: &str = "This is a regular Git tag that has not been associated with a release";

/// Subject line for a job.
pub fn subject(job: &NotificationJob) -> String {
    job.repo.full_name.clone()
}

/// HTML body: repository link, release or tag link, publish instant with its
/// age, then the rendered release notes (or a note for bare tags) and the run id.
pub fn render_body(job: &NotificationJob, window: &FreshnessWindow, run_id: &str) -> String {
    let (heading, notes) = match &job.event {
        FreshEvent::Release(r) => {
            let heading = match r.title.as_deref() {
                Some(title) => format!("{} / {}", html_escape(&r.tag_name), html_escape(title)),
                None => html_escape(&r.tag_name),
            };
            let notes = r
                .body
                .as_deref()
                .map(markdown_to_html)
                .unwrap_or_default();
            (heading, notes)
        }
        FreshEvent::Tag(t) => (html_escape(&t.name), format!("<p><i>{}</i></p>", TAG_NOTE)),
    };

    let (published, ago) = match job.event.published_at() {
        Some(at) => (at.to_rfc3339(), humanize_age(window.age(at))),
        None => ("unknown".to_string(), String::new()),
    };

    format!(
        r#"<h2><a href="{}">{}</a></h2>
<h3><a href="{}">{}</a></h3>
<p><strong>{}&nbsp;&nbsp;{}</strong></p>
<hr>
{}
<br/>
<br/>
<p><i>{}</i></p>
"#,
        html_attr(&job.repo.html_url),
        html_escape(&job.repo.full_name),
        html_attr(job.event.url()),
        heading,
        published,
        ago,
        notes,
        html_escape(run_id),
    )
}

pub fn markdown_to_html(md: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(md, options));
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn html_attr(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}
