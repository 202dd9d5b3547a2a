use minijinja::Environment;
use serde::Serialize;
use std::sync::OnceLock;

use crate::summarize::SummaryOutcome;

const PAGE_TEMPLATE_NAME: &str = "index.html";
const PAGE_TEMPLATE_SRC: &str = include_str!("../../templates/index.html");

static PAGE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(Serialize)]
pub struct PageView<'a> {
    pub model: &'a str,
    pub article: &'a str,
    pub outcome: Option<&'a SummaryOutcome>,
}

fn page_env() -> Result<&'static Environment<'static>, minijinja::Error> {
    if let Some(env) = PAGE_ENV.get() {
        return Ok(env);
    }
    let mut env = Environment::new();
    // `.html` names get auto-escaping.
    env.add_template(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE_SRC)?;
    Ok(PAGE_ENV.get_or_init(|| env))
}

pub fn render_page(view: &PageView<'_>) -> Result<String, minijinja::Error> {
    page_env()?.get_template(PAGE_TEMPLATE_NAME)?.render(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(outcome: Option<&SummaryOutcome>) -> String {
        render_page(&PageView {
            model: "t5-small",
            article: "",
            outcome,
        })
        .unwrap()
    }

    #[test]
    fn empty_page_has_form_and_no_result() {
        let html = render(None);
        assert!(html.contains("GenAI Summarizer"));
        assert!(html.contains("Paste your full article here..."));
        assert!(html.contains("powered by t5-small"));
        assert!(!html.contains("summary-box\">"));
        assert!(!html.contains("alert-warning\">"));
        assert!(!html.contains("alert-error\">"));
    }

    #[test]
    fn shows_exactly_one_result_area() {
        let summary = SummaryOutcome::Summary("Short version.".into());
        let html = render(Some(&summary));
        assert!(html.contains("<h3>Summary</h3>"));
        assert!(html.contains("Short version."));
        assert!(!html.contains("alert-error\">"));

        let error = SummaryOutcome::Error("boom".into());
        let html = render(Some(&error));
        assert!(html.contains("Error: boom"));
        assert!(!html.contains("<h3>Summary</h3>"));

        let warning = SummaryOutcome::Warning("paste something".into());
        let html = render(Some(&warning));
        assert!(html.contains("paste something"));
        assert!(!html.contains("<h3>Summary</h3>"));
        assert!(!html.contains("alert-error\">"));
    }

    #[test]
    fn summary_and_article_are_escaped() {
        let summary = SummaryOutcome::Summary("<script>alert(1)</script>".into());
        let html = render_page(&PageView {
            model: "t5-small",
            article: "</textarea><b>x</b>",
            outcome: Some(&summary),
        })
        .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("</textarea><b>"));
    }

    #[test]
    fn article_leading_newline_survives_textarea() {
        let html = render_page(&PageView {
            model: "t5-small",
            article: "\nDateline: Paris",
            outcome: None,
        })
        .unwrap();
        // Browsers drop one newline right after <textarea>; the template supplies it.
        assert!(html.contains("here...\">\n\nDateline: Paris</textarea>"));
    }
}
