//! Server-rendered page: a sidebar for the credential and a main area for the
//! query form and the research output.

use researchmesh_core::session::{CREDENTIAL_PROMPT, RUNNING_MESSAGE};
use researchmesh_core::{RunState, TeamDescriptor, escape_html, render_markdown};

pub const PAGE_TITLE: &str = "ResearchMesh - Multi-Agent AI Researcher";
pub const SUBTITLE: &str = "Research HackerNews, read articles, search the web, and generate \
high-quality summaries, blogs, or reports.";
pub const QUERY_PLACEHOLDER: &str = "e.g. Latest trends in Generative AI on HackerNews";

const SIDEBAR_AGENTS: [&str; 3] = ["HackerNews Researcher", "Web Search Agent", "Article Reader"];
const SIDEBAR_OUTPUTS: [&str; 3] = [
    "Insightful summaries",
    "Blog-ready content",
    "Research reports",
];

const STYLE: &str = r#"
body { margin: 0; font-family: -apple-system, "Segoe UI", Roboto, sans-serif; display: flex; min-height: 100vh; color: #111827; }
.sidebar { width: 18rem; padding: 1.5rem; background: #f3f4f6; border-right: 1px solid #e5e7eb; }
.sidebar input { width: 100%; box-sizing: border-box; }
.sidebar .help { color: #6b7280; font-size: 0.85rem; }
.main { flex: 1; padding: 2rem 3rem; max-width: 60rem; }
.main-title { font-size: 2.4rem; font-weight: 700; margin-bottom: 0.25rem; }
.sub-title { font-size: 1.1rem; color: #6b7280; margin-bottom: 2rem; }
.result-box { padding: 1.5rem; border-radius: 12px; background-color: #0f172a; color: #e5e7eb; }
.result-box a { color: #93c5fd; }
input[type=text], input[type=password] { border-radius: 10px; border: 1px solid #d1d5db; padding: 0.5rem 0.75rem; }
input[type=text] { width: 100%; box-sizing: border-box; }
button { border-radius: 10px; padding: 0.6rem 1.2rem; font-weight: 600; margin-top: 0.75rem; cursor: pointer; }
.alert { padding: 0.75rem 1rem; border-radius: 8px; margin: 1rem 0; }
.alert.info { background: #dbeafe; color: #1e3a8a; }
.alert.warning { background: #fef3c7; color: #92400e; }
.alert.success { background: #dcfce7; color: #166534; }
.alert.error { background: #fee2e2; color: #991b1b; }
.spinner::before { content: ""; display: inline-block; width: 1em; height: 1em; margin-right: 0.5em; vertical-align: -0.15em; border: 2px solid #93c5fd; border-top-color: transparent; border-radius: 50%; animation: spin 0.8s linear infinite; }
@keyframes spin { to { transform: rotate(360deg); } }
details { margin-top: 1rem; }
"#;

/// Everything the page needs for one render.
pub struct PageView<'a> {
    pub has_credential: bool,
    pub query: &'a str,
    pub state: Option<&'a RunState>,
    pub team: &'a TeamDescriptor,
}

pub fn render_page(view: &PageView<'_>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>AI Researcher</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");

    render_sidebar(&mut html, view.has_credential);

    html.push_str("<main class=\"main\">\n");
    html.push_str(&format!(
        "<div class=\"main-title\">&#128269; {}</div>\n<div class=\"sub-title\">{}</div>\n",
        escape_html(PAGE_TITLE),
        escape_html(SUBTITLE)
    ));

    if view.has_credential {
        render_query_form(&mut html, view.query);
        if let Some(state) = view.state {
            render_state(&mut html, state, view.team.show_members_responses);
        }
    } else {
        alert(&mut html, "info", &format!("&#128072; {}", escape_html(CREDENTIAL_PROMPT)));
    }

    html.push_str("</main>\n</body>\n</html>\n");
    html
}

fn render_sidebar(html: &mut String, has_credential: bool) {
    html.push_str("<aside class=\"sidebar\">\n<h2>&#9881;&#65039; Configuration</h2>\n");
    html.push_str("<form method=\"post\" action=\"/credential\">\n");
    html.push_str("<label for=\"api_key\">OpenAI API Key</label>\n");
    html.push_str(
        "<input type=\"password\" id=\"api_key\" name=\"api_key\" autocomplete=\"off\">\n",
    );
    html.push_str("<p class=\"help\">Your API key is used only for this session.</p>\n");
    if has_credential {
        html.push_str("<p class=\"help\">A key is set for this session.</p>\n");
    }
    html.push_str("<button type=\"submit\">Save key</button>\n</form>\n<hr>\n");

    html.push_str("<p><strong>&#129302; Agents in this App</strong></p>\n<ul>\n");
    for agent in SIDEBAR_AGENTS {
        html.push_str(&format!("<li>{agent}</li>\n"));
    }
    html.push_str("</ul>\n<p><strong>&#128221; Output</strong></p>\n<ul>\n");
    for output in SIDEBAR_OUTPUTS {
        html.push_str(&format!("<li>{output}</li>\n"));
    }
    html.push_str("</ul>\n</aside>\n");
}

fn render_query_form(html: &mut String, query: &str) {
    html.push_str("<h3>&#129504; What do you want to research?</h3>\n");
    html.push_str(
        "<form method=\"post\" action=\"/research\" \
         onsubmit=\"document.getElementById('spinner').hidden=false;this.querySelector('button').disabled=true;\">\n",
    );
    html.push_str("<label for=\"query\">Enter your topic or question</label>\n");
    html.push_str(&format!(
        "<input type=\"text\" id=\"query\" name=\"query\" value=\"{}\" placeholder=\"{}\">\n",
        escape_html(query),
        escape_html(QUERY_PLACEHOLDER)
    ));
    html.push_str("<button type=\"submit\">&#128640; Run Research</button>\n</form>\n");
    html.push_str(&format!(
        "<div id=\"spinner\" class=\"alert info spinner\" hidden>&#128270; {}</div>\n",
        escape_html(RUNNING_MESSAGE)
    ));
}

fn render_state(html: &mut String, state: &RunState, show_members: bool) {
    let message = state.message().map(|text| escape_html(&text));
    match state {
        RunState::AwaitingCredential | RunState::Idle | RunState::Running => {}
        RunState::Warned => {
            alert(html, "warning", &format!("&#9888;&#65039; {}", message.unwrap_or_default()));
        }
        RunState::Failed { .. } => {
            alert(html, "error", &message.unwrap_or_default());
        }
        RunState::Completed { output } => {
            alert(html, "success", &format!("&#9989; {}", message.unwrap_or_default()));
            html.push_str("<h3>&#128196; Research Output</h3>\n<div class=\"result-box\">\n");
            html.push_str(&render_markdown(&output.content));
            html.push_str("</div>\n");

            if show_members {
                for response in &output.member_responses {
                    html.push_str(&format!(
                        "<details><summary>{}</summary>\n<div class=\"result-box\">\n{}</div>\n</details>\n",
                        escape_html(&response.member),
                        render_markdown(&response.content)
                    ));
                }
            }
        }
    }
}

fn alert(html: &mut String, class: &str, body: &str) {
    html.push_str(&format!("<div class=\"alert {class}\">{body}</div>\n"));
}
