use std::fs::File;
use std::io::Write;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::completion::CompletionService;
use super::error::{Result, ScrapeError};
use super::fetch::PageSource;
use super::types::CatalogRecord;

const MISSING_FIELD: &str = "N/A";

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("json fence regex is valid")
});
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\s*([\s\S]*?)\s*```").expect("fence regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    pub url: String,
    pub description: String,
    pub duration: String,
    pub remote_testing: String,
    pub adaptive_support: String,
    pub test_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub query: String,
    pub recommended_assessments: Vec<Recommendation>,
}

pub fn build_prompt(catalog: &[CatalogRecord], query: &str, max_results: usize) -> Result<String> {
    let catalog_json = serde_json::to_string_pretty(catalog)?;
    Ok(format!(
        "You are an assessment recommendation system. Using only the assessments listed below, \
recommend the ones most relevant to the job description or query.\n\n\
Available assessments:\n{catalog_json}\n\n\
Query: {query}\n\n\
Return a JSON array with at most {max_results} assessments. Each element must have the fields:\n\
- name: the assessment name\n\
- url: the assessment URL\n\
- description: copied verbatim from the list\n\
- duration: the assessment duration\n\
- remote_testing: whether remote testing is supported (Yes/No)\n\
- adaptive_support: whether adaptive/IRT is supported (Yes/No)\n\
- test_type: the test type\n\
- reason: a short explanation of why the assessment was shortlisted\n\n\
Answer with the JSON array only, without any other text.\n"
    ))
}

fn carries_records(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

// Prose may hold stray brackets ("Top [3] picks"), so every opener is tried in turn.
fn embedded_payload(text: &str) -> Option<Value> {
    text.match_indices(['[', '{']).find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()?
            .ok()
            .filter(carries_records)
    })
}

pub fn extract_json_payload(text: &str) -> Option<Value> {
    let parsed = |candidate: &str| serde_json::from_str::<Value>(candidate).ok();
    let fenced_json = JSON_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parsed(m.as_str()));
    let fenced_any = || {
        ANY_FENCE
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| parsed(m.as_str()))
    };

    fenced_json
        .or_else(fenced_any)
        .or_else(|| embedded_payload(text))
        .or_else(|| parsed(text.trim()))
}

fn field_string(entry: &Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

fn recommendation_from_entry(entry: &Map<String, Value>) -> Recommendation {
    let required = |key: &str| field_string(entry, key).unwrap_or_else(|| MISSING_FIELD.to_string());
    Recommendation {
        name: required("name"),
        url: required("url"),
        description: required("description"),
        duration: required("duration"),
        remote_testing: required("remote_testing"),
        adaptive_support: required("adaptive_support"),
        test_type: required("test_type"),
        reason: field_string(entry, "reason"),
    }
}

pub fn parse_recommendations(text: &str, max_results: usize) -> Vec<Recommendation> {
    let Some(payload) = extract_json_payload(text) else {
        warn!(
            preview = %text.chars().take(120).collect::<String>(),
            "model output carried no JSON payload"
        );
        return Vec::new();
    };

    let entries = match payload {
        Value::Array(items) => items,
        Value::Object(map) => vec![Value::Object(map)],
        other => {
            warn!(kind = %other, "model output JSON is neither an array nor an object");
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .take(max_results)
        .map(recommendation_from_entry)
        .collect()
}

pub struct Recommender<C> {
    completion: C,
    catalog: Arc<Vec<CatalogRecord>>,
    max_results: usize,
}

impl<C: CompletionService> Recommender<C> {
    pub fn new(completion: C, catalog: Arc<Vec<CatalogRecord>>, max_results: usize) -> Self {
        Self {
            completion,
            catalog,
            max_results,
        }
    }

    pub async fn recommend(&self, query: &str) -> Vec<Recommendation> {
        if self.max_results == 0 {
            info!("zero results requested, model not consulted");
            return Vec::new();
        }
        if self.catalog.is_empty() {
            warn!("catalog is empty, nothing to recommend from");
            return Vec::new();
        }

        let prompt = match build_prompt(&self.catalog, query, self.max_results) {
            Ok(prompt) => prompt,
            Err(err) => {
                error!(error = %err, "failed to build recommendation prompt");
                return Vec::new();
            }
        };

        match self.completion.complete(&prompt).await {
            Ok(text) => {
                let recommendations = parse_recommendations(&text, self.max_results);
                info!(count = recommendations.len(), "recommendations parsed");
                recommendations
            }
            Err(err) => {
                error!(error = %err, "error getting recommendations");
                Vec::new()
            }
        }
    }
}

pub fn html_to_text(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let mut parts = Vec::new();
    for node in doc.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"));
        if !hidden {
            parts.push(&**text);
        }
    }
    normalize_text(&parts.join(" "))
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub async fn query_from_url<S: PageSource>(source: &S, url: &str) -> Result<String> {
    let markup = source.fetch_text(url).await?;
    let text = html_to_text(&markup);
    if text.is_empty() {
        return Err(ScrapeError::InvalidInput(format!("no text found at {url}")));
    }
    Ok(text)
}

pub fn save_recommendations(path: &str, recommendations: &[Recommendation]) -> Result<()> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, recommendations)?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::completion::tests::MockCompletion;
    use crate::app::fetch::tests::MockSource;
    use crate::app::types::Support;

    fn catalog() -> Arc<Vec<CatalogRecord>> {
        Arc::new(vec![CatalogRecord {
            name: "Java 8 (New)".to_string(),
            url: "https://catalog.test/view/java-8-new/".to_string(),
            description: "Java knowledge test".to_string(),
            duration: "18".to_string(),
            test_type: "Knowledge & Skills".to_string(),
            remote_support: Support::Yes,
            adaptive_support: Support::No,
        }])
    }

    #[test]
    fn payload_from_json_fence() {
        let text = "Here you go:\n```json\n[{\"name\": \"A\"}]\n```\nThanks";
        assert_eq!(
            extract_json_payload(text),
            Some(serde_json::json!([{ "name": "A" }]))
        );
    }

    #[test]
    fn payload_from_bare_fence() {
        let text = "```\n[{\"name\": \"B\"}]\n```";
        assert_eq!(
            extract_json_payload(text),
            Some(serde_json::json!([{ "name": "B" }]))
        );
    }

    #[test]
    fn payload_from_prose_wrapped_nested_array() {
        let text = "Sure! [{\"name\": \"C\", \"tags\": [\"x\", \"y\"]}, {\"name\": \"D\"}] Hope it helps.";
        let payload = extract_json_payload(text).expect("payload");
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn bracketed_prose_before_payload_is_passed_over() {
        let text = r#"Top [2] picks: [{"name": "A"}, {"name": "B"}]"#;
        let recs = parse_recommendations(text, 10);
        let names = recs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B"]);

        let recs = parse_recommendations("See {note} then {\"name\": \"Solo\"} ok", 10);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "Solo");
    }

    #[test]
    fn bare_empty_array_means_no_recommendations() {
        assert_eq!(extract_json_payload(" [] "), Some(serde_json::json!([])));
        assert!(parse_recommendations("[]", 10).is_empty());
    }

    #[test]
    fn garbage_yields_no_recommendations() {
        assert!(extract_json_payload("I cannot help with that.").is_none());
        assert!(parse_recommendations("no json [here", 10).is_empty());
    }

    #[test]
    fn recommendations_are_truncated_and_filled() {
        let text = r#"[
            {"name": "A", "url": "u1", "duration": 30, "reason": "fits"},
            {"name": "B", "test_type": ["Knowledge & Skills", "Simulations"]},
            {"name": "C"}
        ]"#;
        let recs = parse_recommendations(text, 2);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].duration, "30");
        assert_eq!(recs[0].description, "N/A");
        assert_eq!(recs[0].reason.as_deref(), Some("fits"));
        assert_eq!(recs[1].test_type, "Knowledge & Skills, Simulations");
        assert_eq!(recs[1].url, "N/A");
        assert!(recs[1].reason.is_none());
    }

    #[test]
    fn single_object_counts_as_one_recommendation() {
        let recs = parse_recommendations("```json\n{\"name\": \"Solo\"}\n```", 10);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "Solo");
    }

    #[test]
    fn prompt_carries_catalog_query_and_limit() {
        let prompt = build_prompt(&catalog(), "Java developer, 40 minutes", 7).expect("prompt");
        assert!(prompt.contains("\"name\": \"Java 8 (New)\""));
        assert!(prompt.contains("Query: Java developer, 40 minutes"));
        assert!(prompt.contains("at most 7 assessments"));
    }

    #[tokio::test]
    async fn recommender_parses_model_answer() {
        let model = MockCompletion::answering(
            "```json\n[{\"name\": \"Java 8 (New)\", \"url\": \"https://catalog.test/view/java-8-new/\", \"reason\": \"Java\"}]\n```",
        );
        let recommender = Recommender::new(model, catalog(), 10);
        let recs = recommender.recommend("Java developer").await;

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "Java 8 (New)");
        assert_eq!(recs[0].remote_testing, "N/A");
        let prompts = recommender.completion.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Query: Java developer"));
    }

    #[tokio::test]
    async fn model_failure_yields_empty_list() {
        let recommender = Recommender::new(MockCompletion::failing("quota"), catalog(), 10);
        assert!(recommender.recommend("anything").await.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_skips_the_model() {
        let recommender =
            Recommender::new(MockCompletion::answering("[]"), Arc::new(Vec::new()), 10);
        assert!(recommender.recommend("anything").await.is_empty());
        assert!(recommender.completion.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn zero_max_results_skips_the_model() {
        let recommender =
            Recommender::new(MockCompletion::answering("[{\"name\": \"A\"}]"), catalog(), 0);
        assert!(recommender.recommend("Java developer").await.is_empty());
        assert!(recommender.completion.prompts.lock().expect("lock").is_empty());
        assert!(parse_recommendations("[{\"name\": \"A\"}]", 0).is_empty());
    }

    #[test]
    fn html_to_text_drops_scripts_and_collapses_whitespace() {
        let text = html_to_text(
            "<html><head><style>p { color: red }</style><script>var x = 1;</script></head>\
             <body><h1>Java   Developer</h1>\n<p>Needs <b>Spring</b> skills.</p></body></html>",
        );
        assert_eq!(text, "Java Developer Needs Spring skills.");
    }

    #[tokio::test]
    async fn query_from_url_uses_page_text() {
        let source = MockSource::default()
            .with_page("https://jobs.test/1", "<body><p>Data analyst role</p></body>");
        let query = query_from_url(&source, "https://jobs.test/1").await.expect("query");
        assert_eq!(query, "Data analyst role");

        let empty = MockSource::default().with_page("https://jobs.test/2", "<body></body>");
        assert!(query_from_url(&empty, "https://jobs.test/2").await.is_err());
        assert!(query_from_url(&empty, "https://jobs.test/404").await.is_err());
    }

    #[test]
    fn saved_recommendations_are_a_json_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recommend.json");
        let path = path.to_str().expect("utf-8 path");
        let recs = parse_recommendations("[{\"name\": \"A\"}]", 10);

        save_recommendations(path, &recs).expect("save");
        let loaded: Vec<Recommendation> =
            serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json");
        assert_eq!(loaded, recs);
    }
}
