use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::types::{DURATION_VARIES, EnrichedDetail, NO_DESCRIPTION, Support, UNKNOWN};

const DESCRIPTION_HEADING: &str = "Description";
const LENGTH_HEADING: &str = "Assessment length";
const TEST_TYPE_KEY_SELECTOR: &str = "span.product-catalogue__key";
const SUPPORT_CELL_SELECTOR: &str = "td.custom__table-heading__general";
const SUPPORT_MARKER_SELECTOR: &str = "span.catalogue__circle";
const SUPPORT_YES_CLASS: &str = "-yes";

// Unlabelled cells: the first is remote testing, the second adaptive/IRT.
const SUPPORT_CELL_ORDER: [SupportFlag; 2] = [SupportFlag::Remote, SupportFlag::Adaptive];

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit run regex is valid"));

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SupportFlag {
    Remote,
    Adaptive,
}

pub fn test_type_label(code: &str) -> &str {
    match code {
        "A" => "Ability & Aptitude",
        "B" => "Biodata and Situational Judgement",
        "C" => "Competencies",
        "D" => "Development & 360",
        "E" => "Assessment Exercises",
        "K" => "Knowledge & Skills",
        "P" => "Personality & Behaviour",
        "S" => "Simulations",
        other => other,
    }
}

pub fn extract_detail(markup: &str) -> EnrichedDetail {
    let doc = Html::parse_document(markup);
    let (remote_support, adaptive_support) = extract_support_flags(&doc);
    EnrichedDetail {
        description: extract_description(&doc),
        duration: extract_duration(&doc),
        test_type: extract_test_type(&doc),
        remote_support,
        adaptive_support,
    }
}

fn extract_description(doc: &Html) -> String {
    paragraph_after_heading(doc, DESCRIPTION_HEADING)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string())
}

fn extract_duration(doc: &Html) -> String {
    paragraph_after_heading(doc, LENGTH_HEADING)
        .and_then(|text| DIGIT_RUN.find(&text).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| DURATION_VARIES.to_string())
}

fn extract_test_type(doc: &Html) -> String {
    let selector = match Selector::parse(TEST_TYPE_KEY_SELECTOR) {
        Ok(s) => s,
        Err(_) => return UNKNOWN.to_string(),
    };

    let labels = doc
        .select(&selector)
        .map(|el| element_text(&el))
        .filter(|code| !code.is_empty())
        .map(|code| test_type_label(&code).to_string())
        .collect::<Vec<_>>();
    if labels.is_empty() {
        UNKNOWN.to_string()
    } else {
        labels.join(", ")
    }
}

fn extract_support_flags(doc: &Html) -> (Support, Support) {
    let selector = match Selector::parse(SUPPORT_CELL_SELECTOR) {
        Ok(s) => s,
        Err(_) => return (Support::Unknown, Support::Unknown),
    };

    let cells = doc.select(&selector).collect::<Vec<_>>();
    let mut remote = Support::Unknown;
    let mut adaptive = Support::Unknown;
    for (cell, flag) in cells.iter().zip(SUPPORT_CELL_ORDER) {
        let value = cell_support(cell);
        match flag {
            SupportFlag::Remote => remote = value,
            SupportFlag::Adaptive => adaptive = value,
        }
    }
    (remote, adaptive)
}

fn cell_support(cell: &ElementRef<'_>) -> Support {
    let selector = match Selector::parse(SUPPORT_MARKER_SELECTOR) {
        Ok(s) => s,
        Err(_) => return Support::Unknown,
    };

    let marked = cell
        .select(&selector)
        .any(|el| el.value().classes().any(|class| class == SUPPORT_YES_CLASS));
    if marked { Support::Yes } else { Support::No }
}

fn paragraph_after_heading(doc: &Html, heading: &str) -> Option<String> {
    let selector = Selector::parse("h4").ok()?;
    let heading_el = doc
        .select(&selector)
        .find(|el| element_text(el) == heading)?;

    heading_el
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "p")
        .map(|p| p.text().collect::<String>().trim().to_string())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
