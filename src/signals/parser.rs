/// Classifier response parsing
///
/// The classifier is a text-generating model asked to answer with
/// `STAGE<1-4>[ Crossover] on <YYYY-MM-DD> at $<price>`. Its output is
/// untrusted: parsing never panics or errors on unexpected formats, it
/// returns `None` when no stage token can be found.
use super::types::{ Stage, StageSignal };
use crate::errors::{ TrackerError, TrackerResult };
use crate::logger::{ self, LogTag };
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static STAGE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bSTAGE(\d+)").expect("Invalid stage token regex")
});

static CROSSOVER_DETAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:crossover\s+)?on\s+(\d{4}-\d{2}-\d{2})\s+at\s+\$\s?([0-9][0-9,]*(?:\.[0-9]+)?)"
    ).expect("Invalid crossover regex")
});

// Plain digits or comma-grouped thousands; "4,71" is ambiguous and rejected
static PRICE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").expect("Invalid price regex")
});

/// JSON form accepted alongside the free-text grammar
#[derive(Debug, Deserialize)]
struct StructuredSignal {
    stage: StructuredStage,
    #[serde(default)]
    crossover_date: Option<String>,
    #[serde(default)]
    crossover_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StructuredStage {
    Number(u8),
    Label(String),
}

/// A stage token located in the text
struct StageMatch {
    stage: Stage,
    start: usize,
    end: usize,
}

/// Parse a classifier response into a stage signal
///
/// - The first valid stage token wins (lowest position in the text)
/// - `STAGE99` and other out-of-range tokens are skipped
/// - Crossover detail is optional; a missing or malformed detail leaves the
///   crossover fields empty without invalidating the stage
pub fn parse_signal(text: &str) -> Option<StageSignal> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if let Some(signal) = parse_structured(trimmed) {
            return Some(signal);
        }
    }

    let tokens = find_stage_tokens(trimmed);
    let first = match tokens.first() {
        Some(first) => first,
        None => {
            logger::debug(LogTag::Signals, &format!("No stage token in: {}", preview(trimmed)));
            return None;
        }
    };

    // Crossover detail belongs to the first token only
    let segment_end = tokens.get(1).map(|next| next.start).unwrap_or(trimmed.len());
    let segment = &trimmed[first.end..segment_end];

    let mut signal = StageSignal::new(first.stage);
    if let Some((date, price)) = parse_crossover(segment) {
        signal = signal.with_crossover(date, price);
    }

    if tokens.len() > 1 {
        logger::debug(
            LogTag::Signals,
            &format!(
                "{} stage tokens in response, using the first ({})",
                tokens.len(),
                first.stage
            )
        );
    }

    Some(signal)
}

/// Like `parse_signal`, but reports a missing stage as `ParseFailure`
pub fn require_signal(text: &str) -> TrackerResult<StageSignal> {
    parse_signal(text).ok_or(TrackerError::ParseFailure)
}

fn find_stage_tokens(text: &str) -> Vec<StageMatch> {
    STAGE_TOKEN.captures_iter(text)
        .filter_map(|caps| {
            let token = caps.get(0)?;
            let digits = caps.get(1)?;
            let number = digits.as_str().parse::<u8>().ok()?;
            if digits.as_str().len() != 1 {
                return None;
            }
            Stage::from_number(number).map(|stage| StageMatch {
                stage,
                start: token.start(),
                end: digits.end(),
            })
        })
        .collect()
}

fn parse_crossover(segment: &str) -> Option<(NaiveDate, f64)> {
    let caps = CROSSOVER_DETAIL.captures(segment)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()?;
    let raw_price = caps.get(2)?.as_str().trim_end_matches(',');
    if !PRICE_LITERAL.is_match(raw_price) {
        logger::debug(LogTag::Signals, &format!("Rejected crossover price literal: {}", raw_price));
        return None;
    }
    let price = raw_price.replace(',', "").parse::<f64>().ok()?;
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    Some((date, price))
}

fn parse_structured(text: &str) -> Option<StageSignal> {
    let structured: StructuredSignal = serde_json::from_str(text).ok()?;

    let stage = match structured.stage {
        StructuredStage::Number(number) => Stage::from_number(number)?,
        StructuredStage::Label(label) => find_stage_tokens(&label).first()?.stage,
    };

    let mut signal = StageSignal::new(stage);
    let date = structured.crossover_date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok());
    let price = structured.crossover_price.filter(|p| p.is_finite() && *p >= 0.0);
    if let (Some(date), Some(price)) = (date, price) {
        signal = signal.with_crossover(date, price);
    }

    Some(signal)
}

fn preview(text: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 80;
    if text.chars().count() <= MAX_PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}
