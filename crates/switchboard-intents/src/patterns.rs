//! Phrase families for the deterministic classification stage.

use regex::Regex;
use std::sync::LazyLock;
use switchboard_types::IntentKind;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("intent phrase pattern is valid"))
        .collect()
}

static ADD_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:add|call|dial|connect)\s+(.+)",
        r"(?i)\b(?:bring|conference)\s+in\s+(.+)",
    ])
});

static FORWARD_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:forward|transfer)\s+(?:(?:the\s+|this\s+)?call\s+)?(?:to\s+)?(.+)",
        r"(?i)\b(?:send|redirect)\s+(?:(?:the\s+|this\s+)?call\s+)?(?:to\s+)?(.+)",
    ])
});

static END_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bhang\s*up\b",
        r"(?i)\bend\s+(?:the\s+)?call\b",
        r"(?i)\bdisconnect\b",
        r"(?i)\bgood\s*bye\b",
        r"(?i)\bbye\s*bye\b",
    ])
});

/// A phrase family hit, before the target is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PhraseMatch {
    pub kind: IntentKind,
    pub target: Option<String>,
}

/// Strips the sentence punctuation smart formatting appends to transcripts.
fn clean_target(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn first_capture(phrases: &[Regex], text: &str) -> Option<Option<String>> {
    phrases.iter().find_map(|re| {
        re.captures(text)
            .map(|caps| caps.get(1).and_then(|m| clean_target(m.as_str())))
    })
}

/// "the call to X" names a transfer, not a request to call someone.
fn is_call_to(target: &Option<String>) -> bool {
    target
        .as_deref()
        .is_some_and(|t| t.to_lowercase().starts_with("to "))
}

/// Matches `text` against the add, forward and end families, in that order.
pub(crate) fn match_phrase(text: &str) -> Option<PhraseMatch> {
    let text = text.trim();

    if let Some(target) = first_capture(&ADD_PHRASES, text).filter(|t| !is_call_to(t)) {
        return Some(PhraseMatch {
            kind: IntentKind::Add,
            target,
        });
    }
    if let Some(target) = first_capture(&FORWARD_PHRASES, text) {
        return Some(PhraseMatch {
            kind: IntentKind::Forward,
            target,
        });
    }
    if END_PHRASES.iter().any(|re| re.is_match(text)) {
        return Some(PhraseMatch {
            kind: IntentKind::End,
            target: None,
        });
    }

    None
}
