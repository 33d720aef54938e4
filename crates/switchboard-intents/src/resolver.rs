//! Two-stage intent resolution: deterministic phrases first, completion
//! service second.

use crate::completion::CompletionService;
use crate::contacts::ContactDirectory;
use crate::error::IntentError;
use crate::patterns::match_phrase;
use crate::phone::{self, Region};
use serde::Deserialize;
use std::sync::Arc;
use switchboard_types::{Confidence, IntentKind, ParsedIntent};

/// Instruction sent with every fallback classification request.
pub const CLASSIFIER_INSTRUCTION: &str = r#"You classify voice commands spoken during a phone call.

Choose exactly one intent:
- "add": bring a third person into the call. Give the person's name or phone number.
- "forward": transfer the call to someone else. Give the person's name or phone number.
- "end": hang up the call.
- "none": anything else.

Reply with a single JSON object and nothing else:
{"intent": "add|forward|end|none", "target_name": "optional name", "target_number": "optional phone number"}"#;

/// Shape of the completion service's JSON reply.
#[derive(Debug, Deserialize)]
struct ClassifierReply {
    intent: String,
    #[serde(default)]
    target_name: Option<String>,
    #[serde(default)]
    target_number: Option<String>,
}

/// Turns transcribed speech into a [`ParsedIntent`].
pub struct IntentResolver {
    contacts: Arc<dyn ContactDirectory>,
    completion: Option<Arc<dyn CompletionService>>,
    region: Region,
}

impl IntentResolver {
    /// A resolver with only the deterministic stage. Utterances it cannot
    /// classify with high confidence resolve to `none`.
    pub fn new(contacts: Arc<dyn ContactDirectory>, region: Region) -> Self {
        Self {
            contacts,
            completion: None,
            region,
        }
    }

    /// Enables the completion-service fallback.
    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Classifies an utterance. Never fails: every error collapses to
    /// `{kind: none, confidence: low}`.
    ///
    /// `correlation_id` (usually the call leg) only tags log lines.
    pub async fn resolve(&self, utterance: &str, correlation_id: Option<&str>) -> ParsedIntent {
        let call_sid = correlation_id.unwrap_or("-");
        let transcript = utterance.trim();
        if transcript.is_empty() {
            return ParsedIntent::none(Confidence::Low);
        }

        let fast = self.resolve_fast(transcript);
        if fast.confidence == Confidence::High {
            tracing::info!(
                call_sid,
                transcript,
                intent = fast.kind.as_str(),
                "intent parsed via phrase match"
            );
            return fast;
        }

        match self.resolve_fallback(transcript).await {
            Ok(intent) => {
                tracing::info!(
                    call_sid,
                    transcript,
                    intent = intent.kind.as_str(),
                    "intent parsed via completion fallback"
                );
                intent
            }
            Err(IntentError::NotConfigured) => {
                tracing::debug!(call_sid, transcript, "no completion fallback configured");
                ParsedIntent::none(Confidence::Low)
            }
            Err(e) => {
                tracing::error!(call_sid, transcript, "fallback intent parsing failed: {}", e);
                ParsedIntent::none(Confidence::Low)
            }
        }
    }

    /// The deterministic stage on its own.
    pub fn resolve_fast(&self, utterance: &str) -> ParsedIntent {
        match match_phrase(utterance) {
            Some(hit) => match (hit.kind, hit.target) {
                (IntentKind::End, _) => ParsedIntent::end(Confidence::High),
                (kind, Some(target)) => self.resolve_target(kind, &target),
                (kind, None) => ParsedIntent {
                    kind,
                    target_name: None,
                    target_number: None,
                    confidence: Confidence::Medium,
                },
            },
            None => ParsedIntent::none(Confidence::Low),
        }
    }

    /// Resolves a spoken target to a number: embedded digits first, then the
    /// contact book, otherwise the bare name at medium confidence.
    pub fn resolve_target(&self, kind: IntentKind, target: &str) -> ParsedIntent {
        if let Some(number) =
            phone::extract_digits(target).and_then(|digits| phone::normalize(&digits, self.region))
        {
            return ParsedIntent {
                kind,
                target_name: None,
                target_number: Some(number),
                confidence: Confidence::High,
            };
        }

        if let Some(number) = self.contacts.lookup(target) {
            return ParsedIntent {
                kind,
                target_name: Some(target.to_string()),
                target_number: Some(number),
                confidence: Confidence::High,
            };
        }

        ParsedIntent {
            kind,
            target_name: Some(target.to_string()),
            target_number: None,
            confidence: Confidence::Medium,
        }
    }

    async fn resolve_fallback(&self, utterance: &str) -> Result<ParsedIntent, IntentError> {
        let completion = self.completion.as_ref().ok_or(IntentError::NotConfigured)?;
        let content = completion.complete(CLASSIFIER_INSTRUCTION, utterance).await?;
        let reply: ClassifierReply = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| IntentError::MalformedResponse(e.to_string()))?;
        self.interpret(reply)
    }

    fn interpret(&self, reply: ClassifierReply) -> Result<ParsedIntent, IntentError> {
        let kind: IntentKind = reply.intent.parse().map_err(|()| {
            IntentError::MalformedResponse(format!("unknown intent '{}'", reply.intent))
        })?;

        match kind {
            IntentKind::None => return Ok(ParsedIntent::none(Confidence::Medium)),
            IntentKind::End => return Ok(ParsedIntent::end(Confidence::Medium)),
            IntentKind::Add | IntentKind::Forward => {}
        }

        let target_name = non_blank(reply.target_name);
        let mut target_number = non_blank(reply.target_number).and_then(|raw| {
            let normalized = phone::normalize(&raw, self.region);
            if normalized.is_none() {
                tracing::warn!(number = %raw, "dropping unusable number from completion reply");
            }
            normalized
        });

        if target_number.is_none() {
            target_number = target_name
                .as_deref()
                .and_then(|name| self.contacts.lookup(name));
        }

        Ok(ParsedIntent {
            kind,
            target_name,
            target_number,
            confidence: Confidence::Medium,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Removes a surrounding Markdown code fence, which some models add even
/// when asked for bare JSON.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactBook;

    fn resolver() -> IntentResolver {
        let book = ContactBook::in_memory(Region::US);
        book.insert("alice", "+12015550123").unwrap();
        IntentResolver::new(Arc::new(book), Region::US)
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fence("```json\n{\"intent\":\"end\"}\n```"), "{\"intent\":\"end\"}");
        assert_eq!(strip_code_fence("  {\"intent\":\"end\"} "), "{\"intent\":\"end\"}");
    }

    #[test]
    fn fast_stage_resolves_contact_names() {
        let intent = resolver().resolve_fast("call Alice");
        assert_eq!(intent.kind, IntentKind::Add);
        assert_eq!(intent.target_name.as_deref(), Some("Alice"));
        assert_eq!(intent.target_number.as_deref(), Some("+12015550123"));
        assert_eq!(intent.confidence, Confidence::High);
    }

    #[test]
    fn unknown_name_is_medium_without_number() {
        let intent = resolver().resolve_fast("forward to Zed");
        assert_eq!(intent.kind, IntentKind::Forward);
        assert_eq!(intent.target_name.as_deref(), Some("Zed"));
        assert_eq!(intent.target_number, None);
        assert_eq!(intent.confidence, Confidence::Medium);
    }

    #[test]
    fn over_long_spoken_number_is_not_dialed() {
        let intent = resolver().resolve_fast("add +33 1 23 45 67 89 01 23 4");
        assert_eq!(intent.kind, IntentKind::Add);
        assert_eq!(intent.target_number, None);
        assert_ne!(intent.confidence, Confidence::High);
    }

    #[test]
    fn unassigned_country_code_is_not_dialed() {
        let intent = resolver().resolve_fast("add +999 1234 5678");
        assert_eq!(intent.target_number, None);
        assert_ne!(intent.confidence, Confidence::High);
    }

    #[test]
    fn interpret_normalizes_numbers_and_falls_back_to_contacts() {
        let resolver = resolver();

        let with_number = resolver
            .interpret(ClassifierReply {
                intent: "forward".to_string(),
                target_name: None,
                target_number: Some("(201) 555-0123".to_string()),
            })
            .unwrap();
        assert_eq!(with_number.target_number.as_deref(), Some("+12015550123"));
        assert_eq!(with_number.confidence, Confidence::Medium);

        let by_name = resolver
            .interpret(ClassifierReply {
                intent: "add".to_string(),
                target_name: Some("Alice".to_string()),
                target_number: Some("garbage".to_string()),
            })
            .unwrap();
        assert_eq!(by_name.target_number.as_deref(), Some("+12015550123"));
    }

    #[test]
    fn interpret_rejects_unknown_intents() {
        let err = resolver()
            .interpret(ClassifierReply {
                intent: "transfer".to_string(),
                target_name: None,
                target_number: None,
            })
            .unwrap_err();
        assert!(matches!(err, IntentError::MalformedResponse(_)));
    }
}
