//! Draft policy: prompt construction, reply decoding, and validation.
//!
//! The collaborator is asked for one JSON object per country: a count of
//! genuinely country-relevant items, digest bullets, and zero to four
//! outreach emails. Everything it returns is validated here before
//! anything is persisted:
//!
//! - bullets beyond `INFO_LIMIT` are cut, never padded
//! - all emails are dropped when the relevant-item count is below
//!   `EMAIL_MIN_ITEMS`
//! - an email whose body falls outside the word bounds is rejected on its
//!   own; in-bounds siblings survive
//!
//! A reply that does not parse gets exactly one re-ask when the failure
//! looks like output truncation; any other malformed reply fails the
//! country immediately.

use crate::api::{Collaborator, DraftRequest};
use crate::error::CollaboratorError;
use crate::models::{Digest, Draft};
use crate::utils::{looks_truncated, truncate_for_log, word_count};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Hard cap on emails per country, matching the prompt's instruction.
const MAX_DRAFTS: usize = 4;

pub const SYSTEM_PROMPT: &str = "You are a Joint SDG Fund brief writer with a political-anthropology lens. \
     Audience: senior programme officers (DCO/RC system). Style: crisp, neutral, constructive; \
     country-specific only; no other countries. Avoid links or invented facts.";

/// The decoded collaborator reply, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorReply {
    /// How many corpus items survived the relevance filter. Required so a
    /// reply that skipped the filter step fails loudly instead of sending
    /// emails for an empty country.
    pub relevant_count: usize,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub emails: Vec<EmailReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReply {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Build the per-country user prompt.
pub fn build_prompt(request: &DraftRequest) -> String {
    let country = &request.country;
    format!(
        r#"COUNTRY: {country}
CUTOFF: {cutoff}  (use developments on/after this date only)

SOURCE (verbatim lines; this is your ONLY factual base):
---
{corpus}
---

STRICT RELEVANCE FILTER (very important)
- Include ONLY items that are clearly about {country} (named {country} actors, government decisions, UN engagement in-country, agreements, financing, sanctions/trade actions affecting {country}, disasters/security events in {country}, specific investments).
- DISCARD items that merely mention {country} in passing, are about another country/region, generic explainers, opinion columns, sports/celebrity pieces, or broad regional roundups with no {country}-specific substance.
- Treat all entry hits as potentially noisy; keep only ones with concrete {country}-specific actions or implications.

TASKS
1) Count the items that survive the relevance filter and report it as relevantCount.
2) Write 1 to {info_limit} concise digest bullets about {country}, anchored in SOURCE. End each bullet with [date; source]. Where helpful, note why it matters for RC/DCO engagement or financing windows (govt, private, philanthropic). No URLs. No other countries. Never invent.
3) If relevantCount is at least {min_items}, draft outreach emails; otherwise return an empty emails array. When substance spans multiple themes (3 or more relevant items), split into up to FOUR emails, each with a clear genre (e.g. policy window, financing/investment, partnerships, humanitarian/climate, private sector, macro-fiscal, social protection, digital). Keep the tone collaborative and non-didactic; suggest practical next steps and light support.
4) Each email body must be {words_min}-{words_max} words, a single paragraph, natural but diplomatic. Briefly reference the facts and pivot to a gentle invitation or offer of support. No links. No other countries. Use a generic salutation if the recipient is unknown (e.g. "Excellency," or "Dear Colleague,"). Close with "Kind regards," and "United Nations Joint SDG Fund".

OUTPUT
Reply with a single JSON object and nothing else:
{{
  "relevantCount": <number>,
  "bullets": ["<bullet 1>", "..."],
  "emails": [
    {{"genre": "<short theme label>", "subject": "<one line>", "body": "<single paragraph>"}}
  ]
}}
Subjects must be one line of real text. Never use placeholders or cross-references such as "see above"."#,
        country = country,
        cutoff = request.cutoff,
        corpus = request.corpus_text.trim_end(),
        info_limit = request.info_limit,
        min_items = request.email_min_items,
        words_min = request.email_words_min,
        words_max = request.email_words_max,
    )
}

/// Strip a Markdown code fence the model sometimes wraps around its JSON.
fn strip_fences(reply: &str) -> &str {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Decode a raw reply into a [`CollaboratorReply`].
pub fn parse_reply(reply: &str) -> Result<CollaboratorReply, serde_json::Error> {
    serde_json::from_str(strip_fences(reply))
}

/// Ask the collaborator for one country's digest and drafts, validated.
///
/// A reply whose JSON breaks off mid-stream gets one re-ask; the second
/// reply is final either way.
pub async fn derive<C: Collaborator>(
    collaborator: &C,
    request: &DraftRequest,
) -> Result<(Digest, Vec<Draft>), CollaboratorError> {
    let raw = collaborator.generate(request).await?;
    let reply = match parse_reply(&raw) {
        Ok(reply) => reply,
        Err(e) if looks_truncated(&e) => {
            warn!(country = %request.country, error = %e, "Reply looks truncated; asking once more");
            let raw = collaborator.generate(request).await?;
            parse_reply(&raw).map_err(|e| CollaboratorError::Malformed {
                detail: e.to_string(),
                preview: truncate_for_log(strip_fences(&raw), 300),
            })?
        }
        Err(e) => {
            return Err(CollaboratorError::Malformed {
                detail: e.to_string(),
                preview: truncate_for_log(strip_fences(&raw), 300),
            });
        }
    };
    Ok(validate(reply, request))
}

/// Enforce the digest cap, the draft eligibility threshold, and the
/// per-email bounds.
pub fn validate(reply: CollaboratorReply, request: &DraftRequest) -> (Digest, Vec<Draft>) {
    let mut bullets: Vec<String> = reply
        .bullets
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .map(|b| b.trim_start_matches(['-', '•', '*']).trim_start().to_string())
        .collect();
    if bullets.len() > request.info_limit {
        warn!(
            country = %request.country,
            got = bullets.len(),
            limit = request.info_limit,
            "Digest over the bullet cap; truncating"
        );
        bullets.truncate(request.info_limit);
    }
    let digest = Digest { bullets };

    if reply.relevant_count < request.email_min_items {
        if !reply.emails.is_empty() {
            warn!(
                country = %request.country,
                relevant = reply.relevant_count,
                min = request.email_min_items,
                "Emails returned below the eligibility threshold; dropping them"
            );
        } else {
            debug!(
                country = %request.country,
                relevant = reply.relevant_count,
                min = request.email_min_items,
                "Below draft eligibility threshold"
            );
        }
        return (digest, Vec::new());
    }

    let mut drafts = Vec::new();
    for email in reply.emails {
        let subject = email.subject.trim();
        let body = email.body.trim();
        if subject.is_empty() || body.is_empty() {
            warn!(country = %request.country, "Rejecting email with empty subject or body");
            continue;
        }
        let words = word_count(body);
        if words < request.email_words_min || words > request.email_words_max {
            warn!(
                country = %request.country,
                words,
                min = request.email_words_min,
                max = request.email_words_max,
                "Rejecting email outside word bounds"
            );
            continue;
        }
        drafts.push(Draft {
            genre: email
                .genre
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }
    if drafts.len() > MAX_DRAFTS {
        warn!(
            country = %request.country,
            got = drafts.len(),
            "More emails than the draft cap; keeping the first four"
        );
        drafts.truncate(MAX_DRAFTS);
    }
    info!(
        country = %request.country,
        bullets = digest.bullets.len(),
        drafts = drafts.len(),
        relevant = reply.relevant_count,
        "Drafting reply validated"
    );
    (digest, drafts)
}
