//! The Synthesis Requester: one feed's items in, one usable synthesis out.
//!
//! This is the resilient part of the pipeline. Model identifiers come and go
//! per project and per region, quotas run out mid-run, and even a healthy
//! model sometimes wraps its JSON in prose. The requester degrades quality
//! before availability: candidates are tried in order, transient errors are
//! retried with backoff, malformed output gets one repair pass, and when
//! everything fails the caller still receives a deterministic synthesis built
//! from the item titles.
//!
//! # State machine
//!
//! The candidate loop is an explicit state machine:
//!
//! ```text
//! Trying{candidate, attempt}
//!   ├─ accepted ───────────────────────────────► Done
//!   ├─ malformed ──────────────────────────────► Repairing{candidate}
//!   ├─ classify == Skip ───────────────────────► Trying{candidate+1, 1}
//!   ├─ classify == Retry, attempt < budget ────► sleep, Trying{candidate, attempt+1}
//!   ├─ classify == Retry, budget spent ────────► Trying{candidate+1, 1}
//!   └─ classify == Abort ──────────────────────► error (propagates)
//! Repairing{candidate}
//!   ├─ repaired output parses ─────────────────► Done
//!   └─ anything else (except Abort) ───────────► Trying{candidate+1, 1}
//! candidates exhausted ───────────────────────► Fallback
//! ```
//!
//! Only errors whose [`classify`] is [`Disposition::Abort`] escape this
//! module; every operational failure ends in `Done` or `Fallback`.

use std::time::Duration;

use itertools::Itertools;
use rand::{Rng, rng};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::api::{Disposition, Generate, GenerateError, classify};
use crate::config::FeedSource;
use crate::extract::extract_json_object;
use crate::models::{NormalizedItem, Synthesis, SynthesisDraft};
use crate::normalize::normalize_text;
use crate::utils::{truncate_chars, truncate_for_log};

/// Known-good defaults, tried in order after any operator override.
pub const DEFAULT_MODEL_CANDIDATES: [&str; 3] =
    ["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"];

/// Items handed to the prompt per feed; bounds cost and latency.
pub const MAX_PROMPT_ITEMS: usize = 8;

/// Attempts per candidate when errors classify as transient.
const MAX_ATTEMPTS_PER_CANDIDATE: u32 = 3;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

// The prompt already states the limits; these clamps only catch a model
// that ignored them.
const TITLE_MAX_CHARS: usize = 140;
const SUMMARY_MAX_CHARS: usize = 260;
const FALLBACK_SUMMARY_MAX_CHARS: usize = 180;

enum Step {
    Trying { candidate: usize, attempt: u32 },
    Repairing { candidate: usize, raw: String },
    Fallback { last: GenerateError },
    Done { model: String, draft: SynthesisDraft },
}

/// The ordered candidate list: operator override first, then the defaults.
pub fn candidate_models(model_override: Option<&str>) -> Vec<String> {
    model_override
        .into_iter()
        .chain(DEFAULT_MODEL_CANDIDATES)
        .map(str::to_string)
        .unique()
        .collect()
}

/// Produce exactly one synthesis for `feed`.
///
/// Never fails for operational reasons; the only `Err` is a fatal
/// configuration-class [`GenerateError`] that must abort the whole run.
#[instrument(level = "info", skip_all, fields(feed = %feed.id))]
pub async fn synthesize<G: Generate>(
    generator: &G,
    feed: &FeedSource,
    label: &str,
    language: &str,
    model_override: Option<&str>,
    items: &[NormalizedItem],
) -> Result<Synthesis, GenerateError> {
    if items.is_empty() {
        info!("no items for feed; placeholder synthesis");
        return Ok(placeholder_synthesis(label));
    }

    let items = &items[..items.len().min(MAX_PROMPT_ITEMS)];
    let prompt = build_prompt(feed, label, language, items);
    let candidates = candidate_models(model_override);

    let mut step = Step::Trying {
        candidate: 0,
        attempt: 1,
    };
    loop {
        step = match step {
            Step::Trying { candidate, attempt } => {
                // next_or_fallback keeps the index in range
                let model = &candidates[candidate];
                match generator.generate(model, &prompt).await {
                    Ok(raw) => match parse_draft(&raw) {
                        Some(draft) => Step::Done {
                            model: model.clone(),
                            draft,
                        },
                        None => {
                            warn!(
                                %model,
                                preview = %truncate_for_log(&raw, 200),
                                "output not parseable; repair pass"
                            );
                            Step::Repairing { candidate, raw }
                        }
                    },
                    Err(err) => match classify(&err) {
                        Disposition::Skip => {
                            warn!(%model, error = %err, "candidate skipped");
                            next_or_fallback(candidate, &candidates, err)
                        }
                        Disposition::Retry if attempt < MAX_ATTEMPTS_PER_CANDIDATE => {
                            let delay = backoff_delay(attempt, retry_after(&err));
                            warn!(%model, attempt, ?delay, error = %err, "transient error; backing off");
                            sleep(delay).await;
                            Step::Trying {
                                candidate,
                                attempt: attempt + 1,
                            }
                        }
                        Disposition::Retry => {
                            warn!(%model, error = %err, "retry budget spent; next candidate");
                            next_or_fallback(candidate, &candidates, err)
                        }
                        Disposition::Abort => return Err(err),
                    },
                }
            }
            Step::Repairing { candidate, raw } => {
                let model = &candidates[candidate];
                match generator.generate(model, &build_repair_prompt(&raw)).await {
                    Ok(repaired) => match parse_draft(&repaired) {
                        Some(draft) => {
                            info!(%model, "repair pass recovered a valid object");
                            Step::Done {
                                model: model.clone(),
                                draft,
                            }
                        }
                        None => {
                            warn!(%model, "repair pass still malformed; next candidate");
                            next_or_fallback(
                                candidate,
                                &candidates,
                                GenerateError::Malformed {
                                    model: model.clone(),
                                },
                            )
                        }
                    },
                    Err(err) if classify(&err) == Disposition::Abort => return Err(err),
                    Err(err) => {
                        warn!(%model, error = %err, "repair request failed; next candidate");
                        next_or_fallback(candidate, &candidates, err)
                    }
                }
            }
            Step::Fallback { last } => {
                warn!(error = %last, "all candidates failed; deterministic fallback");
                let mut synthesis = fallback_synthesis(label, items);
                synthesis.error = Some(last.to_string());
                return Ok(synthesis);
            }
            Step::Done { model, draft } => {
                info!(%model, "synthesis accepted");
                return Ok(Synthesis {
                    title: truncate_chars(&normalize_text(&draft.title), TITLE_MAX_CHARS),
                    summary: truncate_chars(&normalize_text(&draft.summary), SUMMARY_MAX_CHARS),
                    sections: draft.sections,
                    model: Some(model),
                    error: None,
                });
            }
        };
    }
}

/// Advance to the next candidate, or to fallback when the list is spent.
fn next_or_fallback(candidate: usize, candidates: &[String], last: GenerateError) -> Step {
    if candidate + 1 < candidates.len() {
        Step::Trying {
            candidate: candidate + 1,
            attempt: 1,
        }
    } else {
        Step::Fallback { last }
    }
}

fn retry_after(err: &GenerateError) -> Option<Duration> {
    match err {
        GenerateError::Transient { retry_after, .. } => *retry_after,
        _ => None,
    }
}

/// Backoff before retrying the same candidate: the server-supplied delay if
/// one came back, otherwise 1 s doubling per attempt, capped at 30 s, plus
/// 0–250 ms of jitter.
fn backoff_delay(attempt: u32, server_delay: Option<Duration>) -> Duration {
    if let Some(delay) = server_delay {
        return delay.min(MAX_DELAY);
    }
    let mut delay = BASE_DELAY.saturating_mul(1 << (attempt - 1));
    if delay > MAX_DELAY {
        delay = MAX_DELAY;
    }
    let jitter_ms: u64 = rng().random_range(0..=250);
    delay + Duration::from_millis(jitter_ms)
}

/// Extract and validate the model's JSON object. `None` means "send to the
/// repair pass" — unparseable, wrong shape, or empty required fields.
fn parse_draft(raw: &str) -> Option<SynthesisDraft> {
    let json = extract_json_object(raw)?;
    let draft: SynthesisDraft = serde_json::from_str(json).ok()?;
    if draft.title.trim().is_empty() || draft.summary.trim().is_empty() {
        return None;
    }
    Some(draft)
}

/// The instruction sent to every candidate model.
pub fn build_prompt(
    feed: &FeedSource,
    label: &str,
    language: &str,
    items: &[NormalizedItem],
) -> String {
    let origin = match feed.country.as_deref() {
        Some(country) => format!("{} ({})", feed.name, country),
        None => feed.name.clone(),
    };

    let mut sources = String::new();
    for (idx, item) in items.iter().enumerate() {
        sources.push_str(&format!(
            "#{} [{}] {}\nLien : {}\nExtrait : {}\n\n",
            idx + 1,
            origin,
            item.title,
            item.link,
            item.snippet
        ));
    }

    format!(
        r#"Tu es un rédacteur "Flash Info". Langue de sortie : {language}.
Tu reçois plusieurs articles (titres + extraits) de la source {origin}, rubrique : {label}.

Objectif :
- Produire UNE synthèse claire et utile, en {language}.
- Ne pas inventer de faits absents des sources.
- Rester neutre ; si des sources se contredisent, le dire ("selon X... selon Y...").

Sortie OBLIGATOIRE : un seul objet JSON strict (pas de markdown, pas de texte autour), avec exactement ces clés :

{{
  "title": "Titre court et factuel, 90 caractères maximum",
  "summary": "2 à 3 phrases maximum",
  "sections": {{
    "known": "ce que les sources établissent",
    "assumed": "ce qui est rapporté ou supposé",
    "unknown": "ce qui reste incertain"
  }}
}}

"title" et "summary" sont obligatoires ; "sections" est facultatif.

Sources :
{sources}"#
    )
}

/// Second-chance instruction: reformat a previous raw output as strict JSON.
pub fn build_repair_prompt(raw: &str) -> String {
    format!(
        r#"Reformate STRICTEMENT la sortie suivante en un seul objet JSON valide avec les clés "title", "summary" et éventuellement "sections" ("known", "assumed", "unknown"). Réponds uniquement avec le JSON, sans commentaire ni markdown.

Sortie à réparer :
{raw}"#
    )
}

/// Deterministic synthesis for a feed that contributed no items. The
/// generation endpoint is never consulted for this.
pub fn placeholder_synthesis(label: &str) -> Synthesis {
    Synthesis {
        title: format!("{label} : pas de données"),
        summary: "Aucune donnée récente pour cette rubrique. Nouvelle tentative au prochain passage."
            .to_string(),
        sections: None,
        model: None,
        error: Some("no recent items from feed".to_string()),
    }
}

/// Deterministic synthesis built only from item titles, used when every
/// candidate model failed. Must never fail itself.
pub fn fallback_synthesis(label: &str, items: &[NormalizedItem]) -> Synthesis {
    let title = match items.first() {
        Some(first) => format!("{label} : {}", first.title),
        None => format!("{label} : point de situation"),
    };
    let summary: String = items.iter().take(2).map(|i| i.title.as_str()).join(" • ");
    let summary = if summary.is_empty() {
        "Synthèse temporairement indisponible.".to_string()
    } else {
        truncate_chars(&summary, FALLBACK_SUMMARY_MAX_CHARS)
    };

    Synthesis {
        title: truncate_chars(&title, TITLE_MAX_CHARS),
        summary,
        sections: None,
        model: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const VALID: &str = r#"{"title":"Un titre","summary":"Deux phrases. Voilà."}"#;

    struct FakeGenerator {
        responses: Mutex<VecDeque<Result<String, GenerateError>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<(String, String)>>,
        call_times: Mutex<Vec<Instant>>,
    }

    impl FakeGenerator {
        fn scripted(responses: Vec<Result<String, GenerateError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                call_times: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Generate for FakeGenerator {
        async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().unwrap().push(Instant::now());
            self.prompts
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(GenerateError::Empty {
                        model: model.to_string(),
                    })
                })
        }
    }

    fn feed() -> FeedSource {
        FeedSource {
            id: "bbc-world".to_string(),
            name: "BBC".to_string(),
            category: "monde".to_string(),
            country: Some("GB".to_string()),
            url: "https://feeds.bbci.co.uk/news/world/rss.xml".to_string(),
        }
    }

    fn items(n: usize) -> Vec<NormalizedItem> {
        (0..n)
            .map(|i| NormalizedItem {
                title: format!("Titre {i}"),
                link: format!("https://example.org/{i}"),
                published_at: None,
                snippet: format!("Extrait {i}"),
                image_url: None,
            })
            .collect()
    }

    fn unsupported(model: &str) -> GenerateError {
        GenerateError::Unsupported {
            model: model.to_string(),
            status: 404,
        }
    }

    fn transient(retry_after: Option<Duration>) -> GenerateError {
        GenerateError::Transient {
            model: "m".to_string(),
            status: 429,
            retry_after,
        }
    }

    async fn run(
        generator: &FakeGenerator,
        model_override: Option<&str>,
        items: &[NormalizedItem],
    ) -> Result<Synthesis, GenerateError> {
        synthesize(generator, &feed(), "Monde", "fr", model_override, items).await
    }

    #[tokio::test]
    async fn test_empty_items_never_invoke_the_generator() {
        let generator = FakeGenerator::scripted(vec![]);
        let synthesis = run(&generator, None, &[]).await.unwrap();
        assert_eq!(generator.calls(), 0);
        assert!(!synthesis.title.is_empty());
        assert!(!synthesis.summary.is_empty());
        assert!(synthesis.model.is_none());
        assert!(synthesis.error.is_some());
    }

    #[tokio::test]
    async fn test_valid_json_accepts_first_candidate() {
        let generator = FakeGenerator::scripted(vec![Ok(VALID.to_string())]);
        let synthesis = run(&generator, None, &items(3)).await.unwrap();
        assert_eq!(generator.calls(), 1);
        assert_eq!(synthesis.model.as_deref(), Some(DEFAULT_MODEL_CANDIDATES[0]));
        assert_eq!(synthesis.title, "Un titre");
        assert!(synthesis.error.is_none());
    }

    #[tokio::test]
    async fn test_override_model_is_tried_first() {
        let generator = FakeGenerator::scripted(vec![Ok(VALID.to_string())]);
        let synthesis = run(&generator, Some("gemini-exp"), &items(2)).await.unwrap();
        assert_eq!(synthesis.model.as_deref(), Some("gemini-exp"));
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0].0, "gemini-exp");
    }

    #[tokio::test]
    async fn test_malformed_output_gets_exactly_one_repair() {
        let generator = FakeGenerator::scripted(vec![
            Ok("Voici la synthèse : titre sans JSON".to_string()),
            Ok(format!("```json\n{VALID}\n```")),
        ]);
        let synthesis = run(&generator, None, &items(3)).await.unwrap();
        assert_eq!(generator.calls(), 2);
        assert_eq!(synthesis.model.as_deref(), Some(DEFAULT_MODEL_CANDIDATES[0]));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[1].1.contains("Sortie à réparer"));
        assert!(prompts[1].1.contains("titre sans JSON"));
    }

    #[tokio::test]
    async fn test_failed_repair_moves_to_next_candidate() {
        let generator = FakeGenerator::scripted(vec![
            Ok("pas de JSON".to_string()),
            Ok("toujours pas de JSON".to_string()),
            Ok(VALID.to_string()),
        ]);
        let synthesis = run(&generator, None, &items(3)).await.unwrap();
        assert_eq!(generator.calls(), 3);
        assert_eq!(synthesis.model.as_deref(), Some(DEFAULT_MODEL_CANDIDATES[1]));

        // exactly one repair request was issued
        let prompts = generator.prompts.lock().unwrap();
        let repairs = prompts
            .iter()
            .filter(|(_, p)| p.contains("Sortie à réparer"))
            .count();
        assert_eq!(repairs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_candidate_skips_without_delay() {
        let generator = FakeGenerator::scripted(vec![
            Err(unsupported(DEFAULT_MODEL_CANDIDATES[0])),
            Ok(VALID.to_string()),
        ]);
        let before = Instant::now();
        let synthesis = run(&generator, None, &items(3)).await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(synthesis.model.as_deref(), Some(DEFAULT_MODEL_CANDIDATES[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_respect_retry_budget_and_backoff() {
        // Every call fails 429: 3 attempts per candidate, 3 candidates.
        let responses = (0..9).map(|_| Err(transient(None))).collect();
        let generator = FakeGenerator::scripted(responses);
        let before = Instant::now();
        let synthesis = run(&generator, None, &items(3)).await.unwrap();

        assert_eq!(generator.calls(), 9);
        // Two backoffs per candidate (1 s then 2 s), jitter ≤ 250 ms each.
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(9), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(11), "elapsed {elapsed:?}");

        // Delays between attempts of one candidate never shrink.
        let times = generator.call_times.lock().unwrap();
        for candidate in 0..3 {
            let base = candidate * 3;
            let first_gap = times[base + 1] - times[base];
            let second_gap = times[base + 2] - times[base + 1];
            assert!(second_gap >= first_gap);
        }

        assert!(synthesis.model.is_none());
        assert!(synthesis.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_supplied_retry_delay_is_honored() {
        let generator = FakeGenerator::scripted(vec![
            Err(transient(Some(Duration::from_secs(5)))),
            Ok(VALID.to_string()),
        ]);
        let before = Instant::now();
        run(&generator, None, &items(2)).await.unwrap();
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_exhaustion_falls_back_deterministically() {
        let responses = DEFAULT_MODEL_CANDIDATES
            .iter()
            .map(|m| Err(unsupported(m)))
            .collect();
        let generator = FakeGenerator::scripted(responses);
        let before = Instant::now();
        let synthesis = run(&generator, None, &items(3)).await.unwrap();

        assert_eq!(generator.calls(), 3);
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(synthesis.title, "Monde : Titre 0");
        assert_eq!(synthesis.summary, "Titre 0 • Titre 1");
        assert!(synthesis.model.is_none());
        assert!(synthesis.error.is_some());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_the_loop() {
        let generator = FakeGenerator::scripted(vec![Err(GenerateError::Fatal {
            status: 401,
            message: "API key not valid".to_string(),
        })]);
        let err = run(&generator, None, &items(2)).await.unwrap_err();
        assert_eq!(generator.calls(), 1);
        assert!(matches!(err, GenerateError::Fatal { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_prompt_is_capped_to_max_items() {
        let generator = FakeGenerator::scripted(vec![Ok(VALID.to_string())]);
        run(&generator, None, &items(20)).await.unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("#8 "));
        assert!(!prompts[0].1.contains("#9 "));
    }

    #[test]
    fn test_candidate_models_override_first_and_deduped() {
        let models = candidate_models(Some("gemini-1.5-flash"));
        assert_eq!(
            models,
            vec!["gemini-1.5-flash", "gemini-2.0-flash", "gemini-1.5-pro"]
        );
        assert_eq!(candidate_models(None), DEFAULT_MODEL_CANDIDATES.to_vec());
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let mut previous = Duration::ZERO;
        for attempt in 1..=6 {
            let delay = backoff_delay(attempt, None);
            assert!(delay >= previous);
            assert!(delay <= MAX_DELAY + Duration::from_millis(250));
            previous = delay - Duration::from_millis(250);
        }
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(120))),
            MAX_DELAY
        );
    }

    #[test]
    fn test_parse_draft_rejects_empty_required_fields() {
        assert!(parse_draft(r#"{"title":"","summary":"S"}"#).is_none());
        assert!(parse_draft(r#"{"title":"T","summary":"  "}"#).is_none());
        assert!(parse_draft(r#"{"titre":"T"}"#).is_none());
        assert!(parse_draft(VALID).is_some());
    }

    #[test]
    fn test_prompt_mentions_language_and_format() {
        let prompt = build_prompt(&feed(), "Monde", "fr", &items(2));
        assert!(prompt.contains("Langue de sortie : fr"));
        assert!(prompt.contains("\"summary\""));
        assert!(prompt.contains("BBC (GB)"));
        assert!(prompt.contains("https://example.org/1"));
    }

    #[test]
    fn test_fallback_synthesis_without_items() {
        let synthesis = fallback_synthesis("Tech", &[]);
        assert_eq!(synthesis.title, "Tech : point de situation");
        assert_eq!(synthesis.summary, "Synthèse temporairement indisponible.");
    }
}
