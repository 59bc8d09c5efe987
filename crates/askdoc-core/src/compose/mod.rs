//! Response composer: turns one query into one answer.
//!
//! # Decision order
//!
//! 1. Empty query → neutral prompt.
//! 2. Conversational intent table ([`intents::INTENTS`]) → canned reply.
//! 3. Empty knowledge base → "no documents loaded" reply.
//! 4. Classify: a query containing a multi-chunk keyword (policy,
//!    guidelines, …) retrieves up to `multi_top_k` chunks that each clear
//!    `multi_threshold`; anything else takes the best chunk if it clears
//!    `single_threshold`.
//! 5. Compose accepted text: topic sections, policy overview, or extractive
//!    sentence selection (extractive mode); or a provider completion over
//!    the accepted context, one per sub-question (generative mode).
//! 6. Nothing accepted → hint table, then the information-seeking or
//!    generic fallback reply.
//!
//! Embedding failures propagate; they never degrade into a fallback reply.

pub mod extract;
pub mod generative;
pub mod intents;
pub mod topics;

use serde::{Deserialize, Serialize};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::generation::GenerationProvider;
use crate::search::{Retriever, ScoredChunk};

/// How accepted context becomes an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Topic templates and sentence selection over the retrieved text.
    #[default]
    Extractive,
    /// Completion from a generation provider over the retrieved text.
    Generative,
}

/// Retrieval thresholds and query classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub single_threshold: f32,
    pub multi_threshold: f32,
    pub multi_top_k: usize,
    pub max_per_source: Option<usize>,
    /// Lowercase substrings that make a query multi-chunk.
    pub multi_chunk_keywords: Vec<String>,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            single_threshold: 0.35,
            multi_threshold: 0.25,
            multi_top_k: 3,
            max_per_source: Some(3),
            multi_chunk_keywords: [
                "policy",
                "policies",
                "rules",
                "guidelines",
                "code of conduct",
                "workplace culture",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl RetrievalPolicy {
    pub fn is_multi_chunk(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        self.multi_chunk_keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

/// Everything the composer needs besides the providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub retrieval: RetrievalPolicy,
    pub mode: AnswerMode,
    /// Name substituted into canned replies.
    pub organization: String,
    /// Sentences kept by extractive selection and generated answers.
    pub max_sentences: usize,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalPolicy::default(),
            mode: AnswerMode::Extractive,
            organization: "the company".to_string(),
            max_sentences: 3,
        }
    }
}

/// Which branch of the decision order produced an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    EmptyQuery,
    Intent(&'static str),
    EmptyKnowledgeBase,
    /// Single best chunk, with its score.
    Focused { score: f32 },
    /// Several chunks combined.
    Combined { chunks: usize },
    /// Generated from retrieved context, one provider call per question.
    Generated { questions: usize },
    Fallback,
}

/// A composed reply and how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub response: String,
    pub route: Route,
}

impl Answer {
    fn new(response: impl Into<String>, route: Route) -> Self {
        Self {
            response: response.into(),
            route,
        }
    }
}

/// Text that cleared the acceptance thresholds for one question.
struct Accepted {
    text: String,
    route: Route,
    multi: bool,
}

/// Answers queries against a knowledge base.
///
/// Borrowed per request: the application builds one from its shared
/// settings and providers and the current knowledge-base snapshot.
pub struct Composer<'a> {
    settings: &'a ComposerSettings,
    embedder: &'a dyn EmbeddingProvider,
    generator: Option<&'a dyn GenerationProvider>,
}

impl<'a> Composer<'a> {
    pub fn new(settings: &'a ComposerSettings, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self {
            settings,
            embedder,
            generator: None,
        }
    }

    /// Use `generator` when the answer mode is generative.
    pub fn with_generator(mut self, generator: Option<&'a dyn GenerationProvider>) -> Self {
        self.generator = generator;
        self
    }

    fn org(&self) -> &str {
        &self.settings.organization
    }

    /// Run the full decision order for `query`.
    pub async fn answer<R>(&self, kb: &R, query: &str) -> Result<Answer>
    where
        R: Retriever + ?Sized,
    {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Answer::new(intents::EMPTY_QUERY_REPLY, Route::EmptyQuery));
        }

        if let Some(rule) = intents::first_match(&intents::INTENTS, query) {
            tracing::debug!(intent = rule.name, "conversational intent");
            return Ok(Answer::new(rule.render(self.org()), Route::Intent(rule.name)));
        }

        if kb.is_empty() {
            return Ok(Answer::new(
                intents::EMPTY_KB_REPLY.replace("{org}", self.org()),
                Route::EmptyKnowledgeBase,
            ));
        }

        match (self.settings.mode, self.generator) {
            (AnswerMode::Generative, Some(generator)) => {
                self.answer_generative(kb, query, generator).await
            }
            _ => self.answer_extractive(kb, query).await,
        }
    }

    async fn answer_extractive<R>(&self, kb: &R, query: &str) -> Result<Answer>
    where
        R: Retriever + ?Sized,
    {
        let accepted = match self.retrieve(kb, query).await? {
            Some(accepted) => accepted,
            None => return Ok(self.fallback(query)),
        };

        let text = extract::strip_page_markers(&accepted.text);
        let response = topics::format_topics(query, &text, self.org(), accepted.multi)
            .unwrap_or_else(|| extract::select_sentences(query, &text, self.settings.max_sentences));
        Ok(Answer::new(response, accepted.route))
    }

    async fn answer_generative<R>(
        &self,
        kb: &R,
        query: &str,
        generator: &dyn GenerationProvider,
    ) -> Result<Answer>
    where
        R: Retriever + ?Sized,
    {
        let questions = generative::split_questions(query);
        if questions.is_empty() {
            return Ok(self.fallback(query));
        }
        let mut answers = Vec::with_capacity(questions.len());

        for question in &questions {
            let accepted = match self.retrieve(kb, question).await? {
                Some(accepted) => accepted,
                None => {
                    answers.push(intents::fallback_reply(question, self.org()));
                    continue;
                }
            };

            let context = extract::strip_page_markers(&accepted.text);
            let prompt = generative::build_prompt(
                self.org(),
                &context,
                question,
                self.settings.max_sentences,
            );
            let raw = generator.generate(&prompt).await?;
            let answer = generative::postprocess(&raw, self.settings.max_sentences);
            if answer.is_empty() {
                return Err(Error::provider(generator.name(), "empty completion"));
            }
            answers.push(answer);
        }

        Ok(Answer::new(
            answers.join(" "),
            Route::Generated {
                questions: questions.len(),
            },
        ))
    }

    /// Embed `query`, retrieve per its shape, and apply the thresholds.
    async fn retrieve<R>(&self, kb: &R, query: &str) -> Result<Option<Accepted>>
    where
        R: Retriever + ?Sized,
    {
        let policy = &self.settings.retrieval;
        let vector = embed_query(self.embedder, query).await?;

        if policy.is_multi_chunk(query) {
            let hits: Vec<ScoredChunk<'_>> = kb
                .search(&vector, policy.multi_top_k, policy.max_per_source)
                .into_iter()
                .filter(|h| h.score >= policy.multi_threshold)
                .collect();
            tracing::debug!(accepted = hits.len(), "multi-chunk retrieval");
            if hits.is_empty() {
                return Ok(None);
            }
            let text = hits
                .iter()
                .map(|h| h.chunk.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            return Ok(Some(Accepted {
                text,
                route: Route::Combined { chunks: hits.len() },
                multi: true,
            }));
        }

        match kb.best_match(&vector) {
            Some(best) if best.score >= policy.single_threshold => {
                tracing::debug!(score = best.score, chunk = best.chunk.id, "single-chunk retrieval");
                Ok(Some(Accepted {
                    text: best.chunk.text.clone(),
                    route: Route::Focused { score: best.score },
                    multi: false,
                }))
            }
            best => {
                tracing::debug!(score = best.map(|b| b.score), "no chunk cleared threshold");
                Ok(None)
            }
        }
    }

    fn fallback(&self, query: &str) -> Answer {
        Answer::new(intents::fallback_reply(query, self.org()), Route::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::store::KnowledgeBase;
    use crate::testing::{KeywordEmbedder, ScriptedGenerator};

    fn chunk(id: u64, source: &str, text: &str) -> Chunk {
        Chunk {
            id,
            source: source.to_string(),
            text: text.to_string(),
            page_info: None,
        }
    }

    async fn kb(chunks: Vec<Chunk>) -> KnowledgeBase {
        KnowledgeBase::build(chunks, &KeywordEmbedder::new()).await.unwrap()
    }

    fn settings() -> ComposerSettings {
        ComposerSettings {
            organization: "Acme".to_string(),
            ..ComposerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_empty_query() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let a = Composer::new(&s, &embedder)
            .answer(&KnowledgeBase::empty(), "   ")
            .await
            .unwrap();
        assert_eq!(a.response, "Please ask a question.");
        assert_eq!(a.route, Route::EmptyQuery);
    }

    #[tokio::test]
    async fn test_greeting_ignores_knowledge_base() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let composer = Composer::new(&s, &embedder);
        let full = kb(vec![chunk(0, "a.pdf", "Working hours are 9 to 5.")]).await;

        for base in [&KnowledgeBase::empty(), &full] {
            let a = composer.answer(base, "hi").await.unwrap();
            assert_eq!(a.route, Route::Intent("greeting"));
            assert!(a.response.starts_with("Hello!"));
        }
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_reply() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let a = Composer::new(&s, &embedder)
            .answer(&KnowledgeBase::empty(), "what is the leave policy")
            .await
            .unwrap();
        assert_eq!(a.route, Route::EmptyKnowledgeBase);
        assert!(a.response.contains("don't have any specific documents loaded"));
    }

    #[tokio::test]
    async fn test_working_hours_answer() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![
            chunk(0, "handbook.pdf", "Working hours are 9:30 AM to 6:30 PM, Monday to Friday."),
            chunk(1, "handbook.pdf", "Our expense reimbursement is processed monthly."),
        ])
        .await;

        let a = Composer::new(&s, &embedder)
            .answer(&base, "what are the working hours")
            .await
            .unwrap();
        assert!(matches!(a.route, Route::Focused { .. }));
        assert!(a.response.contains("9:30"));
        assert!(a.response.contains("6:30"));
    }

    #[tokio::test]
    async fn test_policy_query_combines_chunks() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![
            chunk(0, "a.pdf", "The leave policy grants 18 days of annual leave."),
            chunk(1, "b.pdf", "The remote work policy allows 3 days per week."),
            chunk(2, "c.pdf", "Salary is paid on the last working day."),
        ])
        .await;

        let a = Composer::new(&s, &embedder)
            .answer(&base, "tell me about the leave and remote policies")
            .await
            .unwrap();
        assert!(matches!(a.route, Route::Combined { chunks } if chunks >= 2));
        assert!(a.response.starts_with("📋 ACME INFORMATION"));
        assert!(a.response.contains("18 days"));
        assert!(a.response.contains("3 days per week"));
    }

    #[tokio::test]
    async fn test_below_threshold_falls_back() {
        let s = settings();
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![chunk(0, "a.pdf", "The dress code is business casual.")]).await;
        let composer = Composer::new(&s, &embedder);

        let a = composer.answer(&base, "what is the salary date").await.unwrap();
        assert_eq!(a.route, Route::Fallback);
        assert!(a.response.starts_with("I don't have specific information"));

        let a = composer.answer(&base, "quantum gravity").await.unwrap();
        assert!(a.response.starts_with("That's an interesting question"));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let s = settings();
        let base = kb(vec![chunk(0, "a.pdf", "Working hours are 9 to 5.")]).await;
        let failing = KeywordEmbedder::failing();
        let err = Composer::new(&s, &failing)
            .answer(&base, "what are the working hours")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_generative_answers_each_question() {
        let s = ComposerSettings {
            mode: AnswerMode::Generative,
            ..settings()
        };
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![
            chunk(0, "a.pdf", "Working hours are 9:30 AM to 6:30 PM."),
            chunk(1, "a.pdf", "Remote work is allowed 3 days per week."),
        ])
        .await;
        let generator = ScriptedGenerator::new(
            "scripted",
            vec![
                Ok("We work 9:30 to 6:30.\n\n\nEvery weekday. Lunch included. Extra.".to_string()),
                Ok("Three remote days.".to_string()),
            ],
        );

        let a = Composer::new(&s, &embedder)
            .with_generator(Some(&generator))
            .answer(&base, "what are the working hours and how does remote work apply")
            .await
            .unwrap();

        assert_eq!(a.route, Route::Generated { questions: 2 });
        assert_eq!(
            a.response,
            "We work 9:30 to 6:30.\n\nEvery weekday. Lunch included. Three remote days."
        );
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Working hours are 9:30 AM to 6:30 PM."));
        assert!(prompts[1].contains("Remote work is allowed"));
    }

    #[tokio::test]
    async fn test_generative_failure_is_visible() {
        let s = ComposerSettings {
            mode: AnswerMode::Generative,
            ..settings()
        };
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![chunk(0, "a.pdf", "Working hours are 9 to 5.")]).await;
        let generator = ScriptedGenerator::failing("primary");

        let err = Composer::new(&s, &embedder)
            .with_generator(Some(&generator))
            .answer(&base, "what are the working hours")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_generative_separator_only_query_falls_back() {
        let s = ComposerSettings {
            mode: AnswerMode::Generative,
            ..settings()
        };
        let embedder = KeywordEmbedder::new();
        let base = kb(vec![chunk(0, "a.pdf", "Working hours are 9 to 5.")]).await;
        let generator = ScriptedGenerator::answering("unused");
        let composer = Composer::new(&s, &embedder).with_generator(Some(&generator));

        for query in ["?", "??", ";"] {
            let a = composer.answer(&base, query).await.unwrap();
            assert_eq!(a.route, Route::Fallback, "{}", query);
            assert!(!a.response.trim().is_empty(), "{}", query);
        }
        assert!(generator.prompts().is_empty());
    }
}
