//! Bounded prompt assembly.
//!
//! The system preamble and the question are always included. Conversation
//! turns are admitted newest first, then retrieved chunks in rank order, each
//! stopping at the first item that would overflow the budget. Under pressure
//! this drops the lowest-ranked chunks first and the oldest turns second.
//!
//! Every rendered segment is costed with [`token_cost`], so the estimated
//! token count of the full rendering never exceeds the budget.

use std::fmt::Write;

use repolens_index::RetrievedChunk;
use repolens_llm::Message;
use repolens_memory::{Turn, token_cost};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are repolens, an assistant that answers questions about a code repository.\n\
Relevant source snippets appear inside <code_context>, earlier messages of this \
conversation inside <conversation>, and the current question inside <question>.\n\
\n\
## Guidelines\n\
- Ground every claim in the provided snippets and cite file paths.\n\
- If the snippets do not contain the answer, say so instead of guessing.\n\
- Be concise.";

const CODE_OPEN: &str = "<code_context>\n";
const CODE_CLOSE: &str = "</code_context>\n\n";
const CONVERSATION_OPEN: &str = "<conversation>\n";
const CONVERSATION_CLOSE: &str = "</conversation>\n\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error(
        "context budget of {budget} tokens cannot fit the system prompt and question ({required} tokens)"
    )]
    BudgetTooSmall { required: usize, budget: usize },
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    preamble: String,
    budget: usize,
}

impl ContextAssembler {
    #[must_use]
    pub fn new(preamble: impl Into<String>, budget: usize) -> Self {
        Self {
            preamble: preamble.into(),
            budget,
        }
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Build the context for `query` from ranked chunks and a chronological
    /// memory window.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::BudgetTooSmall`] if the preamble and query alone
    /// exceed the budget.
    pub fn assemble(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk],
        memory: &[Turn],
    ) -> Result<AssembledContext, ContextError> {
        let preamble_segment = format!("{}\n\n", self.preamble);
        let query_segment = format!("<question>\n{query}\n</question>");
        let required = token_cost(&preamble_segment) + token_cost(&query_segment);
        if required > self.budget {
            return Err(ContextError::BudgetTooSmall {
                required,
                budget: self.budget,
            });
        }
        let mut used = required;

        let wrapper = token_cost(CONVERSATION_OPEN) + token_cost(CONVERSATION_CLOSE);
        let mut turns: Vec<(&Turn, String)> = Vec::new();
        for turn in memory.iter().rev() {
            let segment = format!("{}: {}\n", turn.role(), turn.text());
            let cost = token_cost(&segment) + if turns.is_empty() { wrapper } else { 0 };
            if used + cost > self.budget {
                break;
            }
            used += cost;
            turns.push((turn, segment));
        }
        turns.reverse();

        let wrapper = token_cost(CODE_OPEN) + token_cost(CODE_CLOSE);
        let mut chunks: Vec<(&RetrievedChunk, String)> = Vec::new();
        for hit in retrieved {
            let segment = chunk_segment(hit);
            let cost = token_cost(&segment) + if chunks.is_empty() { wrapper } else { 0 };
            if used + cost > self.budget {
                break;
            }
            used += cost;
            chunks.push((hit, segment));
        }

        let mut body = String::new();
        if !chunks.is_empty() {
            body.push_str(CODE_OPEN);
            for (_, segment) in &chunks {
                body.push_str(segment);
            }
            body.push_str(CODE_CLOSE);
        }
        if !turns.is_empty() {
            body.push_str(CONVERSATION_OPEN);
            for (_, segment) in &turns {
                body.push_str(segment);
            }
            body.push_str(CONVERSATION_CLOSE);
        }
        body.push_str(&query_segment);

        if chunks.len() < retrieved.len() || turns.len() < memory.len() {
            tracing::debug!(
                chunks_dropped = retrieved.len() - chunks.len(),
                turns_dropped = memory.len() - turns.len(),
                used,
                budget = self.budget,
                "context truncated to fit budget"
            );
        }

        Ok(AssembledContext {
            system_preamble: self.preamble.clone(),
            retrieved_chunks: chunks.into_iter().map(|(hit, _)| hit.clone()).collect(),
            memory_window: turns.into_iter().map(|(turn, _)| turn.clone()).collect(),
            current_query: query.to_owned(),
            preamble_segment,
            body,
            tokens: used,
        })
    }
}

fn chunk_segment(hit: &RetrievedChunk) -> String {
    let meta = hit.chunk.metadata();
    let lines = match (meta.start_line, meta.end_line) {
        (Some(start), Some(end)) => format!("{start}-{end}"),
        _ => "?".to_owned(),
    };
    let mut out = String::with_capacity(hit.chunk.text().len() + 96);
    let _ = writeln!(
        out,
        "  <chunk file=\"{}\" lines=\"{lines}\" kind=\"{}\" score=\"{:.2}\">",
        meta.path, meta.kind, hit.score
    );
    out.push_str(hit.chunk.text());
    out.push_str("\n  </chunk>\n");
    out
}

/// Output of [`ContextAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct AssembledContext {
    system_preamble: String,
    retrieved_chunks: Vec<RetrievedChunk>,
    memory_window: Vec<Turn>,
    current_query: String,
    preamble_segment: String,
    body: String,
    tokens: usize,
}

impl AssembledContext {
    #[must_use]
    pub fn system_preamble(&self) -> &str {
        &self.system_preamble
    }

    /// Chunks that fit, in rank order.
    #[must_use]
    pub fn retrieved_chunks(&self) -> &[RetrievedChunk] {
        &self.retrieved_chunks
    }

    /// Turns that fit, oldest first.
    #[must_use]
    pub fn memory_window(&self) -> &[Turn] {
        &self.memory_window
    }

    #[must_use]
    pub fn current_query(&self) -> &str {
        &self.current_query
    }

    /// Budget consumed, counted per segment.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens
    }

    /// The whole prompt as one string.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}{}", self.preamble_segment, self.body)
    }

    /// `[system, user]` messages for the answering model.
    #[must_use]
    pub fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.system_preamble.clone()),
            Message::user(self.body.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use repolens_index::{Chunk, ChunkKind, ChunkMetadata};
    use repolens_memory::{TurnRole, estimate_tokens};

    use super::*;

    fn hit(id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk::new(
                id,
                text,
                ChunkMetadata {
                    path: format!("src/{id}.rs"),
                    language: "rust".into(),
                    kind: ChunkKind::Code,
                    start_line: Some(1),
                    end_line: Some(10),
                },
            ),
            score,
            rank_score: score + 0.05,
        }
    }

    fn turn(role: TurnRole, text: &str) -> Turn {
        Turn::new(role, text, DateTime::<Utc>::UNIX_EPOCH)
    }

    fn conversation() -> Vec<Turn> {
        vec![
            turn(TurnRole::User, "first question"),
            turn(TurnRole::Assistant, "first answer"),
            turn(TurnRole::User, "second question"),
            turn(TurnRole::Assistant, "second answer"),
        ]
    }

    #[test]
    fn renders_sections_in_order() {
        let asm = ContextAssembler::new("PREAMBLE", 10_000);
        let ctx = asm
            .assemble("what is x?", &[hit("a", "fn a() {}", 0.9)], &conversation())
            .unwrap();
        let text = ctx.render();

        let p = text.find("PREAMBLE").unwrap();
        let c = text.find("<code_context>").unwrap();
        let m = text.find("<conversation>").unwrap();
        let q = text.find("<question>\nwhat is x?\n</question>").unwrap();
        assert!(p < c && c < m && m < q);
        assert!(text.contains("file=\"src/a.rs\" lines=\"1-10\" kind=\"code\" score=\"0.90\""));
        assert!(text.find("first question").unwrap() < text.find("second answer").unwrap());
        assert!(text.ends_with("</question>"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let asm = ContextAssembler::new("P", 1000);
        let ctx = asm.assemble("q", &[], &[]).unwrap();
        assert!(!ctx.render().contains("<code_context>"));
        assert!(!ctx.render().contains("<conversation>"));
        assert!(ctx.retrieved_chunks().is_empty());
    }

    #[test]
    fn identical_inputs_render_identically() {
        let asm = ContextAssembler::new(DEFAULT_SYSTEM_PROMPT, 400);
        let chunks = [hit("a", "fn a() {}", 0.9), hit("b", &"x".repeat(300), 0.5)];
        let memory = conversation();
        let first = asm.assemble("q", &chunks, &memory).unwrap();
        let second = asm.assemble("q", &chunks, &memory).unwrap();
        assert_eq!(first.render(), second.render());
        assert_eq!(first.token_count(), second.token_count());
    }

    #[test]
    fn budget_too_small() {
        let asm = ContextAssembler::new("x".repeat(100), 10);
        let err = asm.assemble("question", &[], &[]).unwrap_err();
        assert!(matches!(err, ContextError::BudgetTooSmall { budget: 10, .. }));
    }

    #[test]
    fn exact_minimum_budget_fits() {
        let probe = ContextAssembler::new("P", 1000).assemble("q", &[], &[]).unwrap();
        let min = probe.token_count();
        let asm = ContextAssembler::new("P", min);
        let ctx = asm
            .assemble("q", &[hit("a", "fn a() {}", 0.9)], &conversation())
            .unwrap();
        assert_eq!(ctx.token_count(), min);
        assert!(ctx.retrieved_chunks().is_empty());
        assert!(ctx.memory_window().is_empty());
    }

    #[test]
    fn chunks_dropped_before_memory() {
        let memory = conversation();
        let generous = ContextAssembler::new("P", 10_000)
            .assemble("q", &[], &memory)
            .unwrap()
            .token_count();
        // room for the whole conversation but not for the large chunk
        let asm = ContextAssembler::new("P", generous + 20);
        let ctx = asm
            .assemble("q", &[hit("big", &"y".repeat(400), 0.9)], &memory)
            .unwrap();
        assert_eq!(ctx.memory_window().len(), memory.len());
        assert!(ctx.retrieved_chunks().is_empty());
    }

    #[test]
    fn lowest_ranked_chunks_dropped_first() {
        let chunks = [
            hit("best", &"a".repeat(80), 0.9),
            hit("mid", &"b".repeat(80), 0.8),
            hit("worst", &"c".repeat(80), 0.7),
        ];
        let two = ContextAssembler::new("P", 10_000)
            .assemble("q", &chunks[..2], &[])
            .unwrap()
            .token_count();
        let ctx = ContextAssembler::new("P", two)
            .assemble("q", &chunks, &[])
            .unwrap();
        let ids: Vec<_> = ctx
            .retrieved_chunks()
            .iter()
            .map(|h| h.chunk.id().as_str())
            .collect();
        assert_eq!(ids, ["best", "mid"]);
    }

    #[test]
    fn oldest_turns_dropped_first() {
        let memory = conversation();
        let last_two = ContextAssembler::new("P", 10_000)
            .assemble("q", &[], &memory[2..])
            .unwrap()
            .token_count();
        let ctx = ContextAssembler::new("P", last_two)
            .assemble("q", &[], &memory)
            .unwrap();
        let texts: Vec<_> = ctx.memory_window().iter().map(Turn::text).collect();
        assert_eq!(texts, ["second question", "second answer"]);
    }

    #[test]
    fn messages_split_preamble_and_body() {
        let ctx = ContextAssembler::new("SYSTEM", 1000)
            .assemble("hello", &[], &[])
            .unwrap();
        let messages = ctx.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system("SYSTEM"));
        assert!(messages[1].content.contains("hello"));
        assert!(!messages[1].content.contains("SYSTEM"));
    }

    proptest! {
        #[test]
        fn never_exceeds_budget(
            budget in 0usize..600,
            chunk_lens in proptest::collection::vec(0usize..500, 0..8),
            turn_lens in proptest::collection::vec(0usize..300, 0..10),
            query_len in 0usize..200,
        ) {
            let chunks: Vec<_> = chunk_lens
                .iter()
                .enumerate()
                .map(|(i, len)| hit(&format!("c{i}"), &"z".repeat(*len), 0.5))
                .collect();
            let memory: Vec<_> = turn_lens
                .iter()
                .map(|len| turn(TurnRole::User, &"m".repeat(*len)))
                .collect();
            let query = "q".repeat(query_len);
            let asm = ContextAssembler::new(DEFAULT_SYSTEM_PROMPT, budget);

            match asm.assemble(&query, &chunks, &memory) {
                Ok(ctx) => {
                    prop_assert!(ctx.token_count() <= budget);
                    prop_assert!(estimate_tokens(&ctx.render()) <= budget);
                    prop_assert_eq!(ctx.current_query(), query.as_str());
                    prop_assert!(ctx.render().contains(DEFAULT_SYSTEM_PROMPT));
                }
                Err(ContextError::BudgetTooSmall { required, .. }) => {
                    prop_assert!(required > budget);
                }
            }
        }
    }
}
