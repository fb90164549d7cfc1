//! Bounded, ordered log of conversation turns.
//!
//! The log evicts from the front (oldest first) whenever the turn bound or the
//! optional token bound is exceeded. Appending never fails. The newest turn is
//! always retained, even when it alone exceeds the token bound.

use std::collections::VecDeque;

use crate::tokens::token_cost;
use crate::types::Turn;

/// Limits enforced on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBound {
    pub max_turns: usize,
    pub max_tokens: Option<usize>,
}

impl MemoryBound {
    #[must_use]
    pub fn turns(max_turns: usize) -> Self {
        Self {
            max_turns,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Empty,
    Active,
}

/// Selection budget for [`ConversationMemory::window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBudget {
    Turns(usize),
    Tokens(usize),
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    bound: MemoryBound,
    tokens: usize,
}

impl ConversationMemory {
    /// `max_turns` of zero is treated as one.
    #[must_use]
    pub fn new(bound: MemoryBound) -> Self {
        let bound = MemoryBound {
            max_turns: bound.max_turns.max(1),
            ..bound
        };
        Self {
            turns: VecDeque::with_capacity(bound.max_turns.min(64)),
            bound,
            tokens: 0,
        }
    }

    #[must_use]
    pub fn bound(&self) -> MemoryBound {
        self.bound
    }

    pub fn append(&mut self, turn: Turn) {
        self.tokens += token_cost(turn.text());
        self.turns.push_back(turn);

        let mut evicted = 0usize;
        while self.turns.len() > 1 && self.over_bound() {
            if let Some(old) = self.turns.pop_front() {
                self.tokens -= token_cost(old.text());
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(
                evicted,
                retained = self.turns.len(),
                tokens = self.tokens,
                "evicted oldest conversation turns"
            );
        }
    }

    fn over_bound(&self) -> bool {
        self.turns.len() > self.bound.max_turns
            || self.bound.max_tokens.is_some_and(|max| self.tokens > max)
    }

    /// Most recent turns that fit `budget`, oldest first.
    ///
    /// Selection walks back from the newest turn and stops at the first turn
    /// that does not fit, so the result is always a contiguous suffix.
    #[must_use]
    pub fn window(&self, budget: WindowBudget) -> Vec<Turn> {
        let take = match budget {
            WindowBudget::Turns(n) => n.min(self.turns.len()),
            WindowBudget::Tokens(max) => {
                let mut used = 0usize;
                self.turns
                    .iter()
                    .rev()
                    .take_while(|t| {
                        used += token_cost(t.text());
                        used <= max
                    })
                    .count()
            }
        };
        self.turns
            .iter()
            .skip(self.turns.len() - take)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.tokens = 0;
    }

    #[must_use]
    pub fn state(&self) -> MemoryState {
        if self.turns.is_empty() {
            MemoryState::Empty
        } else {
            MemoryState::Active
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of [`token_cost`] over retained turns.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}
