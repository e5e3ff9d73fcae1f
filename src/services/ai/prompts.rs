//! Prompt templates and prompt sizing
//!
//! `PromptHelper` answers one question: how much context text fits into a
//! template once the model's context window and output budget are reserved.

use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};

use crate::error::{AppError, AppResult, ResultExt};

pub const KEY_CONTEXT_STR: &str = "context_str";
pub const KEY_QUERY_STR: &str = "query_str";
pub const KEY_EXISTING_ANSWER: &str = "existing_answer";
pub const KEY_CONTEXT_MSG: &str = "context_msg";

pub const TEXT_QA: PromptTemplate = PromptTemplate::new(
    "Context information is below.\n\
     ---------------------\n\
     {context_str}\n\
     ---------------------\n\
     Given the context information and not prior knowledge, answer the query.\n\
     Query: {query_str}\n\
     Answer: ",
);

pub const REFINE: PromptTemplate = PromptTemplate::new(
    "The original query is as follows: {query_str}\n\
     We have provided an existing answer: {existing_answer}\n\
     We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
     ------------\n\
     {context_msg}\n\
     ------------\n\
     Given the new context, refine the original answer to better answer the query. \
     If the context isn't useful, return the original answer.\n\
     Refined Answer: ",
);

pub const TREE_SUMMARIZE: PromptTemplate = PromptTemplate::new(
    "Context information from multiple sources is below.\n\
     ---------------------\n\
     {context_str}\n\
     ---------------------\n\
     Given the information from multiple sources and not prior knowledge, answer the query.\n\
     Query: {query_str}\n\
     Answer: ",
);

/// Separator used when concatenating chunks
pub const CHUNK_SEPARATOR: &str = "\n\n";

const DEFAULT_OVERLAP_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Single-pass `{key}` substitution; unknown keys stay as written, and
    /// substituted values are never re-scanned.
    pub fn format(&self, vars: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(open) = rest.find('{') {
            output.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match vars.iter().find(|(name, _)| *name == key) {
                        Some((_, value)) => output.push_str(value),
                        None => {
                            output.push('{');
                            output.push_str(key);
                            output.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    output.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        output
    }
}

/// Sizes and splits context text against a template
pub struct PromptHelper<S> {
    context_window: usize,
    num_output: usize,
    overlap_ratio: f64,
    sizer: S,
}

impl<S> PromptHelper<S>
where
    S: ChunkSizer + Clone,
{
    pub fn new(context_window: usize, num_output: usize, sizer: S) -> Self {
        Self {
            context_window,
            num_output,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
            sizer,
        }
    }

    pub fn token_count(&self, text: &str) -> usize {
        self.sizer.size(text)
    }

    /// Tokens left for context once `skeleton` (the prompt with an empty
    /// context slot) and the output budget are reserved
    pub fn available_tokens(&self, skeleton: &str) -> AppResult<usize> {
        let used = self.token_count(skeleton) + self.num_output;
        if used >= self.context_window {
            return Err(AppError::Validation(format!(
                "prompt needs {} tokens but the context window is {}",
                used, self.context_window
            )));
        }
        Ok(self.context_window - used)
    }

    fn splitter(&self, capacity: usize, with_overlap: bool) -> AppResult<TextSplitter<S>> {
        let overlap = if with_overlap {
            (capacity as f64 * self.overlap_ratio) as usize
        } else {
            0
        };
        let config = ChunkConfig::new(capacity)
            .with_overlap(overlap.min(capacity.saturating_sub(1)))
            .config_err("invalid prompt chunk config")?
            .with_sizer(self.sizer.clone());
        Ok(TextSplitter::new(config))
    }

    /// Split one text so every piece fits next to `skeleton`
    pub fn split_to_fit(&self, skeleton: &str, text: &str) -> AppResult<Vec<String>> {
        self.split_with(skeleton, text, true)
    }

    fn split_with(&self, skeleton: &str, text: &str, with_overlap: bool) -> AppResult<Vec<String>> {
        let available = self.available_tokens(skeleton)?;
        if self.token_count(text) <= available {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![trimmed.to_string()]);
        }
        Ok(self
            .splitter(available, with_overlap)?
            .chunks(text)
            .map(str::to_string)
            .collect())
    }

    /// Concatenate texts, then re-split into as few fitting chunks as possible
    pub fn repack(&self, skeleton: &str, texts: &[String]) -> AppResult<Vec<String>> {
        let joined = texts
            .iter()
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR);
        self.split_with(skeleton, &joined, false)
    }

    /// Give every text an equal share of the budget, keeping its head
    pub fn truncate(&self, skeleton: &str, texts: &[String]) -> AppResult<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let available = self.available_tokens(skeleton)?;
        // separators between the pieces also cost tokens
        let separators = self.token_count(CHUNK_SEPARATOR) * (texts.len() - 1);
        let budget = available.saturating_sub(separators) / texts.len();
        if budget == 0 {
            return Err(AppError::Validation(format!(
                "{} chunks do not fit into {} tokens",
                texts.len(),
                available
            )));
        }

        let splitter = self.splitter(budget, false)?;
        Ok(texts
            .iter()
            .map(|text| {
                if self.token_count(text) <= budget {
                    text.trim().to_string()
                } else {
                    splitter.chunks(text).next().unwrap_or_default().to_string()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use text_splitter::Characters;

    use super::*;

    #[test]
    fn format_substitutes_known_keys_once() {
        let prompt = TEXT_QA.format(&[
            (KEY_CONTEXT_STR, "the sky is {query_str}"),
            (KEY_QUERY_STR, "why blue?"),
        ]);
        assert!(prompt.contains("the sky is {query_str}"));
        assert!(prompt.ends_with("Query: why blue?\nAnswer: "));
    }

    #[test]
    fn format_keeps_unknown_and_unclosed_braces() {
        let template = PromptTemplate::new("{a} {b} {c");
        assert_eq!(template.format(&[("a", "1")]), "1 {b} {c");
    }

    #[test]
    fn available_tokens_reserves_output() {
        let helper = PromptHelper::new(100, 20, Characters);
        assert_eq!(helper.available_tokens("0123456789").unwrap(), 70);
        assert!(helper.available_tokens(&"x".repeat(80)).is_err());
    }

    #[test]
    fn repack_merges_small_chunks() {
        let helper = PromptHelper::new(200, 10, Characters);
        let texts = vec!["alpha".to_string(), " ".to_string(), "beta".to_string()];
        let packed = helper.repack("", &texts).unwrap();
        assert_eq!(packed, vec!["alpha\n\nbeta".to_string()]);
    }

    #[test]
    fn split_to_fit_respects_budget() {
        let helper = PromptHelper::new(60, 10, Characters);
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let pieces = helper.split_to_fit("", text).unwrap();
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 50));
    }

    #[test]
    fn truncate_shares_budget_equally() {
        let helper = PromptHelper::new(40, 10, Characters);
        let texts = vec!["a".repeat(40), "short".to_string()];
        let truncated = helper.truncate("", &texts).unwrap();
        assert_eq!(truncated.len(), 2);
        assert!(truncated[0].chars().count() <= 14);
        assert_eq!(truncated[1], "short");
    }
}
