//! Response synthesis: turns retrieved chunks into one answer per `ResponseMode`

use std::collections::VecDeque;

use text_splitter::ChunkSizer;

use crate::error::{AppError, AppResult};

use super::llm::{DeltaSink, LanguageModel};
use super::prompts::{
    PromptHelper, CHUNK_SEPARATOR, KEY_CONTEXT_MSG, KEY_CONTEXT_STR, KEY_EXISTING_ANSWER,
    KEY_QUERY_STR, REFINE, TEXT_QA, TREE_SUMMARIZE,
};
use super::response_mode::ResponseMode;

pub const EMPTY_RESPONSE: &str = "Empty Response";
pub const ACCUMULATE_SEPARATOR: &str = "\n---------------------\n";

pub struct Synthesizer<'a, L, S> {
    llm: &'a L,
    helper: &'a PromptHelper<S>,
}

impl<'a, L, S> Synthesizer<'a, L, S>
where
    L: LanguageModel,
    S: ChunkSizer + Clone,
{
    pub fn new(llm: &'a L, helper: &'a PromptHelper<S>) -> Self {
        Self { llm, helper }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        texts: Vec<String>,
        mode: ResponseMode,
        on_delta: &mut DeltaSink<'_>,
    ) -> AppResult<String> {
        let texts: Vec<String> = texts
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .collect();
        tracing::debug!(mode = %mode, chunks = texts.len(), "Synthesizing response");

        match mode {
            // retrieval only, nothing goes to the model
            ResponseMode::NoText => Ok(String::new()),
            _ if texts.is_empty() => {
                on_delta(EMPTY_RESPONSE)?;
                Ok(EMPTY_RESPONSE.to_string())
            }
            ResponseMode::Refine => self.refine(query, texts, on_delta).await,
            ResponseMode::Compact => {
                let packed = self.helper.repack(&qa_skeleton(query), &texts)?;
                self.refine(query, packed, on_delta).await
            }
            ResponseMode::TreeSummarize => self.tree_summarize(query, texts, on_delta).await,
            ResponseMode::SimpleSummarize => self.simple_summarize(query, texts, on_delta).await,
            ResponseMode::Accumulate => self.accumulate(query, texts, on_delta).await,
            ResponseMode::CompactAccumulate => {
                let packed = self.helper.repack(&qa_skeleton(query), &texts)?;
                self.accumulate(query, packed, on_delta).await
            }
        }
    }

    /// Answer from the first piece, then refine with each following piece.
    /// Only the last call streams.
    async fn refine(
        &self,
        query: &str,
        texts: Vec<String>,
        on_delta: &mut DeltaSink<'_>,
    ) -> AppResult<String> {
        let mut queue: VecDeque<String> = texts.into();
        let mut answer: Option<String> = None;
        let mut streamed = false;

        while let Some(text) = queue.pop_front() {
            let skeleton = match answer.as_deref() {
                None => qa_skeleton(query),
                Some(existing) => refine_skeleton(query, existing),
            };
            let mut pieces = self.helper.split_to_fit(&skeleton, &text)?.into_iter();
            let Some(piece) = pieces.next() else {
                continue;
            };
            // pieces that did not fit go back to the front, in order
            for rest in pieces.rev() {
                queue.push_front(rest);
            }

            let prompt = match answer.as_deref() {
                None => qa_prompt(query, &piece),
                Some(existing) => refine_prompt(query, existing, &piece),
            };

            let output = if queue.is_empty() {
                streamed = true;
                self.llm.stream_complete(&prompt, on_delta).await?
            } else {
                self.llm.complete(&prompt).await?
            };
            answer = Some(output);
        }

        let answer = answer.unwrap_or_else(|| EMPTY_RESPONSE.to_string());
        if !streamed {
            on_delta(&answer)?;
        }
        Ok(answer)
    }

    async fn tree_summarize(
        &self,
        query: &str,
        texts: Vec<String>,
        on_delta: &mut DeltaSink<'_>,
    ) -> AppResult<String> {
        let skeleton = summary_skeleton(query);
        let mut texts = texts;
        let mut previous_len: Option<usize> = None;
        let mut level = 0usize;

        loop {
            let packed = self.helper.repack(&skeleton, &texts)?;
            if packed.len() <= 1 {
                let context = packed.into_iter().next().unwrap_or_default();
                return self
                    .llm
                    .stream_complete(&summary_prompt(query, &context), on_delta)
                    .await;
            }

            if previous_len.is_some_and(|prev| packed.len() >= prev) {
                return Err(AppError::AiService(format!(
                    "tree_summarize is not converging: {} chunks at level {}",
                    packed.len(),
                    level
                )));
            }

            tracing::debug!(level, chunks = packed.len(), "Summarizing tree level");
            let mut summaries = Vec::with_capacity(packed.len());
            for chunk in &packed {
                summaries.push(self.llm.complete(&summary_prompt(query, chunk)).await?);
            }

            previous_len = Some(packed.len());
            texts = summaries;
            level += 1;
        }
    }

    async fn simple_summarize(
        &self,
        query: &str,
        texts: Vec<String>,
        on_delta: &mut DeltaSink<'_>,
    ) -> AppResult<String> {
        let truncated = self.helper.truncate(&qa_skeleton(query), &texts)?;
        let context = truncated.join(CHUNK_SEPARATOR);
        self.llm
            .stream_complete(&qa_prompt(query, &context), on_delta)
            .await
    }

    async fn accumulate(
        &self,
        query: &str,
        texts: Vec<String>,
        on_delta: &mut DeltaSink<'_>,
    ) -> AppResult<String> {
        let skeleton = qa_skeleton(query);
        let mut pieces = Vec::new();
        for text in &texts {
            pieces.extend(self.helper.split_to_fit(&skeleton, text)?);
        }

        let mut output = String::new();
        for (idx, piece) in pieces.iter().enumerate() {
            if idx > 0 {
                on_delta(ACCUMULATE_SEPARATOR)?;
                output.push_str(ACCUMULATE_SEPARATOR);
            }
            let header = format!("Response {}: ", idx + 1);
            on_delta(&header)?;
            output.push_str(&header);

            let response = self
                .llm
                .stream_complete(&qa_prompt(query, piece), on_delta)
                .await?;
            output.push_str(&response);
        }
        Ok(output)
    }
}

fn qa_skeleton(query: &str) -> String {
    qa_prompt(query, "")
}

fn qa_prompt(query: &str, context: &str) -> String {
    TEXT_QA.format(&[(KEY_CONTEXT_STR, context), (KEY_QUERY_STR, query)])
}

fn refine_skeleton(query: &str, existing: &str) -> String {
    refine_prompt(query, existing, "")
}

fn refine_prompt(query: &str, existing: &str, context: &str) -> String {
    REFINE.format(&[
        (KEY_QUERY_STR, query),
        (KEY_EXISTING_ANSWER, existing),
        (KEY_CONTEXT_MSG, context),
    ])
}

fn summary_skeleton(query: &str) -> String {
    summary_prompt(query, "")
}

fn summary_prompt(query: &str, context: &str) -> String {
    TREE_SUMMARIZE.format(&[(KEY_CONTEXT_STR, context), (KEY_QUERY_STR, query)])
}
