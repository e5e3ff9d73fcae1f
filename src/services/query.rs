//! QueryEngine - retrieve, then synthesize

use std::collections::BTreeMap;

use text_splitter::ChunkSizer;

use crate::error::AppResult;
use crate::services::ai::{
    DeltaSink, LanguageModel, NodeWithScore, PromptHelper, ResponseMode, Retriever,
    SourceMetadata, Synthesizer,
};
use crate::utils::validate_not_empty;

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
    /// `node_id -> source` for every retrieved node
    pub metadata: BTreeMap<String, SourceMetadata>,
}

pub struct QueryEngine<R, L, S> {
    retriever: R,
    llm: L,
    helper: PromptHelper<S>,
    mode: ResponseMode,
    top_k: usize,
}

impl<R, L, S> QueryEngine<R, L, S>
where
    R: Retriever,
    L: LanguageModel,
    S: ChunkSizer + Clone,
{
    pub fn new(retriever: R, llm: L, helper: PromptHelper<S>, mode: ResponseMode, top_k: usize) -> Self {
        Self {
            retriever,
            llm,
            helper,
            mode,
            top_k,
        }
    }

    pub async fn query(&self, question: &str, on_delta: &mut DeltaSink<'_>) -> AppResult<QueryResponse> {
        let question = validate_not_empty(question.trim(), "question")?;

        let source_nodes = self.retriever.retrieve(question, self.top_k).await?;
        tracing::info!(
            nodes = source_nodes.len(),
            mode = %self.mode,
            "Retrieved context for question"
        );

        let texts = source_nodes.iter().map(|node| node.text.clone()).collect();
        let response = Synthesizer::new(&self.llm, &self.helper)
            .synthesize(question, texts, self.mode, on_delta)
            .await?;

        let metadata = source_nodes
            .iter()
            .map(|node| {
                (
                    node.node_id.clone(),
                    SourceMetadata {
                        file_name: node.metadata.file_name.clone(),
                        page_label: node.metadata.page_label.clone(),
                    },
                )
            })
            .collect();

        Ok(QueryResponse {
            response,
            source_nodes,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use text_splitter::Characters;

    use super::*;
    use crate::services::ai::{DocumentMetadata, ScriptedModel, EMPTY_RESPONSE};

    struct FixedRetriever {
        nodes: Vec<NodeWithScore>,
        asked: Mutex<Vec<(String, usize)>>,
    }

    impl FixedRetriever {
        fn new(nodes: Vec<NodeWithScore>) -> Self {
            Self {
                nodes,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &str, top_k: usize) -> AppResult<Vec<NodeWithScore>> {
            self.asked.lock().unwrap().push((query.to_string(), top_k));
            Ok(self.nodes.iter().take(top_k).cloned().collect())
        }
    }

    fn node(id: &str, text: &str, page: Option<&str>, score: f64) -> NodeWithScore {
        NodeWithScore {
            node_id: id.to_string(),
            text: text.to_string(),
            chunk_index: 0,
            metadata: DocumentMetadata {
                file_name: "guide.pdf".to_string(),
                file_path: "/docs/guide.pdf".to_string(),
                page_label: page.map(str::to_string),
            },
            score,
        }
    }

    fn engine(
        nodes: Vec<NodeWithScore>,
        replies: &[&str],
        mode: ResponseMode,
    ) -> QueryEngine<FixedRetriever, ScriptedModel, Characters> {
        QueryEngine::new(
            FixedRetriever::new(nodes),
            ScriptedModel::new(replies),
            PromptHelper::new(3900, 256, Characters),
            mode,
            2,
        )
    }

    async fn ask(
        engine: &QueryEngine<FixedRetriever, ScriptedModel, Characters>,
        question: &str,
    ) -> (AppResult<QueryResponse>, String) {
        let mut streamed = String::new();
        let result = {
            let mut sink = |delta: &str| -> AppResult<()> {
                streamed.push_str(delta);
                Ok(())
            };
            engine.query(question, &mut sink).await
        };
        (result, streamed)
    }

    #[tokio::test]
    async fn query_streams_answer_and_maps_sources() {
        let engine = engine(
            vec![
                node("n1", "The pump runs at 3 bar.", Some("4"), 0.91),
                node("n2", "Service it yearly.", Some("7"), 0.72),
                node("n3", "Not retrieved.", Some("9"), 0.10),
            ],
            &["3 bar"],
            ResponseMode::Compact,
        );

        let (result, streamed) = ask(&engine, "  What pressure?  ").await;
        let response = result.unwrap();

        assert_eq!(response.response, "3 bar");
        assert_eq!(streamed, "3 bar");
        assert_eq!(response.source_nodes.len(), 2);
        assert_eq!(
            response.metadata.get("n2"),
            Some(&SourceMetadata {
                file_name: "guide.pdf".to_string(),
                page_label: Some("7".to_string()),
            })
        );
        assert_eq!(
            engine.retriever.asked.lock().unwrap().as_slice(),
            &[("What pressure?".to_string(), 2)]
        );

        let calls = engine.llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("The pump runs at 3 bar."));
        assert!(calls[0].1.contains("Query: What pressure?"));
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_retrieval() {
        let engine = engine(vec![node("n1", "text", None, 0.5)], &[], ResponseMode::Compact);
        let (result, _) = ask(&engine, "   ").await;
        assert_eq!(result.unwrap_err().kind(), "validation");
        assert!(engine.retriever.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_text_mode_returns_sources_only() {
        let engine = engine(vec![node("n1", "text", Some("1"), 0.5)], &[], ResponseMode::NoText);
        let (result, streamed) = ask(&engine, "anything").await;
        let response = result.unwrap();
        assert!(response.response.is_empty());
        assert!(streamed.is_empty());
        assert_eq!(response.source_nodes.len(), 1);
        assert!(engine.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn nothing_retrieved_gives_empty_response() {
        let engine = engine(Vec::new(), &[], ResponseMode::Refine);
        let (result, streamed) = ask(&engine, "anything").await;
        let response = result.unwrap();
        assert_eq!(response.response, EMPTY_RESPONSE);
        assert_eq!(streamed, EMPTY_RESPONSE);
        assert!(response.metadata.is_empty());
    }
}
