//! `search_factory_knowledge`: coarse vector search, rerank, then merge the
//! surviving chunks back into document order.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::error::describe;
use crate::i18n::I18n;
use crate::knowledge::{KnowledgeStore, RetrievedChunk};
use crate::rerank::Reranker;

pub struct RetrievalTool {
    store: Arc<dyn KnowledgeStore>,
    reranker: Arc<dyn Reranker>,
    i18n: Arc<I18n>,
    locale: String,
    config: RetrievalConfig,
}

/// Order chunks by file name, then numeric page. Chunks on the same page keep
/// their incoming (reranker) order.
pub fn merge_chunks(mut chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    chunks.sort_by(|a, b| {
        a.source_file
            .cmp(&b.source_file)
            .then(a.page_number().cmp(&b.page_number()))
    });
    chunks
}

/// Render merged chunks as one context string with a header per file and a
/// closing source-files line.
pub fn render_context(chunks: &[RetrievedChunk], i18n: &I18n, locale: &str) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(chunks.len() * 2 + 1);
    let mut files: Vec<&str> = Vec::new();

    for chunk in chunks {
        if files.last() != Some(&chunk.source_file.as_str()) {
            sections.push(i18n.format(locale, "retrieval-file-header", &[("file", &chunk.source_file)]));
            files.push(&chunk.source_file);
        }
        sections.push(chunk.text.trim().to_string());
    }

    let files = files.join(", ");
    sections.push(i18n.format(locale, "retrieval-sources", &[("files", &files)]));
    sections.join("\n\n")
}

impl RetrievalTool {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        reranker: Arc<dyn Reranker>,
        i18n: Arc<I18n>,
        locale: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            reranker,
            i18n,
            locale: locale.into(),
            config,
        }
    }

    /// Run the search and return the text handed back to the model.
    ///
    /// Never fails: backend errors come back as a descriptive message.
    pub async fn search(&self, query: &str) -> String {
        metrics::counter!("factory_retrievals_total").increment(1);

        let candidates = match self.store.query_similar(query, self.config.coarse_top_k).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(query = %query, error = %describe(&e), "Knowledge base query failed");
                return self
                    .i18n
                    .format(&self.locale, "retrieval-error", &[("reason", &describe(&e))]);
            }
        };

        if candidates.is_empty() {
            info!(query = %query, "Knowledge base returned no results");
            return self.i18n.get(&self.locale, "retrieval-no-results", None);
        }

        let selected = self.rerank(query, candidates).await;
        let merged = merge_chunks(selected);

        info!(query = %query, chunks = merged.len(), "Knowledge base search complete");
        render_context(&merged, &self.i18n, &self.locale)
    }

    /// Narrow candidates to the configured top-N, keeping coarse order if the
    /// reranker is unavailable.
    async fn rerank(&self, query: &str, candidates: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        let top_n = self.config.rerank_top_n;
        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        match self.reranker.rerank(query, &documents, top_n).await {
            Ok(hits) => {
                debug!(candidates = candidates.len(), kept = hits.len(), "Reranked");
                let mut slots: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
                hits.into_iter()
                    .filter_map(|hit| slots.get_mut(hit.index).and_then(Option::take))
                    .take(top_n)
                    .collect()
            }
            Err(e) => {
                warn!(error = %describe(&e), "Reranker failed, keeping similarity order");
                candidates.into_iter().take(top_n).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::{PassthroughReranker, RerankHit};
    use crate::test_support::{FailingReranker, ScriptedReranker, StaticKnowledgeStore, chunk};

    fn tool(store: StaticKnowledgeStore, reranker: Arc<dyn Reranker>) -> RetrievalTool {
        RetrievalTool::new(
            Arc::new(store),
            reranker,
            Arc::new(I18n::new("en")),
            "en",
            RetrievalConfig {
                coarse_top_k: 15,
                rerank_top_n: 2,
            },
        )
    }

    #[test]
    fn test_files_ordered_by_name() {
        let merged = merge_chunks(vec![chunk("m2.pdf", Some("3"), "two"), chunk("m1.pdf", Some("1"), "one")]);
        let files: Vec<_> = merged.iter().map(|c| c.source_file.as_str()).collect();
        assert_eq!(files, vec!["m1.pdf", "m2.pdf"]);
    }

    #[test]
    fn test_pages_numeric_with_missing_first() {
        let merged = merge_chunks(vec![
            chunk("m.pdf", Some("10"), "ten"),
            chunk("m.pdf", Some("2"), "two"),
            chunk("m.pdf", None, "none"),
            chunk("m.pdf", Some("cover"), "cover"),
        ]);
        let texts: Vec<_> = merged.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["none", "cover", "two", "ten"]);
    }

    #[test]
    fn test_same_page_keeps_reranker_order() {
        let merged = merge_chunks(vec![
            chunk("m.pdf", Some("4"), "best"),
            chunk("m.pdf", Some("4"), "second"),
        ]);
        assert_eq!(merged[0].text, "best");
        assert_eq!(merged[1].text, "second");
    }

    #[test]
    fn test_render_context_headers_and_sources() {
        let i18n = I18n::new("en");
        let chunks = merge_chunks(vec![
            chunk("m2.pdf", Some("3"), "Replace the fuse"),
            chunk("m1.pdf", Some("1"), "A\n\n![diagram](http://localhost:8000/images/m1_p1_0.png)\n\nB"),
            chunk("m1.pdf", Some("2"), "C"),
        ]);
        let context = render_context(&chunks, &i18n, "en");
        assert_eq!(
            context,
            "[Source file: m1.pdf]\n\nA\n\n![diagram](http://localhost:8000/images/m1_p1_0.png)\n\nB\n\nC\n\n\
             [Source file: m2.pdf]\n\nReplace the fuse\n\n[Reference files]: m1.pdf, m2.pdf"
        );
    }

    #[tokio::test]
    async fn test_search_reranks_then_merges() {
        let store = StaticKnowledgeStore::new(vec![
            chunk("m2.pdf", Some("3"), "m2 p3"),
            chunk("m1.pdf", Some("9"), "m1 p9"),
            chunk("m1.pdf", Some("1"), "m1 p1"),
        ]);
        let reranker = ScriptedReranker::new(vec![
            RerankHit { index: 0, score: 0.9 },
            RerankHit { index: 2, score: 0.8 },
            RerankHit { index: 1, score: 0.1 },
        ]);
        let context = tool(store, Arc::new(reranker)).search("fuse").await;

        assert!(context.starts_with("[Source file: m1.pdf]\n\nm1 p1\n\n[Source file: m2.pdf]\n\nm2 p3"));
        assert!(!context.contains("m1 p9"));
    }

    #[tokio::test]
    async fn test_reranker_failure_falls_back_to_coarse_order() {
        let store = StaticKnowledgeStore::new(vec![
            chunk("b.pdf", Some("1"), "first"),
            chunk("a.pdf", Some("1"), "second"),
            chunk("a.pdf", Some("2"), "third"),
        ]);
        let context = tool(store, Arc::new(FailingReranker)).search("q").await;
        assert!(context.contains("first"));
        assert!(context.contains("second"));
        assert!(!context.contains("third"));
    }

    #[tokio::test]
    async fn test_no_results_and_backend_error() {
        let empty = tool(StaticKnowledgeStore::new(vec![]), Arc::new(PassthroughReranker));
        assert_eq!(
            empty.search("q").await,
            "No relevant content was found in the knowledge base."
        );

        let broken = tool(StaticKnowledgeStore::failing(), Arc::new(PassthroughReranker));
        assert!(broken.search("q").await.starts_with("Query failed: "));
    }
}
