//! Orchestrates placeholder discovery, dispatch, and substitution across a
//! chat-turn's system messages.

pub mod cache;
pub mod diary_source;
pub mod format;
pub mod modifiers;
pub mod placeholders;
pub mod trace;

pub use diary_source::DiaryRagSource;

use crate::config::EngineConfig;
use crate::embedding::EmbeddingClient;
use crate::embedding::similarity::{cosine_similarity, l2_normalize};
use crate::error::Result;
use crate::meta_thinking::{ClusterSearch, MetaThinkingEngine};
use crate::semantic_group::SemanticGroupManager;
use crate::time_parser::TimeExpressionParser;
use crate::types::{SearchHit, TimeRange};
use async_trait::async_trait;
use cache::{QueryCacheKey, QueryResultCache};
use modifiers::{parse_meta_params, parse_modifiers, Modifiers};
use placeholders::{find_placeholders, Placeholder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The query text and vector a system message's placeholders are resolved
/// against: the last non-injection user message, blended 0.7/0.3 with the
/// last assistant message.
struct QueryContext {
    text: String,
    /// The last assistant message's text, kept separately from `text` for
    /// the AI-turn half of `dynamic_k`'s two-tier average and for the
    /// query cache key.
    ai_text: String,
    vector: Option<Vec<f32>>,
    /// Set when embedding the query itself failed (credentials, transport),
    /// as opposed to there simply being no user text to embed. Distinguishes
    /// "nothing to search for" (silent empty expansion) from "the backend is
    /// down" (the fixed catastrophic-failure substitution).
    embedding_failed: bool,
}

/// The fixed user-visible substitution for a single placeholder's failure.
fn placeholder_failure(reason: &str) -> String {
    format!("[处理失败: {reason}]")
}

/// The fixed substitution for a catastrophic planner-level failure.
const CATASTROPHIC_FAILURE: &str = "[RAG处理失败]";

/// The fixed substitution when circular reference detection short-circuits
/// a repeated diary name within one system message.
fn circular_reference(diary: &str) -> String {
    format!("[检测到循环引用，已跳过\"{diary}日记本\"的解析]")
}

/// The fixed substitution when a named meta-thinking chain is not
/// configured.
fn chain_not_found(chain: &str) -> String {
    format!("[错误: 未找到\"{chain}\"思维链定义]")
}

/// The fixed substitution for a meta-thinking chain that failed mid-run.
fn meta_thinking_failure(reason: &str) -> String {
    format!("[VCP元思考链处理失败: {reason}]")
}

/// The fixed substitution for every AIMemo placeholder after the first in an
/// aggregated group, which already carries the combined result.
fn ai_memo_cross_reference(first_diary: &str) -> String {
    format!("[AIMemo: 已合并至\"{first_diary}日记本\"的结果中]")
}

/// The combined result of an `::AIMemo` placeholder group: one rendered
/// string assigned to the first occurrence, every other occurrence
/// replaced by a fixed cross-reference instead of a second dispatch.
struct AiMemoGroup {
    first_span: (usize, usize),
    other_spans: HashSet<(usize, usize)>,
    first_diary: String,
    combined: String,
}

/// A chat message in the stream passed to [`QueryPlanner::process_system_messages`].
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The capability one diary's retrieval dispatches to.
#[async_trait]
pub trait RagSource: Send + Sync {
    /// The diary's durably-cached name embedding, used for gating.
    async fn name_vector(&self, diary: &str) -> Result<Option<Vec<f32>>>;
    /// Plain semantic (optionally tag-boosted) search.
    async fn search(
        &self,
        diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
    ) -> Result<Vec<SearchHit>>;
    /// Semantic search unioned with every chunk whose timestamp falls in
    /// `ranges`.
    async fn search_with_time(
        &self,
        diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
        ranges: &[TimeRange],
    ) -> Result<Vec<SearchHit>>;
    /// Rerank-backed search, per the diary store's ordering policy.
    async fn search_reranked(
        &self,
        diary: &str,
        query_vec: &[f32],
        k: usize,
        tag_weight: Option<f32>,
        query_tags: &[String],
    ) -> Result<Vec<SearchHit>>;
    /// Every chunk's text, for gated whole-diary inclusion.
    async fn whole_diary_text(&self, diary: &str) -> Result<Vec<String>>;
}

/// Ties together every retrieval capability the planner dispatches to, plus
/// its two caches.
pub struct QueryPlanner {
    embedder: Arc<dyn EmbeddingClient>,
    rag_sources: HashMap<String, Arc<dyn RagSource>>,
    meta_thinking: Option<MetaThinkingEngine>,
    cluster_search: Option<Arc<dyn ClusterSearch>>,
    semantic_groups: SemanticGroupManager,
    time_parser: TimeExpressionParser,
    query_cache: QueryResultCache,
    config: EngineConfig,
}

impl QueryPlanner {
    /// Construct a planner. `rag_sources` maps diary name to its retrieval
    /// backend; `meta_thinking`/`cluster_search` are `None` when the
    /// deployment has no meta-thinking chains configured.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        rag_sources: HashMap<String, Arc<dyn RagSource>>,
        meta_thinking: Option<MetaThinkingEngine>,
        cluster_search: Option<Arc<dyn ClusterSearch>>,
        semantic_groups: SemanticGroupManager,
        config: EngineConfig,
    ) -> Self {
        let time_parser = TimeExpressionParser::new(&config.default_timezone);
        let query_cache = QueryResultCache::new(config.rag_cache_max_size, config.rag_cache_ttl_ms);
        Self {
            embedder,
            rag_sources,
            meta_thinking,
            cluster_search,
            semantic_groups,
            time_parser,
            query_cache,
            config,
        }
    }

    /// Process every system message in `messages`, substituting each
    /// recognized placeholder with its rendered retrieval result (or a
    /// fixed failure string). Never panics or returns an error: failures at
    /// any granularity degrade to a substitution string instead.
    pub async fn process_system_messages(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let (user_text, assistant_text) = last_query_context(&messages);
        let (query_vec, embedding_failed) = match self
            .build_query_vector(user_text.as_deref(), assistant_text.as_deref())
            .await
        {
            Ok(vector) => (vector, false),
            Err(_) => (None, true),
        };
        let context = QueryContext {
            text: user_text.unwrap_or_default(),
            ai_text: assistant_text.unwrap_or_default(),
            vector: query_vec,
            embedding_failed,
        };

        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            if message.role != "system" {
                out.push(message);
                continue;
            }
            let processed = self.process_one_system_message(&message.content, &context).await;
            out.push(ChatMessage {
                role: message.role,
                content: processed,
            });
        }
        out
    }

    async fn process_one_system_message(&self, content: &str, context: &QueryContext) -> String {
        let found = find_placeholders(content);
        if found.is_empty() {
            return content.to_string();
        }

        let ai_memo_licensed = found.iter().any(|p| matches!(p, Placeholder::AiMemoLicense { .. }));
        let ai_memo_group = self.resolve_ai_memo_group(&found, context, ai_memo_licensed).await;

        let mut processed_diaries: HashSet<String> = HashSet::new();
        let mut result = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for placeholder in &found {
            let (start, end) = placeholder.span();
            result.push_str(&content[cursor..start]);
            cursor = end;

            let aggregated = ai_memo_group.as_ref().and_then(|group| {
                if placeholder.span() == group.first_span {
                    Some(group.combined.clone())
                } else if group.other_spans.contains(&placeholder.span()) {
                    Some(ai_memo_cross_reference(&group.first_diary))
                } else {
                    None
                }
            });

            let replacement = if let Some(aggregated) = aggregated {
                if let Some(diary) = placeholder.diary_name() {
                    processed_diaries.insert(diary.to_string());
                }
                aggregated
            } else {
                match placeholder {
                    Placeholder::AiMemoLicense { .. } => String::new(),
                    Placeholder::Rag { diary, mods, .. } => {
                        if !processed_diaries.insert(diary.clone()) {
                            circular_reference(diary)
                        } else {
                            self.dispatch_rag(diary, mods, context).await
                        }
                    }
                    Placeholder::GatedInclude { diary, .. } => {
                        if !processed_diaries.insert(diary.clone()) {
                            circular_reference(diary)
                        } else {
                            self.dispatch_gated_include(diary, context).await
                        }
                    }
                    Placeholder::Hybrid { diary, mods, .. } => {
                        if !processed_diaries.insert(diary.clone()) {
                            circular_reference(diary)
                        } else {
                            self.dispatch_hybrid(diary, mods, context).await
                        }
                    }
                    Placeholder::MetaThinking { params, .. } => {
                        self.dispatch_meta_thinking(params, context).await
                    }
                }
            };
            result.push_str(&replacement);
        }
        result.push_str(&content[cursor..]);
        result
    }

    /// Groups every `Rag`/`Hybrid` placeholder whose `::AIMemo` modifier is
    /// set, the `[[AIMemo=True]]` license token is present, and the diary's
    /// gate passes, into a single combined call: the first member's result
    /// carries every member's rendering concatenated in placeholder order,
    /// every later member is replaced by a cross-reference instead of being
    /// dispatched a second time. Returns `None` when there's nothing to
    /// aggregate (no license, or no eligible placeholder survives the gate).
    async fn resolve_ai_memo_group(
        &self,
        found: &[Placeholder],
        context: &QueryContext,
        license_present: bool,
    ) -> Option<AiMemoGroup> {
        if !license_present {
            return None;
        }
        let query_vec = context.vector.as_deref()?;

        let mut members: Vec<(&str, &str, Arc<dyn RagSource>, (usize, usize))> = Vec::new();
        for placeholder in found {
            let (diary, mods) = match placeholder {
                Placeholder::Rag { diary, mods, .. } | Placeholder::Hybrid { diary, mods, .. } => {
                    (diary.as_str(), mods.as_str())
                }
                _ => continue,
            };
            if !parse_modifiers(mods).ai_memo {
                continue;
            }
            let Some(source) = self.rag_sources.get(diary) else {
                continue;
            };
            if self.passes_gate(source.as_ref(), diary, query_vec).await {
                members.push((diary, mods, Arc::clone(source), placeholder.span()));
            }
        }

        if members.is_empty() {
            return None;
        }

        let mut combined = String::new();
        for (diary, mods, source, _) in &members {
            combined.push_str(&self.render_rag_result(diary, mods, source.as_ref(), query_vec, context).await);
        }

        let first_span = members[0].3;
        let first_diary = members[0].0.to_string();
        let other_spans = members[1..].iter().map(|m| m.3).collect();

        Some(AiMemoGroup { first_span, other_spans, first_diary, combined })
    }

    async fn build_query_vector(
        &self,
        user_text: Option<&str>,
        assistant_text: Option<&str>,
    ) -> Result<Option<Vec<f32>>> {
        let user_vec = match user_text {
            Some(text) if !text.is_empty() => Some(self.embedder.embed_one(&strip_noise(text)).await?),
            _ => None,
        };
        let assistant_vec = match assistant_text {
            Some(text) if !text.is_empty() => Some(self.embedder.embed_one(&strip_noise(text)).await?),
            _ => None,
        };

        Ok(match (user_vec, assistant_vec) {
            (Some(user), Some(assistant)) if user.len() == assistant.len() => {
                let blended: Vec<f32> = user
                    .iter()
                    .zip(&assistant)
                    .map(|(u, a)| 0.7 * u + 0.3 * a)
                    .collect();
                Some(l2_normalize(&blended))
            }
            (Some(user), _) => Some(l2_normalize(&user)),
            (None, Some(assistant)) => Some(l2_normalize(&assistant)),
            (None, None) => None,
        })
    }

    async fn dispatch_rag(&self, diary: &str, mods: &str, context: &QueryContext) -> String {
        let Some(query_vec) = context.vector.as_deref() else {
            return if context.embedding_failed {
                CATASTROPHIC_FAILURE.to_string()
            } else {
                String::new()
            };
        };
        let Some(source) = self.rag_sources.get(diary) else {
            return placeholder_failure(&format!("未配置日记本\"{diary}\""));
        };

        if !self.passes_gate(source.as_ref(), diary, query_vec).await {
            return String::new();
        }

        self.render_rag_result(diary, mods, source.as_ref(), query_vec, context).await
    }

    /// The cached, k-dispatched search-and-render core shared by
    /// [`Self::dispatch_rag`] and AIMemo group aggregation. Callers must
    /// have already confirmed the query vector exists, the diary is
    /// configured, and its gate passed.
    async fn render_rag_result(
        &self,
        diary: &str,
        mods: &str,
        source: &dyn RagSource,
        query_vec: &[f32],
        context: &QueryContext,
    ) -> String {
        let modifiers = parse_modifiers(mods);
        let date_bucket = if modifiers.time {
            self.time_parser.today_string()
        } else {
            "static".to_string()
        };
        let key = QueryCacheKey {
            user: &context.text,
            ai: &context.ai_text,
            diary,
            mods,
            chain: None,
            k_seq: &[],
            group: modifiers.group,
            auto: false,
            date_bucket: &date_bucket,
        };
        if let Some(cached) = self.cached_result(&key) {
            return cached;
        }

        let k = dynamic_k(
            context.text.chars().count(),
            unique_token_count(&context.ai_text),
            modifiers.k_multiplier,
        );
        let query_tags: Vec<String> = Vec::new();

        let hits_result = if modifiers.rerank {
            source.search_reranked(diary, query_vec, k, modifiers.tag_weight, &query_tags).await
        } else if modifiers.time {
            let ranges = self.time_parser.parse(&context.text);
            if ranges.is_empty() {
                source.search(diary, query_vec, k, modifiers.tag_weight, &query_tags).await
            } else {
                source
                    .search_with_time(diary, query_vec, k, modifiers.tag_weight, &query_tags, &ranges)
                    .await
            }
        } else {
            source.search(diary, query_vec, k, modifiers.tag_weight, &query_tags).await
        };

        let rendered = match hits_result {
            Ok(hits) if modifiers.group => {
                let activations = self.semantic_groups.detect_activations(&context.text);
                format::render_group_enhanced(diary, &activations, &hits)
            }
            Ok(hits) => format::render_standard_rag(diary, &hits),
            // Transient failures aren't cached: a later call should retry.
            Err(error) => return error.to_placeholder_failure(),
        };

        self.cache_result(&key, rendered.clone());
        rendered
    }

    async fn dispatch_gated_include(&self, diary: &str, context: &QueryContext) -> String {
        let Some(query_vec) = context.vector.as_deref() else {
            return if context.embedding_failed {
                CATASTROPHIC_FAILURE.to_string()
            } else {
                String::new()
            };
        };
        let Some(source) = self.rag_sources.get(diary) else {
            return placeholder_failure(&format!("未配置日记本\"{diary}\""));
        };
        if !self.passes_gate(source.as_ref(), diary, query_vec).await {
            return String::new();
        }

        let key = QueryCacheKey {
            user: &context.text,
            ai: &context.ai_text,
            diary,
            mods: "",
            chain: None,
            k_seq: &[],
            group: false,
            auto: false,
            date_bucket: "static",
        };
        if let Some(cached) = self.cached_result(&key) {
            return cached;
        }

        match source.whole_diary_text(diary).await {
            Ok(chunks) => {
                let hits: Vec<SearchHit> =
                    chunks.into_iter().map(|text| SearchHit::semantic(text, 1.0)).collect();
                let rendered = format::render_standard_rag(diary, &hits);
                self.cache_result(&key, rendered.clone());
                rendered
            }
            Err(error) => error.to_placeholder_failure(),
        }
    }

    async fn dispatch_hybrid(&self, diary: &str, mods: &str, context: &QueryContext) -> String {
        let Some(query_vec) = context.vector.as_deref() else {
            return if context.embedding_failed {
                CATASTROPHIC_FAILURE.to_string()
            } else {
                String::new()
            };
        };
        let Some(source) = self.rag_sources.get(diary) else {
            return placeholder_failure(&format!("未配置日记本\"{diary}\""));
        };
        if !self.passes_gate(source.as_ref(), diary, query_vec).await {
            return String::new();
        }
        self.dispatch_rag(diary, mods, context).await
    }

    async fn passes_gate(&self, source: &dyn RagSource, diary: &str, query_vec: &[f32]) -> bool {
        match source.name_vector(diary).await {
            Ok(Some(name_vec)) => {
                cosine_similarity(query_vec, &name_vec) >= self.config.rag_gate_threshold
            }
            // No cached name vector yet: fail open rather than silently
            // dropping every placeholder for a diary that hasn't been
            // embedded.
            Ok(None) => true,
            Err(_) => false,
        }
    }

    async fn dispatch_meta_thinking(&self, params: &str, context: &QueryContext) -> String {
        let (Some(engine), Some(cluster_search)) = (&self.meta_thinking, &self.cluster_search) else {
            return placeholder_failure("未配置元思考链");
        };
        let Some(query_vec) = context.vector.as_deref() else {
            return if context.embedding_failed {
                CATASTROPHIC_FAILURE.to_string()
            } else {
                String::new()
            };
        };
        let parsed = parse_meta_params(params);

        let chain_name = if parsed.auto {
            engine.resolve_auto_chain(query_vec)
        } else {
            match parsed.chain_name {
                Some(name) => name,
                None => return placeholder_failure("未指定思维链名称"),
            }
        };

        let k_sequence = if parsed.k_sequence.is_empty() {
            vec![3]
        } else {
            parsed.k_sequence
        };

        let key = QueryCacheKey {
            user: &context.text,
            ai: &context.ai_text,
            diary: "",
            mods: params,
            chain: Some(&chain_name),
            k_seq: &k_sequence,
            group: false,
            auto: parsed.auto,
            date_bucket: "static",
        };
        if let Some(cached) = self.cached_result(&key) {
            return cached;
        }

        let rendered = match engine.run(&chain_name, &k_sequence, query_vec, cluster_search.as_ref()).await {
            Ok(report) if report.error.is_some() => {
                return meta_thinking_failure(&report.error.unwrap_or_default());
            }
            Ok(report) => format::render_meta_thinking(&report.chain_name, &report.stages),
            Err(crate::error::Error::NotFound(_)) => return chain_not_found(&chain_name),
            Err(error) => return meta_thinking_failure(&error.to_string()),
        };
        self.cache_result(&key, rendered.clone());
        rendered
    }

    /// Cached-lookup helper exposed for callers that want to short-circuit
    /// a repeated query before re-running the whole dispatch pipeline.
    #[must_use]
    pub fn cached_result(&self, key: &QueryCacheKey<'_>) -> Option<String> {
        if !self.config.rag_query_cache_enabled {
            return None;
        }
        self.query_cache.get(key)
    }

    /// Store a rendered result under `key`, when the query cache is enabled.
    pub fn cache_result(&self, key: &QueryCacheKey<'_>, value: String) {
        if self.config.rag_query_cache_enabled {
            self.query_cache.put(key, value);
        }
    }

    /// Current query cache hit/miss counters, for metrics export.
    #[must_use]
    pub fn cache_metrics(&self) -> cache::QueryCacheMetrics {
        self.query_cache.metrics()
    }
}

/// The last non-injection user message and the last assistant message.
/// Messages whose content starts with `[系统邀请指令:]` or `[系统提示:]` are
/// skipped as query source.
fn last_query_context(messages: &[ChatMessage]) -> (Option<String>, Option<String>) {
    let user_text = messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !is_injection(&m.content))
        .map(|m| m.content.clone());
    let assistant_text = messages
        .iter()
        .rev()
        .find(|m| m.role == "assistant")
        .map(|m| m.content.clone());
    (user_text, assistant_text)
}

fn is_injection(content: &str) -> bool {
    content.starts_with("[系统邀请指令:]") || content.starts_with("[系统提示:]")
}

/// Strip HTML tags and common emoji code-point ranges from `text`.
fn strip_noise(text: &str) -> String {
    let without_html = strip_html(text);
    without_html.chars().filter(|c| !is_emoji(*c)).collect()
}

fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F000..=0x1F0FF | 0x2700..=0x27BF | 0xFE00..=0xFE0F
    )
}

/// Dynamic `k`: two length tiers each for user-text length and AI-turn
/// unique-token count, averaged, then multiplied by the modifier's k
/// multiplier, minimum 1. `0, 0` (unknown) resolves to the base tier.
fn dynamic_k(user_text_len: usize, ai_unique_tokens: usize, multiplier: f32) -> usize {
    let user_tier = if user_text_len > 200 { 6 } else { 3 };
    let ai_tier = if ai_unique_tokens > 80 { 6 } else { 3 };
    let base = ((user_tier + ai_tier) as f32) / 2.0;
    ((base * multiplier).round() as i64).max(1) as usize
}

/// Distinct tokens in `text`. Whitespace-delimited runs of ASCII
/// alphanumerics count once each, case-insensitively; everything else (the
/// corpus is mostly whitespace-less CJK text) counts one token per
/// character.
fn unique_token_count(text: &str) -> usize {
    let mut tokens: HashSet<String> = HashSet::new();
    for word in text.split_whitespace() {
        if !word.is_empty() && word.chars().all(|c| c.is_ascii_alphanumeric()) {
            tokens.insert(word.to_ascii_lowercase());
        } else {
            for c in word.chars() {
                tokens.insert(c.to_string());
            }
        }
    }
    tokens.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimension(&self) -> Option<usize> {
            Some(2)
        }
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(crate::error::Error::EmbeddingUnavailable("no credentials".to_string()))
        }
        fn dimension(&self) -> Option<usize> {
            None
        }
    }

    struct FakeSource {
        calls: AtomicUsize,
        name_vec: Option<Vec<f32>>,
    }

    #[async_trait::async_trait]
    impl RagSource for FakeSource {
        async fn name_vector(&self, _diary: &str) -> Result<Option<Vec<f32>>> {
            Ok(self.name_vec.clone())
        }
        async fn search(
            &self,
            _diary: &str,
            _query_vec: &[f32],
            k: usize,
            _tag_weight: Option<f32>,
            _query_tags: &[String],
        ) -> Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..k).map(|i| SearchHit::semantic(format!("hit-{i}"), 1.0)).collect())
        }
        async fn search_with_time(
            &self,
            diary: &str,
            query_vec: &[f32],
            k: usize,
            tag_weight: Option<f32>,
            query_tags: &[String],
            _ranges: &[TimeRange],
        ) -> Result<Vec<SearchHit>> {
            self.search(diary, query_vec, k, tag_weight, query_tags).await
        }
        async fn search_reranked(
            &self,
            diary: &str,
            query_vec: &[f32],
            k: usize,
            tag_weight: Option<f32>,
            query_tags: &[String],
        ) -> Result<Vec<SearchHit>> {
            self.search(diary, query_vec, k, tag_weight, query_tags).await
        }
        async fn whole_diary_text(&self, _diary: &str) -> Result<Vec<String>> {
            Ok(vec!["full text".to_string()])
        }
    }

    fn planner_with(name_vec: Option<Vec<f32>>) -> QueryPlanner {
        let mut sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
        sources.insert(
            "工作".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec }),
        );
        QueryPlanner::new(
            Arc::new(FakeEmbedder),
            sources,
            None,
            None,
            SemanticGroupManager::default(),
            EngineConfig {
                api_url: Some("https://example.com".to_string()),
                api_key: Some("key".to_string()),
                vectordb_dimension: Some(2),
                rag_gate_threshold: 0.5,
                ..EngineConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn standard_rag_placeholder_is_substituted() {
        let planner = planner_with(Some(vec![1.0, 0.0]));
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "context: [[工作日记本]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        assert!(processed[1].content.contains("从\"工作日记本\"中检索到的相关记忆片段"));
    }

    #[tokio::test]
    async fn gate_failure_yields_empty_expansion() {
        let planner = planner_with(Some(vec![0.0, 1.0]));
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "context: [[工作日记本]] end".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        assert_eq!(processed[1].content, "context:  end");
    }

    #[tokio::test]
    async fn repeated_diary_in_one_message_is_circular_reference() {
        let planner = planner_with(Some(vec![1.0, 0.0]));
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "[[工作日记本]] and [[工作日记本]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        assert!(processed[1].content.contains("检测到循环引用"));
    }

    #[tokio::test]
    async fn unconfigured_diary_yields_fixed_failure_string() {
        let planner = planner_with(Some(vec![1.0, 0.0]));
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "[[未知日记本]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        assert!(processed[1].content.starts_with("[处理失败:"));
    }

    #[test]
    fn dynamic_k_respects_multiplier_and_minimum() {
        assert_eq!(dynamic_k(0, 0, 1.0), 3);
        assert_eq!(dynamic_k(500, 200, 1.0), 6);
        assert_eq!(dynamic_k(0, 0, 0.1), 1);
    }

    #[tokio::test]
    async fn embedding_backend_failure_yields_catastrophic_substitution() {
        let mut sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
        sources.insert(
            "工作".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec: Some(vec![1.0, 0.0]) }),
        );
        let planner = QueryPlanner::new(
            Arc::new(FailingEmbedder),
            sources,
            None,
            None,
            SemanticGroupManager::default(),
            EngineConfig {
                api_url: Some("https://example.com".to_string()),
                api_key: Some("key".to_string()),
                vectordb_dimension: Some(2),
                ..EngineConfig::default()
            },
        );
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "[[工作日记本]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        assert_eq!(processed[1].content, CATASTROPHIC_FAILURE);
    }

    #[test]
    fn injection_prefixed_user_messages_are_skipped() {
        assert!(is_injection("[系统邀请指令:] do something"));
        assert!(!is_injection("今天天气不错"));
    }

    #[test]
    fn unique_token_count_treats_cjk_chars_as_individual_tokens() {
        assert_eq!(unique_token_count("你好你好"), 2);
        assert_eq!(unique_token_count("hello hello World"), 2);
        assert_eq!(unique_token_count(""), 0);
    }

    #[test]
    fn dynamic_k_uses_ai_unique_token_count_for_its_tier() {
        let few_tokens = unique_token_count("你好");
        let ninety_distinct_words: Vec<String> = (0..90).map(|i| format!("word{i}")).collect();
        let many_tokens = unique_token_count(&ninety_distinct_words.join(" "));
        assert_eq!(dynamic_k(0, few_tokens, 1.0), 3);
        assert_eq!(dynamic_k(0, many_tokens, 1.0), 5);
    }

    #[tokio::test]
    async fn second_identical_call_hits_the_query_cache() {
        let planner = planner_with(Some(vec![1.0, 0.0]));
        let messages = || {
            vec![
                ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
                ChatMessage {
                    role: "system".to_string(),
                    content: "context: [[工作日记本]]".to_string(),
                },
            ]
        };
        let first = planner.process_system_messages(messages()).await;
        let second = planner.process_system_messages(messages()).await;
        assert_eq!(first[1].content, second[1].content);
        assert_eq!(planner.cache_metrics().hits, 1);
    }

    #[tokio::test]
    async fn ai_memo_without_license_token_is_not_aggregated() {
        let mut sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
        sources.insert(
            "工作".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec: Some(vec![1.0, 0.0]) }),
        );
        sources.insert(
            "生活".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec: Some(vec![1.0, 0.0]) }),
        );
        let planner = QueryPlanner::new(
            Arc::new(FakeEmbedder),
            sources,
            None,
            None,
            SemanticGroupManager::default(),
            EngineConfig {
                api_url: Some("https://example.com".to_string()),
                api_key: Some("key".to_string()),
                vectordb_dimension: Some(2),
                rag_gate_threshold: 0.5,
                ..EngineConfig::default()
            },
        );
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "[[工作日记本<AIMemo>]] [[生活日记本<AIMemo>]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        // Without the license token, both placeholders resolve independently:
        // neither carries the cross-reference substitution.
        assert!(!processed[1].content.contains("已合并至"));
        assert!(processed[1].content.contains("从\"工作日记本\"中检索到的相关记忆片段"));
        assert!(processed[1].content.contains("从\"生活日记本\"中检索到的相关记忆片段"));
    }

    #[tokio::test]
    async fn ai_memo_with_license_aggregates_into_one_combined_call() {
        let mut sources: HashMap<String, Arc<dyn RagSource>> = HashMap::new();
        sources.insert(
            "工作".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec: Some(vec![1.0, 0.0]) }),
        );
        sources.insert(
            "生活".to_string(),
            Arc::new(FakeSource { calls: AtomicUsize::new(0), name_vec: Some(vec![1.0, 0.0]) }),
        );
        let planner = QueryPlanner::new(
            Arc::new(FakeEmbedder),
            sources,
            None,
            None,
            SemanticGroupManager::default(),
            EngineConfig {
                api_url: Some("https://example.com".to_string()),
                api_key: Some("key".to_string()),
                vectordb_dimension: Some(2),
                rag_gate_threshold: 0.5,
                ..EngineConfig::default()
            },
        );
        let messages = vec![
            ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
            ChatMessage {
                role: "system".to_string(),
                content: "[[AIMemo=True]] [[工作日记本<AIMemo>]] [[生活日记本<AIMemo>]]".to_string(),
            },
        ];
        let processed = planner.process_system_messages(messages).await;
        let content = &processed[1].content;
        // The license token itself is stripped.
        assert!(!content.contains("AIMemo=True"));
        // The first member carries both diaries' rendered results.
        assert!(content.contains("从\"工作日记本\"中检索到的相关记忆片段"));
        assert!(content.contains("从\"生活日记本\"中检索到的相关记忆片段"));
        // The second member is replaced by a cross-reference, not a second
        // independent dispatch.
        assert!(content.contains("已合并至\"工作日记本\"的结果中"));
    }
}
