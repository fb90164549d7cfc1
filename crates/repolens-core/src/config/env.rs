use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_rag();
        self.apply_env_overrides_runtime();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("REPOLENS_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid REPOLENS_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOLENS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOLENS_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REPOLENS_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("REPOLENS_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !v.trim().is_empty()
        {
            self.llm.api_key = Some(v);
        }
    }

    fn apply_env_overrides_rag(&mut self) {
        if let Ok(v) = std::env::var("REPOLENS_EMBEDDING_DIMENSION")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.embedding_dimension = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_TOP_K")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.top_k = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_OVERSAMPLE_FACTOR")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.oversample_factor = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_CODE_BONUS")
            && let Ok(bonus) = v.parse::<f32>()
        {
            self.rag.code_bonus = bonus;
        }
        if let Ok(v) = std::env::var("REPOLENS_SCORE_THRESHOLD")
            && let Ok(threshold) = v.parse::<f32>()
        {
            self.rag.score_threshold = threshold;
        }
        if let Ok(v) = std::env::var("REPOLENS_MEMORY_BOUND")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.memory_bound = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_CONTEXT_BUDGET")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.context_budget = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_COLLECTION") {
            self.rag.collection_name = v;
        }
    }

    fn apply_env_overrides_runtime(&mut self) {
        if let Ok(v) = std::env::var("REPOLENS_VECTOR_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.vector_store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid REPOLENS_VECTOR_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOLENS_QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REPOLENS_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("REPOLENS_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
        if let Ok(v) = std::env::var("REPOLENS_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.timeouts.max_retries = n;
        }
        if let Ok(v) = std::env::var("REPOLENS_SESSION_IDLE_TTL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.session.idle_ttl_seconds = secs;
        }
    }
}
