use cqa_core::config::RetrievalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseReason {
    TooShort,
    LinkOnly,
    Boilerplate,
}

/// Screens retrieved chunks that would only add noise to a prompt: fragments,
/// bare links, author bylines and similar page furniture.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    min_chars: usize,
    link_only_max_chars: usize,
    markers: Vec<String>,
    byline_prefixes: Vec<String>,
}

impl NoiseFilter {
    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self {
            min_chars: cfg.min_chunk_chars,
            link_only_max_chars: cfg.link_only_max_chars,
            markers: cfg.boilerplate_markers.clone(),
            byline_prefixes: cfg.byline_prefixes.clone(),
        }
    }

    /// `None` when the chunk is usable.
    pub fn classify(&self, text: &str) -> Option<NoiseReason> {
        let t = text.trim();
        let len = t.chars().count();
        if len < self.min_chars {
            return Some(NoiseReason::TooShort);
        }
        if t.contains("http") && len < self.link_only_max_chars {
            return Some(NoiseReason::LinkOnly);
        }
        if self.markers.iter().any(|m| !m.is_empty() && t.contains(m.as_str()))
            || self
                .byline_prefixes
                .iter()
                .any(|p| !p.is_empty() && t.starts_with(p.as_str()))
        {
            return Some(NoiseReason::Boilerplate);
        }
        None
    }

    pub fn is_noise(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }
}
