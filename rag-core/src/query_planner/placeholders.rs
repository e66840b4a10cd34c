//! Placeholder discovery: the verbatim `[[...]]` / `<<...>>` / `《《...》》`
//! syntax recognized inside a system-prompt string.

use regex::Regex;
use std::sync::LazyLock;

/// One placeholder occurrence found in a system message, with its byte span
/// in the original text so the planner can splice in a replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    /// `[[<name>日记本<mods>]]` — RAG k-snippet retrieval.
    Rag { diary: String, mods: String, span: (usize, usize) },
    /// `<<<name>日记本>>` — gated whole-diary inclusion.
    GatedInclude { diary: String, span: (usize, usize) },
    /// `《《<name>日记本<mods>》》` — gate then RAG.
    Hybrid { diary: String, mods: String, span: (usize, usize) },
    /// `[[VCP元思考<params>]]` — meta-thinking chain.
    MetaThinking { params: String, span: (usize, usize) },
    /// `[[AIMemo=True]]` — license token, stripped from output.
    AiMemoLicense { span: (usize, usize) },
}

impl Placeholder {
    /// The placeholder's byte span in the text it was found in.
    #[must_use]
    pub fn span(&self) -> (usize, usize) {
        match self {
            Placeholder::Rag { span, .. }
            | Placeholder::GatedInclude { span, .. }
            | Placeholder::Hybrid { span, .. }
            | Placeholder::MetaThinking { span, .. }
            | Placeholder::AiMemoLicense { span } => *span,
        }
    }

    /// The diary name this placeholder targets, if any.
    #[must_use]
    pub fn diary_name(&self) -> Option<&str> {
        match self {
            Placeholder::Rag { diary, .. }
            | Placeholder::GatedInclude { diary, .. }
            | Placeholder::Hybrid { diary, .. } => Some(diary),
            Placeholder::MetaThinking { .. } | Placeholder::AiMemoLicense { .. } => None,
        }
    }
}

static AI_MEMO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[AIMemo=True\]\]").unwrap());
static META_THINKING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[VCP元思考(?P<params>[^\]]*)\]\]").unwrap());
static RAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?P<name>[^\]<]+?)日记本(?P<mods><[^\]]*>)?\]\]").unwrap());
static GATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<(?P<name>[^<>]+?)日记本>>").unwrap());
static HYBRID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"《《(?P<name>[^《》]+?)日记本(?P<mods><[^》]*>)?》》").unwrap());

/// Find every recognized placeholder in `text`, in left-to-right order of
/// first byte.
#[must_use]
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();

    for m in AI_MEMO_RE.find_iter(text) {
        found.push(Placeholder::AiMemoLicense { span: (m.start(), m.end()) });
    }
    for caps in META_THINKING_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let params = caps.name("params").map(|m| m.as_str().to_string()).unwrap_or_default();
        found.push(Placeholder::MetaThinking {
            params,
            span: (whole.start(), whole.end()),
        });
    }
    for caps in RAG_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = caps.name("name").unwrap().as_str().to_string();
        let mods = caps
            .name("mods")
            .map(|m| m.as_str().trim_start_matches('<').trim_end_matches('>').to_string())
            .unwrap_or_default();
        found.push(Placeholder::Rag {
            diary: name,
            mods,
            span: (whole.start(), whole.end()),
        });
    }
    for caps in GATED_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = caps.name("name").unwrap().as_str().to_string();
        found.push(Placeholder::GatedInclude {
            diary: name,
            span: (whole.start(), whole.end()),
        });
    }
    for caps in HYBRID_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = caps.name("name").unwrap().as_str().to_string();
        let mods = caps
            .name("mods")
            .map(|m| m.as_str().trim_start_matches('<').trim_end_matches('>').to_string())
            .unwrap_or_default();
        found.push(Placeholder::Hybrid {
            diary: name,
            mods,
            span: (whole.start(), whole.end()),
        });
    }

    found.sort_by_key(|p| p.span().0);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_standard_rag_placeholder_with_modifiers() {
        let found = find_placeholders("before [[工作日记本<Rerank::TagMemo0.3>]] after");
        assert_eq!(found.len(), 1);
        match &found[0] {
            Placeholder::Rag { diary, mods, .. } => {
                assert_eq!(diary, "工作");
                assert_eq!(mods, "Rerank::TagMemo0.3");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn finds_gated_and_hybrid_and_meta_thinking() {
        let found = find_placeholders(
            "<<生活日记本>> 《《旅行日记本<Time>》》 [[VCP元思考:Auto:0.7:1-2]]",
        );
        assert_eq!(found.len(), 3);
        assert!(matches!(found[0], Placeholder::GatedInclude { .. }));
        assert!(matches!(found[1], Placeholder::Hybrid { .. }));
        assert!(matches!(found[2], Placeholder::MetaThinking { .. }));
    }

    #[test]
    fn ai_memo_license_token_is_found() {
        let found = find_placeholders("[[AIMemo=True]]");
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0], Placeholder::AiMemoLicense { .. }));
    }
}
