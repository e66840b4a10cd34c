//! Renders retrieval results into the fixed, wire-stable human-readable
//! framings substituted in place of a placeholder.

use crate::meta_thinking::StageReport;
use crate::semantic_group::GroupActivation;
use crate::types::{SearchHit, TimeRange};
use std::fmt::Write as _;

/// `\n[--- 从"<name>日记本"中检索到的相关记忆片段 ---]\n` ... `\n[--- 记忆片段结束 ---]\n`
#[must_use]
pub fn render_standard_rag(name: &str, hits: &[SearchHit]) -> String {
    let mut out = format!("\n[--- 从\"{name}日记本\"中检索到的相关记忆片段 ---]\n");
    for hit in hits {
        let _ = writeln!(out, "* {}", hit.text);
    }
    out.push_str("\n[--- 记忆片段结束 ---]\n");
    out
}

/// Time-aware combined framing: range headers, a statistics line, then
/// semantic and time-sourced bullets (time bullets sorted date-desc).
#[must_use]
pub fn render_time_aware(
    name: &str,
    ranges: &[TimeRange],
    semantic_hits: &[SearchHit],
    time_hits: &[SearchHit],
) -> String {
    let mut out = format!("\n[--- \"{name}日记本\" 多时间感知检索结果 ---]\n");
    for range in ranges {
        let _ = writeln!(
            out,
            "[时间范围: {} ~ {}]",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        );
    }
    let _ = writeln!(
        out,
        "[统计: 语义匹配 {} 条, 时间匹配 {} 条]",
        semantic_hits.len(),
        time_hits.len()
    );

    out.push_str("【语义相关记忆】\n");
    for hit in semantic_hits {
        let _ = writeln!(out, "* {}", hit.text);
    }

    let mut sorted_time_hits = time_hits.to_vec();
    sorted_time_hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out.push_str("【时间范围记忆】\n");
    for hit in &sorted_time_hits {
        let _ = writeln!(out, "* {}", hit.text);
    }

    out.push_str("\n[--- 检索结束 ---]\n");
    out
}

/// Group-enhanced framing: activated groups with their activation
/// percentage and matched words, followed by the enhanced hit bullets.
#[must_use]
pub fn render_group_enhanced(name: &str, activations: &[GroupActivation], hits: &[SearchHit]) -> String {
    let mut out = format!("\n[--- \"{name}日记本\" 语义组增强检索结果 ---]\n");
    out.push_str("[激活的语义组:]\n");
    for activation in activations {
        let _ = writeln!(
            out,
            "* {} ({:.0}%): {}",
            activation.group_name,
            activation.activation * 100.0,
            activation.matched_words.join(", ")
        );
    }
    for hit in hits {
        let _ = writeln!(out, "* {}", hit.text);
    }
    out.push_str("\n[--- 记忆片段结束 ---]\n");
    out
}

/// Meta-thinking framing: one `【阶段N: <cluster>】` block per stage, with an
/// optional `[降级模式]` marker on degraded stages.
#[must_use]
pub fn render_meta_thinking(chain_name: &str, stages: &[StageReport]) -> String {
    let mut out = format!("\n[--- VCP元思考链: \"{chain_name}\" ---]\n");
    for (idx, stage) in stages.iter().enumerate() {
        let _ = writeln!(out, "【阶段{}: {}】", idx + 1, stage.cluster);
        if stage.degraded {
            out.push_str("[降级模式]\n");
        }
        for hit in &stage.hits {
            let _ = writeln!(out, "* {}", hit.text);
        }
    }
    out.push_str("\n[--- 元思考链结束 ---]\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rag_has_opening_and_closing_markers() {
        let hits = vec![SearchHit::semantic("hello", 0.9)];
        let rendered = render_standard_rag("工作", &hits);
        assert!(rendered.starts_with("\n[--- 从\"工作日记本\"中检索到的相关记忆片段 ---]\n"));
        assert!(rendered.trim_end().ends_with("[--- 记忆片段结束 ---]"));
        assert!(rendered.contains("* hello"));
    }

    #[test]
    fn meta_thinking_marks_degraded_stages() {
        let stages = vec![StageReport {
            cluster: "a".to_string(),
            hits: vec![],
            degraded: true,
        }];
        let rendered = render_meta_thinking("default", &stages);
        assert!(rendered.contains("【阶段1: a】"));
        assert!(rendered.contains("[降级模式]"));
    }
}
