//! Extraction prompt for the knowledge-graph model.
//!
//! The prompt fixes the structural contract only: strict JSON with an
//! `entities` array and a `relations` array whose endpoints name entities of
//! the same answer. Everything the model returns is still validated in
//! [`crate::pipeline::repair`], so the prompt is a request, not a guarantee.
//!
//! Callers can override the template via
//! [`crate::config::ExtractionConfig::prompt_template`]; it must contain the
//! `{text}` placeholder and may contain `{formulas}`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Placeholder replaced with the chunk text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Placeholder replaced with newline-joined formula candidates.
pub const FORMULAS_PLACEHOLDER: &str = "{formulas}";

/// Default extraction prompt (textbooks are mostly Chinese; relation labels are
/// the store's vocabulary and pass through as opaque strings).
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"你是知识图谱抽取器。请根据输入教材片段（文本、图片、公式候选）抽取知识图谱。
输出必须是严格 JSON，不要输出 markdown。
JSON schema:
{
  "entities": [
    {"name": "", "type": "Concept|Person|Method|Formula|Term|Other", "description": ""}
  ],
  "relations": [
    {"source": "", "target": "", "type": "定义|包含|推导|应用于|相关于|前置于", "evidence": ""}
  ]
}
要求：
1) 实体 name 去重，保持教材术语原文。
2) 关系中的 source/target 必须出现在 entities.name 中。
3) 如果信息不足，返回空数组而不是编造。

片段文本:
{text}

公式候选:
{formulas}"#;

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{text\}|\{formulas\}").expect("placeholder pattern is valid"));

/// Fill `template` with the chunk text and formula candidates.
///
/// One pass over the template substitutes the first occurrence of each
/// placeholder; later occurrences and anything inside the substituted values
/// are left as written.
pub fn build_prompt(template: &str, text: &str, formulas: &[String]) -> String {
    let formulas = formulas.join("\n");
    let (mut text_done, mut formulas_done) = (false, false);
    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[0] {
            TEXT_PLACEHOLDER if !text_done => {
                text_done = true;
                text.to_string()
            }
            FORMULAS_PLACEHOLDER if !formulas_done => {
                formulas_done = true;
                formulas.clone()
            }
            other => other.to_string(),
        })
        .into_owned()
}
