//! Response parsing for LLM outputs.
//!
//! Extracts SQL from LLM responses that may contain markdown code blocks.

/// Extracts the SQL text from a generator response.
///
/// Looks for SQL in the following formats, in order:
/// - ```sql ... ```
/// - ``` ... ``` (no language specified)
/// - the whole response
///
/// If multiple code blocks are found, uses the first one. Returns None if
/// nothing but whitespace remains. The result is not trusted in any way;
/// it still has to pass validation.
pub fn extract_sql(response: &str) -> Option<String> {
    let sql = extract_code_block(response, "sql")
        .or_else(|| extract_code_block(response, ""))
        .unwrap_or_else(|| response.to_string());

    let sql = sql.trim();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

/// Extracts content from a markdown code block with the specified language.
///
/// Pass an empty string for `lang` to match blocks without a language
/// specifier. The language tag is matched case-insensitively.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find("```") {
        let fence_start = search_from + offset;
        let after_fence = fence_start + 3;
        let line_end = after_fence + text[after_fence..].find('\n')?;
        let tag = text[after_fence..line_end].trim();

        if tag.eq_ignore_ascii_case(lang) {
            let content_start = line_end + 1;
            let end = text[content_start..].find("```")?;
            return Some(text[content_start..content_start + end].to_string());
        }

        // Skip over this whole block so its closing fence is not mistaken for an opening one.
        let content_start = line_end + 1;
        let close = text[content_start..].find("```")?;
        search_from = content_start + close + 3;
    }

    None
}
