/// Removes `<think>...</think>` blocks emitted by reasoning models. An
/// unclosed block swallows the rest of the text.
pub(crate) fn strip_think_blocks(input: &str) -> String {
    let mut cleaned = input.to_string();

    while let Some(think_start) = cleaned.find("<think>") {
        if let Some(think_end_pos) = cleaned[think_start..].find("</think>") {
            let absolute_end = think_start + think_end_pos + "</think>".len();
            cleaned.replace_range(think_start..absolute_end, "");
        } else {
            cleaned.replace_range(think_start.., "");
            break;
        }
    }

    cleaned
}

/// First balanced JSON object in a model reply, ignoring think blocks,
/// code fences and surrounding prose.
pub(crate) fn extract_json_object(input: &str) -> Option<String> {
    let cleaned = strip_think_blocks(input);
    let trimmed = cleaned.trim();
    let start = trimmed.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (idx, ch) in trimmed[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + idx);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end?;
    Some(trimmed[start..=end].to_string())
}
