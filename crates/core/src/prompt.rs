//! Character prompt extraction and the txt2img prompt templates.
//!
//! A step's `input_query` is either free text or a JSON object describing
//! a character. Objects are flattened into `key: value` lines before being
//! wrapped in the photographic prompt template.

/// Prefix prepended to every character prompt.
pub const PROMPT_PREFIX: &str = "photo of ";

/// Style suffix appended to every character prompt.
pub const PROMPT_STYLE_SUFFIX: &str = " (cinematic lighting:1.1) dynamic angle, highest quality,  (movie poster pose), analog style, high-resolution, detailed, concept art";

/// Negative prompt applied to every generation.
pub const NEGATIVE_PROMPT: &str = "(nude), breasts, photoshop, airbrush, kitsch, oversaturated, low-res, Deformed, bad anatomy, disfigured, poorly drawn face, mutation, mutated, extra limb,poorly drawn hands, missing limb, floating limbs, disconnected limbs, malformed hands, long neck, long body, disgusting, poorly drawn, mutilated, mangled, conjoined twins, extra legs, extra arms, meme, deformed, elongated, strabismus, heterochromia, watermark, extra fingers, blind eyes, dead eyes";

/// Extract the character prompt from a step's `input_query`.
///
/// - Text wrapped in `{` … `}` is parsed as a JSON object and rendered as
///   `key: value` lines (string values unquoted, document order kept).
///   Unparseable objects yield an empty prompt.
/// - Anything else is returned unchanged.
///
/// Callers treat an empty (or whitespace-only) result as "no character
/// data".
pub fn character_prompt(input_query: &str) -> String {
    let trimmed = input_query.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return input_query.to_string();
    }

    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(trimmed) {
        Ok(fields) => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", render_value(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => String::new(),
    }
}

/// True when the prompt carries no usable character data.
pub fn is_blank(prompt: &str) -> bool {
    prompt.trim().is_empty()
}

/// Wrap a character prompt in the photographic style template.
pub fn positive_prompt(character: &str) -> String {
    format!("{PROMPT_PREFIX}{character}{PROMPT_STYLE_SUFFIX}")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(character_prompt("a knight in armor"), "a knight in armor");
    }

    #[test]
    fn json_object_is_flattened_in_document_order() {
        let input = r#"{"name": "Aria", "class": "ranger", "age": 27, "armor": true}"#;
        assert_eq!(
            character_prompt(input),
            "name: Aria\nclass: ranger\nage: 27\narmor: true"
        );
    }

    #[test]
    fn nested_values_keep_json_form() {
        let input = r#"{"gear": ["bow", "cloak"]}"#;
        assert_eq!(character_prompt(input), r#"gear: ["bow","cloak"]"#);
    }

    #[test]
    fn malformed_json_object_yields_empty_prompt() {
        assert_eq!(character_prompt("{not json}"), "");
        assert!(is_blank(&character_prompt("{not json}")));
    }

    #[test]
    fn braces_only_inside_text_are_not_json() {
        let input = "a knight {with} a shield";
        assert_eq!(character_prompt(input), input);
    }

    #[test]
    fn empty_input_is_blank() {
        assert!(is_blank(&character_prompt("")));
        assert!(is_blank(&character_prompt("   ")));
        assert!(is_blank(&character_prompt("{}")));
    }

    #[test]
    fn positive_prompt_wraps_character() {
        let prompt = positive_prompt("a knight in armor");
        assert!(prompt.starts_with("photo of a knight in armor (cinematic lighting:1.1)"));
        assert!(prompt.ends_with("concept art"));
    }
}
