use std::sync::LazyLock;

use indoc::formatdoc;
use regex::Regex;

use crate::{messages::ChatMessage, router::ChatRouter};

const FALLBACK_FILENAME: &str = "knowledge_file";

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]").expect("valid regex"));
static REPEATED_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__+").expect("valid regex"));

/// Asks the default model for a snake_case filename describing `previews`.
///
/// Whatever the model answers is sanitized; an empty answer or a failed completion
/// yields `knowledge_file`.
pub async fn generate(router: &ChatRouter, previews: &str) -> String {
    let prompt = formatdoc! {"
        Based on the following file previews, generate a single, short, descriptive, snake_case filename.
        The filename should not include an extension.
        Return ONLY the filename and nothing else. Be concise.

        Previews:
        {previews}
    "};

    match router.collect_text(vec![ChatMessage::user(prompt)], None).await {
        Ok(answer) => sanitize(&answer),
        Err(e) => {
            log::warn!("Filename generation failed, using fallback: {e}");
            FALLBACK_FILENAME.to_string()
        }
    }
}

pub(crate) fn sanitize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace(' ', "_");
    let allowed = DISALLOWED.replace_all(&lowered, "");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&allowed, "_");

    if collapsed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        collapsed.into_owned()
    }
}
