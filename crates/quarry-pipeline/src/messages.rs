//! Responder prompt assembly
//!
//! Historical citations and fresh search results are rendered as plain text,
//! never as tool-call / tool-result pairs: the responder is invoked with no
//! tool schema configured, and feeding it tool syntax makes some models echo
//! that syntax in their reply.

use quarry_core::{Annotation, ApiFormat, ChatMessage, ExecutedSearch, ProxyRequest, Role};

/// Instruction appended after rendered search results
pub const CITATION_INSTRUCTION: &str = "Use these search results to answer. When you use \
information from a source and you think it's important to cite the provided source, cite it \
using lenticular brackets like 【1】, 【2】, etc. Do not overuse citations.";

/// Assemble the responder's input from the original messages plus cleaned
/// search results.
pub fn build_responder_messages(
    request: &ProxyRequest,
    user_query: Option<&str>,
    searches: &[ExecutedSearch],
) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    if request.format == ApiFormat::Responses && request.messages.is_empty() {
        messages.push(ChatMessage::user(user_query.unwrap_or_default()));
    } else {
        for msg in &request.messages {
            match msg.role {
                Role::System => messages.push(ChatMessage::system(msg.text())),
                // raw payload through verbatim: multimodal parts survive
                Role::User => {
                    messages.push(ChatMessage::with_content(Role::User, msg.content.clone()))
                }
                Role::Assistant => match msg.annotations.as_deref() {
                    Some(annotations) if !annotations.is_empty() => {
                        let text =
                            format!("{}\n\n{}", msg.text(), render_sources(annotations));
                        messages.push(ChatMessage::assistant(text));
                    }
                    _ => messages
                        .push(ChatMessage::with_content(Role::Assistant, msg.content.clone())),
                },
            }
        }
    }

    if !searches.is_empty() {
        messages.push(ChatMessage::user(render_search_block(searches)));
    }

    messages
}

/// Historical citations as a plain-text block
fn render_sources(annotations: &[Annotation]) -> String {
    let mut out = String::from("Sources used:\n");
    for (i, annotation) in annotations.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} ({})\n",
            i + 1,
            annotation.title,
            annotation.url
        ));
    }
    out.trim_end().to_string()
}

/// Fresh search results as one numbered block followed by the citation
/// instruction. Numbering is continuous across searches, matching the flat
/// annotation list.
pub fn render_search_block(searches: &[ExecutedSearch]) -> String {
    let mut out = String::new();
    let mut index = 0;
    for search in searches {
        for result in &search.results {
            index += 1;
            out.push_str(&format!(
                "【{index}】 {}\n{}\n{}\n\n",
                result.title, result.url, result.content
            ));
        }
    }
    out.push_str(CITATION_INSTRUCTION);
    out
}
