//! Pure views of a conversation snapshot: a terminal transcript and an HTML page.
//!
//! Nothing here mutates state, so rendering the same snapshot twice gives the same output.

use crate::chat::ConversationSnapshot;
use crate::types::{ChatMessage, MessageContent, Sender};
use comrak::plugins::syntect::SyntectAdapter;
use comrak::{ComrakOptions, ComrakPlugins, markdown_to_html_with_plugins};
use once_cell::sync::Lazy;
use std::fmt::Write;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

pub const ASSISTANT_NAME: &str = "Gemini";
pub const USER_NAME: &str = "Вы";
pub const TYPING_TEXT: &str = "Gemini печатает…";

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour padding:zero]:[minute padding:zero]");

const CODE_LANGUAGE: &str = "python";
const INLINE_IMAGE_PREVIEW: usize = 48;

static MARKDOWN_OPTIONS: Lazy<ComrakOptions> = Lazy::new(|| {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.footnotes = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options
});

const PAGE_STYLE: &str = r#"
body { background: #0b0e1a; color: #e5e7eb; font-family: system-ui, sans-serif; margin: 0; }
.chat-list { max-width: 48rem; margin: 0 auto; padding: 1.5rem 1rem; display: flex; flex-direction: column; gap: 1rem; }
.message-row { display: flex; }
.message-row.user { justify-content: flex-end; }
.bubble { max-width: 75%; padding: 0.75rem 1rem; border-radius: 1rem; }
.bubble.assistant { background: rgba(255,255,255,0.06); border: 1px solid #374151; border-top-left-radius: 0; }
.bubble.user { background: linear-gradient(135deg, #2563eb, #c026d3); border-top-right-radius: 0; }
.bubble img { max-width: 100%; border-radius: 0.5rem; }
.code-output { background: #1f2937; border-radius: 0.5rem; padding: 0.75rem; white-space: pre-wrap; }
.message-meta { font-size: 0.75rem; color: #9ca3af; margin-top: 0.25rem; }
.typing-indicator { color: #9ca3af; font-style: italic; }
"#;

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    let mut datetime = timestamp;
    if let Ok(offset) = UtcOffset::current_local_offset() {
        datetime = datetime.to_offset(offset);
    }
    datetime.format(MESSAGE_TIME_FORMAT).unwrap_or_default()
}

fn sender_name(sender: Sender) -> &'static str {
    match sender {
        Sender::User => USER_NAME,
        Sender::Assistant => ASSISTANT_NAME,
    }
}

fn sender_class(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Assistant => "assistant",
    }
}

// ============================================
// Terminal
// ============================================

/// One message as terminal text, ending with a blank line.
pub fn render_message(message: &ChatMessage) -> String {
    let mut out = format!(
        "[{}] {}:\n",
        format_timestamp(message.timestamp),
        sender_name(message.sender)
    );
    if !message.text.is_empty() {
        out.push_str(&message.text);
        out.push('\n');
    }
    match &message.content {
        MessageContent::Text => {}
        MessageContent::Image { data } => {
            out.push_str(&describe_image(data));
            out.push('\n');
        }
        MessageContent::Code { code, output } => {
            out.push_str("┌─ код\n");
            push_indented(&mut out, code);
            out.push_str("├─ результат\n");
            push_indented(&mut out, output);
            out.push_str("└─\n");
        }
    }
    out.push('\n');
    out
}

fn push_indented(out: &mut String, block: &str) {
    for line in block.lines() {
        out.push_str("│ ");
        out.push_str(line);
        out.push('\n');
    }
}

fn describe_image(data: &str) -> String {
    if data.starts_with("http://") || data.starts_with("https://") {
        return format!("[изображение: {data}]");
    }
    let preview: String = data.chars().take(INLINE_IMAGE_PREVIEW).collect();
    format!("[изображение: {preview}… ({} символов)]", data.chars().count())
}

/// The whole conversation as terminal text, with a typing line while a reply is pending.
pub fn transcript(snapshot: &ConversationSnapshot) -> String {
    let mut out: String = snapshot.messages.iter().map(render_message).collect();
    if snapshot.awaiting_response {
        out.push_str(TYPING_TEXT);
        out.push('\n');
    }
    out
}

// ============================================
// HTML
// ============================================

// Loading syntect's syntax and theme sets dominates a render, so do it once
static SYNTAX_ADAPTER: Lazy<SyntectAdapter> =
    Lazy::new(|| SyntectAdapter::new(Some("base16-ocean.dark")));

pub fn markdown_to_html(md: &str) -> String {
    let mut plugins = ComrakPlugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&*SYNTAX_ADAPTER);
    markdown_to_html_with_plugins(md, &MARKDOWN_OPTIONS, &plugins)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A fence longer than any backtick run inside `code`.
fn code_fence(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn message_body_html(message: &ChatMessage) -> String {
    let text = match message.sender {
        Sender::Assistant => markdown_to_html(&message.text),
        Sender::User => format!("<p>{}</p>\n", escape_html(&message.text)),
    };

    match &message.content {
        MessageContent::Text => text,
        MessageContent::Image { data } => format!(
            "{text}<img src=\"{}\" alt=\"Generated content\">\n",
            escape_html(data)
        ),
        MessageContent::Code { code, output } => {
            let fence = code_fence(code);
            let highlighted =
                markdown_to_html(&format!("{fence}{CODE_LANGUAGE}\n{code}\n{fence}\n"));
            format!(
                "{text}<div class=\"code-source\">{highlighted}</div>\n<pre class=\"code-output\">{}</pre>\n",
                escape_html(output)
            )
        }
    }
}

pub fn render_message_html(message: &ChatMessage) -> String {
    let class = sender_class(message.sender);
    format!(
        "<div class=\"message-row {class}\" data-id=\"{}\">\n<div class=\"bubble {class}\">\n<div class=\"md\">{}</div>\n<div class=\"message-meta\"><span class=\"message-timestamp\">{}</span></div>\n</div>\n</div>\n",
        message.id,
        message_body_html(message),
        format_timestamp(message.timestamp),
    )
}

/// Standalone HTML page for the conversation.
pub fn html_document(snapshot: &ConversationSnapshot) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html lang=\"ru\">\n<head>\n<meta charset=\"utf-8\">\n<title>Gemini</title>\n",
    );
    let _ = write!(page, "<style>{PAGE_STYLE}</style>\n</head>\n<body>\n<main class=\"chat-list\">\n");
    for message in &snapshot.messages {
        page.push_str(&render_message_html(message));
    }
    if snapshot.awaiting_response {
        let _ = writeln!(page, "<div class=\"typing-indicator\">{TYPING_TEXT}</div>");
    }
    page.push_str("</main>\n</body>\n</html>\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(messages: Vec<ChatMessage>, awaiting_response: bool) -> ConversationSnapshot {
        ConversationSnapshot {
            messages,
            awaiting_response,
        }
    }

    fn sample() -> ConversationSnapshot {
        snapshot(
            vec![
                ChatMessage::assistant("**Привет**"),
                ChatMessage::user("<script>alert(1)</script>"),
                ChatMessage::assistant_image("картинка", "data:image/png;base64,AAAA"),
                ChatMessage::assistant_code("код", "print(2 + 2)", "4"),
            ],
            true,
        )
    }

    #[test]
    fn rendering_is_idempotent() {
        let state = sample();
        assert_eq!(transcript(&state), transcript(&state));
        assert_eq!(html_document(&state), html_document(&state));
    }

    #[test]
    fn transcript_shows_typing_only_while_awaiting() {
        let mut state = sample();
        assert!(transcript(&state).ends_with(&format!("{TYPING_TEXT}\n")));
        state.awaiting_response = false;
        assert!(!transcript(&state).contains(TYPING_TEXT));
    }

    #[test]
    fn terminal_code_block_has_source_and_output() {
        let rendered = render_message(&ChatMessage::assistant_code("код", "x = 1\nprint(x)", "1"));
        assert!(rendered.contains("│ x = 1\n│ print(x)\n"));
        assert!(rendered.contains("├─ результат\n│ 1\n"));
    }

    #[test]
    fn terminal_image_is_summarized() {
        let data = format!("data:image/png;base64,{}", "A".repeat(500));
        let rendered = render_message(&ChatMessage::assistant_image("img", data.as_str()));
        assert!(!rendered.contains(&data));
        assert!(rendered.contains("522 символов"));

        let url = render_message(&ChatMessage::assistant_image("img", "https://x.test/a.png"));
        assert!(url.contains("[изображение: https://x.test/a.png]"));
    }

    #[test]
    fn html_escapes_user_text_and_renders_markdown() {
        let html = html_document(&sample());
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<strong>Привет</strong>"));
        assert!(html.contains("<img src=\"data:image/png;base64,AAAA\""));
        assert!(html.contains("<pre class=\"code-output\">4</pre>"));
        assert!(html.contains("typing-indicator"));
    }

    #[test]
    fn highlighting_is_shared_across_threads() {
        let md = "```rust\nfn main() {}\n```";
        let first = markdown_to_html(md);
        assert!(first.contains("style=\""));
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(move || markdown_to_html(md)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), first);
        }
    }

    #[test]
    fn fence_outgrows_backticks_in_code() {
        assert_eq!(code_fence("print(1)"), "```");
        assert_eq!(code_fence("s = '````'"), "`````");
    }
}
