use crate::types::{Attachment, UserInput};
use std::fmt;

pub const GENERATE_COMMAND: &str = "/generate";
pub const GENERATE_KEYWORD: &str = "сгенерировать";
const DIRECTIVE_TOKENS: [&str; 2] = [GENERATE_COMMAND, GENERATE_KEYWORD];

pub const FALLBACK_PROMPT: &str = "abstract art";
pub const DEFAULT_QUESTION: &str = "Что изображено на этой картинке?";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Text,
    ImageGeneration,
    ImageAnalysis,
    CodeExecution,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flow::Text => "text",
            Flow::ImageGeneration => "image-generation",
            Flow::ImageAnalysis => "image-analysis",
            Flow::CodeExecution => "code-execution",
        };
        f.write_str(name)
    }
}

/// A classified user action with everything its gateway call needs.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    Text { message: String },
    GenerateImage { prompt: String, echo: String },
    AnalyzeImage { file: Attachment, question: String },
    ExecuteCode { program: String },
}

impl Route {
    pub fn flow(&self) -> Flow {
        match self {
            Route::Text { .. } => Flow::Text,
            Route::GenerateImage { .. } => Flow::ImageGeneration,
            Route::AnalyzeImage { .. } => Flow::ImageAnalysis,
            Route::ExecuteCode { .. } => Flow::CodeExecution,
        }
    }

    /// Text of the optimistic user message.
    pub fn echo(&self) -> &str {
        match self {
            Route::Text { message } => message,
            Route::GenerateImage { echo, .. } => echo,
            Route::AnalyzeImage { question, .. } => question,
            Route::ExecuteCode { program } => program,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("nothing to send")]
    EmptyInput,
}

/// Classify one user action into exactly one flow.
pub fn route(input: UserInput) -> Result<Route, DispatchError> {
    let UserInput {
        text,
        attachment,
        question,
    } = input;
    let text = text.trim();

    let Some(file) = attachment else {
        if text.is_empty() {
            return Err(DispatchError::EmptyInput);
        }
        return Ok(match generation_prompt(text) {
            Some(prompt) => Route::GenerateImage {
                prompt,
                echo: text.to_string(),
            },
            None => Route::Text {
                message: text.to_string(),
            },
        });
    };

    if let Some(prompt) = generation_prompt(text) {
        return Ok(Route::GenerateImage {
            echo: prompt.clone(),
            prompt,
        });
    }

    if file.is_image() {
        let question = question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| DEFAULT_QUESTION.to_string());
        return Ok(Route::AnalyzeImage { file, question });
    }

    let program = if text.is_empty() {
        String::from_utf8_lossy(&file.bytes).trim().to_string()
    } else {
        text.to_string()
    };
    if program.is_empty() {
        return Err(DispatchError::EmptyInput);
    }
    Ok(Route::ExecuteCode { program })
}

/// If `text` carries a generation directive, the prompt left once it is stripped.
///
/// A leading `/generate` command is matched first; otherwise the first directive
/// token found anywhere (case-insensitive) is removed.
pub fn generation_prompt(text: &str) -> Option<String> {
    let text = text.trim();

    if let Some(rest) = strip_prefix_ci(text, GENERATE_COMMAND) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(finish_prompt(rest));
        }
    }

    let (start, end) = DIRECTIVE_TOKENS
        .iter()
        .filter_map(|token| find_ci(text, token))
        .min_by_key(|(start, _)| *start)?;
    let mut remaining = String::with_capacity(text.len());
    remaining.push_str(&text[..start]);
    remaining.push_str(&text[end..]);
    Some(finish_prompt(&remaining))
}

fn finish_prompt(raw: &str) -> String {
    let prompt = raw.trim();
    if prompt.is_empty() {
        FALLBACK_PROMPT.to_string()
    } else {
        prompt.to_string()
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    match find_ci(text, prefix) {
        Some((0, end)) => Some(&text[end..]),
        _ => None,
    }
}

/// Byte range of the first case-insensitive match of a lowercase `needle`.
fn find_ci(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    haystack.char_indices().find_map(|(start, _)| {
        let mut rest = haystack[start..].char_indices();
        for expected in needle.chars() {
            let (_, actual) = rest.next()?;
            if !actual.to_lowercase().eq(std::iter::once(expected)) {
                return None;
            }
        }
        let end = rest
            .next()
            .map(|(offset, _)| start + offset)
            .unwrap_or(haystack.len());
        Some((start, end))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> Attachment {
        Attachment::new("cat.png", "image/png", vec![0x89, b'P', b'N', b'G'])
    }

    fn script() -> Attachment {
        Attachment::new("main.py", "text/plain", b"print('from file')".to_vec())
    }

    #[test]
    fn plain_text_goes_to_text_flow() {
        let route = route(UserInput::text("  hello there ")).unwrap();
        assert_eq!(
            route,
            Route::Text {
                message: "hello there".into()
            }
        );
        assert_eq!(route.echo(), "hello there");
    }

    #[test]
    fn blank_text_is_rejected() {
        assert_eq!(route(UserInput::text("   \n\t")), Err(DispatchError::EmptyInput));
        assert_eq!(route(UserInput::default()), Err(DispatchError::EmptyInput));
    }

    #[test]
    fn generate_command_strips_directive() {
        let route = route(UserInput::text("/generate sunset over mountains")).unwrap();
        assert_eq!(
            route,
            Route::GenerateImage {
                prompt: "sunset over mountains".into(),
                echo: "/generate sunset over mountains".into(),
            }
        );
    }

    #[test]
    fn bare_generate_uses_fallback_prompt() {
        assert_eq!(generation_prompt("/generate"), Some(FALLBACK_PROMPT.into()));
        assert_eq!(generation_prompt("  /GENERATE   "), Some(FALLBACK_PROMPT.into()));
    }

    #[test]
    fn directive_anywhere_is_detected() {
        assert_eq!(
            generation_prompt("please /generate a red fox"),
            Some("please  a red fox".into())
        );
        assert_eq!(
            generation_prompt("Сгенерировать кота в шляпе"),
            Some("кота в шляпе".into())
        );
        assert_eq!(generation_prompt("generate me a poem"), None);
        assert_eq!(generation_prompt("just chatting"), None);
    }

    #[test]
    fn image_upload_without_directive_is_analysis() {
        let route = route(UserInput::upload("", png())).unwrap();
        assert_eq!(
            route,
            Route::AnalyzeImage {
                file: png(),
                question: DEFAULT_QUESTION.into(),
            }
        );
    }

    #[test]
    fn analysis_keeps_supplied_question() {
        let input = UserInput::upload("", png()).with_question("Сколько здесь котов?");
        let route = route(input).unwrap();
        assert_eq!(route.flow(), Flow::ImageAnalysis);
        assert_eq!(route.echo(), "Сколько здесь котов?");

        let blank = UserInput::upload("", png()).with_question("  ");
        assert_eq!(route_echo(blank), DEFAULT_QUESTION);
    }

    fn route_echo(input: UserInput) -> String {
        route(input).unwrap().echo().to_string()
    }

    #[test]
    fn upload_with_directive_generates() {
        let route = route(UserInput::upload("/generate a lighthouse", png())).unwrap();
        assert_eq!(
            route,
            Route::GenerateImage {
                prompt: "a lighthouse".into(),
                echo: "a lighthouse".into(),
            }
        );

        let from_script = super::route(UserInput::upload("сгенерировать", script())).unwrap();
        assert_eq!(from_script.flow(), Flow::ImageGeneration);
        assert_eq!(from_script.echo(), FALLBACK_PROMPT);
    }

    #[test]
    fn non_image_upload_executes_input_text() {
        let route = route(UserInput::upload("print(2 + 2)", script())).unwrap();
        assert_eq!(
            route,
            Route::ExecuteCode {
                program: "print(2 + 2)".into()
            }
        );
    }

    #[test]
    fn non_image_upload_falls_back_to_file_contents() {
        let route = route(UserInput::upload("  ", script())).unwrap();
        assert_eq!(route.echo(), "print('from file')");

        let empty = Attachment::new("empty.txt", "text/plain", Vec::new());
        assert_eq!(
            super::route(UserInput::upload("", empty)),
            Err(DispatchError::EmptyInput)
        );
    }

    #[test]
    fn case_insensitive_find_handles_multibyte() {
        assert_eq!(find_ci("ab/GENERATE", "/generate"), Some((2, 11)));
        let text = "ну СГЕНЕРИРОВАТЬ";
        let (start, end) = find_ci(text, GENERATE_KEYWORD).unwrap();
        assert_eq!(&text[start..end], "СГЕНЕРИРОВАТЬ");
        assert_eq!(find_ci("/gen", "/generate"), None);
    }
}
