//! Parsing of REPL lines into commands, and loading of attachments from disk.

use crate::types::{Attachment, UserInput};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const HELP_TEXT: &str = "\
Команды:
  <текст>                 отправить сообщение
  /generate <описание>    сгенерировать изображение
  /attach <файл> [текст]  отправить файл: картинку для анализа (текст = вопрос),
                          другой файл для выполнения кода (текст = программа)
  /status                 состояние подключения к API
  /help                   эта справка
  /quit                   выход";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Send(String),
    Attach { path: PathBuf, text: String },
    Status,
    Help,
    Quit,
}

/// Interpret one input line. Lines that are not a known command are sent as-is,
/// so `/generate ...` reaches the router untouched.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let trimmed = line.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };

    match head {
        "/quit" | "/exit" => Ok(Command::Quit),
        "/help" => Ok(Command::Help),
        "/status" => Ok(Command::Status),
        "/attach" => {
            let (path, text) = match rest.split_once(char::is_whitespace) {
                Some((path, text)) => (path, text.trim()),
                None => (rest, ""),
            };
            if path.is_empty() {
                return Err("usage: /attach <file> [text]".to_string());
            }
            Ok(Command::Attach {
                path: PathBuf::from(path),
                text: text.to_string(),
            })
        }
        _ => Ok(Command::Send(line.to_string())),
    }
}

/// Read a file and guess its content type from the extension.
pub async fn load_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(Attachment::new(file_name, content_type, bytes))
}

/// Build the user action for an attachment. The trailing text doubles as the
/// analysis question for images.
pub fn attachment_input(attachment: Attachment, text: &str) -> UserInput {
    let input = UserInput::upload(text, attachment);
    if text.trim().is_empty() {
        input
    } else {
        input.with_question(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_sent() {
        assert_eq!(parse_command("hello"), Ok(Command::Send("hello".into())));
        assert_eq!(
            parse_command("/generate a fox"),
            Ok(Command::Send("/generate a fox".into()))
        );
    }

    #[test]
    fn recognises_control_commands() {
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command("  /exit "), Ok(Command::Quit));
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("/status"), Ok(Command::Status));
    }

    #[test]
    fn attach_splits_path_and_text() {
        assert_eq!(
            parse_command("/attach ./cat.png что это?"),
            Ok(Command::Attach {
                path: PathBuf::from("./cat.png"),
                text: "что это?".into(),
            })
        );
        assert_eq!(
            parse_command("/attach main.py"),
            Ok(Command::Attach {
                path: PathBuf::from("main.py"),
                text: String::new(),
            })
        );
        assert!(parse_command("/attach").is_err());
    }

    #[test]
    fn attachment_text_becomes_question() {
        let file = Attachment::new("a.png", "image/png", vec![1]);
        assert_eq!(attachment_input(file.clone(), "").question, None);
        assert_eq!(
            attachment_input(file, "что это?").question.as_deref(),
            Some("что это?")
        );
    }

    #[tokio::test]
    async fn loads_attachment_with_guessed_type() {
        let dir = std::env::temp_dir().join(format!("gemchat-attach-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("photo.png");
        tokio::fs::write(&path, [0x89, b'P', b'N', b'G']).await.unwrap();

        let attachment = load_attachment(&path).await.unwrap();
        assert_eq!(attachment.file_name, "photo.png");
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.bytes, vec![0x89, b'P', b'N', b'G']);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
        assert!(load_attachment(&path).await.is_err());
    }
}
