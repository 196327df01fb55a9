//! Line reading and interpretation for the interactive shell.

use std::future::Future;

use tokio::io::{AsyncBufRead, Lines};

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line; prompt again.
    Empty,
    Exit,
    /// Clear the conversation.
    Reset,
    Status,
    /// `/persona` with no argument: list personas.
    ListPersonas,
    /// `/persona <id>`
    SwitchPersona(String),
    /// Anything else goes to the model.
    Message(String),
}

/// Interpret one line of user input.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "/exit" | "/quit" => return Input::Exit,
        "reset" | "/reset" => return Input::Reset,
        "status" | "/status" => return Input::Status,
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("/persona") {
        // `/personality` is a message, not a command.
        if rest.is_empty() {
            return Input::ListPersonas;
        }
        if rest.starts_with(char::is_whitespace) {
            return Input::SwitchPersona(rest.trim().to_string());
        }
    }
    Input::Message(line.to_string())
}

/// Tag an answer with the persona that gave it, one prefix per line.
pub fn format_answer(persona_id: &str, answer: &str) -> String {
    let prefix = format!("[{persona_id}]");
    if answer.is_empty() {
        return prefix;
    }
    answer
        .lines()
        .map(|line| format!("{prefix} {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wait for the next line, or `None` at end of input or when `interrupt`
/// fires first.
pub async fn next_line<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn reads_lines_until_interrupted() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"hello\n").await.unwrap();

        let line = next_line(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert_eq!(line.as_deref(), Some("hello"));

        // Nothing typed and the writer still open: only the interrupt ends the wait.
        let line = next_line(&mut lines, std::future::ready(())).await.unwrap();
        assert_eq!(line, None);
        drop(writer);
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse("  "), Input::Empty);
        assert_eq!(parse("exit"), Input::Exit);
        assert_eq!(parse("QUIT"), Input::Exit);
        assert_eq!(parse("reset"), Input::Reset);
        assert_eq!(parse("status"), Input::Status);
        assert_eq!(parse("/persona"), Input::ListPersonas);
        assert_eq!(parse("/persona joke_writer"), Input::SwitchPersona("joke_writer".into()));
    }

    #[test]
    fn everything_else_is_a_message() {
        assert_eq!(parse("what's 2+2"), Input::Message("what's 2+2".into()));
        assert_eq!(parse("/personality test"), Input::Message("/personality test".into()));
        assert_eq!(
            parse("reset the counter please"),
            Input::Message("reset the counter please".into())
        );
    }

    #[test]
    fn answers_are_persona_tagged() {
        assert_eq!(format_answer("planner", "Done."), "[planner] Done.");
        assert_eq!(format_answer("planner", "a\nb"), "[planner] a\n[planner] b");
        assert_eq!(format_answer("planner", ""), "[planner]");
    }
}
