//! Console line parsing

use pdfdesk_session::{Event, OperationKind};
use std::path::{Path, PathBuf};

/// Turn one input line into an event
///
/// Blank lines yield `Ok(None)`. Unknown slash commands and a bare
/// `/upload` are errors with a message for the user.
pub fn parse_line(line: &str) -> Result<Option<Event>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Event::Text(line.to_string())));
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let event = match command.to_ascii_lowercase().as_str() {
        "/start" => Event::Start,
        "/help" => Event::Help,
        "/cancel" => Event::Cancel,
        "/status" => Event::Status,
        "/confirm" => Event::Confirm,
        "/upload" => return upload(rest).map(Some),
        "/merge" => Event::Select(OperationKind::Merge),
        "/split" => Event::Select(OperationKind::Split),
        "/delete" => Event::Select(OperationKind::Delete),
        "/rotate" => Event::Select(OperationKind::Rotate),
        "/reorder" => Event::Select(OperationKind::Reorder),
        "/compress" => Event::Select(OperationKind::Compress),
        "/text" => Event::Select(OperationKind::ExtractText),
        "/images" => Event::Select(OperationKind::ExtractImages),
        "/convert" => Event::Select(OperationKind::Convert),
        other => return Err(format!("Unknown command {}. Send /help for the list", other)),
    };
    Ok(Some(event))
}

fn upload(argument: &str) -> Result<Event, String> {
    let argument = argument.trim_matches(|c| c == '"' || c == '\'');
    if argument.is_empty() {
        return Err("Usage: /upload <path>".to_string());
    }
    let path = PathBuf::from(argument);
    let name = Path::new(argument)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| argument.to_string());
    Ok(Event::Upload { path, name })
}
