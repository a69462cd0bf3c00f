//! The interactive chat loop.

use std::io::Write;
use std::path::PathBuf;

use koi_chat::{AnswerMode, FileOutcome, IngestReport, Session, TurnRole};
use koi_rag::FileBlob;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const HELP: &str = "\
Commands:
  /upload <path>...   index new files (replaces the current documents)
  /reset              start a new conversation
  /history            show the conversation
  /mode [fixed|agentic]
  /sources            list indexed files
  /quit               exit";

#[derive(Debug, PartialEq)]
enum Command {
    Ask(String),
    Upload(Vec<PathBuf>),
    Reset,
    History,
    Mode(Option<AnswerMode>),
    Sources,
    Help,
    Quit,
    Unknown(String),
}

fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Ask(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let command = match words.next().unwrap_or_default() {
        "upload" => Command::Upload(words.map(PathBuf::from).collect()),
        "reset" => Command::Reset,
        "history" => Command::History,
        "mode" => match words.next() {
            None => Command::Mode(None),
            Some("fixed") => Command::Mode(Some(AnswerMode::FixedPipeline)),
            Some("agentic") => Command::Mode(Some(AnswerMode::Agentic)),
            Some(other) => Command::Unknown(format!("mode {other}")),
        },
        "sources" => Command::Sources,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Print the per-file outcome of an ingestion.
pub fn print_report(result: koi_chat::Result<IngestReport>) {
    match result {
        Ok(report) => {
            for file in &report.files {
                match file {
                    FileOutcome::Indexed { name, chunks } => println!("  {name}: {chunks} chunk(s)"),
                    FileOutcome::Skipped { name, reason } => println!("  {name}: skipped ({reason})"),
                }
            }
            if report.replaced_index {
                println!("Ready: {} chunk(s) indexed. The conversation was reset.", report.total_chunks);
            } else {
                println!("Nothing could be indexed; keeping the previous documents.");
            }
        }
        Err(err) => println!("{}", err.user_message()),
    }
}

async fn ask(session: &mut Session, question: &str) {
    let streaming = session.config().mode == AnswerMode::FixedPipeline;
    let result = if streaming {
        session
            .ask_streaming(question, |delta| {
                print!("{delta}");
                std::io::stdout().flush().ok();
            })
            .await
    } else {
        session.ask(question).await
    };

    match result {
        Ok(answer) => {
            if streaming {
                println!();
            } else {
                println!("{}", answer.answer);
            }
            if !answer.sources.is_empty() {
                println!("[sources: {}]", answer.sources.join(", "));
            }
        }
        Err(err) => {
            if streaming {
                println!();
            }
            println!("{}", err.user_message());
        }
    }
}

fn print_history(session: &Session) {
    for turn in session.history().turns() {
        let who = match turn.role {
            TurnRole::Human => "you",
            TurnRole::Assistant => "koi",
        };
        println!("{who}> {}", turn.content);
    }
}

pub async fn run(session: &mut Session) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("Type a question, or /help for commands.");
    if let Some(greeting) = session.history().turns().first() {
        println!("koi> {}", greeting.content);
    }

    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let Some(command) = parse(&line) else { continue };
        editor.add_history_entry(line.as_str())?;

        match command {
            Command::Ask(question) => ask(session, &question).await,
            Command::Upload(paths) if paths.is_empty() => println!("Usage: /upload <path>..."),
            Command::Upload(paths) => {
                let mut blobs = Vec::with_capacity(paths.len());
                for path in &paths {
                    match FileBlob::from_path(path) {
                        Ok(blob) => blobs.push(blob),
                        Err(err) => println!("  {}: {err}", path.display()),
                    }
                }
                if !blobs.is_empty() {
                    println!("Indexing {} file(s)...", blobs.len());
                    print_report(session.ingest(&blobs).await);
                }
            }
            Command::Reset => {
                session.reset_conversation();
                print_history(session);
            }
            Command::History => print_history(session),
            Command::Mode(None) => println!("Mode: {:?}", session.config().mode),
            Command::Mode(Some(mode)) => {
                session.set_mode(mode);
                println!("Mode: {mode:?}");
            }
            Command::Sources => match session.knowledge_base() {
                Some(knowledge) => println!("{}", knowledge.sources().join("\n")),
                None => println!("No documents loaded."),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(name) => println!("Unknown command '/{name}'. Try /help."),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(parse("  What is koi? "), Some(Command::Ask("What is koi?".into())));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn slash_commands_are_parsed() {
        assert_eq!(
            parse("/upload a.txt b.pdf"),
            Some(Command::Upload(vec![PathBuf::from("a.txt"), PathBuf::from("b.pdf")]))
        );
        assert_eq!(parse("/mode agentic"), Some(Command::Mode(Some(AnswerMode::Agentic))));
        assert_eq!(parse("/mode"), Some(Command::Mode(None)));
        assert_eq!(parse("/exit"), Some(Command::Quit));
        assert_eq!(parse("/frobnicate"), Some(Command::Unknown("frobnicate".into())));
    }
}
