//! Interactive REPL (Read-Eval-Print Loop) for notes.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::notes::{Note, NoteError, NoteId, NoteService};

/// Errors produced while handling one line of input.
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command: {0} (type help for available commands)")]
    UnknownCommand(String),

    #[error(transparent)]
    Note(#[from] NoteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ReplResult<T> = Result<T, ReplError>;

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add { title: String, body: String },
    List,
    Show(NoteId),
    Find(String),
    Rename { id: NoteId, title: String },
    Analyze(NoteId),
    Delete(NoteId),
    Stats,
    History,
    Timing,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ReplError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim().trim_start_matches(&['.', '\\'][..]);
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "add" => {
                let (title, body) = rest.split_once('|').unwrap_or((rest, ""));
                if title.trim().is_empty() {
                    return Err(ReplError::Usage("add <title> | <body>"));
                }
                Ok(Command::Add {
                    title: title.trim().to_string(),
                    body: body.trim().to_string(),
                })
            }
            "list" | "ls" => Ok(Command::List),
            "show" => Ok(Command::Show(parse_id(rest, "show <id>")?)),
            "find" => {
                if rest.is_empty() {
                    return Err(ReplError::Usage("find <text>"));
                }
                Ok(Command::Find(rest.to_string()))
            }
            "rename" => {
                let (id, title) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ReplError::Usage("rename <id> <title>"))?;
                Ok(Command::Rename {
                    id: parse_id(id, "rename <id> <title>")?,
                    title: title.trim().to_string(),
                })
            }
            "analyze" => Ok(Command::Analyze(parse_id(rest, "analyze <id>")?)),
            "delete" | "rm" => Ok(Command::Delete(parse_id(rest, "delete <id>")?)),
            "stats" => Ok(Command::Stats),
            "history" => Ok(Command::History),
            "timing" => Ok(Command::Timing),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(ReplError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_id(text: &str, usage: &'static str) -> ReplResult<NoteId> {
    if text.is_empty() {
        return Err(ReplError::Usage(usage));
    }
    Ok(text.parse()?)
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Output(String),
    Exit,
}

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Max notes to display in a listing.
    pub max_rows: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "notes> ".into(),
            timing: false,
            max_rows: 100,
        }
    }
}

/// The interactive REPL.
pub struct Repl {
    service: NoteService,
    config: ReplConfig,
    history: Vec<String>,
}

impl Repl {
    pub fn new(service: NoteService) -> Self {
        Self::with_config(service, ReplConfig::default())
    }

    pub fn with_config(service: NoteService, config: ReplConfig) -> Self {
        Self {
            service,
            config,
            history: Vec::new(),
        }
    }

    /// Run the REPL on stdin until EOF or `quit`.
    pub async fn run(&mut self) -> ReplResult<()> {
        self.print_banner();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = io::stdout();

        loop {
            print!("{}", self.config.prompt);
            stdout.flush()?;

            let Some(line) = lines.next_line().await? else {
                println!("\nGoodbye!");
                break;
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let start = Instant::now();
            match self.execute_line(line).await {
                Ok(Reply::Exit) => break,
                Ok(Reply::Output(text)) => {
                    if !text.is_empty() {
                        println!("{}", text);
                    }
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Ok(())
    }

    /// Parse and execute one line, recording it in the history.
    pub async fn execute_line(&mut self, line: &str) -> ReplResult<Reply> {
        self.history.push(line.to_string());
        let command: Command = line.parse()?;
        self.execute(command).await
    }

    pub async fn execute(&mut self, command: Command) -> ReplResult<Reply> {
        let text = match command {
            Command::Add { title, body } => {
                let note = self.service.create(&title, &body).await?;
                format!("Created note {}", note.id)
            }
            Command::List => {
                let notes = self.service.list().await?;
                self.render_notes(&notes)
            }
            Command::Show(id) => render_note(&self.service.get(id).await?),
            Command::Find(text) => {
                let notes = self.service.search(&text).await?;
                self.render_notes(&notes)
            }
            Command::Rename { id, title } => {
                let note = self.service.rename(id, &title).await?;
                format!("Renamed note {} to '{}'", note.id, note.title)
            }
            Command::Analyze(id) => {
                let sentiment = self.service.analyze(id).await?;
                format!("Sentiment: {} (score {})", sentiment.label, sentiment.score)
            }
            Command::Delete(id) => {
                self.service.delete(id).await?;
                format!("Deleted note {}", id)
            }
            Command::Stats => self.render_stats(),
            Command::History => self.render_history(),
            Command::Timing => {
                self.config.timing = !self.config.timing;
                format!("Timing: {}", if self.config.timing { "on" } else { "off" })
            }
            Command::Help => HELP.trim_end().to_string(),
            Command::Quit => return Ok(Reply::Exit),
        };
        Ok(Reply::Output(text))
    }

    fn print_banner(&self) {
        println!("╔═══════════════════════════════════════════════════╗");
        println!("║                   txguard notes                   ║");
        println!("║       Coloured transactions over a note store     ║");
        println!("╠═══════════════════════════════════════════════════╣");
        println!("║          Type help for available commands         ║");
        println!("╚═══════════════════════════════════════════════════╝");
        println!();
    }

    fn render_stats(&self) -> String {
        let stats = self.service.engine().provider().stats();
        let mut out = String::from("Store Statistics:\n");
        let _ = writeln!(out, "  Sessions: {}", stats.sessions);
        let _ = writeln!(out, "  Begins: {}", stats.begins);
        let _ = writeln!(out, "  Commits: {}", stats.commits);
        let _ = writeln!(out, "  Rollbacks: {}", stats.rollbacks);
        let _ = write!(out, "  Conflicts: {}", stats.conflicts);
        out
    }

    fn render_history(&self) -> String {
        let mut out = String::from("Command History:");
        for (i, cmd) in self.history.iter().enumerate() {
            let _ = write!(out, "\n  {}: {}", i + 1, cmd);
        }
        out
    }

    fn render_notes(&self, notes: &[Note]) -> String {
        if notes.is_empty() {
            return "(0 notes)".to_string();
        }

        let header = ["id", "title", "sentiment", "updated"];
        let rows: Vec<[String; 4]> = notes
            .iter()
            .take(self.config.max_rows)
            .map(|note| {
                [
                    note.id.to_string(),
                    note.title.clone(),
                    note.sentiment
                        .map(|s| s.label.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    note.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = line(header.to_vec());
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let _ = write!(out, "\n{}", sep.join("-+-"));
        for row in &rows {
            let _ = write!(out, "\n{}", line(row.iter().map(String::as_str).collect()));
        }

        if notes.len() > rows.len() {
            let _ = write!(out, "\n... ({} more notes)", notes.len() - rows.len());
        }
        let _ = write!(out, "\n({} notes)", notes.len());
        out
    }
}

fn render_note(note: &Note) -> String {
    let mut out = format!("{}\n{}", note.title, "=".repeat(note.title.chars().count()));
    if !note.body.is_empty() {
        let _ = write!(out, "\n{}", note.body);
    }
    let _ = write!(out, "\n\nid:        {}", note.id);
    if let Some(sentiment) = note.sentiment {
        let _ = write!(
            out,
            "\nsentiment: {} (score {})",
            sentiment.label, sentiment.score
        );
    }
    let _ = write!(out, "\ncreated:   {}", note.created_at.to_rfc3339());
    let _ = write!(out, "\nupdated:   {}", note.updated_at.to_rfc3339());
    out
}

const HELP: &str = r#"
Commands:
  add <title> | <body>     Create a note
  list, ls                 List all notes
  show <id>                Show one note
  find <text>              Search titles and bodies
  rename <id> <title>      Change a note's title
  analyze <id>             Score a note's sentiment
  delete <id>, rm <id>     Delete a note
  stats                    Show store statistics
  history                  Show command history
  timing                   Toggle timing display
  help, h, ?               Show this help message
  quit, exit, q            Exit the REPL
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::TxConfig;
    use crate::notes::KeywordSentiment;
    use crate::store::DocumentStore;
    use crate::transaction::TransactionEngine;

    fn repl() -> Repl {
        let service = NoteService::new(
            TransactionEngine::new(DocumentStore::new(), TxConfig::default()),
            Arc::new(KeywordSentiment::new(Duration::ZERO)),
        );
        Repl::new(service)
    }

    fn output(reply: Reply) -> String {
        match reply {
            Reply::Output(text) => text,
            Reply::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "add Groceries | milk, eggs".parse::<Command>().unwrap(),
            Command::Add {
                title: "Groceries".into(),
                body: "milk, eggs".into()
            }
        );
        assert_eq!(
            "add Title only".parse::<Command>().unwrap(),
            Command::Add {
                title: "Title only".into(),
                body: String::new()
            }
        );
        assert_eq!("LIST".parse::<Command>().unwrap(), Command::List);
        assert_eq!(".quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!(
            "find two words".parse::<Command>().unwrap(),
            Command::Find("two words".into())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("add | body".parse::<Command>(), Err(ReplError::Usage(_))));
        assert!(matches!("show".parse::<Command>(), Err(ReplError::Usage(_))));
        assert!(matches!(
            "show nope".parse::<Command>(),
            Err(ReplError::Note(NoteError::Validation(_)))
        ));
        assert!(matches!(
            "rename".parse::<Command>(),
            Err(ReplError::Usage(_))
        ));
        assert!(matches!(
            "frobnicate".parse::<Command>(),
            Err(ReplError::UnknownCommand(cmd)) if cmd == "frobnicate"
        ));
    }

    #[tokio::test]
    async fn test_session_flow() {
        let mut repl = repl();

        let created = output(repl.execute_line("add Holiday | great fun").await.unwrap());
        let id = created.trim_start_matches("Created note ").to_string();

        let listing = output(repl.execute_line("list").await.unwrap());
        assert!(listing.contains("Holiday"));
        assert!(listing.ends_with("(1 notes)"));

        let analyzed = output(repl.execute_line(&format!("analyze {}", id)).await.unwrap());
        assert_eq!(analyzed, "Sentiment: positive (score 2)");

        let shown = output(repl.execute_line(&format!("show {}", id)).await.unwrap());
        assert!(shown.starts_with("Holiday\n======="));
        assert!(shown.contains("sentiment: positive"));

        repl.execute_line(&format!("rename {} Vacation", id))
            .await
            .unwrap();
        let found = output(repl.execute_line("find vacation").await.unwrap());
        assert!(found.contains("Vacation"));

        repl.execute_line(&format!("delete {}", id)).await.unwrap();
        let listing = output(repl.execute_line("list").await.unwrap());
        assert_eq!(listing, "(0 notes)");

        let history = output(repl.execute_line("history").await.unwrap());
        assert!(history.contains("9: history"));

        assert_eq!(repl.execute_line("quit").await.unwrap(), Reply::Exit);
    }

    #[tokio::test]
    async fn test_errors_are_reported_not_fatal() {
        let mut repl = repl();
        let missing = NoteId::generate();

        let err = repl
            .execute_line(&format!("show {}", missing))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("note not found: {}", missing));

        let stats = output(repl.execute_line("stats").await.unwrap());
        assert!(stats.contains("Rollbacks: 1"));
    }

    #[tokio::test]
    async fn test_listing_is_truncated() {
        let mut repl = repl();
        repl.config.max_rows = 2;
        for title in ["a", "b", "c"] {
            repl.execute_line(&format!("add {}", title)).await.unwrap();
        }

        let listing = output(repl.execute_line("list").await.unwrap());
        assert!(listing.contains("... (1 more notes)"));
        assert!(listing.ends_with("(3 notes)"));
    }
}
