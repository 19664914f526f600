use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};

use agent_chat::api::{ApiClient, RemoteMessageStore};
use agent_chat::config::ChatConfig;
use agent_chat::domain::Message;
use agent_chat::enrich::HttpContentFetcher;
use agent_chat::render::{render_message, render_transcript};
use agent_chat::store::{
    event_channel, InMemoryMessageStore, MessageStore, StoreEvent, StoreEventReceiver,
};
use agent_chat::thread::{ThreadController, ThreadPreferences};

use crate::cli::args::ChatArgs;

const HELP: &str = "\
Type a message and press Enter to send it.
  /url <url>          attach a page to the next message (/url alone clears it)
  /stop               stop the running reply
  /regenerate         regenerate the last reply
  /edit <text>        edit your last message on a new branch
  /branches           list messages with alternative branches
  /branch <n> <prev|next>
                      switch message #n to its previous or next branch
  /tools              show or hide tool calls
  /history            print the whole thread
  /thread             show the thread id
  /open <thread-id>   open another thread
  /new                start a new thread
  /help               show this help
  /quit               exit";

/// Preview length for messages in the branch list
const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Previous,
    Next,
}

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Send(String),
    Url(Option<String>),
    Stop,
    Regenerate,
    Edit(String),
    Branches,
    Branch { message: usize, direction: Direction },
    ToggleTools,
    History,
    Thread,
    Open(String),
    New,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ReplCommand::Send(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "url" if rest.is_empty() => ReplCommand::Url(None),
            "url" => ReplCommand::Url(Some(rest.to_string())),
            "stop" => ReplCommand::Stop,
            "regenerate" | "retry" => ReplCommand::Regenerate,
            "edit" if rest.is_empty() => ReplCommand::Invalid("Usage: /edit <text>".to_string()),
            "edit" => ReplCommand::Edit(rest.to_string()),
            "branches" => ReplCommand::Branches,
            "branch" => parse_branch(rest),
            "tools" => ReplCommand::ToggleTools,
            "history" => ReplCommand::History,
            "thread" => ReplCommand::Thread,
            "open" if rest.is_empty() => {
                ReplCommand::Invalid("Usage: /open <thread-id>".to_string())
            }
            "open" => ReplCommand::Open(rest.to_string()),
            "new" => ReplCommand::New,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            other => ReplCommand::Invalid(format!("Unknown command: /{}", other)),
        }
    }
}

fn parse_branch(args: &str) -> ReplCommand {
    let usage = || ReplCommand::Invalid("Usage: /branch <n> <prev|next>".to_string());
    let mut parts = args.split_whitespace();
    let (Some(index), Some(direction), None) = (parts.next(), parts.next(), parts.next()) else {
        return usage();
    };
    let Ok(message) = index.trim_start_matches('#').parse::<usize>() else {
        return usage();
    };
    let direction = match direction {
        "prev" | "previous" | "<" => Direction::Previous,
        "next" | ">" => Direction::Next,
        _ => return usage(),
    };
    ReplCommand::Branch { message, direction }
}

/// Tracks which rendered messages are already on screen.
///
/// A message is printed again when its rendering changes, such as a reply
/// that grew between two state updates.
#[derive(Debug, Default)]
struct TranscriptPrinter {
    shown: HashMap<String, String>,
}

impl TranscriptPrinter {
    fn reset(&mut self) {
        self.shown.clear();
    }

    /// Renderings not printed yet, in message order.
    fn fresh(&mut self, messages: &[Message], preferences: &ThreadPreferences) -> Vec<String> {
        let mut out = Vec::new();
        for (i, message) in messages.iter().enumerate() {
            let Some(text) = render_message(message, preferences) else {
                continue;
            };
            let key = message
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", i));
            if self.shown.get(&key) != Some(&text) {
                self.shown.insert(key, text.clone());
                out.push(text);
            }
        }
        out
    }

    /// Mark messages as shown without printing them.
    fn absorb(&mut self, messages: &[Message], preferences: &ThreadPreferences) {
        self.fresh(messages, preferences);
    }
}

fn preview(message: &Message) -> String {
    let text = message.content_string().replace('\n', " ");
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text
    }
}

pub async fn run_chat(config: ChatConfig, args: ChatArgs) -> Result<()> {
    let (events, receiver) = event_channel();
    let fetcher = HttpContentFetcher::new().context("Failed to create page fetcher")?;
    let preferences = ThreadPreferences {
        hide_tool_calls: args.hide_tool_calls,
        chat_history_open: args.history,
    };

    if args.offline {
        println!("💬 Offline mode: replies come from the local echo assistant.");
        let store = InMemoryMessageStore::echo(events);
        let controller = ThreadController::new(store, fetcher, preferences);
        return chat_loop(controller, receiver, args.thread_id).await;
    }

    let client = ApiClient::new(&config.api_url, config.api_key.clone())
        .with_context(|| format!("Invalid API URL: {}", config.api_url))?;
    println!(
        "💬 Connected to {} (assistant: {})",
        config.api_url, config.assistant_id
    );
    let store = RemoteMessageStore::new(client, config.assistant_id.clone(), events);
    let controller = ThreadController::new(store, fetcher, preferences);
    chat_loop(controller, receiver, args.thread_id).await
}

struct ChatRepl<S: MessageStore> {
    controller: ThreadController<S, HttpContentFetcher>,
    printer: TranscriptPrinter,
    /// Absorb the next loaded state instead of printing it
    silent_load: bool,
    indicator_shown: bool,
}

async fn chat_loop<S: MessageStore>(
    controller: ThreadController<S, HttpContentFetcher>,
    mut events: StoreEventReceiver,
    thread_id: Option<String>,
) -> Result<()> {
    let mut repl = ChatRepl {
        controller,
        printer: TranscriptPrinter::default(),
        silent_load: false,
        indicator_shown: false,
    };
    repl.open(thread_id.as_deref())
        .with_context(|| format!("Failed to open thread {}", thread_id.as_deref().unwrap_or("")))?;
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                if !repl.handle(ReplCommand::parse(&line)).await {
                    break;
                }
            }
            Some(event) = events.recv() => repl.on_event(event),
        }
    }

    repl.controller.stop();
    println!("👋 Bye.");
    Ok(())
}

impl<S: MessageStore> ChatRepl<S> {
    fn open(&mut self, thread_id: Option<&str>) -> agent_chat::error::Result<()> {
        self.controller.open_thread(thread_id)?;
        self.printer.reset();
        self.silent_load = thread_id.is_some() && !self.controller.preferences().chat_history_open;
        self.indicator_shown = false;
        if let Some(id) = thread_id {
            println!("📂 Opened thread {}", id);
        }
        Ok(())
    }

    fn on_event(&mut self, event: StoreEvent) {
        let loaded = matches!(event, StoreEvent::Values { run_id: None, .. });
        if let Some(notification) = self.controller.apply(event) {
            eprintln!("❌ {}", notification);
        }

        let messages = self.controller.visible_messages();
        let preferences = self.controller.preferences().clone();
        if loaded && self.silent_load {
            self.silent_load = false;
            self.printer.absorb(&messages, &preferences);
            println!("({} messages, /history to show them)", messages.len());
        } else {
            for text in self.printer.fresh(&messages, &preferences) {
                println!("{}\n", text);
            }
        }

        let session = self.controller.session();
        if session.show_loading_indicator() && !self.indicator_shown {
            println!("⏳ Thinking...");
            self.indicator_shown = true;
        } else if !session.is_loading {
            self.indicator_shown = false;
        }
    }

    fn last_message(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
        self.controller
            .visible_messages()
            .into_iter()
            .rev()
            .find(|m| predicate(m))
    }

    /// Returns false when the REPL should exit.
    async fn handle(&mut self, command: ReplCommand) -> bool {
        let result = match command {
            ReplCommand::Quit => return false,
            ReplCommand::Empty => Ok(()),
            ReplCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ReplCommand::Invalid(message) => {
                println!("⚠️  {}", message);
                Ok(())
            }
            ReplCommand::Send(text) => self.send(text).await,
            ReplCommand::Url(url) => {
                self.controller
                    .session_mut()
                    .set_url(url.as_deref().unwrap_or_default());
                match self.controller.session().url() {
                    Some(url) => println!("🔗 {} will be attached to your next message", url),
                    None => println!("🔗 URL cleared"),
                }
                Ok(())
            }
            ReplCommand::Stop => {
                self.controller.stop();
                println!("⏹️  Stopped.");
                Ok(())
            }
            ReplCommand::Regenerate => match self.last_message(Message::is_ai) {
                Some(message) => self.controller.regenerate_message(&message).map(|_| ()),
                None => {
                    println!("⚠️  There is no reply to regenerate.");
                    Ok(())
                }
            },
            ReplCommand::Edit(text) => match self.last_message(Message::is_human) {
                Some(message) => self.controller.edit_message(&message, &text).map(|_| ()),
                None => {
                    println!("⚠️  There is no message to edit.");
                    Ok(())
                }
            },
            ReplCommand::Branches => {
                self.list_branches();
                Ok(())
            }
            ReplCommand::Branch { message, direction } => self.switch_branch(message, direction),
            ReplCommand::ToggleTools => {
                let preferences = self.controller.preferences_mut();
                preferences.hide_tool_calls = !preferences.hide_tool_calls;
                let hidden = preferences.hide_tool_calls;
                println!("🔧 Tool calls {}", if hidden { "hidden" } else { "shown" });
                Ok(())
            }
            ReplCommand::History => {
                self.print_history();
                Ok(())
            }
            ReplCommand::Thread => {
                match &self.controller.session().thread_id {
                    Some(id) => println!("🧵 {}", id),
                    None => println!("🧵 New thread (created on the first message)"),
                }
                Ok(())
            }
            ReplCommand::Open(thread_id) => self.open(Some(&thread_id)),
            ReplCommand::New => {
                let result = self.open(None);
                if result.is_ok() {
                    println!("🧵 Started a new thread");
                }
                result
            }
        };

        if let Err(e) = result {
            eprintln!("❌ {}", e);
        }
        true
    }

    async fn send(&mut self, text: String) -> agent_chat::error::Result<()> {
        if self.controller.session().is_loading {
            println!("⚠️  Still answering; /stop to cancel.");
            return Ok(());
        }
        self.controller.session_mut().set_input(text);
        self.controller.submit().await?;
        Ok(())
    }

    fn list_branches(&self) {
        let messages = self.controller.visible_messages();
        let mut any = false;
        for (i, message) in messages.iter().enumerate() {
            let Some(switcher) = self.controller.branch_switcher(message) else {
                continue;
            };
            if !switcher.has_alternatives() {
                continue;
            }
            any = true;
            println!(
                "#{:<3} {:<5} [{}] {}",
                i + 1,
                message.role.as_str(),
                switcher,
                preview(message)
            );
        }
        if !any {
            println!("No messages have alternative branches.");
        }
    }

    fn switch_branch(
        &mut self,
        number: usize,
        direction: Direction,
    ) -> agent_chat::error::Result<()> {
        let messages = self.controller.visible_messages();
        let Some(message) = number.checked_sub(1).and_then(|i| messages.get(i)) else {
            println!("⚠️  No message #{}", number);
            return Ok(());
        };
        let Some(switcher) = self.controller.branch_switcher(message) else {
            println!("⚠️  Message #{} has no branches", number);
            return Ok(());
        };

        let target = match direction {
            Direction::Previous => switcher.previous(),
            Direction::Next => switcher.next(),
        };
        let Some(target) = target.map(str::to_string) else {
            println!("⚠️  Already at branch {}", switcher);
            return Ok(());
        };

        self.controller.select_branch(&target)?;
        self.printer.reset();
        Ok(())
    }

    fn print_history(&mut self) {
        let messages = self.controller.visible_messages();
        let preferences = self.controller.preferences().clone();
        if messages.is_empty() {
            println!("(empty thread)");
            return;
        }
        println!("{}\n", render_transcript(&messages, &preferences));
        self.printer.absorb(&messages, &preferences);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            ReplCommand::parse("  hello there "),
            ReplCommand::Send("hello there".to_string())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ReplCommand::parse("/url example.com"),
            ReplCommand::Url(Some("example.com".to_string()))
        );
        assert_eq!(ReplCommand::parse("/url"), ReplCommand::Url(None));
        assert_eq!(
            ReplCommand::parse("/edit Fix the typo"),
            ReplCommand::Edit("Fix the typo".to_string())
        );
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(
            ReplCommand::parse("/open  t-42"),
            ReplCommand::Open("t-42".to_string())
        );
        assert!(matches!(ReplCommand::parse("/edit"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/dance"), ReplCommand::Invalid(_)));
    }

    #[test]
    fn test_parse_branch() {
        assert_eq!(
            ReplCommand::parse("/branch 3 next"),
            ReplCommand::Branch {
                message: 3,
                direction: Direction::Next
            }
        );
        assert_eq!(
            ReplCommand::parse("/branch #2 prev"),
            ReplCommand::Branch {
                message: 2,
                direction: Direction::Previous
            }
        );
        assert!(matches!(ReplCommand::parse("/branch next"), ReplCommand::Invalid(_)));
        assert!(matches!(
            ReplCommand::parse("/branch 1 sideways"),
            ReplCommand::Invalid(_)
        ));
    }

    #[test]
    fn test_printer_prints_new_and_changed_messages() {
        let preferences = ThreadPreferences::default();
        let mut printer = TranscriptPrinter::default();
        let human = Message::human("Hi").with_id("h");
        let partial = Message::ai("Hel").with_id("a");

        let first = printer.fresh(&[human.clone(), partial], &preferences);
        assert_eq!(first, vec!["You: Hi".to_string(), "Assistant: Hel".to_string()]);

        let done = Message::ai("Hello!").with_id("a");
        let second = printer.fresh(&[human.clone(), done.clone()], &preferences);
        assert_eq!(second, vec!["Assistant: Hello!".to_string()]);

        assert!(printer.fresh(&[human.clone(), done.clone()], &preferences).is_empty());

        printer.reset();
        assert_eq!(printer.fresh(&[human, done], &preferences).len(), 2);
    }

    #[test]
    fn test_printer_absorb() {
        let preferences = ThreadPreferences::default();
        let mut printer = TranscriptPrinter::default();
        let history = vec![Message::human("old").with_id("h1")];
        printer.absorb(&history, &preferences);
        assert!(printer.fresh(&history, &preferences).is_empty());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview(&Message::human("two\nlines")), "two lines");
        let long = preview(&Message::human("x".repeat(50)));
        assert_eq!(long.chars().count(), PREVIEW_CHARS + 3);
    }
}
