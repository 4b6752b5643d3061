mod db;
mod engine;
mod error;
mod models;
mod paths;
mod prompts;
mod settings;
mod store;
mod stream;

use engine::{ReconcileEngine, SentencePacing, TurnObserver, TurnOutcome};
use error::ChatError;
use log::{debug, error, info, warn};
use models::ChatMessage;
use prompts::{DEFAULT_REASONING_PROMPT, DEFAULT_SYSTEM_PROMPT};
use settings::{load_settings, save_settings, ChatSettings};
use std::io::Write as IoWrite;
use store::MessageStore;
use stream::{StreamClient, TurnRequest};
use uuid::Uuid;

/// Prints the incremental reveal of both channels to the terminal.
///
/// Tracks how much of each field has already been printed so every store
/// write only emits the new suffix.
#[derive(Default)]
struct TerminalObserver {
    printed_thinking: usize,
    printed_content: usize,
    thinking_open: bool,
}

/// Unseen tail of `text` past `printed` bytes, or the whole text when
/// the offset no longer lands on a character boundary.
fn unseen_suffix(text: &str, printed: usize) -> &str {
    text.get(printed..).unwrap_or(text)
}

impl TurnObserver for TerminalObserver {
    fn on_update(&mut self, message: &ChatMessage) {
        if message.thinking.len() > self.printed_thinking {
            if !self.thinking_open {
                println!("--- thinking ---");
                self.thinking_open = true;
            }
            print!("{}", unseen_suffix(&message.thinking, self.printed_thinking));
            self.printed_thinking = message.thinking.len();
            let _ = std::io::stdout().flush();
        }
        if message.content.len() > self.printed_content {
            if self.thinking_open {
                println!("\n----------------");
                self.thinking_open = false;
            }
            print!("{}", unseen_suffix(&message.content, self.printed_content));
            self.printed_content = message.content.len();
            let _ = std::io::stdout().flush();
        }
    }

    fn on_error(&mut self, error: &ChatError) {
        println!("\n[{}]", error);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /history           show the stored conversation");
    println!("  /context <text>    set RAG context for following questions");
    println!("  /context clear     drop the context");
    println!("  /clear             delete the conversation and its history");
    println!("  /thinking on|off   toggle thinking mode");
    println!("  /system <prompt>   set the system prompt");
    println!("  /help              this message");
    println!("  /quit              exit");
}

fn print_history(store: &MessageStore) {
    if store.is_empty() {
        println!("(no messages)");
        return;
    }
    for message in store.messages() {
        println!("[{}] {}", message.role.as_str(), message.content);
        if !message.thinking.is_empty() {
            println!("    (thinking: {})", message.thinking);
        }
    }
}

fn handle_command(
    line: &str,
    settings: &mut ChatSettings,
    store: &MessageStore,
    conn: &rusqlite::Connection,
    context: &mut Option<String>,
) -> Result<bool, ChatError> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => return Ok(false),
        "/help" => print_help(),
        "/history" => print_history(store),
        "/clear" => {
            store.clear();
            db::clear_history(conn)?;
            println!("History cleared.");
        }
        "/thinking" => match rest {
            "on" => {
                settings.enable_thinking = true;
                if settings.system_prompt == DEFAULT_SYSTEM_PROMPT {
                    settings.system_prompt = DEFAULT_REASONING_PROMPT.to_string();
                }
                save_settings(settings)?;
                println!("Thinking mode enabled.");
            }
            "off" => {
                settings.enable_thinking = false;
                if settings.system_prompt == DEFAULT_REASONING_PROMPT {
                    settings.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
                }
                save_settings(settings)?;
                println!("Thinking mode disabled.");
            }
            _ => println!("Usage: /thinking on|off"),
        },
        "/context" => {
            if rest.is_empty() {
                match context {
                    Some(ctx) => {
                        println!("Questions are sent with this context:");
                        println!("{}", prompts::contextual_question(ctx, "<your question>"));
                    }
                    None => println!("No context set. Usage: /context <text> | /context clear"),
                }
            } else if rest == "clear" {
                *context = None;
                println!("Context cleared.");
            } else {
                *context = Some(rest.to_string());
                println!("Context set ({} chars).", rest.chars().count());
            }
        }
        "/system" => {
            if rest.is_empty() {
                println!("Current system prompt: {}", settings.system_prompt);
            } else {
                settings.system_prompt = rest.to_string();
                save_settings(settings)?;
                println!("System prompt updated.");
            }
        }
        _ => println!("Unknown command: {} (try /help)", command),
    }
    Ok(true)
}

/// Persists the finished user/assistant pair of the latest turn.
fn persist_turn(store: &MessageStore, conn: &rusqlite::Connection) -> Result<(), ChatError> {
    let messages = store.messages();
    let start = messages.len().saturating_sub(2);
    for message in &messages[start..] {
        db::store_message(conn, message)?;
    }
    Ok(())
}

async fn run() -> Result<(), ChatError> {
    let mut settings = load_settings()?;
    settings.validate()?;

    let conn = db::init_database()?;
    let history = db::load_history(&conn, 100)?;
    let store = MessageStore::with_history(history);
    if store.len() > 0 {
        info!("Loaded {} messages of history", store.len());
    }

    let client = StreamClient::new(&settings.base_url);
    match client.check_health().await {
        Ok(true) => info!("Backend is healthy at {}", settings.base_url),
        _ => warn!(
            "Backend not reachable at {}; turns will fail until it is up",
            settings.base_url
        ),
    }

    // --instant disables the thinking reveal delay, e.g. when piping output
    let mut engine = if std::env::args().any(|arg| arg == "--instant") {
        ReconcileEngine::with_pacing(store.clone(), SentencePacing::instant())
    } else {
        ReconcileEngine::new(store.clone())
    };

    // Session-scoped; the backend would mint one per request otherwise
    let conversation_id = format!("qwen_conv_{}", &Uuid::new_v4().simple().to_string()[..12]);
    let mut context: Option<String> = None;

    println!("qwen-chat (thinking mode: {})", if settings.enable_thinking { "on" } else { "off" });
    println!("Type a message, or /help for commands.");

    loop {
        print!("\n> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| ChatError::Config(format!("Failed to read input: {}", e)))?
            == 0
        {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !handle_command(line, &mut settings, &store, &conn, &mut context)? {
                break;
            }
            continue;
        }

        let mut observer = TerminalObserver::default();
        let text = line.to_string();
        let conversation = conversation_id.clone();
        let turn_context = context.clone();
        let client_ref = &client;
        let result = engine
            .run_turn(
                line,
                &settings,
                |snapshot| async move {
                    let request = TurnRequest {
                        message: &text,
                        conversation_id: Some(&conversation),
                        context: turn_context.as_deref(),
                    };
                    client_ref.open(&request, &snapshot).await
                },
                &mut observer,
            )
            .await;
        println!();
        debug!(
            "Turn ended in phase {:?} (thinking={}, content={})",
            engine.phase(),
            engine.thinking_active(),
            engine.content_active()
        );

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}", e);
                engine.abort_turn();
                continue;
            }
        };

        match outcome {
            TurnOutcome::Completed { reason } => {
                if let Some(reason) = reason {
                    info!("Turn completed ({})", reason);
                }
                persist_turn(&store, &conn)?;
            }
            TurnOutcome::Failed { message } => {
                warn!("Turn failed: {}", message);
                // Partial output is part of the historical record
                persist_turn(&store, &conn)?;
            }
            TurnOutcome::Abandoned => {}
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}
