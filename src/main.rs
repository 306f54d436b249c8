use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use cardmind::ChatAssistant;
use cardmind::cards::{ChatMode, ContextCard, load_cards};
use cardmind::config::{AssistantConfig, OllamaConfig};
use cardmind::llm::{LanguageModelHost, OllamaHost, UnsupportedHost};

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Mode(&'a str),
    Cards,
    Search(&'a str),
    Message(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match head {
            "/quit" | "/exit" => Self::Quit,
            "/mode" => Self::Mode(rest),
            "/cards" => Self::Cards,
            "/search" => Self::Search(rest),
            _ => Self::Message(line),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only model output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let offline = std::env::var("CARDMIND_OFFLINE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let ollama_config = OllamaConfig::from_env()?;

    let mut mode: ChatMode = match std::env::var("CARDMIND_MODE") {
        Ok(raw) => raw.parse().map_err(anyhow::Error::msg)?,
        Err(_) => ChatMode::default(),
    };

    let cards: Vec<ContextCard> = match std::env::var("CARDMIND_CARDS_FILE") {
        Ok(path) => load_cards(Path::new(&path)).await?,
        Err(_) => Vec::new(),
    };

    eprintln!("cardmind v{}", env!("CARGO_PKG_VERSION"));

    let host: Arc<dyn LanguageModelHost> = if offline {
        eprintln!("   Host: offline");
        Arc::new(UnsupportedHost)
    } else {
        eprintln!(
            "   Host: ollama at {} (model: {})",
            ollama_config.base_url, ollama_config.model
        );
        Arc::new(OllamaHost::new(ollama_config)?)
    };

    let assistant = ChatAssistant::new(host, AssistantConfig::default());

    let mut progress = assistant.download_progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let Some(fraction) = *progress.borrow_and_update() {
                eprint!("\r   Downloading model: {:>3.0}%", fraction * 100.0);
                if fraction >= 1.0 {
                    eprintln!();
                }
            }
        }
    });

    let available = assistant.check_availability().await;
    if available {
        eprintln!("   Model: {}", assistant.availability().map(|a| a.to_string()).unwrap_or_default());
        if !assistant.initialize_session(mode, &cards).await {
            eprintln!("   Warning: could not create a session; will retry on first message");
        }
    } else {
        eprintln!("   Model: unavailable, replies will echo your input");
    }

    eprintln!("   Mode: {}", mode);
    eprintln!("   Cards: {}", cards.len());
    eprintln!("   Commands: /mode <name>, /cards, /search <query>, /quit. Ctrl+C stops a reply.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Mode(name) => match name.parse::<ChatMode>() {
                Ok(next) => {
                    mode = next;
                    if available && !assistant.initialize_session(mode, &cards).await {
                        eprintln!("   Warning: could not create a session for {}", mode);
                    }
                    eprintln!("   Mode: {}", mode);
                }
                Err(e) => eprintln!("   {}", e),
            },
            Command::Cards => {
                for (i, card) in cards.iter().enumerate() {
                    eprintln!("   [{}] {}", i + 1, card.title);
                }
            }
            Command::Search(query) => {
                let ranked = assistant.search_cards(query, &cards).await;
                if ranked.is_empty() {
                    eprintln!("   No matching cards");
                }
                for i in ranked {
                    eprintln!("   [{}] {}", i + 1, cards[i].title);
                }
            }
            Command::Message(text) => run_exchange(&assistant, text).await,
        }
    }

    assistant.destroy().await;
    Ok(())
}

/// Stream one reply to stdout. Ctrl+C cancels the reply, not the program.
async fn run_exchange(assistant: &ChatAssistant, text: &str) {
    let cancel = CancellationToken::new();
    let mut printed = 0usize;
    let mut stdout = std::io::stdout();

    let exchange = assistant.send_message(
        text,
        |reply| {
            // Each snapshot extends the previous one; print the new tail.
            if let Some(tail) = reply.get(printed..) {
                let _ = write!(stdout, "{}", tail);
                let _ = stdout.flush();
            }
            printed = reply.len();
        },
        Some(&cancel),
    );
    tokio::pin!(exchange);

    let result = loop {
        tokio::select! {
            result = &mut exchange => break result,
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
        }
    };

    match result {
        Ok(_) => println!(),
        Err(e) if e.is_aborted() => eprintln!("\n   (stopped)"),
        Err(e) => eprintln!("\n   Error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/mode  quiz "), Command::Mode("quiz"));
        assert_eq!(Command::parse("/cards"), Command::Cards);
        assert_eq!(Command::parse("/search borrow checker"), Command::Search("borrow checker"));
    }

    #[test]
    fn anything_else_is_a_message() {
        assert_eq!(Command::parse("  explain this "), Command::Message("explain this"));
        assert_eq!(Command::parse("/unknown thing"), Command::Message("/unknown thing"));
    }
}
