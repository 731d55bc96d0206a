//! Terminal front end: the `chat` REPL and one-shot `ask`.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::App;
use crate::conversation::Conversation;

/// `onboard chat`: read questions from stdin until EOF or a quit token.
pub async fn run_chat(app: &App, thread_id: &str, warm: bool) -> Result<()> {
    if warm {
        eprintln!("Indexing knowledge base...");
        app.pipeline.build_index().await?;
    }

    let conversation = app.conversation()?;
    let agent = &app.config.agent.name;
    let quit = app.config.conversation.quit_tokens.join("' or '");
    println!("Chatting with {} (type '{}' to leave)", agent, quit);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if app.config.is_quit_token(input) {
            println!("Goodbye!");
            break;
        }

        if let Err(e) = print_turn(&conversation, thread_id, input, agent).await {
            eprintln!("\nError: {:#}", e);
        }
    }
    Ok(())
}

/// `onboard ask`: answer one question and exit.
pub async fn run_ask(app: &App, thread_id: &str, question: &str) -> Result<()> {
    let conversation = app.conversation()?;
    print_turn(&conversation, thread_id, question, &app.config.agent.name).await?;
    Ok(())
}

/// Stream one turn to stdout as `"{agent}: ..."`.
///
/// The fallback answer arrives as a fragment like any other text. If the
/// model streamed nothing at all, the final answer is printed instead.
pub async fn print_turn(
    conversation: &Arc<Conversation>,
    thread_id: &str,
    input: &str,
    agent: &str,
) -> Result<String> {
    let mut stream = conversation.stream(thread_id, input);
    let mut stdout = std::io::stdout();
    let mut streamed = false;

    while let Some(fragment) = stream.next_fragment().await {
        if !streamed {
            print!("{}: ", agent);
            streamed = true;
        }
        print!("{}", fragment);
        stdout.flush()?;
    }

    let answer = stream.finish().await?;
    if streamed {
        println!();
    } else {
        println!("{}: {}", agent, answer);
    }
    Ok(answer)
}
