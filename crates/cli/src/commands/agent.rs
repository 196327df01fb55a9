//! `handoff agent`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use handoff_agent::Session;
use handoff_cli::repl::{self, Input};
use handoff_cli::{Runtime, build_runtime};
use handoff_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: &Path,
    message: Option<String>,
    persona: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let provider = match handoff_providers::from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    HANDOFF_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY");
            eprintln!();
            eprintln!("  Or add `api_key` to your config file:");
            eprintln!("    {}", config_path.display());
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }
    };

    let runtime = build_runtime(&config, Arc::new(provider))?;
    let mut session = runtime.session();
    if let Some(id) = persona {
        session.switch_persona(&id)?;
    }

    match message {
        Some(msg) => single(&mut session, &msg).await,
        None => interactive(&config, &runtime, session).await,
    }
}

async fn single(session: &mut Session, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    eprint!("  Thinking...");
    let result = run_turn(session, message).await;
    eprint!("\r              \r");
    let answer = result?;
    println!("{}", repl::format_answer(session.active_persona(), &answer));
    Ok(())
}

async fn interactive(
    config: &AppConfig,
    runtime: &Runtime,
    mut session: Session,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = &runtime.agent;

    println!();
    println!("  handoff: interactive mode");
    println!();
    println!("  Provider:  {} ({})", agent.provider_name(), config.api_url);
    println!("  Model:     {}", agent.model());
    println!("  Personas:  {}", agent.personas().ids().join(", "));
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!("  Memory:    {}", config.memory.backend);
    println!();
    println!("  Commands: reset, status, /persona [id], exit");
    println!("  Ctrl+C cancels the current turn, or exits at the prompt.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You ({}) > ", session.active_persona());
        std::io::stdout().flush()?;

        // A turn's Ctrl+C watcher replaces the default SIGINT handler.
        let Some(line) = repl::next_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };

        match repl::parse(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Reset => {
                session.reset();
                println!("  Conversation cleared.");
            }
            Input::Status => print_status(runtime, &session),
            Input::ListPersonas => {
                for persona in agent.personas().iter() {
                    let marker = if persona.id == session.active_persona() { "*" } else { " " };
                    println!("  {marker} {:<16} {}", persona.id, persona.description);
                }
            }
            Input::SwitchPersona(id) => match session.switch_persona(&id) {
                Ok(()) => println!("  Now talking to '{id}'."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Message(text) => {
                eprint!("  ...");
                let result = run_turn(&mut session, &text).await;
                eprint!("\r     \r");
                match result {
                    Ok(answer) => {
                        println!();
                        for line in repl::format_answer(session.active_persona(), &answer).lines() {
                            println!("  {line}");
                        }
                        println!();
                    }
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn, cancelling it if Ctrl+C arrives first.
async fn run_turn(
    session: &mut Session,
    input: &str,
) -> Result<String, handoff_core::error::TurnError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = session.process_with_cancel(input, cancel).await;
    watcher.abort();
    result
}

fn print_status(runtime: &Runtime, session: &Session) {
    let status = session.status();
    println!("  Session:   {}", status.session_id);
    println!("  User:      {}", status.user_id);
    println!("  Persona:   {}", status.active_persona);
    println!(
        "  History:   {} messages (~{} tokens), {} turns",
        status.messages, status.estimated_tokens, status.turns
    );
    if let Some(telemetry) = &runtime.telemetry {
        let usage = telemetry.usage_snapshot();
        println!(
            "  Usage:     {} requests ({} delegated, {} failed), {} model calls, {} tool calls",
            usage.requests,
            usage.delegations,
            usage.failed_requests,
            usage.model_calls,
            usage.tool_calls
        );
        println!(
            "  Tokens:    {} prompt + {} completion = {}",
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens()
        );
    }
}
