//! Operator command loop and event rendering.

use relaycast_core::{PlaybackItem, ProductionSupervisor, SupervisorEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::info;

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Play(String),
    Add(String),
    Start,
    Stop,
    Pause,
    Resume,
    Skip,
    Status,
    StatusJson,
    Help,
    Quit,
}

/// Runs the daemon: placeholder + monitor on startup, then the stdin
/// loop until EOF, `quit`, or a termination signal.
pub async fn run(supervisor: ProductionSupervisor) -> anyhow::Result<()> {
    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", render_event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("[{skipped} events dropped]");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let monitor = supervisor.spawn_monitor();
    supervisor.start_placeholder().await;
    info!("daemon up; placeholder and health monitor started");
    println!("relaycast ready; type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sigterm = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => dispatch(&supervisor, command).await,
                    Err(usage) => println!("{usage}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            _ = sigterm.recv() => break,
        }
    }

    info!("shutting down");
    monitor.abort();
    supervisor.shutdown().await;
    Ok(())
}

async fn dispatch(supervisor: &ProductionSupervisor, command: Command) {
    match command {
        Command::Play(reference) => supervisor.play_now(PlaybackItem::new(reference)).await,
        Command::Add(reference) => supervisor.enqueue(PlaybackItem::new(reference)).await,
        Command::Start => supervisor.start_queue().await,
        Command::Stop => supervisor.stop_all().await,
        Command::Pause => supervisor.pause().await,
        Command::Resume => supervisor.resume().await,
        Command::Skip => supervisor.interrupt_current().await,
        Command::Status => print_status(supervisor).await,
        Command::StatusJson => print_status_json(supervisor).await,
        Command::Help => print_help(),
        // Handled by the loop.
        Command::Quit => {}
    }
}

/// Parses one input line. `Ok(None)` for blank lines; `Err` carries a
/// usage message.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let rest = parts.collect::<Vec<_>>().join(" ");

    let command = match verb {
        "play" => {
            if rest.is_empty() {
                return Err("usage: play <reference>".to_string());
            }
            Command::Play(rest)
        }
        "add" => {
            if rest.is_empty() {
                return Err("usage: add <reference>".to_string());
            }
            Command::Add(rest)
        }
        "start" => Command::Start,
        "stop" => Command::Stop,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "skip" => Command::Skip,
        "status" => {
            if rest == "json" {
                Command::StatusJson
            } else {
                Command::Status
            }
        }
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}'; type 'help'")),
    };
    Ok(Some(command))
}

async fn print_status(supervisor: &ProductionSupervisor) {
    let status = supervisor.status().await;

    match &status.current {
        Some(item) => {
            let name = item.title.as_deref().unwrap_or(&item.reference);
            let suffix = if status.paused { " (paused)" } else { "" };
            println!("Now playing: {name}{suffix}");
        }
        None => println!("Nothing is playing"),
    }

    if status.queue.is_empty() {
        println!("Queue is empty");
    } else {
        let mode = if status.queue_mode {
            "draining"
        } else {
            "stopped"
        };
        println!("Queue ({mode}):");
        for (index, item) in status.queue.iter().enumerate() {
            let name = item.title.as_deref().unwrap_or(&item.reference);
            println!("  {}. {name}", index + 1);
        }
    }

    println!(
        "Placeholder elapsed: {}s",
        status.placeholder_elapsed_secs
    );
}

async fn print_status_json(supervisor: &ProductionSupervisor) {
    let status = supervisor.status().await;
    match serde_json::to_string_pretty(&status) {
        Ok(json) => println!("{json}"),
        Err(error) => println!("status serialization failed: {error}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  play <reference>   stop whatever is playing and play this now");
    println!("  add <reference>    append to the queue");
    println!("  start              start draining the queue");
    println!("  stop               stop playback and return to the placeholder");
    println!("  pause              suspend the running pipeline");
    println!("  resume             resume a suspended pipeline");
    println!("  skip               stop the current item (placeholder excluded)");
    println!("  status [json]      show current playback and queue");
    println!("  quit               stop everything and exit");
}

fn render_event(event: &SupervisorEvent) -> String {
    match event {
        SupervisorEvent::PlaybackStarted { reference, title } => {
            let name = title.as_deref().unwrap_or(reference);
            format!("Now playing: {name}")
        }
        SupervisorEvent::PlaybackFinished { reference } => {
            format!("Finished: {reference}")
        }
        SupervisorEvent::ResolveFailed { reference, reason } => {
            format!("Could not resolve '{reference}': {reason}")
        }
        SupervisorEvent::SpawnFailed { reference, reason } => {
            format!("Could not start encoder for '{reference}': {reason}")
        }
        SupervisorEvent::PipelineCrashed {
            reference,
            attempt,
            retry_delay_secs,
        } => format!(
            "Pipeline for '{reference}' crashed (attempt {attempt}); retrying in {retry_delay_secs}s"
        ),
        SupervisorEvent::TooManyFailures { reference } => {
            format!("Giving up on '{reference}' after repeated crashes")
        }
        SupervisorEvent::Enqueued {
            reference,
            position,
        } => format!("Queued '{reference}' at position {position}"),
        SupervisorEvent::QueueStarted => "Queue started".to_string(),
        SupervisorEvent::QueueEmpty => "Queue is empty; nothing to start".to_string(),
        SupervisorEvent::QueueFinished => "Queue finished".to_string(),
        SupervisorEvent::Paused => "Paused".to_string(),
        SupervisorEvent::Resumed => "Resumed".to_string(),
        SupervisorEvent::Stopped => "Stopped; returning to placeholder".to_string(),
        SupervisorEvent::Interrupted { reference } => {
            format!("Skipped '{reference}'")
        }
        SupervisorEvent::PlaceholderProtected => {
            "The placeholder cannot be skipped".to_string()
        }
        SupervisorEvent::MonitorIntervention { detail } => {
            format!("Recovered from a stalled state: {detail}")
        }
        SupervisorEvent::Notice { message } => message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_parse_to_nothing() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn play_requires_a_reference() {
        assert!(parse_command("play").is_err());
        assert_eq!(
            parse_command("play https://example.com/v"),
            Ok(Some(Command::Play("https://example.com/v".to_string())))
        );
    }

    #[test]
    fn add_keeps_the_full_argument() {
        assert_eq!(
            parse_command("add some ref with spaces"),
            Ok(Some(Command::Add("some ref with spaces".to_string())))
        );
    }

    #[test]
    fn bare_verbs_parse() {
        assert_eq!(parse_command("start"), Ok(Some(Command::Start)));
        assert_eq!(parse_command("stop"), Ok(Some(Command::Stop)));
        assert_eq!(parse_command("pause"), Ok(Some(Command::Pause)));
        assert_eq!(parse_command("resume"), Ok(Some(Command::Resume)));
        assert_eq!(parse_command("skip"), Ok(Some(Command::Skip)));
        assert_eq!(parse_command("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn status_takes_an_optional_json_flag() {
        assert_eq!(parse_command("status"), Ok(Some(Command::Status)));
        assert_eq!(parse_command("status json"), Ok(Some(Command::StatusJson)));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(parse_command("dance").is_err());
    }
}
