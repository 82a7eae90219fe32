//! Tool Library Sync
//!
//! Mirrors a CAM tool library into a remote Airtable table, on startup, on
//! request and on a fixed interval.

// toolsync/src/main.rs
mod config;
mod errors;
mod library;
mod mapping;
mod remote;
mod sync;
mod utils;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::thread;
use sync::{SyncReport, SyncService};
use tokio::sync::mpsc;

const CONSOLE_QUEUE_DEPTH: usize = 16;

/// Main entry point for the tool sync service
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    utils::logging::init_logging();

    match run_app().await {
        Ok(_) => {
            println!("✅ ToolSync finished.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = utils::resolve_config_path();
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "run" => {
            println!("🚀 Starting ToolSync service for library '{}'...", app_config.library.name);
            run_service(&app_config).await
                .context("ToolSync service failed")?;
        }
        "2" | "once" => {
            println!("🔄 Synchronizing library '{}' once...", app_config.library.name);
            let report = sync::run_sync_once(&app_config).await
                .context("Sync process failed")?;
            print_report(&report);
            if !report.succeeded() {
                anyhow::bail!("Synchronization finished with failures");
            }
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (run) or '2' (once).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Runs the background service and serves console commands until `quit`
/// or Ctrl-C. Closing stdin leaves the service running until Ctrl-C.
async fn run_service(app_config: &AppConfig) -> Result<()> {
    let engine = sync::build_engine(app_config)?;
    let (service, startup) = SyncService::start(engine, app_config).await?;
    print_report(&startup);

    println!("Commands: 'sync' (sync changes now), 'resync' (force full resync), 'quit'");
    let mut lines = spawn_console_reader(io::BufReader::new(io::stdin()))?;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!("Received Ctrl-C, stopping...");
                break;
            }
            line = lines.recv(), if stdin_open => {
                match line.transpose().context("Failed to read user input")? {
                    None => stdin_open = false,
                    Some(command) => match command.trim() {
                        "sync" => {
                            if let Some(report) = service.sync_now().await {
                                print_report(&report);
                            }
                        }
                        "resync" => {
                            if let Some(report) = service.force_full_sync().await {
                                print_report(&report);
                            }
                        }
                        "quit" | "exit" => break,
                        "" => {}
                        other => println!("Unknown command '{}'", other),
                    },
                }
            }
        }
    }

    service.stop().await;
    Ok(())
}

/// Forwards console lines from a plain OS thread. A thread blocked on input
/// never holds up runtime shutdown, so Ctrl-C exits promptly.
fn spawn_console_reader<R>(reader: R) -> Result<mpsc::Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(CONSOLE_QUEUE_DEPTH);
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if sender.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("Failed to start console input thread")?;
    Ok(receiver)
}

fn print_report(report: &SyncReport) {
    if let Some(error) = &report.library_error {
        println!("❌ Failed to read tool library: {}", error);
        return;
    }
    let marker = if report.succeeded() { "✓" } else { "⚠️" };
    println!(
        "{} Processed {} tools: {} new, {} modified, {} unchanged, {} failed ({} ms)",
        marker,
        report.processed,
        report.new,
        report.modified,
        report.unchanged(),
        report.failed,
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

/// Prompts user to select the run mode
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{stdin, stdout, Write};

    println!("Select an operation:");
    println!("1. Run sync service with background synchronization (or type 'run')");
    println!("2. Synchronize the full library once and exit (or type 'once')");
    print!("Enter your choice: ");
    let _ = stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Blocks every read until the paired sender is dropped.
    struct StalledInput(std_mpsc::Receiver<()>);

    impl Read for StalledInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_console_reader_forwards_lines_until_eof() -> Result<()> {
        let mut lines = spawn_console_reader(Cursor::new("sync\n resync \nquit\n"))?;

        let mut received = Vec::new();
        while let Some(line) = lines.recv().await {
            received.push(line?);
        }
        assert_eq!(received, vec!["sync", " resync ", "quit"]);
        Ok(())
    }

    #[test]
    fn test_blocked_console_does_not_hold_runtime_shutdown() -> Result<()> {
        let (release, stalled) = std_mpsc::channel::<()>();
        let (done, finished) = std_mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("runtime builds");
            runtime.block_on(async {
                let _lines = spawn_console_reader(io::BufReader::new(StalledInput(stalled)))
                    .expect("reader starts");
                tokio::task::yield_now().await;
            });
            drop(runtime);
            let _ = done.send(());
        });

        let shut_down = finished.recv_timeout(Duration::from_secs(5));
        drop(release);
        assert!(shut_down.is_ok(), "runtime shutdown waited on console input");
        Ok(())
    }
}
