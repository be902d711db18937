/**
 * punchqueue Client Entry Point
 *
 * Line-oriented front end for the offline engine. Reads one command per
 * line from stdin and prints status messages as the engine publishes them.
 *
 * Commands:
 *   punch <action> [company_id]
 *   vacation <start> <end> [comment]
 *   online | offline | flush | status | quit
 */

use punchqueue::client::{DashboardView, OfflineEngine, SessionSeed, SubmitOutcome};
use punchqueue::shared::config::EngineConfig;
use punchqueue::shared::{FormPayload, SubmitError};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load()?;
    tracing::info!("Starting punchqueue client for {}", config.origin);

    let engine = OfflineEngine::open(config, SessionSeed::default()).await?;

    let mut banner = engine.banner();
    tokio::spawn(async move {
        while let Some(status) = banner.next().await {
            println!("[{:?}] {}", status.state, status.message);
        }
    });

    engine.start().await;
    print_view(&engine.view().borrow());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = words.split_first() else {
            continue;
        };

        match *command {
            "punch" => {
                let Some(action) = args.first() else {
                    println!("usage: punch <action> [company_id]");
                    continue;
                };
                let mut payload = FormPayload::from_pairs([("action", *action)]);
                if let Some(company_id) = args.get(1) {
                    payload.insert("company_id", *company_id);
                }
                report(engine.submit_punch(payload).await);
            }
            "vacation" => {
                if args.len() < 2 {
                    println!("usage: vacation <start> <end> [comment]");
                    continue;
                }
                let payload = FormPayload::from_pairs([
                    ("start_date", args[0].to_string()),
                    ("end_date", args[1].to_string()),
                    ("comment", args[2..].join(" ")),
                ]);
                report(engine.submit_vacation(payload).await);
            }
            "online" => {
                engine.set_online(true);
            }
            "offline" => {
                engine.set_online(false);
            }
            "flush" => match engine.flush_now().await {
                Ok(reports) => {
                    for r in reports {
                        println!(
                            "{:?}: {} delivered, {} remaining{}",
                            r.kind,
                            r.processed,
                            r.remaining,
                            if r.failed { " (blocked)" } else { "" }
                        );
                    }
                }
                Err(e) => println!("flush failed: {}", e),
            },
            "status" => {
                print_view(&engine.refresh_view().await);
            }
            "quit" | "exit" => break,
            other => println!("unknown command: {}", other),
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn report(result: Result<SubmitOutcome, SubmitError>) {
    match result {
        Ok(SubmitOutcome::Delivered { navigate_to, notice }) => {
            println!("delivered");
            if let Some(notice) = notice {
                println!("  {}", notice);
            }
            if let Some(target) = navigate_to {
                println!("  -> {}", target);
            }
        }
        Ok(SubmitOutcome::Queued { id }) => println!("queued as {}", id),
        Err(e) => println!("error: {}", e),
    }
}

fn print_view(view: &DashboardView) {
    println!("Status:      {}", view.status_label);
    println!("Beginn:      {}", view.start_label);
    println!("Pause:       {}", view.break_label);
    println!("Arbeitszeit: {}", view.elapsed_label);
    println!(
        "Ausstehend:  {} Buchungen, {} Urlaubsanträge{}",
        view.punch_pending,
        view.vacation_pending,
        if view.online { "" } else { " (offline)" }
    );
    for row in &view.pending_vacations {
        println!(
            "  [{}] {} - {} {} (wartet auf Synchronisierung)",
            row.id, row.start_date, row.end_date, row.comment
        );
    }
}
