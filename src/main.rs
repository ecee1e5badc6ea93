use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use buddy::config::{default_config_path, CompanionConfig};
use buddy::kernel::context::CompanionContext;
use buddy::kernel::event::{InputEvent, UiCommand};
use buddy::kernel::time::SystemClock;
use buddy::Reactor;

fn render(cmd: UiCommand) {
    match cmd {
        UiCommand::ShowAwake { window_title } => println!("[awake] {}", window_title),
        UiCommand::ShowNotice { text, hint, status, pet_state } => {
            println!("[{}] {}\n{}\n  ({})", pet_state, status, text, hint)
        }
        UiCommand::ShowThinking => println!("[thinking] ..."),
        UiCommand::ShowReply { text, hint, mode } => println!("[{}] {}\n  ({})", mode, text, hint),
        UiCommand::Rest => println!("[resting]"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = default_config_path();
    let config = CompanionConfig::load_from(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("{}", "=".repeat(50));
    println!("  BuddyGPT - Screen AI Assistant");
    println!("{}", "=".repeat(50));
    println!("  {} = Wake buddy  (console: /wake [app])", config.hotkey_activate);
    println!("  {} = Quit        (console: /quit)", config.hotkey_quit);
    println!("  model: {}", config.model);
    println!("{}", "=".repeat(50));

    let (input_tx, input_rx) = mpsc::channel(100);
    let (ui_tx, mut ui_rx) = mpsc::channel(100);

    let mut ctx = CompanionContext::from_config(config, config_path);
    ctx.fsm
        .on_state_change(|old, new| tracing::debug!("Posture {} -> {}", old, new));
    let mut reactor = Reactor::new(ctx, input_rx, ui_tx, Arc::new(SystemClock));
    let shutdown = reactor.shutdown_token();

    tokio::spawn(async move {
        while let Some(cmd) = ui_rx.recv().await {
            render(cmd);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(event) = InputEvent::from_console(&line) else {
                continue;
            };
            let quit = event == InputEvent::Quit;
            if input_tx.send(event).await.is_err() || quit {
                return;
            }
        }
        let _ = input_tx.send(InputEvent::Quit).await;
    });

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    reactor.run().await;
    println!("BuddyGPT exited.");
    Ok(())
}
