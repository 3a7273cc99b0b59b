use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use mindmate::app::{Action, App};
use mindmate::config::Config;
use mindmate::logging::init_logging;
use mindmate::ui::ui;

#[derive(Parser, Debug)]
#[command(name = "mindmate", version, about = "Terminal chat client for the MindMate backend")]
struct Cli {
    /// Backend base URL (overrides config and MINDMATE_API_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where downloaded files are saved
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Start with text-to-speech enabled
    #[arg(long)]
    tts: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let log_file = init_logging().unwrap_or_else(|e| {
        eprintln!("Warning: logging disabled: {}", e);
        None
    });

    let mut config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults. Error: {:#}", e);
        Config::default()
    });
    if let Some(url) = cli.base_url {
        config.api_base_url = url;
    }
    if let Some(dir) = cli.download_dir {
        config.download_dir = Some(dir);
    }
    if cli.tts {
        config.tts_enabled = true;
    }
    tracing::info!(
        "Starting MindMate against {} (log: {:?})",
        config.api_base_url,
        log_file
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel();
    let mut app = App::new(action_tx.clone(), &config);

    let input_handle = {
        let tx = action_tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if tx.send(Action::UserInput(key)).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Mouse(mouse)) => match mouse.kind {
                        MouseEventKind::ScrollUp => {
                            let _ = tx.send(Action::Scroll(-3));
                        }
                        MouseEventKind::ScrollDown => {
                            let _ = tx.send(Action::Scroll(3));
                        }
                        _ => {}
                    },
                    Ok(Event::Resize(w, h)) => {
                        let _ = tx.send(Action::Resize(w, h));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Terminal read failed: {}", e);
                        break;
                    }
                },
                Ok(false) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Terminal poll failed: {}", e);
                    break;
                }
            }
        })
    };

    // Initial load
    let _ = action_tx.send(Action::LoadFiles);
    let _ = action_tx.send(Action::LoadVoices);
    let _ = action_tx.send(Action::Render);

    let res = run_app(&mut terminal, &mut app, &mut action_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    drop(action_rx);
    drop(app);
    drop(action_tx);
    let _ = input_handle.await;

    tracing::info!("Exiting");
    res
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<'_>,
    action_rx: &mut mpsc::UnboundedReceiver<Action>,
) -> color_eyre::Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut ticker = tokio::time::interval(tick_rate);

    loop {
        tokio::select! {
            Some(action) = action_rx.recv() => {
                match action {
                    Action::Quit => return Ok(()),
                    Action::Resize(_, _) => {
                        terminal.autoresize()?;
                        terminal.draw(|f| ui(f, app))?;
                    }
                    action => {
                        if app.update(action).await {
                            terminal.draw(|f| ui(f, app))?;
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                if app.busy() {
                    app.spinner_state.calc_next();
                    terminal.draw(|f| ui(f, app))?;
                }
            }
        }
    }
}
