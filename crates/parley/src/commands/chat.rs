use crate::config::Config;
use anyhow::{Context, Result};
use parley_adapters::{register_location_tool, register_weather_tool, Coordinates, StaticLocation};
use parley_runtime::{
    AnnotationLevel, HttpTransport, RecordingTransport, ReplayTransport, Session, SessionEvent,
    SessionOutcome, ToolRegistry, Transport,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Where backend bytes come from
pub enum FixtureMode {
    Live,
    Record(PathBuf),
    Replay(PathBuf),
}

impl FixtureMode {
    pub fn from_flags(record: Option<PathBuf>, replay: Option<PathBuf>) -> Self {
        match (record, replay) {
            (Some(dir), _) => FixtureMode::Record(dir),
            (None, Some(dir)) => FixtureMode::Replay(dir),
            (None, None) => FixtureMode::Live,
        }
    }
}

/// Build the tool registry from config (fully, before Arc wrapping)
pub fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let location = &config.tools.location;
    if location.enabled {
        match (location.latitude, location.longitude) {
            (Some(lat), Some(lon)) => {
                let source = Arc::new(StaticLocation(Coordinates::new(lat, lon)));
                register_location_tool(&mut registry, source)?;
            }
            _ => warn!("Location tool enabled but no coordinates configured, skipping"),
        }
    }

    if config.tools.weather.enabled {
        register_weather_tool(&mut registry, config.tools.weather.base_url.as_deref())?;
    }

    for (tool, secs) in &config.tools.timeouts {
        registry.configure_timeout(tool, Duration::from_secs(*secs));
    }

    Ok(registry)
}

/// Interactive chat REPL
pub async fn execute(config: &Config, fixtures: FixtureMode) -> Result<()> {
    let registry = Arc::new(build_registry(config)?);

    let mut recorder: Option<(Arc<RecordingTransport<HttpTransport>>, PathBuf)> = None;
    let transport: Arc<dyn Transport> = match fixtures {
        FixtureMode::Live => Arc::new(HttpTransport::new(config.transport_config())?),
        FixtureMode::Record(dir) => {
            let recording = Arc::new(RecordingTransport::new(HttpTransport::new(
                config.transport_config(),
            )?));
            recorder = Some((recording.clone(), dir));
            recording
        }
        FixtureMode::Replay(dir) => {
            info!(dir = %dir.display(), "Replaying fixture");
            Arc::new(ReplayTransport::load(&dir)?)
        }
    };

    let session = Session::new(registry.clone(), transport, config.session_config());

    println!(
        "Parley [{}] - {} tool(s) - Type 'exit' to quit",
        config.backend.endpoint,
        registry.len()
    );
    println!("Session: {}", session.id());
    println!("---");

    // Interactive REPL
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input == "exit" || input == "quit" {
            break;
        }

        // Subscribe before submitting so no delta is missed
        let mut events = session.subscribe();
        let handle = match session.submit_text(input) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("\nError: {}\n", e);
                continue;
            }
        };

        println!();
        let wait = handle.wait();
        tokio::pin!(wait);
        let outcome = loop {
            tokio::select! {
                outcome = &mut wait => break outcome,
                event = events.recv() => match event {
                    Ok(event) => print_event(&event)?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Event consumer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                _ = tokio::signal::ctrl_c() => {
                    session.cancel();
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            print_event(&event)?;
        }

        match outcome.context("Submission task failed")? {
            SessionOutcome::Completed { .. } => println!("\n"),
            SessionOutcome::Failed { reason } => eprintln!("\n\nError: {}\n", reason),
            SessionOutcome::Cancelled => println!("\n[cancelled]\n"),
        }
    }

    if let Some((recording, dir)) = recorder {
        recording.save(&dir)?;
        println!("Fixture saved: {:?}", dir);
    }

    Ok(())
}

fn print_event(event: &SessionEvent) -> Result<()> {
    let mut stdout = io::stdout();
    match event {
        SessionEvent::TextDelta { text } => {
            print!("{}", text);
            stdout.flush()?;
        }
        SessionEvent::ToolInvoked { name } => {
            println!("[tool: {}]", name);
        }
        SessionEvent::Annotated { annotation } if annotation.level == AnnotationLevel::Warning => {
            eprintln!("\n[warning: {}]", annotation.message);
        }
        _ => {}
    }
    Ok(())
}
