use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    thread,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use exercise_classifier::{
    BackendConfig, InferenceOrchestrator, OrtBackend, SessionConfig, start_session,
};

fn main() -> Result<()> {
    env_logger::init();

    let config = std::env::args()
        .nth(1)
        .map(BackendConfig::new)
        .unwrap_or_default();
    log::info!("loading artifacts from {}", config.models_dir().display());

    let backend = OrtBackend::load(&config);
    let orchestrator = Arc::new(InferenceOrchestrator::new(Arc::new(backend)));

    let (frame_tx, frame_rx) = bounded(16);
    let (reply_tx, reply_rx) = bounded(16);
    let session = start_session(orchestrator, SessionConfig::default(), frame_rx, reply_tx)
        .context("failed to start stream session")?;

    let writer = thread::spawn(move || -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for reply in reply_rx.iter() {
            serde_json::to_writer(&mut out, &reply).context("failed to encode reply")?;
            writeln!(out)?;
            out.flush()?;
        }
        Ok(())
    });

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read frame from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        if frame_tx.send(line).is_err() {
            break;
        }
    }
    drop(frame_tx);

    session
        .join()
        .map_err(|_| anyhow!("session worker panicked"))?;
    writer
        .join()
        .map_err(|_| anyhow!("reply writer panicked"))??;

    Ok(())
}
