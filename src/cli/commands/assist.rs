//! Assist command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::perspectives::AssistantReply;
use crate::scheduler::SlotName;
use crate::transcription::decode_wav;
use anyhow::{Context, Result};
use console::style;
use futures::stream::{self, StreamExt};
use std::io::{self, BufRead};
use std::path::PathBuf;

/// Recordings decoded at the same time.
const DECODE_CONCURRENCY: usize = 4;

/// Run the assist command.
pub async fn run_assist(
    text: &[String],
    audio: &[PathBuf],
    json: bool,
    settings: Settings,
) -> Result<()> {
    let operation = Operation::Assist {
        audio: !audio.is_empty(),
    };
    if let Err(e) = preflight::check(&settings, operation) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    if !audio.is_empty() {
        transcribe_recordings(&orchestrator, audio).await?;
    } else if !text.is_empty() {
        orchestrator.push_utterance(&text.join(" "));
    } else {
        for line in io::stdin().lock().lines() {
            orchestrator.push_utterance(&line?);
        }
    }

    let spinner = Output::spinner("Listening...");
    let result = orchestrator.assist(None).await;
    spinner.finish_and_clear();

    match result {
        Ok(reply) if json => super::print_json(&reply)?,
        Ok(reply) => print_reply(&reply),
        Err(e) => {
            Output::error(&format!("The assistant could not respond: {}", e));
            return Err(e.into());
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}

async fn transcribe_recordings(orchestrator: &Orchestrator, paths: &[PathBuf]) -> Result<()> {
    let spinner = Output::spinner("Loading speech recognizer...");
    let loaded = orchestrator
        .scheduler()
        .ensure_loaded(SlotName::Transcription)
        .await;
    spinner.finish_and_clear();
    loaded?;

    // Decode ahead, transcribe in order.
    let mut recordings = stream::iter(paths.iter().cloned())
        .map(|path| async move {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let samples = decode_wav(&bytes)
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            Ok::<_, anyhow::Error>((path, samples))
        })
        .buffered(DECODE_CONCURRENCY);

    while let Some(recording) = recordings.next().await {
        let (path, samples) = recording?;
        match orchestrator.transcribe(&samples).await? {
            Some(utterance) => Output::kv(
                &utterance.at.format("%H:%M:%S").to_string(),
                &utterance.text,
            ),
            None => Output::warning(&format!("Nothing recognized in {}", path.display())),
        }
    }
    Ok(())
}

fn print_reply(reply: &AssistantReply) {
    println!(
        "\n{} {}\n",
        style(format!("[{}]", reply.perspective)).cyan().bold(),
        reply.response
    );
    Output::header("Perspective scores");
    for score in &reply.scores {
        Output::kv(&format!("{:>5.1}%", score.score * 100.0), &score.label);
    }
}
