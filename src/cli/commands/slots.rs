//! Slots command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::scheduler::{RestoreOutcome, SchedulerEvent};
use anyhow::Result;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Run the slots command.
pub async fn run_slots(start: bool, json: bool, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    if start {
        if !json {
            Output::header("Starting worker slots");
        }

        let mut events = orchestrator.scheduler().subscribe();
        let starting = orchestrator.start();
        tokio::pin!(starting);

        let outcome = loop {
            tokio::select! {
                outcome = &mut starting => break outcome,
                event = events.recv() => match event {
                    Ok(event) => show(&event, json),
                    Err(RecvError::Lagged(missed)) => {
                        Output::warning(&format!("{} transitions not shown", missed))
                    }
                    Err(RecvError::Closed) => {}
                },
            }
        };
        loop {
            match events.try_recv() {
                Ok(event) => show(&event, json),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        if let RestoreOutcome::Completed { failed } = &outcome {
            for slot in failed {
                Output::warning(&format!("Slot {} did not start", slot));
            }
        }
    }

    let slots = orchestrator.slots();
    if json {
        super::print_json(&slots)?;
    } else {
        Output::header("Worker slots");
        for status in &slots {
            Output::slot(status);
        }
    }

    if start {
        orchestrator.shutdown().await?;
    }
    Ok(())
}

fn show(event: &SchedulerEvent, json: bool) {
    if let (SchedulerEvent::Transition(t), false) = (event, json) {
        Output::transition(t);
    }
}
