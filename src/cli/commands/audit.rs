//! Audit command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::vision::ImageSource;
use anyhow::Result;

/// Run the audit command.
pub async fn run_audit(
    image: &str,
    question: Option<&str>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Audit) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let source = ImageSource::parse(image);

    let spinner = Output::spinner("Looking at the interface...");
    let result = orchestrator.audit(&source, question).await;
    spinner.finish_and_clear();

    match result {
        Ok(audit) if json => super::print_json(&audit)?,
        Ok(audit) => println!("\n{}\n", audit.report),
        Err(e) => {
            Output::error(&format!("Audit failed: {}", e));
            return Err(e.into());
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
