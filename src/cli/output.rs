//! CLI output formatting utilities.

use crate::scheduler::{SlotState, SlotStatus, SlotTransition, SlotWeight};
use crate::vector_store::QueryHit;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print a retrieved passage.
    pub fn hit(hit: &QueryHit, max_len: usize) {
        println!(
            "\n{} {} (score: {:.2})",
            style(">>").green(),
            style(format!("chunk {}", hit.chunk_index)).bold(),
            hit.score
        );
        println!("   {}", content_preview(&hit.text, max_len));
    }

    /// Print one row of the slot table.
    pub fn slot(status: &SlotStatus) {
        let state = format!("{:<9}", status.state.to_string());
        let state = match status.state {
            SlotState::Ready => style(state).green(),
            SlotState::Busy | SlotState::Loading => style(state).yellow(),
            SlotState::Paused => style(state).cyan(),
            SlotState::Error => style(state).red(),
            SlotState::Unloaded => style(state).dim(),
        };
        let weight = match status.weight {
            SlotWeight::Light => "light",
            SlotWeight::Heavy => "heavy",
        };
        let claim = if status.exclusive { "exclusive" } else { "shared" };
        let holder = if status.holds_accelerator {
            style(" [accelerator]").magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<14} {} {:<9} {:<5} p{}{}",
            style(status.name).bold(),
            state,
            claim,
            weight,
            status.priority,
            holder
        );
        if let Some(err) = &status.last_error {
            println!("  {:<14} {}", "", style(err).red());
        }
    }

    /// Print a state transition as it happens.
    pub fn transition(t: &SlotTransition) {
        let detail = t
            .detail
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!(
            "  {} {:<14} {} -> {}{}",
            style(format!("#{:<3}", t.seq)).dim(),
            t.slot,
            t.from,
            style(t.to).bold(),
            style(detail).dim()
        );
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Flatten and truncate content with an ellipsis.
fn content_preview(content: &str, max_len: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_len {
        content
    } else {
        let head: String = content.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("a\nb", 10), "a b");
        assert_eq!(content_preview("héllo world", 5), "héllo...");
    }
}
