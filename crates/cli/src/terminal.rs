use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use waymark_jobs::{JobList, JobMetrics, StatusSnapshot};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const TITLE: Color = Color::Cyan;
    const BAR: Color = Color::Green;
    const STATUS: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
}

const BAR_WIDTH: usize = 20;

/// Renders the jobs window and status bar.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, profile: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("waymark"),
            ResetColor,
            Print(" - Background jobs\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Profile: {}\n", profile)),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print the pool layout as `(name, threads)` pairs in id order.
    pub fn print_pools(&self, pools: &[(String, usize)]) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Pools:\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("{:<4} {:<12} {:<8}\n", "ID", "NAME", "THREADS")),
            ResetColor,
        )?;
        for (index, (name, threads)) in pools.iter().enumerate() {
            execute!(
                stdout,
                Print(format!("{:<4} {:<12} {:<8}\n", index, name, threads))
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Draw one frame of the jobs window followed by the status line.
    pub fn render_jobs(&self, list: &JobList, status: &StatusSnapshot) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Print("\n"))?;
        if list.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("  (no background jobs)\n"),
                ResetColor,
            )?;
        }
        for row in list.rows() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("  {:<5}", row.id.to_string())),
                SetForegroundColor(Colors::TITLE),
                Print(format!("{:<32}", truncate(&row.title, 30))),
                SetForegroundColor(Colors::BAR),
                Print(progress_bar(row.progress, BAR_WIDTH)),
                ResetColor,
                Print(format!(" {:>3.0}%\n", row.progress)),
            )?;
        }
        execute!(
            stdout,
            SetForegroundColor(Colors::STATUS),
            Print(format!("  [{}]\n", status)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print metrics as pretty JSON.
    pub fn print_metrics(&self, metrics: &JobMetrics) -> Result<()> {
        let json = serde_json::to_string_pretty(metrics)?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Metrics:\n"),
            ResetColor,
            Print(format!("{}\n", json)),
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// `[#####.....]` style bar for a percentage in `[0, 100]`.
fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
