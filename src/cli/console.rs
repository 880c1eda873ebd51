use async_trait::async_trait;
use colored::*;
use std::io::{self, Write};

use crate::permissions::{PermissionPrompt, PermissionPrompter, PromptAnswer, RiskClass};
use crate::tools::{LineStyle, Presentation};

/// Console handles all terminal I/O with colored formatting
#[derive(Debug, Clone)]
pub struct Console {
    tool_color: Color,
    prompt_color: Color,
}

impl Console {
    /// Create a new Console with default colors
    pub fn new() -> Self {
        Self {
            tool_color: Color::Magenta,
            prompt_color: Color::Yellow,
        }
    }

    /// Create a new Console with custom colors
    pub fn with_colors(tool_color: Color, prompt_color: Color) -> Self {
        Self {
            tool_color,
            prompt_color,
        }
    }

    /// Print a system message (errors, info, etc.)
    pub fn print_system(&self, message: &str) {
        println!("{} {}", "System:".yellow().bold(), message);
    }

    /// Print an error message
    pub fn print_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }

    /// Print a tool action message
    pub fn print_tool_action(&self, tool_name: &str, action: &str) {
        println!(
            "{} {} {}",
            "Tool:".color(self.tool_color).bold(),
            format!("[{}]", tool_name).color(self.tool_color),
            action
        );
    }

    /// Print one line of streamed tool output
    pub fn print_progress(&self, line: &str) {
        println!("  {}", line.bright_black());
    }

    /// Print a tool's headline and styled lines
    pub fn print_presentation(&self, presentation: &Presentation, is_error: bool) {
        if is_error {
            println!("  {} {}", "⎿".red(), presentation.headline.red());
        } else {
            println!("  {} {}", "⎿".bright_black(), presentation.headline);
        }
        for line in &presentation.lines {
            let text = match line.style {
                LineStyle::Plain => line.text.normal(),
                LineStyle::Added => line.text.green(),
                LineStyle::Removed => line.text.red(),
                LineStyle::Dim => line.text.bright_black(),
                LineStyle::Error => line.text.red(),
            };
            println!("    {}", text);
        }
    }

    /// Print a separator line
    pub fn print_separator(&self) {
        println!("{}", "-".repeat(60).bright_black());
    }

    /// Ask for permission to run a tool
    ///
    /// Blocks on stdin. Anything but a listed choice rejects.
    pub fn ask_permission(&self, prompt: &PermissionPrompt) -> io::Result<PromptAnswer> {
        let options = prompt.options();

        println!();
        println!("{}", "─".repeat(60).color(self.prompt_color));
        println!(
            "{} {}",
            "Permission Required:".color(self.prompt_color).bold(),
            prompt.user_facing_name.color(self.tool_color).bold()
        );
        println!();
        println!("  {}", prompt.summary);
        match prompt.risk {
            RiskClass::Safe => {}
            risk => println!("  {}", format!("Risk: {}", risk).red()),
        }
        println!();
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
        println!("{}", "─".repeat(60).color(self.prompt_color));
        print!(
            "{} ",
            format!("Your choice (1-{}):", options.len())
                .color(self.prompt_color)
                .bold()
        );
        io::stdout().flush()?;

        let choice = read_line()?.to_lowercase();
        let remember_offered = prompt.remember.is_some();
        let answer = match (choice.as_str(), remember_offered) {
            ("1", _) | ("y", _) | ("yes", _) => PromptAnswer::AllowOnce,
            ("2", true) | ("a", true) | ("always", true) => PromptAnswer::AllowAndRemember,
            _ => {
                print!("{} ", "Tell the model what to do differently (optional):".yellow());
                io::stdout().flush()?;
                let message = read_line()?;
                PromptAnswer::Reject {
                    message: (!message.is_empty()).then_some(message),
                }
            }
        };

        match &answer {
            PromptAnswer::AllowOnce => println!("{}", "✓ Allowed".green()),
            PromptAnswer::AllowAndRemember => println!(
                "{}",
                format!("✓ Always allowing {}", prompt.user_facing_name).green()
            ),
            PromptAnswer::Reject { .. } => println!("{}", "✗ Rejected".red()),
        }
        println!();

        Ok(answer)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn read_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Answers permission prompts on the terminal
#[derive(Debug, Clone, Default)]
pub struct ConsolePrompter {
    console: Console,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_console(console: Console) -> Self {
        Self { console }
    }
}

#[async_trait]
impl PermissionPrompter for ConsolePrompter {
    async fn ask(&self, prompt: PermissionPrompt) -> PromptAnswer {
        let console = self.console.clone();
        let answer = tokio::task::spawn_blocking(move || console.ask_permission(&prompt)).await;
        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!("Failed to read permission answer: {}", e);
                PromptAnswer::Reject { message: None }
            }
            Err(e) => {
                tracing::warn!("Permission prompt task failed: {}", e);
                PromptAnswer::Reject { message: None }
            }
        }
    }
}
