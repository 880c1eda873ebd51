//! Terminal adapter: permission prompts on stdin and rendered engine events

mod console;
mod input;
mod renderer;

pub use console::{Console, ConsolePrompter};
pub use input::read_requests;
pub use renderer::{answer_forms_with_defaults, ConsoleRenderer};
