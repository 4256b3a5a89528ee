//! Console prompts for permission approval
//!
//! A prompt blocks the whole process on one line of stdin. There is no
//! timeout and no way to cancel it once issued.

use std::io::{self, BufRead, IsTerminal, Write};

/// Asks the user yes/no questions
pub trait Prompter {
    /// Whether a human can answer prompts in this session
    fn is_interactive(&self) -> bool;

    /// Show `message` and block for one line of input
    fn ask(&mut self, message: &str) -> io::Result<String>;
}

/// Prompter reading from stdin and writing to stdout
pub struct ConsolePrompter {
    interactive: bool,
}

impl ConsolePrompter {
    /// Interactive when stdin is a terminal
    pub fn detect() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }

    /// Never prompts
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }
}

impl Prompter for ConsolePrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn ask(&mut self, message: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", message)?;
        stdout.flush()?;

        read_answer(&mut io::stdin().lock())
    }
}

/// One line from `reader`; end of input is an error, not an empty answer
fn read_answer(reader: &mut impl BufRead) -> io::Result<String> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed before an answer was given",
        ));
    }
    Ok(input)
}

/// Case-insensitive "yes"; anything else is a refusal
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Strip control characters and ANSI escape sequences from plugin-provided
/// text before it reaches the terminal.
pub fn sanitize_for_terminal(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek().copied() {
                Some('[') => {
                    // CSI: runs until a final byte in 0x40..=0x7e
                    chars.next();
                    for seq_c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&seq_c) {
                            break;
                        }
                    }
                }
                Some(']' | 'P' | '_' | '^' | 'X') => {
                    // String sequences end at BEL or ESC \
                    chars.next();
                    let mut prev = '\0';
                    for seq_c in chars.by_ref() {
                        if seq_c == '\x07' || (prev == '\x1b' && seq_c == '\\') {
                            break;
                        }
                        prev = seq_c;
                    }
                }
                _ => {}
            }
            continue;
        }

        if c.is_control() {
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
