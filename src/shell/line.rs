//! Local line editing for shells without a pseudo-terminal
//!
//! The remote interpreter only sees whole lines, so keystrokes are buffered
//! and echoed here. Raw passthrough only happens while `running` is set, and
//! nothing sets it on its own: a plain `sh` reports neither the start nor
//! the end of a foreground command.

const CR: &str = "\r";
const CTRL_C: &str = "\u{3}";
const DEL: &str = "\u{7f}";
const ARROWS: [&str; 4] = ["\u{1b}[A", "\u{1b}[B", "\u{1b}[C", "\u{1b}[D"];
const TAB: &str = "\t";

/// What one input chunk produces
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineOutput {
    /// Shown locally (subscribers and screen)
    pub echo: String,
    /// Written to the remote interpreter
    pub send: String,
}

#[derive(Debug, Default)]
pub struct LineDiscipline {
    buffer: String,
    running: bool,
}

impl LineDiscipline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Switch raw passthrough on or off for a caller that knows a
    /// foreground program owns the terminal
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn input(&mut self, data: &str) -> LineOutput {
        if self.running {
            return LineOutput {
                echo: data.to_string(),
                send: data.to_string(),
            };
        }

        match data {
            CR => {
                let line = self.buffer.trim().to_string();
                self.buffer.clear();
                LineOutput {
                    echo: "\r\n".to_string(),
                    send: format!("{}\n", line),
                }
            }
            CTRL_C => {
                self.buffer.clear();
                LineOutput {
                    echo: "\r".to_string(),
                    send: "\n".to_string(),
                }
            }
            // Never erase past the buffer, the prompt belongs to the remote side
            DEL => match self.buffer.pop() {
                Some(_) => LineOutput {
                    echo: "\u{8} \u{8}".to_string(),
                    send: String::new(),
                },
                None => LineOutput::default(),
            },
            TAB => LineOutput::default(),
            key if ARROWS.contains(&key) => LineOutput::default(),
            other => {
                self.buffer.push_str(other);
                LineOutput {
                    echo: other.to_string(),
                    send: String::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_all(line: &mut LineDiscipline, keys: &[&str]) -> (String, String) {
        let mut echo = String::new();
        let mut send = String::new();
        for key in keys {
            let out = line.input(key);
            echo.push_str(&out.echo);
            send.push_str(&out.send);
        }
        (echo, send)
    }

    #[test]
    fn test_enter_dispatches_trimmed_line() {
        let mut line = LineDiscipline::new();
        let (echo, send) = type_all(&mut line, &["l", "s", " ", "\r"]);
        assert_eq!(echo, "ls \r\n");
        assert_eq!(send, "ls\n");
        assert_eq!(line.buffer(), "");
        assert!(!line.is_running());
    }

    #[test]
    fn test_consecutive_commands_stay_line_buffered() {
        let mut line = LineDiscipline::new();
        let (echo, send) = type_all(&mut line, &["l", "s", "\r", "p", "w", "d", "\r"]);
        assert_eq!(echo, "ls\r\npwd\r\n");
        assert_eq!(send, "ls\npwd\n");
        assert!(!line.is_running());
    }

    #[test]
    fn test_empty_enter_does_not_start_command() {
        let mut line = LineDiscipline::new();
        assert_eq!(line.input("\r").send, "\n");
        assert!(!line.is_running());
    }

    #[test]
    fn test_backspace_never_underflows() {
        let mut line = LineDiscipline::new();
        assert_eq!(line.input("\u{7f}"), LineOutput::default());

        line.input("a");
        line.input("b");
        assert_eq!(line.input("\u{7f}").echo, "\u{8} \u{8}");
        assert_eq!(line.buffer(), "a");
    }

    #[test]
    fn test_ctrl_c_discards_line() {
        let mut line = LineDiscipline::new();
        line.input("r");
        line.input("m");
        let out = line.input("\u{3}");
        assert_eq!(out.echo, "\r");
        assert_eq!(out.send, "\n");
        assert_eq!(line.buffer(), "");
        assert!(!line.is_running());
    }

    #[test]
    fn test_arrows_and_tab_ignored() {
        let mut line = LineDiscipline::new();
        for key in ["\u{1b}[A", "\u{1b}[B", "\u{1b}[C", "\u{1b}[D", "\t"] {
            assert_eq!(line.input(key), LineOutput::default());
        }
        assert_eq!(line.buffer(), "");
    }

    #[test]
    fn test_passthrough_while_running() {
        let mut line = LineDiscipline::new();
        line.set_running(true);

        let out = line.input("\u{7f}");
        assert_eq!(out.echo, "\u{7f}");
        assert_eq!(out.send, "\u{7f}");
        assert_eq!(line.input("\r").send, "\r");

        line.set_running(false);
        assert_eq!(line.input("\r").send, "\n");
    }
}
