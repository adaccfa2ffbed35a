//! Headless terminal screen
//!
//! Every chunk shown to the user is also fed here, so the rendered screen
//! can be handed back after the UI reattaches.

use vt100::Parser;

pub struct Screen {
    parser: Parser,
}

impl Screen {
    pub fn new(rows: u16, cols: u16, scrollback: usize) -> Self {
        Self {
            parser: Parser::new(rows.max(1), cols.max(1), scrollback),
        }
    }

    pub fn process(&mut self, data: &[u8]) {
        self.parser.process(data);
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows.max(1), cols.max(1));
    }

    /// (rows, cols)
    pub fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    /// Title set by the remote program via OSC, if any
    pub fn title(&self) -> Option<String> {
        let title = self.parser.screen().title();
        (!title.is_empty()).then(|| title.to_string())
    }

    /// Rendered rows joined with CRLF, without trailing blank rows
    pub fn contents(&self) -> String {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let mut rows: Vec<String> = screen
            .rows(0, cols)
            .map(|row| row.trim_end().to_string())
            .collect();
        let keep = rows.iter().rposition(|row| !row.is_empty()).map_or(0, |i| i + 1);
        rows.truncate(keep);
        rows.join("\r\n")
    }
}
