use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Paragraph},
};

/// Single-line text entry used for adding and editing tasks.
pub struct InputBar {
    title: String,
    text: String,
    // Cursor position in chars, not bytes.
    cursor: usize,
}

impl InputBar {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            text: String::new(),
            cursor: 0,
        }
    }

    /// Start editing with `initial` text and the cursor at the end.
    pub fn open(&mut self, title: impl Into<String>, initial: &str) {
        self.title = title.into();
        self.text = initial.to_string();
        self.cursor = self.text.chars().count();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Return the entered text and reset the bar.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(index, _)| index)
            .unwrap_or(self.text.len())
    }

    pub fn insert_char(&mut self, c: char) {
        let index = self.byte_index(self.cursor);
        self.text.insert(index, c);
        self.cursor += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let index = self.byte_index(self.cursor);
        self.text.remove(index);
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!("{} (Enter: save, Esc: cancel)", self.title))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Yellow));

        let paragraph = Paragraph::new(self.text.as_str()).block(block);
        frame.render_widget(paragraph, area);

        let cursor_x = area.x + 1 + self.cursor as u16;
        if cursor_x < area.x + area.width.saturating_sub(1) {
            frame.set_cursor_position(Position {
                x: cursor_x,
                y: area.y + 1,
            });
        }
    }
}

impl Default for InputBar {
    fn default() -> Self {
        Self::new()
    }
}
