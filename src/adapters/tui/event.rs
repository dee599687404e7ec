use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Quit,
    Cancel,
    Enter,

    // Navigation
    NextTask,
    PreviousTask,
    Left,
    Right,
    NextFilter,
    PreviousFilter,

    // Input handling
    Character(char),
    Backspace,

    // Other
    Tick,
}

pub struct EventHandler {
    should_quit: bool,
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            tick_rate: Duration::from_millis(100),
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Wait up to one tick for terminal input.
    pub fn next_event(&mut self) -> Result<AppEvent> {
        if event::poll(self.tick_rate)? {
            match event::read()? {
                Event::Key(key_event) => Ok(self.handle_key_event(key_event)),
                _ => Ok(AppEvent::Tick),
            }
        } else {
            Ok(AppEvent::Tick)
        }
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) -> AppEvent {
        match key_event {
            // Global quit with Ctrl+C
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                self.should_quit = true;
                AppEvent::Quit
            }

            KeyEvent {
                code: KeyCode::Esc, ..
            } => AppEvent::Cancel,

            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => AppEvent::Enter,

            KeyEvent {
                code: KeyCode::Tab, ..
            } => AppEvent::NextFilter,

            KeyEvent {
                code: KeyCode::BackTab,
                ..
            } => AppEvent::PreviousFilter,

            KeyEvent {
                code: KeyCode::Down,
                ..
            } => AppEvent::NextTask,

            KeyEvent {
                code: KeyCode::Up, ..
            } => AppEvent::PreviousTask,

            KeyEvent {
                code: KeyCode::Left,
                ..
            } => AppEvent::Left,

            KeyEvent {
                code: KeyCode::Right,
                ..
            } => AppEvent::Right,

            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => AppEvent::Backspace,

            // Letters are context-sensitive: commands in the list, text in the input bar
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => AppEvent::Character(c),

            _ => AppEvent::Tick,
        }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
