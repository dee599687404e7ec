use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;

use super::{
    event::{AppEvent, EventHandler},
    widgets::InputBar,
};
use crate::application::{pending::BulkKind, IntentOutcome, StateManager, TaskView};
use crate::domain::{Filter, Task, TaskId};
use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

#[derive(Debug, Clone, PartialEq)]
pub enum AppMode {
    Browse,
    /// Typing a task; `None` creates, `Some` edits that task.
    Input(Option<TaskId>),
    Help,
}

pub struct App {
    state_manager: Arc<StateManager>,

    // UI State
    mode: AppMode,
    input: InputBar,
    task_list_state: TableState,

    // Last view read from the state manager
    view: Arc<TaskView>,
}

impl App {
    pub fn new(state_manager: Arc<StateManager>) -> Self {
        let view = state_manager.view();
        let mut app = Self {
            state_manager,
            mode: AppMode::Browse,
            input: InputBar::new(),
            task_list_state: TableState::default(),
            view,
        };

        app.task_list_state.select(Some(0));
        app
    }

    /// Run an intent in the background so the UI keeps drawing while the
    /// request is in flight.
    fn spawn_intent<F, Fut>(&self, name: &'static str, intent: F)
    where
        F: FnOnce(Arc<StateManager>) -> Fut,
        Fut: Future<Output = IntentOutcome> + Send + 'static,
    {
        let future = intent(self.state_manager.clone());
        tokio::spawn(async move {
            let outcome = future.await;
            tracing::debug!("{} finished: {:?}", name, outcome);
        });
    }

    /// Pull the latest view and keep the selection in range.
    pub fn refresh_view(&mut self) {
        self.view = self.state_manager.view();

        let len = self.view.tasks.len();
        match self.task_list_state.selected() {
            _ if len == 0 => self.task_list_state.select(Some(0)),
            Some(index) if index >= len => self.task_list_state.select(Some(len - 1)),
            None => self.task_list_state.select(Some(0)),
            _ => {}
        }
    }

    fn selected_task(&self) -> Option<&Task> {
        self.task_list_state
            .selected()
            .and_then(|index| self.view.tasks.get(index))
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Result<bool> {
        if event == AppEvent::Quit {
            return Ok(true);
        }

        match self.mode.clone() {
            AppMode::Help => {
                if event != AppEvent::Tick {
                    self.mode = AppMode::Browse;
                }
            }
            AppMode::Input(target) => self.handle_input_event(event, target),
            AppMode::Browse => return Ok(self.handle_browse_event(event)),
        }

        Ok(false)
    }

    fn handle_input_event(&mut self, event: AppEvent, target: Option<TaskId>) {
        match event {
            AppEvent::Character(c) => self.input.insert_char(c),
            AppEvent::Backspace => self.input.delete_char(),
            AppEvent::Left => self.input.move_left(),
            AppEvent::Right => self.input.move_right(),
            AppEvent::Cancel => {
                self.input.take();
                self.mode = AppMode::Browse;
            }
            AppEvent::Enter => {
                let text = self.input.take();
                self.mode = AppMode::Browse;
                match target {
                    None => self.spawn_intent("create", move |manager| async move {
                        manager.create_task(&text).await
                    }),
                    Some(id) => self.spawn_intent("update", move |manager| async move {
                        manager.update_task(&id, &text).await
                    }),
                }
            }
            _ => {}
        }
    }

    /// Returns true when the app should quit.
    fn handle_browse_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::NextTask => self.next_task(),
            AppEvent::PreviousTask => self.previous_task(),
            AppEvent::NextFilter => self.activate_filter(self.view.filter.next()),
            AppEvent::PreviousFilter => self.activate_filter(self.view.filter.previous()),
            AppEvent::Enter => self.start_edit(),
            AppEvent::Cancel => self.dismiss_error(),
            AppEvent::Character(c) => match c {
                'q' => return true,
                '?' => self.mode = AppMode::Help,
                'j' => self.next_task(),
                'k' => self.previous_task(),
                'g' => self.task_list_state.select(Some(0)),
                'G' => {
                    let last = self.view.tasks.len().saturating_sub(1);
                    self.task_list_state.select(Some(last));
                }
                'a' => {
                    self.input.open("New task", "");
                    self.mode = AppMode::Input(None);
                }
                'e' => self.start_edit(),
                ' ' => {
                    if let Some(task) = self.selected_task() {
                        let id = task.id.clone();
                        let completed = !task.completed;
                        self.spawn_intent("toggle", move |manager| async move {
                            manager.toggle_complete(&id, completed).await
                        });
                    }
                }
                'd' => {
                    if let Some(task) = self.selected_task() {
                        let id = task.id.clone();
                        self.spawn_intent("delete", move |manager| async move {
                            manager.delete_task(&id).await
                        });
                    }
                }
                '1' | '2' | '3' => {
                    let index = c as usize - '1' as usize;
                    self.activate_filter(Filter::CYCLE[index]);
                }
                't' => {
                    let checked = !self.view.stats.all_completed;
                    self.spawn_intent("toggle all", move |manager| async move {
                        manager.toggle_all(checked).await
                    });
                }
                'c' => self.spawn_intent("clear completed", |manager| async move {
                    manager.delete_completed().await
                }),
                'r' => self.spawn_intent("retry", |manager| async move { manager.retry().await }),
                'x' => self.dismiss_error(),
                _ => {}
            },
            _ => {}
        }
        false
    }

    fn start_edit(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let (id, text) = (task.id.clone(), task.text.clone());
        self.input.open("Edit task", &text);
        self.mode = AppMode::Input(Some(id));
    }

    fn activate_filter(&mut self, filter: Filter) {
        // Switch synchronously so the next frame already shows the new tab.
        self.state_manager.set_filter(filter);
        self.task_list_state.select(Some(0));
        self.spawn_intent("load", |manager| async move { manager.ensure_loaded().await });
        self.refresh_view();
    }

    fn dismiss_error(&mut self) {
        self.state_manager.dismiss_error();
        self.refresh_view();
    }

    fn next_task(&mut self) {
        if self.view.tasks.is_empty() {
            return;
        }

        let current = self.task_list_state.selected().unwrap_or(0);
        let next = if current >= self.view.tasks.len() - 1 {
            0
        } else {
            current + 1
        };
        self.task_list_state.select(Some(next));
    }

    fn previous_task(&mut self) {
        if self.view.tasks.is_empty() {
            return;
        }

        let current = self.task_list_state.selected().unwrap_or(0);
        let previous = if current == 0 {
            self.view.tasks.len() - 1
        } else {
            current - 1
        };
        self.task_list_state.select(Some(previous));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let banner_height = if self.view.display_error.is_some() { 3 } else { 0 };
        let input_height = if matches!(self.mode, AppMode::Input(_)) { 3 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),             // Filter tabs
                Constraint::Length(banner_height), // Error banner
                Constraint::Min(0),                // Task list
                Constraint::Length(input_height),  // Input bar
                Constraint::Length(1),             // Stats
                Constraint::Length(1),             // Key hints
            ])
            .split(frame.area());

        self.render_filter_tabs(frame, chunks[0]);
        if let Some(error) = &self.view.display_error {
            self.render_error_banner(frame, chunks[1], error);
        }
        self.render_task_list(frame, chunks[2]);
        if input_height > 0 {
            self.input.render(frame, chunks[3]);
        }
        self.render_stats(frame, chunks[4]);
        self.render_status_bar(frame, chunks[5]);

        if self.mode == AppMode::Help {
            self.render_help(frame);
        }
    }

    fn render_filter_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<&str> = Filter::CYCLE.iter().map(|filter| filter.label()).collect();
        let selected = Filter::CYCLE
            .iter()
            .position(|filter| *filter == self.view.filter)
            .unwrap_or(0);

        let tabs = Tabs::new(titles)
            .block(
                Block::default()
                    .title("Todo")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            )
            .select(selected)
            .highlight_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD));

        frame.render_widget(tabs, area);
    }

    fn render_error_banner(&self, frame: &mut Frame, area: Rect, error: &str) {
        let hint = if self.view.retry_available {
            "  [r] retry  [x] dismiss"
        } else {
            "  [x] dismiss"
        };

        let line = Line::from(vec![
            Span::styled(error.to_string(), Style::default().fg(Color::Red)),
            Span::styled(hint, Style::default().fg(Color::DarkGray)),
        ]);

        let paragraph = Paragraph::new(line)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_task_list(&mut self, frame: &mut Frame, area: Rect) {
        let title = format!("{} ({})", self.view.filter.label(), self.view.tasks.len());
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Green));

        if self.view.tasks.is_empty() {
            let message = if self.view.loading {
                "Loading tasks..."
            } else {
                match self.view.filter {
                    Filter::All => "No tasks yet. Press 'a' to add one.",
                    Filter::Incomplete => "Nothing left to do",
                    Filter::Completed => "No completed tasks",
                }
            };
            let paragraph = Paragraph::new(message)
                .block(block)
                .style(Style::default().fg(Color::Gray));
            frame.render_widget(paragraph, area);
            return;
        }

        let rows: Vec<Row> = self
            .view
            .tasks
            .iter()
            .map(|task| {
                let (icon, icon_color) = if task.completed {
                    ("✓", Color::Green)
                } else {
                    ("○", Color::Gray)
                };
                let text_style = if task.completed {
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default()
                };
                let marker = if task.id.is_temporary() || self.state_manager.is_pending(&task.id) {
                    "…"
                } else {
                    ""
                };

                Row::new(vec![
                    Cell::from(Span::styled(icon, Style::default().fg(icon_color))),
                    Cell::from(Span::styled(task.text.clone(), text_style)),
                    Cell::from(marker).style(Style::default().fg(Color::Yellow)),
                    Cell::from(task.age_display()).style(Style::default().fg(Color::DarkGray)),
                    Cell::from(
                        task.completed_display()
                            .map(|done| format!("done {done}"))
                            .unwrap_or_default(),
                    )
                    .style(Style::default().fg(Color::Green)),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            &[
                Constraint::Length(2),  // Status icon
                Constraint::Min(20),    // Task text
                Constraint::Length(1),  // Pending marker
                Constraint::Length(10), // Age
                Constraint::Length(15), // Completion time
            ],
        )
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("");

        frame.render_stateful_widget(table, area, &mut self.task_list_state);
    }

    fn render_stats(&self, frame: &mut Frame, area: Rect) {
        let stats = &self.view.stats;
        let mut text = format!(
            " {} total, {} completed, {} remaining",
            stats.total, stats.completed, stats.remaining
        );
        if stats.all_completed {
            text.push_str(" - all done!");
        }

        let busy = [
            (BulkKind::CompleteAll, "completing all"),
            (BulkKind::IncompleteAll, "reopening all"),
            (BulkKind::DeleteCompleted, "clearing completed"),
        ];
        for (bulk, label) in busy {
            if self.state_manager.is_bulk_pending(bulk) {
                text.push_str(&format!(" ({label}…)"));
            }
        }

        let paragraph = Paragraph::new(text).style(Style::default().fg(Color::Gray));
        frame.render_widget(paragraph, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let help_text = match self.mode {
            AppMode::Input(_) => "Enter: save | Esc: cancel",
            _ => {
                if self.view.stats.all_completed {
                    "a: add | e: edit | Space: toggle | d: delete | Tab: filter | t: reopen all | c: clear completed | ?: help | q: quit"
                } else {
                    "a: add | e: edit | Space: toggle | d: delete | Tab: filter | t: complete all | c: clear completed | ?: help | q: quit"
                }
            }
        };

        let paragraph = Paragraph::new(help_text).style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame) {
        let popup_area = Self::centered_rect(60, 70, frame.area());

        frame.render_widget(Clear, popup_area);

        let help_text = vec![
            "Todo Help",
            "",
            "Navigation:",
            "  j/k or ↑/↓     - Move up/down in task list",
            "  g/G            - Go to first/last task",
            "  Tab/Shift+Tab  - Cycle filters",
            "  1/2/3          - All / Incomplete / Completed",
            "",
            "Task Actions:",
            "  a              - Add a task",
            "  e or Enter     - Edit selected task",
            "  Space          - Toggle task completion",
            "  d              - Delete selected task",
            "  t              - Complete all / reopen all",
            "  c              - Delete completed tasks",
            "",
            "Errors:",
            "  r              - Retry loading",
            "  x or Esc       - Dismiss error",
            "",
            "General:",
            "  ?              - Show this help",
            "  q              - Quit",
            "  Ctrl+C         - Force quit application",
            "",
            "Press any key to close this help",
        ]
        .join("\n");

        let paragraph = Paragraph::new(help_text)
            .block(Block::default().title("Help").borders(Borders::ALL))
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, popup_area);
    }

    fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
        let popup_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ])
            .split(r);

        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ])
            .split(popup_layout[1])[1]
    }
}

pub async fn run_tui(mut app: App) -> Result<()> {
    // color-eyre is already initialized in main.rs

    // Set up terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Initial load for the default filter
    app.spawn_intent("load", |manager| async move { manager.ensure_loaded().await });

    let result = event_loop(&mut terminal, &mut app);

    // Cleanup
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    result
}

// Ticks between redraws when nothing changed.
const IDLE_REDRAW_TICKS: u32 = 10;

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let mut event_handler = EventHandler::new();
    let mut changes = app.state_manager.subscribe();
    let mut redraw = true;
    let mut idle_ticks = 0;

    loop {
        if redraw || changes.has_changed() || idle_ticks >= IDLE_REDRAW_TICKS {
            app.refresh_view();
            terminal.draw(|frame| app.render(frame))?;
            idle_ticks = 0;
        }

        let event = event_handler.next_event()?;
        redraw = event != AppEvent::Tick;
        if !redraw {
            idle_ticks += 1;
        }

        if app.handle_event(event)? || event_handler.should_quit() {
            break;
        }
    }

    Ok(())
}
