//! Terminal UI: approval queue, activity log, chat.
//!
//! One full-screen ratatui app. The agent threads push log lines, chat
//! responses and connection status into shared state; the UI thread owns
//! the terminal and fires a chat callback when the engineer sends a
//! message. Quitting the UI stops the agent.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};

use mix_llm::Urgency;

use crate::approval::ApprovalQueue;

const MAX_LOGS: usize = 100;
const MAX_CHAT: usize = 50;
const TICK: Duration = Duration::from_millis(100);

/// Connection indicators shown in the status bar.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    pub console_connected: bool,
    pub console_type: String,
    pub audio_connected: bool,
    pub audio_backend: String,
    pub audio_channels: u16,
    pub audio_sample_rate: f32,
    pub llm_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiMode {
    Approval,
    Chat,
}

#[derive(Default)]
struct UiState {
    status: String,
    logs: VecDeque<String>,
    chat: VecDeque<String>,
    conn: ConnectionStatus,
}

type ChatHandler = Box<dyn Fn(&str) + Send + Sync>;

pub struct TerminalUi {
    state: Mutex<UiState>,
    running: AtomicBool,
    chat_handler: Mutex<Option<ChatHandler>>,
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalUi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UiState::default()),
            running: AtomicBool::new(false),
            chat_handler: Mutex::new(None),
        }
    }

    pub fn add_log(&self, line: impl Into<String>) {
        let mut state = self.state.lock();
        state.logs.push_back(line.into());
        while state.logs.len() > MAX_LOGS {
            state.logs.pop_front();
        }
    }

    pub fn add_chat_response(&self, msg: &str) {
        let mut state = self.state.lock();
        state.chat.push_back(format!("agent> {}", msg));
        while state.chat.len() > MAX_CHAT {
            state.chat.pop_front();
        }
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.state.lock().status = status.into();
    }

    pub fn update_connection_status(&self, conn: ConnectionStatus) {
        self.state.lock().conn = conn;
    }

    pub fn set_chat_handler(&self, handler: ChatHandler) {
        *self.chat_handler.lock() = Some(handler);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Run the UI loop on the calling thread until quit or `stop()`.
    pub fn run(&self, queue: &ApprovalQueue) -> io::Result<()> {
        self.running.store(true, Ordering::Relaxed);

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal, queue);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        self.running.store(false, Ordering::Relaxed);
        result
    }

    fn event_loop(
        &self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        queue: &ApprovalQueue,
    ) -> io::Result<()> {
        let mut mode = UiMode::Approval;
        let mut selected: usize = 0;
        let mut chat_input = String::new();

        while self.running.load(Ordering::Relaxed) {
            terminal.draw(|frame| self.render(frame, queue, mode, selected, &chat_input))?;

            if !event::poll(TICK)? {
                continue;
            }
            let Event::Key(key) = event::read()? else { continue };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match mode {
                UiMode::Chat => match key.code {
                    KeyCode::Esc => mode = UiMode::Approval,
                    KeyCode::Enter => {
                        if !chat_input.is_empty() {
                            {
                                let mut state = self.state.lock();
                                state.chat.push_back(format!("you> {}", chat_input));
                                while state.chat.len() > MAX_CHAT {
                                    state.chat.pop_front();
                                }
                            }
                            if let Some(handler) = self.chat_handler.lock().as_ref() {
                                handler(&chat_input);
                            }
                            chat_input.clear();
                        }
                    }
                    KeyCode::Backspace => {
                        chat_input.pop();
                    }
                    KeyCode::Char(c) => chat_input.push(c),
                    _ => {}
                },
                UiMode::Approval => {
                    let pending = queue.pending_count();
                    match key.code {
                        KeyCode::Char('/') => {
                            mode = UiMode::Chat;
                            chat_input.clear();
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            selected = selected.saturating_sub(1);
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            if selected + 1 < pending {
                                selected += 1;
                            }
                        }
                        KeyCode::Enter | KeyCode::Char('a') => {
                            if pending > 0 {
                                queue.approve(selected);
                                if selected > 0 && selected >= pending - 1 {
                                    selected -= 1;
                                }
                            }
                        }
                        KeyCode::Char('d') | KeyCode::Char('r') => {
                            if pending > 0 {
                                queue.reject(selected);
                                if selected > 0 && selected >= pending - 1 {
                                    selected -= 1;
                                }
                            }
                        }
                        KeyCode::Char('A') => {
                            queue.approve_all();
                            selected = 0;
                        }
                        KeyCode::Char('R') => {
                            queue.reject_all();
                            selected = 0;
                        }
                        KeyCode::Char('q') | KeyCode::Esc => {
                            self.running.store(false, Ordering::Relaxed);
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn render(
        &self,
        frame: &mut Frame,
        queue: &ApprovalQueue,
        mode: UiMode,
        selected: usize,
        chat_input: &str,
    ) {
        let state = self.state.lock();
        let pending = queue.pending();

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // connection bar
                Constraint::Length(1), // header
                Constraint::Min(5),    // body
                Constraint::Length(1), // input / key hints
            ])
            .split(frame.area());

        self.render_connection_bar(frame, outer[0], &state.conn);
        self.render_header(frame, outer[1], &state.status, mode, pending.len());

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(40), Constraint::Length(40)])
            .split(outer[2]);

        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(body[0]);

        // Approval queue
        let queue_items: Vec<ListItem> = if pending.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No pending actions",
                Style::default().fg(Color::DarkGray),
            )))]
        } else {
            pending
                .iter()
                .enumerate()
                .map(|(i, qa)| {
                    let (marker, urgency_color) = match qa.action.urgency {
                        Urgency::Immediate => ("!!", Color::Red),
                        Urgency::Fast => ("! ", Color::Yellow),
                        Urgency::Normal => ("  ", Color::Green),
                        Urgency::Low => ("  ", Color::DarkGray),
                    };
                    let elapsed = qa.queued.elapsed().as_millis() as i64;
                    let remaining = (qa.timeout_ms as i64 - elapsed).max(0);

                    let mut line = Line::from(vec![
                        Span::raw(if i == selected && mode == UiMode::Approval { "> " } else { "  " }),
                        Span::styled(marker, Style::default().fg(urgency_color)),
                        Span::raw(format!(" {}", qa.action.describe())),
                        Span::styled(
                            format!("  {}ms", remaining),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]);
                    if i == selected && mode == UiMode::Approval {
                        line = line.style(Style::default().add_modifier(Modifier::REVERSED));
                    }
                    ListItem::new(line)
                })
                .collect()
        };
        frame.render_widget(
            List::new(queue_items)
                .block(Block::default().borders(Borders::ALL).title(" Approval Queue ")),
            left[0],
        );

        // Activity log
        let log_height = left[1].height.saturating_sub(2) as usize;
        let log_items: Vec<ListItem> = state
            .logs
            .iter()
            .rev()
            .take(log_height)
            .rev()
            .map(|line| {
                ListItem::new(Line::from(Span::styled(
                    format!("  {}", line),
                    Style::default().fg(Color::Gray),
                )))
            })
            .collect();
        frame.render_widget(
            List::new(log_items).block(Block::default().borders(Borders::ALL).title(" Activity ")),
            left[1],
        );

        // Chat panel
        let chat_height = body[1].height.saturating_sub(2) as usize;
        let chat_items: Vec<ListItem> = if state.chat.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  Type / to chat with the agent",
                Style::default().fg(Color::DarkGray),
            )))]
        } else {
            state
                .chat
                .iter()
                .rev()
                .take(chat_height)
                .rev()
                .map(|line| {
                    let color = if line.starts_with("you>") { Color::Yellow } else { Color::Gray };
                    ListItem::new(Line::from(Span::styled(
                        format!("  {}", line),
                        Style::default().fg(color),
                    )))
                })
                .collect()
        };
        let chat_title_style = if mode == UiMode::Chat {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        frame.render_widget(
            List::new(chat_items).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::styled(" Chat ", chat_title_style)),
            ),
            body[1],
        );

        // Bottom bar
        let bottom = if mode == UiMode::Chat {
            Line::from(vec![
                Span::styled(" > ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::raw(chat_input.to_string()),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
                Span::styled(
                    "   [Enter] send  [Esc] back",
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        } else {
            Line::from(Span::styled(
                " [Enter] approve  [d] reject  [A] all  [R] reject all  [/] chat  [q] quit",
                Style::default().fg(Color::DarkGray),
            ))
        };
        frame.render_widget(Paragraph::new(bottom), outer[3]);
    }

    fn render_connection_bar(&self, frame: &mut Frame, area: Rect, conn: &ConnectionStatus) {
        let dot = |ok: bool| {
            Span::styled(
                " * ",
                Style::default()
                    .fg(if ok { Color::Green } else { Color::Red })
                    .add_modifier(Modifier::BOLD),
            )
        };
        let label = |ok: bool, text: &str| {
            Span::styled(
                text.to_string(),
                Style::default().fg(if ok { Color::Green } else { Color::Red }),
            )
        };

        let audio_detail = if conn.audio_connected {
            format!(
                " {} {}ch/{}Hz",
                conn.audio_backend, conn.audio_channels, conn.audio_sample_rate as i32
            )
        } else {
            " off".into()
        };

        let bar = Line::from(vec![
            dot(conn.console_connected),
            label(conn.console_connected, "Console"),
            Span::styled(format!(" {}", conn.console_type), Style::default().fg(Color::DarkGray)),
            Span::raw("  "),
            dot(conn.audio_connected),
            label(conn.audio_connected, "Audio"),
            Span::styled(audio_detail, Style::default().fg(Color::DarkGray)),
            Span::raw("  "),
            dot(conn.llm_connected),
            label(conn.llm_connected, "LLM"),
        ]);
        frame.render_widget(Paragraph::new(bar), area);
    }

    fn render_header(
        &self,
        frame: &mut Frame,
        area: Rect,
        status: &str,
        mode: UiMode,
        pending: usize,
    ) {
        let (mode_str, mode_color) = match mode {
            UiMode::Chat => ("[CHAT]", Color::Magenta),
            UiMode::Approval => ("[QUEUE]", Color::Cyan),
        };
        let header = Line::from(vec![
            Span::styled(
                " MixAgent ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD | Modifier::REVERSED),
            ),
            Span::raw(" "),
            Span::styled(status.to_string(), Style::default().fg(Color::Green)),
            Span::raw("  "),
            Span::styled(mode_str, Style::default().fg(mode_color).add_modifier(Modifier::BOLD)),
            Span::raw(format!("  Queue: {}", pending)),
        ]);
        frame.render_widget(Paragraph::new(header), area);
    }
}
