use crate::display::markup;
use crate::display::DisplayUpdate;
use crate::state::SlotStatus;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::io;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::debug;

const TICK: Duration = Duration::from_millis(250);

struct Panel {
    address: String,
    status: SlotStatus,
    text: Text<'static>,
    updated_at_unix: Option<i64>,
}

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    panels: Vec<Panel>,
    updates: mpsc::UnboundedReceiver<DisplayUpdate>,
    restored: bool,
}

impl Tui {
    pub fn new(
        addresses: Vec<String>,
        updates: mpsc::UnboundedReceiver<DisplayUpdate>,
    ) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = terminal::disable_raw_mode();
            return Err(err);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let panels = addresses
            .into_iter()
            .map(|address| Panel {
                address,
                status: SlotStatus::Pending,
                text: Text::from("waiting for first poll..."),
                updated_at_unix: None,
            })
            .collect();

        Ok(Self {
            terminal,
            panels,
            updates,
            restored: false,
        })
    }

    pub fn run(&mut self, shutdown: &watch::Sender<bool>) -> io::Result<()> {
        let shutdown_rx = shutdown.subscribe();
        loop {
            self.apply_updates();
            let panels = &self.panels;
            self.terminal.draw(|frame| render_frame(frame, panels))?;

            if *shutdown_rx.borrow() {
                break;
            }

            if event::poll(TICK)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                        || (key.code == KeyCode::Char('c')
                            && key.modifiers.contains(KeyModifiers::CONTROL));
                    if quit {
                        debug!("quit requested from terminal");
                        let _ = shutdown.send(true);
                        break;
                    }
                }
            }
        }
        self.restore()
    }

    fn apply_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            if let Some(panel) = self.panels.get_mut(update.index) {
                panel.status = update.status;
                if let Some(text) = update.text {
                    panel.text = markup::to_text(&text);
                    panel.updated_at_unix = Some(update.at_unix);
                }
            }
        }
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        terminal::disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

fn render_frame(frame: &mut Frame<'_>, panels: &[Panel]) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(frame.area());

    let header = Line::from(vec![
        Span::styled(
            " nodeboard ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} nodes | q to quit", panels.len())),
    ]);
    frame.render_widget(Paragraph::new(header), outer[0]);

    for (panel, area) in panels.iter().zip(grid(outer[1], panels.len())) {
        let color = status_color(panel.status);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(Span::styled(
                panel_title(panel),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ));
        frame.render_widget(Paragraph::new(panel.text.clone()).block(block), area);
    }
}

fn grid(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let columns = if count == 1 { 1 } else { 2 };
    let rows = count.div_ceil(columns);

    let row_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, rows as u32); rows])
        .split(area);

    let mut cells = Vec::with_capacity(count);
    for row in row_areas.iter() {
        let col_areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, columns as u32); columns])
            .split(*row);
        cells.extend(col_areas.iter().copied());
    }
    cells.truncate(count);
    cells
}

fn panel_title(panel: &Panel) -> String {
    match panel.updated_at_unix {
        Some(at) => {
            let at = UNIX_EPOCH + Duration::from_secs(at.max(0) as u64);
            format!(
                " {} | {} | {} ",
                panel.address,
                panel.status.label(),
                humantime::format_rfc3339_seconds(at)
            )
        }
        None => format!(" {} | {} ", panel.address, panel.status.label()),
    }
}

fn status_color(status: SlotStatus) -> Color {
    match status {
        SlotStatus::Pending => Color::DarkGray,
        SlotStatus::Polling => Color::Yellow,
        SlotStatus::Ok => Color::Green,
        SlotStatus::Failed => Color::Red,
    }
}
