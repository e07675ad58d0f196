//! Live status dashboard: a polling `ratatui` table of device connection
//! state and statistics, refreshed on an interval.
//!
//! Input is read through an [`EventSource`] rather than `crossterm::event`
//! directly so the dashboard's key handling can be driven by a scripted
//! source in tests without a real tty.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Row, Table};
use ratatui::Terminal;

use crate::client::{Client, DeviceStats, DeviceSummary};

trait EventSource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Event>>;
}

struct CrosstermEventSource;

impl EventSource for CrosstermEventSource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

struct Row0 {
    id: i64,
    name: String,
    protocol: String,
    running: bool,
    connection: String,
    failures: u64,
}

async fn snapshot(client: &Client) -> anyhow::Result<Vec<Row0>> {
    let summaries: Vec<DeviceSummary> = client.list_devices().await?;
    let mut rows = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let stats: Option<DeviceStats> = client.get_stats(summary.device.id).await.ok();
        rows.push(Row0 {
            id: summary.device.id.0,
            name: summary.device.name.clone(),
            protocol: format!("{:?}", summary.device.protocol),
            running: summary.running,
            connection: stats
                .as_ref()
                .map(|s| format!("{:?}", s.connection_state))
                .unwrap_or_else(|| "-".to_string()),
            failures: stats.map(|s| s.statistics.consecutive_failures).unwrap_or_default(),
        });
    }
    Ok(rows)
}

pub async fn run(client: Client, refresh_interval: Duration) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, client, refresh_interval, &mut CrosstermEventSource).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: Client,
    refresh_interval: Duration,
    events: &mut dyn EventSource,
) -> anyhow::Result<()> {
    let mut rows = snapshot(&client).await?;
    let mut last_refresh = Instant::now();
    let mut error: Option<String> = None;

    loop {
        terminal.draw(|frame| draw(frame, &rows, error.as_deref()))?;

        if let Some(Event::Key(key)) = events.poll(Duration::from_millis(200))? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('r') => {
                    match snapshot(&client).await {
                        Ok(new_rows) => {
                            rows = new_rows;
                            error = None;
                        }
                        Err(err) => error = Some(err.to_string()),
                    }
                    last_refresh = Instant::now();
                }
                _ => {}
            }
        }

        if last_refresh.elapsed() >= refresh_interval {
            match snapshot(&client).await {
                Ok(new_rows) => {
                    rows = new_rows;
                    error = None;
                }
                Err(err) => error = Some(err.to_string()),
            }
            last_refresh = Instant::now();
        }
    }
}

fn draw(frame: &mut ratatui::Frame, rows: &[Row0], error: Option<&str>) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let header = Row::new(vec!["id", "name", "protocol", "running", "connection", "failures"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let body = rows.iter().map(|row| {
        let style = if row.running {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Row::new(vec![
            row.id.to_string(),
            row.name.clone(),
            row.protocol.clone(),
            row.running.to_string(),
            row.connection.clone(),
            row.failures.to_string(),
        ])
        .style(style)
    });

    let table = Table::new(
        body,
        [
            Constraint::Length(5),
            Constraint::Length(24),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("pulseonectl status (q quit, r refresh)"));

    frame.render_widget(table, chunks[0]);

    let footer = error.unwrap_or("connected");
    frame.render_widget(ratatui::widgets::Paragraph::new(footer), chunks[1]);
}
