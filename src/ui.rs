use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use chrono::NaiveDate;
use ppi_toolkit::{align_by_date, ChangeRecord, LevelPoint, LookbackWindow, RebasedSeries};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io::{self, Stdout};

const WINDOW_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Red,
    Color::Blue,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Chart,
    Levels,
    Table,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Chart, Page::Levels, Page::Table];

    pub fn next(&self) -> Self {
        match self {
            Page::Chart => Page::Levels,
            Page::Levels => Page::Table,
            Page::Table => Page::Chart,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Chart => "Chart",
            Page::Levels => "Levels",
            Page::Table => "Table",
        }
    }
}

/// "Annualized PPI Changes for <series title, or id when untitled>"
pub fn default_title(series_id: &str, series_title: Option<&str>) -> String {
    let name = series_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(series_id);
    format!("Annualized PPI Changes for {}", name)
}

pub const COMPARE_TITLE: &str = "PPI Series Comparison (first = 100)";

/// Min/max of the values padded by `ratio` of the span; a flat or empty set
/// gets a unit band around its value.
fn padded_bounds(values: impl Iterator<Item = f64>, ratio: f64) -> [f64; 2] {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return [0.0, 1.0];
    }
    if min == max {
        return [min - 1.0, max + 1.0];
    }

    let pad = (max - min) * ratio;
    [min - pad, max + pad]
}

pub struct App {
    pub title: String,
    pub records: Vec<ChangeRecord>,
    /// Raw index values over the same range as `records`
    pub levels: Vec<LevelPoint>,
    pub windows: Vec<LookbackWindow>,
    pub state: TableState,
    pub current_page: Page,
}

impl App {
    pub fn new(
        title: String,
        records: Vec<ChangeRecord>,
        levels: Vec<LevelPoint>,
        windows: Vec<LookbackWindow>,
    ) -> Self {
        let mut state = TableState::default();
        if !records.is_empty() {
            state.select(Some(records.len() - 1));
        }

        Self {
            title,
            records,
            levels,
            windows,
            state,
            current_page: Page::Chart,
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn next(&mut self) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn selected_record(&self) -> Option<&ChangeRecord> {
        self.state.selected().and_then(|i| self.records.get(i))
    }

    /// (x = position in range, y = annualized %) for one window; absent values leave gaps
    pub fn series_points(&self, window: LookbackWindow) -> Vec<(f64, f64)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.ann(window.months()).map(|v| (i as f64, v)))
            .collect()
    }

    /// Y axis bounds covering every present value and zero, padded 10%
    pub fn y_bounds(&self) -> [f64; 2] {
        let values = self
            .records
            .iter()
            .flat_map(|r| r.changes.iter().filter_map(|c| c.annualized));

        let (min, max) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min == max {
            return [-1.0, 1.0];
        }

        let pad = (max - min) * 0.1;
        [min - pad, max + pad]
    }

    /// (x = position in range, y = index level)
    pub fn level_points(&self) -> Vec<(f64, f64)> {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, p)| (i as f64, p.value))
            .collect()
    }

    /// Y axis bounds for the level page, padded 5%
    pub fn level_bounds(&self) -> [f64; 2] {
        padded_bounds(self.levels.iter().map(|p| p.value), 0.05)
    }
}

/// Several rebased series on one chart
pub struct CompareApp {
    pub title: String,
    pub series: Vec<RebasedSeries>,
    /// Every date present in any series, ascending; x positions index into it
    pub dates: Vec<NaiveDate>,
}

impl CompareApp {
    pub fn new(title: String, series: Vec<RebasedSeries>) -> Self {
        let dates = align_by_date(&series).into_iter().map(|(date, _)| date).collect();
        Self { title, series, dates }
    }

    /// Points of one series placed on the shared date axis
    pub fn series_points(&self, index: usize) -> Vec<(f64, f64)> {
        let Some(series) = self.series.get(index) else {
            return Vec::new();
        };

        series
            .points
            .iter()
            .filter_map(|p| {
                self.dates
                    .binary_search(&p.date)
                    .ok()
                    .map(|x| (x as f64, p.value))
            })
            .collect()
    }

    /// Y axis bounds over all series, padded 5%
    pub fn y_bounds(&self) -> [f64; 2] {
        padded_bounds(
            self.series.iter().flat_map(|s| s.points.iter().map(|p| p.value)),
            0.05,
        )
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    with_terminal(|terminal| run_app(terminal, app))
}

pub fn run_compare_ui(app: &CompareApp) -> Result<()> {
    with_terminal(|terminal| run_compare_app(terminal, app))
}

fn with_terminal<F>(run: F) -> Result<()>
where
    F: FnOnce(&mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()>,
{
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    if !app.records.is_empty() {
                        app.state.select(Some(app.records.len() - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn run_compare_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &CompareApp,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| compare_ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if let KeyCode::Char('q') | KeyCode::Esc = key.code {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Chart => render_chart(f, chunks[1], app),
        Page::Levels => render_levels(f, chunks[1], app),
        Page::Table => render_table(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        app.title.clone(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];

    for page in Page::ALL {
        spans.push(Span::raw("  │ "));
        let style = if page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

/// First, middle and last date labels for an x axis of `len` positions
fn date_labels<'a>(len: usize, date_at: impl Fn(usize) -> Option<NaiveDate>) -> (f64, Vec<Span<'a>>) {
    let last = len.saturating_sub(1);
    let label = |i: usize| date_at(i).map(|d| d.format("%Y-%m").to_string()).unwrap_or_default();
    let labels = vec![
        Span::raw(label(0)),
        Span::raw(label(last / 2)),
        Span::raw(label(last)),
    ];
    (last.max(1) as f64, labels)
}

fn line_chart<'a>(
    datasets: Vec<Dataset<'a>>,
    title: &'a str,
    (x_max, x_labels): (f64, Vec<Span<'a>>),
    [y_min, y_max]: [f64; 2],
    y_title: &'a str,
) -> Chart<'a> {
    let y_labels = vec![
        Span::raw(format!("{:.1}", y_min)),
        Span::raw(format!("{:.1}", (y_min + y_max) / 2.0)),
        Span::raw(format!("{:.1}", y_max)),
    ];

    Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .x_axis(
            Axis::default()
                .title("Date")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title(y_title)
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(y_labels),
        )
}

fn line_dataset<'a>(name: String, color: Color, data: &'a [(f64, f64)]) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)
}

fn render_chart(f: &mut Frame, area: Rect, app: &App) {
    let points: Vec<(LookbackWindow, Vec<(f64, f64)>)> = app
        .windows
        .iter()
        .map(|w| (*w, app.series_points(*w)))
        .collect();

    let datasets: Vec<Dataset> = points
        .iter()
        .enumerate()
        .map(|(i, (window, data))| line_dataset(window.column(), WINDOW_COLORS[i % WINDOW_COLORS.len()], data))
        .collect();

    let x_axis = date_labels(app.records.len(), |i| app.records.get(i).map(|r| r.date));
    let chart = line_chart(datasets, " Annualized change (%) ", x_axis, app.y_bounds(), "%");

    f.render_widget(chart, area);
}

fn render_levels(f: &mut Frame, area: Rect, app: &App) {
    let data = app.level_points();
    let datasets = vec![line_dataset("value".to_string(), Color::Cyan, &data)];

    let x_axis = date_labels(app.levels.len(), |i| app.levels.get(i).map(|p| p.date));
    let chart = line_chart(datasets, " Price index level ", x_axis, app.level_bounds(), "Index");

    f.render_widget(chart, area);
}

fn compare_ui(f: &mut Frame, app: &CompareApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    let header = Paragraph::new(vec![Line::from(Span::styled(
        app.title.clone(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ))])
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, chunks[0]);

    let points: Vec<Vec<(f64, f64)>> = (0..app.series.len()).map(|i| app.series_points(i)).collect();
    let datasets: Vec<Dataset> = app
        .series
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(i, (series, data))| {
            line_dataset(series.label().to_string(), WINDOW_COLORS[i % WINDOW_COLORS.len()], data)
        })
        .collect();

    let x_axis = date_labels(app.dates.len(), |i| app.dates.get(i).copied());
    let chart = line_chart(datasets, " Rebased index (first = 100) ", x_axis, app.y_bounds(), "Index");
    f.render_widget(chart, chunks[1]);

    let mut status_spans = vec![Span::styled(
        format!(" {} series, {} months ", app.series.len(), app.dates.len()),
        Style::default().fg(Color::Cyan),
    )];
    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, chunks[2]);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let mut titles = vec!["Date".to_string(), "Value".to_string()];
    titles.extend(app.windows.iter().map(|w| w.column()));

    let header_cells = titles.into_iter().map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let windows = app.windows.clone();
    let rows = app.records.iter().map(|record| {
        let mut cells = vec![
            Cell::from(record.date.format("%Y-%m-%d").to_string()),
            Cell::from(format!("{:.3}", record.value)),
        ];

        for w in &windows {
            let cell = match record.ann(w.months()) {
                Some(v) => {
                    let color = if v < 0.0 { Color::Red } else { Color::Green };
                    Cell::from(format!("{:.2}", v)).style(Style::default().fg(color))
                }
                None => Cell::from("-").style(Style::default().fg(Color::DarkGray)),
            };
            cells.push(cell);
        }

        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(12), Constraint::Length(12)];
    widths.extend(windows.iter().map(|_| Constraint::Length(10)));

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Change series "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.records.len();

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(record) = app.selected_record() {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            record.date.format("%Y-%m").to_string(),
            Style::default().fg(Color::White),
        ));
        for (i, w) in app.windows.iter().enumerate() {
            let value = record
                .ann(w.months())
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string());
            status_spans.push(Span::raw(" "));
            status_spans.push(Span::styled(
                format!("{}={}", w.column(), value),
                Style::default().fg(WINDOW_COLORS[i % WINDOW_COLORS.len()]),
            ));
        }
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Chart/Levels/Table | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
