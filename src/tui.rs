use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Chart, Clear, Dataset, GraphType, Paragraph, Wrap};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::analysis::{AnalysisInput, Analyzer, spawn_analysis};
use crate::browser;
use crate::command::{AnalysisOutcome, AnalysisSource, Command, KeywordOpportunity};
use crate::opportunity_chart::{
    ChartPoint, SIZE_BUCKETS, chart_point, chart_points, size_buckets, volume_ceiling,
};
use crate::opportunity_table::{
    COLUMNS, ColumnAlign, DerivedRow, OpportunityTable, SortDirection, availability_context,
    difficulty_color, difficulty_context, format_cpc, format_cpc_in_pre, format_grouped,
    format_optional_count, format_stake_value, score_context, stake_context, stake_link,
};
use crate::state::{AppState, PendingRequest, ResultsView};

const LOADING_SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const BUCKET_STYLES: [(symbols::Marker, Color, &str); SIZE_BUCKETS] = [
    (symbols::Marker::Braille, Color::LightBlue, "low CPC"),
    (symbols::Marker::Dot, Color::Cyan, "mid CPC"),
    (symbols::Marker::Block, Color::LightGreen, "high CPC"),
];
const CHART_HEIGHT: u16 = 12;
const DETAIL_LINES: usize = 2;
const MIN_KEYWORD_WIDTH: usize = 12;

struct LoadingIndicator {
    message: String,
    spinner_index: usize,
    last_tick: Instant,
}

impl LoadingIndicator {
    fn new(message: impl Into<String>) -> Self {
        LoadingIndicator {
            message: message.into(),
            spinner_index: 0,
            last_tick: Instant::now(),
        }
    }

    fn tick(&mut self) -> bool {
        let interval = Duration::from_millis(120);
        if self.last_tick.elapsed() < interval {
            return false;
        }
        self.spinner_index = (self.spinner_index + 1) % LOADING_SPINNER_FRAMES.len();
        self.last_tick = Instant::now();
        true
    }

    fn spinner(&self) -> char {
        LOADING_SPINNER_FRAMES[self.spinner_index % LOADING_SPINNER_FRAMES.len()]
    }

    fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Focus {
    Input,
    Table,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputOutcome {
    Idle,
    Handled,
    Exit,
}

pub struct TuiApp {
    state: AppState,
    table: OpportunityTable,
    analyzer: Arc<Analyzer>,
    tx: broadcast::Sender<Command>,
    focus: Focus,
    selected_row: usize,
    selected_column: usize,
    table_view_height: usize,
    settings_input: String,
    last_draw: Instant,
    min_redraw_gap: Duration,
    price_updated_at: Option<String>,
    status_message: Option<String>,
    status_visible_until: Option<Instant>,
    status_is_error: bool,
    exit_confirmation: bool,
    loading: Option<LoadingIndicator>,
}

impl TuiApp {
    pub fn new(state: AppState, analyzer: Arc<Analyzer>, tx: broadcast::Sender<Command>) -> TuiApp {
        let min_redraw_gap = Duration::from_millis(100);
        let settings_input = state.api_key.clone();
        TuiApp {
            state,
            table: OpportunityTable::default(),
            analyzer,
            tx,
            focus: Focus::Input,
            selected_row: 0,
            selected_column: 0,
            table_view_height: 1,
            settings_input,
            last_draw: Instant::now() - min_redraw_gap,
            min_redraw_gap,
            price_updated_at: None,
            status_message: None,
            status_visible_until: None,
            status_is_error: false,
            exit_confirmation: false,
            loading: None,
        }
    }

    /// Kick off the first analysis: the `--csv` export when given, otherwise the
    /// default niche as soon as a key is available.
    pub fn start(&mut self, csv: Option<PathBuf>) {
        match csv {
            Some(path) => {
                self.state.mode = AnalysisSource::CsvImport;
                self.state.csv_path = path.display().to_string();
                let request = self.state.submit_csv(path);
                self.dispatch(request);
            }
            None if self.state.has_api_key() => {
                let request = self.state.submit_niche();
                self.dispatch(request);
            }
            None => {
                self.set_status_message("Enter your Gemini API key to start analyzing");
            }
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(3));
        self.status_is_error = false;
    }

    fn set_error_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(5));
        self.status_is_error = true;
    }

    fn clear_status_message(&mut self) {
        self.status_message = None;
        self.status_visible_until = None;
        self.status_is_error = false;
    }

    fn expire_status_message(&mut self) -> bool {
        match self.status_visible_until {
            Some(visible_until) if Instant::now() >= visible_until => {
                self.clear_status_message();
                true
            }
            _ => false,
        }
    }

    fn update_loading_animation(&mut self) -> bool {
        if let Some(loading) = &mut self.loading {
            return loading.tick();
        }
        false
    }

    pub fn dispose(&self) {
        ratatui::restore();
    }

    pub async fn run(&mut self, rx: &mut broadcast::Receiver<Command>) -> Result<()> {
        color_eyre::install()?;
        let mut terminal = ratatui::init();
        let mut input_tick = tokio::time::interval(self.min_redraw_gap);
        terminal.draw(|frame| self.render(frame))?;
        self.last_draw = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = input_tick.tick() => {
                    let mut should_redraw = self.update_loading_animation();
                    if self.expire_status_message() {
                        should_redraw = true;
                    }
                    match self.poll_input()? {
                        InputOutcome::Exit => return Ok(()),
                        InputOutcome::Handled => should_redraw = true,
                        InputOutcome::Idle => {}
                    }
                    if should_redraw && self.last_draw.elapsed() >= self.min_redraw_gap {
                        terminal.draw(|frame| self.render(frame))?;
                        self.last_draw = Instant::now();
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(Command::PriceUpdate(price)) => self.on_price_update(price),
                        Ok(Command::AnalysisFinished(outcome)) => self.on_analysis_finished(outcome),
                        Ok(Command::Error(message)) => self.set_error_status_message(message),
                        Ok(Command::Exit) => return Ok(()),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "dashboard lagged behind the command bus");
                            continue;
                        }
                    }
                    terminal.draw(|frame| self.render(frame))?;
                    self.last_draw = Instant::now();
                }
            }
        }
        Ok(())
    }

    fn on_price_update(&mut self, price: f64) {
        self.state.update_price(price);
        self.price_updated_at = Some(Local::now().format("%H:%M:%S").to_string());
    }

    fn on_analysis_finished(&mut self, outcome: AnalysisOutcome) {
        let source = outcome.source;
        let found = outcome.result.as_ref().map(Vec::len).ok();
        if !self.state.apply_result(outcome) {
            return;
        }
        self.loading = None;
        if let Some(count) = found {
            self.selected_row = 0;
            if count == 0 {
                self.focus = Focus::Input;
            }
            self.set_status_message(format!("{count} keywords found ({})", source.label()));
        }
    }

    fn dispatch(&mut self, request: Option<PendingRequest>) {
        let Some(request) = request else {
            return;
        };
        let label = match &request.input {
            AnalysisInput::Niche(niche) => format!("Analyzing \"{niche}\"..."),
            AnalysisInput::CsvFile(path) => format!("Analyzing {}...", path.display()),
        };
        info!(seq = request.seq, source = request.input.source().label(), "dispatching analysis");
        self.loading = Some(LoadingIndicator::new(label));
        spawn_analysis(
            Arc::clone(&self.analyzer),
            request.seq,
            request.input,
            self.state.api_key.clone(),
            self.tx.clone(),
        );
    }

    fn submit(&mut self) {
        match self.state.mode {
            AnalysisSource::AiGenerated => {
                let request = self.state.submit_niche();
                self.dispatch(request);
            }
            AnalysisSource::CsvImport => {
                let path = self.state.csv_path.trim().to_string();
                if path.is_empty() {
                    self.set_status_message("Enter the path of a .csv keyword export");
                    return;
                }
                let request = self.state.submit_csv(PathBuf::from(path));
                self.dispatch(request);
            }
        }
        if self.state.settings_open {
            self.settings_input = self.state.api_key.clone();
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let has_status = self.status_message.is_some() && area.height >= 18;
        let mut constraints = vec![
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(6),
        ];
        if has_status {
            constraints.push(Constraint::Length(3));
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);
        self.render_header(frame, chunks[0]);
        self.render_controls(frame, chunks[1]);
        self.render_results(frame, chunks[2]);
        if has_status {
            self.render_status(frame, chunks[3]);
        }
        if self.state.settings_open {
            self.render_settings(frame);
        }
        if self.exit_confirmation {
            self.render_exit_confirmation(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let muted = Style::default().fg(Color::DarkGray);
        let mut spans = vec![
            Span::styled(
                "PreStake Analyst",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!("1 PRE ≈ ${:.4}", self.state.pre_price),
                Style::default().fg(Color::Green),
            ),
        ];
        match &self.price_updated_at {
            Some(at) => spans.push(Span::styled(format!(" (live {at})"), muted)),
            None => spans.push(Span::styled(" (fallback)", muted)),
        }
        spans.push(Span::raw("  "));
        if self.state.has_api_key() {
            spans.push(Span::styled("API key set", Style::default().fg(Color::Green)));
        } else {
            spans.push(Span::styled(
                "API key missing (Ctrl+S)",
                Style::default().fg(Color::Red),
            ));
        }
        let block = Block::bordered()
            .title(" Presearch keyword staking ")
            .title_bottom(Line::from(self.shortcut_hint()).right_aligned());
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    fn shortcut_hint(&self) -> &'static str {
        match self.focus {
            Focus::Input => " Enter analyze · Tab table · Ctrl+T AI/CSV · Ctrl+S settings · Esc quit ",
            Focus::Table => {
                " ↑↓ row · ←→ column · Enter sort · 1-8 sort · o stake · ? hint · Tab input "
            }
        }
    }

    fn render_controls(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(40), Constraint::Length(40)])
            .split(area);
        self.render_input_panel(frame, chunks[0]);
        self.render_kpis(frame, chunks[1]);
    }

    fn render_input_panel(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Input && !self.state.settings_open;
        let active = Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let inactive = Style::default().fg(Color::Gray);
        let mode_style = |mode: AnalysisSource| {
            if self.state.mode == mode { active } else { inactive }
        };
        let mut lines = vec![Line::from(vec![
            Span::styled(" AI Generator ", mode_style(AnalysisSource::AiGenerated)),
            Span::raw(" "),
            Span::styled(" CSV Import ", mode_style(AnalysisSource::CsvImport)),
            Span::styled("  Ctrl+T switch", Style::default().fg(Color::DarkGray)),
        ])];

        let (label, value) = match self.state.mode {
            AnalysisSource::AiGenerated => ("Niche: ", self.state.niche.as_str()),
            AnalysisSource::CsvImport => ("CSV file: ", self.state.csv_path.as_str()),
        };
        let mut input = vec![
            Span::styled(label, Style::default().fg(Color::Gray)),
            Span::styled(value.to_string(), Style::default().fg(Color::White)),
        ];
        if focused {
            input.push(Span::styled("▏", Style::default().fg(Color::Cyan)));
        }
        lines.push(Line::from(input));

        if let Some(loading) = &self.loading {
            lines.push(Line::styled(
                format!("{} {}", loading.spinner(), loading.message()),
                Style::default().fg(Color::Yellow),
            ));
        } else {
            let hint = match self.state.mode {
                AnalysisSource::AiGenerated => "Enter asks the AI for 15-20 stakeable keywords",
                AnalysisSource::CsvImport => {
                    "Path to an Ahrefs/Semrush/Google Ads export (.csv), then Enter"
                }
            };
            lines.push(Line::styled(hint, Style::default().fg(Color::DarkGray)));
        }
        if let Some(error) = &self.state.error {
            lines.push(Line::styled(
                format!("⚠ {error}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
        }

        let block = Block::bordered()
            .title(format!(" Analyze · {} ", self.state.mode.label()))
            .border_style(focus_border_style(focused));
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_kpis(&self, frame: &mut Frame, area: Rect) {
        let label = Style::default().fg(Color::Gray);
        let top = match self.state.top_opportunity() {
            Some(top) => Line::from(vec![
                Span::styled(
                    top.keyword,
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {} Score", top.score),
                    Style::default().fg(Color::LightBlue),
                ),
            ]),
            None => Line::from("-"),
        };
        let volume = self
            .state
            .total_volume()
            .map(format_grouped)
            .unwrap_or_else(|| "-".to_string());
        let lines = vec![
            Line::styled("Top Opportunity", label),
            top,
            Line::styled("Total Volume Analyzed", label),
            Line::styled(volume, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        ];
        frame.render_widget(
            Paragraph::new(lines).block(Block::bordered().title(" Overview ")),
            area,
        );
    }

    fn render_results(&mut self, frame: &mut Frame, area: Rect) {
        match self.state.results_view() {
            ResultsView::Results => {
                if area.height >= CHART_HEIGHT + 8 {
                    let chunks = Layout::default()
                        .direction(Direction::Vertical)
                        .constraints([Constraint::Length(CHART_HEIGHT), Constraint::Min(6)])
                        .split(area);
                    self.render_chart(frame, chunks[0]);
                    self.render_table(frame, chunks[1]);
                } else {
                    self.render_table(frame, area);
                }
            }
            ResultsView::Loading => self.render_loading_placeholder(frame, area),
            ResultsView::EmptyPlaceholder => self.render_empty_placeholder(frame, area),
        }
    }

    fn render_chart(&self, frame: &mut Frame, area: Rect) {
        let points = chart_points(&self.state.data);
        let buckets = size_buckets(&points);
        let ceiling = volume_ceiling(&points);
        let selected = self.selected_chart_point();
        let selected_xy: Vec<(f64, f64)> = selected.iter().map(|p| (p.x, p.y)).collect();
        let mut datasets: Vec<Dataset> = buckets
            .iter()
            .zip(BUCKET_STYLES.iter())
            .filter(|(bucket, _)| !bucket.is_empty())
            .map(|(bucket, (marker, color, name))| {
                Dataset::default()
                    .name(*name)
                    .marker(*marker)
                    .graph_type(GraphType::Scatter)
                    .style(Style::default().fg(*color))
                    .data(bucket)
            })
            .collect();
        if !selected_xy.is_empty() {
            datasets.push(
                Dataset::default()
                    .name("selected")
                    .marker(symbols::Marker::Block)
                    .graph_type(GraphType::Scatter)
                    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
                    .data(&selected_xy),
            );
        }
        let axis_style = Style::default().fg(Color::Gray);
        let x_axis = Axis::default()
            .title("Difficulty")
            .style(axis_style)
            .bounds([0.0, 100.0])
            .labels(["0", "50", "100"]);
        let y_axis = Axis::default()
            .title("Volume")
            .style(axis_style)
            .bounds([0.0, ceiling])
            .labels([
                "0".to_string(),
                format_grouped((ceiling / 2.0) as u64),
                format_grouped(ceiling as u64),
            ]);
        let unplotted = self.state.data.len().saturating_sub(points.len());
        let mut title = " Volume vs Difficulty (size = CPC) ".to_string();
        if unplotted > 0 {
            title.push_str(&format!("· {unplotted} not plotted "));
        }
        if let Some(point) = &selected {
            title.push_str(&format!("· {} ", point.label()));
        }
        let chart = Chart::new(datasets)
            .block(Block::bordered().title(title))
            .x_axis(x_axis)
            .y_axis(y_axis);
        frame.render_widget(chart, area);
    }

    fn render_table(&mut self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Table && !self.state.settings_open;
        let block = Block::bordered()
            .title(format!(
                " Keyword Opportunities · {} keywords found ",
                self.state.data.len()
            ))
            .border_style(focus_border_style(focused));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height < 2 || inner.width < 20 {
            return;
        }
        let detail_height = if usize::from(inner.height) > DETAIL_LINES + 2 {
            DETAIL_LINES
        } else {
            0
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(2), Constraint::Length(detail_height as u16)])
            .split(inner);
        let body_height = usize::from(chunks[0].height).saturating_sub(1);
        self.table_view_height = body_height.max(1);
        self.selected_row = clamp_index(self.selected_row, self.state.data.len());

        let widths = column_widths(usize::from(inner.width));
        let rows = self.table.sorted(&self.state.data);
        let (start, end) = visible_range(rows.len(), body_height, self.selected_row);
        let mut lines = Vec::with_capacity(end - start + 1);
        lines.push(header_line(
            &self.table,
            &widths,
            focused.then_some(self.selected_column),
        ));
        for (offset, record) in rows[start..end].iter().enumerate() {
            let selected = focused && start + offset == self.selected_row;
            lines.push(row_line(record, self.state.pre_price, &widths, selected));
        }
        frame.render_widget(Paragraph::new(lines), chunks[0]);

        if detail_height > 0
            && let Some(record) = rows.get(self.selected_row)
        {
            frame.render_widget(Paragraph::new(detail_lines(record)), chunks[1]);
        }
    }

    fn render_empty_placeholder(&self, frame: &mut Frame, area: Rect) {
        let lines = vec![
            Line::from(""),
            Line::styled(
                "Ready to Stake?",
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Line::from(""),
            Line::from(
                "Enter a niche above or upload your keyword data to find the most profitable Presearch staking opportunities instantly.",
            ),
            Line::from(""),
            Line::styled(
                "Enter analyze · Ctrl+T switch to CSV import · Ctrl+S API settings",
                Style::default().fg(Color::DarkGray),
            ),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::bordered());
        frame.render_widget(paragraph, area);
    }

    fn render_loading_placeholder(&self, frame: &mut Frame, area: Rect) {
        let (spinner, message) = match &self.loading {
            Some(loading) => (loading.spinner(), loading.message().to_string()),
            None => ('|', "Analyzing...".to_string()),
        };
        let lines = vec![
            Line::from(""),
            Line::styled(
                format!("{spinner} {message}"),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Line::from(""),
            Line::styled(
                "Estimating volume, CPC, difficulty and staking competition",
                Style::default().fg(Color::DarkGray),
            ),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::bordered());
        frame.render_widget(paragraph, area);
    }

    fn render_settings(&self, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 30 || area.height < 10 {
            return;
        }
        let popup = centered_rect(area, 64, 10);
        let masked = "*".repeat(self.settings_input.chars().count());
        let muted = Style::default().fg(Color::Gray);
        let lines = vec![
            Line::styled(
                "Google Gemini API Key",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Line::from(vec![
                Span::styled(format!("> {masked}"), Style::default().fg(Color::Yellow)),
                Span::styled("▏", Style::default().fg(Color::Cyan)),
            ]),
            Line::from(""),
            Line::styled("Required for intelligent analysis and keyword suggestions.", muted),
            Line::styled("Kept in memory for this session only.", muted),
            Line::from(""),
            Line::from("Enter save · Esc close · Ctrl+U clear"),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(" API Configuration "));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }

    fn render_exit_confirmation(&self, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 24 || area.height < 5 {
            return;
        }
        let popup = centered_rect(area, 50, 5);
        let lines = vec![
            Line::from(Span::styled(
                "Quit PreStake Analyst?",
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from("Y/Enter quit · N/Esc cancel"),
            Line::from("Ctrl+C again quits immediately"),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .block(Block::bordered().title("Confirm"));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if let Some(message) = &self.status_message {
            let color = if self.status_is_error {
                Color::Red
            } else {
                Color::Yellow
            };
            let block = Block::bordered().title("Status");
            let status = Paragraph::new(message.as_str())
                .style(Style::default().fg(color))
                .alignment(Alignment::Left)
                .block(block);
            frame.render_widget(status, area);
        }
    }

    fn poll_input(&mut self) -> Result<InputOutcome> {
        let mut outcome = InputOutcome::Idle;
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key_event(key) {
                        return Ok(InputOutcome::Exit);
                    }
                    outcome = InputOutcome::Handled;
                }
                Event::Resize(_, _) => outcome = InputOutcome::Handled,
                _ => {}
            }
        }
        Ok(outcome)
    }

    /// Returns `true` when the dashboard should shut down.
    fn handle_key_event(&mut self, key: KeyEvent) -> bool {
        if self.exit_confirmation {
            return self.handle_exit_confirmation_key(key);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => {
                    self.prompt_exit_confirmation();
                    return false;
                }
                KeyCode::Char('s') if !self.state.settings_open => {
                    self.open_settings();
                    return false;
                }
                KeyCode::Char('t') if !self.state.settings_open => {
                    self.toggle_mode();
                    return false;
                }
                _ => {}
            }
        }
        if self.state.settings_open {
            self.handle_settings_key(key);
            return false;
        }
        match key.code {
            KeyCode::Esc => self.prompt_exit_confirmation(),
            KeyCode::F(2) => self.open_settings(),
            KeyCode::Tab | KeyCode::BackTab => self.cycle_focus(),
            _ => match self.focus {
                Focus::Input => self.handle_input_key(key),
                Focus::Table => self.handle_table_key(key),
            },
        }
        false
    }

    fn prompt_exit_confirmation(&mut self) {
        if self.exit_confirmation {
            return;
        }
        self.exit_confirmation = true;
        self.set_status_message("Quit? Y/Enter confirm · N/Esc cancel");
    }

    fn handle_exit_confirmation_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('c') = key.code
        {
            self.exit_confirmation = false;
            return true;
        }
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.exit_confirmation = false;
                true
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.exit_confirmation = false;
                self.set_status_message("Quit cancelled");
                false
            }
            _ => false,
        }
    }

    fn open_settings(&mut self) {
        self.settings_input = self.state.api_key.clone();
        self.state.open_settings();
    }

    fn handle_settings_key(&mut self, key: KeyEvent) {
        let modified = key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
        match key.code {
            KeyCode::Esc => {
                self.state.close_settings();
                self.settings_input = self.state.api_key.clone();
            }
            KeyCode::Enter => self.save_settings(),
            KeyCode::Backspace => {
                self.settings_input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.settings_input.clear();
            }
            KeyCode::Char(ch) if !modified => self.settings_input.push(ch),
            _ => {}
        }
    }

    fn save_settings(&mut self) {
        let key = std::mem::take(&mut self.settings_input);
        let request = self.state.save_api_key(&key);
        self.settings_input = self.state.api_key.clone();
        if self.state.has_api_key() {
            self.set_status_message("API key saved for this session");
        } else {
            self.set_status_message("API key cleared");
        }
        self.dispatch(request);
    }

    fn toggle_mode(&mut self) {
        self.state.toggle_mode();
        self.state.dismiss_error();
        self.focus = Focus::Input;
        self.set_status_message(format!("Mode: {} (Ctrl+T)", self.state.mode.label()));
    }

    fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Input if self.state.data.is_empty() => {
                self.set_status_message("No results to browse yet");
                Focus::Input
            }
            Focus::Input => Focus::Table,
            Focus::Table => Focus::Input,
        };
    }

    fn active_input_mut(&mut self) -> &mut String {
        match self.state.mode {
            AnalysisSource::AiGenerated => &mut self.state.niche,
            AnalysisSource::CsvImport => &mut self.state.csv_path,
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let modified = key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
        match key.code {
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.active_input_mut().pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.active_input_mut().clear();
            }
            KeyCode::Char(ch) if !modified => self.active_input_mut().push(ch),
            _ => {}
        }
    }

    fn handle_table_key(&mut self, key: KeyEvent) {
        let page = self.table_view_height.max(1) as isize;
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-page),
            KeyCode::PageDown => self.move_selection(page),
            KeyCode::Home | KeyCode::Char('g') => self.selected_row = 0,
            KeyCode::End | KeyCode::Char('G') => {
                self.selected_row = self.state.data.len().saturating_sub(1);
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected_column = (self.selected_column + COLUMNS.len() - 1) % COLUMNS.len();
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected_column = (self.selected_column + 1) % COLUMNS.len();
            }
            KeyCode::Enter | KeyCode::Char('s') => self.sort_by_column(self.selected_column),
            KeyCode::Char(digit @ '1'..='9') => {
                if let Some(idx) = digit.to_digit(10) {
                    self.selected_column = clamp_index(idx as usize - 1, COLUMNS.len());
                    self.sort_by_column(self.selected_column);
                }
            }
            KeyCode::Char('o') => self.open_selected_link(),
            KeyCode::Char('?') => {
                if let Some(column) = COLUMNS.get(self.selected_column) {
                    self.set_status_message(format!("{}: {}", column.label, column.hint));
                }
            }
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.state.data.len();
        if len == 0 {
            self.selected_row = 0;
            return;
        }
        let next = (self.selected_row as isize + delta).clamp(0, len as isize - 1);
        self.selected_row = next as usize;
    }

    fn sort_by_column(&mut self, idx: usize) {
        let Some(column) = COLUMNS.get(idx) else {
            return;
        };
        let Some(key) = column.sort_key else {
            self.set_status_message(format!("{} is not sortable", column.label));
            return;
        };
        self.table.handle_sort(key);
        let direction = match self.table.sort_config().map(|config| config.direction) {
            Some(SortDirection::Descending) => "descending",
            _ => "ascending",
        };
        debug!(column = column.label, direction, "sorted table");
        self.set_status_message(format!("Sorted by {} ({direction})", column.label));
    }

    /// Chart position of the table's selected row, if it has one.
    fn selected_chart_point(&self) -> Option<ChartPoint> {
        self.table
            .sorted(&self.state.data)
            .get(self.selected_row)
            .and_then(|record| chart_point(record))
    }

    fn open_selected_link(&mut self) {
        let url = self
            .table
            .sorted(&self.state.data)
            .get(self.selected_row)
            .map(|record| stake_link(&record.keyword));
        let Some(url) = url else {
            return;
        };
        self.set_status_message(format!("Opening {url}"));
        browser::open_url(url, self.tx.clone());
    }
}

fn header_line(table: &OpportunityTable, widths: &[usize], selected: Option<usize>) -> Line<'static> {
    let mut spans = Vec::with_capacity(COLUMNS.len() * 2);
    for (idx, (column, width)) in COLUMNS.iter().zip(widths).enumerate() {
        if idx > 0 {
            spans.push(Span::raw(" "));
        }
        let indicator = table.sort_indicator(column);
        let label = if indicator.is_empty() {
            column.label.to_string()
        } else {
            format!("{} {indicator}", column.label)
        };
        let style = if selected == Some(idx) {
            Style::default()
                .fg(Color::Black)
                .bg(Color::LightCyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD)
        };
        spans.push(Span::styled(
            format_column_value(&label, column.align, *width),
            style,
        ));
    }
    Line::from(spans)
}

fn row_line(
    record: &KeywordOpportunity,
    pre_price: f64,
    widths: &[usize],
    selected: bool,
) -> Line<'static> {
    let derived = DerivedRow::compute(record, pre_price);
    let badge_color = if record.available() {
        Color::Green
    } else {
        Color::Red
    };
    let keyword_width = widths.first().copied().unwrap_or(MIN_KEYWORD_WIDTH);
    let mut cells: Vec<(String, Style)> = vec![
        ("● ".to_string(), Style::default().fg(badge_color)),
        (
            format_column_value(&record.keyword, ColumnAlign::Left, keyword_width.saturating_sub(2)),
            Style::default().fg(Color::White),
        ),
    ];
    let difficulty_style = record
        .keyword_difficulty
        .map(|value| Style::default().fg(difficulty_color(value)))
        .unwrap_or_else(|| Style::default().fg(Color::DarkGray));
    let values: [(String, Style); 8] = [
        (
            record
                .opportunity_score
                .map(|score| score.to_string())
                .unwrap_or_else(|| "-".to_string()),
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        ),
        (format_optional_count(record.search_volume), Style::default()),
        (format_cpc(record.cpc), Style::default().fg(Color::Green)),
        (format_cpc_in_pre(&derived), Style::default().fg(Color::LightBlue)),
        (
            record
                .keyword_difficulty
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string()),
            difficulty_style,
        ),
        (
            record
                .current_pre_staked
                .map(|value| format!("{} PRE", format_grouped(value)))
                .unwrap_or_else(|| "-".to_string()),
            Style::default().fg(Color::Magenta),
        ),
        (format_stake_value(&derived), Style::default()),
        ("Stake ↗".to_string(), Style::default().fg(Color::Cyan)),
    ];
    for ((value, style), (column, width)) in values
        .into_iter()
        .zip(COLUMNS.iter().zip(widths).skip(1))
    {
        cells.push((" ".to_string(), Style::default()));
        cells.push((format_column_value(&value, column.align, *width), style));
    }
    let spans = cells
        .into_iter()
        .map(|(text, style)| {
            let style = if selected {
                style.patch(row_style(true))
            } else {
                style
            };
            Span::styled(text, style)
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

fn detail_lines(record: &KeywordOpportunity) -> Vec<Line<'static>> {
    let muted = Style::default().fg(Color::Gray);
    let badge = Style::default().fg(if record.available() {
        Color::Green
    } else {
        Color::Red
    });
    let mut first = vec![
        Span::styled(
            format!("[{}] ", record.availability_label()),
            badge.add_modifier(Modifier::BOLD),
        ),
        Span::styled(availability_context(record), badge),
    ];
    if let Some(score) = record.opportunity_score {
        first.push(Span::styled(format!(" · {}", score_context(score)), muted));
    }
    if let Some(difficulty) = record.keyword_difficulty {
        first.push(Span::styled(
            format!(" · {}", difficulty_context(difficulty)),
            Style::default().fg(difficulty_color(difficulty)),
        ));
    }
    let mut second = vec![Span::styled(stake_context(record), muted)];
    if let Some(category) = &record.category {
        second.push(Span::styled(format!(" · {category}"), muted));
    }
    second.push(Span::styled(
        format!(" · o: {}", stake_link(&record.keyword)),
        Style::default().fg(Color::Cyan),
    ));
    vec![Line::from(first), Line::from(second)]
}

/// Column widths for `total` cells; the keyword column absorbs the slack.
fn column_widths(total: usize) -> Vec<usize> {
    let gaps = COLUMNS.len().saturating_sub(1);
    let fixed: usize = COLUMNS
        .iter()
        .skip(1)
        .map(|column| usize::from(column.width))
        .sum();
    let keyword = total.saturating_sub(fixed + gaps).max(MIN_KEYWORD_WIDTH);
    std::iter::once(keyword)
        .chain(COLUMNS.iter().skip(1).map(|column| usize::from(column.width)))
        .collect()
}

fn focus_border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn centered_rect(area: Rect, max_width: u16, height: u16) -> Rect {
    let width = area.width.saturating_sub(4).min(max_width).max(24);
    let height = height.min(area.height);
    let left = area.x + area.width.saturating_sub(width) / 2;
    let top = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(left, top, width.min(area.width), height)
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::default()
            .bg(Color::LightCyan)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn format_column_value(value: &str, align: ColumnAlign, width: usize) -> String {
    let clipped = clip_to_width(value, width);
    pad_to_width(&clipped, width, align)
}

fn clip_to_width(value: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(value) <= width {
        return value.to_string();
    }
    let mut result = String::new();
    let mut remaining = width.saturating_sub(1);
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if ch_width > remaining {
            break;
        }
        result.push(ch);
        remaining = remaining.saturating_sub(ch_width);
    }
    result.push('…');
    result
}

fn pad_to_width(value: &str, width: usize, align: ColumnAlign) -> String {
    let current = UnicodeWidthStr::width(value);
    if current >= width {
        return value.to_string();
    }
    let padding = width - current;
    match align {
        ColumnAlign::Left => format!("{value}{}", " ".repeat(padding)),
        ColumnAlign::Right => format!("{}{value}", " ".repeat(padding)),
        ColumnAlign::Center => {
            let left = padding / 2;
            format!("{}{value}{}", " ".repeat(left), " ".repeat(padding - left))
        }
    }
}

fn clamp_index(idx: usize, len: usize) -> usize {
    if len == 0 { 0 } else { idx.min(len - 1) }
}

/// Window of `visible` rows that keeps `selected` on screen.
fn visible_range(len: usize, visible: usize, selected: usize) -> (usize, usize) {
    if len == 0 || visible == 0 {
        return (0, 0);
    }
    if len <= visible {
        return (0, len);
    }
    let selected = clamp_index(selected, len);
    let start = selected.saturating_sub(visible - 1).min(len - visible);
    (start, start + visible)
}
