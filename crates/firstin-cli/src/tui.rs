//! Interactive audit browser.
//!
//! Company picker, then a split view of everything the board currently
//! lists against what the configured filter keeps. Adapters run in audit
//! mode so stale listings are visible too. Detail fetch and analysis are
//! on-demand per job and feature-tested against the adapter.

use std::io::stdout;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use tokio_util::sync::CancellationToken;

use firstin_client::{Adapter, AnyAnalyzer};
use firstin_core::traits::{DetailFetcher, JobAnalyzer, JobFilter};
use firstin_core::{Job, JobFetcher, TitleAndLocationFilter};

use crate::config::{CompanyConfig, Config};

/// Run the audit flow: picker → fetch → browser, looping back to the
/// picker until the user quits.
pub async fn run_audit(
    cfg: &Config,
    client: reqwest::Client,
    analyzer: AnyAnalyzer,
) -> Result<()> {
    let enabled: Vec<&CompanyConfig> = cfg.companies.iter().filter(|c| c.enabled).collect();
    if enabled.is_empty() {
        println!("No enabled companies in config.");
        return Ok(());
    }

    let filter = TitleAndLocationFilter::new(
        cfg.filters.title_keywords.clone(),
        cfg.filters.title_exclude_keywords.clone(),
        cfg.filters.locations.clone(),
        cfg.filters.exclude_locations.clone(),
    );

    loop {
        let Some(choice) = run_company_picker(&enabled)? else {
            return Ok(());
        };
        let company = enabled[choice];

        let Some(mut adapter) = Adapter::for_ats(
            &company.ats,
            company.board_ref(),
            &company.name,
            client.clone(),
            None,
        ) else {
            println!("Unsupported ATS: {}", company.ats);
            continue;
        };
        // Audit mode shows the whole board, not just the fresh slice.
        adapter.set_audit_mode(true);

        println!("Fetching jobs from {}...", company.name);
        let jobs = match adapter.fetch_jobs(CancellationToken::new()).await {
            Ok(jobs) => jobs,
            Err(err) => {
                println!("Error fetching jobs: {err}");
                continue;
            }
        };
        println!("Fetched {} jobs.", jobs.len());

        let matched: Vec<bool> = jobs.iter().map(|j| filter.matches(j)).collect();

        let outcome = run_browser(jobs, matched, adapter, analyzer.clone())?;
        if outcome == Outcome::Quit {
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------------
// Company picker
// ---------------------------------------------------------------------------

fn run_company_picker(companies: &[&CompanyConfig]) -> Result<Option<usize>> {
    let mut terminal = setup_terminal()?;
    // event::read blocks; keep it off the async executor threads.
    let result = tokio::task::block_in_place(|| picker_loop(&mut terminal, companies));
    restore_terminal()?;
    result
}

fn picker_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    companies: &[&CompanyConfig],
) -> Result<Option<usize>> {
    let mut state = ListState::default();
    state.select(Some(0));

    loop {
        terminal.draw(|f| {
            let items: Vec<ListItem> = companies
                .iter()
                .map(|c| ListItem::new(format!("{:<25} {}", c.name, c.ats)))
                .collect();
            let list = List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(" Pick a company (Enter to fetch, q to quit) "),
                )
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                .highlight_symbol("> ");
            f.render_stateful_widget(list, f.area(), &mut state);
        })?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(None)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    let i = state.selected().unwrap_or(0);
                    state.select(Some(i.saturating_sub(1)));
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    let i = state.selected().unwrap_or(0);
                    state.select(Some((i + 1).min(companies.len() - 1)));
                }
                KeyCode::Enter => return Ok(state.selected()),
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Job browser
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Outcome {
    BackToPicker,
    Quit,
}

struct BrowserState {
    jobs: Vec<Job>,
    matched: Vec<bool>,
    /// Indices into `jobs` under the current view.
    visible: Vec<usize>,
    show_all: bool,
    list_state: ListState,
    status: String,
    adapter: Adapter,
    analyzer: AnyAnalyzer,
}

impl BrowserState {
    fn new(jobs: Vec<Job>, matched: Vec<bool>, adapter: Adapter, analyzer: AnyAnalyzer) -> Self {
        let mut state = Self {
            jobs,
            matched,
            visible: Vec::new(),
            show_all: false,
            list_state: ListState::default(),
            status: String::new(),
            adapter,
            analyzer,
        };
        state.rebuild_visible();
        state
    }

    fn rebuild_visible(&mut self) {
        self.visible = (0..self.jobs.len())
            .filter(|&i| self.show_all || self.matched[i])
            .collect();
        let selected = if self.visible.is_empty() { None } else { Some(0) };
        self.list_state.select(selected);
    }

    fn selected_job_index(&self) -> Option<usize> {
        self.list_state.selected().map(|i| self.visible[i])
    }

    fn move_selection(&mut self, delta: i64) {
        if self.visible.is_empty() {
            return;
        }
        let i = self.list_state.selected().unwrap_or(0) as i64;
        let next = (i + delta).clamp(0, self.visible.len() as i64 - 1);
        self.list_state.select(Some(next as usize));
    }

    fn matched_count(&self) -> usize {
        self.matched.iter().filter(|&&m| m).count()
    }
}

fn run_browser(
    jobs: Vec<Job>,
    matched: Vec<bool>,
    adapter: Adapter,
    analyzer: AnyAnalyzer,
) -> Result<Outcome> {
    let mut state = BrowserState::new(jobs, matched, adapter, analyzer);
    let mut terminal = setup_terminal()?;
    let result = tokio::task::block_in_place(|| browser_loop(&mut terminal, &mut state));
    restore_terminal()?;
    result
}

fn browser_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut BrowserState,
) -> Result<Outcome> {
    loop {
        terminal.draw(|f| draw_browser(f, state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') => return Ok(Outcome::BackToPicker),
                KeyCode::Esc => return Ok(Outcome::Quit),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(Outcome::Quit)
                }
                KeyCode::Up | KeyCode::Char('k') => state.move_selection(-1),
                KeyCode::Down | KeyCode::Char('j') => state.move_selection(1),
                KeyCode::Tab => {
                    state.show_all = !state.show_all;
                    state.rebuild_visible();
                }
                KeyCode::Char('d') => fetch_detail_for_selection(state),
                KeyCode::Char('a') => analyze_selection(state),
                _ => {}
            }
        }
    }
}

/// On-demand detail fetch for the selected job. Only some families have a
/// detail endpoint, so feature-test before calling.
fn fetch_detail_for_selection(state: &mut BrowserState) {
    let Some(idx) = state.selected_job_index() else {
        return;
    };
    if !state.adapter.supports_detail() {
        state.status = "This ATS has no detail endpoint.".to_string();
        return;
    }

    let job = state.jobs[idx].clone();
    let handle = tokio::runtime::Handle::current();
    match handle.block_on(
        state
            .adapter
            .fetch_job_detail(CancellationToken::new(), job),
    ) {
        Ok(enriched) => {
            state.jobs[idx] = enriched;
            state.status = "Detail loaded.".to_string();
        }
        Err(err) => state.status = format!("Detail fetch failed: {err}"),
    }
}

fn analyze_selection(state: &mut BrowserState) {
    let Some(idx) = state.selected_job_index() else {
        return;
    };
    let job = state.jobs[idx].clone();
    if job
        .detail
        .as_ref()
        .and_then(|d| d.description.as_ref())
        .is_none()
    {
        state.status = "No description to analyze; fetch detail first.".to_string();
        return;
    }

    let handle = tokio::runtime::Handle::current();
    let analyzed = handle.block_on(
        state
            .analyzer
            .analyze(CancellationToken::new(), job),
    );
    state.status = if analyzed.insights.is_some() {
        "Analysis complete.".to_string()
    } else {
        "Analysis unavailable.".to_string()
    };
    state.jobs[idx] = analyzed;
}

fn draw_browser(f: &mut Frame<'_>, state: &mut BrowserState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(outer[0]);

    let view = if state.show_all { "all" } else { "matched" };
    let title = format!(
        " Jobs [{view}] {}/{} (Tab toggles, d detail, a analyze, q back, Esc quit) ",
        state.matched_count(),
        state.jobs.len()
    );

    let items: Vec<ListItem> = state
        .visible
        .iter()
        .map(|&i| {
            let job = &state.jobs[i];
            let marker = if state.matched[i] { "✓" } else { " " };
            let line = format!("{marker} {:<40} {}", truncate(&job.title, 40), job.location);
            if state.matched[i] {
                ListItem::new(line)
            } else {
                ListItem::new(line).style(Style::default().add_modifier(Modifier::DIM))
            }
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, panes[0], &mut state.list_state);

    let detail_text = state
        .selected_job_index()
        .map(|i| render_job(&state.jobs[i]))
        .unwrap_or_else(|| "No jobs in this view.".to_string());
    let detail = Paragraph::new(detail_text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Detail "));
    f.render_widget(detail, panes[1]);

    let status = Paragraph::new(state.status.as_str())
        .style(Style::default().add_modifier(Modifier::DIM));
    f.render_widget(status, outer[1]);
}

fn render_job(job: &Job) -> String {
    let mut lines = vec![
        job.title.clone(),
        String::new(),
        format!("Company:  {}", job.company),
        format!("Location: {}", job.location),
        format!("Source:   {}", job.source),
        format!("URL:      {}", job.url),
    ];
    if let Some(posted_at) = job.posted_at {
        lines.push(format!("Posted:   {}", posted_at.to_rfc2822()));
    }

    if let Some(detail) = &job.detail {
        lines.push(String::new());
        if let Some(req) = &detail.requisition_id {
            lines.push(format!("Req ID:   {req}"));
        }
        if let Some(posted_on) = &detail.posted_on {
            lines.push(format!("PostedOn: {posted_on}"));
        }
        if let Some(apply) = &detail.apply_url {
            lines.push(format!("Apply:    {apply}"));
        }
        for range in &detail.pay_ranges {
            lines.push(format!(
                "Pay:      {} {}–{} ({})",
                range.currency_type,
                range.min_cents / 100,
                range.max_cents / 100,
                range.title
            ));
        }
        if let Some(desc) = &detail.description {
            lines.push(String::new());
            lines.push(truncate(desc, 1200));
        }
    }

    if let Some(insights) = &job.insights {
        lines.push(String::new());
        lines.push(format!(
            "Role: {}  Exp: {}  Stack: {}",
            insights.role_type,
            insights.years_exp,
            insights.tech_stack.join(", ")
        ));
        for point in &insights.key_points {
            if !point.is_empty() {
                lines.push(format!("• {point}"));
            }
        }
    }

    lines.join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

// ---------------------------------------------------------------------------
// Terminal plumbing
// ---------------------------------------------------------------------------

fn setup_terminal() -> Result<Terminal<CrosstermBackend<std::io::Stdout>>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}
