use anyhow::{Context, Result, anyhow};
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vacuum_world_core::{
    AgentKind, Environment, Position, SearchResult, Simulation, Tile, WorldConfig,
    load_environment_from_string,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load instead of generating a random world
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Grid width for random worlds
    #[arg(long, default_value_t = 20)]
    width: usize,

    /// Grid height for random worlds
    #[arg(long, default_value_t = 15)]
    height: usize,

    /// Probability that a floor tile starts dirty
    #[arg(long, default_value_t = 0.3)]
    dirt: f64,

    /// Probability that a tile is an obstacle
    #[arg(long, default_value_t = 0.1)]
    obstacles: f64,

    /// Seed for world generation and agent choices. Random if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Starting agent: 0 reactive, 1 mapped, 2 utility, 3 goal-directed
    #[arg(short, long, default_value_t = 2)]
    agent: usize,

    /// Milliseconds between simulation steps
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Run without the terminal UI and print a summary
    #[arg(long)]
    headless: bool,

    /// Step limit for headless runs
    #[arg(long, default_value_t = 10_000)]
    max_steps: usize,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// Search data kept on screen until the next search replaces it.
struct SearchOverlay {
    explored: HashSet<Position>,
    frontier: HashSet<Position>,
    nodes_expanded: usize,
    path_cost: usize,
    found: bool,
}

impl From<&SearchResult> for SearchOverlay {
    fn from(result: &SearchResult) -> Self {
        SearchOverlay {
            explored: result.explored.clone(),
            frontier: result.frontier_history.last().cloned().unwrap_or_default(),
            nodes_expanded: result.nodes_expanded,
            path_cost: result.path_cost,
            found: result.found,
        }
    }
}

struct App {
    /// The core simulation.
    simulation: Simulation,
    /// Whether steps are applied on every tick.
    running: bool,
    /// Whether the explored/frontier overlay is drawn.
    show_search: bool,
    overlay: Option<SearchOverlay>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(simulation: Simulation) -> Self {
        App {
            simulation,
            running: false,
            show_search: true,
            overlay: None,
            should_quit: false,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        let report = self.simulation.step();
        if let Some(search) = self.simulation.last_search() {
            self.overlay = Some(SearchOverlay::from(search));
        }
        if report.complete {
            self.running = false;
        }
    }

    fn toggle_running(&mut self) {
        if !self.simulation.is_complete() {
            self.running = !self.running;
            let state = if self.running { "running" } else { "paused" };
            info!("Simulation {}", state);
        }
    }

    fn reset(&mut self) {
        self.simulation.reset();
        self.overlay = None;
        self.running = false;
    }

    fn select_agent(&mut self, index: usize) {
        if self.simulation.select_agent(index) {
            self.overlay = None;
            self.running = false;
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(' ') => self.toggle_running(),
            KeyCode::Char('s') if !self.running => self.tick(),
            KeyCode::Char('r') => self.reset(),
            KeyCode::Char('v') => self.show_search = !self.show_search,
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                self.select_agent(index);
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref(), args.headless)?;

    let simulation = build_simulation(&args)?;

    if args.headless {
        return run_headless(simulation, args.max_steps);
    }

    let mut terminal = setup_terminal()?;
    let mut app = App::new(simulation);
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Installs the log subscriber. The TUI owns the terminal, so it only logs to a file.
fn init_logging(log_file: Option<&Path>, headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vacuum_world_core=debug,vacuum_world_tui=debug,info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        let subscriber = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("setting default subscriber failed")?;
    } else if headless {
        let subscriber = builder.with_ansi(true).with_writer(io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("setting default subscriber failed")?;
    }
    Ok(())
}

fn build_simulation(args: &Args) -> Result<Simulation> {
    let kind = AgentKind::from_index(args.agent)
        .ok_or_else(|| anyhow!("Agent index must be 0-3, got {}", args.agent))?;
    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    });
    info!(seed, "Using seed");

    if let Some(map_file) = &args.map {
        let map_string = std::fs::read_to_string(map_file)
            .with_context(|| format!("Failed to read map file {}", map_file.display()))?;
        let environment = load_environment_from_string(&map_string)
            .with_context(|| format!("Failed to load map {}", map_file.display()))?;
        return Ok(Simulation::with_environment(environment, kind, seed));
    }

    let config = WorldConfig {
        width: args.width,
        height: args.height,
        dirt_probability: args.dirt,
        obstacle_probability: args.obstacles,
        ..WorldConfig::default()
    };
    Simulation::new(config, kind, seed).context("Invalid world configuration")
}

fn run_headless(mut simulation: Simulation, max_steps: usize) -> Result<()> {
    info!(
        agent = simulation.agent_name(),
        total_dirt = simulation.environment().total_dirt(),
        "Running headless"
    );
    let steps = simulation.run(max_steps);
    let stats = simulation.stats();

    if !simulation.is_complete() {
        warn!(
            steps,
            remaining = simulation.dirty_tiles().len(),
            "Stopped before the world was clean"
        );
    }
    println!(
        "agent={} complete={} steps={} cleaned={}/{} cleanliness={:.1}% efficiency={:.1}%",
        simulation.agent_name(),
        simulation.is_complete(),
        stats.steps_taken,
        simulation.environment().cleaned_dirt(),
        simulation.environment().total_dirt(),
        simulation.cleanliness_percentage(),
        stats.efficiency()
    );
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            if app.running {
                app.tick();
            }
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Map
            Constraint::Length(9), // Status
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], app);
    render_status(frame, main_layout[1], app);

    let help_text = Paragraph::new(
        "Space start/pause | s step | r reset | v search overlay | 1-4 agent | q/Esc quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders run statistics and the last search onto the frame.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let simulation = &app.simulation;
    let environment = simulation.environment();
    let stats = simulation.stats();

    let (status, status_color) = if simulation.is_complete() {
        ("Complete", Color::Yellow)
    } else if app.running {
        ("Running", Color::Green)
    } else {
        ("Paused", Color::Red)
    };

    let search_line = match &app.overlay {
        Some(overlay) if overlay.found => format!(
            "Last search: {} nodes expanded, path cost {}",
            overlay.nodes_expanded, overlay.path_cost
        ),
        Some(overlay) => format!(
            "Last search: {} nodes expanded, target unreachable",
            overlay.nodes_expanded
        ),
        None => "Last search: none".to_string(),
    };

    let lines = vec![
        ListItem::new(Line::from(vec![
            Span::raw(format!(
                "Agent {}: {} ",
                simulation.agent_kind().index() + 1,
                simulation.agent_name()
            )),
            Span::styled(
                format!("[{:?}]", simulation.agent_phase()),
                Style::default().fg(Color::Cyan),
            ),
        ])),
        ListItem::new(Line::from(vec![
            Span::raw("Status: "),
            Span::styled(status, Style::default().fg(status_color).bold()),
        ])),
        ListItem::new(format!(
            "Steps: {}   Tiles cleaned: {}/{}",
            stats.steps_taken,
            environment.cleaned_dirt(),
            environment.total_dirt()
        )),
        ListItem::new(format!(
            "Cleanliness: {:.1}%   Efficiency: {:.1}%",
            simulation.cleanliness_percentage(),
            stats.efficiency()
        )),
        ListItem::new(format!(
            "Dirty tiles left: {}",
            simulation.dirty_tiles().len()
        )),
        ListItem::new(search_line),
    ];

    let status_widget =
        List::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status_widget, area);
}

/// Renders the environment map onto the frame.
fn render_map(frame: &mut Frame, area: Rect, app: &App) {
    let overlay = app.overlay.as_ref().filter(|_| app.show_search);
    let lines = map_lines(app.simulation.environment(), overlay);

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Vacuum World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// One styled line per grid row.
fn map_lines(environment: &Environment, overlay: Option<&SearchOverlay>) -> Vec<Line<'static>> {
    let agent = environment.agent_position();
    let mut lines: Vec<Line> = Vec::with_capacity(environment.height());
    let mut spans: Vec<Span> = Vec::with_capacity(environment.width());

    for (position, tile) in environment.tiles().enumerate() {
        let span = if position == agent {
            Span::styled("@", Style::default().fg(Color::Red).bold())
        } else {
            match tile {
                Tile::Obstacle => Span::styled("#", Style::default().fg(Color::DarkGray)),
                Tile::Dirty => Span::styled("*", Style::default().fg(Color::Yellow)),
                Tile::Clean => match overlay {
                    Some(o) if o.frontier.contains(&position) => {
                        Span::styled("+", Style::default().fg(Color::Cyan))
                    }
                    Some(o) if o.explored.contains(&position) => {
                        Span::styled(".", Style::default().fg(Color::Blue))
                    }
                    _ => Span::raw(" "),
                },
            }
        };
        spans.push(span);

        if position.x + 1 == environment.width() {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }

    lines
}
