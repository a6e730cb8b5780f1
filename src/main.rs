use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use visitrack::VisitrackError;
use visitrack::clock::{Clock, SystemClock};
use visitrack::daemon::{AutoCheckoutScheduler, TickResult};
use visitrack::domain::{Category, GpsFix, NewFrequentVisitor, NewSite, NewVisit, SiteRef, SiteUpdate, VisitRecord};
use visitrack::geo::LocationResolver;
use visitrack::gps::{BoundedGpsProvider, StaticGpsProvider};
use visitrack::location::{LocationManager, LocationOutcome};
use visitrack::store::{FilePreferences, FrequentVisitorStore, LocalStore, RestStore, SiteRegistry, VisitStore};
use visitrack::visits::{VisitLogQuery, VisitService};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{AutoCheckoutCommands, Commands, FixArgs, FrequentCommands, LocationCommands, SitesCommands};
use config::{Config, StorageBackend};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("visitrack")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("visitrack.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // Without RUST_LOG the config's log_level decides, applied once the config is loaded
    let env_filter = std::env::var_os("RUST_LOG").is_some();
    let mut builder = env_logger::Builder::from_default_env();
    if !env_filter {
        builder.filter_level(LevelFilter::Trace);
    }
    builder.target(env_logger::Target::Pipe(target)).init();
    if !env_filter {
        log::set_max_level(LevelFilter::Info);
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn apply_log_level(config: &Config) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Some(level) = config.log_level.as_deref() {
        match level.parse::<LevelFilter>() {
            Ok(filter) => log::set_max_level(filter),
            Err(_) => log::warn!("Ignoring unknown log_level: {}", level),
        }
    }
}

/// Stores and session state for one invocation
struct App {
    config: Config,
    registry: Arc<dyn SiteRegistry>,
    visits: Arc<dyn VisitStore>,
    frequent: Arc<dyn FrequentVisitorStore>,
    location: LocationManager<FilePreferences>,
    clock: Arc<dyn Clock>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let (registry, visits, frequent): (Arc<dyn SiteRegistry>, Arc<dyn VisitStore>, Arc<dyn FrequentVisitorStore>) =
            match config.storage.backend {
                StorageBackend::Local => {
                    let store =
                        Arc::new(LocalStore::open(&config.storage.data_dir).context("Failed to open local store")?);
                    let registry: Arc<dyn SiteRegistry> = store.clone();
                    let visits: Arc<dyn VisitStore> = store.clone();
                    let frequent: Arc<dyn FrequentVisitorStore> = store;
                    (registry, visits, frequent)
                }
                StorageBackend::Rest => {
                    let store =
                        Arc::new(RestStore::new(config.rest_config()?).context("Failed to create REST store")?);
                    let registry: Arc<dyn SiteRegistry> = store.clone();
                    let visits: Arc<dyn VisitStore> = store.clone();
                    let frequent: Arc<dyn FrequentVisitorStore> = store;
                    (registry, visits, frequent)
                }
            };
        let prefs = FilePreferences::open(config.preferences_path()).context("Failed to open preferences")?;

        Ok(Self {
            config,
            registry,
            visits,
            frequent,
            location: LocationManager::new(prefs),
            clock: Arc::new(SystemClock),
        })
    }

    fn visit_service(&self) -> VisitService<dyn VisitStore> {
        VisitService::new(self.visits.clone(), self.clock.clone())
    }

    fn scheduler(&self) -> Result<AutoCheckoutScheduler<dyn VisitStore>> {
        Ok(AutoCheckoutScheduler::new(
            self.visits.clone(),
            self.clock.clone(),
            self.config.tick_config()?,
        ))
    }

    fn gps(&self, fix: GpsFix) -> BoundedGpsProvider<StaticGpsProvider> {
        BoundedGpsProvider::new(
            StaticGpsProvider::new(fix),
            self.config.gps_timeout(),
            self.config.gps_max_age(),
        )
    }

    /// Category from the flag, else from the active location
    async fn category_or_location(&self, category: Option<Category>) -> Result<Category> {
        if let Some(category) = category {
            return Ok(category);
        }
        let gps = StaticGpsProvider::unavailable();
        match self.location.ensure_location(&gps, self.registry.as_ref()).await? {
            LocationOutcome::ManualRequired { reason } => {
                eyre::bail!("{}; pass --category or run `visitrack location select`", reason)
            }
            outcome => outcome
                .site()
                .map(|site| site.category)
                .ok_or_else(|| eyre::eyre!("No active location")),
        }
    }
}

fn fix_from(args: &FixArgs) -> Result<GpsFix> {
    Ok(GpsFix::new(args.lat, args.lon, args.accuracy)?)
}

fn print_visit(visit: &VisitRecord) {
    let checkin = visit.checkin_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M");
    let checkout = match visit.checkout_time {
        Some(t) => t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "open".green().to_string(),
    };
    println!(
        "  {}  {:<20} {:<10} {:<24} {:<12} in {}  out {}",
        visit.id.dimmed(),
        visit.full_name(),
        visit.category.label(),
        visit.location_name.as_deref().unwrap_or("-"),
        visit.purpose,
        checkin,
        checkout
    );
}

fn print_location(label: &str, site: &SiteRef) {
    println!("{} {}", label.green(), site);
}

fn print_outcome(outcome: &LocationOutcome) {
    match outcome {
        LocationOutcome::Selected(site) => print_location("Location:", site),
        LocationOutcome::Detected {
            site,
            distance_km,
            accuracy,
        } => {
            print_location("Detected:", site);
            println!("  {:.3} km from center, {}", distance_km, accuracy);
        }
        LocationOutcome::Saved(site) => {
            println!("{}", "No location detected".yellow());
            print_location("Using saved location:", site);
        }
        LocationOutcome::ManualRequired { reason } => {
            println!("{} {}", "No location detected:".yellow(), reason);
            println!("  Select one with `visitrack location select <id>`");
        }
    }
}

fn print_tick_result(result: &TickResult, category: Category) {
    match result {
        TickResult::Executed(count) => {
            println!("{} {} {} visitors checked out", "Auto-checkout:".green(), count, category)
        }
        TickResult::Deferred(reason) => println!("{} {}", "Auto-checkout deferred:".yellow(), reason),
        TickResult::Idle => println!("{}", "Auto-checkout: nothing to do".dimmed()),
        TickResult::Busy => println!("{}", "Auto-checkout already running".yellow()),
    }
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let app = App::open(config)?;

    match &cli.command {
        Commands::Resolve { fix } => handle_resolve(&app, fix).await,
        Commands::Sites { command } => handle_sites_command(&app, command).await,
        Commands::Location { command } => handle_location_command(&app, command).await,
        Commands::Frequent { command } => handle_frequent_command(&app, command).await,
        Commands::CheckIn {
            frequent,
            first_name,
            last_name,
            company,
            phone,
            purpose,
        } => {
            let mut visit = match frequent {
                Some(id) => {
                    let saved = app
                        .frequent
                        .get_frequent_visitor(id)
                        .await?
                        .ok_or_else(|| VisitrackError::FrequentVisitorNotFound(id.clone()))?;
                    info!("Prefilling check-in from frequent visitor {}", saved.id);
                    saved.prefill()
                }
                None => NewVisit::default(),
            };
            if let Some(first_name) = first_name {
                visit.first_name = first_name.clone();
            }
            if let Some(last_name) = last_name {
                visit.last_name = last_name.clone();
            }
            if company.is_some() {
                visit.company = company.clone();
            }
            if phone.is_some() {
                visit.phone = phone.clone();
            }
            handle_check_in(&app, visit.with_purpose(*purpose)).await
        }
        Commands::CheckOut { id, all, category } => handle_check_out(&app, id.as_deref(), *all, *category).await,
        Commands::Open { category } => handle_open(&app, *category).await,
        Commands::Stats => handle_stats(&app).await,
        Commands::Log {
            category,
            visitor,
            location,
            purpose,
            from,
            to,
            sort,
        } => {
            let query = VisitLogQuery {
                category: *category,
                visitor: visitor.clone(),
                location: location.clone(),
                purpose: *purpose,
                start_date: *from,
                end_date: *to,
                sort: *sort,
            };
            handle_log(&app, &query).await
        }
        Commands::AutoCheckout { command } => handle_auto_checkout_command(&app, command).await,
        Commands::Daemon => run_daemon(&app).await,
    }
}

async fn handle_resolve(app: &App, args: &FixArgs) -> Result<()> {
    let fix = fix_from(args)?;
    info!("Resolving position {:.6}, {:.6}", fix.latitude, fix.longitude);
    let sites = app.registry.list_sites().await?;

    match LocationResolver::new().resolve(&fix, &sites)? {
        Some(resolved) => {
            print_location("Detected:", &resolved.site.to_ref());
            println!(
                "  {:.3} km from center (radius {} km), {}",
                resolved.distance_km,
                resolved.site.radius,
                fix.accuracy_level()
            );
        }
        None => println!("{}", "No location detected".yellow()),
    }
    Ok(())
}

async fn handle_sites_command(app: &App, command: &SitesCommands) -> Result<()> {
    info!("Handling sites command: {:?}", command);
    match command {
        SitesCommands::List => {
            let sites = app.registry.list_sites().await?;
            if sites.is_empty() {
                println!("{}", "No sites registered".dimmed());
            }
            for site in sites {
                println!(
                    "  {}  {:<24} {:<10} {:>10.6} {:>11.6}  r={} km",
                    site.id.dimmed(),
                    site.name,
                    site.category.label(),
                    site.latitude,
                    site.longitude,
                    site.radius
                );
            }
        }
        SitesCommands::Add {
            name,
            category,
            lat,
            lon,
            radius,
        } => {
            let site = app
                .registry
                .add_site(NewSite {
                    name: name.clone(),
                    category: *category,
                    latitude: *lat,
                    longitude: *lon,
                    radius: *radius,
                })
                .await?;
            println!("{} {} ({})", "Registered:".green(), site.to_ref(), site.id);
        }
        SitesCommands::Edit {
            id,
            name,
            category,
            lat,
            lon,
            radius,
        } => {
            let update = SiteUpdate {
                name: name.clone(),
                category: *category,
                latitude: *lat,
                longitude: *lon,
                radius: *radius,
            };
            let site = app.registry.update_site(id, update).await?;
            println!("{} {} ({})", "Updated:".green(), site.to_ref(), site.id);
        }
        SitesCommands::Remove { id } => {
            app.registry.remove_site(id).await?;
            println!("{} {}", "Removed:".red(), id);
        }
    }
    Ok(())
}

async fn handle_frequent_command(app: &App, command: &FrequentCommands) -> Result<()> {
    info!("Handling frequent command: {:?}", command);
    match command {
        FrequentCommands::List => {
            let visitors = app.frequent.list_frequent_visitors().await?;
            if visitors.is_empty() {
                println!("{}", "No frequent visitors saved".dimmed());
            }
            for visitor in visitors {
                println!(
                    "  {}  {:<20} {}",
                    visitor.id.dimmed(),
                    visitor.full_name(),
                    visitor.company.as_deref().unwrap_or("No company info")
                );
            }
        }
        FrequentCommands::Add {
            first_name,
            last_name,
            company,
            phone,
        } => {
            let visitor = NewFrequentVisitor {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                company: company.clone(),
                phone: phone.clone(),
            }
            .into_record(app.clock.now_utc())?;
            let saved = app.frequent.add_frequent_visitor(&visitor).await?;
            println!("{} {} ({})", "Saved:".green(), saved.full_name(), saved.id);
        }
        FrequentCommands::Remove { id } => {
            app.frequent.remove_frequent_visitor(id).await?;
            println!("{} {}", "Removed:".red(), id);
        }
    }
    Ok(())
}

async fn handle_location_command(app: &App, command: &LocationCommands) -> Result<()> {
    info!("Handling location command: {:?}", command);
    match command {
        LocationCommands::Show => {
            match app.location.current()? {
                Some(site) => print_location("Location:", &site),
                None => println!("{}", "No location selected".yellow()),
            }
            let enabled = app.location.location_change_enabled()?;
            println!("  Location change: {}", if enabled { "enabled" } else { "disabled" });
        }
        LocationCommands::Select { id } => {
            let site = app
                .registry
                .list_sites()
                .await?
                .into_iter()
                .find(|s| s.id == *id)
                .ok_or_else(|| VisitrackError::SiteNotFound(id.clone()))?;
            app.location.select(site.to_ref())?;
            print_location("Location:", &site.to_ref());
        }
        LocationCommands::Refresh { fix } => {
            let gps = app.gps(fix_from(fix)?);
            let outcome = app.location.refresh(&gps, app.registry.as_ref()).await?;
            print_outcome(&outcome);
        }
        LocationCommands::ToggleChange => {
            let enabled = app.location.toggle_location_change()?;
            println!(
                "{} {}",
                "Location change:".green(),
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

async fn handle_check_in(app: &App, visit: NewVisit) -> Result<()> {
    let location = app
        .location
        .current()?
        .ok_or_else(|| eyre::eyre!("No location selected; run `visitrack location select <id>` first"))?;
    let record = app.visit_service().check_in(visit, &location).await?;
    println!("{} {} at {}", "Checked in:".green(), record.full_name(), location);
    println!("  {}", record.id.dimmed());
    Ok(())
}

async fn handle_check_out(app: &App, id: Option<&str>, all: bool, category: Option<Category>) -> Result<()> {
    let service = app.visit_service();
    match id {
        Some(id) if !all => {
            let record = service.check_out(id).await?;
            println!("{} {}", "Checked out:".green(), record.full_name());
        }
        _ => {
            let category = app.category_or_location(category).await?;
            let count = service.check_out_all(category).await?;
            println!("{} {} {} visitors", "Checked out:".green(), count, category);
        }
    }
    Ok(())
}

async fn handle_open(app: &App, category: Option<Category>) -> Result<()> {
    let category = app.category_or_location(category).await?;
    let visits = app.visit_service().open_visits(category).await?;
    println!("{} {} open {} visits", "Open:".cyan(), visits.len(), category);
    visits.iter().for_each(print_visit);
    Ok(())
}

async fn handle_stats(app: &App) -> Result<()> {
    let stats = app.visit_service().stats().await?;
    println!("{}", "Open visits".cyan());
    println!("  Dormitory: {}", stats.dormitory_count);
    println!("  Factory:   {}", stats.factory_count);
    println!("  Total:     {}", stats.total_count);
    Ok(())
}

async fn handle_log(app: &App, query: &VisitLogQuery) -> Result<()> {
    info!("Visit log query: {:?}", query);
    let visits = app.visit_service().visit_log(query).await?;
    println!("{} {} records", "Visit log:".cyan(), visits.len());
    visits.iter().for_each(print_visit);
    Ok(())
}

async fn handle_auto_checkout_command(app: &App, command: &AutoCheckoutCommands) -> Result<()> {
    match command {
        AutoCheckoutCommands::Run => {
            let scheduler = app.scheduler()?;
            let result = scheduler.run_now().await;
            print_tick_result(&result, scheduler.config().target_category);
        }
        AutoCheckoutCommands::Status => {
            let tick = app.config.tick_config()?;
            let enabled = if app.config.auto_checkout.enabled {
                "enabled".green()
            } else {
                "disabled".red()
            };
            println!("{} {}", "Auto-checkout:".cyan(), enabled);
            println!("  Cutoff:   {} ({})", tick.cutoff, tick.policy);
            println!("  Category: {}", tick.target_category.label());
            println!("  Tick:     {:?}", tick.tick_interval);
            println!("  Manual runs count as today's run: {}", tick.stamp_manual_runs);
        }
    }
    Ok(())
}

async fn run_daemon(app: &App) -> Result<()> {
    if !app.config.auto_checkout.enabled {
        println!("{}", "Auto-checkout is disabled in config".yellow());
        return Ok(());
    }

    let scheduler = Arc::new(app.scheduler()?);
    let mut events = scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    println!(
        "{} cutoff {} for {} visits, Ctrl-C to stop",
        "Daemon started:".green(),
        scheduler.config().cutoff,
        scheduler.config().target_category
    );

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{} {}", "Auto-checkout:".green(), event.summary()),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Missed {} checkout events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    runner.await.context("Scheduler task failed")?;
    reporter.abort();

    let state = scheduler.state();
    println!(
        "{} {} runs, {} visits closed, {} deferred",
        "Daemon stopped:".cyan(),
        state.executions,
        state.total_closed,
        state.failures
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    apply_log_level(&config);

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
