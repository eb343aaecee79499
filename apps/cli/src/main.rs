mod args;
mod config;
mod dirs;

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use usage_app::{
    ApiError, AppConfig, AppPaths, AppState, RangeParams, ensure_app_data_dir,
    resolve_range,
};

use crate::args::{Cli, Command, ProjectsCommand};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loaded = match config::load_or_create(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if loaded.created {
        info!(file = %loaded.file.display(), "created default config");
    }

    let paths = AppPaths::new(loaded.config.data_dir.clone());
    let mut app_config = AppConfig::from_paths(&paths, loaded.config.log_roots());
    app_config.batch_size = loaded.config.batch_size;
    let state = AppState::new(app_config);

    let result = ensure_app_data_dir(&paths)
        .and_then(|_| state.setup_db())
        .and_then(|_| run(&cli, &state));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let api = ApiError::from(err);
            match serde_json::to_string(&api) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{}", api.message),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn refresh(cli: &Cli, state: &AppState) -> usage_app::Result<ingest::IngestStats> {
    if cli.rebuild {
        state.services.ingest.rebuild(cli.verbose)
    } else {
        state.services.ingest.run(cli.force_rescan, cli.verbose)
    }
}

fn run(cli: &Cli, state: &AppState) -> usage_app::Result<()> {
    let services = &state.services;
    match &cli.command {
        None | Some(Command::Ingest) => emit(cli, &refresh(cli, state)?),
        Some(Command::Totals(range)) => {
            refresh(cli, state)?;
            let params = RangeParams::from(range.clone());
            let dates = resolve_range(&params)?;
            emit(cli, &services.analytics.totals(&dates, params.project())?)
        }
        Some(Command::Dashboard(range)) => {
            let stats = refresh(cli, state)?;
            let mut bundle = services
                .dashboard
                .bundle(&RangeParams::from(range.clone()), false)?;
            bundle.meta.updated_files = stats.files_processed;
            emit(cli, &bundle)
        }
        Some(Command::Timeline { range, granularity }) => {
            refresh(cli, state)?;
            let params = RangeParams::from(range.clone());
            let dates = resolve_range(&params)?;
            emit(
                cli,
                &services
                    .analytics
                    .timeline(&dates, params.project(), granularity)?,
            )
        }
        Some(Command::Day { date, project }) => {
            refresh(cli, state)?;
            emit(cli, &services.analytics.day_details(date, project.as_deref())?)
        }
        Some(Command::Model { model, range }) => {
            refresh(cli, state)?;
            let params = RangeParams::from(range.clone());
            let dates = resolve_range(&params)?;
            emit(
                cli,
                &services
                    .analytics
                    .model_details(model, &dates, params.project())?,
            )
        }
        Some(Command::Session { session_id }) => {
            refresh(cli, state)?;
            emit(cli, &services.analytics.session_details(session_id)?)
        }
        Some(Command::TopModels { year, limit }) => {
            refresh(cli, state)?;
            emit(cli, &services.analytics.top_models(*year, *limit)?)
        }
        Some(Command::Limits(range)) => {
            refresh(cli, state)?;
            let dates = resolve_range(&RangeParams::from(range.clone()))?;
            emit(cli, &services.limits.overview(&dates)?)
        }
        Some(Command::Projects(ProjectsCommand::List)) => {
            refresh(cli, state)?;
            emit(cli, &services.projects.list()?)
        }
        Some(Command::Projects(ProjectsCommand::Update {
            project_id,
            name,
            description,
            visible,
        })) => {
            let update = ingest::ProjectUpdate {
                name: name.clone(),
                description: description.clone(),
                visible: *visible,
            };
            emit(cli, &services.projects.update(project_id, &update)?)
        }
        Some(Command::Snapshot { file }) => {
            let raw = match file {
                Some(path) => fs::read_to_string(path)?,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let now = chrono::Local::now().fixed_offset();
            emit(cli, &services.accounts.record_snapshot(&raw, now)?)
        }
        Some(Command::Accounts) => emit(cli, &services.accounts.latest()?),
        Some(Command::Check) => {
            services.ingest.check_integrity()?;
            emit(cli, &serde_json::json!({ "ok": true }))
        }
    }
}

fn emit<T: Serialize>(cli: &Cli, value: &T) -> usage_app::Result<()> {
    let json = if cli.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }?;
    println!("{json}");
    Ok(())
}
