use anyhow::{Context, Result};
use spanmark_config::{Config, RenderModeConfig};
use spanmark_engine::{
    Document, EngineEvent, HighlightError, Highlighter, Options, Pump, QuerySettings,
    QuerySubject, RenderError, RenderMode,
};
use std::{env, path::PathBuf, process, time::Duration};

struct Args {
    document: PathBuf,
    queries: Vec<String>,
    addresses: bool,
    config: Option<PathBuf>,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {program} <document> <query>... [--addresses] [--config <path>]");
    eprintln!("Highlights every query in an XHTML document and prints the result");
    process::exit(1);
}

fn parse_args() -> Args {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "spanmark".to_string());

    let mut positional = Vec::new();
    let mut addresses = false;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addresses" => addresses = true,
            "--config" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => usage(&program),
            },
            "-h" | "--help" => usage(&program),
            _ => positional.push(arg),
        }
    }

    if positional.len() < 2 {
        usage(&program);
    }
    let document = PathBuf::from(positional.remove(0));
    Args {
        document,
        queries: positional,
        addresses,
        config,
    }
}

fn options_from(config: &Config) -> Options {
    let render_mode = match config.render.mode {
        RenderModeConfig::Sliced => RenderMode::TimeSliced {
            slice: Duration::from_millis(config.render.slice_ms),
        },
        RenderModeConfig::Complete => RenderMode::RunToCompletion,
    };
    Options {
        group_class_prefix: config.group_class_prefix.clone(),
        max_query_groups: config.max_query_groups,
        active_class: config.active_class.clone(),
        disabled_class: config.disabled_class.clone(),
        render_mode,
        debug_checks: config.debug_checks,
        event_capacity: config.event_capacity,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = parse_args();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?
            .with_context(|| format!("config file {} not found", path.display()))?,
        None => Config::load_or_default()?,
    };
    log::info!("Config path: {}", Config::config_path().display());

    let path = Config::expand_path(&args.document).unwrap_or(args.document);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let doc = Document::parse_markup_into(
        Document::new().with_highlight_class(&config.highlight_class),
        &content,
    )
    .with_context(|| format!("failed to parse {}", path.display()))?;

    let root = doc.root();
    let mut highlighter = Highlighter::new(doc, root, options_from(&config))?;
    for query in &args.queries {
        let subjects = vec![QuerySubject::from(query.as_str())];
        match highlighter.add(query.as_str(), subjects, QuerySettings::default()) {
            Ok(()) => {}
            Err(HighlightError::Render(RenderError::Duplicate(name))) => {
                log::warn!("ignoring repeated query {name:?}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut slices = 1;
    while highlighter.pump()? == Pump::Yielded {
        slices += 1;
    }
    log::info!("rendered {} queries in {slices} slices", args.queries.len());

    for event in highlighter.drain_events() {
        match event {
            EngineEvent::RenderCompleted { query_set, count } => {
                eprintln!("{query_set}: {count} matches");
            }
            EngineEvent::SubjectRejected { query_set, reason } => {
                eprintln!("{query_set}: rejected ({reason})");
            }
            _ => {}
        }
    }

    println!("{}", highlighter.tree().to_markup());

    if args.addresses {
        for entry in highlighter.highlights() {
            let range = highlighter.address_of_highlight(entry.id)?;
            let text = highlighter.highlight_text(entry.id).unwrap_or_default();
            println!(
                "{}\t{}:{}\t{}:{}\t{text}",
                entry.query_set,
                range.start.address,
                range.start.offset,
                range.end.address,
                range.end.offset
            );
        }
    }

    Ok(())
}
