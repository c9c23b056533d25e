//! Prism CLI - Select techniques, score renders and inspect pattern lineage.

use std::fmt::Display;
use std::path::PathBuf;

use prism_evolve::{
    compute::{
        PatternScorer,
        evolution::{EvolutionSelector, FeedbackLoop},
    },
    schema::{Pattern, PrismConfig},
    store::Store,
};

fn main() {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().collect();
    let program = args.remove(0);

    if args.first().map(String::as_str) == Some("--example") {
        print_example_config();
        return;
    }

    let config = match args.first().map(String::as_str) {
        Some("--config") => {
            if args.len() < 2 {
                usage(&program);
            }
            let path = PathBuf::from(args.remove(1));
            args.remove(0);
            PrismConfig::from_file(&path).unwrap_or_else(|e| {
                fail(format_args!("Error loading config {}: {}", path.display(), e))
            })
        }
        _ => PrismConfig::default(),
    };

    let Some(command) = args.first().cloned() else {
        usage(&program);
    };

    let store = Store::open_with_catalog(&config.paths.database, &config.technique_categories)
        .unwrap_or_else(|e| fail(format_args!("Error opening database: {}", e)));

    match command.as_str() {
        "select" => select(&store, &config),
        "score" => {
            let version = parse_version(args.get(1), &program);
            let techniques = split_list(args.get(2));
            score(&store, &config, version, techniques);
        }
        "record" => {
            let version = parse_version(args.get(1), &program);
            let techniques = split_list(args.get(2));
            let parents: Vec<i64> = split_list(args.get(3))
                .iter()
                .map(|p| {
                    p.parse()
                        .unwrap_or_else(|_| fail(format_args!("Invalid parent version: {}", p)))
                })
                .collect();
            record(&store, &config, version, techniques, &parents);
        }
        "stats" => stats(&store),
        "lineage" => {
            let version = parse_version(args.get(1), &program);
            lineage(&store, version);
        }
        "reset" => {
            store
                .reset(&config.technique_categories)
                .unwrap_or_else(|e| fail(format_args!("Error resetting database: {}", e)));
            println!("Database reset: {}", store.path().display());
        }
        _ => usage(&program),
    }
}

fn select(store: &Store, config: &PrismConfig) {
    let mut selector = EvolutionSelector::new(store, config);
    let techniques = selector.select_techniques();
    if techniques.is_empty() {
        println!("No techniques selected");
        return;
    }
    for technique in &techniques {
        println!(
            "{:<28} {:<9} avg={:.1} used={} innovation={:.2}",
            technique.name,
            technique.category.as_str(),
            technique.avg_score,
            technique.usage_count,
            technique.innovation_factor
        );
    }
}

fn score(store: &Store, config: &PrismConfig, version: i64, techniques: Vec<String>) {
    let render_dir = config.paths.render_dir(version);
    let pattern = Pattern::new(version, "", techniques);
    let mut scorer = PatternScorer::new(store, config);
    let scores = scorer.score(&pattern, &render_dir);

    println!("Scores for v{} ({})", version, render_dir.display());
    for (name, value) in scores.entries() {
        println!("  {:<11} {:.2}", name, value);
    }
}

fn record(
    store: &Store,
    config: &PrismConfig,
    version: i64,
    techniques: Vec<String>,
    parents: &[i64],
) {
    let registry = store.techniques();
    let contributing: Vec<_> = techniques
        .iter()
        .map(|name| {
            let category = config.technique_categories.category_of(name);
            registry
                .materialize(name, category)
                .unwrap_or_else(|e| fail(format_args!("Error loading technique {}: {}", name, e)))
        })
        .collect();

    let mut pattern = Pattern::new(version, "", techniques);
    let lineage = store.patterns();
    for &parent in parents {
        lineage
            .ensure_version_exists(parent)
            .unwrap_or_else(|e| fail(format_args!("Error creating parent v{}: {}", parent, e)));
        pattern.add_to_evolution_chain(parent);
    }

    let scorer = PatternScorer::new(store, config);
    let mut feedback = FeedbackLoop::new(store, scorer);
    let recorded = feedback
        .record(pattern, &contributing, &config.paths.render_dir(version))
        .unwrap_or_else(|e| fail(format_args!("Error recording pattern: {}", e)));

    println!(
        "Recorded v{} as id {} (score {:.2})",
        version,
        recorded.pattern.id.unwrap_or_default(),
        recorded.scores.overall
    );
    for technique in &recorded.evolved {
        println!(
            "  {:<28} avg={:.2} success={:.3} used={}",
            technique.name, technique.avg_score, technique.success_rate, technique.usage_count
        );
    }
}

fn stats(store: &Store) {
    let stats = store
        .patterns()
        .system_stats()
        .unwrap_or_else(|e| fail(format_args!("Error reading stats: {}", e)));
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(format_args!("Error serializing stats: {}", e)),
    }
}

fn lineage(store: &Store, version: i64) {
    let ancestors = store
        .patterns()
        .lineage(version)
        .unwrap_or_else(|e| fail(format_args!("Error reading lineage: {}", e)));
    if ancestors.is_empty() {
        println!("No pattern v{}", version);
        return;
    }
    for pattern in ancestors {
        println!(
            "v{:<5} score={:.2} parents={:?} techniques={}",
            pattern.version,
            pattern.score,
            pattern.parent_patterns,
            pattern.techniques.join(",")
        );
    }
}

fn parse_version(arg: Option<&String>, program: &str) -> i64 {
    match arg.map(|s| s.parse::<i64>()) {
        Some(Ok(version)) => version,
        Some(Err(_)) => fail(format_args!("Invalid version: {}", arg.map_or("", |s| s.as_str()))),
        None => usage(program),
    }
}

/// Comma-separated list; a missing argument is an empty list.
fn split_list(arg: Option<&String>) -> Vec<String> {
    arg.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [--config <config.json>] <command> [args]", program);
    eprintln!();
    eprintln!("Score rendered patterns and evolve the technique catalog.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  select                              Pick techniques for the next pattern");
    eprintln!("  score <version> <techs>             Score a render without saving");
    eprintln!("  record <version> <techs> [parents]  Score, evolve techniques and save");
    eprintln!("  stats                               Print system statistics");
    eprintln!("  lineage <version>                   Print the ancestors of a pattern");
    eprintln!("  reset                               Drop and recreate all tables");
    eprintln!();
    eprintln!("Lists are comma-separated. Example configuration is printed with --example.");
    std::process::exit(1);
}

fn fail(message: impl Display) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn print_example_config() {
    match serde_json::to_string_pretty(&PrismConfig::default()) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => fail(format_args!("Error serializing config: {}", e)),
    }
}
