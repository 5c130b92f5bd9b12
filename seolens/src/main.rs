use colored::Colorize;
use seolens::commands::{DEFAULT_DB_PATH, command_argument_builder};
use seolens::handlers::{
    handle_crawl, handle_init, handle_issues, handle_job_control, handle_keywords, handle_report,
    handle_status, resolve_db_path,
};
use seolens_core::print_banner;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides; progress output owns stdout so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let Some((name, sub_matches)) = chosen_command.subcommand() else {
        // No subcommand provided, just show the banner
        return;
    };
    let db_path = resolve_db_path(
        sub_matches
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(DEFAULT_DB_PATH),
    );

    let result = match name {
        "init" => handle_init(sub_matches),
        "crawl" => handle_crawl(sub_matches, &db_path, quiet).await,
        "status" => handle_status(sub_matches, &db_path),
        "report" => handle_report(sub_matches, &db_path),
        "issues" => handle_issues(sub_matches, &db_path),
        "keywords" => handle_keywords(sub_matches, &db_path),
        "pause" | "resume" | "cancel" => handle_job_control(name, sub_matches, &db_path),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
