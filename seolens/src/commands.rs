use clap::{arg, command};
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/seolens/";
pub const DEFAULT_DB_PATH: &str = "~/.config/seolens/seolens.db";

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

fn site_arg() -> clap::Arg {
    arg!(<SITE>).help("Site id, domain or any URL on the site")
}

fn job_arg() -> clap::Arg {
    arg!(<JOB_ID>).help("Crawl job id, as printed when the crawl started")
}

fn format_arg() -> clap::Arg {
    arg!(-f --"format" <FORMAT>)
        .required(false)
        .help("Output format")
        .value_parser(["text", "json", "markdown", "md"])
        .default_value("text")
}

fn no_pager_arg() -> clap::Arg {
    arg!(--"no-pager")
        .required(false)
        .help("Print straight to stdout instead of through less")
        .action(clap::ArgAction::SetTrue)
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("seolens")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("seolens")
        .about("Crawl a site, score its SEO and rank keyword opportunities")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-d --"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the seolens database")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the seolens database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the seolens database in")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about("Crawl a site, then score its pages and detect issues and keywords")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("Root URL to crawl")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth from the root (1-10)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"max-pages" <PAGES>)
                        .required(false)
                        .help("Maximum number of pages to fetch (1-50000)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1000"),
                )
                .arg(
                    arg!(--"rps" <RATE>)
                        .required(false)
                        .help("Requests per second per host (default: SEOLENS_RATE_LIMIT_RPS or 5)")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--"sitemap" <URL>)
                        .required(false)
                        .help("Sitemap to seed the crawl from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"render-js")
                        .required(false)
                        .help("Request JavaScript rendering for every page")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"ignore-robots")
                        .required(false)
                        .help("Do not fetch or obey robots.txt")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the site report to a file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(format_arg())
                .arg(no_pager_arg()),
        )
        .subcommand(
            command!("status")
                .about("Show a crawl job, or every tracked site when no job is given")
                .arg(
                    arg!([JOB_ID])
                        .required(false)
                        .help("Crawl job id"),
                ),
        )
        .subcommand(
            command!("report")
                .about("Show the aggregate report of a site")
                .arg(site_arg())
                .arg(format_arg())
                .arg(
                    arg!(-k --"keywords" <COUNT>)
                        .required(false)
                        .help("Number of keyword opportunities to include")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the report to a file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(no_pager_arg()),
        )
        .subcommand(
            command!("issues")
                .about("List the issues of a site")
                .arg(site_arg())
                .arg(
                    arg!(-s --"severity" <SEVERITY>)
                        .required(false)
                        .help("Only show issues of this severity")
                        .value_parser(["critical", "high", "medium", "low", "info"]),
                )
                .arg(
                    arg!(--"resolved")
                        .required(false)
                        .help("Show resolved issues instead of open ones")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("all"),
                )
                .arg(
                    arg!(--"all")
                        .required(false)
                        .help("Show open and resolved issues")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print issues as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("keywords")
                .about("List keyword opportunities of a site")
                .arg(site_arg())
                .arg(
                    arg!(-m --"min-score" <SCORE>)
                        .required(false)
                        .help("Only show keywords scoring at least this much")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(-l --"limit" <COUNT>)
                        .required(false)
                        .help("Maximum number of keywords to show")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                )
                .arg(
                    arg!(--"refresh")
                        .required(false)
                        .help("Recompute keywords from the stored pages first")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print keywords as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("pause")
                .about("Pause a running crawl job")
                .arg(job_arg()),
        )
        .subcommand(
            command!("resume")
                .about("Resume a paused crawl job")
                .arg(job_arg()),
        )
        .subcommand(
            command!("cancel")
                .about("Cancel a pending, running or paused crawl job")
                .arg(job_arg()),
        )
}
