use std::fs::File;
use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use scielo_crawler::{CrawlerConfig, Mode, Scope, Subject, SyncOrchestrator};
use tokio::runtime;

/// SciELO incremental article synchronizer
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "subject")]
    Subject(SubjectArgs),
    #[command(name = "journals")]
    Journals(JournalsArgs),
    /// List the subject areas
    #[command(name = "subjects")]
    Subjects,
    #[command(hide = true)]
    Completion,
}

/// Synchronize every journal of a subject area
#[derive(Debug, clap::Args)]
pub struct SubjectArgs {
    /// Subject number (1-8), Portuguese name or slug, see `scielo subjects`
    pub subject: String,
    #[command(flatten)]
    pub sync: SyncArgs,
}

/// Synchronize an explicit list of journals
#[derive(Debug, clap::Args)]
pub struct JournalsArgs {
    /// Journal codes as found in `/j/{code}/` URLs
    #[arg(required = true)]
    pub codes: Vec<String>,
    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Debug, clap::Args)]
pub struct SyncArgs {
    /// Artifacts to download
    #[arg(value_enum, long, short, default_value = "xml-only")]
    pub mode: Mode,
    /// Optional crawler yaml configuration file
    #[arg(env = "SCIELO_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override the directory the `scielo/` tree is written under
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's maximum concurrent downloads (at most 8)
    #[arg(long)]
    pub concurrent_downloads: Option<usize>,
    /// Skip issues published before this year
    #[arg(long)]
    pub min_year: Option<i32>,
    /// Override the number of attempts for transient failures
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Ignore robots.txt
    #[arg(long)]
    pub no_robots: bool,
    /// No SIGINT handling, Ctrl-C aborts immediately
    #[arg(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&SyncArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &SyncArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(output_dir) = &args.output_dir {
            conf.output_dir = output_dir.clone();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            conf.concurrent_downloads = concurrent_downloads;
        }
        if let Some(min_year) = args.min_year {
            conf.min_year = Some(min_year);
        }
        if let Some(max_attempts) = args.max_attempts {
            conf.retry.max_attempts = max_attempts;
        }
        if args.no_robots {
            conf.respect_robots = false;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

pub fn sync(scope: Scope, args: SyncArgs) -> anyhow::Result<()> {
    if !args.quiet {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("scielo_crawler=info,scielo_cli=info"),
        )
        .init();
    }
    let conf: CrawlerConfig = (&args).try_into()?;
    let orchestrator = SyncOrchestrator::new(conf)?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = rt.block_on(orchestrator.run(&scope, args.mode))?;

    print!("{summary}");
    if !summary.is_clean() {
        log::warn!("Run incomplete, run the same command again to pick up the rest");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Subject(args) => {
            let scope = Scope::subject(&args.subject)?;
            sync(scope, args.sync)
        }
        SubCommand::Journals(args) => sync(Scope::journals(&args.codes), args.sync),
        SubCommand::Subjects => {
            for subject in Subject::ALL {
                println!("{} {} ({})", subject.number(), subject.name(), subject.slug());
            }
            Ok(())
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "scielo", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "concurrentDownloads: 3\nminYear: 2010\nuserAgent: from-file").unwrap();
        let args = Args::parse_from([
            "scielo",
            "journals",
            "alm",
            "rbh",
            "--mode",
            "xml-and-pdf",
            "--crawler-config",
            file.path().to_str().unwrap(),
            "--min-year",
            "2018",
            "--no-robots",
        ]);
        let SubCommand::Journals(args) = args.cmd else {
            panic!("expected journals subcommand");
        };
        assert_eq!(args.codes, vec!["alm", "rbh"]);
        assert_eq!(args.sync.mode, Mode::XmlAndPdf);
        let conf = CrawlerConfig::try_from(&args.sync).unwrap();
        assert_eq!(conf.concurrent_downloads, 3);
        assert_eq!(conf.min_year, Some(2018));
        assert_eq!(conf.user_agent, "from-file");
        assert!(!conf.respect_robots);
        assert!(conf.handle_sigint);
    }
}
