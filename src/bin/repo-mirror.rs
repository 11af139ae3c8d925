use failure::{Error, ResultExt};
use repo_mirror::{logging, schedule, Config, Driver, Layer, RunOptions, RunSummary};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use structopt::StructOpt;

fn main() {
    let args = Args::from_args();

    if args.example_config {
        match Config::example().as_toml() {
            Ok(example) => println!("{}", example),
            Err(e) => {
                print_causes(&e);
                process::exit(1);
            }
        }
        return;
    }

    // Config problems are reported before the logger exists, straight
    // to stderr, and abort before any network or filesystem work.
    let cfg = match resolve_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            print_causes(&e);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(args.verbosity, cfg.log_file.clone()) {
        print_causes(&e);
        process::exit(1);
    }

    let outcome = if args.install {
        schedule::install(&cfg).map(|()| None)
    } else {
        run_backup(cfg).map(Some)
    };

    match outcome {
        Ok(Some(summary)) => {
            // Individual repository failures are summarized but don't
            // fail the process; a rerun is the recovery mechanism.
            if !summary.all_succeeded() {
                let mut stderr = io::stderr();
                summary.display_failures(&mut stderr).ok();
            }
        }
        Ok(None) => {}
        Err(e) => {
            print_causes(&e);
            process::exit(1);
        }
    }
}

fn run_backup(cfg: Config) -> Result<RunSummary, Error> {
    let runtime = tokio::runtime::Runtime::new()
        .context("Couldn't start the async runtime")?;
    let driver = Driver::with_config(cfg);

    runtime.block_on(driver.run())
}

fn resolve_config(args: &Args) -> Result<Config, Error> {
    let credentials_path =
        shellexpand::full(&args.credentials).context("Unable to expand the credentials path")?;
    let file = Layer::from_file(std::path::Path::new(&*credentials_path))?;

    let cli = Layer {
        provider: args.provider.clone(),
        server: args.server.clone(),
        token: args.token.clone(),
        login: args.login.clone(),
        folder: args.folder.clone(),
        log_file: args.log_file.clone(),
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        job_timeout: args.timeout.map(Duration::from_secs),
    };

    Config::resolve(Layer::from_env(), cli, file, options)
}

fn print_causes(e: &Error) {
    eprintln!("Error: {}", e);

    for cause in e.iter_causes() {
        eprintln!("\tCaused By: {}", cause);
    }
}

#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(about = "Mirror every repository you own into a local backup tree.")]
struct Args {
    #[structopt(short = "p", long = "provider",
                help = "Which API to talk to, \"github\" or \"gitlab\" (default gitlab).")]
    provider: Option<String>,
    #[structopt(short = "s", long = "server",
                help = "The server to back up, e.g. gitlab.example.com.")]
    server: Option<String>,
    #[structopt(short = "t", long = "token", help = "Your API token.")]
    token: Option<String>,
    #[structopt(short = "l", long = "login",
                help = "The account whose repositories are listed (required for GitHub).")]
    login: Option<String>,
    #[structopt(short = "f", long = "folder", parse(from_os_str),
                help = "The directory backups are placed in.")]
    folder: Option<PathBuf>,
    #[structopt(long = "log-file", parse(from_os_str),
                help = "Where the rotating log file goes (defaults into the backup folder).")]
    log_file: Option<PathBuf>,
    #[structopt(short = "c", long = "credentials", default_value = "~/.repo-mirror.toml",
                help = "A TOML file supplying any of the other settings.")]
    credentials: String,
    #[structopt(long = "dry-run",
                help = "List and count the repositories without touching the filesystem.")]
    dry_run: bool,
    #[structopt(long = "timeout",
                help = "Per-repository time limit for the clone/update, in seconds.")]
    timeout: Option<u64>,
    #[structopt(long = "install",
                help = "Register this program as a daily scheduled task and exit.")]
    install: bool,
    #[structopt(long = "example-config",
                help = "Print an example credentials file and immediately exit.")]
    example_config: bool,
    #[structopt(short = "v", long = "verbose", parse(from_occurrences),
                help = "Verbose output (repeat for more verbosity).")]
    verbosity: u64,
}
