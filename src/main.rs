//! keyshape - command line client
//!
//! Runs a single command through a chain (logger at debug level, optional
//! key prefix) and prints the decoded reply the way `redis-cli` does.

use anyhow::{bail, Context as _};
use keyshape::middleware::LoggerFactory;
use keyshape::open::{open, Options};
use keyshape::{Arg, Context, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command line settings
#[derive(Debug, Default)]
struct Cli {
    /// Connection URL, may carry a `prefix` query parameter
    url: Option<String>,
    /// Key namespace, wins over the URL's prefix
    prefix: Option<String>,
    /// Command name followed by its arguments
    command: Vec<String>,
}

impl Cli {
    /// Parse settings from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut cli = Cli::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--url" | "-u" => {
                    cli.url = Some(args.next().context("--url requires a value")?);
                }
                "--prefix" | "-p" => {
                    cli.prefix = Some(args.next().context("--prefix requires a value")?);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("keyshape version {}", keyshape::VERSION);
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => {
                    bail!("unknown argument: {}", flag);
                }
                _ => {
                    cli.command.push(arg);
                    cli.command.extend(args.by_ref());
                }
            }
        }

        if cli.command.is_empty() {
            print_help();
            bail!("no command given");
        }

        Ok(cli)
    }

    fn options(&self) -> Options {
        let mut options = Options::new();
        if let Some(url) = &self.url {
            options = options.with_url(url);
        }
        if let Some(prefix) = &self.prefix {
            options = options.with_prefix(prefix.clone());
        }
        options.with_middleware(LoggerFactory::debug())
    }
}

fn print_help() {
    println!(
        r#"
keyshape - run one command against a key-value store

USAGE:
    keyshape [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -u, --url <URL>          Connection URL (default: redis://127.0.0.1:6379/0)
    -p, --prefix <PREFIX>    Namespace every key the command touches
    -v, --version            Print version information
    -h, --help               Print this help message

EXAMPLES:
    keyshape SET name Ariz
    keyshape --prefix sessions GET abc123
    keyshape --url "redis://localhost:6380/2?prefix=app" KEYS '*'

Set RUST_LOG=debug to log every command with its duration.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::from_args()?;
    let db = open(cli.options())?;
    debug!(prefix = %keyshape::middleware::prefix_of(db.as_ref()), "Chain opened");

    let (cmd, rest) = cli
        .command
        .split_first()
        .context("no command given")?;
    let args: Vec<Arg> = rest.iter().map(|a| Arg::from(a.as_str())).collect();

    let ctx = Context::background();
    let mut reply = Value::Absent;
    let result = db
        .execute(&ctx, cmd, args)
        .await
        .scan(keyshape::dests![reply]);

    db.close().await?;

    match result {
        Ok(()) => println!("{}", reply),
        Err(e) if e.is_empty() => println!("{}", Value::Absent),
        Err(e) => bail!("(error) {}", e),
    }

    Ok(())
}
