use std::io::IsTerminal;
use std::path::PathBuf;

use argh::FromArgs;
use event::Metric;
use exitcode::ExitCode;
use redis_receiver::config;
use redis_receiver::sources::redis::Config;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
#[argh(
    description = "Scrape a Redis server and print its metrics",
    help_triggers("-h", "--help")
)]
struct RootCommand {
    #[argh(option, short = 'c', description = "path of the configuration file")]
    config: PathBuf,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(switch, description = "print metrics as JSON")]
    json: bool,
}

impl RootCommand {
    fn run(&self) -> Result<(), ExitCode> {
        let log_level =
            std::env::var("REDIS_RECEIVER_LOG").unwrap_or_else(|_| self.log_level.clone());
        let filter = EnvFilter::try_new(&log_level).map_err(|err| {
            eprintln!("invalid log level {log_level:?}, {err}");
            exitcode::USAGE
        })?;
        tracing_subscriber::fmt()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();

        let config = config::load::<Config>(&self.config).map_err(|err| {
            error!(message = "load configuration failed", %err);
            exitcode::CONFIG
        })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("redis-receiver-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            info!(
                message = "start redis receiver",
                endpoint = %config.endpoint,
                transport = ?config.transport,
                interval = ?config.interval,
            );

            let (tx, mut rx) = mpsc::channel::<Vec<Metric>>(16);
            let source = config.build();
            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(message = "listen for ctrl-c failed", %err);
                }

                info!(message = "shutdown signal received");
            };
            let handle = tokio::spawn(source.run(tx, shutdown));

            while let Some(metrics) = rx.recv().await {
                print_metrics(&metrics, self.json)?;
            }

            match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(())) => Err(exitcode::SOFTWARE),
                Err(err) => {
                    error!(message = "redis source panicked", %err);
                    Err(exitcode::SOFTWARE)
                }
            }
        })
    }
}

#[allow(clippy::print_stdout)]
fn print_metrics(metrics: &[Metric], json: bool) -> Result<(), ExitCode> {
    for metric in metrics {
        if json {
            let text = serde_json::to_string(metric).map_err(|err| {
                error!(message = "serialize metric failed", %err);
                exitcode::SOFTWARE
            })?;

            println!("{text}");
        } else {
            println!("{metric}");
        }
    }

    Ok(())
}

fn main() {
    let opts: RootCommand = argh::from_env();

    if let Err(code) = opts.run() {
        std::process::exit(code);
    }
}
