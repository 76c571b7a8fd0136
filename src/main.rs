use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use reqwest::{Client, Proxy, redirect::Policy};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use volley::{
    CountExecutor, Executor, Reporter, Scenario,
    aggregate::Records,
    report::{CsvReporter, JsonReporter, Summary, TextReporter},
    template::RequestTemplate,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Target URL (http or https)
    url: String,

    /// Number of requests to run
    #[arg(short = 'n', long, default_value_t = 200)]
    requests: u64,

    /// Number of workers to run concurrently
    #[arg(short = 'c', long, default_value_t = 50)]
    concurrency: usize,

    /// Rate limit in queries per second, shared by all workers. 0 means no limit
    #[arg(short = 'q', long, default_value_t = 0.0)]
    qps: f64,

    /// HTTP method
    #[arg(short = 'm', long, default_value = "GET")]
    method: String,

    /// Custom header, repeatable. Format: "Name: value"
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long, conflicts_with = "body_file")]
    body: Option<String>,

    /// Request body read from a file
    #[arg(short = 'D', long)]
    body_file: Option<PathBuf>,

    /// Content-Type header
    #[arg(short = 'T', long)]
    content_type: Option<String>,

    /// Basic authentication, "user:pass"
    #[arg(short = 'a', long)]
    auth: Option<String>,

    /// Timeout for each request in seconds. 0 means no timeout
    #[arg(short = 't', long, default_value_t = 20)]
    timeout: u64,

    /// HTTP proxy URL
    #[arg(short = 'x', long)]
    proxy: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Open a new connection for every request
    #[arg(long)]
    disable_keepalive: bool,

    /// Do not follow redirects
    #[arg(long)]
    disable_redirects: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = Output::Summary)]
    output: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Summary,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = Scenario::builder()
        .name(cli.url.clone())
        .template(build_template(&cli)?)
        .transport(build_client(&cli)?)
        .build();

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for in-flight requests...");
            stop_tx.send_replace(true);
        }
    });

    let executor = CountExecutor::builder()
        .requests(cli.requests)
        .concurrency(cli.concurrency)
        .qps(cli.qps)
        .stop(stop_rx)
        .build();
    let records: Records = executor.exec(&scenario).await.context("run load")?;

    let reported = match cli.output {
        Output::Summary => TextReporter::stdout().report(&Summary::from(records)).await,
        Output::Json => JsonReporter::stdout().report(&Summary::from(records)).await,
        Output::Csv => CsvReporter::stdout().report(&records).await,
    };
    reported.context("write report")
}

fn build_template(cli: &Cli) -> Result<RequestTemplate> {
    let mut builder = RequestTemplate::builder(&cli.url).method(&cli.method);

    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("header {header:?} is not in \"Name: value\" form"))?;
        builder = builder.header(name.trim(), value.trim());
    }
    if let Some(content_type) = &cli.content_type {
        builder = builder.content_type(content_type);
    }
    if let Some(auth) = &cli.auth {
        let Some((user, pass)) = auth.split_once(':') else {
            bail!("basic auth must be \"user:pass\"");
        };
        builder = builder.basic_auth(user, pass);
    }
    if let Some(body) = &cli.body {
        builder = builder.body(body.clone());
    } else if let Some(path) = &cli.body_file {
        builder = builder.body_file(path);
    }
    if cli.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(cli.timeout));
    }

    builder.build().context("build request template")
}

fn build_client(cli: &Cli) -> Result<Client> {
    let mut builder = Client::builder().danger_accept_invalid_certs(cli.insecure);

    if cli.disable_keepalive {
        builder = builder.pool_max_idle_per_host(0);
    }
    if cli.disable_redirects {
        builder = builder.redirect(Policy::none());
    }
    if let Some(proxy) = &cli.proxy {
        builder = builder.proxy(Proxy::all(proxy).context("parse proxy URL")?);
    }

    builder.build().context("build HTTP client")
}
