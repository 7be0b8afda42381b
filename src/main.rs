use std::io::Write;

use anyhow::Context;
use courier::client::{Handled, HttpClient, SessionHandler};
use courier::config::Config;
use courier::http::request::{Method, Request};
use tracing_subscriber::EnvFilter;

/// Attaches the optional command-line body to the outgoing request.
struct CliHandler {
    body: Option<String>,
}

impl SessionHandler for CliHandler {
    fn on_request_ready(&mut self, request: &mut Request) -> Handled {
        if let Some(body) = self.body.take() {
            request.set_header("Content-Type", "text/plain; charset=utf-8");
            request.set_body(body);
        }
        Handled::Yes
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut args = std::env::args().skip(1);
    let (method, url) = match (args.next(), args.next()) {
        (Some(method), Some(url)) => (method, url),
        _ => anyhow::bail!("usage: courier <METHOD> <URL> [BODY]"),
    };
    let method: Method = method.to_ascii_uppercase().parse()?;
    let body = args.next();

    let mut client = HttpClient::with_handler(cfg.client, CliHandler { body });

    let response = tokio::select! {
        res = client.fetch(method, &url) => {
            res.with_context(|| format!("{} {} failed", method, url))?
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            return Ok(());
        }
    };

    let mut out = std::io::stdout().lock();
    writeln!(out, "{} {} {}", response.version, response.status, response.reason)?;
    for (name, value) in response.headers.iter() {
        writeln!(out, "{}: {}", name, value)?;
    }
    writeln!(out)?;
    out.write_all(&response.body)?;
    out.flush()?;

    Ok(())
}
