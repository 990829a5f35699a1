use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::cli::Cli;
use crate::launcher::RendererConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub shutdown_grace: Duration,
    pub renderer: Option<RendererConfig>,
}

impl TryFrom<&Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let host: IpAddr = cli
            .host
            .parse()
            .with_context(|| format!("invalid listen host: {}", cli.host))?;

        if cli.renderer.is_none() && (!cli.renderer_args.is_empty() || cli.renderer_dir.is_some())
        {
            anyhow::bail!("--renderer-arg and --renderer-dir require --renderer");
        }

        let renderer = cli.renderer.clone().map(|program| RendererConfig {
            program,
            args: cli.renderer_args.clone(),
            working_dir: cli.renderer_dir.clone(),
        });

        Ok(Self {
            listen_addr: SocketAddr::new(host, cli.port),
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
            renderer,
        })
    }
}
