//! Batch enrichment command.

use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::enrichment::{ClientCredentials, RemoteClient};
use crate::error::Error;
use crate::pipeline::OrchestratorBuilder;

use super::EnrichArgs;

/// Run the enrichment pipeline and print the summary
pub fn cmd_enrich(rt: &Runtime, args: &EnrichArgs) -> anyhow::Result<()> {
    let config = config::load(args.config.as_deref());
    let credentials = resolve_credentials(
        &config,
        args.client_id.as_deref(),
        args.client_secret.as_deref(),
    )?;

    let client = RemoteClient::new(&config.api).map_err(Error::from)?;
    let mut builder = OrchestratorBuilder::from_config(&config);
    if let Some(size) = args.batch_size {
        builder = builder.batch_size(size as usize);
    }
    if let Some(every) = args.checkpoint_every {
        builder = builder.checkpoint_every(every);
    }
    if let Some(path) = &args.checkpoint {
        builder = builder.checkpoint_path(path);
    }
    if args.no_resume {
        builder = builder.resume(false);
    }
    if args.analysis {
        builder = builder.analysis(true);
    }
    if args.max_analysis.is_some() {
        builder = builder.max_analysis(args.max_analysis);
    }

    let mut orchestrator = builder.build(Arc::new(client), credentials);

    println!("Enriching {:?} -> {:?}", args.input, args.output);
    let report = match rt.block_on(orchestrator.run(&args.input, &args.output)) {
        Ok(report) => report,
        Err(e) => {
            if e.is_auth() {
                print_credentials_help();
            }
            return Err(e.into());
        }
    };

    println!();
    println!("{report}");

    if let Some(path) = &args.report {
        report.write_json(path)?;
        println!();
        println!("Report written to {:?}", path);
    }
    Ok(())
}

/// Flags and env vars win over the config file.
fn resolve_credentials(
    config: &Config,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<ClientCredentials, Error> {
    let id = client_id
        .map(String::from)
        .or_else(|| config.credentials.client_id.clone())
        .filter(|s| !s.trim().is_empty());
    let secret = client_secret
        .map(String::from)
        .or_else(|| config.credentials.client_secret.clone())
        .filter(|s| !s.trim().is_empty());

    match (id, secret) {
        (Some(id), Some(secret)) => Ok(ClientCredentials::new(id, secret)),
        (None, _) => {
            print_credentials_help();
            Err(Error::missing_credentials("client id"))
        }
        (_, None) => {
            print_credentials_help();
            Err(Error::missing_credentials("client secret"))
        }
    }
}

fn print_credentials_help() {
    eprintln!("Client credentials are required.");
    eprintln!("Use: --client-id ID --client-secret SECRET");
    eprintln!("  or set TRACK_ENRICHER_CLIENT_ID and TRACK_ENRICHER_CLIENT_SECRET");
    eprintln!("  or add them to the [credentials] section of the config file");
}
