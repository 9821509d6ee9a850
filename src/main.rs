use std::{env, io, sync::Arc};

use colored::Colorize;
use log::{error, info, warn};
use thiserror::Error;
use waitwise_collab::{seed, Collab, DatabaseError, MemoryDatabase, PgDatabase, SeedError};
use waitwise_core::Config;
use waitwise_server::{run_server, ServerSentEvents};

mod logging;

#[derive(Debug, Error)]
enum WaitWiseError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not seed demo data: {0}")]
    Seed(#[from] SeedError),

    #[error("Server stopped: {0}")]
    Server(#[from] io::Error),
}

impl WaitWiseError {
    fn hint(&self) -> String {
        match self {
            Self::Database(_) => "This is a database error. Make sure WAITWISE_DATABASE_URL points to a running PostgreSQL instance, or unset it to keep data in memory.".to_string(),
            Self::Seed(_) => "Seeding only works on an empty instance, try again without --seed.".to_string(),
            Self::Server(_) => "Make sure WAITWISE_SERVER_PORT is free and can be bound.".to_string(),
        }
    }
}

async fn run() -> Result<(), WaitWiseError> {
    let config = Config::from_env();
    let should_seed = env::args().skip(1).any(|arg| arg == "--seed");

    let sse = ServerSentEvents::new();

    let collab = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let database = PgDatabase::new(url).await?;

            Collab::new(database, config.clone(), sse.clone())
        }
        None => {
            warn!("WAITWISE_DATABASE_URL is not set, data is kept in memory and lost on exit");
            Collab::new(MemoryDatabase::new(), config.clone(), sse.clone())
        }
    };

    if should_seed {
        info!("Seeding demo data...");
        seed(&collab).await?;
    }

    info!("Initialized successfully.");
    run_server(Arc::new(collab), sse).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {e}");
        return;
    }

    if let Err(error) = run().await {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "WaitWise failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
