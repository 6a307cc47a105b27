use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shiftdesk::cache::CacheService;
use shiftdesk::config::{AppConfig, Backend};
use shiftdesk::remote::RemoteClient;
use shiftdesk::server::{AppState, create_router};
use shiftdesk::store::{MemoryStore, RecordStore, SupabaseStore, VikaSheets, VikaStore};

#[derive(Parser)]
#[command(name = "shiftdesk")]
#[command(about = "A work-schedule and shop-management API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind to. Overrides the PORT environment variable.
        #[arg(long, short)]
        port: Option<u16>,
    },
}

fn build_store(config: &AppConfig, cache: &Arc<CacheService>) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.backend {
        Backend::Memory => {
            info!("using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Backend::Vika => {
            let Some(vika) = &config.vika else {
                bail!("vika backend selected but not configured");
            };
            let client =
                RemoteClient::new(&vika.base_url, &vika.api_token, &[])?.with_cache(cache.clone());
            let sheets = VikaSheets {
                users: vika.user_sheet.clone(),
                schedules: vika.schedule_sheet.clone(),
                profiles: vika.profile_sheet.clone(),
                hotels: vika.hotel_sheet.clone(),
                shops: vika.shop_sheet.clone(),
            };
            info!(
                "using datasheet record store ({} field schema)",
                vika.field_schema.as_str()
            );
            Ok(Arc::new(VikaStore::new(client, vika.field_schema, sheets)))
        }
        Backend::Supabase => {
            let Some(supabase) = &config.supabase else {
                bail!("supabase backend selected but not configured");
            };
            let client = RemoteClient::new(
                &supabase.url,
                &supabase.api_key,
                &[("apikey", supabase.api_key.clone())],
            )?
            .with_cache(cache.clone());
            info!("using postgrest record store");
            Ok(Arc::new(SupabaseStore::new(client)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shiftdesk=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = AppConfig::from_env()?;
            let port = port.unwrap_or(config.port);

            let cache = Arc::new(CacheService::new());
            cache.start_sweeper();

            let store = build_store(&config, &cache)?;
            let state = Arc::new(AppState {
                store,
                cache,
                config,
            });

            let app = create_router(state);
            let addr = format!("{host}:{port}");

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }

    Ok(())
}
