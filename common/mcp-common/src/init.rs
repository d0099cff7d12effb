//! Server startup: tracing setup and the `serve_stdio!` macro

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr; stdout carries the MCP protocol
///
/// `RUST_LOG` filters as usual, with `<crate_name>=info` added as the
/// default directive. `LOG_FORMAT=json` switches to one JSON object per line.
///
/// ```rust,ignore
/// mcp_common::init_tracing("sql_gateway_mcp")?;
/// ```
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let registry = tracing_subscriber::registry().with(filter);

    if json_logs_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}

fn json_logs_requested() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Generate `main` for a stdio MCP server
///
/// `$server` is an expression evaluated inside the async `main` after tracing
/// is up, so it may `.await` and use `?` (the error type is `anyhow::Error`).
/// Startup failures are logged before `main` returns them.
///
/// ```rust,ignore
/// mcp_common::serve_stdio!(build_server().await?, "sql_gateway_mcp");
/// ```
#[macro_export]
macro_rules! serve_stdio {
    ($server:expr, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            use rmcp::ServiceExt;

            $crate::init_tracing($crate_name)?;

            tracing::info!(concat!("Starting ", $crate_name, " MCP Server"));

            let startup = async { anyhow::Ok($server) }.await;
            let server = match startup {
                Ok(server) => server,
                Err(err) => {
                    tracing::error!(error = %format!("{:#}", err), "Startup failed");
                    return Err(err);
                }
            };

            let service = server.serve(rmcp::transport::stdio()).await?;

            tracing::info!("Server running, waiting for requests...");

            service.waiting().await?;

            tracing::info!("Server shutting down");
            Ok(())
        }
    };
}
