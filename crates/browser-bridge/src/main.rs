use std::{path::PathBuf, time::Duration};

use bridge_protocol::{
    rpc::{RpcRequest, RpcResponse},
    rpc_client::BridgeClient,
};
use browser_bridge::{
    cli::{Args, ServeArgs},
    config::Dirs,
    lifecycle::{Supervisor, termination_signal},
    spawn_named,
    tracing_init::init_client_tracing,
};
use clap::Parser;
use eyre::{WrapErr, bail};
use mimalloc::MiMalloc;
use serde_json::Value;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Tokio's stdin reader sits on a blocking thread that can't be
/// interrupted, so the runtime is not waited on past this.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(200);

async fn run_server(args: ServeArgs) -> eyre::Result<()> {
    let config = args.into_config();
    let stop = termination_signal()?;
    Supervisor::new(config)
        .run(tokio::io::stdin(), tokio::io::stdout(), stop)
        .await?;
    Ok(())
}

/// The payload of a response as JSON, `None` for calls without one.
fn response_json(response: RpcResponse) -> eyre::Result<Option<Value>> {
    let value = match response {
        RpcResponse::Pong(s)
        | RpcResponse::AppName(s)
        | RpcResponse::ScriptResult(s) => Value::String(s),
        RpcResponse::Tabs(tabs) => serde_json::to_value(tabs)?,
        RpcResponse::Tab(tab) => serde_json::to_value(tab)?,
        RpcResponse::Bookmarks(bookmarks) => serde_json::to_value(bookmarks)?,
        RpcResponse::History(entries) => serde_json::to_value(entries)?,
        RpcResponse::Downloads(entries) => serde_json::to_value(entries)?,
        RpcResponse::Done => return Ok(None),
        RpcResponse::Error { message } => bail!(message),
    };
    Ok(Some(value))
}

async fn run_client(
    socket_path: Option<PathBuf>,
    request: RpcRequest,
) -> eyre::Result<()> {
    init_client_tracing();
    let socket_path = socket_path.unwrap_or_else(|| Dirs::from_env().socket_path());

    let mut client = BridgeClient::connect(&socket_path).await.wrap_err_with(|| {
        format!("unable to reach a bridge at {}", socket_path.display())
    })?;
    let response = client
        .request(&request)
        .await
        .wrap_err_with(|| format!("{} failed", request.method()))?;

    if let Some(value) = response_json(response)? {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("unable to initialize tokio runtime")?;

    let result = runtime.block_on(async move {
        let body = async move {
            match args {
                Args::Serve(serve) => run_server(serve).await,
                Args::Call {
                    socket_path,
                    method,
                } => run_client(socket_path, method.into()).await,
            }
        };
        spawn_named("root", body)
            .await
            .wrap_err("root task panicked")?
    });

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}
