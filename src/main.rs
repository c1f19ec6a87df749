//! redis-keystore driver
//!
//! Reads one lifecycle request as JSON from stdin and writes the result as
//! JSON to stdout. Logs go to stderr.
//!
//! ```text
//! {"op":"create","desired":{"a":"1"},"endpoint":{"hostname":"cache"}}
//! {"op":"read","desired":{"a":"1"}}
//! {"op":"update","old":{"a":"1"},"new":{"a":"2"},"id":"1234"}
//! {"op":"delete","last_known":{"a":"2"}}
//! ```

use std::process::ExitCode;

use redis_keystore::{init_logging, EndpointConfig, Keyset, ReconcileError, Reconciler, ResourceId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::error;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Create {
        desired: Keyset,
        #[serde(default)]
        endpoint: EndpointConfig,
    },
    Read {
        desired: Keyset,
        #[serde(default)]
        endpoint: EndpointConfig,
    },
    Update {
        old: Keyset,
        new: Keyset,
        id: ResourceId,
        #[serde(default)]
        endpoint: EndpointConfig,
    },
    Delete {
        last_known: Keyset,
        #[serde(default)]
        endpoint: EndpointConfig,
    },
}

#[derive(Debug, Default, Serialize)]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keyset: Option<Keyset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle(request: Request) -> Result<Response, ReconcileError> {
    let reconciler = Reconciler::redis();

    match request {
        Request::Create { desired, endpoint } => {
            let endpoint = endpoint.resolve()?;
            let (id, observed) = reconciler.create(&desired, &endpoint).await?;
            Ok(created(id, observed))
        }
        Request::Read { desired, endpoint } => {
            let endpoint = endpoint.resolve()?;
            let observed = reconciler.read(&desired, &endpoint).await?;
            Ok(Response {
                keyset: Some(observed),
                ..Default::default()
            })
        }
        Request::Update {
            old,
            new,
            id,
            endpoint,
        } => {
            let endpoint = endpoint.resolve()?;
            let observed = reconciler.update(&old, &new, &id, &endpoint).await?;
            Ok(Response {
                id: Some(id),
                keyset: Some(observed),
                ..Default::default()
            })
        }
        Request::Delete {
            last_known,
            endpoint,
        } => {
            let endpoint = endpoint.resolve()?;
            reconciler.delete(&last_known, &endpoint).await?;
            Ok(Response::default())
        }
    }
}

async fn write_response(response: &Response) -> std::io::Result<()> {
    let mut body = serde_json::to_vec(response)?;
    body.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await?;
    stdout.flush().await
}

/// The id is reported whenever the keys were written, even if the
/// read-back then failed; the caller must still track the resource.
fn created(id: ResourceId, observed: Result<Keyset, ReconcileError>) -> Response {
    match observed {
        Ok(observed) => Response {
            id: Some(id),
            keyset: Some(observed),
            ..Default::default()
        },
        Err(e) => {
            error!("{}", e);
            Response {
                id: Some(id),
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

fn failure(message: String) -> Response {
    Response {
        error: Some(message),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let mut input = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut input).await {
        error!("Failed to read request: {}", e);
        let _ = write_response(&failure(format!("Failed to read request: {}", e))).await;
        return ExitCode::FAILURE;
    }

    let request: Request = match serde_json::from_str(&input) {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid request: {}", e);
            let _ = write_response(&failure(format!("Invalid request: {}", e))).await;
            return ExitCode::FAILURE;
        }
    };

    let response = match handle(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("{}", e);
            failure(e.to_string())
        }
    };
    let code = if response.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    if let Err(e) = write_response(&response).await {
        error!("Failed to write response: {}", e);
        return ExitCode::FAILURE;
    }
    code
}
