use actix_cors::Cors;
use actix_web::{
    get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use actix_ws::Message;
use canvascore::{FlowError, GraphError, NodeKind, Workflow};
use canvasruntime::api::{
    BatchExecutionRequest, BatchExecutionResponse, CancelResponse, ExecutionRequest,
    WorkflowExecutionResponse,
};
use canvasruntime::{
    templates, CanvasRuntime, DirectoryWorkflowStore, InMemoryWorkflowStore, NodeRegistry,
    RunOptions, RuntimeConfig, WorkflowStore,
};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Application state shared across handlers
struct AppState {
    runtime: Arc<CanvasRuntime>,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: &FlowError) -> HttpResponse {
    let body = ErrorResponse {
        error: e.to_string(),
    };
    match e {
        FlowError::Graph(GraphError::NotFound(_)) => HttpResponse::NotFound().json(body),
        FlowError::Graph(_) | FlowError::Serialization(_) => HttpResponse::BadRequest().json(body),
        FlowError::DuplicateExecution(_) => HttpResponse::Conflict().json(body),
        _ => {
            error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "canvasengine"
    }))
}

/// Run a workflow to completion
#[post("/api/canvas/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    req: web::Json<ExecutionRequest>,
) -> ActixResult<impl Responder> {
    let req = req.into_inner();
    info!("Executing workflow: {}", req.workflow.id);

    match data.runtime.execute(&req.workflow, &req.options()).await {
        Ok(report) => Ok(HttpResponse::Ok().json(WorkflowExecutionResponse::from(report))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Run a workflow, streaming progress as server-sent events
#[post("/api/canvas/execute/stream")]
async fn execute_stream(
    data: web::Data<AppState>,
    req: web::Json<ExecutionRequest>,
) -> ActixResult<impl Responder> {
    let req = req.into_inner();
    let options = req.options();

    match data.runtime.stream(req.workflow, options, req.execution_id) {
        Ok(events) => {
            info!("Streaming execution {}", events.execution_id());
            let body = events.map(|event| event.to_sse_frame().map(web::Bytes::from));
            Ok(HttpResponse::Ok()
                .content_type("text/event-stream")
                .insert_header(("Cache-Control", "no-cache"))
                .streaming(body))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Same as the SSE stream over a websocket.
///
/// The first text message is the execution request; a later `cancel` text
/// message or closing the socket cancels the run.
#[get("/api/canvas/execute/ws")]
async fn execute_websocket(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let runtime = Arc::clone(&data.runtime);

    actix_web::rt::spawn(async move {
        let request = loop {
            match msg_stream.recv().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ExecutionRequest>(&text) {
                        Ok(request) => break request,
                        Err(e) => {
                            let frame = serde_json::json!({
                                "type": "workflow_failed",
                                "error": format!("invalid request: {}", e),
                            });
                            let _ = session.text(frame.to_string()).await;
                            let _ = session.close(None).await;
                            return;
                        }
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        };

        let options = request.options();
        let mut events = match runtime.stream(request.workflow, options, request.execution_id) {
            Ok(events) => events,
            Err(e) => {
                let frame = serde_json::json!({"type": "workflow_failed", "error": e.to_string()});
                let _ = session.text(frame.to_string()).await;
                let _ = session.close(None).await;
                return;
            }
        };
        let execution_id = events.execution_id().to_string();
        info!("WebSocket execution {} started", execution_id);

        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else { break };
                    let Ok(json) = serde_json::to_string(&event) else { break };
                    if session.text(json).await.is_err() {
                        runtime.cancel(&execution_id);
                        break;
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                runtime.cancel(&execution_id);
                                break;
                            }
                        }
                        Message::Text(text) if text.trim() == "cancel" => {
                            runtime.cancel(&execution_id);
                        }
                        Message::Close(_) => {
                            runtime.cancel(&execution_id);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        info!("WebSocket execution {} closed", execution_id);
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// Cancel a streaming run
#[post("/api/canvas/execute/cancel/{execution_id}")]
async fn cancel_execution(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let execution_id = path.into_inner();
    if data.runtime.cancel(&execution_id) {
        Ok(HttpResponse::Ok().json(CancelResponse {
            execution_id,
            cancelled: true,
        }))
    } else {
        Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Execution {} not found or already finished", execution_id),
        }))
    }
}

#[post("/api/canvas/cache/clear")]
async fn clear_cache(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    data.runtime.clear_cache().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Cache cleared"
    })))
}

async fn save(data: &AppState, workflow: &Workflow) -> HttpResponse {
    match data.runtime.store().save(workflow).await {
        Ok(summary) => {
            info!("Saved workflow: {} ({})", summary.name, summary.id);
            HttpResponse::Ok().json(serde_json::json!({"status": "success", "id": summary.id}))
        }
        Err(e) => error_response(&e),
    }
}

/// Insert or replace a workflow
#[post("/api/canvas/save")]
async fn save_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    Ok(save(&data, &workflow).await)
}

/// Import a workflow exported as JSON; same upsert as save
#[post("/api/canvas/import")]
async fn import_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    Ok(save(&data, &workflow).await)
}

#[get("/api/canvas/list")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    match data.runtime.store().list().await {
        Ok(workflows) => Ok(HttpResponse::Ok().json(serde_json::json!({ "workflows": workflows }))),
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/api/canvas/templates/examples")]
async fn example_workflows() -> ActixResult<impl Responder> {
    match templates::all() {
        Ok(workflows) => Ok(HttpResponse::Ok().json(serde_json::json!({ "workflows": workflows }))),
        Err(e) => Ok(error_response(&FlowError::from(e))),
    }
}

#[get("/api/canvas/{id}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    match data.runtime.store().load(&path).await {
        Ok(workflow) => Ok(HttpResponse::Ok().json(workflow)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Run a saved workflow once per input value
#[post("/api/canvas/{id}/batch")]
async fn batch_execute(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<BatchExecutionRequest>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let inputs = req.into_inner().inputs;
    info!("Batch executing workflow {} over {} inputs", workflow_id, inputs.len());

    match data
        .runtime
        .execute_over_inputs(&workflow_id, inputs, &RunOptions::default().without_cache())
        .await
    {
        Ok(results) => Ok(HttpResponse::Ok().json(BatchExecutionResponse { results })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// List available node kinds
#[get("/api/nodes")]
async fn list_node_kinds(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();
    let nodes: Vec<_> = NodeKind::ALL
        .iter()
        .map(|kind| {
            let metadata = registry.get_metadata(*kind);
            serde_json::json!({
                "type": kind,
                "available": registry.contains(*kind),
                "description": metadata.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
                "category": metadata.as_ref().map(|m| m.category.clone()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

/// Routes; fixed paths are registered before `/api/canvas/{id}`.
fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(execute_workflow)
        .service(execute_stream)
        .service(execute_websocket)
        .service(cancel_execution)
        .service(clear_cache)
        .service(save_workflow)
        .service(import_workflow)
        .service(list_workflows)
        .service(example_workflows)
        .service(batch_execute)
        .service(get_workflow)
        .service(list_node_kinds);
}

fn build_runtime() -> anyhow::Result<CanvasRuntime> {
    let config = match std::env::var("CANVAS_CONFIG") {
        Ok(path) => {
            info!("Loading runtime config from {}", path);
            RuntimeConfig::from_file(&path)?
        }
        Err(_) => RuntimeConfig::default(),
    };

    let store: Arc<dyn WorkflowStore> = match std::env::var("CANVAS_WORKFLOW_DIR") {
        Ok(dir) => {
            info!("Storing workflows in {}", dir);
            Arc::new(DirectoryWorkflowStore::new(dir))
        }
        Err(_) => Arc::new(InMemoryWorkflowStore::new()),
    };

    let mut registry = NodeRegistry::new();
    canvasnodes::register_all(&mut registry);

    Ok(CanvasRuntime::with_parts(Arc::new(registry), store, config))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Canvas Engine Server");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(build_runtime()?),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
