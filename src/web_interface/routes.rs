use std::sync::Arc;

use log::error;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{render_messages_text, ApiError};
use crate::controller::Controller;
use crate::ingestion::{IngestionReport, RunOutcome};

fn error_reply(message: &str, status: StatusCode) -> reply::Response {
    reply::with_status(
        reply::json(&ApiError {
            message: message.to_string(),
        }),
        status,
    )
    .into_response()
}

/// Status code for the outcome of a requested ingestion pass.
pub fn ingest_status(outcome: &RunOutcome<IngestionReport>) -> StatusCode {
    match outcome {
        RunOutcome::Completed(_) => StatusCode::OK,
        RunOutcome::Skipped => StatusCode::CONFLICT,
    }
}

/// GET /
pub fn messages_text_route(
    controller: Arc<Controller>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(move || {
        let controller = controller.clone();
        async move {
            match controller.messages().await {
                Ok(list) => Ok::<_, Rejection>(
                    reply::with_header(
                        render_messages_text(&list),
                        "Content-Type",
                        "text/plain; charset=utf-8",
                    )
                    .into_response(),
                ),
                Err(e) => {
                    error!("Failed to load messages: {}", e);
                    Ok::<_, Rejection>(error_reply(
                        "Failed to load messages",
                        StatusCode::INTERNAL_SERVER_ERROR,
                    ))
                }
            }
        }
    })
}

/// GET /messages
pub fn list_messages_route(
    controller: Arc<Controller>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("messages")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                match controller.messages().await {
                    Ok(list) => Ok::<_, Rejection>(
                        reply::with_status(reply::json(&list), StatusCode::OK).into_response(),
                    ),
                    Err(e) => {
                        error!("Failed to load messages: {}", e);
                        Ok::<_, Rejection>(error_reply(
                            "Failed to load messages",
                            StatusCode::INTERNAL_SERVER_ERROR,
                        ))
                    }
                }
            }
        })
}

/// GET /reconcile
pub fn reconcile_route(
    controller: Arc<Controller>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("reconcile")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                let events = controller.reconcile_once().await;
                Ok::<_, Rejection>(reply::with_status(reply::json(&events), StatusCode::OK))
            }
        })
}

/// GET /status
pub fn status_route(
    controller: Arc<Controller>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                let status = controller.fleet_status().await;
                Ok::<_, Rejection>(reply::with_status(reply::json(&status), StatusCode::OK))
            }
        })
}

/// POST /ingest
pub fn ingest_route(
    controller: Arc<Controller>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ingest")
        .and(warp::path::end())
        .and(warp::post())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                match controller.ingest_once().await {
                    Ok(RunOutcome::Completed(report)) => Ok::<_, Rejection>(
                        reply::with_status(reply::json(&report), StatusCode::OK).into_response(),
                    ),
                    Ok(outcome @ RunOutcome::Skipped) => Ok::<_, Rejection>(error_reply(
                        "An ingestion run is already in progress",
                        ingest_status(&outcome),
                    )),
                    Err(e) => {
                        error!("Ingestion request failed: {}", e);
                        Ok::<_, Rejection>(error_reply(
                            "Ingestion failed",
                            StatusCode::INTERNAL_SERVER_ERROR,
                        ))
                    }
                }
            }
        })
}
