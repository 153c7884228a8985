use actix_web::{HttpResponse, get, web};
use lanwatch::Snapshot;

use crate::{AppError, AppState};

/// Monitored devices plus discovered devices that are not monitored
#[get("/api/devices")]
pub async fn devices_route(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let snapshot = Snapshot::collect(state.store.as_ref()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}
