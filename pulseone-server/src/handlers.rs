//! Read-only introspection and process-control handlers (§6).

use axum::extract::{Path, State};
use axum::Json;
use pulseone_contracts::{ConnectionState, StatisticsSnapshot};
use pulseone_model::{DataPoint, Device, DeviceId};
use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DeviceSummary {
    pub device: Device,
    pub running: bool,
}

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceSummary>> {
    let mut out = Vec::new();
    for device in state.directory.all() {
        let running = state.runtime.registry.is_running(device.id).await;
        out.push(DeviceSummary { device: device.clone(), running });
    }
    Json(out)
}

pub async fn get_device(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<DeviceSummary>> {
    let device_id = DeviceId(id);
    let device = state
        .directory
        .device(device_id)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("device {device_id} not found")))?;
    let running = state.runtime.registry.is_running(device_id).await;
    Ok(Json(DeviceSummary { device, running }))
}

pub async fn get_device_points(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Vec<DataPoint>>> {
    let device_id = DeviceId(id);
    if state.directory.device(device_id).is_none() {
        return Err(AppError::not_found(format!("device {device_id} not found")));
    }
    Ok(Json(state.directory.points(device_id).to_vec()))
}

#[derive(Serialize)]
pub struct DeviceStats {
    pub connection_state: ConnectionState,
    pub statistics: StatisticsSnapshot,
}

pub async fn get_device_stats(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<DeviceStats>> {
    let device_id = DeviceId(id);
    let worker = state
        .runtime
        .registry
        .worker(device_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("device {device_id} has no running worker")))?;
    let driver = worker.driver();
    Ok(Json(DeviceStats {
        connection_state: driver.connection_state(),
        statistics: driver.statistics(),
    }))
}

pub async fn pause_device(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    let ok = state.runtime.registry.pause(DeviceId(id)).await;
    if !ok {
        return Err(AppError::not_found(format!("device {id} has no running worker")));
    }
    Ok(Json(serde_json::json!({ "paused": true })))
}

pub async fn resume_device(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    let ok = state.runtime.registry.resume(DeviceId(id)).await;
    if !ok {
        return Err(AppError::not_found(format!("device {id} has no running worker")));
    }
    Ok(Json(serde_json::json!({ "resumed": true })))
}

/// Stops and respawns a device's worker from the boot-time directory
/// snapshot. A real deployment would re-fetch the device's definition
/// from the configuration-persistence layer first (§1, external); here
/// the snapshot is already the source of truth.
pub async fn reload_device(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    let device_id = DeviceId(id);
    let device = state
        .directory
        .device(device_id)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("device {device_id} not found")))?;
    let points = state.directory.points(device_id).to_vec();

    state.runtime.registry.stop(device_id).await;
    state
        .runtime
        .registry
        .spawn_worker(device, points)
        .await
        .map_err(AppError::from)?;
    Ok(Json(serde_json::json!({ "reloaded": true })))
}
