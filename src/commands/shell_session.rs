//! `shell-session/*` commands

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::shell::ShellInfo;
use crate::Core;

#[derive(Deserialize)]
pub struct OpenParams {
    pub device: String,
}

#[derive(Deserialize)]
pub struct TokenParams {
    pub token: String,
}

#[derive(Deserialize)]
pub struct WriteParams {
    pub token: String,
    pub data: String,
}

#[derive(Deserialize)]
pub struct ResizeParams {
    pub token: String,
    pub rows: u16,
    pub cols: u16,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

/// Open a shell, returns its token
pub async fn open(core: Arc<Core>, params: OpenParams) -> Result<String> {
    core.shells.open(&params.device).await
}

pub async fn close(core: Arc<Core>, params: TokenParams) -> Result<()> {
    core.shells.close(&params.token).await
}

/// Params are ignored
pub async fn list(core: Arc<Core>, _params: Value) -> Result<Vec<ShellInfo>> {
    Ok(core.shells.list())
}

pub async fn closed(core: Arc<Core>, params: TokenParams) -> Result<bool> {
    Ok(core.shells.get(&params.token)?.closed())
}

pub async fn dumb(core: Arc<Core>, params: TokenParams) -> Result<bool> {
    Ok(core.shells.get(&params.token)?.dumb())
}

pub async fn write(core: Arc<Core>, params: WriteParams) -> Result<()> {
    core.shells.get(&params.token)?.write(&params.data).await
}

pub async fn resize(core: Arc<Core>, params: ResizeParams) -> Result<()> {
    core.shells
        .get(&params.token)?
        .resize(params.rows, params.cols, params.height, params.width)
        .await
}

/// Current screen contents
pub async fn buffer(core: Arc<Core>, params: TokenParams) -> Result<String> {
    Ok(core.shells.get(&params.token)?.buffer())
}
