//! `file-session/*` commands

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::files::{Attributes, DirEntry, FileItem};
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
pub struct PathParams {
    pub token: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct RmParams {
    pub token: String,
    pub path: String,
    pub recursive: bool,
}

#[derive(Deserialize)]
pub struct TransferParams {
    pub token: String,
    pub remote: String,
    pub local: PathBuf,
}

/// Open a file session, returns its token
pub async fn open(core: Arc<Core>, params: OpenParams) -> Result<String> {
    core.files.open(&params.device).await
}

pub async fn close(core: Arc<Core>, params: TokenParams) -> Result<()> {
    core.files.close(&params.token).await
}

pub async fn readdir(core: Arc<Core>, params: PathParams) -> Result<Vec<DirEntry>> {
    core.files.get(&params.token)?.readdir(&params.path).await
}

/// Listing with symlinks resolved
pub async fn readdir_ext(core: Arc<Core>, params: PathParams) -> Result<Vec<FileItem>> {
    core.files.get(&params.token)?.readdir_ext(&params.path).await
}

pub async fn readlink(core: Arc<Core>, params: PathParams) -> Result<String> {
    core.files.get(&params.token)?.readlink(&params.path).await
}

pub async fn stat(core: Arc<Core>, params: PathParams) -> Result<Attributes> {
    core.files.get(&params.token)?.stat(&params.path).await
}

pub async fn rm(core: Arc<Core>, params: RmParams) -> Result<()> {
    core.files
        .get(&params.token)?
        .rm(&params.path, params.recursive)
        .await
}

pub async fn get(core: Arc<Core>, params: TransferParams) -> Result<()> {
    core.files
        .get(&params.token)?
        .get(&params.remote, &params.local)
        .await
}

pub async fn put(core: Arc<Core>, params: TransferParams) -> Result<()> {
    core.files
        .get(&params.token)?
        .put(&params.local, &params.remote)
        .await
}

/// Download into the temp directory, returns the local path
pub async fn download_temp(core: Arc<Core>, params: PathParams) -> Result<PathBuf> {
    core.files
        .get(&params.token)?
        .download_to_temp(&params.path)
        .await
}
