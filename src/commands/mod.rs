//! Command surface for the presentation layer
//!
//! Every operation is addressed by a method name such as
//! `file-session/readdir` and takes JSON params. The table is built once by
//! `CommandRouter::new` and never changes afterwards.

pub mod file_session;
pub mod shell_session;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::Core;

type Handler = Box<dyn Fn(Arc<Core>, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub struct CommandRouter {
    core: Arc<Core>,
    handlers: HashMap<&'static str, Handler>,
}

impl CommandRouter {
    pub fn new(core: Arc<Core>) -> Self {
        let mut router = Self {
            core,
            handlers: HashMap::new(),
        };

        router.register("file-session/open", file_session::open);
        router.register("file-session/close", file_session::close);
        router.register("file-session/readdir", file_session::readdir);
        router.register("file-session/readdir_ext", file_session::readdir_ext);
        router.register("file-session/readlink", file_session::readlink);
        router.register("file-session/stat", file_session::stat);
        router.register("file-session/rm", file_session::rm);
        router.register("file-session/get", file_session::get);
        router.register("file-session/put", file_session::put);
        router.register("file-session/downloadTemp", file_session::download_temp);

        router.register("shell-session/open", shell_session::open);
        router.register("shell-session/close", shell_session::close);
        router.register("shell-session/list", shell_session::list);
        router.register("shell-session/closed", shell_session::closed);
        router.register("shell-session/dumb", shell_session::dumb);
        router.register("shell-session/write", shell_session::write);
        router.register("shell-session/resize", shell_session::resize);
        router.register("shell-session/buffer", shell_session::buffer);

        router
    }

    fn register<P, R, F, Fut>(&mut self, method: &'static str, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(Arc<Core>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let handler: Handler = Box::new(move |core, params| {
            match serde_json::from_value::<P>(params) {
                Ok(params) => {
                    let fut = handler(core, params);
                    async move { Ok(serde_json::to_value(fut.await?)?) }.boxed()
                }
                Err(e) => {
                    let err = Error::InvalidParams(format!("{}: {}", method, e));
                    async move { Err(err) }.boxed()
                }
            }
        });
        self.handlers.insert(method, handler);
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<&'static str> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))?;
        debug!("Dispatching {}", method);
        handler(self.core.clone(), params).await
    }
}
