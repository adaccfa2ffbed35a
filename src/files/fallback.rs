//! Exec-based file access for devices without the SFTP subsystem
//!
//! Listing and stat run a small inline node.js program on the device. The
//! target path never lands on the command line: it is written to the
//! command's stdin and read back from `/dev/stdin` (or consumed by
//! `xargs -0`), so paths with quotes or newlines are passed through intact.
//! The scripts stick to ES5 for the old runtimes shipped on TVs.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::path_utils::shell_quote;
use super::types::{Attributes, DirEntry, FileItem, FileType, LinkInfo};
use crate::error::{Error, Result};
use crate::ssh::CommandRunner;

const SCRIPT_PRELUDE: &str = r#"var fs=require("fs"),path=require("path");var loc=fs.readFileSync("/dev/stdin","utf8");function attrs(s){return {mode:s.mode,uid:s.uid,gid:s.gid,size:s.size,atime:s.atime.getTime()/1000,mtime:s.mtime.getTime()/1000};}"#;

const READDIR_SCRIPT: &str = r#"console.log(JSON.stringify(fs.readdirSync(loc).map(function(f){return {filename:f,longname:f,attrs:attrs(fs.lstatSync(path.join(loc,f)))};})));"#;

const READDIR_EXT_SCRIPT: &str = r#"console.log(JSON.stringify(fs.readdirSync(loc).map(function(f){var p=path.join(loc,f);var s=fs.lstatSync(p);if(!s.isSymbolicLink()){return {filename:f,abspath:p,attrs:attrs(s)};}var t=fs.readlinkSync(p);var r=path.resolve(loc,t);try{return {filename:f,abspath:r,link:{target:t},attrs:attrs(fs.statSync(r))};}catch(e){return {filename:f,abspath:r,link:{target:t,broken:true},attrs:null};}})));"#;

const STAT_SCRIPT: &str = r#"console.log(JSON.stringify(attrs(fs.statSync(loc))));"#;

const LSTAT_SCRIPT: &str = r#"console.log(JSON.stringify(attrs(fs.lstatSync(loc))));"#;

#[derive(Deserialize)]
struct RawItem {
    filename: String,
    abspath: String,
    attrs: Option<Attributes>,
    link: Option<LinkInfo>,
}

impl From<RawItem> for FileItem {
    fn from(raw: RawItem) -> Self {
        FileItem {
            file_type: raw
                .attrs
                .as_ref()
                .map(Attributes::file_type)
                .unwrap_or(FileType::Invalid),
            filename: raw.filename,
            abspath: raw.abspath,
            attrs: raw.attrs,
            link: raw.link,
        }
    }
}

pub struct FallbackFileSession {
    runner: Arc<dyn CommandRunner>,
}

impl FallbackFileSession {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn run_script(&self, body: &str, path: &str) -> Result<String> {
        let script = format!("{}{}", SCRIPT_PRELUDE, body);
        let command = format!("node -e {}", shell_quote(&script));
        let output = self
            .runner
            .exec_checked(&command, Some(path.as_bytes()))
            .await?;
        Ok(output.stdout_string())
    }

    pub async fn readdir(&self, location: &str) -> Result<Vec<DirEntry>> {
        let out = self.run_script(READDIR_SCRIPT, location).await?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn readdir_ext(&self, location: &str) -> Result<Vec<FileItem>> {
        let out = self.run_script(READDIR_EXT_SCRIPT, location).await?;
        let raw: Vec<RawItem> = serde_json::from_str(&out)?;
        Ok(raw.into_iter().map(FileItem::from).collect())
    }

    pub async fn readlink(&self, path: &str) -> Result<String> {
        let output = self
            .runner
            .exec_checked("xargs -0 readlink -n", Some(path.as_bytes()))
            .await?;
        Ok(output.stdout_string())
    }

    pub async fn stat(&self, path: &str) -> Result<Attributes> {
        let out = self.run_script(STAT_SCRIPT, path).await?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        let out = self.run_script(LSTAT_SCRIPT, path).await?;
        let attrs: Attributes = serde_json::from_str(&out)?;
        if attrs.is_dir() && !recursive {
            return Err(Error::IsADirectory(path.to_string()));
        }

        let command = if recursive {
            "xargs -0 rm -r"
        } else {
            "xargs -0 rm"
        };
        self.runner
            .exec_checked(command, Some(path.as_bytes()))
            .await?;
        Ok(())
    }

    pub async fn get(&self, remote: &str, local: &Path) -> Result<()> {
        let command = format!("cat {}", shell_quote(remote));
        let output = self
            .runner
            .exec_checked(&command, None)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote, e)))?;
        tokio::fs::write(local, &output.stdout)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", local.display(), e)))?;
        debug!("Downloaded {} ({} bytes)", remote, output.stdout.len());
        Ok(())
    }

    pub async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", local.display(), e)))?;
        let command = format!("cat > {}", shell_quote(remote));
        self.runner
            .exec_checked(&command, Some(&data))
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote, e)))?;
        debug!("Uploaded {} ({} bytes)", remote, data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ssh::FakeRunner;

    fn session() -> (Arc<FakeRunner>, FallbackFileSession) {
        let runner = Arc::new(FakeRunner::default());
        (runner.clone(), FallbackFileSession::new(runner))
    }

    #[tokio::test]
    async fn test_path_goes_through_stdin() {
        let (runner, s) = session();
        runner.reply(r#"[{"filename":"a","longname":"a","attrs":{"mode":33188,"uid":0,"gid":0,"size":3,"atime":1.5,"mtime":2.5}}]"#, 0);

        let path = "/tmp/it's; rm -rf /";
        let entries = s.readdir(path).await.unwrap();
        assert_eq!(entries[0].filename, "a");
        assert_eq!(entries[0].attrs.mtime, 2.5);

        let calls = runner.calls.lock();
        let (command, stdin) = &calls[0];
        assert!(command.starts_with("node -e '"));
        assert!(!command.contains("rm -rf"));
        assert_eq!(stdin.as_deref(), Some(path.as_bytes()));
    }

    #[tokio::test]
    async fn test_readdir_ext_matches_native_shape() {
        let (runner, s) = session();
        runner.reply(
            r#"[{"filename":"bin","abspath":"/usr/bin","attrs":{"mode":16877,"uid":0,"gid":0,"size":0,"atime":0,"mtime":0}},
                {"filename":"dangling","abspath":"/usr/gone","link":{"target":"gone","broken":true},"attrs":null},
                {"filename":"sh","abspath":"/bin/busybox","link":{"target":"/bin/busybox"},"attrs":{"mode":33261,"uid":0,"gid":0,"size":9,"atime":0,"mtime":0}}]"#,
            0,
        );

        let items = s.readdir_ext("/usr").await.unwrap();
        assert_eq!(items[0].file_type, FileType::Directory);
        assert!(items[1].attrs.is_none());
        assert_eq!(items[1].file_type, FileType::Invalid);
        assert!(items[1].link.as_ref().unwrap().broken);
        assert_eq!(items[2].file_type, FileType::File);
        assert!(!items[2].link.as_ref().unwrap().broken);
    }

    #[tokio::test]
    async fn test_rm_directory_without_recursive() {
        let (runner, s) = session();
        runner.reply(r#"{"mode":16877,"uid":0,"gid":0,"size":0,"atime":0,"mtime":0}"#, 0);

        let err = s.rm("/media/developer/apps", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IsADirectory);
        assert_eq!(runner.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_rm_recursive_uses_xargs() {
        let (runner, s) = session();
        runner.reply(r#"{"mode":16877,"uid":0,"gid":0,"size":0,"atime":0,"mtime":0}"#, 0);
        runner.reply("", 0);

        s.rm("/tmp/dir", true).await.unwrap();
        let calls = runner.calls.lock();
        assert_eq!(calls[1].0, "xargs -0 rm -r");
        assert_eq!(calls[1].1.as_deref(), Some(b"/tmp/dir".as_slice()));
    }

    #[tokio::test]
    async fn test_helper_failure_is_remote_command_failure() {
        let (runner, s) = session();
        runner.reply_err("Error: ENOENT, no such file or directory '/nope'", 1);

        let err = s.stat("/nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCommandFailure);
    }

    #[tokio::test]
    async fn test_get_writes_local_file() {
        let (runner, s) = session();
        runner.reply("127.0.0.1 localhost\n", 0);
        let temp = tempfile::tempdir().unwrap();
        let local = temp.path().join("hosts");

        s.get("/etc/hosts", &local).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&local).await.unwrap(),
            "127.0.0.1 localhost\n"
        );
        assert_eq!(runner.calls.lock()[0].0, "cat '/etc/hosts'");
    }

    #[tokio::test]
    async fn test_put_streams_local_file() {
        let (runner, s) = session();
        let temp = tempfile::tempdir().unwrap();
        let local = temp.path().join("app.ipk");
        tokio::fs::write(&local, b"payload").await.unwrap();

        s.put(&local, "/tmp/app.ipk").await.unwrap();
        let calls = runner.calls.lock();
        assert_eq!(calls[0].0, "cat > '/tmp/app.ipk'");
        assert_eq!(calls[0].1.as_deref(), Some(b"payload".as_slice()));
    }

    #[tokio::test]
    async fn test_failed_get_is_transfer_failure() {
        let (runner, s) = session();
        runner.reply_err("cat: can't open '/x': No such file or directory", 1);
        let temp = tempfile::tempdir().unwrap();

        let err = s.get("/x", &temp.path().join("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
    }
}
