//! Remote file data types

use serde::{Deserialize, Serialize};

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// Stat attributes, times in seconds since the epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub atime: f64,
    #[serde(default)]
    pub mtime: f64,
}

impl Attributes {
    fn format(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.format() == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.format() == S_IFLNK
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }
}

/// Entry kind derived from the format bits of `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    /// Block or character device
    Device,
    /// FIFO, socket, or an unresolved symlink
    Special,
    /// Unknown format bits or a dangling link
    Invalid,
}

impl FileType {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileType::File,
            S_IFDIR => FileType::Directory,
            S_IFBLK | S_IFCHR => FileType::Device,
            S_IFIFO | S_IFSOCK | S_IFLNK => FileType::Special,
            _ => FileType::Invalid,
        }
    }
}

/// Plain directory entry, attributes of the entry itself (not followed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub filename: String,
    pub longname: String,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub target: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub broken: bool,
}

/// Directory entry with symlinks resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub filename: String,
    pub abspath: String,
    /// `None` when a symlink target could not be stat'ed
    pub attrs: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkInfo>,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

impl FileItem {
    /// Regular (non-link) entry
    pub fn from_entry(abspath: String, entry: DirEntry) -> Self {
        Self {
            file_type: entry.attrs.file_type(),
            filename: entry.filename,
            abspath,
            attrs: Some(entry.attrs),
            link: None,
        }
    }

    /// Link whose target stat succeeded
    pub fn resolved_link(filename: String, abspath: String, target: String, attrs: Attributes) -> Self {
        Self {
            filename,
            abspath,
            file_type: attrs.file_type(),
            attrs: Some(attrs),
            link: Some(LinkInfo {
                target,
                broken: false,
            }),
        }
    }

    /// Dangling link
    pub fn broken_link(filename: String, abspath: String, target: String) -> Self {
        Self {
            filename,
            abspath,
            attrs: None,
            link: Some(LinkInfo {
                target,
                broken: true,
            }),
            file_type: FileType::Invalid,
        }
    }
}
