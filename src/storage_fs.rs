//! Local-directory document store.
//!
//! Walks `storage.filesystem.root` for files matching the include globs and
//! serves them back through the `/files/{*name}` route. Citation links are
//! HMAC-SHA256 signed and expire after `storage.link_ttl_secs`:
//!
//! ```text
//! {public_url}/files/{name}?expires={unix_secs}&sig={hex}
//! ```
//!
//! The signing secret comes from the environment variable named by
//! `storage.filesystem.link_secret_env`. When it is unset an ephemeral
//! per-process secret is used, so links stop verifying after a restart.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use docent_core::storage::{DocumentStore, LinkResolver, StoredDocument};

use crate::config::{Config, StorageConfig};

type HmacSha256 = Hmac<Sha256>;

/// Why a signed file link was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("link expired")]
    Expired,
    #[error("invalid link signature")]
    BadSignature,
    #[error("invalid document path")]
    BadPath,
}

pub struct FsDocumentStore {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    public_base: String,
    link_ttl_secs: u64,
    secret: Vec<u8>,
}

impl FsDocumentStore {
    pub fn new(config: &Config) -> Result<Self> {
        let fs = &config.storage.filesystem;
        let secret = match std::env::var(&fs.link_secret_env) {
            Ok(s) if !s.is_empty() => s.into_bytes(),
            _ => {
                tracing::warn!(
                    env = %fs.link_secret_env,
                    "link secret not set; using an ephemeral secret"
                );
                ephemeral_secret()
            }
        };
        Self::with_secret(
            &config.storage,
            fs.root.clone(),
            config.server.public_base_url(),
            secret,
        )
    }

    pub fn with_secret(
        storage: &StorageConfig,
        root: PathBuf,
        public_base: String,
        secret: Vec<u8>,
    ) -> Result<Self> {
        if !root.is_dir() {
            bail!("Document root does not exist: {}", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve document root: {}", root.display()))?;

        let mut default_excludes = vec!["**/.git/**".to_string()];
        default_excludes.extend(storage.exclude_globs.iter().cloned());

        Ok(Self {
            root,
            include: build_globset(&storage.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: storage.filesystem.follow_symlinks,
            public_base: public_base.trim_end_matches('/').to_string(),
            link_ttl_secs: storage.link_ttl_secs,
            secret,
        })
    }

    /// Map a document name to a path inside the root.
    ///
    /// Rejects absolute paths, `..` components, and anything that resolves
    /// (through symlinks) outside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LinkError> {
        let relative = Path::new(name);
        if name.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(LinkError::BadPath);
        }
        let path = self
            .root
            .join(relative)
            .canonicalize()
            .map_err(|_| LinkError::BadPath)?;
        if !path.starts_with(&self.root) || !path.is_file() {
            return Err(LinkError::BadPath);
        }
        Ok(path)
    }

    /// Signed URL for `name`, valid until `expires` (unix seconds).
    pub fn signed_url(&self, name: &str, expires: i64) -> Result<String> {
        let sig = self.sign(name, expires)?;
        Ok(format!(
            "{}/files/{}?expires={}&sig={}",
            self.public_base,
            encode_path(name),
            expires,
            sig
        ))
    }

    /// Check a link's signature and expiry against `now` (unix seconds).
    pub fn verify_link(&self, name: &str, expires: i64, sig: &str, now: i64) -> Result<(), LinkError> {
        let provided = hex::decode(sig).map_err(|_| LinkError::BadSignature)?;
        let mut mac = self.mac().map_err(|_| LinkError::BadSignature)?;
        mac.update(signing_payload(name, expires).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| LinkError::BadSignature)?;
        if now > expires {
            return Err(LinkError::Expired);
        }
        Ok(())
    }

    fn sign(&self, name: &str, expires: i64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(signing_payload(name, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| anyhow!("invalid link secret: {e}"))
    }
}

/// Walk `root` and collect every file that passes the glob filters.
fn scan(
    root: &Path,
    include: &GlobSet,
    exclude: &GlobSet,
    follow_symlinks: bool,
) -> Result<Vec<StoredDocument>> {
    let mut docs = Vec::new();
    let walker = WalkDir::new(root).follow_links(follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        docs.push(StoredDocument {
            name: rel_str,
            size,
        });
    }

    // Sort for deterministic ordering
    docs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(docs)
}

#[async_trait]
impl LinkResolver for FsDocumentStore {
    async fn access_url(&self, name: &str) -> Result<String> {
        let expires = Utc::now().timestamp() + self.link_ttl_secs as i64;
        self.signed_url(name, expires)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let root = self.root.clone();
        let include = self.include.clone();
        let exclude = self.exclude.clone();
        let follow = self.follow_symlinks;
        let docs = tokio::task::spawn_blocking(move || scan(&root, &include, &exclude, follow))
            .await
            .context("document scan task failed")??;
        tracing::info!(root = %self.root.display(), documents = docs.len(), "listed local documents");
        Ok(docs)
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>> {
        let path = self
            .resolve(name)
            .map_err(|e| anyhow!("{}: '{}'", e, name))?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn canonical_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.public_base, encode_path(name))
    }
}

fn signing_payload(name: &str, expires: i64) -> String {
    format!("{}\n{}", name, expires)
}

fn ephemeral_secret() -> Vec<u8> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.finalize().to_vec()
}

/// Percent-encode each `/`-separated segment of a document name.
fn encode_path(name: &str) -> String {
    name.split('/')
        .map(|segment| {
            let mut out = String::new();
            for byte in segment.bytes() {
                match byte {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        out.push(byte as char)
                    }
                    _ => out.push_str(&format!("%{:02X}", byte)),
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
