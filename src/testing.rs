// dbvault/src/testing.rs
//! In-memory stand-ins for object storage, external tools and the database.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::artifact::create_private;
use crate::config::{AppConfig, DatabaseConfig, StorageConfig};
use crate::errors::{AppError, Result};
use crate::policy::{Periodicity, RetentionPolicy};
use crate::restore::db_restore::{DatabaseConnector, SchemaAdmin};
use crate::storage::{BackupRecord, ObjectStore};
use crate::tools::{CommandRunner, Invocation, ToolOutput};

pub const CIPHER_MARK: &[u8] = b"ENC:";

pub fn app_config(work_dir: &Path, periodicity: Periodicity) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            host: "db.internal".into(),
            port: 5432,
            name: "shop".into(),
            user: "backup".into(),
            password: "secret".into(),
            schema: "public".into(),
        },
        storage: StorageConfig {
            endpoint_url: "https://storage.example.net".into(),
            region: "ru-central1".into(),
            access_key_id: "AKIA".into(),
            secret_access_key: "shh".into(),
            bucket_base: "shop-backups".into(),
            force_path_style: false,
        },
        periodicity,
        time_zone: chrono_tz::Tz::UTC,
        work_dir: work_dir.to_path_buf(),
        policy: RetentionPolicy::default(),
    }
}

/// Files left behind in `dir`, sorted.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Permission bits of `path`.
#[cfg(unix)]
pub fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
}

/// Bytes the fake `openssl smime -encrypt` produces for a gzip payload.
pub fn fake_ciphertext(plain_sql: &str) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(plain_sql.as_bytes()).unwrap();
    let mut out = CIPHER_MARK.to_vec();
    out.extend(encoder.finish().unwrap());
    out
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), (BackupRecord, Vec<u8>)>>,
    clock: Mutex<Option<DateTime<Utc>>>,
    pub list_calls: AtomicUsize,
    pub downloads: AtomicUsize,
    pub delete_batches: Mutex<Vec<Vec<String>>>,
    pub fail_operation: Option<&'static str>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(operation: &'static str) -> Self {
        MemoryStore {
            fail_operation: Some(operation),
            ..Self::default()
        }
    }

    /// Timestamp assigned to uploaded objects.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = Some(now);
    }

    pub fn seed(&self, namespace: &str, key: &str, last_modified: DateTime<Utc>, bytes: &[u8]) {
        let record = BackupRecord {
            key: key.to_string(),
            last_modified,
            size: bytes.len() as u64,
        };
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), key.to_string()), (record, bytes.to_vec()));
    }

    pub fn keys(&self, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn bytes(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), key.to_string()))
            .map(|(_, bytes)| bytes.clone())
    }

    fn check(&self, operation: &'static str, namespace: &str) -> Result<()> {
        if self.fail_operation == Some(operation) {
            return Err(AppError::Storage {
                operation,
                namespace: namespace.to_string(),
                message: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, namespace: &str) -> Result<Vec<BackupRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check("list", namespace)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, (record, _))| record.clone())
            .collect())
    }

    async fn upload(&self, namespace: &str, local_path: &Path, key: &str) -> Result<()> {
        self.check("upload", namespace)?;
        let bytes = fs::read(local_path).map_err(|e| AppError::io(local_path, e))?;
        let now = self.clock.lock().unwrap().unwrap_or_else(Utc::now);
        self.seed(namespace, key, now, &bytes);
        Ok(())
    }

    async fn download(&self, namespace: &str, key: &str, local_path: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check("download", namespace)?;
        let bytes = self.bytes(namespace, key).ok_or_else(|| AppError::Storage {
            operation: "download",
            namespace: namespace.to_string(),
            message: format!("NoSuchKey: {}", key),
        })?;
        let mut file = create_private(local_path)?;
        file.write_all(&bytes).map_err(|e| AppError::io(local_path, e))
    }

    async fn delete_many(&self, namespace: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.check("delete", namespace)?;
        self.delete_batches.lock().unwrap().push(keys.to_vec());
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(&(namespace.to_string(), key.clone()));
        }
        Ok(())
    }
}

/// Emulates the file effects of pg_dump, openssl smime and psql.
///
/// "Encryption" prefixes [`CIPHER_MARK`]; decryption fails with status 4 when
/// the mark is absent.
#[derive(Default)]
pub struct ScriptedRunner {
    pub dump_sql: String,
    /// Step name (`pg_dump`, `encrypt`, `decrypt`, `psql`) and its exit code.
    pub fail: Option<(&'static str, i32)>,
    pub invocations: Mutex<Vec<Invocation>>,
    pub loaded_scripts: Mutex<Vec<String>>,
    /// Mode of each output file as the tool found it, before writing.
    pub output_modes: Mutex<Vec<(PathBuf, u32)>>,
}

impl ScriptedRunner {
    pub fn dumping(sql: &str) -> Self {
        ScriptedRunner {
            dump_sql: sql.to_string(),
            ..Self::default()
        }
    }

    pub fn failing(step: &'static str, status: i32) -> Self {
        ScriptedRunner {
            dump_sql: "SELECT 1;".to_string(),
            fail: Some((step, status)),
            ..Self::default()
        }
    }

    pub fn steps(&self) -> Vec<&'static str> {
        self.invocations.lock().unwrap().iter().map(step_name).collect()
    }

    fn output(&self, invocation: &Invocation, flag: &str) -> io::Result<PathBuf> {
        let path = required_path(invocation, flag)?;
        #[cfg(unix)]
        if let Some(mode) = file_mode(&path) {
            self.output_modes.lock().unwrap().push((path.clone(), mode));
        }
        Ok(path)
    }
}

fn step_name(invocation: &Invocation) -> &'static str {
    match invocation.program.as_str() {
        "pg_dump" => "pg_dump",
        "psql" => "psql",
        "openssl" if invocation.args.iter().any(|a| a == "-encrypt") => "encrypt",
        "openssl" if invocation.args.iter().any(|a| a == "-decrypt") => "decrypt",
        _ => "unknown",
    }
}

fn exited(status: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        status: Some(status),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn required_path(invocation: &Invocation, flag: &str) -> io::Result<PathBuf> {
    invocation
        .flag_value(flag)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("missing {}", flag)))
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let step = step_name(invocation);
        if let Some((failing, status)) = self.fail {
            if failing == step {
                return Ok(exited(status, &format!("{}: simulated failure", step)));
            }
        }

        match step {
            "pg_dump" => fs::write(self.output(invocation, "-f")?, &self.dump_sql)?,
            "encrypt" => {
                let plain = fs::read(required_path(invocation, "-in")?)?;
                let mut cipher = CIPHER_MARK.to_vec();
                cipher.extend(plain);
                fs::write(self.output(invocation, "-out")?, cipher)?;
            }
            "decrypt" => {
                let cipher = fs::read(required_path(invocation, "-in")?)?;
                let Some(plain) = cipher.strip_prefix(CIPHER_MARK) else {
                    return Ok(exited(4, "Error decrypting PKCS#7 structure"));
                };
                fs::write(self.output(invocation, "-out")?, plain)?;
            }
            "psql" => {
                let script = fs::read_to_string(required_path(invocation, "-f")?)?;
                self.loaded_scripts.lock().unwrap().push(script);
            }
            _ => return Ok(exited(127, "command not found")),
        }
        Ok(exited(0, ""))
    }
}

#[derive(Default)]
pub struct FakeDbState {
    pub tables: Vec<String>,
    pub connects: AtomicUsize,
    pub transactions: Mutex<Vec<Vec<String>>>,
    pub fail_transaction: bool,
}

#[derive(Clone, Default)]
pub struct FakeDatabase {
    pub state: Arc<FakeDbState>,
}

impl FakeDatabase {
    pub fn with_tables(tables: &[&str]) -> Self {
        FakeDatabase {
            state: Arc::new(FakeDbState {
                tables: tables.iter().map(|t| t.to_string()).collect(),
                ..FakeDbState::default()
            }),
        }
    }

    /// Tables are listed but the wipe transaction is rejected.
    pub fn rejecting_wipe(tables: &[&str]) -> Self {
        FakeDatabase {
            state: Arc::new(FakeDbState {
                tables: tables.iter().map(|t| t.to_string()).collect(),
                fail_transaction: true,
                ..FakeDbState::default()
            }),
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn transactions(&self) -> Vec<Vec<String>> {
        self.state.transactions.lock().unwrap().clone()
    }
}

pub struct FakeAdmin {
    state: Arc<FakeDbState>,
}

#[async_trait]
impl DatabaseConnector for FakeDatabase {
    type Admin = FakeAdmin;

    async fn connect(&self) -> Result<FakeAdmin> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeAdmin {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl SchemaAdmin for FakeAdmin {
    async fn user_tables(&mut self, _schema: &str) -> Result<Vec<String>> {
        Ok(self.state.tables.clone())
    }

    async fn run_in_transaction(&mut self, statements: &[String]) -> Result<()> {
        if self.state.fail_transaction {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.state
            .transactions
            .lock()
            .unwrap()
            .push(statements.to_vec());
        Ok(())
    }
}
