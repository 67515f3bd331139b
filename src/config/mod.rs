// dbvault/src/config/mod.rs
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use url::Url;

use crate::errors::{AppError, Result};
use crate::policy::{Periodicity, RetentionPolicy};

const DEFAULT_DB_HOSTNAME: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_SCHEMA: &str = "public";
const DEFAULT_S3_ENDPOINT: &str = "https://storage.yandexcloud.net";
const DEFAULT_S3_REGION: &str = "ru-central1";
const DEFAULT_TIME_ZONE: &str = "Europe/Moscow";

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub schema: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_base: String,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub periodicity: Periodicity,
    pub time_zone: Tz,
    pub work_dir: PathBuf,
    pub policy: RetentionPolicy,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub public_key_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub private_key_file: PathBuf,
}

/// Reads variables through a lookup function and collects every missing
/// required one, so they can be reported together.
struct EnvReader<F> {
    lookup: F,
    missing: Vec<&'static str>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        EnvReader {
            lookup,
            missing: Vec::new(),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &'static str) -> String {
        self.optional(key).unwrap_or_else(|| {
            self.missing.push(key);
            String::new()
        })
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn finish(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(format!(
                "missing required environment variables: {}",
                self.missing.join(", ")
            )))
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}

/// Raw values from the first pass. Nothing is parsed until every required
/// variable, including the per-operation ones, is known to be present.
struct RawAppConfig {
    host: String,
    port: Option<String>,
    name: String,
    user: String,
    password: String,
    schema: String,
    bucket_base: String,
    access_key_id: String,
    secret_access_key: String,
    endpoint_url: String,
    region: String,
    force_path_style: Option<String>,
    periodicity: String,
    time_zone: String,
    work_dir: Option<String>,
    policy_file: Option<String>,
}

impl RawAppConfig {
    fn read<F>(env: &mut EnvReader<F>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        RawAppConfig {
            host: env.or_default("DB_HOSTNAME", DEFAULT_DB_HOSTNAME),
            port: env.optional("DB_PORT"),
            name: env.required("DB_NAME"),
            user: env.required("DB_USER"),
            password: env.required("DB_PASSWORD"),
            schema: env.or_default("DB_SCHEMA", DEFAULT_DB_SCHEMA),
            bucket_base: env.required("S3_BUCKET_NAME"),
            access_key_id: env.required("ACCESS_KEY"),
            secret_access_key: env.required("SECRET_KEY"),
            endpoint_url: env.or_default("S3_ENDPOINT_URL", DEFAULT_S3_ENDPOINT),
            region: env.or_default("S3_REGION", DEFAULT_S3_REGION),
            force_path_style: env.optional("S3_FORCE_PATH_STYLE"),
            periodicity: env.required("PERIODICITY"),
            time_zone: env.or_default("TIME_ZONE", DEFAULT_TIME_ZONE),
            work_dir: env.optional("WORK_DIR"),
            policy_file: env.optional("RETENTION_POLICY_FILE"),
        }
    }

    fn resolve(self) -> Result<AppConfig> {
        let port = match self.port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("DB_PORT must be a port number, got '{}'", p)))?,
            None => DEFAULT_DB_PORT,
        };
        let endpoint_url = self.endpoint_url;
        Url::parse(&endpoint_url).map_err(|e| {
            AppError::Config(format!("S3_ENDPOINT_URL '{}' is not a valid URL: {}", endpoint_url, e))
        })?;
        let force_path_style = match self.force_path_style {
            Some(v) => parse_bool("S3_FORCE_PATH_STYLE", &v)?,
            None => false,
        };
        let time_zone = self.time_zone.parse::<Tz>().map_err(|e| {
            AppError::Config(format!("TIME_ZONE '{}' is not known: {}", self.time_zone, e))
        })?;
        let policy = match self.policy_file {
            Some(path) => RetentionPolicy::load(Path::new(&path))?,
            None => RetentionPolicy::default(),
        };

        Ok(AppConfig {
            database: DatabaseConfig {
                host: self.host,
                port,
                name: self.name,
                user: self.user,
                password: self.password,
                schema: self.schema,
            },
            storage: StorageConfig {
                endpoint_url,
                region: self.region,
                access_key_id: self.access_key_id,
                secret_access_key: self.secret_access_key,
                bucket_base: self.bucket_base,
                force_path_style,
            },
            periodicity: self.periodicity.parse()?,
            time_zone,
            work_dir: self.work_dir.map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
            policy,
        })
    }
}

impl AppConfig {
    /// Shared settings only, without any key file variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader::new(lookup);
        let raw = RawAppConfig::read(&mut env);
        env.finish()?;
        raw.resolve()
    }
}

/// Shared settings plus `BACKUP_KEY_PUB_FILE`, with every missing variable
/// reported in one error.
pub fn load_backup_config<F>(lookup: F) -> Result<(AppConfig, BackupConfig)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvReader::new(lookup);
    let raw = RawAppConfig::read(&mut env);
    let public_key_file = env.required("BACKUP_KEY_PUB_FILE");
    env.finish()?;
    let backup = BackupConfig {
        public_key_file: PathBuf::from(public_key_file),
    };
    Ok((raw.resolve()?, backup))
}

/// Shared settings plus `BACKUP_KEY_PRIVATE_FILE`.
pub fn load_restore_config<F>(lookup: F) -> Result<(AppConfig, RestoreConfig)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvReader::new(lookup);
    let raw = RawAppConfig::read(&mut env);
    let private_key_file = env.required("BACKUP_KEY_PRIVATE_FILE");
    env.finish()?;
    let restore = RestoreConfig {
        private_key_file: PathBuf::from(private_key_file),
    };
    Ok((raw.resolve()?, restore))
}

/// Fails with a configuration error unless `path` is a file this process
/// can open for reading.
pub fn ensure_key_file(path: &Path, description: &str) -> Result<()> {
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "{} ({}) not found. Generate the key pair first, e.g. with \
             `openssl req -x509 -nodes -newkey rsa:4096 -keyout backup_key.pem -out backup_key.pem.pub`.",
            description,
            path.display()
        )));
    }
    File::open(path).map(drop).map_err(|e| {
        AppError::Config(format!(
            "{} ({}) is not readable: {}",
            description,
            path.display(),
            e
        ))
    })
}
