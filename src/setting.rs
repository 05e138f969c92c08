use crate::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use payment_gateway::{momo::Credentials, qr};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// number of threads config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Thread {
    /// number of http server threads
    pub http: usize,
}

/// network config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Network {
    /// server bind host
    pub host: String,
    /// server bind port
    pub port: u16,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// MoMo wallet setting, momo payments are disabled if not set.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Momo {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    /// create payment endpoint
    pub endpoint: String,
    /// where the wallet sends the donor back
    pub redirect_url: String,
    /// public url of `POST /momo/ipn`
    pub ipn_url: String,
    /// create request timeout in seconds
    pub timeout: u64,
}

impl Default for Momo {
    fn default() -> Self {
        Self {
            partner_code: "".to_owned(),
            access_key: "".to_owned(),
            secret_key: "".to_owned(),
            endpoint: "https://test-payment.momo.vn/v2/gateway/api/create".to_owned(),
            redirect_url: "".to_owned(),
            ipn_url: "".to_owned(),
            timeout: 30,
        }
    }
}

impl fmt::Debug for Momo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Momo")
            .field("partner_code", &self.partner_code)
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("redirect_url", &self.redirect_url)
            .field("ipn_url", &self.ipn_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&Momo> for Credentials {
    fn from(m: &Momo) -> Self {
        Credentials {
            partner_code: m.partner_code.clone(),
            access_key: m.access_key.clone(),
            secret_key: m.secret_key.clone(),
            endpoint: m.endpoint.clone(),
            redirect_url: m.redirect_url.clone(),
            ipn_url: m.ipn_url.clone(),
        }
    }
}

/// bank transfer qr image setting
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Qr {
    /// image provider host
    pub host: String,
    /// image template, qr_only, compact, compact2, print
    pub template: String,
}

impl Default for Qr {
    fn default() -> Self {
        Self {
            host: qr::DEFAULT_HOST.to_owned(),
            template: qr::DEFAULT_TEMPLATE.to_owned(),
        }
    }
}

/// report config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Report {
    /// utc offset in seconds used to bucket monthly series
    pub utc_offset: i32,
}

/// operator access
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Admin {
    /// bearer token for reconciliation, the endpoint is closed if not set.
    pub token: Option<String>,
}

impl fmt::Debug for Admin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admin")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Setting {
    /// database url
    /// https://www.sea-ql.org/SeaORM/docs/install-and-config/connection/
    pub db_url: String,

    pub thread: Thread,
    pub network: Network,

    pub momo: Option<Momo>,
    pub qr: Qr,
    pub report: Report,
    pub admin: Admin,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            db_url: "sqlite::memory:".to_string(),
            thread: Default::default(),
            network: Default::default(),
            momo: None,
            qr: Default::default(),
            report: Default::default(),
            admin: Default::default(),
        }
    }
}

impl Setting {
    /// read config from file and env
    pub fn read<P: AsRef<Path>>(file: P, env_prefix: Option<String>) -> Result<Self> {
        let path = file
            .as_ref()
            .to_str()
            .ok_or_else(|| Error::Message("invalid config path".to_owned()))?;
        let mut config = Config::builder().add_source(File::with_name(path));
        if let Some(prefix) = env_prefix {
            config = config.add_source(Self::env_source(&prefix));
        }

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn env_source(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .try_parsing(true)
            .prefix_separator("_")
            .separator("__")
    }

    /// read config from env
    pub fn from_env(env_prefix: String) -> Result<Self> {
        let mut config = Config::builder();
        config = config.add_source(Self::env_source(&env_prefix));

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    /// config from str
    pub fn from_str(s: &str, format: FileFormat) -> Result<Self> {
        let builder = Config::builder();
        let config = builder.add_source(File::from_str(s, format)).build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn validate(&mut self) -> Result<()> {
        if let Some(momo) = &self.momo {
            if momo.partner_code.is_empty()
                || momo.access_key.is_empty()
                || momo.secret_key.is_empty()
                || momo.endpoint.is_empty()
            {
                return Err(Error::Str(
                    "momo needs partner_code, access_key, secret_key and endpoint",
                ));
            }
        }
        if self.report.utc_offset.abs() > 14 * 3600 {
            return Err(Error::Str("report.utc_offset must be within 14 hours"));
        }
        if self.admin.token.as_deref() == Some("") {
            self.admin.token = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use config::FileFormat;
    use std::fs;
    use tempfile::Builder;

    #[test]
    fn der() -> Result<()> {
        let json = r#"{
            "network": {"port": 1},
            "thread": {"http": 1},
            "momo": {
                "partner_code": "MOMOTEST",
                "access_key": "ak",
                "secret_key": "sk",
                "ipn_url": "https://fund.example/momo/ipn"
            },
            "report": {"utc_offset": 25200}
        }"#;

        let mut def = Setting::default();
        def.network.port = 1;
        def.thread.http = 1;
        def.report.utc_offset = 25200;
        def.momo = Some(Momo {
            partner_code: "MOMOTEST".to_owned(),
            access_key: "ak".to_owned(),
            secret_key: "sk".to_owned(),
            ipn_url: "https://fund.example/momo/ipn".to_owned(),
            ..Default::default()
        });

        let s2 = serde_json::from_str::<Setting>(json)?;
        let s1: Setting = Setting::from_str(json, FileFormat::Json)?;

        assert_eq!(def, s1);
        assert_eq!(def, s2);
        assert_eq!(s1.qr.host, "img.vietqr.io");
        assert_eq!(s1.momo.as_ref().map(|m| m.timeout), Some(30));

        Ok(())
    }

    #[test]
    fn invalid() {
        let json = r#"{"momo": {"partner_code": "MOMOTEST"}}"#;
        assert!(Setting::from_str(json, FileFormat::Json).is_err());
        let json = r#"{"report": {"utc_offset": 90000}}"#;
        assert!(Setting::from_str(json, FileFormat::Json).is_err());
    }

    #[test]
    fn secrets_are_not_logged() -> Result<()> {
        let json = r#"{
            "momo": {"partner_code": "P", "access_key": "ak", "secret_key": "very-secret"},
            "admin": {"token": "admin-token"}
        }"#;
        let setting = Setting::from_str(json, FileFormat::Json)?;
        let s = format!("{:?}", setting);
        assert!(!s.contains("very-secret"));
        assert!(!s.contains("admin-token"));
        Ok(())
    }

    #[test]
    fn read() -> Result<()> {
        let setting = Setting::default();
        assert_eq!(setting.network.host, "127.0.0.1");

        let file = Builder::new()
            .prefix("fundbox-config-test-read")
            .suffix(".toml")
            .rand_bytes(0)
            .tempfile()?;

        let setting = Setting::read(&file, None)?;
        assert_eq!(setting.network.host, "127.0.0.1");
        fs::write(
            &file,
            r#"
        [network]
        host = "127.0.0.2"

        [qr]
        template = "compact2"
        "#,
        )?;

        temp_env::with_vars(
            [
                ("FT_network.port", Some("1")),
                ("FT_network__host", Some("127.0.0.3")),
                ("FT_admin__token", Some("t0ken")),
            ],
            || {
                let setting = Setting::read(&file, Some("FT".to_owned())).unwrap();
                assert_eq!(setting.network.host, "127.0.0.3".to_string());
                assert_eq!(setting.network.port, 1);
                assert_eq!(setting.qr.template, "compact2");
                assert_eq!(setting.admin.token.as_deref(), Some("t0ken"));
            },
        );
        Ok(())
    }
}
