//! dwh.cfg の読み込みと検証
//!
//! INI 形式の設定ファイルを `config` クレートで読み込み、
//! `DWHFLOW__<SECTION>__<KEY>` 形式の環境変数で上書きする。
//! セクション名とキー名は大文字小文字を区別しない。

use crate::error::{ConfigError, Result};
use config::Source;
use dwhflow_cloud::{
    AccessRole, ClusterSpec, ClusterType, EnvironmentSpec, S3_READ_ONLY_POLICY_ARN,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 環境変数による上書きのプレフィックス
pub const ENV_PREFIX: &str = "DWHFLOW";

/// 環境変数の区切り文字 (DWHFLOW__DWH__DWH_PORT)
pub const ENV_SEPARATOR: &str = "__";

const DEFAULT_INGRESS_CIDR: &str = "0.0.0.0/0";
const MASK: &str = "********";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AwsSection {
    key: String,
    secret: String,
    region_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DwhSection {
    dwh_cluster_type: String,
    dwh_num_nodes: String,
    dwh_node_type: String,
    dwh_cluster_identifier: String,
    dwh_db: String,
    dwh_db_user: String,
    dwh_db_password: String,
    dwh_port: String,
    dwh_iam_role_name: String,
    dwh_endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct IamRoleSection {
    arn: String,
    policy_arn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct NetworkSection {
    ingress_cidr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    aws: AwsSection,
    dwh: DwhSection,
    iam_role: IamRoleSection,
    network: NetworkSection,
}

/// 値が空のパラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyParameter {
    pub section: &'static str,
    pub key: &'static str,
}

impl std::fmt::Display for EmptyParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.key)
    }
}

/// AWS 接続情報
///
/// キーとシークレットが両方とも空の場合は `None` となり、
/// デフォルトの認証チェーンが使われる。
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub region: String,
    pub static_keys: Option<(String, String)>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("region", &self.region)
            .field(
                "static_keys",
                &self.static_keys.as_ref().map(|(key, _)| (key.as_str(), MASK)),
            )
            .finish()
    }
}

/// 読み込み済みの設定
#[derive(Clone)]
pub struct Settings {
    raw: RawSettings,
    source: PathBuf,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("source", &self.source)
            .field("parameters", &self.parameters())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// 設定ファイルを読み込む (環境変数による上書きを含む)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::ConfigFileMissing(path.to_path_buf()));
        }

        let file = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Ini))
            .build()?;
        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR),
            )
            .build()?;

        // 環境変数はファイルの値より優先
        let mut sections = Sections::new();
        merge_sections(file, &mut sections)?;
        merge_sections(env, &mut sections)?;
        let raw: RawSettings = config::Config::try_from(&sections)?.try_deserialize()?;

        Ok(Self {
            raw,
            source: path.to_path_buf(),
        })
    }

    /// 設定ファイルを探して読み込む
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let path = crate::find_config_file(explicit)?;
        Self::load(&path)
    }

    /// 読み込んだ設定ファイルのパス
    pub fn source(&self) -> &Path {
        &self.source
    }

    fn fields(&self) -> Vec<(&'static str, &'static str, &str)> {
        let aws = &self.raw.aws;
        let dwh = &self.raw.dwh;
        let iam = &self.raw.iam_role;
        vec![
            ("AWS", "KEY", aws.key.as_str()),
            ("AWS", "SECRET", aws.secret.as_str()),
            ("AWS", "REGION_NAME", aws.region_name.as_str()),
            ("DWH", "DWH_CLUSTER_TYPE", dwh.dwh_cluster_type.as_str()),
            ("DWH", "DWH_NUM_NODES", dwh.dwh_num_nodes.as_str()),
            ("DWH", "DWH_NODE_TYPE", dwh.dwh_node_type.as_str()),
            ("DWH", "DWH_CLUSTER_IDENTIFIER", dwh.dwh_cluster_identifier.as_str()),
            ("DWH", "DWH_DB", dwh.dwh_db.as_str()),
            ("DWH", "DWH_DB_USER", dwh.dwh_db_user.as_str()),
            ("DWH", "DWH_DB_PASSWORD", dwh.dwh_db_password.as_str()),
            ("DWH", "DWH_PORT", dwh.dwh_port.as_str()),
            ("DWH", "DWH_IAM_ROLE_NAME", dwh.dwh_iam_role_name.as_str()),
            ("DWH", "DWH_ENDPOINT", dwh.dwh_endpoint.as_str()),
            ("IAM_ROLE", "ARN", iam.arn.as_str()),
            ("IAM_ROLE", "POLICY_ARN", iam.policy_arn.as_str()),
        ]
    }

    /// 値が空のパラメータ一覧
    ///
    /// DWH_ENDPOINT と ARN はプロビジョニングで判明する値、
    /// POLICY_ARN はデフォルト値があるため対象外。
    pub fn empty_parameters(&self) -> Vec<EmptyParameter> {
        self.fields()
            .into_iter()
            .filter(|(_, key, _)| !matches!(*key, "DWH_ENDPOINT" | "ARN" | "POLICY_ARN"))
            .filter(|(_, _, value)| value.trim().is_empty())
            .map(|(section, key, _)| EmptyParameter { section, key })
            .collect()
    }

    /// 空のパラメータを含むセクション名
    pub fn empty_sections(&self) -> Vec<&'static str> {
        let mut sections: Vec<&'static str> = Vec::new();
        for param in self.empty_parameters() {
            if !sections.contains(&param.section) {
                sections.push(param.section);
            }
        }
        sections
    }

    /// クラスタパラメータの一覧 (パスワードはマスク)
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        self.fields()
            .into_iter()
            .filter(|(section, key, _)| *section == "DWH" && *key != "DWH_ENDPOINT")
            .map(|(_, key, value)| {
                let shown = if key == "DWH_DB_PASSWORD" && !value.is_empty() {
                    MASK.to_string()
                } else {
                    value.to_string()
                };
                (key, shown)
            })
            .collect()
    }

    /// AWS 接続情報を取り出す
    pub fn aws(&self) -> Result<AwsCredentials> {
        let aws = &self.raw.aws;
        let region = aws.region_name.trim();
        if region.is_empty() {
            return Err(ConfigError::MissingParameters(vec![
                "[AWS] REGION_NAME".to_string(),
            ]));
        }

        let key = aws.key.trim();
        let secret = aws.secret.trim();
        let static_keys = match (key.is_empty(), secret.is_empty()) {
            (true, true) => None,
            (false, false) => Some((key.to_string(), secret.to_string())),
            (false, true) => {
                return Err(ConfigError::MissingParameters(vec!["[AWS] SECRET".to_string()]));
            }
            (true, false) => {
                return Err(ConfigError::MissingParameters(vec!["[AWS] KEY".to_string()]));
            }
        };

        Ok(AwsCredentials {
            region: region.to_string(),
            static_keys,
        })
    }

    /// プロビジョニング対象の環境定義に変換する
    pub fn environment(&self) -> Result<EnvironmentSpec> {
        let missing: Vec<String> = self
            .empty_parameters()
            .into_iter()
            .filter(|param| param.section == "DWH")
            .map(|param| param.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingParameters(missing));
        }

        let dwh = &self.raw.dwh;

        let cluster_type: ClusterType =
            dwh.dwh_cluster_type
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    section: "DWH",
                    key: "DWH_CLUSTER_TYPE",
                    value: dwh.dwh_cluster_type.clone(),
                    reason: "single-node または multi-node を指定してください".to_string(),
                })?;

        let node_count: u32 = dwh
            .dwh_num_nodes
            .trim()
            .parse()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ConfigError::InvalidValue {
                section: "DWH",
                key: "DWH_NUM_NODES",
                value: dwh.dwh_num_nodes.clone(),
                reason: "1 以上の整数を指定してください".to_string(),
            })?;

        let port: u16 = dwh
            .dwh_port
            .trim()
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                section: "DWH",
                key: "DWH_PORT",
                value: dwh.dwh_port.clone(),
                reason: "1 から 65535 のポート番号を指定してください".to_string(),
            })?;

        let policy_arn =
            non_empty(&self.raw.iam_role.policy_arn).unwrap_or(S3_READ_ONLY_POLICY_ARN);
        let ingress_cidr =
            non_empty(&self.raw.network.ingress_cidr).unwrap_or(DEFAULT_INGRESS_CIDR);

        let environment = EnvironmentSpec {
            role: AccessRole::for_redshift(dwh.dwh_iam_role_name.trim()).with_policy(policy_arn),
            cluster: ClusterSpec {
                identifier: dwh.dwh_cluster_identifier.trim().to_string(),
                cluster_type,
                node_type: dwh.dwh_node_type.trim().to_string(),
                node_count,
                db_name: dwh.dwh_db.trim().to_string(),
                master_username: dwh.dwh_db_user.trim().to_string(),
                master_password: dwh.dwh_db_password.clone(),
                port,
            },
            ingress_cidr: ingress_cidr.to_string(),
        };

        environment
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(environment)
    }
}

/// セクション名 → キー名 → 値 (いずれも小文字に正規化)
type Sections = BTreeMap<String, BTreeMap<String, String>>;

fn merge_sections(source: config::Config, sections: &mut Sections) -> Result<()> {
    for (section, value) in source.collect()? {
        // セクションに属さない値は無視
        let Ok(table) = value.into_table() else {
            continue;
        };
        let entries = sections.entry(section.to_lowercase()).or_default();
        for (key, value) in table {
            if let Ok(value) = value.into_string() {
                entries.insert(key.to_lowercase(), value);
            }
        }
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SAMPLE: &str = "\
[AWS]
KEY = AKIAEXAMPLE
SECRET = examplesecret
REGION_NAME = us-west-2

[DWH]
DWH_CLUSTER_TYPE = multi-node
DWH_NUM_NODES = 4
DWH_NODE_TYPE = dc2.large
DWH_CLUSTER_IDENTIFIER = dwhCluster
DWH_DB = dwh
DWH_DB_USER = dwhuser
DWH_DB_PASSWORD = Passw0rd
DWH_PORT = 5439
DWH_IAM_ROLE_NAME = dwhRole
DWH_ENDPOINT =

[IAM_ROLE]
ARN =
";

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dwh.cfg");
        fs::write(&path, content).unwrap();
        (temp_dir, path)
    }

    #[test]
    #[serial]
    fn test_load_full_configuration() {
        let (_dir, path) = write_config(SAMPLE);
        let settings = Settings::load(&path).unwrap();

        assert_eq!(settings.source(), path.as_path());
        assert!(settings.empty_parameters().is_empty());
        assert!(settings.empty_sections().is_empty());

        let env = settings.environment().unwrap();
        assert_eq!(env.role.name, "dwhRole");
        assert_eq!(env.role.policy_arn, S3_READ_ONLY_POLICY_ARN);
        assert_eq!(env.cluster.identifier, "dwhCluster");
        assert_eq!(env.cluster.cluster_type, ClusterType::MultiNode);
        assert_eq!(env.cluster.node_count, 4);
        assert_eq!(env.cluster.node_type, "dc2.large");
        assert_eq!(env.cluster.db_name, "dwh");
        assert_eq!(env.cluster.master_username, "dwhuser");
        assert_eq!(env.cluster.master_password, "Passw0rd");
        assert_eq!(env.cluster.port, 5439);
        assert_eq!(env.ingress_cidr, "0.0.0.0/0");

        let aws = settings.aws().unwrap();
        assert_eq!(aws.region, "us-west-2");
        assert_eq!(
            aws.static_keys,
            Some(("AKIAEXAMPLE".to_string(), "examplesecret".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_empty_parameters_are_reported_by_section() {
        let content = SAMPLE
            .replace("DWH_DB = dwh", "DWH_DB =")
            .replace("KEY = AKIAEXAMPLE", "KEY =")
            .replace("SECRET = examplesecret", "SECRET =");
        let (_dir, path) = write_config(&content);
        let settings = Settings::load(&path).unwrap();

        let empty: Vec<String> = settings
            .empty_parameters()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(empty, vec!["[AWS] KEY", "[AWS] SECRET", "[DWH] DWH_DB"]);
        assert_eq!(settings.empty_sections(), vec!["AWS", "DWH"]);

        match settings.environment() {
            Err(ConfigError::MissingParameters(missing)) => {
                assert_eq!(missing, vec!["[DWH] DWH_DB".to_string()]);
            }
            other => panic!("expected MissingParameters, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_missing_keys_fall_back_to_default_chain() {
        let content = SAMPLE
            .replace("KEY = AKIAEXAMPLE", "KEY =")
            .replace("SECRET = examplesecret", "SECRET =");
        let (_dir, path) = write_config(&content);
        let aws = Settings::load(&path).unwrap().aws().unwrap();

        assert_eq!(aws.static_keys, None);
    }

    #[test]
    #[serial]
    fn test_half_credentials_are_rejected() {
        let content = SAMPLE.replace("SECRET = examplesecret", "SECRET =");
        let (_dir, path) = write_config(&content);

        match Settings::load(&path).unwrap().aws() {
            Err(ConfigError::MissingParameters(missing)) => {
                assert_eq!(missing, vec!["[AWS] SECRET".to_string()]);
            }
            other => panic!("expected MissingParameters, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_environment_variable_overrides_file() {
        let (_dir, path) = write_config(SAMPLE);

        let settings = temp_env::with_vars(
            [
                ("DWHFLOW__DWH__DWH_NUM_NODES", Some("2")),
                ("DWHFLOW__NETWORK__INGRESS_CIDR", Some("10.0.0.0/16")),
            ],
            || Settings::load(&path).unwrap(),
        );

        let env = settings.environment().unwrap();
        assert_eq!(env.cluster.node_count, 2);
        assert_eq!(env.ingress_cidr, "10.0.0.0/16");
    }

    #[test]
    #[serial]
    fn test_environment_override_accepts_any_case() {
        let (_dir, path) = write_config(SAMPLE);

        let settings = temp_env::with_vars(
            [
                ("DWHFLOW__dwh__dwh_db_user", Some("analyst")),
                ("DWHFLOW__DWH__DWH_PORT", Some("5440")),
                ("DWHFLOW__UNRELATED", Some("ignored")),
            ],
            || Settings::load(&path).unwrap(),
        );

        let env = settings.environment().unwrap();
        assert_eq!(env.cluster.master_username, "analyst");
        assert_eq!(env.cluster.port, 5440);
        assert_eq!(env.cluster.node_count, 4);
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        let content = SAMPLE.replace("DWH_PORT = 5439", "DWH_PORT = redshift");
        let (_dir, path) = write_config(&content);

        match Settings::load(&path).unwrap().environment() {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "DWH_PORT");
                assert_eq!(value, "redshift");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_unknown_cluster_type_is_rejected() {
        let content = SAMPLE.replace("multi-node", "tiny");
        let (_dir, path) = write_config(&content);

        let err = Settings::load(&path).unwrap().environment().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "DWH_CLUSTER_TYPE",
                ..
            }
        ));
    }

    #[test]
    #[serial]
    fn test_single_node_multi_node_mismatch_is_rejected() {
        let content = SAMPLE.replace("DWH_NUM_NODES = 4", "DWH_NUM_NODES = 1");
        let (_dir, path) = write_config(&content);

        let err = Settings::load(&path).unwrap().environment().unwrap_err();
        assert!(err.to_string().contains("at least 2 nodes"));
    }

    #[test]
    #[serial]
    fn test_parameters_mask_password() {
        let (_dir, path) = write_config(SAMPLE);
        let params = Settings::load(&path).unwrap().parameters();

        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "DWH_CLUSTER_TYPE",
                "DWH_NUM_NODES",
                "DWH_NODE_TYPE",
                "DWH_CLUSTER_IDENTIFIER",
                "DWH_DB",
                "DWH_DB_USER",
                "DWH_DB_PASSWORD",
                "DWH_PORT",
                "DWH_IAM_ROLE_NAME",
            ]
        );
        let password = params.iter().find(|(k, _)| *k == "DWH_DB_PASSWORD").unwrap();
        assert_eq!(password.1, "********");
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&temp_dir.path().join("dwh.cfg"));
        assert!(matches!(result, Err(ConfigError::ConfigFileMissing(_))));
    }

    #[test]
    fn test_credentials_debug_masks_secret() {
        let aws = AwsCredentials {
            region: "us-west-2".to_string(),
            static_keys: Some(("AKIAEXAMPLE".to_string(), "topsecret".to_string())),
        };
        let debug = format!("{:?}", aws);
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("AKIAEXAMPLE"));
    }
}
