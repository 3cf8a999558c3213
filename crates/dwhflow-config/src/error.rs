use dwhflow_cloud::ProvisionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: dwh.cfg\n\
        - ./.dwhflow/ ディレクトリ\n\
        - ~/.config/dwhflow/dwh.cfg\n\
        または --config オプション / DWHFLOW_CONFIG 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("指定された設定ファイルが存在しません: {}", .0.display())]
    ConfigFileMissing(PathBuf),

    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    Load(#[from] config::ConfigError),

    #[error("必須パラメータが空です: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("[{section}] {key} の値が不正です ('{value}'): {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("設定が不正です: {0}")]
    Invalid(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for ProvisionError {
    fn from(err: ConfigError) -> Self {
        ProvisionError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dwhflow_cloud::ErrorKind;

    #[test]
    fn test_config_error_is_a_configuration_failure() {
        let err: ProvisionError =
            ConfigError::MissingParameters(vec!["[DWH] DWH_DB".to_string()]).into();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("[DWH] DWH_DB"));
    }
}
