pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{AwsCredentials, EmptyParameter, Settings};

use std::path::{Path, PathBuf};

/// 設定ファイル名
pub const CONFIG_FILE_NAME: &str = "dwh.cfg";

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "DWHFLOW_CONFIG";

/// グローバル設定ファイルのパス (~/.config/dwhflow/dwh.cfg)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dwhflow").join(CONFIG_FILE_NAME))
}

/// dwh.cfg を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 引数で直接指定されたパス (--config)
/// 2. 環境変数 DWHFLOW_CONFIG
/// 3. カレントディレクトリ: dwh.cfg
/// 4. ./.dwhflow/ ディレクトリ内: dwh.cfg
/// 5. ~/.config/dwhflow/dwh.cfg (グローバル設定)
///
/// 明示的に指定されたパスが存在しない場合は他の候補に進まずエラーを返す。
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    // 1. 引数で直接指定
    if let Some(path) = explicit {
        return existing(path.to_path_buf());
    }

    // 2. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV)
        && !config_path.is_empty()
    {
        return existing(PathBuf::from(config_path));
    }

    let current_dir = std::env::current_dir()?;

    // 3. カレントディレクトリ
    let path = current_dir.join(CONFIG_FILE_NAME);
    if path.is_file() {
        return Ok(path);
    }

    // 4. ./.dwhflow/ ディレクトリ
    let path = current_dir.join(".dwhflow").join(CONFIG_FILE_NAME);
    if path.is_file() {
        return Ok(path);
    }

    // 5. グローバル設定
    if let Some(global_config) = global_config_path()
        && global_config.is_file()
    {
        return Ok(global_config);
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::ConfigFileMissing(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("dwh.cfg"), "[AWS]\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_config_file(None));

        std::env::set_current_dir(original_dir).unwrap();

        let config_file = result.unwrap();
        assert!(config_file.ends_with("dwh.cfg"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_dwhflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let dwhflow_dir = temp_dir.path().join(".dwhflow");
        fs::create_dir(&dwhflow_dir).unwrap();
        fs::write(dwhflow_dir.join("dwh.cfg"), "[AWS]\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_config_file(None));

        std::env::set_current_dir(original_dir).unwrap();

        let config_file = result.unwrap();
        assert!(config_file.ends_with(".dwhflow/dwh.cfg"));
    }

    #[test]
    #[serial]
    fn test_current_dir_takes_priority_over_dwhflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let dwhflow_dir = temp_dir.path().join(".dwhflow");
        fs::create_dir(&dwhflow_dir).unwrap();
        fs::write(dwhflow_dir.join("dwh.cfg"), "# nested").unwrap();
        fs::write(temp_dir.path().join("dwh.cfg"), "# top").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_config_file(None));

        std::env::set_current_dir(original_dir).unwrap();

        let content = fs::read_to_string(result.unwrap()).unwrap();
        assert_eq!(content, "# top");
    }

    #[test]
    #[serial]
    fn test_find_config_file_from_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.cfg");
        fs::write(&custom, "[AWS]\n").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(custom.as_os_str()), || {
            find_config_file(None)
        });

        assert_eq!(result.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins_over_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let from_env = temp_dir.path().join("env.cfg");
        let explicit = temp_dir.path().join("explicit.cfg");
        fs::write(&from_env, "").unwrap();
        fs::write(&explicit, "").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(from_env.as_os_str()), || {
            find_config_file(Some(&explicit))
        });

        assert_eq!(result.unwrap(), explicit);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope.cfg");

        match find_config_file(Some(&missing)) {
            Err(ConfigError::ConfigFileMissing(path)) => assert_eq!(path, missing),
            other => panic!("expected ConfigFileMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_global_config_path() {
        if let Some(path) = global_config_path() {
            assert!(path.ends_with("dwhflow/dwh.cfg"));
        }
    }
}
