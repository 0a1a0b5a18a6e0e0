use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: dockyard.local.yaml, dockyard.yaml, .dockyard.yaml\n\
        - ./.dockyard/ ディレクトリ\n\
        - ~/.config/dockyard/dockyard.yaml\n\
        または DOCKYARD_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("YAMLの解析に失敗しました: {path}\n理由: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("スタックが定義されていません: {path}\n\nヒント:\n  • stacks: の下に1つ以上のスタックを定義してください")]
    NoStacks { path: PathBuf },

    #[error("スタック '{name}' が見つかりません\n利用可能なスタック: {available}")]
    StackNotFound { name: String, available: String },

    #[error(
        "スタック名を指定してください: dockyard --stack <name> または DOCKYARD_STACK=<name>\n利用可能なスタック: {available}"
    )]
    StackNotSpecified { available: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
