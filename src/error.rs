use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("引数が不足しています")]
    MissingArgument,

    #[error("引数エラー: {0}")]
    Usage(String),

    #[error("JSON解析エラー: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("テンプレートファイルが見つかりません: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("日付の形式が不正です (YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("Excel更新エラー: {0:#}")]
    Workbook(#[from] anyhow::Error),
}

impl LedgerError {
    /// Errors raised before any workbook was touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LedgerError::MissingArgument
                | LedgerError::Usage(_)
                | LedgerError::MalformedInput(_)
                | LedgerError::InvalidDate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
