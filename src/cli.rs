use crate::config::LedgerConfig;
use crate::error::Result;
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "update-excel")]
#[command(about = "予約情報を月次売上Excelに追記", long_about = None)]
pub struct Cli {
    /// 予約JSON ({"date","customer_name","staff_name","visit_count"})
    pub booking: Option<String>,

    /// 2つ目以降の引数は無視
    #[arg(hide = true)]
    pub ignored: Vec<String>,

    /// プロジェクトルート (data/ と public/ の親)
    #[arg(long, env = "SALES_LEDGER_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// 設定JSONファイル
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 詳細ログを標準エラーに出力 (-vv でデバッグ)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn load_config(&self) -> Result<LedgerConfig> {
        LedgerConfig::load(&self.root, self.config.as_deref())
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}
