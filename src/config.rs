use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xlsx_core::col_index;

pub const TEMPLATE_NAME: &str = "月次売上テンプレート.xlsx";

/// Where templates, monthly ledgers and download copies live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerPaths {
    pub template_dir: PathBuf,
    pub ledger_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template_name: String,
}

impl Default for LedgerPaths {
    fn default() -> Self {
        Self::from_root("")
    }
}

impl LedgerPaths {
    /// `data/excel/templates`, `data/excel` and `public/downloads` under `root`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            template_dir: root.join("data").join("excel").join("templates"),
            ledger_dir: root.join("data").join("excel"),
            output_dir: root.join("public").join("downloads"),
            template_name: TEMPLATE_NAME.into(),
        }
    }

    pub fn template_path(&self) -> PathBuf {
        self.template_dir.join(&self.template_name)
    }

    pub fn ledger_path(&self, file_name: &str) -> PathBuf {
        self.ledger_dir.join(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.template_dir, &self.ledger_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn rebased(self, root: &Path) -> Self {
        let rebase = |p: PathBuf| if p.is_relative() { root.join(p) } else { p };
        Self {
            template_dir: rebase(self.template_dir),
            ledger_dir: rebase(self.ledger_dir),
            output_dir: rebase(self.output_dir),
            template_name: self.template_name,
        }
    }
}

/// Column letters of the four ledger fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerColumns {
    pub date: String,
    pub customer: String,
    pub staff: String,
    pub visits: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        Self {
            date: "A".into(),
            customer: "C".into(),
            staff: "E".into(),
            visits: "H".into(),
        }
    }
}

impl LedgerColumns {
    /// 0-based indices in field order: date, customer, staff, visits.
    pub fn indices(&self) -> Result<[u32; 4]> {
        let idx = |letters: &str| {
            col_index(letters)
                .map_err(|_| LedgerError::Config(format!("列の指定が不正です: {letters:?}")))
        };
        Ok([
            idx(&self.date)?,
            idx(&self.customer)?,
            idx(&self.staff)?,
            idx(&self.visits)?,
        ])
    }
}

/// Row layout of the template sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Row whose formatting new rows copy.
    pub style_row: u32,
    /// First ledger row.
    pub first_data_row: u32,
    pub columns: LedgerColumns,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            style_row: 13,
            first_data_row: 14,
            columns: LedgerColumns::default(),
        }
    }
}

impl SheetLayout {
    pub fn validate(&self) -> Result<()> {
        if self.style_row == 0 {
            return Err(LedgerError::Config("style_row は 1 以上を指定してください".into()));
        }
        if self.first_data_row <= self.style_row {
            return Err(LedgerError::Config(format!(
                "first_data_row ({}) は style_row ({}) より後の行を指定してください",
                self.first_data_row, self.style_row
            )));
        }
        let cols = self.columns.indices()?;
        for (i, c) in cols.iter().enumerate() {
            if cols[..i].contains(c) {
                return Err(LedgerError::Config(format!("列が重複しています: {c}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub paths: LedgerPaths,
    pub layout: SheetLayout,
}

impl LedgerConfig {
    /// Defaults under `root`, overridden by the JSON file at `config_file`.
    /// Relative directories in the file are resolved against `root`.
    pub fn load(root: &Path, config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    LedgerError::Config(format!("{} を読み込めません: {e}", path.display()))
                })?;
                let config: LedgerConfig = serde_json::from_str(&content)
                    .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
                LedgerConfig {
                    paths: config.paths.rebased(root),
                    layout: config.layout,
                }
            }
            None => LedgerConfig {
                paths: LedgerPaths::from_root(root),
                layout: SheetLayout::default(),
            },
        };
        config.layout.validate()?;
        Ok(config)
    }
}
