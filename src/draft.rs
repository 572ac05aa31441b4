//! Draft form values and their best-effort persistence.

use crate::user_settings::app_data_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DRAFT_FILE: &str = "airdrop_draft.json";

/// The three raw text fields of the airdrop form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDraft {
    #[serde(default)]
    pub token_address: String,
    #[serde(default)]
    pub recipients: String,
    #[serde(default)]
    pub amounts: String,
}

impl FormDraft {
    pub fn new(token_address: impl Into<String>, recipients: impl Into<String>, amounts: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
            recipients: recipients.into(),
            amounts: amounts.into(),
        }
    }

    /// True once the user has typed anything into any field.
    pub fn is_dirty(&self) -> bool {
        !self.token_address.is_empty() || !self.recipients.is_empty() || !self.amounts.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replace recipients and amounts with the rows of a CSV import.
    pub fn apply_import(&mut self, import: &CsvImport) {
        self.recipients = import.recipients.join("\n");
        self.amounts = import.amounts.join("\n");
    }
}

/// Key-value storage for the draft between sessions.
pub trait DraftStore: Send + Sync {
    fn load(&self) -> Result<Option<FormDraft>>;
    fn save(&self, draft: &FormDraft) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Draft stored as JSON in the app data directory.
pub struct FileDraftStore {
    path: PathBuf,
}

impl FileDraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(app_data_dir().join(DRAFT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self) -> Result<Option<FormDraft>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read draft {:?}", self.path))?;
        let draft = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse draft {:?}", self.path))?;
        Ok(Some(draft))
    }

    fn save(&self, draft: &FormDraft) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(draft)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Draft kept in memory only.
#[derive(Default)]
pub struct MemoryDraftStore {
    draft: Mutex<Option<FormDraft>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(draft: FormDraft) -> Self {
        Self {
            draft: Mutex::new(Some(draft)),
        }
    }

    pub fn snapshot(&self) -> Option<FormDraft> {
        self.draft.lock().ok().and_then(|d| d.clone())
    }
}

impl DraftStore for MemoryDraftStore {
    fn load(&self) -> Result<Option<FormDraft>> {
        Ok(self.snapshot())
    }

    fn save(&self, draft: &FormDraft) -> Result<()> {
        if let Ok(mut slot) = self.draft.lock() {
            *slot = Some(draft.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut slot) = self.draft.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Rows read from an `address,amount` CSV file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvImport {
    pub recipients: Vec<String>,
    pub amounts: Vec<String>,
    /// Header, blank and malformed rows that were left out.
    pub skipped: usize,
}

/// Read `address,amount` rows. A header row, rows whose first column is not
/// `0x`-prefixed, and rows without an amount are skipped.
pub fn import_csv<R: Read>(reader: R) -> Result<CsvImport> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut import = CsvImport::default();
    for record in rdr.records() {
        let record = record?;
        let address = record.get(0).unwrap_or("").trim_matches('"');
        let amount = record.get(1).unwrap_or("").trim_matches('"');
        if address.starts_with("0x") && !amount.is_empty() {
            import.recipients.push(address.to_string());
            import.amounts.push(amount.to_string());
        } else {
            import.skipped += 1;
        }
    }
    Ok(import)
}

pub fn import_csv_file(path: &Path) -> Result<CsvImport> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    import_csv(file)
}
