//! Per-year download statistics, one YAML ledger file per calendar year.
//!
//! Ledgers are read and rewritten in full on every update. All updates are
//! expected to run on the work pool worker, which serializes them.
use crate::metrics_defs::LEDGER_WRITE_FAILED;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Synthetic plugin name under which update center visits are counted.
pub const UPDATE_CENTER_PLUGIN: &str = "update-center";

const YEAR_FORMAT: &str = "%Y";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("no ledger for year {0}")]
    NotFound(String),

    #[error("invalid year {0:?}")]
    InvalidYear(String),

    #[error("no data for plugin {plugin} in {year}")]
    UnknownPlugin { year: String, plugin: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ledger format error: {0}")]
    Format(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginCounts {
    /// Date (`YYYY-MM-DD`) to number of downloads on that day.
    #[serde(default)]
    pub data: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginCounts>,
}

impl Ledger {
    pub fn new(year: impl Into<String>) -> Self {
        Ledger {
            year: year.into(),
            plugins: BTreeMap::new(),
        }
    }

    /// Adds one to the count of `plugin` on `date` and returns the new count.
    pub fn increment(&mut self, plugin: &str, date: &str) -> u64 {
        let count = self
            .plugins
            .entry(plugin.to_string())
            .or_default()
            .data
            .entry(date.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, plugin: &str, date: &str) -> Option<u64> {
        self.plugins.get(plugin)?.data.get(date).copied()
    }
}

pub fn current_year() -> String {
    Local::now().format(YEAR_FORMAT).to_string()
}

pub fn current_date() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

#[derive(Clone, Debug)]
pub struct DownloadCounter {
    data_dir: PathBuf,
}

impl DownloadCounter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DownloadCounter {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ledger file of `year`. Only four-digit years name a ledger.
    pub fn ledger_path(&self, year: &str) -> Result<PathBuf, LedgerError> {
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::InvalidYear(year.to_string()));
        }
        Ok(self.data_dir.join(format!("{year}.yaml")))
    }

    /// Loads the ledger of `year`. The file name decides the year, whatever the
    /// file itself claims.
    pub fn find_ledger(&self, year: &str) -> Result<Ledger, LedgerError> {
        let data = match fs::read_to_string(self.ledger_path(year)?) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::NotFound(year.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut ledger: Ledger = serde_yaml::from_str(&data)?;
        ledger.year = year.to_string();
        Ok(ledger)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let path = self.ledger_path(&ledger.year)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_yaml::to_string(ledger)?;
        fs::write(&path, data)?;
        Ok(())
    }

    pub fn find_plugin_data(&self, year: &str, plugin: &str) -> Result<PluginCounts, LedgerError> {
        self.find_ledger(year)?
            .plugins
            .remove(plugin)
            .ok_or_else(|| LedgerError::UnknownPlugin {
                year: year.to_string(),
                plugin: plugin.to_string(),
            })
    }

    pub fn plugin_names(&self, year: &str) -> Result<Vec<String>, LedgerError> {
        Ok(self.find_ledger(year)?.plugins.into_keys().collect())
    }

    pub fn record_download(&self, plugin: &str) {
        self.record_download_on(plugin, Local::now().date_naive());
    }

    pub fn record_update_center_visit(&self) {
        self.record_download(UPDATE_CENTER_PLUGIN);
    }

    /// Counts one download of `plugin` on `date`. Failures are logged, never returned.
    pub fn record_download_on(&self, plugin: &str, date: NaiveDate) {
        let year = date.format(YEAR_FORMAT).to_string();
        let day = date.format(DATE_FORMAT).to_string();

        let mut ledger = match self.find_ledger(&year) {
            Ok(ledger) => ledger,
            Err(LedgerError::NotFound(_)) => {
                tracing::info!(%year, "Starting a new download ledger");
                Ledger::new(year.as_str())
            }
            Err(e) => {
                // Rewriting an unreadable ledger would lose the whole year
                counter!(LEDGER_WRITE_FAILED).increment(1);
                tracing::error!(%year, plugin, error = %e, "Could not read download ledger");
                return;
            }
        };

        let count = ledger.increment(plugin, &day);
        match self.save(&ledger) {
            Ok(()) => tracing::debug!(plugin, date = %day, count, "Recorded download"),
            Err(e) => {
                counter!(LEDGER_WRITE_FAILED).increment(1);
                tracing::error!(%year, plugin, error = %e, "Could not save download ledger");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_find_missing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());

        assert!(matches!(
            counter.find_ledger("2020"),
            Err(LedgerError::NotFound(year)) if year == "2020"
        ));
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path().join("nested").join("data"));

        let mut ledger = Ledger::new("2020");
        ledger.increment(UPDATE_CENTER_PLUGIN, "2020-01-11");
        counter.save(&ledger).unwrap();

        assert!(counter.ledger_path("2020").unwrap().exists());
        assert_eq!(counter.find_ledger("2020").unwrap(), ledger);
    }

    #[test]
    fn test_ledger_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        fs::write(
            counter.ledger_path("2020").unwrap(),
            "year: \"2020\"\nplugins:\n  git:\n    data:\n      2020-01-11: 3\n",
        )
        .unwrap();

        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.year, "2020");
        assert_eq!(ledger.count("git", "2020-01-11"), Some(3));
    }

    #[test]
    fn test_record_download_twice() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        let day = date("2020-01-11");

        assert!(counter.find_ledger("2020").is_err());

        counter.record_download_on("pluginX", day);
        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.year, "2020");
        assert_eq!(ledger.count("pluginX", "2020-01-11"), Some(1));

        counter.record_download_on("pluginX", day);
        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.count("pluginX", "2020-01-11"), Some(2));
    }

    #[test]
    fn test_record_new_plugin_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());

        counter.record_download_on("git", date("2020-01-10"));
        counter.record_download_on("git", date("2020-01-11"));
        counter.record_download_on("maven", date("2020-01-11"));

        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.plugins.len(), 2);
        assert_eq!(ledger.count("git", "2020-01-10"), Some(1));
        assert_eq!(ledger.count("git", "2020-01-11"), Some(1));
        assert_eq!(ledger.count("maven", "2020-01-11"), Some(1));
        assert_eq!(ledger.count("maven", "2020-01-10"), None);
    }

    #[test]
    fn test_ledgers_are_partitioned_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());

        counter.record_download_on("git", date("2019-12-31"));
        counter.record_download_on("git", date("2020-01-01"));

        assert_eq!(
            counter.find_ledger("2019").unwrap().count("git", "2019-12-31"),
            Some(1)
        );
        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.count("git", "2020-01-01"), Some(1));
        assert_eq!(ledger.count("git", "2019-12-31"), None);
    }

    #[test]
    fn test_corrupt_ledger_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        let path = counter.ledger_path("2020").unwrap();
        fs::write(&path, "plugins: [not, a, map]\n").unwrap();

        counter.record_download_on("git", date("2020-01-11"));

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "plugins: [not, a, map]\n"
        );
    }

    #[test]
    fn test_ledger_without_year_key() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        fs::write(
            counter.ledger_path("2020").unwrap(),
            "plugins: {git: {data: {2020-01-10: 5}}}\n",
        )
        .unwrap();

        counter.record_download_on("git", date("2020-01-11"));

        let ledger = counter.find_ledger("2020").unwrap();
        assert_eq!(ledger.year, "2020");
        assert_eq!(ledger.count("git", "2020-01-10"), Some(5));
        assert_eq!(ledger.count("git", "2020-01-11"), Some(1));
        assert!(!dir.path().join(".yaml").exists());
    }

    #[test]
    fn test_ledger_year_mismatch_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        fs::write(
            counter.ledger_path("2020").unwrap(),
            "year: \"2019\"\nplugins: {}\n",
        )
        .unwrap();

        counter.record_download_on("git", date("2020-01-11"));

        assert_eq!(
            counter.find_ledger("2020").unwrap().count("git", "2020-01-11"),
            Some(1)
        );
        assert!(!counter.ledger_path("2019").unwrap().exists());
    }

    #[test]
    fn test_invalid_year_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(
            outside.path().join("secret.yaml"),
            "plugins: {hidden-key: {data: {}}}\n",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());

        let escape = outside.path().join("secret").display().to_string();
        for year in [escape.as_str(), "../secret", "20a0", "202", "20200", ""] {
            assert!(matches!(
                counter.plugin_names(year),
                Err(LedgerError::InvalidYear(y)) if y == year
            ));
            assert!(matches!(
                counter.find_plugin_data(year, "hidden-key"),
                Err(LedgerError::InvalidYear(_))
            ));
        }
        assert!(matches!(
            counter.save(&Ledger::new("../2020")),
            Err(LedgerError::InvalidYear(_))
        ));
    }

    #[test]
    fn test_update_center_visit() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());

        counter.record_update_center_visit();

        let data = counter
            .find_plugin_data(&current_year(), UPDATE_CENTER_PLUGIN)
            .unwrap();
        assert!(data.data.values().all(|count| *count >= 1));
        assert_eq!(data.data.values().sum::<u64>(), 1);
    }

    #[test]
    fn test_plugin_queries() {
        let dir = tempfile::tempdir().unwrap();
        let counter = DownloadCounter::new(dir.path());
        counter.record_download_on("maven", date("2020-03-01"));
        counter.record_download_on("git", date("2020-03-01"));

        assert_eq!(counter.plugin_names("2020").unwrap(), vec!["git", "maven"]);
        assert_eq!(
            counter.find_plugin_data("2020", "git").unwrap().data,
            BTreeMap::from([("2020-03-01".to_string(), 1)])
        );
        assert!(matches!(
            counter.find_plugin_data("2020", "docker"),
            Err(LedgerError::UnknownPlugin { .. })
        ));
        assert!(matches!(
            counter.plugin_names("1999"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_date_helpers() {
        let year = current_year();
        let today = current_date();
        assert_eq!(year.len(), 4);
        assert!(today.starts_with(&year));
        assert!(NaiveDate::parse_from_str(&today, DATE_FORMAT).is_ok());
    }
}
